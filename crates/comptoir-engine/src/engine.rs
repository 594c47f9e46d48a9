//! # Cart Engine
//!
//! Cart lifecycle operations: creation under the one-active-cart rule, item
//! edits, status changes with their settlement and usage side effects.
//!
//! ## Operation Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  change_status(actor, cart_id, Submitted, expected_version)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  load cart (read, retried on transient errors)                          │
//! │       │  owner acting on someone else's cart → NotFound                 │
//! │       ▼                                                                 │
//! │  core rules: check_transition / check_item_mutation / limits            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  settle: catalog products + applicable promotions + owner's company     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  one transaction: cart row (version check) + lines + usage records      │
//! │       │  (writes are never retried)                                     │
//! │       ▼                                                                 │
//! │  SettledCart { cart, settlement }                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Promotion administration lives in [`crate::promotions`], statistics in
//! [`crate::stats`].

use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use comptoir_core::guard::plan_creation;
use comptoir_core::settlement::settle;
use comptoir_core::status::{check_item_mutation, check_transition};
use comptoir_core::usage::records_for_submission;
use comptoir_core::validation::validate_reference;
use comptoir_core::{
    ActiveCartSummary, Actor, Cart, CartId, CartItemInput, CartLimits, CartStatus, CompanyRef,
    CreationPlan, Money, ProductRef, Settlement, SettlementLine, UserRef, ValidationError,
};
use comptoir_db::{
    CartRepository, CatalogRepository, Database, DbError, DbResult, DirectoryRepository,
    PromotionRepository, StatsRepository, UsageRepository,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Requests & Results
// =============================================================================

/// Input of [`CartEngine::create_cart`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCartRequest {
    pub owner_ref: UserRef,
    #[serde(default)]
    pub items: Vec<CartItemInput>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub order_reference: Option<String>,
    /// Cancel the owner's current active cart instead of failing.
    #[serde(default)]
    pub replace_active: bool,
}

impl CreateCartRequest {
    /// An empty cart for `owner_ref`.
    pub fn new(owner_ref: impl Into<UserRef>) -> Self {
        CreateCartRequest {
            owner_ref: owner_ref.into(),
            items: Vec::new(),
            notes: None,
            order_reference: None,
            replace_active: false,
        }
    }

    pub fn with_items(mut self, items: Vec<CartItemInput>) -> Self {
        self.items = items;
        self
    }

    pub fn replacing_active(mut self) -> Self {
        self.replace_active = true;
        self
    }
}

/// Input of [`CartEngine::update_cart`].
///
/// A full replacement: `items` becomes the cart's lines, and `None` clears
/// the notes or order reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateCartRequest {
    #[serde(default)]
    pub items: Vec<CartItemInput>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub order_reference: Option<String>,
    /// Version the caller last saw; a mismatch fails before any write.
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// A cart with the settlement of its current lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledCart {
    pub cart: Cart,
    pub settlement: Settlement,
}

// =============================================================================
// Engine
// =============================================================================

/// Entry point for every cart and promotion operation.
///
/// Cheap to clone; all clones share the same connection pool.
///
/// ## Usage
/// ```rust,ignore
/// let engine = CartEngine::connect(EngineConfig::from_env()?).await?;
/// let settled = engine
///     .create_cart(&Actor::Owner(alice.clone()), CreateCartRequest::new(alice))
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct CartEngine {
    pub(crate) db: Database,
    pub(crate) carts: CartRepository,
    pub(crate) promotions: PromotionRepository,
    pub(crate) usage: UsageRepository,
    pub(crate) catalog: CatalogRepository,
    pub(crate) directory: DirectoryRepository,
    pub(crate) stats: StatsRepository,
    pub(crate) config: EngineConfig,
    limits: CartLimits,
}

impl CartEngine {
    /// Opens the configured database (running migrations) and builds an engine.
    pub async fn connect(config: EngineConfig) -> EngineResult<Self> {
        info!(path = %config.db_path.display(), "Opening cart engine");
        let db = Database::new(config.to_db_config()).await?;
        Ok(CartEngine::new(db, config))
    }

    /// Builds an engine over an existing database handle.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        CartEngine {
            carts: db.carts(),
            promotions: db.promotions(),
            usage: db.usage(),
            catalog: db.catalog(),
            directory: db.directory(),
            stats: db.stats(),
            limits: config.cart_limits(),
            config,
            db,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Cart Creation
    // =========================================================================

    /// Creates a cart for `request.owner_ref`.
    ///
    /// - Owners create `building` carts for themselves.
    /// - Administrators create carts on an owner's behalf, directly
    ///   `submitted` (and so non-empty), recording promotion usage.
    ///
    /// If the owner already has an active cart, the request fails with
    /// [`EngineError::ConflictActiveCart`] unless `replace_active` is set, in
    /// which case the old cart is cancelled in the same transaction.
    pub async fn create_cart(
        &self,
        actor: &Actor,
        request: CreateCartRequest,
    ) -> EngineResult<SettledCart> {
        let owner = &request.owner_ref;
        validate_reference("owner_ref", owner.as_str())?;

        if !actor.may_act_for(owner) {
            return Err(ValidationError::InvalidFormat {
                field: "owner_ref".to_string(),
                reason: "owners can only create carts for themselves".to_string(),
            }
            .into());
        }

        if self.read("user", || self.directory.user(owner)).await?.is_none() {
            return Err(EngineError::not_found("User", owner.as_str()));
        }

        let existing = self
            .read("active cart", || self.carts.active_for_owner(owner))
            .await?;
        let plan = plan_creation(existing.as_ref(), request.replace_active, actor.kind())?;

        let now = Utc::now();
        let mut cart = Cart::new(owner.clone(), actor.kind(), now);
        cart.set_notes(request.notes.as_deref())?;
        cart.set_order_reference(request.order_reference.as_deref())?;
        let prices = self.catalog_prices(&cart.new_products(&request.items)).await?;
        cart.replace_items(&request.items, &prices, &self.limits)?;

        let mut usages = Vec::new();
        let settlement = self.settle_cart(&cart, now).await?;
        cart.apply_settlement(&settlement);

        if actor.is_administrator() {
            if cart.is_empty() {
                return Err(ValidationError::EmptyCart.into());
            }
            cart.status = CartStatus::Submitted;
            cart.submitted_at = Some(now);
            usages = records_for_submission(&cart, &settlement, now);
        }

        let written = match &plan {
            CreationPlan::CreateFresh => self.carts.insert(&cart, &usages).await,
            CreationPlan::ReplaceExisting {
                cart_id,
                expected_version,
            } => {
                self.carts
                    .replace_active(cart_id, *expected_version, now, &cart, &usages)
                    .await
            }
        };
        if let Err(err) = written {
            return Err(self.creation_failed(&cart, err).await);
        }

        info!(
            cart_id = %cart.id,
            owner = %cart.owner_ref,
            actor = %actor.kind(),
            status = %cart.status,
            items = cart.item_count(),
            total = %cart.total,
            replaced = matches!(plan, CreationPlan::ReplaceExisting { .. }),
            "Cart created"
        );

        Ok(SettledCart { cart, settlement })
    }

    /// Turns the unique-index violation of a lost creation race into the
    /// conflict the winner would have caused.
    async fn creation_failed(&self, attempted: &Cart, err: DbError) -> EngineError {
        if !err.is_active_cart_violation() {
            return err.into();
        }

        warn!(owner = %attempted.owner_ref, "Concurrent cart creation detected");

        match self.carts.active_for_owner(&attempted.owner_ref).await {
            Ok(Some(winner)) => EngineError::ConflictActiveCart(ActiveCartSummary::of(&winner)),
            Ok(None) => EngineError::ConcurrencyConflict {
                cart_id: attempted.id.to_string(),
            },
            Err(e) => e.into(),
        }
    }

    // =========================================================================
    // Item Edits
    // =========================================================================

    /// Replaces the lines, notes and order reference of a cart.
    ///
    /// Existing products keep the unit price they were added at.
    pub async fn update_cart(
        &self,
        actor: &Actor,
        cart_id: &CartId,
        request: UpdateCartRequest,
    ) -> EngineResult<SettledCart> {
        let mut cart = self.load_cart_for(actor, cart_id).await?;
        check_expected_version(&cart, request.expected_version)?;
        check_item_mutation(cart.status, actor.kind())?;

        let prices = self.catalog_prices(&cart.new_products(&request.items)).await?;
        cart.replace_items(&request.items, &prices, &self.limits)?;
        cart.set_notes(request.notes.as_deref())?;
        cart.set_order_reference(request.order_reference.as_deref())?;

        self.save_edit(cart, Utc::now()).await
    }

    /// Sets one line's quantity; `0` removes the line.
    pub async fn set_item_quantity(
        &self,
        actor: &Actor,
        cart_id: &CartId,
        product_ref: &ProductRef,
        quantity: i64,
    ) -> EngineResult<SettledCart> {
        let mut cart = self.load_cart_for(actor, cart_id).await?;
        check_item_mutation(cart.status, actor.kind())?;

        let catalog_price = if quantity > 0 && cart.item(product_ref).is_none() {
            self.read("product", || self.catalog.product(product_ref))
                .await?
                .map(|p| p.price)
        } else {
            None
        };
        cart.set_quantity(product_ref, quantity, catalog_price, &self.limits)?;

        self.save_edit(cart, Utc::now()).await
    }

    /// Re-settles and persists an edited cart. Status is unchanged and no
    /// usage is recorded.
    async fn save_edit(&self, mut cart: Cart, now: DateTime<Utc>) -> EngineResult<SettledCart> {
        if cart.status != CartStatus::Building && cart.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }

        let settlement = self.settle_cart(&cart, now).await?;
        cart.apply_settlement(&settlement);
        cart.updated_at = now;

        let expected = cart.version;
        cart.version = self.carts.update(&cart, expected, &[]).await?;

        debug!(cart_id = %cart.id, version = cart.version, total = %cart.total, "Cart edited");
        Ok(SettledCart { cart, settlement })
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Moves a cart to `target`.
    ///
    /// Submission snapshots the settlement, stamps `submitted_at` and records
    /// one usage per discounted line, all in one transaction.
    pub async fn change_status(
        &self,
        actor: &Actor,
        cart_id: &CartId,
        target: CartStatus,
        expected_version: Option<i64>,
    ) -> EngineResult<SettledCart> {
        let mut cart = self.load_cart_for(actor, cart_id).await?;
        check_expected_version(&cart, expected_version)?;

        let from = cart.status;
        check_transition(from, target, actor.kind())?;

        if target == CartStatus::Submitted && cart.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }

        let now = Utc::now();
        let settlement = self.settle_cart(&cart, now).await?;
        cart.apply_settlement(&settlement);
        cart.status = target;
        cart.updated_at = now;

        let usages = if target == CartStatus::Submitted {
            cart.submitted_at = Some(now);
            records_for_submission(&cart, &settlement, now)
        } else {
            Vec::new()
        };

        let expected = cart.version;
        cart.version = self.carts.update(&cart, expected, &usages).await?;

        info!(
            cart_id = %cart.id,
            from = %from,
            to = %target,
            actor = %actor.kind(),
            usages = usages.len(),
            total = %cart.total,
            "Cart status changed"
        );

        Ok(SettledCart { cart, settlement })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Loads a cart and settles it against today's promotions.
    pub async fn get_cart(&self, cart_id: &CartId) -> EngineResult<SettledCart> {
        let cart = self.load_cart(cart_id).await?;
        let settlement = self.settle_cart(&cart, Utc::now()).await?;
        Ok(SettledCart { cart, settlement })
    }

    /// The user's cart in `building` or `submitted`, settled.
    pub async fn get_active_cart(&self, user_ref: &UserRef) -> EngineResult<Option<SettledCart>> {
        let Some(cart) = self
            .read("active cart", || self.carts.active_for_owner(user_ref))
            .await?
        else {
            return Ok(None);
        };

        let settlement = self.settle_cart(&cart, Utc::now()).await?;
        Ok(Some(SettledCart { cart, settlement }))
    }

    /// Summary of the user's active cart, for the "replace it?" prompt.
    pub async fn active_cart_summary(
        &self,
        user_ref: &UserRef,
    ) -> EngineResult<Option<ActiveCartSummary>> {
        let cart = self
            .read("active cart", || self.carts.active_for_owner(user_ref))
            .await?;
        Ok(cart.as_ref().map(ActiveCartSummary::of))
    }

    /// Every cart of a user, newest first, with their persisted totals.
    pub async fn list_carts_for_user(&self, user_ref: &UserRef) -> EngineResult<Vec<Cart>> {
        self.read("carts", || self.carts.list_for_owner(user_ref)).await
    }

    /// Hard-deletes a cart. Its usage records are kept.
    pub async fn delete_cart(&self, actor: &Actor, cart_id: &CartId) -> EngineResult<()> {
        if !actor.is_administrator() {
            return Err(EngineError::forbidden("delete carts"));
        }

        self.carts.delete(cart_id).await?;
        info!(cart_id = %cart_id, by = %actor.user_ref(), "Cart deleted");
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Runs a read, retrying transient storage errors.
    ///
    /// At most `read_retry_attempts` calls of `op`; anything but
    /// [`DbError::is_transient`] fails on the first attempt.
    pub(crate) async fn read<T, F, Fut>(&self, what: &'static str, op: F) -> EngineResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let attempts = self.config.read_retry_attempts.max(1);
        let attempt = AtomicU32::new(0);

        let result = backoff::future::retry_notify(
            self.read_backoff(),
            || {
                let n = attempt.fetch_add(1, Ordering::Relaxed) + 1;
                let pending = op();
                async move {
                    pending.await.map_err(|err| {
                        if err.is_transient() && n < attempts {
                            backoff::Error::transient(err)
                        } else {
                            backoff::Error::permanent(err)
                        }
                    })
                }
            },
            |err: DbError, wait: Duration| {
                warn!(what, error = %err, ?wait, "Transient storage error, retrying read");
            },
        )
        .await;

        result.map_err(EngineError::from)
    }

    /// Retry schedule for reads, starting at `read_retry_delay`.
    fn read_backoff(&self) -> ExponentialBackoff {
        let delay = self.config.read_retry_delay;
        ExponentialBackoff {
            current_interval: delay,
            initial_interval: delay,
            max_interval: delay * 4,
            multiplier: 2.0,
            max_elapsed_time: None, // bounded by attempts instead
            ..Default::default()
        }
    }

    async fn load_cart(&self, cart_id: &CartId) -> EngineResult<Cart> {
        self.read("cart", || self.carts.get(cart_id))
            .await?
            .ok_or_else(|| EngineError::not_found("Cart", cart_id.as_str()))
    }

    /// Loads a cart the actor may act on. Other users' carts look missing to
    /// owners.
    async fn load_cart_for(&self, actor: &Actor, cart_id: &CartId) -> EngineResult<Cart> {
        let cart = self.load_cart(cart_id).await?;
        if !actor.may_act_for(&cart.owner_ref) {
            return Err(EngineError::not_found("Cart", cart_id.as_str()));
        }
        Ok(cart)
    }

    /// The company purchases by `user_ref` are attributed to.
    pub(crate) async fn company_of(&self, user_ref: &UserRef) -> EngineResult<Option<CompanyRef>> {
        let user = self.read("user", || self.directory.user(user_ref)).await?;
        Ok(user.and_then(|u| u.company_ref))
    }

    /// Current catalog prices of `products`. Unknown products are absent.
    async fn catalog_prices(
        &self,
        products: &[&ProductRef],
    ) -> EngineResult<HashMap<ProductRef, Money>> {
        if products.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<ProductRef> = products.iter().map(|p| (*p).clone()).collect();
        let found = self
            .read("products", || self.catalog.products_by_ids(&ids))
            .await?;

        Ok(found
            .into_iter()
            .map(|(id, product)| (id, product.price))
            .collect())
    }

    /// Settles `cart` at `at` with the owner's company and live promotions.
    async fn settle_cart(&self, cart: &Cart, at: DateTime<Utc>) -> EngineResult<Settlement> {
        let company = self.company_of(&cart.owner_ref).await?;

        let ids = cart.product_refs();
        let products = self
            .read("products", || self.catalog.products_by_ids(&ids))
            .await?;
        let promotions = self
            .read("promotions", || self.promotions.applicable(company.as_ref()))
            .await?;

        let lines: Vec<SettlementLine> = cart
            .items
            .iter()
            .map(|item| SettlementLine {
                item: item.clone(),
                product: products.get(&item.product_ref).cloned(),
            })
            .collect();

        Ok(settle(&lines, &promotions, company.as_ref(), at))
    }
}

fn check_expected_version(cart: &Cart, expected: Option<i64>) -> EngineResult<()> {
    match expected {
        Some(version) if version != cart.version => {
            warn!(
                cart_id = %cart.id,
                expected = version,
                actual = cart.version,
                "Stale cart version"
            );
            Err(EngineError::ConcurrencyConflict {
                cart_id: cart.id.to_string(),
            })
        }
        _ => Ok(()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::Duration;
    use comptoir_core::{
        CategoryRef, CompanyInfo, DiscountPercentage, ProductInfo, PromotionDraft, PromotionScope,
        UserInfo,
    };
    use comptoir_db::DbConfig;
    use std::collections::BTreeSet;

    pub(crate) fn owner(id: &str) -> Actor {
        Actor::Owner(UserRef::from(id))
    }

    pub(crate) fn admin() -> Actor {
        Actor::Administrator(UserRef::from("admin"))
    }

    /// Engine over an in-memory database with:
    /// - company `acme`; users `alice` (acme), `bob` (no company)
    /// - products `paper` 10.00 (paper), `toner` 25.00 (ink), `stapler` 4.50 (office)
    pub(crate) async fn engine() -> CartEngine {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        db.directory()
            .insert_company(&CompanyInfo {
                id: CompanyRef::from("acme"),
                name: "Acme SARL".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        for (id, name, company) in [("alice", "Alice", Some("acme")), ("bob", "Bob", None)] {
            db.directory()
                .insert_user(&UserInfo {
                    id: UserRef::from(id),
                    name: name.to_string(),
                    company_ref: company.map(CompanyRef::from),
                })
                .await
                .unwrap();
        }
        for (id, cents, category) in [("paper", 1000, "paper"), ("toner", 2500, "ink"), ("stapler", 450, "office")] {
            db.catalog()
                .insert_product(&ProductInfo {
                    id: ProductRef::from(id),
                    name: id.to_string(),
                    price: Money::from_cents(cents),
                    category_ref: Some(CategoryRef::from(category)),
                    brand_ref: None,
                })
                .await
                .unwrap();
        }

        CartEngine::new(db, EngineConfig::default())
    }

    pub(crate) fn category_draft(name: &str, category: &str, percent: u32) -> PromotionDraft {
        PromotionDraft {
            scope: PromotionScope::Global,
            name: name.to_string(),
            description: None,
            discount_percentage: DiscountPercentage::from_whole(percent).unwrap(),
            start_date: Utc::now() - Duration::days(1),
            end_date: Some(Utc::now() + Duration::days(30)),
            is_active: true,
            applies_to_all_products: false,
            product_refs: BTreeSet::new(),
            category_refs: BTreeSet::from([CategoryRef::from(category)]),
        }
    }

    fn items(lines: &[(&str, i64)]) -> Vec<CartItemInput> {
        lines.iter().map(|(p, q)| CartItemInput::new(*p, *q)).collect()
    }

    #[tokio::test]
    async fn test_transient_read_succeeds_on_last_attempt() {
        let mut engine = engine().await;
        engine.config.read_retry_delay = std::time::Duration::from_millis(1);
        let calls = AtomicU32::new(0);

        let value = engine
            .read("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(DbError::PoolExhausted)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), engine.config.read_retry_attempts);
    }

    #[tokio::test]
    async fn test_transient_read_gives_up_after_configured_attempts() {
        let mut engine = engine().await;
        engine.config.read_retry_delay = std::time::Duration::from_millis(1);
        let calls = AtomicU32::new(0);

        let err = engine
            .read("down", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DbError::PoolExhausted) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::StorageError);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_read_error_is_not_retried() {
        let engine = engine().await;
        let calls = AtomicU32::new(0);

        let err = engine
            .read("missing", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DbError::not_found("Cart", "c-1")) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blank_owner_ref_is_invalid() {
        let engine = engine().await;
        let err = engine
            .create_cart(&admin(), CreateCartRequest::new("   "))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = engine
            .create_cart(
                &owner("alice"),
                CreateCartRequest::new("alice").with_items(items(&[("", 1)])),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_category_promotion_settles_second_line() {
        let engine = engine().await;
        engine
            .create_promotion(&admin(), category_draft("Encre -20%", "ink", 20))
            .await
            .unwrap();

        let settled = engine
            .create_cart(
                &owner("alice"),
                CreateCartRequest::new("alice").with_items(items(&[("paper", 2), ("toner", 1)])),
            )
            .await
            .unwrap();

        let lines = &settled.settlement.lines;
        assert_eq!(lines[0].net, Money::from_cents(2000));
        assert!(lines[0].promotion.is_none());
        assert_eq!(lines[1].net, Money::from_cents(2000));
        assert_eq!(lines[1].discount, Money::from_cents(500));
        assert_eq!(settled.settlement.grand_total, Money::from_cents(4000));

        assert_eq!(settled.cart.status, CartStatus::Building);
        assert_eq!(settled.cart.total, Money::from_cents(4000));
        assert_eq!(settled.cart.discount_total, Money::from_cents(500));

        // Nothing submitted yet, so nothing recorded.
        assert!(engine.usage.for_cart(&settled.cart.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admin_creates_submitted_cart_and_records_usage() {
        let engine = engine().await;
        engine
            .create_promotion(&admin(), category_draft("Encre -20%", "ink", 20))
            .await
            .unwrap();

        let settled = engine
            .create_cart(
                &admin(),
                CreateCartRequest::new("bob").with_items(items(&[("toner", 2), ("paper", 1)])),
            )
            .await
            .unwrap();

        assert_eq!(settled.cart.status, CartStatus::Submitted);
        assert!(settled.cart.submitted_at.is_some());

        let records = engine.usage.for_cart(&settled.cart.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].product_ref, ProductRef::from("toner"));
        assert_eq!(records[0].discount_amount, Money::from_cents(1000));
        assert_eq!(records[0].cart_total, Money::from_cents(5000));
    }

    #[tokio::test]
    async fn test_later_transitions_resettle_but_keep_usage_records() {
        let engine = engine().await;
        let promotion = engine
            .create_promotion(&admin(), category_draft("Encre -20%", "ink", 20))
            .await
            .unwrap();

        let submitted = engine
            .create_cart(&admin(), CreateCartRequest::new("bob").with_items(items(&[("toner", 2)])))
            .await
            .unwrap();
        assert_eq!(submitted.cart.total, Money::from_cents(4000));

        engine
            .set_promotion_active(&admin(), &promotion.id, false)
            .await
            .unwrap();

        let processed = engine
            .change_status(&admin(), &submitted.cart.id, CartStatus::Processed, None)
            .await
            .unwrap();
        assert_eq!(processed.cart.total, Money::from_cents(5000));
        assert_eq!(processed.cart.discount_total, Money::zero());
        assert_eq!(processed.cart.submitted_at, submitted.cart.submitted_at);

        // What was granted at submission is not rewritten.
        let records = engine.usage.for_cart(&submitted.cart.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cart_total, Money::from_cents(4000));
        assert_eq!(records[0].discount_amount, Money::from_cents(1000));
    }

    #[tokio::test]
    async fn test_admin_cannot_create_empty_order() {
        let engine = engine().await;
        let err = engine
            .create_cart(&admin(), CreateCartRequest::new("bob"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(engine.list_carts_for_user(&UserRef::from("bob")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_declined_replacement_keeps_original() {
        let engine = engine().await;
        let original = engine
            .create_cart(
                &owner("alice"),
                CreateCartRequest::new("alice").with_items(items(&[("paper", 1)])),
            )
            .await
            .unwrap();

        let err = engine
            .create_cart(&admin(), CreateCartRequest::new("alice").with_items(items(&[("toner", 1)])))
            .await
            .unwrap_err();

        match err {
            EngineError::ConflictActiveCart(summary) => {
                assert_eq!(summary.cart_id, original.cart.id);
                assert_eq!(summary.item_count, 1);
                assert_eq!(summary.total, Money::from_cents(1000));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let carts = engine.list_carts_for_user(&UserRef::from("alice")).await.unwrap();
        assert_eq!(carts.len(), 1);
        let active = engine.active_cart_summary(&UserRef::from("alice")).await.unwrap().unwrap();
        assert_eq!(active.cart_id, original.cart.id);
    }

    #[tokio::test]
    async fn test_replacement_cancels_previous_cart() {
        let engine = engine().await;
        let alice = owner("alice");
        let first = engine
            .create_cart(&alice, CreateCartRequest::new("alice").with_items(items(&[("paper", 1)])))
            .await
            .unwrap();
        engine
            .change_status(&alice, &first.cart.id, CartStatus::Submitted, None)
            .await
            .unwrap();

        // An owner cannot cancel a submitted cart, so cannot replace it either.
        let err = engine
            .create_cart(&alice, CreateCartRequest::new("alice").replacing_active())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        let second = engine
            .create_cart(
                &admin(),
                CreateCartRequest::new("alice")
                    .with_items(items(&[("toner", 1)]))
                    .replacing_active(),
            )
            .await
            .unwrap();

        let first = engine.get_cart(&first.cart.id).await.unwrap();
        assert_eq!(first.cart.status, CartStatus::Cancelled);
        let active = engine.get_active_cart(&UserRef::from("alice")).await.unwrap().unwrap();
        assert_eq!(active.cart.id, second.cart.id);
    }

    #[tokio::test]
    async fn test_concurrent_creation_has_one_winner() {
        let engine = engine().await;
        let alice = owner("alice");

        let (a, b) = tokio::join!(
            engine.create_cart(&alice, CreateCartRequest::new("alice").with_items(items(&[("paper", 1)]))),
            engine.create_cart(&alice, CreateCartRequest::new("alice").with_items(items(&[("toner", 1)]))),
        );

        let results = [a, b];
        let winners: Vec<&SettledCart> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);

        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        match loser {
            EngineError::ConflictActiveCart(summary) => assert_eq!(summary.cart_id, winners[0].cart.id),
            other => panic!("unexpected error: {other:?}"),
        }

        let live: Vec<Cart> = engine
            .list_carts_for_user(&UserRef::from("alice"))
            .await
            .unwrap()
            .into_iter()
            .filter(|c| c.status.is_active())
            .collect();
        assert_eq!(live.len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_carts_reject_every_change() {
        let engine = engine().await;
        let alice = owner("alice");
        let settled = engine
            .create_cart(&alice, CreateCartRequest::new("alice").with_items(items(&[("paper", 1)])))
            .await
            .unwrap();
        let id = settled.cart.id.clone();
        engine.change_status(&alice, &id, CartStatus::Cancelled, None).await.unwrap();

        for target in CartStatus::ALL {
            let err = engine.change_status(&admin(), &id, target, None).await.unwrap_err();
            assert!(matches!(err, EngineError::InvalidTransition { .. }), "{target}: {err:?}");
        }

        let err = engine
            .update_cart(&admin(), &id, UpdateCartRequest { items: items(&[("toner", 1)]), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        let err = engine
            .set_item_quantity(&admin(), &id, &ProductRef::from("paper"), 3)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition);
    }

    #[tokio::test]
    async fn test_usage_recorded_on_submission_only() {
        let engine = engine().await;
        engine
            .create_promotion(&admin(), category_draft("Papier -10%", "paper", 10))
            .await
            .unwrap();
        let alice = owner("alice");

        let settled = engine
            .create_cart(&alice, CreateCartRequest::new("alice").with_items(items(&[("paper", 3)])))
            .await
            .unwrap();
        let id = settled.cart.id.clone();

        engine
            .update_cart(
                &alice,
                &id,
                UpdateCartRequest {
                    items: items(&[("paper", 5), ("stapler", 2)]),
                    notes: Some("Livraison lundi".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(engine.usage.for_cart(&id).await.unwrap().is_empty());

        let submitted = engine.change_status(&alice, &id, CartStatus::Submitted, None).await.unwrap();
        // 5 × 10.00 − 10% + 2 × 4.50
        assert_eq!(submitted.cart.total, Money::from_cents(5400));
        assert_eq!(engine.usage.for_cart(&id).await.unwrap().len(), 1);

        // Back-office edits and later transitions do not record again.
        engine.set_item_quantity(&admin(), &id, &ProductRef::from("paper"), 6).await.unwrap();
        engine.change_status(&admin(), &id, CartStatus::Processed, None).await.unwrap();
        engine.change_status(&admin(), &id, CartStatus::Finished, None).await.unwrap();

        let records = engine.usage.for_cart(&id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cart_status, Some(CartStatus::Finished));
        assert_eq!(records[0].discount_amount, Money::from_cents(500));
    }

    #[tokio::test]
    async fn test_owner_edits_only_while_building() {
        let engine = engine().await;
        let alice = owner("alice");
        let settled = engine
            .create_cart(&alice, CreateCartRequest::new("alice").with_items(items(&[("paper", 1)])))
            .await
            .unwrap();
        let id = settled.cart.id.clone();
        engine.change_status(&alice, &id, CartStatus::Submitted, None).await.unwrap();

        let err = engine
            .set_item_quantity(&alice, &id, &ProductRef::from("paper"), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        // Administrators may, and the status stays put.
        let edited = engine
            .set_item_quantity(&admin(), &id, &ProductRef::from("paper"), 2)
            .await
            .unwrap();
        assert_eq!(edited.cart.status, CartStatus::Submitted);
        assert_eq!(edited.cart.total, Money::from_cents(2000));

        // But not down to nothing.
        let err = engine
            .set_item_quantity(&admin(), &id, &ProductRef::from("paper"), 0)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_stale_version_is_a_conflict() {
        let engine = engine().await;
        let alice = owner("alice");
        let settled = engine
            .create_cart(&alice, CreateCartRequest::new("alice").with_items(items(&[("paper", 1)])))
            .await
            .unwrap();
        let id = settled.cart.id.clone();
        assert_eq!(settled.cart.version, 0);

        let updated = engine
            .update_cart(
                &alice,
                &id,
                UpdateCartRequest {
                    items: items(&[("paper", 2)]),
                    expected_version: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.cart.version, 1);

        let err = engine
            .update_cart(
                &alice,
                &id,
                UpdateCartRequest {
                    items: items(&[("paper", 3)]),
                    expected_version: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ConcurrencyConflict { .. }));

        let err = engine
            .change_status(&alice, &id, CartStatus::Submitted, Some(0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConcurrencyConflict);
    }

    #[tokio::test]
    async fn test_unit_price_snapshot_survives_catalog_changes() {
        let engine = engine().await;
        let alice = owner("alice");
        let settled = engine
            .create_cart(&alice, CreateCartRequest::new("alice").with_items(items(&[("paper", 1)])))
            .await
            .unwrap();

        // Re-list the product at a new price.
        engine.catalog.delete_product(&ProductRef::from("paper")).await.unwrap();
        engine
            .catalog
            .insert_product(&ProductInfo {
                id: ProductRef::from("paper"),
                name: "paper".to_string(),
                price: Money::from_cents(1200),
                category_ref: Some(CategoryRef::from("paper")),
                brand_ref: None,
            })
            .await
            .unwrap();

        let updated = engine
            .set_item_quantity(&alice, &settled.cart.id, &ProductRef::from("paper"), 2)
            .await
            .unwrap();
        assert_eq!(updated.cart.items[0].unit_price, Money::from_cents(1000));
        assert_eq!(updated.cart.total, Money::from_cents(2000));
    }

    #[tokio::test]
    async fn test_vanished_product_is_flagged() {
        let engine = engine().await;
        let alice = owner("alice");
        let settled = engine
            .create_cart(
                &alice,
                CreateCartRequest::new("alice").with_items(items(&[("paper", 1), ("stapler", 2)])),
            )
            .await
            .unwrap();
        assert_eq!(settled.cart.total, Money::from_cents(1900));

        engine.catalog.delete_product(&ProductRef::from("stapler")).await.unwrap();

        let reread = engine.get_cart(&settled.cart.id).await.unwrap();
        let stapler = &reread.settlement.lines[1];
        assert!(stapler.missing_product);
        assert_eq!(stapler.net, Money::zero());
        assert_eq!(reread.settlement.grand_total, Money::from_cents(1000));
        assert_eq!(reread.settlement.missing_products(), vec![&ProductRef::from("stapler")]);
    }

    #[tokio::test]
    async fn test_set_item_quantity_lines() {
        let engine = engine().await;
        let alice = owner("alice");
        let id = engine
            .create_cart(&alice, CreateCartRequest::new("alice"))
            .await
            .unwrap()
            .cart
            .id;

        let added = engine
            .set_item_quantity(&alice, &id, &ProductRef::from("toner"), 2)
            .await
            .unwrap();
        assert_eq!(added.cart.total, Money::from_cents(5000));

        let removed = engine
            .set_item_quantity(&alice, &id, &ProductRef::from("toner"), 0)
            .await
            .unwrap();
        assert!(removed.cart.is_empty());

        let err = engine
            .set_item_quantity(&alice, &id, &ProductRef::from("toner"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { ref entity, .. } if entity == "Cart item"));

        let err = engine
            .set_item_quantity(&alice, &id, &ProductRef::from("unicorn"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { ref entity, .. } if entity == "Product"));

        let err = engine
            .set_item_quantity(&alice, &id, &ProductRef::from("paper"), -1)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = engine
            .set_item_quantity(&alice, &id, &ProductRef::from("paper"), 1000)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_empty_cart_cannot_be_submitted() {
        let engine = engine().await;
        let alice = owner("alice");
        let id = engine
            .create_cart(&alice, CreateCartRequest::new("alice"))
            .await
            .unwrap()
            .cart
            .id;

        let err = engine
            .change_status(&alice, &id, CartStatus::Submitted, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        // Cancelling an empty cart is fine.
        let cancelled = engine.change_status(&alice, &id, CartStatus::Cancelled, None).await.unwrap();
        assert_eq!(cancelled.cart.status, CartStatus::Cancelled);
        assert!(engine.get_active_cart(&UserRef::from("alice")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_owners_only_see_their_own_carts() {
        let engine = engine().await;
        let id = engine
            .create_cart(&owner("alice"), CreateCartRequest::new("alice").with_items(items(&[("paper", 1)])))
            .await
            .unwrap()
            .cart
            .id;

        let err = engine
            .change_status(&owner("bob"), &id, CartStatus::Cancelled, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));

        let err = engine
            .create_cart(&owner("bob"), CreateCartRequest::new("alice"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = engine
            .create_cart(&admin(), CreateCartRequest::new("zoe").with_items(items(&[("paper", 1)])))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { ref entity, .. } if entity == "User"));
    }

    #[tokio::test]
    async fn test_delete_is_admin_only() {
        let engine = engine().await;
        let id = engine
            .create_cart(&owner("alice"), CreateCartRequest::new("alice"))
            .await
            .unwrap()
            .cart
            .id;

        let err = engine.delete_cart(&owner("alice"), &id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        engine.delete_cart(&admin(), &id).await.unwrap();
        assert!(matches!(
            engine.get_cart(&id).await,
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            engine.delete_cart(&admin(), &id).await,
            Err(EngineError::NotFound { .. })
        ));
    }
}
