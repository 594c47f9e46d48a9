//! # Cart Statistics
//!
//! Bucketing and rankings over the carts created in a period.
//!
//! ## Buckets
//! ```text
//! 24h   ─► 24 hourly buckets, the last one is the current hour
//! 7d    ─►  7 daily buckets (UTC days), the last one is today
//! 14d   ─► 14 daily buckets
//! 30d   ─► 30 daily buckets
//! 365d  ─► 365 daily buckets
//!
//!   window_start = start of first bucket          window_end = now
//!   │                                             │
//!   ▼                                             ▼
//!   [ d-6 ][ d-5 ][ d-4 ][ d-3 ][ d-2 ][ d-1 ][ today ]
//!      0      0      0      0      1      0      1       ◄ zero-filled
//! ```
//!
//! The caller loads candidate rows (see `comptoir-db`'s stats repository) and
//! passes the clock in; everything here is pure.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{CartId, CartStatus, CompanyRef, UserRef};

/// Number of entries in each ranking unless configured otherwise.
pub const DEFAULT_TOP_N: usize = 5;

// =============================================================================
// Period & Filter
// =============================================================================

/// Reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatsPeriod {
    #[serde(rename = "24h")]
    Last24Hours,
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "14d")]
    Last14Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "365d")]
    Last365Days,
}

impl StatsPeriod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            StatsPeriod::Last24Hours => "24h",
            StatsPeriod::Last7Days => "7d",
            StatsPeriod::Last14Days => "14d",
            StatsPeriod::Last30Days => "30d",
            StatsPeriod::Last365Days => "365d",
        }
    }

    /// Number of buckets emitted.
    pub const fn bucket_count(&self) -> usize {
        match self {
            StatsPeriod::Last24Hours => 24,
            StatsPeriod::Last7Days => 7,
            StatsPeriod::Last14Days => 14,
            StatsPeriod::Last30Days => 30,
            StatsPeriod::Last365Days => 365,
        }
    }

    /// Width of one bucket.
    pub fn bucket_width(&self) -> Duration {
        match self {
            StatsPeriod::Last24Hours => Duration::hours(1),
            _ => Duration::days(1),
        }
    }

    /// Start of the bucket containing `now`.
    fn current_bucket_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::default()));
        match self {
            StatsPeriod::Last24Hours => midnight + Duration::hours(i64::from(now.hour())),
            _ => midnight,
        }
    }

    /// Start of the first bucket, which is also the window start.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let back = self.bucket_count() as i32 - 1;
        self.current_bucket_start(now) - self.bucket_width() * back
    }

    /// Start of every bucket, oldest first.
    pub fn bucket_starts(&self, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let first = self.window_start(now);
        let width = self.bucket_width();
        (0..self.bucket_count() as i32)
            .map(|i| first + width * i)
            .collect()
    }

    /// Index of the bucket containing `at`, if it falls inside the window.
    fn bucket_index(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> Option<usize> {
        let first = self.window_start(now);
        if at < first || at > now {
            return None;
        }
        let elapsed = at - first;
        let index = match self {
            StatsPeriod::Last24Hours => elapsed.num_hours(),
            _ => elapsed.num_days(),
        };
        usize::try_from(index)
            .ok()
            .filter(|i| *i < self.bucket_count())
    }
}

impl Default for StatsPeriod {
    fn default() -> Self {
        StatsPeriod::Last7Days
    }
}

impl fmt::Display for StatsPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatsPeriod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "24h" => Ok(StatsPeriod::Last24Hours),
            "7d" => Ok(StatsPeriod::Last7Days),
            "14d" => Ok(StatsPeriod::Last14Days),
            "30d" => Ok(StatsPeriod::Last30Days),
            "365d" => Ok(StatsPeriod::Last365Days),
            other => Err(ValidationError::InvalidFormat {
                field: "period".to_string(),
                reason: format!("expected 24h, 7d, 14d, 30d or 365d, got '{}'", other),
            }),
        }
    }
}

/// Which carts are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    All,
    Only(CartStatus),
}

impl StatusFilter {
    #[inline]
    pub fn matches(&self, status: CartStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }

    /// The single status, if filtering on one.
    pub fn status(&self) -> Option<CartStatus> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Only(status) => Some(*status),
        }
    }
}

impl Default for StatusFilter {
    fn default() -> Self {
        StatusFilter::All
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => f.write_str("all"),
            StatusFilter::Only(status) => write!(f, "{}", status),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        Ok(StatusFilter::Only(s.parse()?))
    }
}

// =============================================================================
// Input & Output
// =============================================================================

/// One cart as loaded for statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRow {
    pub cart_id: CartId,
    pub owner_ref: UserRef,
    pub owner_name: Option<String>,
    pub company_ref: Option<CompanyRef>,
    pub company_name: Option<String>,
    pub status: CartStatus,
    pub total: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub count: u64,
    pub total: Money,
}

/// A company or client in a ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranked {
    pub key: String,
    pub label: String,
    pub count: u64,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_carts: u64,
    pub total_amount: Money,
    pub average_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub period: StatsPeriod,
    pub status_filter: StatusFilter,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub summary: StatsSummary,
    pub buckets: Vec<Bucket>,
    pub top_companies: Vec<Ranked>,
    pub top_clients: Vec<Ranked>,
}

// =============================================================================
// Aggregation
// =============================================================================

#[derive(Default)]
struct Tally {
    label: String,
    count: u64,
    total: Money,
}

fn ranking(tallies: HashMap<String, Tally>, top_n: usize) -> Vec<Ranked> {
    let mut ranked: Vec<Ranked> = tallies
        .into_iter()
        .map(|(key, t)| Ranked {
            key,
            label: t.label,
            count: t.count,
            total: t.total,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.key.cmp(&b.key))
    });
    ranked.truncate(top_n);
    ranked
}

/// Aggregates cart rows into a report.
///
/// Rows outside the window or not matching the filter are ignored, so the
/// caller may over-fetch.
pub fn aggregate(
    period: StatsPeriod,
    status_filter: StatusFilter,
    rows: &[StatsRow],
    now: DateTime<Utc>,
    top_n: usize,
) -> StatsReport {
    let mut buckets: Vec<Bucket> = period
        .bucket_starts(now)
        .into_iter()
        .map(|start| Bucket {
            start,
            count: 0,
            total: Money::zero(),
        })
        .collect();

    let mut companies: HashMap<String, Tally> = HashMap::new();
    let mut clients: HashMap<String, Tally> = HashMap::new();
    let mut total_carts = 0u64;
    let mut total_amount = Money::zero();

    for row in rows.iter().filter(|r| status_filter.matches(r.status)) {
        let Some(index) = period.bucket_index(row.created_at, now) else {
            continue;
        };

        let bucket = &mut buckets[index];
        bucket.count += 1;
        bucket.total += row.total;
        total_carts += 1;
        total_amount += row.total;

        let client = clients.entry(row.owner_ref.to_string()).or_default();
        client.label = row
            .owner_name
            .clone()
            .unwrap_or_else(|| row.owner_ref.to_string());
        client.count += 1;
        client.total += row.total;

        if let Some(company_ref) = &row.company_ref {
            let company = companies.entry(company_ref.to_string()).or_default();
            company.label = row
                .company_name
                .clone()
                .unwrap_or_else(|| company_ref.to_string());
            company.count += 1;
            company.total += row.total;
        }
    }

    StatsReport {
        period,
        status_filter,
        window_start: period.window_start(now),
        window_end: now,
        summary: StatsSummary {
            total_carts,
            total_amount,
            average_amount: total_amount.divided_by(total_carts),
        },
        buckets,
        top_companies: ranking(companies, top_n),
        top_clients: ranking(clients, top_n),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
