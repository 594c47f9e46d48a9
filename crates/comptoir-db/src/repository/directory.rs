//! # Directory Repository
//!
//! Read API over users and their companies. A user's company decides which
//! company-scoped promotions apply to their carts.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use comptoir_core::{CompanyInfo, CompanyRef, UserInfo, UserRef};

use crate::error::DbResult;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    company_ref: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct CompanyRow {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
}

/// Repository for users and companies.
#[derive(Debug, Clone)]
pub struct DirectoryRepository {
    pool: SqlitePool,
}

impl DirectoryRepository {
    /// Creates a new DirectoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DirectoryRepository { pool }
    }

    /// Gets a user.
    pub async fn user(&self, id: &UserRef) -> DbResult<Option<UserInfo>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, name, company_ref FROM users WHERE id = ?1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|r| UserInfo {
            id: UserRef(r.id),
            name: r.name,
            company_ref: r.company_ref.map(CompanyRef),
        }))
    }

    /// Gets a company.
    pub async fn company(&self, id: &CompanyRef) -> DbResult<Option<CompanyInfo>> {
        let row: Option<CompanyRow> =
            sqlx::query_as("SELECT id, name, created_at FROM companies WHERE id = ?1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|r| CompanyInfo {
            id: CompanyRef(r.id),
            name: r.name,
            created_at: r.created_at,
        }))
    }

    /// Inserts a user.
    pub async fn insert_user(&self, user: &UserInfo) -> DbResult<()> {
        debug!(id = %user.id, "Inserting user");

        sqlx::query("INSERT INTO users (id, name, company_ref, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(user.id.as_str())
            .bind(&user.name)
            .bind(user.company_ref.as_ref().map(|c| c.as_str()))
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Inserts a company.
    pub async fn insert_company(&self, company: &CompanyInfo) -> DbResult<()> {
        debug!(id = %company.id, "Inserting company");

        sqlx::query("INSERT INTO companies (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(company.id.as_str())
            .bind(&company.name)
            .bind(company.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Counts users.
    pub async fn count_users(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig, DbError};

    #[tokio::test]
    async fn test_users_and_companies() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let directory = db.directory();

        directory
            .insert_company(&CompanyInfo {
                id: CompanyRef::from("acme"),
                name: "Acme SARL".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        directory
            .insert_user(&UserInfo {
                id: UserRef::from("alice"),
                name: "Alice".to_string(),
                company_ref: Some(CompanyRef::from("acme")),
            })
            .await
            .unwrap();

        let alice = directory.user(&UserRef::from("alice")).await.unwrap().unwrap();
        assert_eq!(alice.company_ref, Some(CompanyRef::from("acme")));

        let acme = directory.company(&CompanyRef::from("acme")).await.unwrap().unwrap();
        assert_eq!(acme.name, "Acme SARL");

        assert!(directory.user(&UserRef::from("bob")).await.unwrap().is_none());
        assert_eq!(directory.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_company_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let result = db
            .directory()
            .insert_user(&UserInfo {
                id: UserRef::from("bob"),
                name: "Bob".to_string(),
                company_ref: Some(CompanyRef::from("nowhere")),
            })
            .await;
        assert!(matches!(result, Err(DbError::ForeignKeyViolation { .. })));
    }
}
