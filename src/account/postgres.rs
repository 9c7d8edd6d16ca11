//! PostgreSQL account store over the `users` and `admins` tables

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use std::sync::Arc;

use super::models::{Account, LoginFailure, NewAccount};
use super::store::AccountStore;
use crate::config::{LockoutConfig, bounded_secs};
use crate::db::{Database, SafeRow};
use crate::store::StoreError;
use crate::token::{AdminLevel, UserType};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id              BIGSERIAL PRIMARY KEY,
        username        VARCHAR(64) NOT NULL UNIQUE,
        email           VARCHAR(255) NOT NULL,
        password_hash   TEXT NOT NULL,
        salt            VARCHAR(64) NOT NULL,
        is_active       BOOLEAN NOT NULL DEFAULT TRUE,
        email_verified  BOOLEAN NOT NULL DEFAULT FALSE,
        login_attempts  INTEGER NOT NULL DEFAULT 0,
        locked_until    TIMESTAMPTZ,
        last_login      TIMESTAMPTZ,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS admins (
        id                  BIGSERIAL PRIMARY KEY,
        username            VARCHAR(64) NOT NULL UNIQUE,
        email               VARCHAR(255) NOT NULL,
        password_hash       TEXT NOT NULL,
        salt                VARCHAR(64) NOT NULL,
        level               SMALLINT NOT NULL CHECK (level IN (1, 2)),
        is_active           BOOLEAN NOT NULL DEFAULT TRUE,
        login_attempts      INTEGER NOT NULL DEFAULT 0,
        locked_until        TIMESTAMPTZ,
        last_login          TIMESTAMPTZ,
        two_factor_enabled  BOOLEAN NOT NULL DEFAULT FALSE,
        two_factor_secret   VARCHAR(64),
        created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
];

const USER_SELECT: &str = "SELECT id, username, email, password_hash, salt, is_active, \
     email_verified, login_attempts, locked_until, last_login, created_at, \
     NULL::SMALLINT AS level, FALSE AS two_factor_enabled, NULL::VARCHAR AS two_factor_secret \
     FROM users";

const ADMIN_SELECT: &str = "SELECT id, username, email, password_hash, salt, is_active, \
     TRUE AS email_verified, login_attempts, locked_until, last_login, created_at, \
     level, two_factor_enabled, two_factor_secret \
     FROM admins";

fn table(user_type: UserType) -> &'static str {
    match user_type {
        UserType::User => "users",
        UserType::Admin => "admins",
    }
}

fn select(user_type: UserType) -> &'static str {
    match user_type {
        UserType::User => USER_SELECT,
        UserType::Admin => ADMIN_SELECT,
    }
}

pub struct PgAccountStore {
    db: Arc<Database>,
    lockout: LockoutConfig,
}

impl PgAccountStore {
    pub fn new(db: Arc<Database>, lockout: LockoutConfig) -> Self {
        Self { db, lockout }
    }

    /// Create the account tables if missing.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(self.db.pool()).await?;
        }
        tracing::info!("Account schema ready");
        Ok(())
    }

    fn row_to_account(row: &PgRow, user_type: UserType) -> Result<Account, StoreError> {
        let corrupt = |column: &str| StoreError::Corrupt(format!("{}.{}", table(user_type), column));

        let admin_level = match user_type {
            UserType::User => None,
            UserType::Admin => {
                let raw: i16 = row.try_get_log("level").ok_or_else(|| corrupt("level"))?;
                let level = u8::try_from(raw)
                    .ok()
                    .and_then(|v| AdminLevel::try_from(v).ok())
                    .ok_or_else(|| corrupt("level"))?;
                Some(level)
            }
        };
        let attempts: i32 = row
            .try_get_log("login_attempts")
            .ok_or_else(|| corrupt("login_attempts"))?;

        Ok(Account {
            id: row.try_get_log("id").ok_or_else(|| corrupt("id"))?,
            username: row.try_get_log("username").ok_or_else(|| corrupt("username"))?,
            email: row.try_get_log("email").ok_or_else(|| corrupt("email"))?,
            user_type,
            admin_level,
            password_hash: row
                .try_get_log("password_hash")
                .ok_or_else(|| corrupt("password_hash"))?,
            salt: row.try_get_log("salt").ok_or_else(|| corrupt("salt"))?,
            is_active: row.try_get_log("is_active").ok_or_else(|| corrupt("is_active"))?,
            email_verified: row
                .try_get_log("email_verified")
                .ok_or_else(|| corrupt("email_verified"))?,
            login_attempts: u32::try_from(attempts).unwrap_or(0),
            locked_until: row.try_get_log("locked_until").flatten(),
            last_login: row.try_get_log("last_login").flatten(),
            two_factor_enabled: row
                .try_get_log("two_factor_enabled")
                .ok_or_else(|| corrupt("two_factor_enabled"))?,
            two_factor_secret: row.try_get_log("two_factor_secret").flatten(),
            created_at: row.try_get_log("created_at").ok_or_else(|| corrupt("created_at"))?,
        })
    }

    async fn update_admin(&self, sql: &str, admin_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query(sql).bind(admin_id).execute(self.db.pool()).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("admin {}", admin_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_username(
        &self,
        user_type: UserType,
        username: &str,
    ) -> Result<Option<Account>, StoreError> {
        let sql = format!("{} WHERE username = $1", select(user_type));
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(|r| Self::row_to_account(&r, user_type)).transpose()
    }

    async fn find_by_id(
        &self,
        user_type: UserType,
        id: i64,
    ) -> Result<Option<Account>, StoreError> {
        let sql = format!("{} WHERE id = $1", select(user_type));
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(|r| Self::row_to_account(&r, user_type)).transpose()
    }

    async fn create(&self, new: NewAccount) -> Result<Account, StoreError> {
        let result = match new.user_type {
            UserType::User => {
                sqlx::query(
                    r#"INSERT INTO users (username, email, password_hash, salt, email_verified)
                       VALUES ($1, $2, $3, $4, $5) RETURNING id"#,
                )
                .bind(&new.username)
                .bind(&new.email)
                .bind(&new.password_hash)
                .bind(&new.salt)
                .bind(new.email_verified)
                .fetch_one(self.db.pool())
                .await
            }
            UserType::Admin => {
                let level = new
                    .admin_level
                    .ok_or_else(|| StoreError::Corrupt("admin without level".into()))?;
                sqlx::query(
                    r#"INSERT INTO admins (username, email, password_hash, salt, level)
                       VALUES ($1, $2, $3, $4, $5) RETURNING id"#,
                )
                .bind(&new.username)
                .bind(&new.email)
                .bind(&new.password_hash)
                .bind(&new.salt)
                .bind(i16::from(level.as_u8()))
                .fetch_one(self.db.pool())
                .await
            }
        };

        let row = match result {
            Ok(row) => row,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(StoreError::Conflict(format!(
                    "{} '{}' already exists",
                    new.user_type, new.username
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let id: i64 = row
            .try_get_log("id")
            .ok_or_else(|| StoreError::Corrupt("id".into()))?;

        self.find_by_id(new.user_type, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", new.user_type, id)))
    }

    async fn record_login_failure(
        &self,
        user_type: UserType,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<LoginFailure, StoreError> {
        // RHS column references see the pre-update row
        let sql = format!(
            r#"UPDATE {} SET
                 login_attempts = CASE WHEN login_attempts + 1 >= $2 THEN 0 ELSE login_attempts + 1 END,
                 locked_until = CASE WHEN login_attempts + 1 >= $2 THEN $3 ELSE locked_until END
               WHERE id = $1
               RETURNING login_attempts, locked_until"#,
            table(user_type)
        );
        let max_attempts = i32::try_from(self.lockout.max_attempts).unwrap_or(i32::MAX);
        let lock_until = now + bounded_secs(self.lockout.lock_secs);

        let row = sqlx::query(&sql)
            .bind(id)
            .bind(max_attempts)
            .bind(lock_until)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", user_type, id)))?;

        let attempts: i32 = row
            .try_get_log("login_attempts")
            .ok_or_else(|| StoreError::Corrupt("login_attempts".into()))?;
        let locked_until: Option<DateTime<Utc>> = row.try_get_log("locked_until").flatten();

        Ok(LoginFailure {
            attempts: u32::try_from(attempts).unwrap_or(0),
            locked_until: if attempts == 0 { locked_until } else { None },
        })
    }

    async fn record_login_success(
        &self,
        user_type: UserType,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET login_attempts = 0, locked_until = NULL, last_login = $2 WHERE id = $1",
            table(user_type)
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(now)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn save_two_factor_secret(&self, admin_id: i64, secret: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE admins SET two_factor_secret = $2, two_factor_enabled = FALSE WHERE id = $1",
        )
        .bind(admin_id)
        .bind(secret)
        .execute(self.db.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("admin {}", admin_id)));
        }
        Ok(())
    }

    async fn set_two_factor_enabled(&self, admin_id: i64, enabled: bool) -> Result<(), StoreError> {
        let sql = if enabled {
            "UPDATE admins SET two_factor_enabled = TRUE WHERE id = $1"
        } else {
            "UPDATE admins SET two_factor_enabled = FALSE WHERE id = $1"
        };
        self.update_admin(sql, admin_id).await
    }

    async fn clear_two_factor(&self, admin_id: i64) -> Result<(), StoreError> {
        self.update_admin(
            "UPDATE admins SET two_factor_enabled = FALSE, two_factor_secret = NULL WHERE id = $1",
            admin_id,
        )
        .await
    }
}
