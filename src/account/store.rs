use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use super::models::{Account, LoginFailure, NewAccount};
use crate::config::{LockoutConfig, bounded_secs};
use crate::store::StoreError;
use crate::token::UserType;

/// Account persistence needed by the auth core.
///
/// Lock bookkeeping lives here: `record_login_failure` increments the
/// attempt counter and locks once it reaches the configured maximum,
/// `record_login_success` clears both.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_username(
        &self,
        user_type: UserType,
        username: &str,
    ) -> Result<Option<Account>, StoreError>;

    async fn find_by_id(&self, user_type: UserType, id: i64)
    -> Result<Option<Account>, StoreError>;

    async fn create(&self, account: NewAccount) -> Result<Account, StoreError>;

    async fn record_login_failure(
        &self,
        user_type: UserType,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<LoginFailure, StoreError>;

    async fn record_login_success(
        &self,
        user_type: UserType,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Store an enrollment secret without enabling 2FA (admins only).
    async fn save_two_factor_secret(&self, admin_id: i64, secret: &str) -> Result<(), StoreError>;

    async fn set_two_factor_enabled(&self, admin_id: i64, enabled: bool) -> Result<(), StoreError>;

    /// Disable 2FA and drop the secret.
    async fn clear_two_factor(&self, admin_id: i64) -> Result<(), StoreError>;
}

/// Lock transition shared by the store implementations.
pub(crate) fn apply_failure(
    attempts: u32,
    lockout: &LockoutConfig,
    now: DateTime<Utc>,
) -> LoginFailure {
    let attempts = attempts.saturating_add(1);
    if attempts >= lockout.max_attempts {
        LoginFailure {
            attempts: 0,
            locked_until: Some(now + bounded_secs(lockout.lock_secs)),
        }
    } else {
        LoginFailure {
            attempts,
            locked_until: None,
        }
    }
}

/// In-process account store, used when no database is configured and in tests.
pub struct MemoryAccountStore {
    accounts: DashMap<(UserType, i64), Account>,
    by_username: DashMap<(UserType, String), i64>,
    next_id: AtomicI64,
    lockout: LockoutConfig,
}

impl MemoryAccountStore {
    pub fn new(lockout: LockoutConfig) -> Self {
        Self {
            accounts: DashMap::new(),
            by_username: DashMap::new(),
            next_id: AtomicI64::new(1),
            lockout,
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Apply `f` to one account. Missing accounts are `NotFound`.
    fn update<T>(
        &self,
        user_type: UserType,
        id: i64,
        f: impl FnOnce(&mut Account) -> T,
    ) -> Result<T, StoreError> {
        let mut entry = self
            .accounts
            .get_mut(&(user_type, id))
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", user_type, id)))?;
        Ok(f(entry.value_mut()))
    }

    /// Mark a user account's email as verified.
    pub fn mark_email_verified(&self, id: i64) -> Result<(), StoreError> {
        self.update(UserType::User, id, |a| a.email_verified = true)
    }

    pub fn set_active(&self, user_type: UserType, id: i64, active: bool) -> Result<(), StoreError> {
        self.update(user_type, id, |a| a.is_active = active)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_username(
        &self,
        user_type: UserType,
        username: &str,
    ) -> Result<Option<Account>, StoreError> {
        let Some(id) = self
            .by_username
            .get(&(user_type, username.to_string()))
            .map(|e| *e.value())
        else {
            return Ok(None);
        };
        self.find_by_id(user_type, id).await
    }

    async fn find_by_id(
        &self,
        user_type: UserType,
        id: i64,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .get(&(user_type, id))
            .map(|e| e.value().clone()))
    }

    async fn create(&self, new: NewAccount) -> Result<Account, StoreError> {
        use dashmap::mapref::entry::Entry;

        let id = match self.by_username.entry((new.user_type, new.username.clone())) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict(format!(
                    "{} '{}' already exists",
                    new.user_type, new.username
                )));
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                slot.insert(id);
                id
            }
        };

        let account = Account {
            id,
            username: new.username,
            email: new.email,
            user_type: new.user_type,
            admin_level: new.admin_level,
            password_hash: new.password_hash,
            salt: new.salt,
            is_active: true,
            email_verified: new.email_verified,
            login_attempts: 0,
            locked_until: None,
            last_login: None,
            two_factor_enabled: false,
            two_factor_secret: None,
            created_at: Utc::now(),
        };
        self.accounts.insert((account.user_type, id), account.clone());
        Ok(account)
    }

    async fn record_login_failure(
        &self,
        user_type: UserType,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<LoginFailure, StoreError> {
        let lockout = self.lockout;
        self.update(user_type, id, |account| {
            let failure = apply_failure(account.login_attempts, &lockout, now);
            account.login_attempts = failure.attempts;
            if failure.locked_until.is_some() {
                account.locked_until = failure.locked_until;
            }
            failure
        })
    }

    async fn record_login_success(
        &self,
        user_type: UserType,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(user_type, id, |account| {
            account.login_attempts = 0;
            account.locked_until = None;
            account.last_login = Some(now);
        })
    }

    async fn save_two_factor_secret(&self, admin_id: i64, secret: &str) -> Result<(), StoreError> {
        self.update(UserType::Admin, admin_id, |account| {
            account.two_factor_secret = Some(secret.to_string());
            account.two_factor_enabled = false;
        })
    }

    async fn set_two_factor_enabled(&self, admin_id: i64, enabled: bool) -> Result<(), StoreError> {
        self.update(UserType::Admin, admin_id, |account| {
            account.two_factor_enabled = enabled;
        })
    }

    async fn clear_two_factor(&self, admin_id: i64) -> Result<(), StoreError> {
        self.update(UserType::Admin, admin_id, |account| {
            account.two_factor_enabled = false;
            account.two_factor_secret = None;
        })
    }
}
