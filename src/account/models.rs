//! Account records as the auth core sees them

use chrono::{DateTime, Utc};
use std::fmt;

use crate::token::{AdminLevel, Identity, UserType};

/// A user or admin account. Users and admins live in separate id spaces,
/// so an account is addressed by `(user_type, id)`.
#[derive(Clone)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub user_type: UserType,
    /// Set only for admins
    pub admin_level: Option<AdminLevel>,
    /// PHC string
    pub password_hash: String,
    pub salt: String,
    pub is_active: bool,
    pub email_verified: bool,
    pub login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub two_factor_enabled: bool,
    /// Base32 TOTP secret
    pub two_factor_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// 2FA applies to admins only, and only once a secret is enrolled.
    pub fn requires_two_factor(&self) -> bool {
        self.user_type == UserType::Admin
            && self.two_factor_enabled
            && self.two_factor_secret.is_some()
    }

    pub fn identity(&self) -> Identity {
        match (self.user_type, self.admin_level) {
            (UserType::Admin, Some(level)) => Identity::admin(&self.username, self.id, level),
            // admin rows always carry a level; fall back to the lowest
            (UserType::Admin, None) => {
                Identity::admin(&self.username, self.id, AdminLevel::Moderator)
            }
            (UserType::User, _) => Identity::user(&self.username, self.id),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("user_type", &self.user_type)
            .field("admin_level", &self.admin_level)
            .field("is_active", &self.is_active)
            .field("email_verified", &self.email_verified)
            .field("login_attempts", &self.login_attempts)
            .field("locked_until", &self.locked_until)
            .field("two_factor_enabled", &self.two_factor_enabled)
            .finish_non_exhaustive()
    }
}

/// Input for account creation.
#[derive(Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub user_type: UserType,
    pub admin_level: Option<AdminLevel>,
    pub password_hash: String,
    pub salt: String,
    pub email_verified: bool,
}

/// Outcome of recording a failed login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginFailure {
    pub attempts: u32,
    /// Set when this failure locked the account
    pub locked_until: Option<DateTime<Utc>>,
}
