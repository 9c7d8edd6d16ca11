//! Identity claims embedded in signed tokens.
//!
//! One record shape serves both account kinds. `adminLevel` is present only
//! on admin claims; [`Identity::is_consistent`] enforces that rule on every
//! issue and verify.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Account kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    User,
    Admin,
}

impl UserType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Privilege level of an admin account (1 = Admin, 2 = Moderator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum AdminLevel {
    Admin = 1,
    Moderator = 2,
}

impl AdminLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for AdminLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Admin),
            2 => Ok(Self::Moderator),
            other => Err(format!("unknown admin level {}", other)),
        }
    }
}

impl From<AdminLevel> for u8 {
    fn from(level: AdminLevel) -> Self {
        level.as_u8()
    }
}

/// Token type tag. Access and refresh tokens differ only in lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// The authenticated party behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Username
    pub subject: String,
    pub user_id: i64,
    pub user_type: UserType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_level: Option<AdminLevel>,
}

impl Identity {
    pub fn user(subject: impl Into<String>, user_id: i64) -> Self {
        Self {
            subject: subject.into(),
            user_id,
            user_type: UserType::User,
            admin_level: None,
        }
    }

    pub fn admin(subject: impl Into<String>, user_id: i64, level: AdminLevel) -> Self {
        Self {
            subject: subject.into(),
            user_id,
            user_type: UserType::Admin,
            admin_level: Some(level),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }

    /// `adminLevel` is required for admins and forbidden for users.
    pub fn is_consistent(&self) -> bool {
        match self.user_type {
            UserType::User => self.admin_level.is_none(),
            UserType::Admin => self.admin_level.is_some(),
        }
    }
}

/// Wire form of a token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaims {
    pub sub: String,
    pub user_id: i64,
    pub user_type: UserType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_level: Option<AdminLevel>,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl IdentityClaims {
    pub fn new(
        identity: &Identity,
        token_type: TokenType,
        issuer: &str,
        issued_at: i64,
        expires_at: i64,
    ) -> Self {
        Self {
            sub: identity.subject.clone(),
            user_id: identity.user_id,
            user_type: identity.user_type,
            admin_level: identity.admin_level,
            token_type,
            iat: issued_at,
            exp: expires_at,
            iss: issuer.to_string(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            subject: self.sub.clone(),
            user_id: self.user_id,
            user_type: self.user_type,
            admin_level: self.admin_level,
        }
    }
}
