//! Request/response types for the auth HTTP surface
//!
//! - `ApiResponse<T>`: unified response envelope
//! - request DTOs, validated through [`ValidatedJson`]
//! - response DTOs

use axum::{
    Json,
    extract::{FromRequest, Request},
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::{AuthError, AuthErrorCode, PendingTwoFactor, TokenPair, TwoFactorStatus};
use crate::token::{AdminLevel, Identity, UserType};
use crate::two_factor::SetupSecret;

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Response envelope: `code` 0 is success, anything else is a status the
/// client must act on.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    #[schema(example = 0)]
    pub code: i32,
    #[schema(example = "ok")]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn with_code(code: i32, msg: impl Into<String>, data: T) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: Some(data),
        }
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 64))]
    #[schema(example = "admin")]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    #[schema(example = "password123")]
    pub password: String,
    #[schema(example = "admin")]
    pub user_type: UserType,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyLoginRequest {
    #[validate(length(min = 1, max = 64))]
    #[schema(example = "admin")]
    pub username: String,
    /// 6-digit TOTP code
    #[schema(example = "123456")]
    pub code: String,
    #[validate(length(min = 1, max = 128))]
    pub temp_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CodeRequest {
    /// 6-digit TOTP code
    #[schema(example = "123456")]
    pub code: String,
}

/// JSON body extractor that also runs `validator` rules.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            AuthError::new(
                AuthErrorCode::InvalidParameter,
                format!("Invalid JSON: {}", e.body_text()),
            )
        })?;
        value.validate().map_err(|e| {
            AuthError::new(AuthErrorCode::InvalidParameter, e.to_string())
        })?;
        Ok(Self(value))
    }
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Account summary returned with tokens and by `/me`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    #[schema(example = 1)]
    pub user_id: i64,
    #[schema(example = "admin")]
    pub username: String,
    pub user_type: UserType,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<u8>, example = 1)]
    pub admin_level: Option<AdminLevel>,
}

impl From<&Identity> for UserSummary {
    fn from(identity: &Identity) -> Self {
        Self {
            user_id: identity.user_id,
            username: identity.subject.clone(),
            user_type: identity.user_type,
            admin_level: identity.admin_level,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    #[schema(example = 900)]
    pub expires_in: i64,
    pub user: UserSummary,
}

impl From<TokenPair> for AuthResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            user: UserSummary::from(&pair.identity),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
            expires_in: pair.expires_in,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorRequiredResponse {
    #[schema(example = "Two-factor authentication required")]
    pub message: String,
    pub username: String,
    pub requires_two_factor: bool,
    pub temp_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<PendingTwoFactor> for TwoFactorRequiredResponse {
    fn from(pending: PendingTwoFactor) -> Self {
        Self {
            message: "Two-factor authentication required".to_string(),
            username: pending.username,
            requires_two_factor: true,
            temp_token: pending.temp_token,
            expires_at: pending.expires_at,
        }
    }
}

/// Login result: tokens, or a pending 2FA handshake.
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens(AuthResponse),
    TwoFactorRequired(TwoFactorRequiredResponse),
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorSetupResponse {
    /// Base32 shared secret
    pub secret: String,
    /// `otpauth://` provisioning URI
    pub qr_code_url: String,
    pub manual_entry_key: String,
}

impl From<SetupSecret> for TwoFactorSetupResponse {
    fn from(setup: SetupSecret) -> Self {
        Self {
            secret: setup.secret,
            qr_code_url: setup.qr_code_url,
            manual_entry_key: setup.manual_entry_key,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorStatusResponse {
    pub enabled: bool,
    pub setup_pending: bool,
}

impl From<TwoFactorStatus> for TwoFactorStatusResponse {
    fn from(status: TwoFactorStatus) -> Self {
        Self {
            enabled: status.enabled,
            setup_pending: status.setup_pending,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Two-factor authentication enabled")]
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: &'static str,
    #[schema(example = "0.1.0")]
    pub version: &'static str,
    /// `None` when no database is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<bool>,
    #[schema(example = 1703494800000_i64)]
    pub timestamp_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_validation() {
        let ok: LoginRequest = serde_json::from_str(
            r#"{"username":"alice","password":"pw","userType":"user"}"#,
        )
        .unwrap();
        assert!(ok.validate().is_ok());

        let empty: LoginRequest =
            serde_json::from_str(r#"{"username":"","password":"pw","userType":"admin"}"#)
                .unwrap();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_pending_response_shape() {
        let body = TwoFactorRequiredResponse::from(PendingTwoFactor {
            username: "root".into(),
            temp_token: "tmp".into(),
            expires_at: Utc::now(),
        });
        let json = serde_json::to_value(LoginResponse::TwoFactorRequired(body)).unwrap();
        assert_eq!(json["requiresTwoFactor"], true);
        assert_eq!(json["tempToken"], "tmp");
        assert!(json.get("accessToken").is_none());
    }

    #[test]
    fn test_user_summary_omits_level_for_users() {
        let summary = UserSummary::from(&Identity::user("alice", 3));
        let json = serde_json::to_value(summary).unwrap();
        assert!(json.get("adminLevel").is_none());
        assert_eq!(json["userType"], "user");
    }
}
