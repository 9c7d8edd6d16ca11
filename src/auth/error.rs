//! Authentication error taxonomy.
//!
//! Every failure surfaced to a client carries a stable numeric code, a
//! SCREAMING_CASE name and an HTTP status. Messages never include hash
//! parameters, key material or internal causes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use utoipa::ToSchema;

use crate::store::StoreError;
use crate::token::TokenError;
use crate::two_factor::TwoFactorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AuthErrorCode {
    /// 1001: Request body failed validation
    InvalidParameter = 1001,
    /// 1002: Code is not exactly 6 digits
    MalformedCode = 1002,
    /// 2001: Unknown account or wrong password
    InvalidCredentials = 2001,
    AccountLocked = 2002,
    RateLimited = 2003,
    /// 2004: Password accepted, TOTP code still needed
    TwoFactorRequired = 2004,
    InvalidCode = 2005,
    ExpiredOrUnknownHandshake = 2006,
    TokenExpired = 2007,
    TokenMalformed = 2008,
    TokenSignatureInvalid = 2009,
    /// 2010: No identity on a request that needs one
    Unauthenticated = 2010,
    Forbidden = 2011,
    TwoFactorNotEnabled = 2012,
    EmailNotVerified = 2013,
    Internal = 5000,
}

impl AuthErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::InvalidParameter => "INVALID_PARAMETER",
            Self::MalformedCode => "MALFORMED_CODE",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::RateLimited => "RATE_LIMITED",
            Self::TwoFactorRequired => "TWO_FACTOR_REQUIRED",
            Self::InvalidCode => "INVALID_CODE",
            Self::ExpiredOrUnknownHandshake => "EXPIRED_OR_UNKNOWN_HANDSHAKE",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenMalformed => "TOKEN_MALFORMED",
            Self::TokenSignatureInvalid => "TOKEN_SIGNATURE_INVALID",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::TwoFactorNotEnabled => "TWO_FACTOR_NOT_ENABLED",
            Self::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(self) -> StatusCode {
        match self {
            Self::InvalidParameter | Self::MalformedCode | Self::TwoFactorNotEnabled => {
                StatusCode::BAD_REQUEST
            }
            Self::AccountLocked => StatusCode::LOCKED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Forbidden | Self::EmailNotVerified => StatusCode::FORBIDDEN,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            Self::InvalidParameter => "Invalid request parameters",
            Self::MalformedCode => "Code must be exactly 6 digits",
            Self::InvalidCredentials => "Invalid username or password",
            Self::AccountLocked => {
                "Account is temporarily locked due to too many failed login attempts"
            }
            Self::RateLimited => "Too many requests, please try again later",
            Self::TwoFactorRequired => "Two-factor authentication required",
            Self::InvalidCode => "Invalid two-factor code",
            Self::ExpiredOrUnknownHandshake => {
                "Two-factor session expired, please log in again"
            }
            Self::TokenExpired => "Token has expired",
            Self::TokenMalformed => "Token is malformed",
            Self::TokenSignatureInvalid => "Token signature is invalid",
            Self::Unauthenticated => "Authentication required",
            Self::Forbidden => "Insufficient permissions for this operation",
            Self::TwoFactorNotEnabled => "Two-factor authentication is not set up",
            Self::EmailNotVerified => "Please verify your email address before logging in",
            Self::Internal => "Internal server error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthError {
    pub code: AuthErrorCode,
    pub message: String,
}

impl AuthError {
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_code(code: AuthErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Generic internal error. The cause is logged, never returned.
    pub fn internal(cause: impl fmt::Display) -> Self {
        tracing::error!(error = %cause, "Internal error in auth flow");
        Self::from_code(AuthErrorCode::Internal)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.name(), self.message)
    }
}

impl std::error::Error for AuthError {}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::from_code(AuthErrorCode::TokenExpired),
            TokenError::InvalidSignature => Self::from_code(AuthErrorCode::TokenSignatureInvalid),
            TokenError::Malformed(_) | TokenError::WrongType { .. } => {
                Self::from_code(AuthErrorCode::TokenMalformed)
            }
            TokenError::Encoding(cause) => Self::internal(cause),
        }
    }
}

impl From<TwoFactorError> for AuthError {
    fn from(err: TwoFactorError) -> Self {
        match err {
            TwoFactorError::InvalidCode => Self::from_code(AuthErrorCode::InvalidCode),
            TwoFactorError::FormatError => Self::from_code(AuthErrorCode::MalformedCode),
            TwoFactorError::ExpiredOrUnknown => {
                Self::from_code(AuthErrorCode::ExpiredOrUnknownHandshake)
            }
            TwoFactorError::Secret(cause) => Self::internal(cause),
            TwoFactorError::Store(cause) => Self::internal(cause),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::internal(err)
    }
}

/// JSON body for auth errors.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthErrorResponse {
    #[schema(example = 2001)]
    pub code: i32,
    #[schema(example = "INVALID_CREDENTIALS")]
    pub error: &'static str,
    #[schema(example = "Invalid username or password")]
    pub msg: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = AuthErrorResponse {
            code: self.code.code(),
            error: self.code.name(),
            msg: self.message,
        };
        (self.code.http_status(), Json(body)).into_response()
    }
}
