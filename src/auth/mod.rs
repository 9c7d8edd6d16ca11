//! Authentication orchestration and error taxonomy

pub mod error;
pub mod service;

pub use error::{AuthError, AuthErrorCode, AuthErrorResponse};
pub use service::{AuthService, LoginOutcome, PendingTwoFactor, TokenPair, TwoFactorStatus};
