//! Chatbot Auth - authentication and access control for the chat platform
//!
//! # Modules
//!
//! - [`token`] - Signed identity tokens (HS512 JWT)
//! - [`credential`] - Peppered Argon2id password verification
//! - [`rate_limit`] - Fixed-window admission per `concern:identifier` key
//! - [`two_factor`] - TOTP codes and the pending 2FA handshake
//! - [`auth`] - Login / 2FA / refresh flows and the error taxonomy
//! - [`gateway`] - Request authenticator and HTTP surface
//! - [`account`] - Account model and stores (memory, PostgreSQL)

// Infrastructure
pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod store;

// Auth components
pub mod account;
pub mod auth;
pub mod credential;
pub mod gateway;
pub mod rate_limit;
pub mod token;
pub mod two_factor;

// Convenient re-exports at crate root
pub use auth::{AuthError, AuthErrorCode, AuthService, LoginOutcome, TokenPair};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use token::{AdminLevel, Identity, TokenCodec, TokenType, UserType};
