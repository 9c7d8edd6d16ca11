//! Signed identity tokens (HS512).

pub mod claims;
pub mod codec;
pub mod error;

pub use claims::{AdminLevel, Identity, IdentityClaims, TokenType, UserType};
pub use codec::{IssuedToken, TokenCodec};
pub use error::TokenError;
