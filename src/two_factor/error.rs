use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum TwoFactorError {
    #[error("Code does not match")]
    InvalidCode,

    #[error("Code must be exactly 6 digits")]
    FormatError,

    #[error("Pending two-factor handshake expired or unknown")]
    ExpiredOrUnknown,

    #[error("Invalid TOTP secret: {0}")]
    Secret(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
