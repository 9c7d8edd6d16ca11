//! Two-factor gate: TOTP codes and single-use pending handshakes.

pub mod error;
pub mod gate;
pub mod handshake;
pub mod totp;

pub use error::TwoFactorError;
pub use gate::TwoFactorGate;
pub use handshake::{HandshakeStore, MemoryHandshakeStore, PendingHandshake};
pub use totp::{SetupSecret, TotpVerifier};
