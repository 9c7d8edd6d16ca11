use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Duration;
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::Arc;

use super::error::TwoFactorError;
use super::handshake::{HandshakeStore, PendingHandshake};
use super::totp::TotpVerifier;
use crate::clock::Clock;
use crate::config::{TwoFactorConfig, bounded_secs};

const TEMP_TOKEN_BYTES: usize = 32;

/// TOTP checks plus the pending-handshake lifecycle.
pub struct TwoFactorGate {
    totp: TotpVerifier,
    handshakes: Arc<dyn HandshakeStore>,
    handshake_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TwoFactorGate {
    pub fn new(
        config: &TwoFactorConfig,
        handshakes: Arc<dyn HandshakeStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            totp: TotpVerifier::new(config, clock.clone()),
            handshakes,
            handshake_ttl: bounded_secs(config.handshake_ttl_secs),
            clock,
        }
    }

    pub fn totp(&self) -> &TotpVerifier {
        &self.totp
    }

    /// Store a new handshake for `username` and return it.
    pub async fn create_pending_handshake(
        &self,
        username: &str,
    ) -> Result<PendingHandshake, TwoFactorError> {
        let mut bytes = [0u8; TEMP_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);

        let now = self.clock.now();
        let handshake = PendingHandshake {
            temp_token: URL_SAFE_NO_PAD.encode(bytes),
            username: username.to_string(),
            created_at: now,
            expires_at: now + self.handshake_ttl,
        };
        self.handshakes.insert(handshake.clone()).await?;

        tracing::debug!(username = %username, expires_at = %handshake.expires_at, "Pending 2FA handshake created");
        Ok(handshake)
    }

    /// Look up a live handshake without consuming it. An expired entry is
    /// removed and reported as unknown.
    pub async fn peek_pending_handshake(
        &self,
        temp_token: &str,
    ) -> Result<PendingHandshake, TwoFactorError> {
        let handshake = self
            .handshakes
            .peek(temp_token)
            .await?
            .ok_or(TwoFactorError::ExpiredOrUnknown)?;

        if handshake.is_expired(self.clock.now()) {
            self.handshakes.take(temp_token).await?;
            return Err(TwoFactorError::ExpiredOrUnknown);
        }
        Ok(handshake)
    }

    /// Redeem a handshake. The entry is removed whether or not it is still
    /// live; only a live entry yields the username.
    pub async fn consume_pending_handshake(&self, temp_token: &str) -> Result<String, TwoFactorError> {
        let handshake = self
            .handshakes
            .take(temp_token)
            .await?
            .ok_or(TwoFactorError::ExpiredOrUnknown)?;

        if handshake.is_expired(self.clock.now()) {
            return Err(TwoFactorError::ExpiredOrUnknown);
        }
        Ok(handshake.username)
    }

    pub async fn purge_expired(&self) -> usize {
        match self.handshakes.purge_expired(self.clock.now()).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::error!(error = %e, "Failed to purge pending 2FA handshakes");
                0
            }
        }
    }
}
