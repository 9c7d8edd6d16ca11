use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};

use super::error::TwoFactorError;
use crate::clock::Clock;
use crate::config::TwoFactorConfig;

const DIGITS: usize = 6;

/// Enrollment material for an authenticator app.
#[derive(Debug)]
pub struct SetupSecret {
    /// Base32 shared secret, stored on the account
    pub secret: String,
    pub manual_entry_key: String,
    /// `otpauth://` provisioning URI
    pub qr_code_url: String,
}

/// RFC 6238 code checks (SHA1, 6 digits) with a configurable skew.
///
/// Each account may redeem a given time step once: a code is only accepted
/// for a step later than the last one accepted for that account.
pub struct TotpVerifier {
    issuer: String,
    skew: u8,
    step: u64,
    clock: Arc<dyn Clock>,
    last_steps: DashMap<String, u64>,
}

impl TotpVerifier {
    pub fn new(config: &TwoFactorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            // otpauth labels use ':' as the issuer separator
            issuer: config.issuer.replace(':', ""),
            skew: config.skew_steps,
            step: config.step_secs,
            clock,
            last_steps: DashMap::new(),
        }
    }

    pub fn generate_setup_secret(&self, account: &str) -> Result<SetupSecret, TwoFactorError> {
        let bytes = Secret::generate_secret()
            .to_bytes()
            .map_err(|e| TwoFactorError::Secret(e.to_string()))?;
        let totp = self.build(bytes, account, self.skew)?;
        let secret = totp.get_secret_base32();

        Ok(SetupSecret {
            manual_entry_key: secret.clone(),
            qr_code_url: totp.get_url(),
            secret,
        })
    }

    /// Check the first code from a freshly enrolled authenticator.
    pub fn verify_setup_code(
        &self,
        account: &str,
        secret: &str,
        code: &str,
    ) -> Result<(), TwoFactorError> {
        self.redeem(account, secret, code)
    }

    /// Check a code submitted during login or a 2FA management action.
    pub fn verify_login_code(
        &self,
        account: &str,
        secret: &str,
        code: &str,
    ) -> Result<(), TwoFactorError> {
        self.redeem(account, secret, code)
    }

    /// Drop the replay marker, e.g. when a new secret is enrolled.
    pub fn forget(&self, account: &str) {
        self.last_steps.remove(account);
    }

    /// Stateless check; returns the time step the code belongs to.
    pub fn verify_at(&self, secret: &str, code: &str, unix_secs: u64) -> Result<u64, TwoFactorError> {
        if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TwoFactorError::FormatError);
        }
        let bytes = decode_secret(secret)?;
        // One zero-skew check per candidate step, newest first
        let exact = self.build(bytes, "account", 0)?;
        let current = unix_secs / self.step;
        let skew = u64::from(self.skew);
        (current.saturating_sub(skew)..=current + skew)
            .rev()
            .find(|step| exact.check(code, step * self.step))
            .ok_or(TwoFactorError::InvalidCode)
    }

    fn redeem(&self, account: &str, secret: &str, code: &str) -> Result<(), TwoFactorError> {
        let step = self.verify_at(secret, code, self.unix_now())?;
        match self.last_steps.entry(account.to_string()) {
            Entry::Occupied(last) if *last.get() >= step => {
                tracing::info!(account = %account, step, "TOTP code already used");
                return Err(TwoFactorError::InvalidCode);
            }
            Entry::Occupied(mut last) => {
                last.insert(step);
            }
            Entry::Vacant(slot) => {
                slot.insert(step);
            }
        }
        Ok(())
    }

    /// Code for `secret` at the given time.
    pub fn generate_at(&self, secret: &str, unix_secs: u64) -> Result<String, TwoFactorError> {
        Ok(self.from_encoded(secret)?.generate(unix_secs))
    }

    pub fn step_secs(&self) -> u64 {
        self.step
    }

    fn unix_now(&self) -> u64 {
        u64::try_from(self.clock.now().timestamp()).unwrap_or(0)
    }

    fn from_encoded(&self, secret: &str) -> Result<TOTP, TwoFactorError> {
        // The account label is not part of the code computation
        self.build(decode_secret(secret)?, "account", self.skew)
    }

    fn build(&self, bytes: Vec<u8>, account: &str, skew: u8) -> Result<TOTP, TwoFactorError> {
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            skew,
            self.step,
            bytes,
            Some(self.issuer.clone()),
            account.replace(':', ""),
        )
        .map_err(|e| TwoFactorError::Secret(e.to_string()))
    }
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, TwoFactorError> {
    Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|e| TwoFactorError::Secret(e.to_string()))
}
