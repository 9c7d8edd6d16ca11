//! Password verification with Argon2id and a server-wide pepper.
//!
//! The hashed input is `password || pepper || salt`. The digest is stored as a
//! PHC string and the salt separately, so a leaked digest is useless without
//! the pepper.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::zeroize::Zeroizing;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use thiserror::Error;

use crate::config::PasswordConfig;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Invalid hash parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid salt: {0}")]
    InvalidSalt(String),

    #[error("Hashing failed: {0}")]
    Hash(String),
}

pub struct CredentialVerifier {
    argon2: Argon2<'static>,
    pepper: SecretString,
    salt_length: usize,
    /// Digest of a random password, used when the account does not exist
    dummy_digest: String,
    dummy_salt: String,
}

impl CredentialVerifier {
    pub fn new(config: &PasswordConfig) -> Result<Self, CredentialError> {
        let params = Params::new(
            config.memory_cost_kib,
            config.time_cost,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|e| CredentialError::InvalidParams(e.to_string()))?;

        let mut verifier = Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            pepper: config.pepper.clone(),
            salt_length: config.salt_length,
            dummy_digest: String::new(),
            dummy_salt: String::new(),
        };

        let mut filler = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *filler);
        let dummy_password = Zeroizing::new(
            filler
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<String>(),
        );
        let dummy_salt = verifier.generate_salt()?;
        verifier.dummy_digest = verifier.hash(&dummy_password, &dummy_salt)?;
        verifier.dummy_salt = dummy_salt;

        Ok(verifier)
    }

    /// Fresh random salt, base64 encoded (no padding).
    pub fn generate_salt(&self) -> Result<String, CredentialError> {
        let mut bytes = vec![0u8; self.salt_length];
        OsRng.fill_bytes(&mut bytes);
        SaltString::encode_b64(&bytes)
            .map(|s| s.as_str().to_string())
            .map_err(|e| CredentialError::InvalidSalt(e.to_string()))
    }

    /// PHC-format digest of `password` under `salt`.
    pub fn hash(&self, password: &str, salt: &str) -> Result<String, CredentialError> {
        let salt_string =
            SaltString::from_b64(salt).map_err(|e| CredentialError::InvalidSalt(e.to_string()))?;
        let input = self.peppered(password, salt);
        self.argon2
            .hash_password(&input, &salt_string)
            .map(|hash| hash.to_string())
            .map_err(|e| CredentialError::Hash(e.to_string()))
    }

    /// Check a submitted password. Any failure, including an unparsable
    /// digest, is a mismatch.
    pub fn verify(&self, password: &str, digest: &str, salt: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            tracing::warn!("Stored password digest is not a valid PHC string");
            self.verify_dummy(password);
            return false;
        };
        let input = self.peppered(password, salt);
        self.argon2.verify_password(&input, &parsed).is_ok()
    }

    /// Spend the same work as a real verification and report a mismatch.
    pub fn verify_dummy(&self, password: &str) -> bool {
        if let Ok(parsed) = PasswordHash::new(&self.dummy_digest) {
            let input = self.peppered(password, &self.dummy_salt);
            let _ = self.argon2.verify_password(&input, &parsed);
        }
        false
    }

    /// [`verify`](Self::verify) on the blocking pool. `None` as digest runs
    /// the dummy verification.
    pub async fn verify_blocking(
        self: Arc<Self>,
        password: SecretString,
        stored: Option<(String, String)>,
    ) -> bool {
        let result = tokio::task::spawn_blocking(move || match stored {
            Some((digest, salt)) => self.verify(password.expose_secret(), &digest, &salt),
            None => self.verify_dummy(password.expose_secret()),
        })
        .await;

        match result {
            Ok(matched) => matched,
            Err(e) => {
                tracing::error!(error = %e, "Password verification task failed");
                false
            }
        }
    }

    /// [`hash`](Self::hash) on the blocking pool.
    pub async fn hash_blocking(
        self: Arc<Self>,
        password: SecretString,
        salt: String,
    ) -> Result<String, CredentialError> {
        tokio::task::spawn_blocking(move || self.hash(password.expose_secret(), &salt))
            .await
            .map_err(|e| CredentialError::Hash(e.to_string()))?
    }

    fn peppered(&self, password: &str, salt: &str) -> Zeroizing<Vec<u8>> {
        let pepper = self.pepper.expose_secret();
        let mut input = Zeroizing::new(Vec::with_capacity(
            password.len() + pepper.len() + salt.len(),
        ));
        input.extend_from_slice(password.as_bytes());
        input.extend_from_slice(pepper.as_bytes());
        input.extend_from_slice(salt.as_bytes());
        input
    }
}
