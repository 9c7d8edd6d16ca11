use chrono::Duration;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use std::sync::Arc;

use super::claims::{Identity, IdentityClaims, TokenType};
use super::error::TokenError;
use crate::clock::Clock;
use crate::config::{JwtConfig, bounded_secs};

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: IdentityClaims,
    /// Lifetime in seconds
    pub expires_in: i64,
}

/// HS512 token signer/verifier.
///
/// Expiry is checked against the injected [`Clock`] rather than the
/// library's wall clock, so `exp <= now` is rejected at exactly the
/// expiry second.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(config: &JwtConfig, clock: Arc<dyn Clock>) -> Self {
        Self::from_secret(
            config.secret.expose_secret().as_bytes(),
            &config.issuer,
            bounded_secs(config.access_ttl_secs),
            bounded_secs(config.refresh_ttl_secs),
            clock,
        )
    }

    pub fn from_secret(
        secret: &[u8],
        issuer: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer: issuer.to_string(),
            access_ttl,
            refresh_ttl,
            clock,
        }
    }

    pub fn ttl(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        }
    }

    /// Sign a token for `identity`, valid from now until now + TTL.
    pub fn issue(
        &self,
        identity: &Identity,
        token_type: TokenType,
    ) -> Result<IssuedToken, TokenError> {
        if !identity.is_consistent() {
            return Err(TokenError::Encoding(format!(
                "admin level does not match user type {}",
                identity.user_type
            )));
        }

        let ttl = self.ttl(token_type);
        let issued_at = self.clock.now().timestamp();
        let claims = IdentityClaims::new(
            identity,
            token_type,
            &self.issuer,
            issued_at,
            issued_at + ttl.num_seconds(),
        );

        let token = encode(&Header::new(Algorithm::HS512), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;

        Ok(IssuedToken {
            token,
            claims,
            expires_in: ttl.num_seconds(),
        })
    }

    /// Verify signature, issuer, expiry and claim shape.
    pub fn verify(&self, token: &str) -> Result<IdentityClaims, TokenError> {
        let data = decode::<IdentityClaims>(token, &self.decoding_key, &self.validation)?;
        let claims = data.claims;

        if claims.exp <= self.clock.now().timestamp() {
            return Err(TokenError::Expired);
        }
        if !claims.identity().is_consistent() {
            return Err(TokenError::Malformed(
                "adminLevel inconsistent with userType".to_string(),
            ));
        }
        Ok(claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<IdentityClaims, TokenError> {
        self.verify_typed(token, TokenType::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<IdentityClaims, TokenError> {
        self.verify_typed(token, TokenType::Refresh)
    }

    fn verify_typed(&self, token: &str, expected: TokenType) -> Result<IdentityClaims, TokenError> {
        let claims = self.verify(token)?;
        if claims.token_type != expected {
            return Err(TokenError::WrongType {
                expected,
                actual: claims.token_type,
            });
        }
        Ok(claims)
    }
}
