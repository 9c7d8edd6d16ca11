//! Login, 2FA completion, refresh and 2FA management flows.
//!
//! A login attempt moves through
//! `credentials submitted -> credential check -> {token issued | 2FA pending}`
//! and, when pending, `code submitted -> {token issued | rejected}`.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use super::error::{AuthError, AuthErrorCode};
use crate::account::{Account, AccountStore, NewAccount};
use crate::clock::Clock;
use crate::config::{AppConfig, BootstrapAdmin};
use crate::credential::{CredentialError, CredentialVerifier};
use crate::rate_limit::{CounterStore, RateConcern, RateLimiter};
use crate::store::StoreError;
use crate::token::{AdminLevel, Identity, TokenCodec, TokenType, UserType};
use crate::two_factor::{HandshakeStore, SetupSecret, TwoFactorGate};

/// Access and refresh tokens plus the account they were issued for.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub identity: Identity,
}

/// Step one succeeded; a TOTP code is needed to finish.
#[derive(Debug, Clone)]
pub struct PendingTwoFactor {
    pub username: String,
    pub temp_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Issued(TokenPair),
    TwoFactorPending(PendingTwoFactor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    /// A secret is stored but not yet confirmed
    pub setup_pending: bool,
}

pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    credentials: Arc<CredentialVerifier>,
    tokens: Arc<TokenCodec>,
    limiter: Arc<RateLimiter>,
    two_factor: Arc<TwoFactorGate>,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        credentials: Arc<CredentialVerifier>,
        tokens: Arc<TokenCodec>,
        limiter: Arc<RateLimiter>,
        two_factor: Arc<TwoFactorGate>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            credentials,
            tokens,
            limiter,
            two_factor,
            clock,
        }
    }

    /// Wire every component from configuration.
    pub fn from_config(
        config: &AppConfig,
        accounts: Arc<dyn AccountStore>,
        counters: Arc<dyn CounterStore>,
        handshakes: Arc<dyn HandshakeStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CredentialError> {
        Ok(Self::new(
            accounts,
            Arc::new(CredentialVerifier::new(&config.password)?),
            Arc::new(TokenCodec::new(&config.jwt, clock.clone())),
            Arc::new(RateLimiter::new(counters, config.rate_limit, clock.clone())),
            Arc::new(TwoFactorGate::new(
                &config.two_factor,
                handshakes,
                clock.clone(),
            )),
            clock,
        ))
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn two_factor(&self) -> &TwoFactorGate {
        &self.two_factor
    }

    /// Step one: check the password and either issue tokens or open a
    /// pending 2FA handshake. `client` is the rate-limit identifier (usually
    /// the peer IP); the username is used when it is absent.
    pub async fn login(
        &self,
        username: &str,
        password: SecretString,
        user_type: UserType,
        client: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        self.check_login_rate(username, client).await?;

        let Some(account) = self.accounts.find_by_username(user_type, username).await? else {
            self.credentials.clone().verify_blocking(password, None).await;
            tracing::info!(username = %username, user_type = %user_type, "Login failed: unknown account");
            return Err(AuthError::from_code(AuthErrorCode::InvalidCredentials));
        };

        let now = self.clock.now();
        if account.is_locked(now) {
            tracing::warn!(username = %username, user_type = %user_type, "Login rejected: account locked");
            return Err(AuthError::from_code(AuthErrorCode::AccountLocked));
        }

        let stored = Some((account.password_hash.clone(), account.salt.clone()));
        let matched = self.credentials.clone().verify_blocking(password, stored).await;

        if !account.is_active {
            tracing::info!(username = %username, user_type = %user_type, "Login failed: account inactive");
            return Err(AuthError::from_code(AuthErrorCode::InvalidCredentials));
        }
        if !matched {
            self.record_failure(&account, now).await;
            return Err(AuthError::from_code(AuthErrorCode::InvalidCredentials));
        }
        if account.user_type == UserType::User && !account.email_verified {
            tracing::info!(username = %username, "Login failed: email not verified");
            return Err(AuthError::from_code(AuthErrorCode::EmailNotVerified));
        }

        self.accounts
            .record_login_success(account.user_type, account.id, now)
            .await?;

        if account.requires_two_factor() {
            let handshake = self
                .two_factor
                .create_pending_handshake(&account.username)
                .await?;
            tracing::info!(username = %username, "Password accepted, two-factor code required");
            return Ok(LoginOutcome::TwoFactorPending(PendingTwoFactor {
                username: handshake.username,
                temp_token: handshake.temp_token,
                expires_at: handshake.expires_at,
            }));
        }

        let pair = self.issue_pair(&account.identity())?;
        tracing::info!(username = %username, user_type = %user_type, user_id = account.id, "Login successful");
        Ok(LoginOutcome::Issued(pair))
    }

    /// Step two: check the TOTP code for a pending handshake. A wrong code
    /// leaves the handshake usable until it expires.
    pub async fn complete_two_factor(
        &self,
        temp_token: &str,
        username: &str,
        code: &str,
        client: Option<&str>,
    ) -> Result<TokenPair, AuthError> {
        self.check_login_rate(username, client).await?;

        let handshake = self.two_factor.peek_pending_handshake(temp_token).await?;
        if handshake.username != username {
            tracing::warn!(username = %username, "Two-factor handshake presented for another account");
            return Err(AuthError::from_code(
                AuthErrorCode::ExpiredOrUnknownHandshake,
            ));
        }

        let account = self
            .accounts
            .find_by_username(UserType::Admin, username)
            .await?
            .ok_or_else(|| AuthError::from_code(AuthErrorCode::ExpiredOrUnknownHandshake))?;
        let secret = account
            .two_factor_secret
            .as_deref()
            .filter(|_| account.two_factor_enabled)
            .ok_or_else(|| AuthError::from_code(AuthErrorCode::TwoFactorNotEnabled))?;

        if let Err(e) = self.two_factor.totp().verify_login_code(username, secret, code) {
            tracing::info!(username = %username, error = %e, "Two-factor code rejected");
            return Err(e.into());
        }

        // Only one concurrent completion wins the handshake
        self.two_factor.consume_pending_handshake(temp_token).await?;

        let pair = self.issue_pair(&account.identity())?;
        tracing::info!(username = %username, user_id = account.id, "Two-factor login successful");
        Ok(pair)
    }

    /// New access token for a valid refresh token. The refresh token is
    /// returned unchanged.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.tokens.verify_refresh(refresh_token)?;

        let account = self
            .accounts
            .find_by_id(claims.user_type, claims.user_id)
            .await?
            .filter(|a| a.is_active && a.username == claims.sub)
            .ok_or_else(|| AuthError::from_code(AuthErrorCode::Unauthenticated))?;
        if account.is_locked(self.clock.now()) {
            return Err(AuthError::from_code(AuthErrorCode::AccountLocked));
        }

        let access = self.tokens.issue(&account.identity(), TokenType::Access)?;
        tracing::debug!(username = %account.username, "Access token refreshed");
        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh_token.to_string(),
            expires_in: access.expires_in,
            identity: access.claims.identity(),
        })
    }

    /// Identity behind a bearer access token.
    pub fn authenticate(&self, bearer: &str) -> Result<Identity, AuthError> {
        Ok(self.tokens.verify_access(bearer)?.identity())
    }

    /// Generate and store a new TOTP secret. 2FA stays disabled until the
    /// first code is confirmed.
    pub async fn setup_two_factor(&self, identity: &Identity) -> Result<SetupSecret, AuthError> {
        let account = self.admin_account(identity).await?;
        if account.two_factor_enabled {
            return Err(AuthError::new(
                AuthErrorCode::InvalidParameter,
                "Two-factor authentication is already enabled",
            ));
        }

        let setup = self
            .two_factor
            .totp()
            .generate_setup_secret(&account.username)?;
        self.accounts
            .save_two_factor_secret(account.id, &setup.secret)
            .await?;
        self.two_factor.totp().forget(&account.username);

        tracing::info!(username = %account.username, "Two-factor setup started");
        Ok(setup)
    }

    pub async fn enable_two_factor(&self, identity: &Identity, code: &str) -> Result<(), AuthError> {
        let account = self.admin_account(identity).await?;
        let secret = account
            .two_factor_secret
            .as_deref()
            .ok_or_else(|| AuthError::from_code(AuthErrorCode::TwoFactorNotEnabled))?;

        self.two_factor
            .totp()
            .verify_setup_code(&account.username, secret, code)?;
        self.accounts.set_two_factor_enabled(account.id, true).await?;

        tracing::info!(username = %account.username, "Two-factor authentication enabled");
        Ok(())
    }

    pub async fn disable_two_factor(&self, identity: &Identity, code: &str) -> Result<(), AuthError> {
        let account = self.admin_account(identity).await?;
        let secret = account
            .two_factor_secret
            .as_deref()
            .filter(|_| account.two_factor_enabled)
            .ok_or_else(|| AuthError::from_code(AuthErrorCode::TwoFactorNotEnabled))?;

        self.two_factor
            .totp()
            .verify_login_code(&account.username, secret, code)?;
        self.accounts.clear_two_factor(account.id).await?;

        tracing::info!(username = %account.username, "Two-factor authentication disabled");
        Ok(())
    }

    pub async fn two_factor_status(&self, identity: &Identity) -> Result<TwoFactorStatus, AuthError> {
        let account = self.admin_account(identity).await?;
        Ok(TwoFactorStatus {
            enabled: account.two_factor_enabled,
            setup_pending: !account.two_factor_enabled && account.two_factor_secret.is_some(),
        })
    }

    /// Hash `password` and create an account.
    pub async fn create_account(
        &self,
        username: &str,
        email: &str,
        password: SecretString,
        user_type: UserType,
        admin_level: Option<AdminLevel>,
        email_verified: bool,
    ) -> Result<Account, AuthError> {
        if (user_type == UserType::Admin) != admin_level.is_some() {
            return Err(AuthError::new(
                AuthErrorCode::InvalidParameter,
                "Admin level is required for admins and not allowed for users",
            ));
        }

        let salt = self.credentials.generate_salt().map_err(AuthError::internal)?;
        let password_hash = self
            .credentials
            .clone()
            .hash_blocking(password, salt.clone())
            .await
            .map_err(AuthError::internal)?;

        let account = self
            .accounts
            .create(NewAccount {
                username: username.to_string(),
                email: email.to_string(),
                user_type,
                admin_level,
                password_hash,
                salt,
                email_verified,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(msg) => AuthError::new(AuthErrorCode::InvalidParameter, msg),
                other => AuthError::internal(other),
            })?;

        tracing::info!(username = %username, user_type = %user_type, user_id = account.id, "Account created");
        Ok(account)
    }

    /// Create the configured admin unless it already exists.
    pub async fn ensure_admin(&self, admin: &BootstrapAdmin) -> Result<(), AuthError> {
        if self
            .accounts
            .find_by_username(UserType::Admin, &admin.username)
            .await?
            .is_some()
        {
            return Ok(());
        }
        let level = AdminLevel::try_from(admin.level)
            .map_err(|e| AuthError::new(AuthErrorCode::InvalidParameter, e))?;
        self.create_account(
            &admin.username,
            &admin.email,
            SecretString::from(admin.password.expose_secret()),
            UserType::Admin,
            Some(level),
            true,
        )
        .await?;
        Ok(())
    }

    async fn check_login_rate(&self, username: &str, client: Option<&str>) -> Result<(), AuthError> {
        let key = client.unwrap_or(username);
        if self.limiter.check(RateConcern::Login, key).await {
            Ok(())
        } else {
            Err(AuthError::from_code(AuthErrorCode::RateLimited))
        }
    }

    async fn record_failure(&self, account: &Account, now: DateTime<Utc>) {
        match self
            .accounts
            .record_login_failure(account.user_type, account.id, now)
            .await
        {
            Ok(failure) => match failure.locked_until {
                Some(until) => tracing::warn!(
                    username = %account.username,
                    locked_until = %until,
                    "Account locked after repeated login failures"
                ),
                None => tracing::info!(
                    username = %account.username,
                    attempts = failure.attempts,
                    "Login failed: wrong password"
                ),
            },
            Err(e) => {
                tracing::error!(username = %account.username, error = %e, "Failed to record login failure")
            }
        }
    }

    async fn admin_account(&self, identity: &Identity) -> Result<Account, AuthError> {
        if !identity.is_admin() {
            return Err(AuthError::from_code(AuthErrorCode::Forbidden));
        }
        self.accounts
            .find_by_id(UserType::Admin, identity.user_id)
            .await?
            .filter(|a| a.is_active)
            .ok_or_else(|| AuthError::from_code(AuthErrorCode::Unauthenticated))
    }

    fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        let access = self.tokens.issue(identity, TokenType::Access)?;
        let refresh = self.tokens.issue(identity, TokenType::Refresh)?;
        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_in: access.expires_in,
            identity: identity.clone(),
        })
    }
}
