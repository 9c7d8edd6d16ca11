#![allow(dead_code)]

use secrecy::SecretString;
use std::sync::Arc;

use chatbot_auth::account::{Account, MemoryAccountStore};
use chatbot_auth::auth::{AuthService, LoginOutcome, PendingTwoFactor, TokenPair};
use chatbot_auth::clock::{Clock, ManualClock};
use chatbot_auth::config::AppConfig;
use chatbot_auth::rate_limit::MemoryCounterStore;
use chatbot_auth::token::{AdminLevel, UserType};
use chatbot_auth::two_factor::MemoryHandshakeStore;

/// 2023-11-14T22:13:20Z
pub const START: i64 = 1_700_000_000;

pub const CONFIG: &str = r#"
log_level: debug
log_dir: ./logs
log_file: test.log
use_json: false
rotation: never
gateway:
  host: 127.0.0.1
  port: 0
jwt:
  secret: "integration-test-signing-secret-0123456789"
  issuer: chatbot-auth-test
  access_ttl_secs: 900
  refresh_ttl_secs: 86400
password:
  pepper: "integration-pepper"
  memory_cost_kib: 1024
  time_cost: 1
  parallelism: 1
  salt_length: 16
  hash_length: 32
rate_limit:
  api: { count: 100, window_secs: 60 }
  chat: { count: 10, window_secs: 60 }
  login: { count: 3, window_secs: 60 }
  email_verification: { count: 2, window_secs: 3600 }
two_factor:
  issuer: Chatbot
  handshake_ttl_secs: 300
  skew_steps: 1
  step_secs: 30
lockout:
  max_attempts: 3
  lock_secs: 600
"#;

pub struct Harness {
    pub auth: Arc<AuthService>,
    pub accounts: Arc<MemoryAccountStore>,
    pub clock: Arc<ManualClock>,
    pub config: AppConfig,
}

pub fn harness() -> Harness {
    harness_with(CONFIG)
}

pub fn harness_with(yaml: &str) -> Harness {
    let config = AppConfig::from_yaml_str(yaml).unwrap();
    config.validate().unwrap();

    let clock = Arc::new(ManualClock::at_unix(START));
    let accounts = Arc::new(MemoryAccountStore::new(config.lockout));
    let auth = AuthService::from_config(
        &config,
        accounts.clone(),
        Arc::new(MemoryCounterStore::new(clock.clone())),
        Arc::new(MemoryHandshakeStore::new()),
        clock.clone(),
    )
    .unwrap();

    Harness {
        auth: Arc::new(auth),
        accounts,
        clock,
        config,
    }
}

impl Harness {
    pub async fn user(&self, username: &str, password: &str) -> Account {
        self.auth
            .create_account(
                username,
                &format!("{}@example.com", username),
                SecretString::from(password),
                UserType::User,
                None,
                true,
            )
            .await
            .unwrap()
    }

    pub async fn unverified_user(&self, username: &str, password: &str) -> Account {
        self.auth
            .create_account(
                username,
                &format!("{}@example.com", username),
                SecretString::from(password),
                UserType::User,
                None,
                false,
            )
            .await
            .unwrap()
    }

    pub async fn admin(&self, username: &str, password: &str) -> Account {
        self.auth
            .create_account(
                username,
                &format!("{}@example.com", username),
                SecretString::from(password),
                UserType::Admin,
                Some(AdminLevel::Admin),
                true,
            )
            .await
            .unwrap()
    }

    /// Admin with 2FA enrolled and enabled; returns the TOTP secret.
    pub async fn admin_with_two_factor(&self, username: &str, password: &str) -> (Account, String) {
        let account = self.admin(username, password).await;
        let identity = account.identity();
        let setup = self.auth.setup_two_factor(&identity).await.unwrap();
        // Enroll with the previous step's code so the current one stays
        // redeemable for login
        let step = self.auth.two_factor().totp().step_secs() as i64;
        let code = self.code_at_offset(&setup.secret, -step);
        self.auth
            .enable_two_factor(&identity, &code)
            .await
            .unwrap();
        (account, setup.secret)
    }

    /// Current TOTP code for `secret`.
    pub fn code(&self, secret: &str) -> String {
        self.code_at_offset(secret, 0)
    }

    pub fn code_at_offset(&self, secret: &str, offset_secs: i64) -> String {
        let t = (self.clock.now().timestamp() + offset_secs) as u64;
        self.auth
            .two_factor()
            .totp()
            .generate_at(secret, t)
            .unwrap()
    }

    /// A well-formed code outside the accepted skew window.
    pub fn wrong_code(&self, secret: &str) -> String {
        let step = self.auth.two_factor().totp().step_secs() as i64;
        let accepted: Vec<String> = (-1..=1)
            .map(|k| self.code_at_offset(secret, k * step))
            .collect();
        (0..1_000_000)
            .map(|n| format!("{:06}", n))
            .find(|c| !accepted.contains(c))
            .unwrap()
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
        user_type: UserType,
        client: &str,
    ) -> Result<LoginOutcome, chatbot_auth::AuthError> {
        self.auth
            .login(username, SecretString::from(password), user_type, Some(client))
            .await
    }
}

pub fn expect_tokens(outcome: LoginOutcome) -> TokenPair {
    match outcome {
        LoginOutcome::Issued(pair) => pair,
        LoginOutcome::TwoFactorPending(_) => panic!("expected tokens, got a 2FA handshake"),
    }
}

pub fn expect_pending(outcome: LoginOutcome) -> PendingTwoFactor {
    match outcome {
        LoginOutcome::TwoFactorPending(pending) => pending,
        LoginOutcome::Issued(_) => panic!("expected a 2FA handshake, got tokens"),
    }
}
