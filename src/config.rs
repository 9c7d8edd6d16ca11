use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::fs;
use std::net::IpAddr;
use thiserror::Error;

/// Upper bound for every configured lifetime (ten years)
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Configured seconds as a `Duration`, clamped to `0..=MAX_TTL_SECS`.
pub(crate) fn bounded_secs(secs: i64) -> Duration {
    Duration::seconds(secs.clamp(0, MAX_TTL_SECS))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub two_factor: TwoFactorConfig,
    #[serde(default)]
    pub lockout: LockoutConfig,
    /// PostgreSQL connection URL for the account store
    #[serde(default)]
    pub postgres_url: Option<String>,
    /// Admin seeded into the in-memory account store when no database is configured
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Paths that bypass request authentication. Entries ending in `/` match
    /// as prefixes, `GET /path` entries match a single method.
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
    /// Peers whose `X-Forwarded-For`/`X-Real-IP` headers are believed.
    /// Requests from anyone else are keyed on the socket address.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

fn default_public_paths() -> Vec<String> {
    vec![
        "/api/v1/auth/".to_string(),
        "/api/v1/admin/2fa/verify-login".to_string(),
        "GET /api/v1/sessions/public".to_string(),
        "/docs/".to_string(),
        "/api-docs/".to_string(),
    ]
}

#[derive(Debug, Deserialize)]
pub struct JwtConfig {
    #[serde(deserialize_with = "deserialize_secret")]
    pub secret: SecretString,
    pub issuer: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

#[derive(Debug, Deserialize)]
pub struct PasswordConfig {
    #[serde(deserialize_with = "deserialize_secret")]
    pub pepper: SecretString,
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
    pub salt_length: usize,
    pub hash_length: usize,
}

/// A `(count, window)` admission quota.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub count: u32,
    pub window_secs: u64,
}

impl Quota {
    pub const fn new(count: u32, window_secs: u64) -> Self {
        Self { count, window_secs }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RateLimitConfig {
    pub api: Quota,
    pub chat: Quota,
    pub login: Quota,
    pub email_verification: Quota,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            api: Quota::new(100, 60),
            chat: Quota::new(20, 60),
            login: Quota::new(5, 300),
            email_verification: Quota::new(3, 3600),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TwoFactorConfig {
    /// Issuer shown by authenticator apps
    pub issuer: String,
    pub handshake_ttl_secs: i64,
    pub skew_steps: u8,
    pub step_secs: u64,
}

impl Default for TwoFactorConfig {
    fn default() -> Self {
        Self {
            issuer: "Further-Up".to_string(),
            handshake_ttl_secs: 300,
            skew_steps: 1,
            step_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LockoutConfig {
    pub max_attempts: u32,
    pub lock_secs: i64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lock_secs: 900,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    pub email: String,
    #[serde(default = "default_admin_level")]
    pub level: u8,
}

fn default_admin_level() -> u8 {
    1
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(SecretString::from(raw))
}

impl AppConfig {
    /// Load `config/<env>.yaml`, apply environment overrides and validate.
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("APP_JWT_SECRET")
            && !secret.is_empty()
        {
            self.jwt.secret = SecretString::from(secret);
        }
        if let Ok(pepper) = std::env::var("APP_PEPPER")
            && !pepper.is_empty()
        {
            self.password.pepper = SecretString::from(pepper);
        }
        if let Ok(url) = std::env::var("DATABASE_URL")
            && !url.is_empty()
        {
            self.postgres_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.expose_secret().len() < 32 {
            return Err(ConfigError::Invalid(
                "jwt.secret must be at least 32 bytes".into(),
            ));
        }
        if self.jwt.issuer.is_empty() {
            return Err(ConfigError::Invalid("jwt.issuer must not be empty".into()));
        }
        for (name, secs) in [
            ("jwt.access_ttl_secs", self.jwt.access_ttl_secs),
            ("jwt.refresh_ttl_secs", self.jwt.refresh_ttl_secs),
            ("two_factor.handshake_ttl_secs", self.two_factor.handshake_ttl_secs),
            ("lockout.lock_secs", self.lockout.lock_secs),
        ] {
            if !(1..=MAX_TTL_SECS).contains(&secs) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 1 and {}, got {}",
                    name, MAX_TTL_SECS, secs
                )));
            }
        }
        if self.lockout.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "lockout.max_attempts must be at least 1".into(),
            ));
        }
        if self.password.pepper.expose_secret().is_empty() {
            return Err(ConfigError::Invalid(
                "password.pepper must not be empty".into(),
            ));
        }
        if !(8..=48).contains(&self.password.salt_length) {
            return Err(ConfigError::Invalid(format!(
                "password.salt_length must be 8-48 bytes, got {}",
                self.password.salt_length
            )));
        }
        if self.password.hash_length < 16 {
            return Err(ConfigError::Invalid(
                "password.hash_length must be at least 16 bytes".into(),
            ));
        }
        let limits = &self.rate_limit;
        for (name, quota) in [
            ("api", limits.api),
            ("chat", limits.chat),
            ("login", limits.login),
            ("email_verification", limits.email_verification),
        ] {
            if quota.count == 0 || quota.window_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "rate_limit.{} must have positive count and window",
                    name
                )));
            }
        }
        if self.two_factor.step_secs == 0 {
            return Err(ConfigError::Invalid(
                "two_factor.step_secs must be positive".into(),
            ));
        }
        if let Some(admin) = &self.bootstrap_admin
            && !matches!(admin.level, 1 | 2)
        {
            return Err(ConfigError::Invalid(
                "bootstrap_admin.level must be 1 (Admin) or 2 (Moderator)".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
log_level: info
log_dir: ./logs
log_file: auth.log
use_json: false
rotation: daily
gateway:
  host: 127.0.0.1
  port: 8080
jwt:
  secret: "0123456789abcdef0123456789abcdef-test"
  issuer: chatbot-auth
  access_ttl_secs: 900
  refresh_ttl_secs: 604800
password:
  pepper: "pepper-for-tests"
  memory_cost_kib: 8192
  time_cost: 2
  parallelism: 1
  salt_length: 16
  hash_length: 32
rate_limit:
  api: { count: 100, window_secs: 60 }
  chat: { count: 10, window_secs: 60 }
  login: { count: 3, window_secs: 60 }
  email_verification: { count: 2, window_secs: 3600 }
"#;

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit.login, Quota::new(3, 60));
        assert_eq!(config.two_factor.skew_steps, 1);
        assert_eq!(config.lockout.max_attempts, 5);
        assert!(
            config
                .gateway
                .public_paths
                .contains(&"/api/v1/auth/".to_string())
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("pepper-for-tests"));
        assert!(!rendered.contains("0123456789abcdef0123456789abcdef-test"));
    }

    #[test]
    fn test_short_secret_rejected() {
        let yaml = SAMPLE.replace("0123456789abcdef0123456789abcdef-test", "short");
        let config = AppConfig::from_yaml_str(&yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_salt_length_rejected() {
        let yaml = SAMPLE.replace("salt_length: 16", "salt_length: 4");
        let config = AppConfig::from_yaml_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lockout_bounds_rejected() {
        for (from, to) in [
            ("max_attempts: 5", "max_attempts: 0"),
            ("lock_secs: 900", "lock_secs: -1"),
            ("lock_secs: 900", "lock_secs: 0"),
        ] {
            let yaml = format!("{}lockout:\n  max_attempts: 5\n  lock_secs: 900\n", SAMPLE)
                .replace(from, to);
            let config = AppConfig::from_yaml_str(&yaml).unwrap();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{} accepted",
                to
            );
        }
    }

    #[test]
    fn test_absurd_ttls_rejected() {
        let huge = i64::MAX.to_string();
        for field in ["access_ttl_secs: 900", "refresh_ttl_secs: 604800"] {
            let name = field.split(':').next().unwrap();
            let yaml = SAMPLE.replace(field, &format!("{}: {}", name, huge));
            let config = AppConfig::from_yaml_str(&yaml).unwrap();
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }

        let yaml = format!(
            "{}two_factor:\n  issuer: Test\n  handshake_ttl_secs: {}\n  skew_steps: 1\n  step_secs: 30\n",
            SAMPLE, huge
        );
        let config = AppConfig::from_yaml_str(&yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bounded_secs_never_overflows() {
        assert_eq!(bounded_secs(i64::MAX), Duration::seconds(MAX_TTL_SECS));
        assert_eq!(bounded_secs(-5), Duration::zero());
        assert_eq!(bounded_secs(900), Duration::seconds(900));
    }
}
