//! Chatbot Auth gateway
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌─────────────┐    ┌──────────┐
//! │  Client  │───▶│ Authenticator│───▶│ AuthService │───▶│ Accounts │
//! │ (Bearer) │    │ (fail-open)  │    │ (login/2FA) │    │ (PG/mem) │
//! └──────────┘    └──────────────┘    └─────────────┘    └──────────┘
//! ```
//!
//! Usage: `chatbot_auth [--env <name>]` (or `APP_ENV`), reading
//! `config/<name>.yaml`.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use chatbot_auth::account::{AccountStore, MemoryAccountStore, PgAccountStore};
use chatbot_auth::auth::AuthService;
use chatbot_auth::clock::{Clock, SystemClock};
use chatbot_auth::config::AppConfig;
use chatbot_auth::db::Database;
use chatbot_auth::gateway::{self, AllowList, AppState};
use chatbot_auth::rate_limit::MemoryCounterStore;
use chatbot_auth::two_factor::MemoryHandshakeStore;

/// Interval between sweeps of expired rate-limit windows and handshakes
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config =
        AppConfig::load(&env).with_context(|| format!("loading config for env '{}'", env))?;
    let _log_guard = chatbot_auth::logging::init_logging(&app_config);

    tracing::info!(env = %env, version = env!("CARGO_PKG_VERSION"), "Starting chatbot auth");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (accounts, db): (Arc<dyn AccountStore>, Option<Arc<Database>>) =
        match app_config.postgres_url.as_deref() {
            Some(url) => {
                let db = Arc::new(
                    Database::connect(url)
                        .await
                        .context("connecting to PostgreSQL")?,
                );
                let store = PgAccountStore::new(db.clone(), app_config.lockout);
                store
                    .init_schema()
                    .await
                    .context("initializing account schema")?;
                (Arc::new(store), Some(db))
            }
            None => {
                tracing::warn!("No postgres_url configured, accounts are kept in memory");
                (Arc::new(MemoryAccountStore::new(app_config.lockout)), None)
            }
        };

    let counters = Arc::new(MemoryCounterStore::new(clock.clone()));
    let handshakes = Arc::new(MemoryHandshakeStore::new());

    let auth = Arc::new(
        AuthService::from_config(
            &app_config,
            accounts,
            counters.clone(),
            handshakes,
            clock,
        )
        .context("building auth service")?,
    );

    if db.is_none()
        && let Some(admin) = &app_config.bootstrap_admin
    {
        auth.ensure_admin(admin)
            .await
            .context("seeding bootstrap admin")?;
        tracing::info!(username = %admin.username, "Bootstrap admin ready");
    }

    {
        let auth = auth.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let windows = counters.purge_expired();
                let handshakes = auth.two_factor().purge_expired().await;
                if windows > 0 || handshakes > 0 {
                    tracing::debug!(windows, handshakes, "Purged expired entries");
                }
            }
        });
    }

    let state = Arc::new(
        AppState::new(
            auth,
            AllowList::from_entries(&app_config.gateway.public_paths),
            db,
        )
        .with_trusted_proxies(app_config.gateway.trusted_proxies.clone()),
    );

    gateway::run_server(state, &app_config.gateway.host, app_config.gateway.port)
        .await
        .context("gateway server failed")?;
    Ok(())
}
