use std::net::IpAddr;
use std::sync::Arc;

use super::allow_list::AllowList;
use crate::auth::AuthService;
use crate::db::Database;

/// Shared gateway state
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    /// Paths served without authentication
    pub allow_list: Arc<AllowList>,
    /// PostgreSQL, when configured (health reporting only)
    pub db: Option<Arc<Database>>,
    /// Proxies allowed to name the client in forwarding headers
    pub trusted_proxies: Arc<[IpAddr]>,
}

impl AppState {
    pub fn new(auth: Arc<AuthService>, allow_list: AllowList, db: Option<Arc<Database>>) -> Self {
        Self {
            auth,
            allow_list: Arc::new(allow_list),
            db,
            trusted_proxies: Arc::from(Vec::new()),
        }
    }

    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = proxies.into();
        self
    }
}
