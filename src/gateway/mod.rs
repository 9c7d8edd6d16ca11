pub mod allow_list;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use allow_list::AllowList;
pub use extract::{ClientIp, CurrentIdentity, RequireAdmin, RequireIdentity};
pub use state::AppState;

/// Build the HTTP router.
///
/// Every route passes through [`middleware::authenticate_request`]; routes
/// that need an identity also pass the general API quota.
pub fn build_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh))
        .route("/health", get(handlers::health_check));

    let two_factor_routes = Router::new()
        .route("/verify-login", post(handlers::verify_login))
        .merge(
            Router::new()
                .route("/setup", post(handlers::setup_two_factor))
                .route("/verify", post(handlers::enable_two_factor))
                .route("/disable", post(handlers::disable_two_factor))
                .route("/status", get(handlers::two_factor_status))
                .layer(from_fn_with_state(state.clone(), middleware::api_rate_limit)),
        );

    let identity_routes = Router::new()
        .route("/api/v1/me", get(handlers::me))
        .layer(from_fn_with_state(state.clone(), middleware::api_rate_limit));

    Router::new()
        .nest("/api/v1/auth", auth_routes)
        .nest("/api/v1/admin/2fa", two_factor_routes)
        .merge(identity_routes)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::authenticate_request,
        ))
        .with_state(state)
        // Stateless, added after with_state
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Bind and serve until the listener fails.
pub async fn run_server(state: Arc<AppState>, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(addr = %addr, "Auth gateway listening");
    tracing::info!(docs = %format!("http://{}/docs", addr), "API docs available");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
