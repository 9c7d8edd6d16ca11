//! HTTP handlers for login, refresh and admin 2FA management.

use axum::{Json, extract::State, http::StatusCode};
use secrecy::SecretString;
use std::sync::Arc;

use super::extract::{ClientIp, RequireAdmin, RequireIdentity};
use super::state::AppState;
use super::types::{
    ApiResponse, AuthResponse, CodeRequest, HealthResponse, LoginRequest, LoginResponse,
    MessageResponse, RefreshRequest, TwoFactorRequiredResponse, TwoFactorSetupResponse,
    TwoFactorStatusResponse, UserSummary, ValidatedJson, VerifyLoginRequest,
};
use crate::auth::{AuthError, AuthErrorCode, AuthErrorResponse, LoginOutcome};

/// Login
///
/// POST /api/v1/auth/login
///
/// Returns tokens, or envelope code 2004 (`TWO_FACTOR_REQUIRED`) with a
/// temp token for admins with 2FA enabled.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Tokens issued or two-factor code required", body = ApiResponse<LoginResponse>),
        (status = 400, description = "Invalid request", body = AuthErrorResponse),
        (status = 401, description = "Invalid username or password", body = AuthErrorResponse),
        (status = 403, description = "Email not verified", body = AuthErrorResponse),
        (status = 423, description = "Account locked", body = AuthErrorResponse),
        (status = 429, description = "Too many login attempts", body = AuthErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, AuthError> {
    let outcome = state
        .auth
        .login(
            &req.username,
            SecretString::from(req.password),
            req.user_type,
            ip.as_deref(),
        )
        .await?;

    let body = match outcome {
        LoginOutcome::Issued(pair) => {
            ApiResponse::success(LoginResponse::Tokens(AuthResponse::from(pair)))
        }
        LoginOutcome::TwoFactorPending(pending) => {
            let code = AuthErrorCode::TwoFactorRequired;
            ApiResponse::with_code(
                code.code(),
                code.name(),
                LoginResponse::TwoFactorRequired(TwoFactorRequiredResponse::from(pending)),
            )
        }
    };
    Ok(Json(body))
}

/// Refresh access token
///
/// POST /api/v1/auth/refresh
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = ApiResponse<AuthResponse>),
        (status = 401, description = "Refresh token invalid or expired", body = AuthErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, AuthError> {
    let pair = state.auth.refresh(&req.refresh_token).await?;
    Ok(Json(ApiResponse::success(AuthResponse::from(pair))))
}

/// Complete a two-factor login
///
/// POST /api/v1/admin/2fa/verify-login
#[utoipa::path(
    post,
    path = "/api/v1/admin/2fa/verify-login",
    request_body = VerifyLoginRequest,
    responses(
        (status = 200, description = "Tokens issued", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Code is not 6 digits", body = AuthErrorResponse),
        (status = 401, description = "Wrong code or expired handshake", body = AuthErrorResponse),
        (status = 429, description = "Too many attempts", body = AuthErrorResponse)
    ),
    tag = "Two-Factor"
)]
pub async fn verify_login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ValidatedJson(req): ValidatedJson<VerifyLoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, AuthError> {
    let pair = state
        .auth
        .complete_two_factor(&req.temp_token, &req.username, &req.code, ip.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(AuthResponse::from(pair))))
}

/// Start two-factor enrollment
///
/// POST /api/v1/admin/2fa/setup
#[utoipa::path(
    post,
    path = "/api/v1/admin/2fa/setup",
    responses(
        (status = 200, description = "Enrollment material", body = ApiResponse<TwoFactorSetupResponse>),
        (status = 400, description = "Already enabled", body = AuthErrorResponse),
        (status = 401, description = "Not authenticated", body = AuthErrorResponse),
        (status = 403, description = "Admin only", body = AuthErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Two-Factor"
)]
pub async fn setup_two_factor(
    State(state): State<Arc<AppState>>,
    RequireAdmin(identity): RequireAdmin,
) -> Result<Json<ApiResponse<TwoFactorSetupResponse>>, AuthError> {
    let setup = state.auth.setup_two_factor(&identity).await?;
    Ok(Json(ApiResponse::success(TwoFactorSetupResponse::from(setup))))
}

/// Confirm enrollment and enable two-factor login
///
/// POST /api/v1/admin/2fa/verify
#[utoipa::path(
    post,
    path = "/api/v1/admin/2fa/verify",
    request_body = CodeRequest,
    responses(
        (status = 200, description = "Two-factor enabled", body = ApiResponse<MessageResponse>),
        (status = 400, description = "Malformed code or no setup in progress", body = AuthErrorResponse),
        (status = 401, description = "Wrong code", body = AuthErrorResponse),
        (status = 403, description = "Admin only", body = AuthErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Two-Factor"
)]
pub async fn enable_two_factor(
    State(state): State<Arc<AppState>>,
    RequireAdmin(identity): RequireAdmin,
    ValidatedJson(req): ValidatedJson<CodeRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, AuthError> {
    state.auth.enable_two_factor(&identity, &req.code).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Two-factor authentication enabled",
    ))))
}

/// Disable two-factor login
///
/// POST /api/v1/admin/2fa/disable
#[utoipa::path(
    post,
    path = "/api/v1/admin/2fa/disable",
    request_body = CodeRequest,
    responses(
        (status = 200, description = "Two-factor disabled", body = ApiResponse<MessageResponse>),
        (status = 400, description = "Malformed code or not enabled", body = AuthErrorResponse),
        (status = 401, description = "Wrong code", body = AuthErrorResponse),
        (status = 403, description = "Admin only", body = AuthErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Two-Factor"
)]
pub async fn disable_two_factor(
    State(state): State<Arc<AppState>>,
    RequireAdmin(identity): RequireAdmin,
    ValidatedJson(req): ValidatedJson<CodeRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, AuthError> {
    state.auth.disable_two_factor(&identity, &req.code).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Two-factor authentication disabled",
    ))))
}

/// Two-factor status
///
/// GET /api/v1/admin/2fa/status
#[utoipa::path(
    get,
    path = "/api/v1/admin/2fa/status",
    responses(
        (status = 200, description = "Current status", body = ApiResponse<TwoFactorStatusResponse>),
        (status = 401, description = "Not authenticated", body = AuthErrorResponse),
        (status = 403, description = "Admin only", body = AuthErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Two-Factor"
)]
pub async fn two_factor_status(
    State(state): State<Arc<AppState>>,
    RequireAdmin(identity): RequireAdmin,
) -> Result<Json<ApiResponse<TwoFactorStatusResponse>>, AuthError> {
    let status = state.auth.two_factor_status(&identity).await?;
    Ok(Json(ApiResponse::success(TwoFactorStatusResponse::from(
        status,
    ))))
}

/// Current identity
///
/// GET /api/v1/me
#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Identity from the bearer token", body = ApiResponse<UserSummary>),
        (status = 401, description = "Not authenticated", body = AuthErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(RequireIdentity(identity): RequireIdentity) -> Json<ApiResponse<UserSummary>> {
    Json(ApiResponse::success(UserSummary::from(&identity)))
}

/// Health check
///
/// Reports the database only when one is configured.
#[utoipa::path(
    get,
    path = "/api/v1/auth/health",
    responses(
        (status = 200, description = "Service healthy", body = ApiResponse<HealthResponse>),
        (status = 503, description = "Database unreachable", body = ApiResponse<HealthResponse>)
    ),
    tag = "System"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let database = match state.db.as_ref() {
        Some(db) => match db.health_check().await {
            Ok(()) => Some(true),
            Err(e) => {
                tracing::error!(error = %e, "Database health check failed");
                Some(false)
            }
        },
        None => None,
    };

    let healthy = database != Some(false);
    let body = HealthResponse {
        status: if healthy { "ok" } else { "unavailable" },
        version: env!("CARGO_PKG_VERSION"),
        database,
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
    };

    if healthy {
        (StatusCode::OK, Json(ApiResponse::success(body)))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::with_code(503, "unavailable", body)),
        )
    }
}
