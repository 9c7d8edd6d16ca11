//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::auth::AuthErrorResponse;
use crate::gateway::types::{
    AuthResponse, CodeRequest, HealthResponse, LoginRequest, LoginResponse, MessageResponse,
    RefreshRequest, TwoFactorRequiredResponse, TwoFactorSetupResponse, TwoFactorStatusResponse,
    UserSummary, VerifyLoginRequest,
};
use crate::token::UserType;

/// JWT bearer authentication security scheme
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Access token from /api/v1/auth/login: Bearer {access_token}",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Chatbot Auth API",
        version = "1.0.0",
        description = "Token issuance, two-factor login and request authentication for the chat platform.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::login,
        crate::gateway::handlers::refresh,
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::me,
        crate::gateway::handlers::verify_login,
        crate::gateway::handlers::setup_two_factor,
        crate::gateway::handlers::enable_two_factor,
        crate::gateway::handlers::disable_two_factor,
        crate::gateway::handlers::two_factor_status,
    ),
    components(
        schemas(
            LoginRequest,
            RefreshRequest,
            VerifyLoginRequest,
            CodeRequest,
            UserType,
            UserSummary,
            AuthResponse,
            TwoFactorRequiredResponse,
            LoginResponse,
            TwoFactorSetupResponse,
            TwoFactorStatusResponse,
            MessageResponse,
            HealthResponse,
            AuthErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token refresh and identity"),
        (name = "Two-Factor", description = "Admin TOTP enrollment and two-factor login"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;
