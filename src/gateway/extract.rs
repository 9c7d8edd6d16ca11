//! Request extractors for downstream authorization.
//!
//! The request authenticator never rejects; these extractors decide whether
//! a handler accepts the identity (or lack of one) left in the extensions.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{Extensions, HeaderMap, request::Parts};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use super::state::AppState;
use crate::auth::{AuthError, AuthErrorCode};
use crate::token::Identity;

/// Any authenticated identity; 401 `UNAUTHENTICATED` otherwise.
#[derive(Debug, Clone)]
pub struct RequireIdentity(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for RequireIdentity {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(Self)
            .ok_or_else(|| AuthError::from_code(AuthErrorCode::Unauthenticated))
    }
}

/// An admin identity; 401 without identity, 403 `FORBIDDEN` for users.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireIdentity(identity) = RequireIdentity::from_request_parts(parts, state).await?;
        if !identity.is_admin() {
            tracing::info!(
                username = %identity.subject,
                path = %parts.uri.path(),
                "Admin endpoint refused for non-admin identity"
            );
            return Err(AuthError::from_code(AuthErrorCode::Forbidden));
        }
        Ok(Self(identity))
    }
}

/// Identity if one was set, for endpoints that also serve anonymous callers.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Option<Identity>);

impl<S: Send + Sync> FromRequestParts<S> for CurrentIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Identity>().cloned()))
    }
}

/// Caller address used as a rate-limit identifier.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

impl FromRequestParts<Arc<AppState>> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(client_ip(
            &parts.headers,
            &parts.extensions,
            &state.trusted_proxies,
        )))
    }
}

/// Socket peer address, unless the peer is a trusted proxy: then the
/// nearest untrusted `X-Forwarded-For` hop, or `X-Real-IP`.
pub fn client_ip(
    headers: &HeaderMap,
    extensions: &Extensions,
    trusted_proxies: &[IpAddr],
) -> Option<String> {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())?;
    if !trusted_proxies.contains(&peer) {
        return Some(peer.to_string());
    }

    // Proxies append, so anything left of the last untrusted hop is
    // client-controlled
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.rsplit(',')
                .map(|hop| hop.trim().parse::<IpAddr>())
                .find(|hop| !matches!(hop, Ok(ip) if trusted_proxies.contains(ip)))
        })
        .and_then(Result::ok);
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());
    Some(real_ip.unwrap_or(peer).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    fn parts(headers: &[(&'static str, &'static str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/me");
        for (name, value) in headers {
            builder = builder.header(*name, HeaderValue::from_static(value));
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        parts
    }

    fn from_peer(mut p: Parts, peer: &str) -> Parts {
        let addr: SocketAddr = peer.parse().unwrap();
        p.extensions.insert(ConnectInfo(addr));
        p
    }

    #[test]
    fn test_client_ip_ignores_headers_from_untrusted_peer() {
        let p = from_peer(
            parts(&[
                ("x-forwarded-for", "203.0.113.7"),
                ("x-real-ip", "198.51.100.2"),
            ]),
            "192.0.2.10:5555",
        );
        assert_eq!(
            client_ip(&p.headers, &p.extensions, &[]).as_deref(),
            Some("192.0.2.10")
        );

        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(
            client_ip(&p.headers, &p.extensions, &[proxy]).as_deref(),
            Some("192.0.2.10")
        );
    }

    #[test]
    fn test_client_ip_behind_trusted_proxy() {
        let proxies: Vec<IpAddr> = vec!["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()];

        // Leftmost entry is whatever the client sent
        let p = from_peer(
            parts(&[("x-forwarded-for", "1.2.3.4, 203.0.113.7, 10.0.0.2")]),
            "10.0.0.1:443",
        );
        assert_eq!(
            client_ip(&p.headers, &p.extensions, &proxies).as_deref(),
            Some("203.0.113.7")
        );

        let p = from_peer(parts(&[("x-real-ip", "198.51.100.2")]), "10.0.0.1:443");
        assert_eq!(
            client_ip(&p.headers, &p.extensions, &proxies).as_deref(),
            Some("198.51.100.2")
        );

        let p = from_peer(parts(&[("x-forwarded-for", "not-an-ip")]), "10.0.0.1:443");
        assert_eq!(
            client_ip(&p.headers, &p.extensions, &proxies).as_deref(),
            Some("10.0.0.1")
        );
    }

    #[test]
    fn test_client_ip_without_peer() {
        let p = parts(&[("x-forwarded-for", "203.0.113.7")]);
        assert_eq!(client_ip(&p.headers, &p.extensions, &[]), None);
    }

    #[tokio::test]
    async fn test_require_identity_without_identity() {
        let mut p = parts(&[]);
        let err = RequireIdentity::from_request_parts(&mut p, &())
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::Unauthenticated);
    }

    #[tokio::test]
    async fn test_current_identity_is_optional() {
        let mut p = parts(&[]);
        let CurrentIdentity(none) = CurrentIdentity::from_request_parts(&mut p, &())
            .await
            .unwrap();
        assert!(none.is_none());

        p.extensions.insert(Identity::user("alice", 7));
        let CurrentIdentity(some) = CurrentIdentity::from_request_parts(&mut p, &())
            .await
            .unwrap();
        assert_eq!(some.map(|i| i.user_id), Some(7));
    }

    #[tokio::test]
    async fn test_require_admin_rejects_user() {
        let mut p = parts(&[]);
        p.extensions.insert(Identity::user("alice", 7));
        let err = RequireAdmin::from_request_parts(&mut p, &())
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::Forbidden);

        let mut p = parts(&[]);
        p.extensions.insert(Identity::admin(
            "root",
            1,
            crate::token::AdminLevel::Admin,
        ));
        let RequireAdmin(identity) = RequireAdmin::from_request_parts(&mut p, &())
            .await
            .unwrap();
        assert_eq!(identity.subject, "root");
    }
}
