//! Paths that skip request authentication.
//!
//! Entry forms:
//! - `/api/v1/auth/`: prefix (trailing slash); also matches `/api/v1/auth`
//! - `/api/v1/admin/2fa/verify-login`: exact path, any method
//! - `GET /api/v1/sessions/public`: exact path, one method

use axum::http::Method;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathRule {
    Prefix(String),
    Exact(String),
}

impl PathRule {
    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => {
                path.starts_with(prefix.as_str()) || path == prefix.trim_end_matches('/')
            }
            Self::Exact(exact) => path == exact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AllowRule {
    method: Option<Method>,
    path: PathRule,
}

#[derive(Debug, Clone, Default)]
pub struct AllowList {
    rules: Vec<AllowRule>,
}

impl AllowList {
    /// Parse config entries. Unparsable entries are skipped with a warning.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Self {
        let rules = entries
            .iter()
            .filter_map(|entry| {
                let rule = Self::parse(entry.as_ref());
                if rule.is_none() {
                    tracing::warn!(entry = %entry.as_ref(), "Ignoring invalid public path entry");
                }
                rule
            })
            .collect();
        Self { rules }
    }

    fn parse(entry: &str) -> Option<AllowRule> {
        let entry = entry.trim();
        let (method, path) = match entry.split_once(' ') {
            Some((method, path)) => (Some(Method::from_bytes(method.as_bytes()).ok()?), path.trim()),
            None => (None, entry),
        };
        if !path.starts_with('/') {
            return None;
        }
        let path = if path.len() > 1 && path.ends_with('/') {
            PathRule::Prefix(path.to_string())
        } else {
            PathRule::Exact(path.to_string())
        };
        Some(AllowRule { method, path })
    }

    pub fn is_public(&self, method: &Method, path: &str) -> bool {
        self.rules.iter().any(|rule| {
            rule.method.as_ref().is_none_or(|m| m == method) && rule.path.matches(path)
        })
    }
}
