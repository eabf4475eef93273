//! Caller authentication for mutating ingress routes.
//!
//! The caller's identity is only used to admit the request; it never becomes
//! part of an aggregation key.

use std::collections::HashMap;
use std::fmt;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::response::AppError;
use crate::state::AppState;

/// Cookie carrying the session token when no `Authorization` header is sent.
pub const AUTH_COOKIE_NAME: &str = "token";

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub name: String,
}

/// Verifies request tokens.
pub trait Authenticator: Send + Sync + 'static {
    /// Returns the caller for `token`, or `None` to reject the request.
    fn authenticate(&self, token: Option<&str>) -> Option<Caller>;
}

/// Accepts a fixed set of API tokens.
pub struct StaticTokens {
    tokens: HashMap<String, Caller>,
}

impl StaticTokens {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens = tokens
            .into_iter()
            .map(Into::into)
            .filter(|token: &String| !token.trim().is_empty())
            .enumerate()
            .map(|(index, token)| {
                let caller = Caller {
                    name: format!("api-token-{}", index + 1),
                };
                (token, caller)
            })
            .collect();
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Debug for StaticTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokens")
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl Authenticator for StaticTokens {
    fn authenticate(&self, token: Option<&str>) -> Option<Caller> {
        token.and_then(|token| self.tokens.get(token)).cloned()
    }
}

/// Admits every request. For local single-user deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn authenticate(&self, _token: Option<&str>) -> Option<Caller> {
        Some(Caller {
            name: "local".to_string(),
        })
    }
}

fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Reads the caller's token from the `token` cookie or a bearer header.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = get_cookie(headers, AUTH_COOKIE_NAME) {
        return Some(token);
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    auth_header
        .strip_prefix("Bearer ")
        .map(|value| value.trim().to_string())
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = extract_token(req.headers());
    let Some(caller) = state.authenticator().authenticate(token.as_deref()) else {
        let message = if token.is_some() {
            "invalid credentials"
        } else {
            "missing credentials"
        };
        tracing::debug!(path = %req.uri().path(), message, "request rejected");
        return AppError::unauthorized(message).into_response();
    };
    req.extensions_mut().insert(caller);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extract_token_prefers_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; token=cookie-token"),
        );
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("cookie-token"));
    }

    #[test]
    fn extract_token_reads_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("header-token"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_token(&headers), None);
    }

    #[test]
    fn static_tokens_match_exactly() {
        let auth = StaticTokens::new(["alpha", "", "beta"]);
        assert_eq!(
            auth.authenticate(Some("beta")).map(|caller| caller.name),
            Some("api-token-2".to_string())
        );
        assert!(auth.authenticate(Some("alph")).is_none());
        assert!(auth.authenticate(None).is_none());
        assert!(auth.authenticate(Some("")).is_none());
    }

    #[test]
    fn static_tokens_debug_hides_values() {
        let auth = StaticTokens::new(["secret-token"]);
        assert!(!format!("{auth:?}").contains("secret-token"));
    }
}
