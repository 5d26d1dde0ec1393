use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE},
        request::Parts,
        HeaderMap, HeaderValue,
    },
};
use tracing::warn;

use super::{claims::SessionClaims, jwt::TokenCodec};
use crate::{config::AppConfig, error::ApiError};

pub const SESSION_COOKIE: &str = "campusshelf_token";
pub const SESSION_COOKIE_MAX_AGE: u64 = 60 * 60 * 24 * 7;

/// Resolve the caller from the request headers. No store access.
pub fn resolve_session(headers: &HeaderMap, codec: &TokenCodec) -> Option<SessionClaims> {
    let token = extract_session_token(headers)?;
    codec.verify(&token)
}

/// Cookie first, then `Authorization: Bearer` for non-browser clients.
fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = cookie_value(headers, SESSION_COOKIE) {
        return Some(token);
    }
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn session_cookie(config: &AppConfig, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_COOKIE_MAX_AGE}"
    );
    if config.environment.is_production() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn clear_session_cookie(config: &AppConfig) -> HeaderValue {
    let mut cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.environment.is_production() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// An authenticated caller. Rejects with 401 before any body is read.
pub struct AuthUser(pub SessionClaims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenCodec: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let codec = TokenCodec::from_ref(state);
        match resolve_session(&parts.headers, &codec) {
            Some(claims) => Ok(AuthUser(claims)),
            None => {
                warn!(uri = %parts.uri, "missing or invalid session");
                Err(ApiError::unauthorized())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::SessionIdentity;
    use std::time::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new("dev-secret", Duration::from_secs(3600))
    }

    fn token() -> String {
        codec()
            .issue(&SessionIdentity {
                sub: "u1".into(),
                email: "a@x.com".into(),
                name: "A".into(),
            })
            .unwrap()
    }

    #[test]
    fn resolves_from_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            format!("theme=dark; {SESSION_COOKIE}={}; lang=en", token()).parse().unwrap(),
        );
        let claims = resolve_session(&headers, &codec()).expect("session");
        assert_eq!(claims.sub, "u1");
    }

    #[test]
    fn resolves_from_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {}", token()).parse().unwrap());
        assert!(resolve_session(&headers, &codec()).is_some());
    }

    #[test]
    fn absent_and_invalid_are_both_none() {
        assert!(resolve_session(&HeaderMap::new(), &codec()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, format!("{SESSION_COOKIE}=garbage").parse().unwrap());
        assert!(resolve_session(&headers, &codec()).is_none());
    }

    #[test]
    fn session_cookie_attributes() {
        let config = crate::testing::test_config();
        let cookie = session_cookie(&config, "tok").unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("campusshelf_token=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=604800"));
    }
}
