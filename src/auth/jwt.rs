use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::OffsetDateTime;
use tracing::debug;

use super::claims::{SessionClaims, SessionIdentity};
use crate::state::AppState;

/// Issues and verifies HS256 session credentials.
///
/// A credential is `header.payload.signature`, each segment URL-safe base64, the
/// signature being HMAC-SHA256 over `header.payload` with the server secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl FromRef<AppState> for TokenCodec {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.jwt.secret, state.config.jwt.ttl)
    }
}

impl TokenCodec {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, identity: &SessionIdentity) -> anyhow::Result<String> {
        self.issue_at(identity, self.ttl, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn issue_at(
        &self,
        identity: &SessionIdentity,
        ttl: Duration,
        now: i64,
    ) -> anyhow::Result<String> {
        let claims = SessionClaims {
            sub: identity.sub.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = %claims.sub, exp = claims.exp, "session token signed");
        Ok(token)
    }

    /// `None` for anything malformed, forged, or expired. Callers treat that the
    /// same as no credential at all.
    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        self.verify_at(token, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Option<SessionClaims> {
        if token.split('.').count() != 3 {
            return None;
        }

        // Signature comparison inside jsonwebtoken is constant-time. Expiry is
        // checked here against `now` so there is no leeway.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<SessionClaims>(token, &self.decoding, &validation)
            .ok()?
            .claims;
        if now > claims.exp {
            debug!(user_id = %claims.sub, "session token expired");
            return None;
        }
        Some(claims)
    }
}
