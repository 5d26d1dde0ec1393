use anyhow::Context;
use axum::{
    extract::{FromRef, State},
    http::{header::SET_COOKIE, HeaderMap},
    routing::{get, patch, post},
    Router,
};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::SessionIdentity,
        dto::{
            LoginRequest, PublicUser, RequestResetRequest, ResetPasswordRequest, SignupRequest,
            UpdateProfileRequest, VerifyEmailRequest,
        },
        jwt::TokenCodec,
        password::{hash_password, verify_password},
        repo_types::{NewUser, ProfileUpdate, User},
        services::{
            generate_reset_token, is_valid_email, non_blank, reset_token_expiry,
        },
        session::{clear_session_cookie, session_cookie, AuthUser},
    },
    email::{password_reset_email, reset_link},
    error::{ApiError, AppJson, Envelope},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/request-reset", post(request_reset))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/verify-email", post(verify_email))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(get_me))
        .route("/user", patch(update_profile))
}

fn session_headers(state: &AppState, user: &User) -> Result<HeaderMap, ApiError> {
    let codec = TokenCodec::from_ref(state);
    let token = codec.issue(&SessionIdentity {
        sub: user.id.to_string(),
        email: user.email.clone(),
        name: user.name.clone(),
    })?;
    let cookie = session_cookie(&state.config, &token).context("build session cookie")?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    Ok(headers)
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> Result<(HeaderMap, Envelope<PublicUser>), ApiError> {
    let name = non_blank(payload.name.as_deref());
    let email = non_blank(payload.email.as_deref());
    let password = payload.password.filter(|p| !p.is_empty());
    let (Some(name), Some(email), Some(password)) = (name, email, password) else {
        warn!("signup with missing fields");
        return Err(ApiError::bad_request("Missing fields"));
    };

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::bad_request("Invalid email"));
    }

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let new_user = NewUser {
        name,
        email,
        password_hash: hash_password(&password),
        college: non_blank(payload.college.as_deref()),
        phone: non_blank(payload.phone.as_deref()),
        email_verified: true,
    };
    let Some(user) = state.users.create(new_user).await? else {
        // lost a race with a concurrent signup for the same address
        return Err(ApiError::Conflict("Email already registered".into()));
    };

    let headers = session_headers(&state, &user)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((headers, Envelope::data(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<(HeaderMap, Envelope<PublicUser>), ApiError> {
    let email = non_blank(payload.email.as_deref());
    let password = payload.password.filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::bad_request("Missing credentials"));
    };

    let user = match state.users.find_by_email(&email).await? {
        Some(u) if verify_password(&password, &u.password_hash) => u,
        Some(u) => {
            warn!(user_id = %u.id, "login invalid password");
            return Err(ApiError::Unauthorized("Invalid email or password".into()));
        }
        None => {
            warn!(email = %email, "login unknown email");
            return Err(ApiError::Unauthorized("Invalid email or password".into()));
        }
    };

    let headers = session_headers(&state, &user)?;
    info!(user_id = %user.id, "user logged in");
    Ok((headers, Envelope::data(user.into())))
}

pub async fn logout(State(state): State<AppState>) -> (HeaderMap, Envelope<()>) {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, clear_session_cookie(&state.config));
    (headers, Envelope::ok())
}

async fn load_caller(state: &AppState, claims_sub: &str) -> Result<User, ApiError> {
    let Ok(id) = Uuid::parse_str(claims_sub.trim()) else {
        return Err(ApiError::unauthorized());
    };
    state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(ApiError::unauthorized)
}

#[instrument(skip(state, session))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> Result<Envelope<PublicUser>, ApiError> {
    let user = load_caller(&state, &session.sub).await.map_err(|e| {
        warn!(user_id = %session.sub, "session user not found");
        e
    })?;
    Ok(Envelope::data(user.into()))
}

#[instrument(skip(state, session, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> Result<Envelope<PublicUser>, ApiError> {
    let user = load_caller(&state, &session.sub).await?;
    let update = ProfileUpdate {
        name: payload.name,
        phone: payload.phone,
        college: payload.college,
    };
    let updated = state
        .users
        .update_profile(user.id, update)
        .await?
        .ok_or_else(ApiError::unauthorized)?;
    info!(user_id = %updated.id, "profile updated");
    Ok(Envelope::data(updated.into()))
}

/// Always answers `ok` for a well-formed request so callers cannot probe which
/// addresses have accounts.
#[instrument(skip(state, payload))]
pub async fn request_reset(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RequestResetRequest>,
) -> Result<Envelope<()>, ApiError> {
    let Some(email) = non_blank(payload.email.as_deref()) else {
        return Err(ApiError::bad_request("Email required"));
    };

    let Some(user) = state.users.find_by_email(&email).await? else {
        info!("reset requested for unknown email");
        return Ok(Envelope::ok());
    };

    let token = generate_reset_token();
    let expires = reset_token_expiry(OffsetDateTime::now_utc());
    state.users.set_reset_token(user.id, &token, expires).await?;

    let link = reset_link(&state.config.public_base_url, &token);
    let message = password_reset_email(&user.email, &link);
    let production = state.config.environment.is_production();

    if let Err(e) = state.email.send(&message).await {
        if production {
            error!(error = ?e, user_id = %user.id, "reset email failed");
            return Err(ApiError::Internal(e.context("send password reset email")));
        }
        warn!(error = %e, user_id = %user.id, "reset email failed; continuing in development");
    }

    info!(user_id = %user.id, "password reset issued");
    let body = Envelope::ok();
    if production {
        Ok(body)
    } else {
        Ok(body.with("devToken", json!(token)).with("resetLink", json!(link)))
    }
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<Envelope<()>, ApiError> {
    let token = non_blank(payload.token.as_deref());
    let password = payload.password.filter(|p| !p.is_empty());
    let (Some(token), Some(password)) = (token, password) else {
        return Err(ApiError::bad_request("Missing data"));
    };

    let consumed = state
        .users
        .consume_reset_token(&token, OffsetDateTime::now_utc(), &hash_password(&password))
        .await?;
    match consumed {
        Some(user_id) => {
            info!(%user_id, "password reset completed");
            Ok(Envelope::ok())
        }
        None => {
            warn!("invalid or expired reset token");
            Err(ApiError::bad_request("Invalid or expired token"))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyEmailRequest>,
) -> Result<Envelope<()>, ApiError> {
    let Some(token) = non_blank(payload.token.as_deref()) else {
        return Err(ApiError::bad_request("Missing token"));
    };
    match state.users.consume_verification_token(&token).await? {
        Some(user_id) => {
            info!(%user_id, "email verified");
            Ok(Envelope::ok())
        }
        None => Err(ApiError::bad_request("Invalid token")),
    }
}
