use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use breaker_db::Database;
use breaker_gateway::dispatcher::Dispatcher;
use breaker_progression::ProgressionService;
use breaker_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, SetCallsignRequest,
};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub progression: Arc<ProgressionService>,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::bad_request(
            "invalid_username",
            "username must be 3-32 characters",
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request(
            "invalid_password",
            "password must be at least 8 characters",
        ));
    }

    // Check if username is taken
    if state
        .db
        .get_user_by_username(&req.username)
        .map_err(ApiError::internal)?
        .is_some()
    {
        return Err(ApiError::conflict("username_taken", "username is taken"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(ApiError::internal)?
        .to_string();

    let user_id = Uuid::new_v4();

    state
        .db
        .create_user(&user_id.to_string(), &req.username, &password_hash)
        .map_err(ApiError::internal)?;

    let token =
        create_token(&state.jwt_secret, user_id, &req.username).map_err(ApiError::internal)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .get_user_by_username(&req.username)
        .map_err(ApiError::internal)?
        .ok_or_else(|| {
            ApiError::new(StatusCode::UNAUTHORIZED, "bad_credentials", "bad credentials")
        })?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password).map_err(ApiError::internal)?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| {
            ApiError::new(StatusCode::UNAUTHORIZED, "bad_credentials", "bad credentials")
        })?;

    let user_id: Uuid = user.id.parse().map_err(ApiError::internal)?;

    let token =
        create_token(&state.jwt_secret, user_id, &user.username).map_err(ApiError::internal)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        callsign: user.callsign,
        token,
    }))
}

/// Set the display callsign shown on subsequent transmissions. Existing
/// transmissions keep the callsign snapshot they were sent with.
pub async fn set_callsign(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetCallsignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let callsign = req.callsign.trim();
    if callsign.is_empty() || callsign.len() > 24 {
        return Err(ApiError::bad_request(
            "invalid_callsign",
            "callsign must be 1-24 characters",
        ));
    }

    state
        .db
        .set_callsign(&claims.sub.to_string(), callsign)
        .map_err(ApiError::internal)?;

    Ok(Json(serde_json::json!({ "callsign": callsign })))
}

fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
