use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument};

use super::{
    dto::{AuthResponse, JwtKeys, LoginRequest, PublicUser, RefreshRequest, RegisterRequest},
    jwt::Caller,
    repo_types::User,
    services,
};
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn issue_tokens(state: &AppState, user: &User) -> Result<AuthResponse, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(state);
    let sign = |r: anyhow::Result<String>| {
        r.map_err(|e| {
            error!(error = %e, user_id = %user.id, "jwt sign failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
    };
    Ok(AuthResponse {
        access_token: sign(keys.sign_access(user.id, user.is_admin))?,
        refresh_token: sign(keys.sign_refresh(user.id))?,
        user: PublicUser::from(user),
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), (StatusCode, String)> {
    let user = services::register(
        state.store.as_ref(),
        &payload.email,
        &payload.username,
        &payload.password,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(issue_tokens(&state, &user)?)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let user = services::authenticate(state.store.as_ref(), &payload.email, &payload.password)
        .await?
        .ok_or((StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()))?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(issue_tokens(&state, &user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, format!("{}", e)))?;

    let user = state
        .store
        .find_user(claims.sub)
        .await?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;
    Ok(Json(issue_tokens(&state, &user)?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = state.store.find_user(caller.user_id).await?.ok_or_else(|| {
        error!(user_id = %caller.user_id, "user not found");
        (StatusCode::UNAUTHORIZED, "User not found".to_string())
    })?;
    Ok(Json(PublicUser::from(&user)))
}
