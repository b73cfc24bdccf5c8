use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::instrument;

use super::{
    dto::{AdminOverview, UserActivity, UserDashboard},
    services,
};
use crate::{
    auth::{AdminCaller, Caller},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard/admin", get(admin_overview))
        .route("/dashboard/me", get(my_dashboard))
        .route("/users", get(users))
}

#[instrument(skip(state, _admin))]
pub async fn admin_overview(
    State(state): State<AppState>,
    _admin: AdminCaller,
) -> Result<Json<AdminOverview>, (StatusCode, String)> {
    Ok(Json(services::admin_overview(state.store.as_ref()).await?))
}

#[instrument(skip(state))]
pub async fn my_dashboard(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<UserDashboard>, (StatusCode, String)> {
    Ok(Json(
        services::user_dashboard(state.store.as_ref(), caller.user_id).await?,
    ))
}

#[instrument(skip(state, _admin))]
pub async fn users(
    State(state): State<AppState>,
    _admin: AdminCaller,
) -> Result<Json<Vec<UserActivity>>, (StatusCode, String)> {
    Ok(Json(services::users_activity(state.store.as_ref()).await?))
}
