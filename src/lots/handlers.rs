use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{CreateLotRequest, LotDetails},
    repo_types::{LotAvailability, LotUpdate, ParkingLot},
    services,
};
use crate::{
    auth::{AdminCaller, Caller},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/lots", get(list_lots).post(create_lot))
        .route(
            "/lots/:id",
            get(get_lot).put(update_lot).delete(delete_lot),
        )
}

#[instrument(skip(state))]
pub async fn list_lots(
    State(state): State<AppState>,
    _caller: Caller,
) -> Result<Json<Vec<LotAvailability>>, (StatusCode, String)> {
    Ok(Json(services::list_lots(state.store.as_ref()).await?))
}

#[instrument(skip(state, _admin))]
pub async fn create_lot(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Json(body): Json<CreateLotRequest>,
) -> Result<(StatusCode, Json<ParkingLot>), (StatusCode, String)> {
    let lot = services::create_lot(state.store.as_ref(), body).await?;
    Ok((StatusCode::CREATED, Json(lot)))
}

#[instrument(skip(state, _admin))]
pub async fn get_lot(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<i64>,
) -> Result<Json<LotDetails>, (StatusCode, String)> {
    Ok(Json(services::get_lot(state.store.as_ref(), id).await?))
}

#[instrument(skip(state, _admin))]
pub async fn update_lot(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<i64>,
    Json(body): Json<LotUpdate>,
) -> Result<Json<ParkingLot>, (StatusCode, String)> {
    Ok(Json(services::update_lot(state.store.as_ref(), id, body).await?))
}

#[instrument(skip(state, admin))]
pub async fn delete_lot(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    services::delete_lot(state.store.as_ref(), id).await?;
    info!(lot_id = id, admin = %admin.user_id, "lot deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}
