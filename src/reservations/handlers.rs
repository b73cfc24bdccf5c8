use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{into_responses, LedgerQuery, ReservationResponse},
    services,
};
use crate::{
    auth::{AdminCaller, Caller},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/lots/:id/reservations",
            post(reserve_spot).get(lot_reservations),
        )
        .route("/spots/:id/reservations", get(spot_reservations))
        .route("/reservations", get(all_reservations))
        .route("/reservations/me", get(my_reservations))
        .route("/reservations/:id/end", post(end_reservation))
}

#[instrument(skip(state))]
pub async fn reserve_spot(
    State(state): State<AppState>,
    caller: Caller,
    Path(lot_id): Path<i64>,
) -> Result<(StatusCode, HeaderMap, Json<ReservationResponse>), (StatusCode, String)> {
    let reservation = services::reserve_spot(state.store.as_ref(), lot_id, caller.user_id).await?;

    let mut headers = HeaderMap::new();
    let location: HeaderValue = format!("/api/v1/reservations/{}", reservation.id)
        .parse()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "bad location".to_string()))?;
    headers.insert(axum::http::header::LOCATION, location);

    Ok((StatusCode::CREATED, headers, Json(reservation.into())))
}

#[instrument(skip(state))]
pub async fn end_reservation(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ReservationResponse>, (StatusCode, String)> {
    let reservation = services::end_reservation(state.store.as_ref(), id, caller).await?;
    Ok(Json(reservation.into()))
}

#[instrument(skip(state))]
pub async fn my_reservations(
    State(state): State<AppState>,
    caller: Caller,
    Query(q): Query<LedgerQuery>,
) -> Result<Json<Vec<ReservationResponse>>, (StatusCode, String)> {
    let store = state.store.as_ref();
    let rows = if q.open {
        services::open_reservations(store, Some(caller.user_id)).await?
    } else {
        services::user_reservations(store, caller.user_id).await?
    };
    Ok(Json(into_responses(rows)))
}

#[instrument(skip(state, _admin))]
pub async fn all_reservations(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Query(q): Query<LedgerQuery>,
) -> Result<Json<Vec<ReservationResponse>>, (StatusCode, String)> {
    let store = state.store.as_ref();
    let rows = if q.open {
        services::open_reservations(store, None).await?
    } else {
        services::history(store).await?
    };
    Ok(Json(into_responses(rows)))
}

#[instrument(skip(state, _admin))]
pub async fn lot_reservations(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(lot_id): Path<i64>,
) -> Result<Json<Vec<ReservationResponse>>, (StatusCode, String)> {
    let rows = services::lot_reservations(state.store.as_ref(), lot_id).await?;
    Ok(Json(into_responses(rows)))
}

#[instrument(skip(state, _admin))]
pub async fn spot_reservations(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(spot_id): Path<i64>,
) -> Result<Json<Vec<ReservationResponse>>, (StatusCode, String)> {
    let rows = services::spot_reservations(state.store.as_ref(), spot_id).await?;
    Ok(Json(into_responses(rows)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lots::repo_types::NewLot;

    #[tokio::test]
    async fn reserve_and_end_over_http_handlers() {
        let state = AppState::fake();
        let user = crate::auth::services::register(
            state.store.as_ref(),
            "sam@lots.io",
            "Sam",
            "long-enough",
        )
        .await
        .unwrap();
        let lot = state
            .store
            .insert_lot(NewLot {
                name: "Depot".into(),
                address: "9 Rail Way".into(),
                pin_code: "110001".into(),
                price_per_unit: 30.0,
                max_spots: 1,
            })
            .await
            .unwrap();
        let caller = Caller {
            user_id: user.id,
            is_admin: false,
        };

        let (status, headers, Json(opened)) =
            reserve_spot(State(state.clone()), caller, Path(lot.id)).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(headers.contains_key(axum::http::header::LOCATION));
        assert!(opened.charge.is_none());

        let (status, msg) = reserve_spot(State(state.clone()), caller, Path(lot.id))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(msg.contains("no available spot"));

        let Json(closed) = end_reservation(State(state.clone()), caller, Path(opened.reservation.id))
            .await
            .unwrap();
        assert!(closed.charge.is_some());

        let Json(mine) = my_reservations(State(state), caller, Query(LedgerQuery { open: true }))
            .await
            .unwrap();
        assert!(mine.is_empty());
    }

    #[test]
    fn response_flattens_reservation() {
        let r = crate::reservations::repo_types::Reservation {
            id: 7,
            spot_id: Some(3),
            user_id: uuid::Uuid::nil(),
            parking_timestamp: time::macros::datetime!(2025-01-01 10:00 UTC),
            leaving_timestamp: None,
            cost_per_unit: 20.0,
            lot: None,
        };
        let json = serde_json::to_value(ReservationResponse::from(r)).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["cost_per_unit"], 20.0);
        assert!(json["charge"].is_null());
        assert!(json["leaving_timestamp"].is_null());
    }
}
