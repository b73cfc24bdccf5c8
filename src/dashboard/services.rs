use super::dto::{AdminOverview, HistoryEntry, UserActivity, UserDashboard};
use crate::{
    auth::dto::PublicUser,
    error::{ParkingError, ParkingResult},
    reservations::{billing, repo_types::ReservationFilter},
    store::ParkingStore,
};
use uuid::Uuid;

pub async fn admin_overview(store: &dyn ParkingStore) -> ParkingResult<AdminOverview> {
    let total_lots = store.list_lots().await?.len() as i64;
    let spots = store.spot_counts().await?;
    let total_users = store
        .list_users()
        .await?
        .iter()
        .filter(|u| !u.is_admin)
        .count() as i64;
    Ok(AdminOverview {
        total_lots,
        total_spots: spots.total,
        available_spots: spots.available,
        occupied_spots: spots.occupied,
        total_users,
    })
}

pub async fn user_dashboard(store: &dyn ParkingStore, user_id: Uuid) -> ParkingResult<UserDashboard> {
    let user = store
        .find_user(user_id)
        .await?
        .ok_or_else(|| ParkingError::NotFound(format!("user {}", user_id)))?;
    let reservations = store
        .list_reservations(ReservationFilter::for_user(user_id))
        .await?;
    let (open, past): (Vec<_>, Vec<_>) = reservations.iter().partition(|r| r.is_open());

    let history = past
        .iter()
        .filter_map(|r| {
            let charge = billing::compute_cost(r)?;
            Some(HistoryEntry {
                reservation_id: r.id,
                spot_id: r.spot_id?,
                lot_name: r.lot.as_ref()?.name.clone(),
                parking_timestamp: r.parking_timestamp,
                leaving_timestamp: r.leaving_timestamp?,
                duration_minutes: charge.duration_minutes,
                cost: charge.cost,
            })
        })
        .collect();

    Ok(UserDashboard {
        user: PublicUser::from(&user),
        open_reservations: open.len(),
        current_spot: open.first().and_then(|r| r.spot_id),
        past_reservations: past.len(),
        summary: billing::summarize(past.iter().copied()),
        history,
    })
}

/// Every user with their most recent open reservation, if any.
pub async fn users_activity(store: &dyn ParkingStore) -> ParkingResult<Vec<UserActivity>> {
    let open = store
        .list_reservations(ReservationFilter::default().open())
        .await?;
    let users = store.list_users().await?;
    Ok(users
        .iter()
        .map(|u| UserActivity {
            user: PublicUser::from(u),
            // newest first, so the first match is the latest
            latest_open_reservation: open.iter().find(|r| r.user_id == u.id).cloned(),
        })
        .collect())
}
