use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    auth::dto::PublicUser,
    reservations::{billing::BillingSummary, repo_types::Reservation},
};

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AdminOverview {
    pub total_lots: i64,
    pub total_spots: i64,
    pub available_spots: i64,
    pub occupied_spots: i64,
    pub total_users: i64,
}

/// One billed, closed reservation.
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub reservation_id: i64,
    pub spot_id: i64,
    pub lot_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub parking_timestamp: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub leaving_timestamp: OffsetDateTime,
    pub duration_minutes: i64,
    pub cost: f64,
}

#[derive(Debug, Serialize)]
pub struct UserDashboard {
    pub user: PublicUser,
    pub open_reservations: usize,
    /// Spot of the most recent open reservation.
    pub current_spot: Option<i64>,
    pub past_reservations: usize,
    pub summary: BillingSummary,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct UserActivity {
    #[serde(flatten)]
    pub user: PublicUser,
    pub latest_open_reservation: Option<Reservation>,
}
