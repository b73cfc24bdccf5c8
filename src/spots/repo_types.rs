use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Occupancy of a single spot. Mirrors whether an open reservation points at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "spot_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SpotStatus {
    Available,
    Occupied,
}

/// Spot record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ParkingSpot {
    pub id: i64,
    pub lot_id: i64,
    pub status: SpotStatus,
}

impl ParkingSpot {
    pub fn is_available(&self) -> bool {
        self.status == SpotStatus::Available
    }
}

/// Spot totals across every lot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpotCounts {
    pub total: i64,
    pub available: i64,
    pub occupied: i64,
}
