use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Lot record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ParkingLot {
    pub id: i64,
    pub name: String,           // prime location name
    pub address: String,
    pub pin_code: String,
    pub price_per_unit: f64,    // per-hour rate
    pub max_spots: i32,         // capacity, fixed at creation
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Validated input for creating a lot together with its spots.
#[derive(Debug, Clone)]
pub struct NewLot {
    pub name: String,
    pub address: String,
    pub pin_code: String,
    pub price_per_unit: f64,
    pub max_spots: i32,
}

/// Metadata edit. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LotUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub pin_code: Option<String>,
    pub price_per_unit: Option<f64>,
}

impl LotUpdate {
    pub fn apply(&self, lot: &mut ParkingLot) {
        if let Some(name) = &self.name {
            lot.name = name.clone();
        }
        if let Some(address) = &self.address {
            lot.address = address.clone();
        }
        if let Some(pin_code) = &self.pin_code {
            lot.pin_code = pin_code.clone();
        }
        if let Some(price) = self.price_per_unit {
            lot.price_per_unit = price;
        }
    }
}

/// Lot with live spot counts.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LotAvailability {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub lot: ParkingLot,
    pub total_spots: i64,
    pub available_spots: i64,
}
