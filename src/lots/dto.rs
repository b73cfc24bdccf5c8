use serde::{Deserialize, Serialize};

use super::repo_types::ParkingLot;
use crate::spots::ParkingSpot;

#[derive(Debug, Deserialize)]
pub struct CreateLotRequest {
    pub name: String,
    pub address: String,
    pub pin_code: String,
    pub price_per_unit: f64,
    pub max_spots: i32,
}

#[derive(Debug, Serialize)]
pub struct LotDetails {
    #[serde(flatten)]
    pub lot: ParkingLot,
    pub spots: Vec<ParkingSpot>,
}
