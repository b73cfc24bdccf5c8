use serde::{Deserialize, Serialize};

use super::{
    billing::{self, Charge},
    repo_types::Reservation,
};

/// A reservation together with its charge once closed.
#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub charge: Option<Charge>,
}

impl From<Reservation> for ReservationResponse {
    fn from(reservation: Reservation) -> Self {
        let charge = billing::compute_cost(&reservation);
        Self {
            reservation,
            charge,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LedgerQuery {
    #[serde(default)]
    pub open: bool,
}

pub fn into_responses(rows: Vec<Reservation>) -> Vec<ReservationResponse> {
    rows.into_iter().map(ReservationResponse::from).collect()
}
