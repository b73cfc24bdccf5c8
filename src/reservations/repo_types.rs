use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Row shape of the ledger query: the reservation joined with its spot's lot.
#[derive(Debug, FromRow)]
pub struct ReservationRow {
    pub id: i64,
    pub spot_id: Option<i64>,
    pub user_id: Uuid,
    pub parking_timestamp: OffsetDateTime,
    pub leaving_timestamp: Option<OffsetDateTime>,
    pub cost_per_unit: f64,
    pub lot_id: Option<i64>,
    pub lot_name: Option<String>,
}

/// One occupancy period of one spot by one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservation {
    pub id: i64,
    /// Cleared when the spot's lot is deleted after the reservation closed.
    pub spot_id: Option<i64>,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub parking_timestamp: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub leaving_timestamp: Option<OffsetDateTime>,
    /// Lot price captured when the reservation was opened.
    pub cost_per_unit: f64,
    pub lot: Option<ReservationLot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservationLot {
    pub id: i64,
    pub name: String,
}

impl Reservation {
    pub fn is_open(&self) -> bool {
        self.leaving_timestamp.is_none()
    }
}

impl From<ReservationRow> for Reservation {
    fn from(r: ReservationRow) -> Self {
        let lot = match (r.lot_id, r.lot_name) {
            (Some(id), Some(name)) => Some(ReservationLot { id, name }),
            _ => None,
        };
        Self {
            id: r.id,
            spot_id: r.spot_id,
            user_id: r.user_id,
            parking_timestamp: r.parking_timestamp,
            leaving_timestamp: r.leaving_timestamp,
            cost_per_unit: r.cost_per_unit,
            lot,
        }
    }
}

/// Ledger query. Every set field narrows the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReservationFilter {
    pub user_id: Option<Uuid>,
    pub lot_id: Option<i64>,
    pub spot_id: Option<i64>,
    pub open_only: bool,
}

impl ReservationFilter {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn for_lot(lot_id: i64) -> Self {
        Self {
            lot_id: Some(lot_id),
            ..Self::default()
        }
    }

    pub fn for_spot(spot_id: i64) -> Self {
        Self {
            spot_id: Some(spot_id),
            ..Self::default()
        }
    }

    pub fn open(mut self) -> Self {
        self.open_only = true;
        self
    }

    pub fn matches(&self, r: &Reservation) -> bool {
        self.user_id.map_or(true, |u| r.user_id == u)
            && self.lot_id.map_or(true, |l| r.lot.as_ref().map(|lot| lot.id) == Some(l))
            && self.spot_id.map_or(true, |s| r.spot_id == Some(s))
            && (!self.open_only || r.is_open())
    }
}
