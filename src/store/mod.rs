use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::repo_types::{NewUser, User},
    error::ParkingResult,
    lots::repo_types::{LotAvailability, LotUpdate, NewLot, ParkingLot},
    reservations::repo_types::{Reservation, ReservationFilter},
    spots::{ParkingSpot, SpotCounts},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence for users, lots, spots and the reservation ledger.
///
/// Every write that touches more than one row is a single atomic unit:
/// callers never observe a lot without its spots, or an occupied spot
/// without its open reservation.
#[async_trait]
pub trait ParkingStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> ParkingResult<User>;
    async fn find_user(&self, id: Uuid) -> ParkingResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> ParkingResult<Option<User>>;
    async fn list_users(&self) -> ParkingResult<Vec<User>>;
    async fn has_admin(&self) -> ParkingResult<bool>;

    /// Inserts the lot and `max_spots` available spots.
    async fn insert_lot(&self, lot: NewLot) -> ParkingResult<ParkingLot>;
    async fn update_lot(&self, id: i64, update: LotUpdate) -> ParkingResult<ParkingLot>;
    /// Fails with `Conflict` while any spot of the lot is occupied.
    async fn delete_lot(&self, id: i64) -> ParkingResult<()>;
    async fn find_lot(&self, id: i64) -> ParkingResult<Option<ParkingLot>>;
    async fn list_lots(&self) -> ParkingResult<Vec<LotAvailability>>;

    async fn find_spot(&self, id: i64) -> ParkingResult<Option<ParkingSpot>>;
    async fn list_spots(&self, lot_id: i64) -> ParkingResult<Vec<ParkingSpot>>;
    async fn spot_counts(&self) -> ParkingResult<SpotCounts>;

    /// Marks the first available spot of the lot occupied and opens a
    /// reservation on it, snapshotting the lot price.
    async fn claim_spot(
        &self,
        lot_id: i64,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> ParkingResult<Reservation>;
    /// Closes an open reservation and frees its spot. Returns `false` when the
    /// reservation was already closed.
    async fn close_reservation(&self, id: i64, now: OffsetDateTime) -> ParkingResult<bool>;
    async fn find_reservation(&self, id: i64) -> ParkingResult<Option<Reservation>>;
    /// Newest first.
    async fn list_reservations(&self, filter: ReservationFilter) -> ParkingResult<Vec<Reservation>>;
}
