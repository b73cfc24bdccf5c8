use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::ParkingStore;
use crate::{
    auth::repo_types::{NewUser, User},
    error::{ParkingError, ParkingResult},
    lots::repo_types::{LotAvailability, LotUpdate, NewLot, ParkingLot},
    reservations::repo_types::{Reservation, ReservationFilter, ReservationLot},
    spots::{ParkingSpot, SpotCounts, SpotStatus},
};

/// Process-local store. One mutex guards every table, so each trait call is
/// an atomic unit.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    lots: BTreeMap<i64, ParkingLot>,
    spots: BTreeMap<i64, ParkingSpot>,
    reservations: BTreeMap<i64, StoredReservation>,
    next_lot: i64,
    next_spot: i64,
    next_reservation: i64,
}

struct StoredReservation {
    id: i64,
    spot_id: Option<i64>,
    user_id: Uuid,
    parking_timestamp: OffsetDateTime,
    leaving_timestamp: Option<OffsetDateTime>,
    cost_per_unit: f64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn view(&self, r: &StoredReservation) -> Reservation {
        let lot = r
            .spot_id
            .and_then(|s| self.spots.get(&s))
            .and_then(|spot| self.lots.get(&spot.lot_id))
            .map(|lot| ReservationLot {
                id: lot.id,
                name: lot.name.clone(),
            });
        Reservation {
            id: r.id,
            spot_id: r.spot_id,
            user_id: r.user_id,
            parking_timestamp: r.parking_timestamp,
            leaving_timestamp: r.leaving_timestamp,
            cost_per_unit: r.cost_per_unit,
            lot,
        }
    }

    fn has_open_reservation(&self, spot_id: i64) -> bool {
        self.reservations
            .values()
            .any(|r| r.spot_id == Some(spot_id) && r.leaving_timestamp.is_none())
    }
}

#[async_trait]
impl ParkingStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> ParkingResult<User> {
        let mut t = self.inner.lock().await;
        if t.users.iter().any(|u| u.email == user.email) {
            return Err(ParkingError::Conflict(format!(
                "email {} already registered",
                user.email
            )));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            is_admin: user.is_admin,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> ParkingResult<Option<User>> {
        let t = self.inner.lock().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> ParkingResult<Option<User>> {
        let t = self.inner.lock().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> ParkingResult<Vec<User>> {
        Ok(self.inner.lock().await.users.clone())
    }

    async fn has_admin(&self) -> ParkingResult<bool> {
        Ok(self.inner.lock().await.users.iter().any(|u| u.is_admin))
    }

    async fn insert_lot(&self, new: NewLot) -> ParkingResult<ParkingLot> {
        let mut t = self.inner.lock().await;
        t.next_lot += 1;
        let lot = ParkingLot {
            id: t.next_lot,
            name: new.name,
            address: new.address,
            pin_code: new.pin_code,
            price_per_unit: new.price_per_unit,
            max_spots: new.max_spots,
            created_at: OffsetDateTime::now_utc(),
        };
        for _ in 0..new.max_spots {
            t.next_spot += 1;
            let id = t.next_spot;
            t.spots.insert(
                id,
                ParkingSpot {
                    id,
                    lot_id: lot.id,
                    status: SpotStatus::Available,
                },
            );
        }
        t.lots.insert(lot.id, lot.clone());
        Ok(lot)
    }

    async fn update_lot(&self, id: i64, update: LotUpdate) -> ParkingResult<ParkingLot> {
        let mut t = self.inner.lock().await;
        let lot = t
            .lots
            .get_mut(&id)
            .ok_or_else(|| ParkingError::NotFound(format!("lot {}", id)))?;
        update.apply(lot);
        Ok(lot.clone())
    }

    async fn delete_lot(&self, id: i64) -> ParkingResult<()> {
        let mut t = self.inner.lock().await;
        if !t.lots.contains_key(&id) {
            return Err(ParkingError::NotFound(format!("lot {}", id)));
        }
        let spot_ids: Vec<i64> = t
            .spots
            .values()
            .filter(|s| s.lot_id == id)
            .map(|s| s.id)
            .collect();
        if spot_ids.iter().any(|s| t.has_open_reservation(*s)) {
            return Err(ParkingError::Conflict(format!(
                "lot {} has open reservations",
                id
            )));
        }
        for r in t.reservations.values_mut() {
            if r.spot_id.is_some_and(|s| spot_ids.contains(&s)) {
                r.spot_id = None;
            }
        }
        for s in &spot_ids {
            t.spots.remove(s);
        }
        t.lots.remove(&id);
        Ok(())
    }

    async fn find_lot(&self, id: i64) -> ParkingResult<Option<ParkingLot>> {
        Ok(self.inner.lock().await.lots.get(&id).cloned())
    }

    async fn list_lots(&self) -> ParkingResult<Vec<LotAvailability>> {
        let t = self.inner.lock().await;
        let lots = t
            .lots
            .values()
            .map(|lot| {
                let spots = t.spots.values().filter(|s| s.lot_id == lot.id);
                let (total, available) = spots.fold((0, 0), |(total, available), s| {
                    (total + 1, available + i64::from(s.is_available()))
                });
                LotAvailability {
                    lot: lot.clone(),
                    total_spots: total,
                    available_spots: available,
                }
            })
            .collect();
        Ok(lots)
    }

    async fn find_spot(&self, id: i64) -> ParkingResult<Option<ParkingSpot>> {
        Ok(self.inner.lock().await.spots.get(&id).cloned())
    }

    async fn list_spots(&self, lot_id: i64) -> ParkingResult<Vec<ParkingSpot>> {
        let t = self.inner.lock().await;
        Ok(t.spots
            .values()
            .filter(|s| s.lot_id == lot_id)
            .cloned()
            .collect())
    }

    async fn spot_counts(&self) -> ParkingResult<SpotCounts> {
        let t = self.inner.lock().await;
        let total = t.spots.len() as i64;
        let available = t.spots.values().filter(|s| s.is_available()).count() as i64;
        Ok(SpotCounts {
            total,
            available,
            occupied: total - available,
        })
    }

    async fn claim_spot(
        &self,
        lot_id: i64,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> ParkingResult<Reservation> {
        let mut t = self.inner.lock().await;
        let price = t
            .lots
            .get(&lot_id)
            .map(|lot| lot.price_per_unit)
            .ok_or_else(|| ParkingError::NotFound(format!("lot {}", lot_id)))?;
        // BTreeMap iterates by id, i.e. creation order.
        let spot = t
            .spots
            .values_mut()
            .find(|s| s.lot_id == lot_id && s.is_available())
            .ok_or(ParkingError::NoAvailableSpot(lot_id))?;
        spot.status = SpotStatus::Occupied;
        let spot_id = spot.id;

        t.next_reservation += 1;
        let stored = StoredReservation {
            id: t.next_reservation,
            spot_id: Some(spot_id),
            user_id,
            parking_timestamp: now,
            leaving_timestamp: None,
            cost_per_unit: price,
        };
        let view = t.view(&stored);
        t.reservations.insert(stored.id, stored);
        Ok(view)
    }

    async fn close_reservation(&self, id: i64, now: OffsetDateTime) -> ParkingResult<bool> {
        let mut t = self.inner.lock().await;
        let r = t
            .reservations
            .get_mut(&id)
            .ok_or_else(|| ParkingError::NotFound(format!("reservation {}", id)))?;
        if r.leaving_timestamp.is_some() {
            return Ok(false);
        }
        r.leaving_timestamp = Some(now);
        let spot_id = r.spot_id;
        if let Some(spot_id) = spot_id {
            if let Some(spot) = t.spots.get_mut(&spot_id) {
                spot.status = SpotStatus::Available;
            }
        }
        Ok(true)
    }

    async fn find_reservation(&self, id: i64) -> ParkingResult<Option<Reservation>> {
        let t = self.inner.lock().await;
        Ok(t.reservations.get(&id).map(|r| t.view(r)))
    }

    async fn list_reservations(&self, filter: ReservationFilter) -> ParkingResult<Vec<Reservation>> {
        let t = self.inner.lock().await;
        let mut out: Vec<Reservation> = t
            .reservations
            .values()
            .map(|r| t.view(r))
            .filter(|r| filter.matches(r))
            .collect();
        out.sort_by(|a, b| {
            b.parking_timestamp
                .cmp(&a.parking_timestamp)
                .then(b.id.cmp(&a.id))
        });
        Ok(out)
    }
}
