//! Allocation engine: opens reservations on free spots and closes them again.

use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    billing,
    repo_types::{Reservation, ReservationFilter},
};
use crate::{
    auth::Caller,
    error::{ParkingError, ParkingResult},
    store::ParkingStore,
};

/// Lost claim races retried before `Conflict` reaches the caller.
const MAX_CLAIM_ATTEMPTS: usize = 5;

pub async fn reserve_spot(
    store: &dyn ParkingStore,
    lot_id: i64,
    user_id: Uuid,
) -> ParkingResult<Reservation> {
    reserve_spot_at(store, lot_id, user_id, OffsetDateTime::now_utc()).await
}

/// Occupies the first free spot of the lot for `user_id`, opening a
/// reservation at `now` priced at the lot's current rate.
pub async fn reserve_spot_at(
    store: &dyn ParkingStore,
    lot_id: i64,
    user_id: Uuid,
    now: OffsetDateTime,
) -> ParkingResult<Reservation> {
    if store.find_user(user_id).await?.is_none() {
        return Err(ParkingError::NotFound(format!("user {}", user_id)));
    }

    let mut attempt = 1;
    loop {
        match store.claim_spot(lot_id, user_id, now).await {
            Ok(r) => {
                info!(
                    reservation_id = r.id,
                    lot_id,
                    spot_id = ?r.spot_id,
                    user_id = %user_id,
                    cost_per_unit = r.cost_per_unit,
                    "spot reserved"
                );
                return Ok(r);
            }
            Err(ParkingError::Conflict(reason)) if attempt < MAX_CLAIM_ATTEMPTS => {
                debug!(lot_id, attempt, %reason, "claim race lost, retrying");
                attempt += 1;
            }
            Err(ParkingError::NoAvailableSpot(_)) => {
                info!(lot_id, user_id = %user_id, "lot full");
                return Err(ParkingError::NoAvailableSpot(lot_id));
            }
            Err(e) => return Err(e),
        }
    }
}

pub async fn end_reservation(
    store: &dyn ParkingStore,
    reservation_id: i64,
    caller: Caller,
) -> ParkingResult<Reservation> {
    end_reservation_at(store, reservation_id, caller, OffsetDateTime::now_utc()).await
}

/// Closes the reservation at `now` and frees its spot. Closing an already
/// closed reservation succeeds without changing anything.
pub async fn end_reservation_at(
    store: &dyn ParkingStore,
    reservation_id: i64,
    caller: Caller,
    now: OffsetDateTime,
) -> ParkingResult<Reservation> {
    let reservation = store
        .find_reservation(reservation_id)
        .await?
        .ok_or_else(|| ParkingError::NotFound(format!("reservation {}", reservation_id)))?;

    if reservation.user_id != caller.user_id && !caller.is_admin {
        warn!(reservation_id, caller = %caller.user_id, "end reservation denied");
        return Err(ParkingError::Unauthorized(format!(
            "end reservation {}",
            reservation_id
        )));
    }

    if !reservation.is_open() {
        debug!(reservation_id, "reservation already closed");
        return Ok(reservation);
    }

    if !store.close_reservation(reservation_id, now).await? {
        debug!(reservation_id, "reservation closed concurrently");
    }

    let closed = store
        .find_reservation(reservation_id)
        .await?
        .ok_or_else(|| ParkingError::NotFound(format!("reservation {}", reservation_id)))?;
    let charge = billing::compute_cost(&closed);
    info!(
        reservation_id,
        spot_id = ?closed.spot_id,
        minutes = charge.map(|c| c.duration_minutes),
        cost = charge.map(|c| c.cost),
        "reservation ended"
    );
    Ok(closed)
}

/// Every reservation of the user, newest first.
pub async fn user_reservations(
    store: &dyn ParkingStore,
    user_id: Uuid,
) -> ParkingResult<Vec<Reservation>> {
    store.list_reservations(ReservationFilter::for_user(user_id)).await
}

/// Open reservations, system-wide or for one user.
pub async fn open_reservations(
    store: &dyn ParkingStore,
    user_id: Option<Uuid>,
) -> ParkingResult<Vec<Reservation>> {
    let filter = ReservationFilter {
        user_id,
        ..ReservationFilter::default()
    };
    store.list_reservations(filter.open()).await
}

pub async fn lot_reservations(
    store: &dyn ParkingStore,
    lot_id: i64,
) -> ParkingResult<Vec<Reservation>> {
    if store.find_lot(lot_id).await?.is_none() {
        return Err(ParkingError::NotFound(format!("lot {}", lot_id)));
    }
    store.list_reservations(ReservationFilter::for_lot(lot_id)).await
}

pub async fn spot_reservations(
    store: &dyn ParkingStore,
    spot_id: i64,
) -> ParkingResult<Vec<Reservation>> {
    if store.find_spot(spot_id).await?.is_none() {
        return Err(ParkingError::NotFound(format!("spot {}", spot_id)));
    }
    store.list_reservations(ReservationFilter::for_spot(spot_id)).await
}

/// The whole ledger, newest first.
pub async fn history(store: &dyn ParkingStore) -> ParkingResult<Vec<Reservation>> {
    store.list_reservations(ReservationFilter::default()).await
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use time::{macros::datetime, Duration};

    use super::*;
    use crate::{
        auth::repo_types::NewUser,
        lots::repo_types::{LotUpdate, NewLot, ParkingLot},
        spots::SpotStatus,
        store::MemoryStore,
    };

    const T0: OffsetDateTime = datetime!(2025-06-02 09:00 UTC);

    async fn user(store: &dyn ParkingStore, email: &str, is_admin: bool) -> Caller {
        let u = store
            .insert_user(NewUser {
                email: email.into(),
                username: email.into(),
                password_hash: "unused".into(),
                is_admin,
            })
            .await
            .unwrap();
        Caller {
            user_id: u.id,
            is_admin,
        }
    }

    async fn lot(store: &dyn ParkingStore, price: f64, capacity: i32) -> ParkingLot {
        store
            .insert_lot(NewLot {
                name: "Harbour".into(),
                address: "3 Dock Ln".into(),
                pin_code: "600001".into(),
                price_per_unit: price,
                max_spots: capacity,
            })
            .await
            .unwrap()
    }

    /// Occupied iff exactly one open reservation points at the spot.
    async fn assert_status_mirrors_ledger(store: &dyn ParkingStore) {
        let open = open_reservations(store, None).await.unwrap();
        for l in store.list_lots().await.unwrap() {
            for spot in store.list_spots(l.lot.id).await.unwrap() {
                let holders = open.iter().filter(|r| r.spot_id == Some(spot.id)).count();
                assert!(holders <= 1, "spot {} double booked", spot.id);
                assert_eq!(
                    spot.status == SpotStatus::Occupied,
                    holders == 1,
                    "spot {} status out of sync",
                    spot.id
                );
            }
        }
    }

    #[tokio::test]
    async fn allocates_in_creation_order_with_price_snapshot() {
        let store = MemoryStore::new();
        let driver = user(&store, "d@x.io", false).await;
        let l = lot(&store, 10.0, 3).await;
        let spots = store.list_spots(l.id).await.unwrap();

        let first = reserve_spot_at(&store, l.id, driver.user_id, T0).await.unwrap();
        let second = reserve_spot_at(&store, l.id, driver.user_id, T0).await.unwrap();

        assert_eq!(first.spot_id, Some(spots[0].id));
        assert_eq!(second.spot_id, Some(spots[1].id));
        assert_eq!(first.cost_per_unit, 10.0);
        assert_eq!(first.parking_timestamp, T0);
        assert!(first.is_open());
        assert_eq!(first.lot.as_ref().map(|x| x.id), Some(l.id));
        assert_status_mirrors_ledger(&store).await;
    }

    #[tokio::test]
    async fn full_lot_and_unknown_ids() {
        let store = MemoryStore::new();
        let driver = user(&store, "d@x.io", false).await;
        let l = lot(&store, 10.0, 1).await;

        reserve_spot(&store, l.id, driver.user_id).await.unwrap();
        assert!(matches!(
            reserve_spot(&store, l.id, driver.user_id).await,
            Err(ParkingError::NoAvailableSpot(id)) if id == l.id
        ));
        assert!(matches!(
            reserve_spot(&store, l.id + 1, driver.user_id).await,
            Err(ParkingError::NotFound(_))
        ));
        assert!(matches!(
            reserve_spot(&store, l.id, Uuid::new_v4()).await,
            Err(ParkingError::NotFound(_))
        ));
        assert!(matches!(
            end_reservation(&store, 999, driver).await,
            Err(ParkingError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reservations_never_share_a_spot() {
        let store = Arc::new(MemoryStore::new());
        let l = lot(store.as_ref(), 10.0, 5).await;
        let mut drivers = Vec::new();
        for i in 0..20 {
            drivers.push(user(store.as_ref(), &format!("d{}@x.io", i), false).await);
        }

        let lot_id = l.id;
        let handles: Vec<_> = drivers
            .into_iter()
            .map(|d| {
                let store = store.clone();
                tokio::spawn(async move { reserve_spot(store.as_ref(), lot_id, d.user_id).await })
            })
            .collect();

        let mut taken = HashSet::new();
        let mut full = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(r) => assert!(taken.insert(r.spot_id.unwrap()), "spot handed out twice"),
                Err(ParkingError::NoAvailableSpot(_)) => full += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(taken.len(), 5);
        assert_eq!(full, 15);
        assert_status_mirrors_ledger(store.as_ref()).await;
    }

    #[tokio::test]
    async fn status_tracks_ledger_through_a_session() {
        let store = MemoryStore::new();
        let admin = user(&store, "admin@x.io", true).await;
        let a = user(&store, "a@x.io", false).await;
        let b = user(&store, "b@x.io", false).await;
        let north = lot(&store, 10.0, 2).await;
        let south = lot(&store, 20.0, 1).await;

        let r1 = reserve_spot(&store, north.id, a.user_id).await.unwrap();
        assert_status_mirrors_ledger(&store).await;
        let r2 = reserve_spot(&store, south.id, b.user_id).await.unwrap();
        assert_status_mirrors_ledger(&store).await;
        end_reservation(&store, r1.id, a).await.unwrap();
        assert_status_mirrors_ledger(&store).await;
        let r3 = reserve_spot(&store, north.id, b.user_id).await.unwrap();
        assert_eq!(r3.spot_id, r1.spot_id, "freed spot is reused first");
        assert_status_mirrors_ledger(&store).await;
        end_reservation(&store, r2.id, admin).await.unwrap();
        assert_status_mirrors_ledger(&store).await;
        let _ = reserve_spot(&store, south.id, a.user_id).await.unwrap();
        assert!(reserve_spot(&store, south.id, b.user_id).await.is_err());
        assert_status_mirrors_ledger(&store).await;
    }

    #[tokio::test]
    async fn ending_twice_is_a_no_op() {
        let store = MemoryStore::new();
        let driver = user(&store, "d@x.io", false).await;
        let l = lot(&store, 10.0, 1).await;
        let r = reserve_spot_at(&store, l.id, driver.user_id, T0).await.unwrap();

        let once = end_reservation_at(&store, r.id, driver, T0 + Duration::minutes(30))
            .await
            .unwrap();
        let twice = end_reservation_at(&store, r.id, driver, T0 + Duration::minutes(90))
            .await
            .unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.leaving_timestamp, Some(T0 + Duration::minutes(30)));
        assert_eq!(store.spot_counts().await.unwrap().available, 1);
        assert_status_mirrors_ledger(&store).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ends_agree_on_one_leaving_time() {
        let store = Arc::new(MemoryStore::new());
        let driver = user(store.as_ref(), "d@x.io", false).await;
        let l = lot(store.as_ref(), 10.0, 1).await;
        let r = reserve_spot_at(store.as_ref(), l.id, driver.user_id, T0)
            .await
            .unwrap();
        let id = r.id;

        let handles: Vec<_> = (1..=8)
            .map(|i| {
                let store = store.clone();
                let at = T0 + Duration::minutes(i);
                tokio::spawn(async move {
                    end_reservation_at(store.as_ref(), id, driver, at).await
                })
            })
            .collect();

        let mut ends = HashSet::new();
        for h in handles {
            let closed = h.await.unwrap().expect("every close succeeds");
            ends.insert(closed.leaving_timestamp.expect("closed"));
        }
        assert_eq!(ends.len(), 1, "one winner sets the leaving time");
        assert_eq!(store.spot_counts().await.unwrap().available, 1);
        assert!(!store
            .close_reservation(r.id, T0 + Duration::hours(1))
            .await
            .unwrap());
        assert_status_mirrors_ledger(store.as_ref()).await;
    }

    #[tokio::test]
    async fn only_owner_or_admin_may_end() {
        let store = MemoryStore::new();
        let owner = user(&store, "o@x.io", false).await;
        let other = user(&store, "p@x.io", false).await;
        let admin = user(&store, "a@x.io", true).await;
        let l = lot(&store, 10.0, 2).await;
        let r = reserve_spot(&store, l.id, owner.user_id).await.unwrap();

        assert!(matches!(
            end_reservation(&store, r.id, other).await,
            Err(ParkingError::Unauthorized(_))
        ));
        assert!(store.find_reservation(r.id).await.unwrap().unwrap().is_open());

        let closed = end_reservation(&store, r.id, admin).await.unwrap();
        assert!(!closed.is_open());
    }

    #[tokio::test]
    async fn billing_uses_price_at_reservation_time() {
        let store = MemoryStore::new();
        let driver = user(&store, "d@x.io", false).await;
        let l = lot(&store, 10.0, 1).await;
        let r = reserve_spot_at(&store, l.id, driver.user_id, T0).await.unwrap();

        store
            .update_lot(
                l.id,
                LotUpdate {
                    price_per_unit: Some(50.0),
                    ..LotUpdate::default()
                },
            )
            .await
            .unwrap();

        let closed = end_reservation_at(&store, r.id, driver, T0 + Duration::minutes(125))
            .await
            .unwrap();
        assert_eq!(closed.cost_per_unit, 10.0);
        let charge = billing::compute_cost(&closed).unwrap();
        assert_eq!(charge.duration_minutes, 125);
        // floor(125 * 10 / 60)
        assert_eq!(charge.cost, 20.0);
    }

    #[tokio::test]
    async fn lot_with_open_reservation_cannot_be_deleted() {
        let store = MemoryStore::new();
        let driver = user(&store, "d@x.io", false).await;
        let l = lot(&store, 10.0, 2).await;
        let r = reserve_spot_at(&store, l.id, driver.user_id, T0).await.unwrap();

        assert!(matches!(
            store.delete_lot(l.id).await,
            Err(ParkingError::Conflict(_))
        ));
        assert_eq!(store.list_spots(l.id).await.unwrap().len(), 2);

        end_reservation_at(&store, r.id, driver, T0 + Duration::hours(1))
            .await
            .unwrap();
        store.delete_lot(l.id).await.unwrap();

        let kept = user_reservations(&store, driver.user_id).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].spot_id, None);
        assert!(billing::compute_cost(&kept[0]).is_none());
    }

    #[tokio::test]
    async fn ledger_queries_are_newest_first_and_filtered() {
        let store = MemoryStore::new();
        let a = user(&store, "a@x.io", false).await;
        let b = user(&store, "b@x.io", false).await;
        let north = lot(&store, 10.0, 3).await;
        let south = lot(&store, 10.0, 3).await;

        let r1 = reserve_spot_at(&store, north.id, a.user_id, T0).await.unwrap();
        let r2 = reserve_spot_at(&store, south.id, b.user_id, T0 + Duration::minutes(5))
            .await
            .unwrap();
        let r3 = reserve_spot_at(&store, north.id, a.user_id, T0 + Duration::minutes(10))
            .await
            .unwrap();
        end_reservation_at(&store, r1.id, a, T0 + Duration::minutes(20))
            .await
            .unwrap();

        let ids = |v: Vec<Reservation>| v.into_iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids(history(&store).await.unwrap()), vec![r3.id, r2.id, r1.id]);
        assert_eq!(
            ids(user_reservations(&store, a.user_id).await.unwrap()),
            vec![r3.id, r1.id]
        );
        assert_eq!(
            ids(open_reservations(&store, None).await.unwrap()),
            vec![r3.id, r2.id]
        );
        assert_eq!(
            ids(open_reservations(&store, Some(a.user_id)).await.unwrap()),
            vec![r3.id]
        );
        assert_eq!(
            ids(lot_reservations(&store, south.id).await.unwrap()),
            vec![r2.id]
        );
        assert_eq!(
            ids(spot_reservations(&store, r1.spot_id.unwrap()).await.unwrap()),
            vec![r1.id]
        );
        assert!(matches!(
            lot_reservations(&store, 404).await,
            Err(ParkingError::NotFound(_))
        ));
        assert!(matches!(
            spot_reservations(&store, 424242).await,
            Err(ParkingError::NotFound(_))
        ));
    }
}
