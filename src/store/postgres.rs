use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use super::ParkingStore;
use crate::{
    auth::repo_types::{NewUser, User},
    error::{ParkingError, ParkingResult},
    lots::repo_types::{LotAvailability, LotUpdate, NewLot, ParkingLot},
    reservations::repo_types::{Reservation, ReservationFilter, ReservationRow},
    spots::{ParkingSpot, SpotCounts, SpotStatus},
};

const RESERVATION_SELECT: &str = r#"
    SELECT r.id, r.spot_id, r.user_id, r.parking_timestamp, r.leaving_timestamp,
           r.cost_per_unit, l.id AS lot_id, l.name AS lot_name
    FROM reservations r
    LEFT JOIN parking_spots s ON s.id = r.spot_id
    LEFT JOIN parking_lots l ON l.id = s.lot_id
"#;

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn begin(&self) -> ParkingResult<Transaction<'static, Postgres>> {
        Ok(self.db.begin().await.context("begin tx")?)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl ParkingStore for PgStore {
    async fn insert_user(&self, user: NewUser) -> ParkingResult<User> {
        let res = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, username, password_hash, is_admin)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, username, password_hash, is_admin, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(u) => Ok(u),
            Err(e) if is_unique_violation(&e) => Err(ParkingError::Conflict(format!(
                "email {} already registered",
                user.email
            ))),
            Err(e) => Err(anyhow::Error::new(e).context("insert user").into()),
        }
    }

    async fn find_user(&self, id: Uuid) -> ParkingResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, is_admin, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> ParkingResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, is_admin, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list_users(&self) -> ParkingResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, is_admin, created_at
            FROM users
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn has_admin(&self) -> ParkingResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE is_admin)")
            .fetch_one(&self.db)
            .await?;
        Ok(exists)
    }

    async fn insert_lot(&self, new: NewLot) -> ParkingResult<ParkingLot> {
        let mut tx = self.begin().await?;

        let lot = sqlx::query_as::<_, ParkingLot>(
            r#"
            INSERT INTO parking_lots (name, address, pin_code, price_per_unit, max_spots)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, address, pin_code, price_per_unit, max_spots, created_at
            "#,
        )
        .bind(&new.name)
        .bind(&new.address)
        .bind(&new.pin_code)
        .bind(new.price_per_unit)
        .bind(new.max_spots)
        .fetch_one(&mut *tx)
        .await
        .context("insert lot")?;

        let created = sqlx::query(
            r#"
            INSERT INTO parking_spots (lot_id)
            SELECT $1::bigint FROM generate_series(1, $2::int)
            "#,
        )
        .bind(lot.id)
        .bind(new.max_spots)
        .execute(&mut *tx)
        .await
        .context("insert spots")?;

        if created.rows_affected() != new.max_spots as u64 {
            return Err(anyhow::anyhow!(
                "created {} of {} spots for lot {}",
                created.rows_affected(),
                new.max_spots,
                lot.id
            )
            .into());
        }

        tx.commit().await.context("commit tx")?;
        Ok(lot)
    }

    async fn update_lot(&self, id: i64, update: LotUpdate) -> ParkingResult<ParkingLot> {
        let lot = sqlx::query_as::<_, ParkingLot>(
            r#"
            UPDATE parking_lots
            SET name = COALESCE($2, name),
                address = COALESCE($3, address),
                pin_code = COALESCE($4, pin_code),
                price_per_unit = COALESCE($5, price_per_unit)
            WHERE id = $1
            RETURNING id, name, address, pin_code, price_per_unit, max_spots, created_at
            "#,
        )
        .bind(id)
        .bind(update.name)
        .bind(update.address)
        .bind(update.pin_code)
        .bind(update.price_per_unit)
        .fetch_optional(&self.db)
        .await?;
        lot.ok_or_else(|| ParkingError::NotFound(format!("lot {}", id)))
    }

    async fn delete_lot(&self, id: i64) -> ParkingResult<()> {
        let mut tx = self.begin().await?;

        // Exclusive lot lock waits out in-flight claims, which hold a share lock.
        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM parking_lots WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if found.is_none() {
            return Err(ParkingError::NotFound(format!("lot {}", id)));
        }

        let busy: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM reservations r
                JOIN parking_spots s ON s.id = r.spot_id
                WHERE s.lot_id = $1 AND r.leaving_timestamp IS NULL
            )
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if busy {
            return Err(ParkingError::Conflict(format!(
                "lot {} has open reservations",
                id
            )));
        }

        // spots cascade; closed reservations keep their row with spot_id cleared
        sqlx::query("DELETE FROM parking_lots WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("delete lot")?;

        tx.commit().await.context("commit tx")?;
        Ok(())
    }

    async fn find_lot(&self, id: i64) -> ParkingResult<Option<ParkingLot>> {
        let lot = sqlx::query_as::<_, ParkingLot>(
            r#"
            SELECT id, name, address, pin_code, price_per_unit, max_spots, created_at
            FROM parking_lots
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(lot)
    }

    async fn list_lots(&self) -> ParkingResult<Vec<LotAvailability>> {
        let lots = sqlx::query_as::<_, LotAvailability>(
            r#"
            SELECT l.id, l.name, l.address, l.pin_code, l.price_per_unit, l.max_spots,
                   l.created_at,
                   COUNT(s.id) AS total_spots,
                   COUNT(s.id) FILTER (WHERE s.status = 'available') AS available_spots
            FROM parking_lots l
            LEFT JOIN parking_spots s ON s.lot_id = l.id
            GROUP BY l.id
            ORDER BY l.id
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(lots)
    }

    async fn find_spot(&self, id: i64) -> ParkingResult<Option<ParkingSpot>> {
        let spot = sqlx::query_as::<_, ParkingSpot>(
            "SELECT id, lot_id, status FROM parking_spots WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(spot)
    }

    async fn list_spots(&self, lot_id: i64) -> ParkingResult<Vec<ParkingSpot>> {
        let spots = sqlx::query_as::<_, ParkingSpot>(
            "SELECT id, lot_id, status FROM parking_spots WHERE lot_id = $1 ORDER BY id",
        )
        .bind(lot_id)
        .fetch_all(&self.db)
        .await?;
        Ok(spots)
    }

    async fn spot_counts(&self) -> ParkingResult<SpotCounts> {
        let (total, available): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'available')
            FROM parking_spots
            "#,
        )
        .fetch_one(&self.db)
        .await?;
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
        let mut tx = self.begin().await?;

        // Share lock: the price read here is the snapshot, and the lot
        // cannot be deleted until this unit commits.
        let price: Option<f64> = sqlx::query_scalar(
            "SELECT price_per_unit FROM parking_lots WHERE id = $1 FOR SHARE",
        )
        .bind(lot_id)
        .fetch_optional(&mut *tx)
        .await?;
        let price = price.ok_or_else(|| ParkingError::NotFound(format!("lot {}", lot_id)))?;

        let candidate: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM parking_spots
            WHERE lot_id = $1 AND status = 'available'
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(lot_id)
        .fetch_optional(&mut *tx)
        .await?;
        let spot_id = candidate.ok_or(ParkingError::NoAvailableSpot(lot_id))?;

        let marked = sqlx::query(
            "UPDATE parking_spots SET status = $2 WHERE id = $1 AND status = 'available'",
        )
        .bind(spot_id)
        .bind(SpotStatus::Occupied)
        .execute(&mut *tx)
        .await?;
        if marked.rows_affected() == 0 {
            return Err(ParkingError::Conflict(format!(
                "spot {} was taken concurrently",
                spot_id
            )));
        }

        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO reservations (spot_id, user_id, parking_timestamp, cost_per_unit)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(spot_id)
        .bind(user_id)
        .bind(now)
        .bind(price)
        .fetch_one(&mut *tx)
        .await;
        let reservation_id = match inserted {
            Ok(id) => id,
            Err(e) if is_unique_violation(&e) => {
                return Err(ParkingError::Conflict(format!(
                    "spot {} already has an open reservation",
                    spot_id
                )))
            }
            Err(e) => return Err(anyhow::Error::new(e).context("insert reservation").into()),
        };

        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "{} WHERE r.id = $1",
            RESERVATION_SELECT
        ))
        .bind(reservation_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await.context("commit tx")?;
        Ok(row.into())
    }

    async fn close_reservation(&self, id: i64, now: OffsetDateTime) -> ParkingResult<bool> {
        let mut tx = self.begin().await?;

        let closed: Option<Option<i64>> = sqlx::query_scalar(
            r#"
            UPDATE reservations
            SET leaving_timestamp = $2
            WHERE id = $1 AND leaving_timestamp IS NULL
            RETURNING spot_id
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(spot_id) = closed else {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM reservations WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            if !exists {
                return Err(ParkingError::NotFound(format!("reservation {}", id)));
            }
            return Ok(false);
        };

        if let Some(spot_id) = spot_id {
            sqlx::query("UPDATE parking_spots SET status = $2 WHERE id = $1")
                .bind(spot_id)
                .bind(SpotStatus::Available)
                .execute(&mut *tx)
                .await
                .context("release spot")?;
        }

        tx.commit().await.context("commit tx")?;
        Ok(true)
    }

    async fn find_reservation(&self, id: i64) -> ParkingResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "{} WHERE r.id = $1",
            RESERVATION_SELECT
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Reservation::from))
    }

    async fn list_reservations(&self, filter: ReservationFilter) -> ParkingResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            r#"{}
            WHERE ($1::uuid IS NULL OR r.user_id = $1)
              AND ($2::bigint IS NULL OR l.id = $2)
              AND ($3::bigint IS NULL OR r.spot_id = $3)
              AND (NOT $4 OR r.leaving_timestamp IS NULL)
            ORDER BY r.parking_timestamp DESC, r.id DESC
            "#,
            RESERVATION_SELECT
        ))
        .bind(filter.user_id)
        .bind(filter.lot_id)
        .bind(filter.spot_id)
        .bind(filter.open_only)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Reservation::from).collect())
    }
}
