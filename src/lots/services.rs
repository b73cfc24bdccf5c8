use tracing::info;

use super::{
    dto::{CreateLotRequest, LotDetails},
    repo_types::{LotAvailability, LotUpdate, NewLot, ParkingLot},
};
use crate::{
    error::{ParkingError, ParkingResult},
    store::ParkingStore,
};

/// Upper bound on spots created with a single lot.
pub const MAX_SPOTS_PER_LOT: i32 = 10_000;

fn check_price(price: f64) -> ParkingResult<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(ParkingError::InvalidInput(
            "price_per_unit must be positive".into(),
        ));
    }
    Ok(())
}

/// Creates the lot and all of its spots as one unit.
pub async fn create_lot(store: &dyn ParkingStore, req: CreateLotRequest) -> ParkingResult<ParkingLot> {
    check_price(req.price_per_unit)?;
    if req.max_spots <= 0 {
        return Err(ParkingError::InvalidInput("max_spots must be positive".into()));
    }
    if req.max_spots > MAX_SPOTS_PER_LOT {
        return Err(ParkingError::InvalidInput(format!(
            "max_spots must be at most {}",
            MAX_SPOTS_PER_LOT
        )));
    }
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ParkingError::InvalidInput("name is required".into()));
    }

    let lot = store
        .insert_lot(NewLot {
            name: name.to_string(),
            address: req.address.trim().to_string(),
            pin_code: req.pin_code.trim().to_string(),
            price_per_unit: req.price_per_unit,
            max_spots: req.max_spots,
        })
        .await?;
    info!(lot_id = lot.id, spots = lot.max_spots, price = lot.price_per_unit, "lot created");
    Ok(lot)
}

/// Edits metadata only. Open reservations keep the price they were opened with.
pub async fn update_lot(
    store: &dyn ParkingStore,
    lot_id: i64,
    update: LotUpdate,
) -> ParkingResult<ParkingLot> {
    if let Some(price) = update.price_per_unit {
        check_price(price)?;
    }
    let trim = |v: Option<String>| v.map(|s| s.trim().to_string());
    let update = LotUpdate {
        name: trim(update.name),
        address: trim(update.address),
        pin_code: trim(update.pin_code),
        price_per_unit: update.price_per_unit,
    };
    if update.name.as_deref().is_some_and(str::is_empty) {
        return Err(ParkingError::InvalidInput("name is required".into()));
    }
    let lot = store.update_lot(lot_id, update).await?;
    info!(lot_id, price = lot.price_per_unit, "lot updated");
    Ok(lot)
}

pub async fn delete_lot(store: &dyn ParkingStore, lot_id: i64) -> ParkingResult<()> {
    store.delete_lot(lot_id).await?;
    info!(lot_id, "lot deleted");
    Ok(())
}

pub async fn get_lot(store: &dyn ParkingStore, lot_id: i64) -> ParkingResult<LotDetails> {
    let lot = store
        .find_lot(lot_id)
        .await?
        .ok_or_else(|| ParkingError::NotFound(format!("lot {}", lot_id)))?;
    let spots = store.list_spots(lot_id).await?;
    Ok(LotDetails { lot, spots })
}

pub async fn list_lots(store: &dyn ParkingStore) -> ParkingResult<Vec<LotAvailability>> {
    store.list_lots().await
}
