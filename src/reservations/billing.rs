//! Duration-based billing for closed reservations.
//!
//! The rate is per hour. The elapsed time is floored to whole minutes, and the
//! pro-rated cost is floored again to a whole currency unit. Both truncations
//! are kept as-is for compatibility with existing invoices.

use serde::Serialize;

use super::repo_types::Reservation;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Charge {
    pub duration_minutes: i64,
    pub cost: f64,
}

/// Aggregate over a user's closed reservations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BillingSummary {
    pub closed_count: usize,
    pub total_minutes: i64,
    pub hours: i64,
    pub minutes: i64,
    pub total_cost: f64,
}

/// `None` while the reservation is open or once its spot/lot can no longer be resolved.
pub fn compute_cost(r: &Reservation) -> Option<Charge> {
    let leaving = r.leaving_timestamp?;
    if r.spot_id.is_none() || r.lot.is_none() {
        return None;
    }
    let elapsed = leaving - r.parking_timestamp;
    let duration_minutes = elapsed.whole_seconds().div_euclid(60);
    let cost = (duration_minutes as f64 * r.cost_per_unit / 60.0).floor();
    Some(Charge {
        duration_minutes,
        cost,
    })
}

pub fn summarize<'a, I>(reservations: I) -> BillingSummary
where
    I: IntoIterator<Item = &'a Reservation>,
{
    let mut summary = BillingSummary::default();
    let mut total_cost = 0.0;
    for charge in reservations.into_iter().filter_map(compute_cost) {
        summary.closed_count += 1;
        summary.total_minutes += charge.duration_minutes;
        total_cost += charge.cost;
    }
    summary.hours = summary.total_minutes / 60;
    summary.minutes = summary.total_minutes % 60;
    summary.total_cost = round_cents(total_cost);
    summary
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
