use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::AppError;
use crate::models::driver::{DriverCandidate, GeoPoint};
use crate::store::{DriverFilter, DriverStore};

pub const DEFAULT_RADIUS_M: f64 = 5_000.0;

/// Answers radius queries over dispatchable drivers. Pure read.
#[derive(Clone)]
pub struct DriverLocationIndex {
    drivers: Arc<dyn DriverStore>,
}

impl DriverLocationIndex {
    pub fn new(drivers: Arc<dyn DriverStore>) -> Self {
        Self { drivers }
    }

    /// Online, verified drivers within `radius_m` of `origin`, nearest first.
    /// Ties go to the higher rating, then the lower id.
    pub async fn find_candidates(
        &self,
        origin: GeoPoint,
        radius_m: f64,
    ) -> Result<Vec<DriverCandidate>, AppError> {
        if !origin.is_valid() {
            return Err(AppError::Validation(format!(
                "origin ({}, {}) is not a valid coordinate",
                origin.lat, origin.lng
            )));
        }
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(AppError::Validation(format!(
                "radius must be positive, got {radius_m}"
            )));
        }

        let found = self
            .drivers
            .query_drivers(origin, radius_m, DriverFilter::DISPATCHABLE)
            .await
            .map_err(|err| {
                error!(error = %err, "driver query failed");
                match err {
                    AppError::IndexUnavailable(msg) => AppError::IndexUnavailable(msg),
                    other => AppError::IndexUnavailable(other.to_string()),
                }
            })?;

        // The store is trusted for the query but not for the contract.
        let mut candidates: Vec<DriverCandidate> = found
            .into_iter()
            .filter(|candidate| {
                candidate.online && candidate.verified && candidate.distance_m <= radius_m
            })
            .collect();

        candidates.sort_by(rank);

        debug!(
            candidates = candidates.len(),
            radius_m, "candidate drivers found"
        );
        Ok(candidates)
    }
}

fn rank(a: &DriverCandidate, b: &DriverCandidate) -> Ordering {
    a.distance_m
        .total_cmp(&b.distance_m)
        .then_with(|| b.rating.total_cmp(&a.rating))
        .then_with(|| a.id.cmp(&b.id))
}
