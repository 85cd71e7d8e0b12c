//! Persistent-store seam for the dispatch core.
//!
//! The core never touches storage mechanics directly. It consumes three
//! narrow capabilities:
//!
//! - [`RideStore`]: ride records, including the single-record
//!   compare-and-set that makes accept exclusive
//! - [`DriverStore`]: the driver projection and its geospatial query
//! - [`PartyStore`]: per-party push-channel addresses
//!
//! [`memory::InMemoryStore`] implements all three for development and tests.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{DriverCandidate, DriverRecord, GeoPoint};
use crate::models::ride::{FeedbackPatch, Ride, RidePatch, RideStatus};

/// Selection criteria for ride listings.
#[derive(Debug, Clone, Default)]
pub struct RideFilter {
    pub statuses: Vec<RideStatus>,
    pub rider_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    /// Matches rides where the party is either rider or driver.
    pub party_id: Option<Uuid>,
}

impl RideFilter {
    pub fn matches(&self, ride: &Ride) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&ride.status) {
            return false;
        }
        if let Some(rider_id) = self.rider_id {
            if ride.rider_id != rider_id {
                return false;
            }
        }
        if let Some(driver_id) = self.driver_id {
            if ride.driver_id != Some(driver_id) {
                return false;
            }
        }
        if let Some(party_id) = self.party_id {
            if !ride.is_party(party_id) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait RideStore: Send + Sync {
    async fn create_ride(&self, ride: Ride) -> Result<Ride, AppError>;

    async fn get_ride(&self, id: Uuid) -> Result<Option<Ride>, AppError>;

    /// Applies `patch` only if the ride's status still equals `expected` at
    /// write time. Returns whether a record was affected.
    async fn conditional_update_ride(
        &self,
        id: Uuid,
        expected: RideStatus,
        patch: &RidePatch,
    ) -> Result<bool, AppError>;

    /// Writes the feedback only if none of the rating slots it sets is filled
    /// at write time. Returns whether the write happened.
    async fn set_feedback_if_unset(&self, id: Uuid, patch: &FeedbackPatch)
    -> Result<bool, AppError>;

    /// Matching rides, newest request first.
    async fn query_rides(
        &self,
        filter: &RideFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Ride>, AppError>;

    async fn count_rides(&self, filter: &RideFilter) -> Result<usize, AppError>;
}

/// Flags a driver must carry to be returned by [`DriverStore::query_drivers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverFilter {
    pub online: bool,
    pub verified: bool,
}

impl DriverFilter {
    pub const DISPATCHABLE: DriverFilter = DriverFilter {
        online: true,
        verified: true,
    };

    pub fn matches(&self, driver: &DriverRecord) -> bool {
        (!self.online || driver.online) && (!self.verified || driver.verified)
    }
}

#[async_trait]
pub trait DriverStore: Send + Sync {
    /// Drivers within `radius_m` of `point` carrying the filter's flags.
    /// No ordering is promised.
    async fn query_drivers(
        &self,
        point: GeoPoint,
        radius_m: f64,
        filter: DriverFilter,
    ) -> Result<Vec<DriverCandidate>, AppError>;

    async fn get_driver(&self, id: Uuid) -> Result<Option<DriverRecord>, AppError>;

    async fn register_driver(&self, record: DriverRecord) -> Result<DriverRecord, AppError>;

    async fn update_driver_presence(
        &self,
        id: Uuid,
        location: GeoPoint,
        online: bool,
    ) -> Result<Option<DriverRecord>, AppError>;

    async fn set_driver_verified(
        &self,
        id: Uuid,
        verified: bool,
    ) -> Result<Option<DriverRecord>, AppError>;
}

#[async_trait]
pub trait PartyStore: Send + Sync {
    async fn push_token(&self, party_id: Uuid) -> Result<Option<String>, AppError>;

    async fn set_push_token(&self, party_id: Uuid, token: String) -> Result<(), AppError>;

    /// Clears the stored token only if it still equals `token`.
    async fn clear_push_token(&self, party_id: Uuid, token: &str) -> Result<bool, AppError>;
}
