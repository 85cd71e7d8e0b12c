use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::clear_invalid_tokens;
use crate::engine::location_index::DriverLocationIndex;
use crate::error::AppError;
use crate::models::ride::{Location, Ride, RideEstimates};
use crate::notify::event::RideNotification;
use crate::notify::{ChannelAddresses, DeliveryReport, NotificationDispatcher};
use crate::observability::metrics::Metrics;
use crate::store::{PartyStore, RideStore};

#[derive(Debug, Clone, PartialEq)]
pub struct RideRequest {
    pub pickup: Location,
    pub dropoff: Location,
    pub estimates: RideEstimates,
}

impl RideRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        for (field, location) in [("pickup", &self.pickup), ("dropoff", &self.dropoff)] {
            if !location.point().is_valid() {
                return Err(AppError::Validation(format!(
                    "{field} must carry a valid numeric lat/lng"
                )));
            }
        }

        let estimates = [
            ("estimated_fare", self.estimates.fare),
            ("estimated_distance", self.estimates.distance_m),
            ("estimated_duration", self.estimates.duration_s),
        ];
        for (field, value) in estimates {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::Validation(format!(
                    "{field} must be a non-negative number"
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub ride: Ride,
    pub nearby_drivers: usize,
    #[serde(skip)]
    pub reports: Vec<DeliveryReport>,
}

#[derive(Clone)]
pub struct MatchingEngine {
    rides: Arc<dyn RideStore>,
    parties: Arc<dyn PartyStore>,
    index: DriverLocationIndex,
    notifier: NotificationDispatcher,
    radius_m: f64,
    metrics: Metrics,
}

impl MatchingEngine {
    pub fn new(
        rides: Arc<dyn RideStore>,
        parties: Arc<dyn PartyStore>,
        index: DriverLocationIndex,
        notifier: NotificationDispatcher,
        radius_m: f64,
        metrics: Metrics,
    ) -> Self {
        Self {
            rides,
            parties,
            index,
            notifier,
            radius_m,
            metrics,
        }
    }

    /// Persists a new ride and invites every nearby candidate. Once the ride
    /// is stored, nothing downstream can fail the request.
    pub async fn request_ride(
        &self,
        rider_id: Uuid,
        request: RideRequest,
    ) -> Result<MatchOutcome, AppError> {
        request.validate()?;

        let ride = Ride::new(
            rider_id,
            request.pickup,
            request.dropoff,
            request.estimates,
            Utc::now(),
        );
        let ride = self.rides.create_ride(ride).await?;
        self.metrics.rides_requested_total.inc();

        let start = Instant::now();
        let candidates = match self
            .index
            .find_candidates(ride.pickup.point(), self.radius_m)
            .await
        {
            Ok(candidates) => candidates,
            Err(err) => {
                self.metrics
                    .matching_latency_seconds
                    .with_label_values(&["error"])
                    .observe(start.elapsed().as_secs_f64());
                error!(ride_id = %ride.id, error = %err, "candidate lookup failed; ride stays requested");
                return Ok(MatchOutcome {
                    ride,
                    nearby_drivers: 0,
                    reports: Vec::new(),
                });
            }
        };

        let notification = RideNotification::ride_request(&ride);
        let reports = join_all(candidates.iter().map(|candidate| {
            let addresses = ChannelAddresses::for_party(candidate.id, candidate.push_token.clone());
            let notifier = &self.notifier;
            let notification = &notification;
            async move { notifier.notify(candidate.id, &addresses, notification).await }
        }))
        .await;

        clear_invalid_tokens(self.parties.as_ref(), &reports).await;

        self.metrics
            .matching_candidates
            .observe(candidates.len() as f64);
        self.metrics
            .matching_latency_seconds
            .with_label_values(&["success"])
            .observe(start.elapsed().as_secs_f64());

        info!(
            ride_id = %ride.id,
            rider_id = %rider_id,
            candidates = candidates.len(),
            reached = reports.iter().filter(|r| r.any_delivered()).count(),
            "ride requested"
        );

        Ok(MatchOutcome {
            ride,
            nearby_drivers: candidates.len(),
            reports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::RideRequest;
    use crate::error::AppError;
    use crate::models::ride::{Location, RideEstimates};

    fn location(lat: f64, lng: f64) -> Location {
        Location {
            lat,
            lng,
            address: None,
        }
    }

    #[test]
    fn accepts_well_formed_request() {
        let request = RideRequest {
            pickup: location(1.0, 1.0),
            dropoff: location(2.0, 2.0),
            estimates: RideEstimates::default(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_dropoff() {
        let request = RideRequest {
            pickup: location(1.0, 1.0),
            dropoff: location(120.0, 2.0),
            estimates: RideEstimates::default(),
        };
        let err = request.validate().unwrap_err();
        assert!(matches!(err, AppError::Validation(ref msg) if msg.starts_with("dropoff")));
    }

    #[test]
    fn rejects_negative_estimates() {
        let request = RideRequest {
            pickup: location(1.0, 1.0),
            dropoff: location(2.0, 2.0),
            estimates: RideEstimates {
                fare: -3.0,
                ..RideEstimates::default()
            },
        };
        assert!(matches!(request.validate(), Err(AppError::Validation(_))));
    }
}
