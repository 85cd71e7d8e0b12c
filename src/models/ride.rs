use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Requested,
    Accepted,
    Arrived,
    Started,
    Completed,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl RideStatus {
    pub const ACTIVE: [RideStatus; 4] = [
        RideStatus::Requested,
        RideStatus::Accepted,
        RideStatus::Arrived,
        RideStatus::Started,
    ];

    pub const FINISHED: [RideStatus; 2] = [RideStatus::Completed, RideStatus::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Requested => "requested",
            RideStatus::Accepted => "accepted",
            RideStatus::Arrived => "arrived",
            RideStatus::Started => "started",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Location {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Fare {
    pub estimated: f64,
    #[serde(rename = "final")]
    pub final_amount: Option<f64>,
}

/// Estimated value at request time, actual value once the ride completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Measure {
    pub estimated: f64,
    pub actual: Option<f64>,
}

/// Externally computed estimates supplied with a ride request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RideEstimates {
    pub fare: f64,
    pub distance_m: f64,
    pub duration_s: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CompletionDetails {
    pub final_fare: Option<f64>,
    pub actual_distance_m: Option<f64>,
    pub actual_duration_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cancellation {
    pub by: Uuid,
    pub reason: String,
}

/// Post-ride feedback. `driver_rating` is the rider's rating of the driver,
/// `rider_rating` the driver's rating of the rider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub rider_rating: Option<u8>,
    pub driver_rating: Option<u8>,
    pub rider_comment: Option<String>,
    pub driver_comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: Location,
    pub dropoff: Location,
    pub fare: Fare,
    pub distance: Measure,
    pub duration: Measure,
    pub status: RideStatus,
    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    pub feedback: Feedback,
}

impl Ride {
    pub fn new(
        rider_id: Uuid,
        pickup: Location,
        dropoff: Location,
        estimates: RideEstimates,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            rider_id,
            driver_id: None,
            pickup,
            dropoff,
            fare: Fare {
                estimated: estimates.fare,
                final_amount: None,
            },
            distance: Measure {
                estimated: estimates.distance_m,
                actual: None,
            },
            duration: Measure {
                estimated: estimates.duration_s,
                actual: None,
            },
            status: RideStatus::Requested,
            requested_at,
            accepted_at: None,
            arrived_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            feedback: Feedback::default(),
        }
    }

    pub fn is_rider(&self, party_id: Uuid) -> bool {
        self.rider_id == party_id
    }

    pub fn is_assigned_driver(&self, party_id: Uuid) -> bool {
        self.driver_id == Some(party_id)
    }

    pub fn is_party(&self, party_id: Uuid) -> bool {
        self.is_rider(party_id) || self.is_assigned_driver(party_id)
    }

    /// The other side of the ride relative to `actor_id`, if one exists yet.
    pub fn counterparty_of(&self, actor_id: Uuid) -> Option<Uuid> {
        if self.is_rider(actor_id) {
            self.driver_id
        } else {
            Some(self.rider_id)
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// A single atomic status change: new status, its timestamp, and the side
/// fields that belong to that transition.
#[derive(Debug, Clone, PartialEq)]
pub struct RidePatch {
    pub status: RideStatus,
    pub at: DateTime<Utc>,
    pub driver_id: Option<Uuid>,
    pub cancellation: Option<Cancellation>,
    pub completion: Option<CompletionDetails>,
}

impl RidePatch {
    pub fn to(status: RideStatus, at: DateTime<Utc>) -> Self {
        Self {
            status,
            at,
            driver_id: None,
            cancellation: None,
            completion: None,
        }
    }

    /// Applies the patch. Timestamps and the driver assignment are write-once.
    pub fn apply(&self, ride: &mut Ride) {
        ride.status = self.status;

        match self.status {
            RideStatus::Requested => {}
            RideStatus::Accepted => {
                if ride.driver_id.is_none() {
                    ride.driver_id = self.driver_id;
                }
                stamp(&mut ride.accepted_at, self.at);
            }
            RideStatus::Arrived => stamp(&mut ride.arrived_at, self.at),
            RideStatus::Started => stamp(&mut ride.started_at, self.at),
            RideStatus::Completed => {
                stamp(&mut ride.completed_at, self.at);
                if let Some(details) = &self.completion {
                    ride.fare.final_amount = ride.fare.final_amount.or(details.final_fare);
                    ride.distance.actual = ride.distance.actual.or(details.actual_distance_m);
                    ride.duration.actual = ride.duration.actual.or(details.actual_duration_s);
                }
            }
            RideStatus::Cancelled => {
                stamp(&mut ride.cancelled_at, self.at);
                if let Some(cancellation) = &self.cancellation {
                    ride.cancelled_by = Some(cancellation.by);
                    ride.cancellation_reason = Some(cancellation.reason.clone());
                }
            }
        }
    }
}

fn stamp(slot: &mut Option<DateTime<Utc>>, at: DateTime<Utc>) {
    if slot.is_none() {
        *slot = Some(at);
    }
}

/// Feedback written after completion; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackPatch {
    pub rider_rating: Option<u8>,
    pub driver_rating: Option<u8>,
    pub rider_comment: Option<String>,
    pub driver_comment: Option<String>,
}

impl FeedbackPatch {
    /// Whether applying this patch would replace a rating already given.
    pub fn overwrites(&self, feedback: &Feedback) -> bool {
        (self.rider_rating.is_some() && feedback.rider_rating.is_some())
            || (self.driver_rating.is_some() && feedback.driver_rating.is_some())
    }

    pub fn apply(&self, feedback: &mut Feedback) {
        if self.rider_rating.is_some() {
            feedback.rider_rating = self.rider_rating;
        }
        if self.driver_rating.is_some() {
            feedback.driver_rating = self.driver_rating;
        }
        if self.rider_comment.is_some() {
            feedback.rider_comment = self.rider_comment.clone();
        }
        if self.driver_comment.is_some() {
            feedback.driver_comment = self.driver_comment.clone();
        }
    }
}
