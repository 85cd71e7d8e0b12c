use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::models::actor::Role;
use crate::models::ride::{Ride, RideStatus};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum RideEvent {
    #[serde(rename = "rideRequest")]
    RideRequest,
    #[serde(rename = "rideAccepted")]
    RideAccepted,
    #[serde(rename = "rideStatusUpdate")]
    RideStatusUpdate,
    #[serde(rename = "rideCancelled")]
    RideCancelled,
}

impl RideEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RideEvent::RideRequest => "rideRequest",
            RideEvent::RideAccepted => "rideAccepted",
            RideEvent::RideStatusUpdate => "rideStatusUpdate",
            RideEvent::RideCancelled => "rideCancelled",
        }
    }
}

/// One logical ride event rendered for both channels: `payload` goes over
/// the real-time channel, `title`/`body`/`data` over push.
#[derive(Debug, Clone, PartialEq)]
pub struct RideNotification {
    pub event: RideEvent,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
    pub payload: Value,
}

impl RideNotification {
    /// Invitation sent to every matching candidate.
    pub fn ride_request(ride: &Ride) -> Self {
        let mut data = base_data(ride, "RideRequest");
        data.insert("pickup_lat".to_string(), ride.pickup.lat.to_string());
        data.insert("pickup_lng".to_string(), ride.pickup.lng.to_string());
        data.insert(
            "estimated_fare".to_string(),
            ride.fare.estimated.to_string(),
        );

        Self {
            event: RideEvent::RideRequest,
            title: "New Ride Request".to_string(),
            body: "Tap to view pickup location".to_string(),
            data,
            payload: json!({
                "ride_id": ride.id,
                "pickup": ride.pickup,
                "dropoff": ride.dropoff,
                "estimated_fare": ride.fare.estimated,
                "rider_id": ride.rider_id,
            }),
        }
    }

    /// Sent after any committed transition other than the initial request.
    pub fn for_transition(ride: &Ride, actor_role: Role) -> Self {
        match ride.status {
            RideStatus::Accepted => Self::accepted(ride),
            RideStatus::Cancelled => Self::cancelled(ride, actor_role),
            _ => Self::status_update(ride),
        }
    }

    fn accepted(ride: &Ride) -> Self {
        let mut data = base_data(ride, "ActiveRide");
        if let Some(driver_id) = ride.driver_id {
            data.insert("driver_id".to_string(), driver_id.to_string());
        }

        Self {
            event: RideEvent::RideAccepted,
            title: "Ride Accepted".to_string(),
            body: "Your driver is on the way".to_string(),
            data,
            payload: json!({
                "ride_id": ride.id,
                "driver_id": ride.driver_id,
                "rider_id": ride.rider_id,
                "status": ride.status,
            }),
        }
    }

    fn status_update(ride: &Ride) -> Self {
        let screen = if ride.status == RideStatus::Completed {
            "RideComplete"
        } else {
            "ActiveRide"
        };

        Self {
            event: RideEvent::RideStatusUpdate,
            title: "Ride Update".to_string(),
            body: status_message(ride.status).to_string(),
            data: base_data(ride, screen),
            payload: json!({
                "ride_id": ride.id,
                "status": ride.status,
                "rider_id": ride.rider_id,
                "driver_id": ride.driver_id,
            }),
        }
    }

    fn cancelled(ride: &Ride, actor_role: Role) -> Self {
        let mut data = base_data(ride, "ActiveRide");
        data.insert("cancelled_by".to_string(), actor_role.to_string());

        Self {
            event: RideEvent::RideCancelled,
            title: "Ride Update".to_string(),
            body: status_message(RideStatus::Cancelled).to_string(),
            data,
            payload: json!({
                "ride_id": ride.id,
                "reason": ride.cancellation_reason,
                "cancelled_by": actor_role,
            }),
        }
    }
}

fn base_data(ride: &Ride, screen: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("ride_id".to_string(), ride.id.to_string()),
        ("status".to_string(), ride.status.to_string()),
        ("screen".to_string(), screen.to_string()),
    ])
}

fn status_message(status: RideStatus) -> &'static str {
    match status {
        RideStatus::Requested => "Your ride has been requested",
        RideStatus::Accepted => "Your driver is on the way",
        RideStatus::Arrived => "Your driver has arrived",
        RideStatus::Started => "Your ride has started",
        RideStatus::Completed => "Ride completed. Thank you!",
        RideStatus::Cancelled => "Your ride has been cancelled",
    }
}
