//! Request bodies for the dispatch operations. Serde handles shape, types and
//! key aliases; the `into_*` methods add the checks a type cannot express
//! and produce the typed commands the coordinator consumes.

use serde::Deserialize;

use crate::engine::matching::RideRequest;
use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::models::ride::{CompletionDetails, Location, RideEstimates, RideStatus};

const MAX_COMMENT_LEN: usize = 500;
const MAX_REASON_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub target: RideStatus,
    pub reason: Option<String>,
    pub completion: CompletionDetails,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatingCommand {
    pub rating: u8,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenceUpdate {
    pub location: GeoPoint,
    pub available: bool,
}

#[derive(Debug, Deserialize)]
pub struct RideRequestBody {
    pub pickup: Location,
    pub dropoff: Location,
    #[serde(default, alias = "estimatedFare")]
    pub estimated_fare: f64,
    #[serde(default, alias = "estimatedDistance")]
    pub estimated_distance: f64,
    #[serde(default, alias = "estimatedDuration")]
    pub estimated_duration: f64,
}

impl RideRequestBody {
    pub fn into_request(self) -> Result<RideRequest, AppError> {
        let request = RideRequest {
            pickup: tidy_address(self.pickup),
            dropoff: tidy_address(self.dropoff),
            estimates: RideEstimates {
                fare: self.estimated_fare,
                distance_m: self.estimated_distance,
                duration_s: self.estimated_duration,
            },
        };
        request.validate()?;
        Ok(request)
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeBody {
    pub status: RideStatus,
    #[serde(default, alias = "cancellation_reason")]
    pub reason: Option<String>,
    #[serde(default, alias = "finalFare")]
    pub final_fare: Option<f64>,
    #[serde(default, alias = "actualDistance")]
    pub actual_distance: Option<f64>,
    #[serde(default, alias = "actualDuration")]
    pub actual_duration: Option<f64>,
}

impl StatusChangeBody {
    pub fn into_change(self) -> Result<StatusChange, AppError> {
        let completion = CompletionDetails {
            final_fare: self.final_fare,
            actual_distance_m: self.actual_distance,
            actual_duration_s: self.actual_duration,
        };
        let values = [
            completion.final_fare,
            completion.actual_distance_m,
            completion.actual_duration_s,
        ];
        if values
            .into_iter()
            .flatten()
            .any(|value| !value.is_finite() || value < 0.0)
        {
            return Err(AppError::Validation(
                "completion values must be non-negative".to_string(),
            ));
        }

        Ok(StatusChange {
            target: self.status,
            reason: tidy_reason(self.reason)?,
            completion,
        })
    }
}

/// Cancellation bodies are optional; a missing reason means the default one.
#[derive(Debug, Default, Deserialize)]
pub struct CancelBody {
    #[serde(default, alias = "cancellation_reason")]
    pub reason: Option<String>,
}

impl CancelBody {
    pub fn into_reason(self) -> Result<Option<String>, AppError> {
        tidy_reason(self.reason)
    }
}

#[derive(Debug, Deserialize)]
pub struct RatingBody {
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

impl RatingBody {
    pub fn into_command(self) -> Result<RatingCommand, AppError> {
        if !(1..=5).contains(&self.rating) {
            return Err(AppError::Validation(
                "rating must be an integer from 1 to 5".to_string(),
            ));
        }

        let comment = self
            .comment
            .map(|comment| comment.trim().to_string())
            .filter(|comment| !comment.is_empty());
        if comment
            .as_ref()
            .is_some_and(|comment| comment.chars().count() > MAX_COMMENT_LEN)
        {
            return Err(AppError::Validation(format!(
                "comment must be at most {MAX_COMMENT_LEN} characters"
            )));
        }

        Ok(RatingCommand {
            rating: self.rating,
            comment,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PresenceBody {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lng")]
    pub longitude: f64,
    #[serde(default)]
    pub available: Option<bool>,
}

impl PresenceBody {
    pub fn into_update(self) -> Result<PresenceUpdate, AppError> {
        let location = GeoPoint {
            lat: self.latitude,
            lng: self.longitude,
        };
        if !location.is_valid() {
            return Err(AppError::Validation(
                "latitude/longitude out of range".to_string(),
            ));
        }

        Ok(PresenceUpdate {
            location,
            available: self.available.unwrap_or(true),
        })
    }
}

fn tidy_address(location: Location) -> Location {
    Location {
        address: location
            .address
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty()),
        ..location
    }
}

fn tidy_reason(reason: Option<String>) -> Result<Option<String>, AppError> {
    let reason = reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty());

    if reason
        .as_ref()
        .is_some_and(|reason| reason.chars().count() > MAX_REASON_LEN)
    {
        return Err(AppError::Validation(format!(
            "reason must be at most {MAX_REASON_LEN} characters"
        )));
    }
    Ok(reason)
}
