use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Persistent view of a driver as the store holds it. Location and presence
/// are written by the driver-location collaborator, never by dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverRecord {
    pub id: Uuid,
    pub online: bool,
    pub verified: bool,
    pub location: Option<GeoPoint>,
    pub rating: f64,
    pub last_seen: DateTime<Utc>,
}

impl DriverRecord {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            online: false,
            verified: false,
            location: None,
            rating: 5.0,
            last_seen: Utc::now(),
        }
    }

    pub fn is_dispatchable(&self) -> bool {
        self.online && self.verified
    }
}

/// Read-only projection used for matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverCandidate {
    pub id: Uuid,
    pub online: bool,
    pub verified: bool,
    pub location: GeoPoint,
    pub push_token: Option<String>,
    pub rating: f64,
    pub distance_m: f64,
}
