#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use ride_dispatch::auth::TokenDirectory;
use ride_dispatch::engine::coordinator::{Collaborators, DispatchCoordinator, DispatchSettings};
use ride_dispatch::engine::matching::RideRequest;
use ride_dispatch::error::AppError;
use ride_dispatch::models::actor::Actor;
use ride_dispatch::models::driver::{DriverCandidate, DriverRecord, GeoPoint};
use ride_dispatch::models::ride::{FeedbackPatch, Location, Ride, RideEstimates, RidePatch, RideStatus};
use ride_dispatch::notify::{
    PushError, PushMessage, PushSender, RealtimeTransport, TransportError,
};
use ride_dispatch::observability::metrics::Metrics;
use ride_dispatch::store::memory::InMemoryStore;
use ride_dispatch::store::{DriverFilter, DriverStore, PartyStore, RideFilter, RideStore};

/// Push fake: succeeds unless the token was scripted to fail.
#[derive(Default)]
pub struct FakePush {
    scripted: Mutex<HashMap<String, PushError>>,
    pub sent: Mutex<Vec<PushMessage>>,
}

impl FakePush {
    pub fn fail_token(&self, token: &str, error: PushError) {
        self.scripted
            .lock()
            .unwrap()
            .insert(token.to_string(), error);
    }

    pub fn sent_to(&self, token: &str) -> Vec<PushMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|message| message.token == token)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PushSender for FakePush {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError> {
        self.sent.lock().unwrap().push(message.clone());
        match self.scripted.lock().unwrap().get(&message.token) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    pub room: String,
    pub event: String,
    pub payload: Value,
}

#[derive(Default)]
pub struct FakeRealtime {
    pub failing: AtomicBool,
    pub emitted: Mutex<Vec<Emitted>>,
}

impl FakeRealtime {
    pub fn events_for(&self, party_id: Uuid) -> Vec<Emitted> {
        let room = party_id.to_string();
        self.emitted
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.room == room)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RealtimeTransport for FakeRealtime {
    async fn emit_to_party(
        &self,
        room: &str,
        event: &str,
        payload: &Value,
    ) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError("transport down".to_string()));
        }
        self.emitted.lock().unwrap().push(Emitted {
            room: room.to_string(),
            event: event.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

/// Driver store whose geospatial query is down; everything else delegates.
pub struct QueryDownDrivers(pub Arc<InMemoryStore>);

#[async_trait]
impl DriverStore for QueryDownDrivers {
    async fn query_drivers(
        &self,
        _point: GeoPoint,
        _radius_m: f64,
        _filter: DriverFilter,
    ) -> Result<Vec<DriverCandidate>, AppError> {
        Err(AppError::Persistence("geo index offline".to_string()))
    }

    async fn get_driver(&self, id: Uuid) -> Result<Option<DriverRecord>, AppError> {
        self.0.get_driver(id).await
    }

    async fn register_driver(&self, record: DriverRecord) -> Result<DriverRecord, AppError> {
        self.0.register_driver(record).await
    }

    async fn update_driver_presence(
        &self,
        id: Uuid,
        location: GeoPoint,
        online: bool,
    ) -> Result<Option<DriverRecord>, AppError> {
        self.0.update_driver_presence(id, location, online).await
    }

    async fn set_driver_verified(
        &self,
        id: Uuid,
        verified: bool,
    ) -> Result<Option<DriverRecord>, AppError> {
        self.0.set_driver_verified(id, verified).await
    }
}

/// Ride store that pauses after every read, widening the window between a
/// handler loading a ride and writing to it.
pub struct SlowRides(pub Arc<InMemoryStore>);

#[async_trait]
impl RideStore for SlowRides {
    async fn create_ride(&self, ride: Ride) -> Result<Ride, AppError> {
        self.0.create_ride(ride).await
    }

    async fn get_ride(&self, id: Uuid) -> Result<Option<Ride>, AppError> {
        let ride = self.0.get_ride(id).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        ride
    }

    async fn conditional_update_ride(
        &self,
        id: Uuid,
        expected: RideStatus,
        patch: &RidePatch,
    ) -> Result<bool, AppError> {
        self.0.conditional_update_ride(id, expected, patch).await
    }

    async fn set_feedback_if_unset(
        &self,
        id: Uuid,
        patch: &FeedbackPatch,
    ) -> Result<bool, AppError> {
        self.0.set_feedback_if_unset(id, patch).await
    }

    async fn query_rides(
        &self,
        filter: &RideFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Ride>, AppError> {
        self.0.query_rides(filter, skip, limit).await
    }

    async fn count_rides(&self, filter: &RideFilter) -> Result<usize, AppError> {
        self.0.count_rides(filter).await
    }
}

pub struct Harness {
    pub dispatch: DispatchCoordinator,
    pub store: Arc<InMemoryStore>,
    pub push: Arc<FakePush>,
    pub realtime: Arc<FakeRealtime>,
    pub directory: Arc<TokenDirectory>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::with_drivers(store.clone(), store)
    }

    pub fn with_drivers(store: Arc<InMemoryStore>, drivers: Arc<dyn DriverStore>) -> Self {
        Self::with_stores(store.clone(), store, drivers)
    }

    pub fn with_rides(store: Arc<InMemoryStore>, rides: Arc<dyn RideStore>) -> Self {
        Self::with_stores(store.clone(), rides, store)
    }

    fn with_stores(
        store: Arc<InMemoryStore>,
        rides: Arc<dyn RideStore>,
        drivers: Arc<dyn DriverStore>,
    ) -> Self {
        let push = Arc::new(FakePush::default());
        let realtime = Arc::new(FakeRealtime::default());
        let directory = Arc::new(TokenDirectory::new());

        let collaborators = Collaborators {
            rides,
            drivers,
            parties: store.clone(),
            verifier: directory.clone(),
            push: push.clone(),
            realtime: realtime.clone(),
        };

        Self {
            dispatch: DispatchCoordinator::new(
                collaborators,
                DispatchSettings::default(),
                Metrics::new(),
            ),
            store,
            push,
            realtime,
            directory,
        }
    }

    pub async fn rider(&self) -> Actor {
        let rider = Actor::rider(Uuid::new_v4());
        self.dispatch
            .enroll(&rider, Some(push_token(rider.id)))
            .await
            .unwrap();
        rider
    }

    /// Online, verified driver with a push token at the given position.
    pub async fn driver_at(&self, lat: f64, lng: f64) -> Actor {
        self.driver_with(lat, lng, true, true).await
    }

    pub async fn driver_with(&self, lat: f64, lng: f64, online: bool, verified: bool) -> Actor {
        let driver = Actor::driver(Uuid::new_v4());
        self.dispatch
            .enroll(&driver, Some(push_token(driver.id)))
            .await
            .unwrap();
        self.store
            .update_driver_presence(driver.id, GeoPoint { lat, lng }, online)
            .await
            .unwrap();
        self.store
            .set_driver_verified(driver.id, verified)
            .await
            .unwrap();
        driver
    }

    pub async fn stored_push_token(&self, party_id: Uuid) -> Option<String> {
        self.store.push_token(party_id).await.unwrap()
    }
}

pub fn push_token(party_id: Uuid) -> String {
    format!("tok-{party_id}")
}

pub fn location(lat: f64, lng: f64) -> Location {
    Location {
        lat,
        lng,
        address: None,
    }
}

pub fn trip() -> RideRequest {
    RideRequest {
        pickup: location(1.0, 1.0),
        dropoff: location(2.0, 2.0),
        estimates: RideEstimates {
            fare: 15.0,
            distance_m: 157_000.0,
            duration_s: 7_200.0,
        },
    }
}
