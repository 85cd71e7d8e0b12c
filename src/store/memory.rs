use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_m;
use crate::models::driver::{DriverCandidate, DriverRecord, GeoPoint};
use crate::models::ride::{FeedbackPatch, Ride, RidePatch, RideStatus};
use crate::store::{DriverFilter, DriverStore, PartyStore, RideFilter, RideStore};

/// DashMap-backed store. Compare-and-set holds the shard write lock for the
/// whole read-compare-write, so concurrent accepts on one ride serialize.
#[derive(Default)]
pub struct InMemoryStore {
    rides: DashMap<Uuid, Ride>,
    drivers: DashMap<Uuid, DriverRecord>,
    push_tokens: DashMap<Uuid, String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ride_count(&self) -> usize {
        self.rides.len()
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }
}

#[async_trait]
impl RideStore for InMemoryStore {
    async fn create_ride(&self, ride: Ride) -> Result<Ride, AppError> {
        if self.rides.contains_key(&ride.id) {
            return Err(AppError::Persistence(format!(
                "ride {} already exists",
                ride.id
            )));
        }
        self.rides.insert(ride.id, ride.clone());
        Ok(ride)
    }

    async fn get_ride(&self, id: Uuid) -> Result<Option<Ride>, AppError> {
        Ok(self.rides.get(&id).map(|entry| entry.value().clone()))
    }

    async fn conditional_update_ride(
        &self,
        id: Uuid,
        expected: RideStatus,
        patch: &RidePatch,
    ) -> Result<bool, AppError> {
        let Some(mut ride) = self.rides.get_mut(&id) else {
            return Ok(false);
        };

        if ride.status != expected {
            return Ok(false);
        }

        patch.apply(&mut ride);
        Ok(true)
    }

    async fn set_feedback_if_unset(
        &self,
        id: Uuid,
        patch: &FeedbackPatch,
    ) -> Result<bool, AppError> {
        let Some(mut ride) = self.rides.get_mut(&id) else {
            return Ok(false);
        };

        if patch.overwrites(&ride.feedback) {
            return Ok(false);
        }

        patch.apply(&mut ride.feedback);
        Ok(true)
    }

    async fn query_rides(
        &self,
        filter: &RideFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Ride>, AppError> {
        let mut rides: Vec<Ride> = self
            .rides
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        rides.sort_by(|a, b| {
            b.requested_at
                .cmp(&a.requested_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(rides.into_iter().skip(skip).take(limit).collect())
    }

    async fn count_rides(&self, filter: &RideFilter) -> Result<usize, AppError> {
        Ok(self
            .rides
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .count())
    }
}

#[async_trait]
impl DriverStore for InMemoryStore {
    async fn query_drivers(
        &self,
        point: GeoPoint,
        radius_m: f64,
        filter: DriverFilter,
    ) -> Result<Vec<DriverCandidate>, AppError> {
        let candidates = self
            .drivers
            .iter()
            .filter_map(|entry| {
                let driver = entry.value();
                if !filter.matches(driver) {
                    return None;
                }

                let location = driver.location?;
                let distance_m = haversine_m(&point, &location);
                if distance_m > radius_m {
                    return None;
                }

                Some(DriverCandidate {
                    id: driver.id,
                    online: driver.online,
                    verified: driver.verified,
                    location,
                    push_token: self
                        .push_tokens
                        .get(&driver.id)
                        .map(|token| token.value().clone()),
                    rating: driver.rating,
                    distance_m,
                })
            })
            .collect();

        Ok(candidates)
    }

    async fn get_driver(&self, id: Uuid) -> Result<Option<DriverRecord>, AppError> {
        Ok(self.drivers.get(&id).map(|entry| entry.value().clone()))
    }

    async fn register_driver(&self, record: DriverRecord) -> Result<DriverRecord, AppError> {
        let stored = self
            .drivers
            .entry(record.id)
            .or_insert(record)
            .value()
            .clone();
        Ok(stored)
    }

    async fn update_driver_presence(
        &self,
        id: Uuid,
        location: GeoPoint,
        online: bool,
    ) -> Result<Option<DriverRecord>, AppError> {
        let Some(mut driver) = self.drivers.get_mut(&id) else {
            return Ok(None);
        };

        driver.location = Some(location);
        driver.online = online;
        driver.last_seen = Utc::now();
        Ok(Some(driver.clone()))
    }

    async fn set_driver_verified(
        &self,
        id: Uuid,
        verified: bool,
    ) -> Result<Option<DriverRecord>, AppError> {
        let Some(mut driver) = self.drivers.get_mut(&id) else {
            return Ok(None);
        };

        driver.verified = verified;
        Ok(Some(driver.clone()))
    }
}

#[async_trait]
impl PartyStore for InMemoryStore {
    async fn push_token(&self, party_id: Uuid) -> Result<Option<String>, AppError> {
        Ok(self
            .push_tokens
            .get(&party_id)
            .map(|token| token.value().clone()))
    }

    async fn set_push_token(&self, party_id: Uuid, token: String) -> Result<(), AppError> {
        self.push_tokens.insert(party_id, token);
        Ok(())
    }

    async fn clear_push_token(&self, party_id: Uuid, token: &str) -> Result<bool, AppError> {
        Ok(self
            .push_tokens
            .remove_if(&party_id, |_, stored| stored == token)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::InMemoryStore;
    use crate::models::driver::{DriverRecord, GeoPoint};
    use crate::models::ride::{FeedbackPatch, Location, Ride, RideEstimates, RidePatch, RideStatus};
    use crate::store::{DriverFilter, DriverStore, PartyStore, RideFilter, RideStore};

    fn location(lat: f64, lng: f64) -> Location {
        Location {
            lat,
            lng,
            address: None,
        }
    }

    fn ride(rider: u128) -> Ride {
        Ride::new(
            Uuid::from_u128(rider),
            location(1.0, 1.0),
            location(2.0, 2.0),
            RideEstimates::default(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn conditional_update_only_applies_on_expected_status() {
        let store = InMemoryStore::new();
        let ride = store.create_ride(ride(1)).await.unwrap();

        let mut patch = RidePatch::to(RideStatus::Accepted, Utc::now());
        patch.driver_id = Some(Uuid::from_u128(7));

        assert!(store
            .conditional_update_ride(ride.id, RideStatus::Requested, &patch)
            .await
            .unwrap());
        assert!(!store
            .conditional_update_ride(ride.id, RideStatus::Requested, &patch)
            .await
            .unwrap());

        let stored = store.get_ride(ride.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RideStatus::Accepted);
        assert_eq!(stored.driver_id, Some(Uuid::from_u128(7)));
    }

    #[tokio::test]
    async fn conditional_update_of_unknown_ride_affects_nothing() {
        let store = InMemoryStore::new();
        let patch = RidePatch::to(RideStatus::Arrived, Utc::now());
        assert!(!store
            .conditional_update_ride(Uuid::new_v4(), RideStatus::Accepted, &patch)
            .await
            .unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_compare_and_set_has_one_winner() {
        let store = Arc::new(InMemoryStore::new());
        let ride = store.create_ride(ride(1)).await.unwrap();

        let mut handles = Vec::new();
        for driver in 0..16u128 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut patch = RidePatch::to(RideStatus::Accepted, Utc::now());
                patch.driver_id = Some(Uuid::from_u128(100 + driver));
                store
                    .conditional_update_ride(ride.id, RideStatus::Requested, &patch)
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn feedback_is_written_only_into_empty_slots() {
        let store = InMemoryStore::new();
        let ride = store.create_ride(ride(1)).await.unwrap();

        let first = FeedbackPatch {
            driver_rating: Some(5),
            ..FeedbackPatch::default()
        };
        let second = FeedbackPatch {
            driver_rating: Some(1),
            ..FeedbackPatch::default()
        };
        let other_side = FeedbackPatch {
            rider_rating: Some(3),
            ..FeedbackPatch::default()
        };

        assert!(store.set_feedback_if_unset(ride.id, &first).await.unwrap());
        assert!(!store.set_feedback_if_unset(ride.id, &second).await.unwrap());
        assert!(store.set_feedback_if_unset(ride.id, &other_side).await.unwrap());
        assert!(!store
            .set_feedback_if_unset(Uuid::new_v4(), &first)
            .await
            .unwrap());

        let stored = store.get_ride(ride.id).await.unwrap().unwrap();
        assert_eq!(stored.feedback.driver_rating, Some(5));
        assert_eq!(stored.feedback.rider_rating, Some(3));
    }

    #[tokio::test]
    async fn query_rides_filters_and_sorts_newest_first() {
        let store = InMemoryStore::new();
        let mut older = ride(1);
        older.requested_at = Utc::now() - Duration::minutes(10);
        let newer = ride(1);
        let other = ride(2);
        store.create_ride(older.clone()).await.unwrap();
        store.create_ride(newer.clone()).await.unwrap();
        store.create_ride(other).await.unwrap();

        let filter = RideFilter {
            rider_id: Some(Uuid::from_u128(1)),
            statuses: vec![RideStatus::Requested],
            ..RideFilter::default()
        };
        let rides = store.query_rides(&filter, 0, 10).await.unwrap();
        assert_eq!(rides.len(), 2);
        assert_eq!(rides[0].id, newer.id);
        assert_eq!(rides[1].id, older.id);
        assert_eq!(store.count_rides(&filter).await.unwrap(), 2);

        let page = store.query_rides(&filter, 1, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, older.id);
    }

    #[tokio::test]
    async fn query_drivers_respects_flags_and_radius() {
        let store = InMemoryStore::new();
        let near = Uuid::from_u128(1);
        let offline = Uuid::from_u128(2);
        let far = Uuid::from_u128(3);

        for (id, online, lat) in [(near, true, 1.001), (offline, false, 1.001), (far, true, 1.5)] {
            let mut record = DriverRecord::new(id);
            record.verified = true;
            store.register_driver(record).await.unwrap();
            store
                .update_driver_presence(id, GeoPoint { lat, lng: 1.0 }, online)
                .await
                .unwrap();
        }
        store.set_push_token(near, "tok-near".into()).await.unwrap();

        let found = store
            .query_drivers(
                GeoPoint { lat: 1.0, lng: 1.0 },
                5_000.0,
                DriverFilter::DISPATCHABLE,
            )
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, near);
        assert_eq!(found[0].push_token.as_deref(), Some("tok-near"));
    }

    #[tokio::test]
    async fn clear_push_token_ignores_replaced_token() {
        let store = InMemoryStore::new();
        let party = Uuid::from_u128(5);
        store.set_push_token(party, "new".into()).await.unwrap();

        assert!(!store.clear_push_token(party, "old").await.unwrap());
        assert!(store.clear_push_token(party, "new").await.unwrap());
        assert!(store.push_token(party).await.unwrap().is_none());
    }
}
