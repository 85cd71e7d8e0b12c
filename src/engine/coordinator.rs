//! Façade consumed by the request-handling layer.
//!
//! Every status change runs the same sequence: load the ride, check that the
//! actor may touch it, hand it to [`RideStateMachine`], then notify the
//! counterparty. Errors from the first three steps return before any
//! notification is attempted; notification outcomes never reach the caller.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::ActorVerifier;
use crate::engine::clear_invalid_tokens;
use crate::engine::command::{PresenceUpdate, RatingCommand, StatusChange};
use crate::engine::location_index::{DEFAULT_RADIUS_M, DriverLocationIndex};
use crate::engine::matching::{MatchOutcome, MatchingEngine, RideRequest};
use crate::engine::state_machine::{RideCommand, RideStateMachine};
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::driver::DriverRecord;
use crate::models::ride::{FeedbackPatch, Ride, RideStatus};
use crate::notify::event::RideNotification;
use crate::notify::{
    ChannelAddresses, DeliveryReport, NotificationDispatcher, PushSender, RealtimeTransport,
};
use crate::observability::metrics::Metrics;
use crate::store::{DriverStore, PartyStore, RideFilter, RideStore};

const MAX_PUSH_TOKEN_LEN: usize = 4_096;

/// External collaborators, injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub rides: Arc<dyn RideStore>,
    pub drivers: Arc<dyn DriverStore>,
    pub parties: Arc<dyn PartyStore>,
    pub verifier: Arc<dyn ActorVerifier>,
    pub push: Arc<dyn PushSender>,
    pub realtime: Arc<dyn RealtimeTransport>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchSettings {
    pub search_radius_m: f64,
    pub history_page_limit: usize,
    pub history_max_limit: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            search_radius_m: DEFAULT_RADIUS_M,
            history_page_limit: 20,
            history_max_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RideHistoryPage {
    pub rides: Vec<Ride>,
    pub total: usize,
    pub total_pages: usize,
    pub current_page: usize,
    pub limit: usize,
}

pub struct DispatchCoordinator {
    rides: Arc<dyn RideStore>,
    drivers: Arc<dyn DriverStore>,
    parties: Arc<dyn PartyStore>,
    verifier: Arc<dyn ActorVerifier>,
    matching: MatchingEngine,
    machine: RideStateMachine,
    notifier: NotificationDispatcher,
    settings: DispatchSettings,
}

impl DispatchCoordinator {
    pub fn new(collaborators: Collaborators, settings: DispatchSettings, metrics: Metrics) -> Self {
        let Collaborators {
            rides,
            drivers,
            parties,
            verifier,
            push,
            realtime,
        } = collaborators;

        let notifier = NotificationDispatcher::new(push, realtime, metrics.clone());
        let index = DriverLocationIndex::new(drivers.clone());
        let matching = MatchingEngine::new(
            rides.clone(),
            parties.clone(),
            index,
            notifier.clone(),
            settings.search_radius_m,
            metrics.clone(),
        );
        let machine = RideStateMachine::new(rides.clone(), drivers.clone(), metrics);

        Self {
            rides,
            drivers,
            parties,
            verifier,
            matching,
            machine,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> DispatchSettings {
        self.settings
    }

    pub async fn authenticate(&self, credential: &str) -> Result<Actor, AppError> {
        self.verifier.verify_actor(credential).await
    }

    /// Records a newly authenticated party: drivers get a (offline,
    /// unverified) driver record, and any supplied push token is stored.
    pub async fn enroll(&self, actor: &Actor, push_token: Option<String>) -> Result<(), AppError> {
        if actor.role == Role::Driver {
            self.drivers
                .register_driver(DriverRecord::new(actor.id))
                .await?;
        }
        if let Some(token) = push_token {
            self.register_push_token(actor, &token).await?;
        }
        Ok(())
    }

    pub async fn request_ride(
        &self,
        actor: &Actor,
        request: RideRequest,
    ) -> Result<MatchOutcome, AppError> {
        if actor.role != Role::Rider {
            return Err(AppError::Unauthorized(
                "only riders can request rides".to_string(),
            ));
        }
        self.matching.request_ride(actor.id, request).await
    }

    pub async fn accept_ride(&self, actor: &Actor, ride_id: Uuid) -> Result<Ride, AppError> {
        if actor.role != Role::Driver {
            return Err(AppError::Unauthorized(
                "driver access required".to_string(),
            ));
        }
        self.run_transition(actor, ride_id, RideCommand::Accept).await
    }

    pub async fn update_ride_status(
        &self,
        actor: &Actor,
        ride_id: Uuid,
        change: StatusChange,
    ) -> Result<Ride, AppError> {
        let StatusChange {
            target,
            reason,
            completion,
        } = change;

        match RideCommand::for_target(target, reason, completion) {
            Some(command) => self.run_transition(actor, ride_id, command).await,
            None => {
                let ride = self.load_ride(ride_id).await?;
                self.authorize_transition(&ride, actor)?;
                Err(AppError::InvalidTransition {
                    from: ride.status,
                    to: RideStatus::Requested,
                })
            }
        }
    }

    pub async fn cancel_ride(
        &self,
        actor: &Actor,
        ride_id: Uuid,
        reason: Option<String>,
    ) -> Result<Ride, AppError> {
        self.run_transition(actor, ride_id, RideCommand::Cancel { reason })
            .await
    }

    pub async fn get_ride(&self, actor: &Actor, ride_id: Uuid) -> Result<Ride, AppError> {
        let ride = self.load_ride(ride_id).await?;
        if !ride.is_party(actor.id) && !actor.is_admin() {
            return Err(AppError::Unauthorized(
                "not a party to this ride".to_string(),
            ));
        }
        Ok(ride)
    }

    pub async fn active_rides(&self, actor: &Actor) -> Result<Vec<Ride>, AppError> {
        let mut filter = RideFilter {
            statuses: RideStatus::ACTIVE.to_vec(),
            ..RideFilter::default()
        };
        match actor.role {
            Role::Rider => filter.rider_id = Some(actor.id),
            Role::Driver => filter.driver_id = Some(actor.id),
            Role::Admin => {}
        }

        self.rides.query_rides(&filter, 0, usize::MAX).await
    }

    pub async fn ride_history(
        &self,
        actor: &Actor,
        user_id: Uuid,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<RideHistoryPage, AppError> {
        if actor.id != user_id && !actor.is_admin() {
            return Err(AppError::Unauthorized(
                "cannot read another user's ride history".to_string(),
            ));
        }

        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(self.settings.history_page_limit);
        if page == 0 {
            return Err(AppError::Validation("page starts at 1".to_string()));
        }
        if limit == 0 || limit > self.settings.history_max_limit {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                self.settings.history_max_limit
            )));
        }

        let filter = RideFilter {
            statuses: RideStatus::FINISHED.to_vec(),
            party_id: Some(user_id),
            ..RideFilter::default()
        };
        let total = self.rides.count_rides(&filter).await?;
        let skip = (page - 1).saturating_mul(limit);
        let rides = self.rides.query_rides(&filter, skip, limit).await?;

        Ok(RideHistoryPage {
            rides,
            total,
            total_pages: total.div_ceil(limit),
            current_page: page,
            limit,
        })
    }

    pub async fn rate_ride(
        &self,
        actor: &Actor,
        ride_id: Uuid,
        rating: RatingCommand,
    ) -> Result<Ride, AppError> {
        let ride = self.load_ride(ride_id).await?;
        if !ride.is_party(actor.id) {
            return Err(AppError::Unauthorized(
                "not a party to this ride".to_string(),
            ));
        }
        if ride.status != RideStatus::Completed {
            return Err(AppError::Conflict(
                "only completed rides can be rated".to_string(),
            ));
        }

        let patch = if ride.is_rider(actor.id) {
            FeedbackPatch {
                driver_rating: Some(rating.rating),
                rider_comment: rating.comment,
                ..FeedbackPatch::default()
            }
        } else {
            FeedbackPatch {
                rider_rating: Some(rating.rating),
                driver_comment: rating.comment,
                ..FeedbackPatch::default()
            }
        };

        // Re-checked under the store's write lock.
        if patch.overwrites(&ride.feedback)
            || !self.rides.set_feedback_if_unset(ride_id, &patch).await?
        {
            return Err(AppError::Conflict("ride already rated".to_string()));
        }
        info!(ride_id = %ride_id, actor_id = %actor.id, rating = rating.rating, "ride rated");
        self.load_ride(ride_id).await
    }

    pub async fn update_driver_location(
        &self,
        actor: &Actor,
        update: PresenceUpdate,
    ) -> Result<DriverRecord, AppError> {
        if actor.role != Role::Driver {
            return Err(AppError::Unauthorized(
                "driver access required".to_string(),
            ));
        }

        if let Some(record) = self
            .drivers
            .update_driver_presence(actor.id, update.location, update.available)
            .await?
        {
            return Ok(record);
        }

        self.drivers
            .register_driver(DriverRecord::new(actor.id))
            .await?;
        self.drivers
            .update_driver_presence(actor.id, update.location, update.available)
            .await?
            .ok_or_else(|| {
                AppError::Persistence(format!("driver {} missing after registration", actor.id))
            })
    }

    pub async fn set_driver_verified(
        &self,
        actor: &Actor,
        driver_id: Uuid,
        verified: bool,
    ) -> Result<DriverRecord, AppError> {
        if !actor.is_admin() {
            return Err(AppError::Unauthorized(
                "admin access required".to_string(),
            ));
        }

        let record = self
            .drivers
            .set_driver_verified(driver_id, verified)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
        info!(driver_id = %driver_id, verified, "driver verification changed");
        Ok(record)
    }

    pub async fn register_push_token(&self, actor: &Actor, token: &str) -> Result<(), AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::Validation("push token is required".to_string()));
        }
        if token.len() > MAX_PUSH_TOKEN_LEN {
            return Err(AppError::Validation("push token is too long".to_string()));
        }

        self.parties
            .set_push_token(actor.id, token.to_string())
            .await?;
        info!(party_id = %actor.id, "push token updated");
        Ok(())
    }

    async fn run_transition(
        &self,
        actor: &Actor,
        ride_id: Uuid,
        command: RideCommand,
    ) -> Result<Ride, AppError> {
        let ride = self.load_ride(ride_id).await?;
        self.authorize_transition(&ride, actor)?;

        let updated = self.machine.transition(&ride, command, actor).await?;
        self.notify_counterparty(&updated, actor).await;
        Ok(updated)
    }

    async fn load_ride(&self, ride_id: Uuid) -> Result<Ride, AppError> {
        self.rides
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))
    }

    /// Parties may attempt transitions; any driver is a prospective party of
    /// a ride that is still requested.
    fn authorize_transition(&self, ride: &Ride, actor: &Actor) -> Result<(), AppError> {
        let prospective_driver = ride.status == RideStatus::Requested && actor.role == Role::Driver;
        if ride.is_party(actor.id) || prospective_driver {
            return Ok(());
        }
        Err(AppError::Unauthorized(
            "not a party to this ride".to_string(),
        ))
    }

    async fn notify_counterparty(&self, ride: &Ride, actor: &Actor) -> Option<DeliveryReport> {
        let counterparty = ride.counterparty_of(actor.id)?;

        let push_token = match self.parties.push_token(counterparty).await {
            Ok(token) => token,
            Err(err) => {
                warn!(party_id = %counterparty, error = %err, "push token lookup failed; real-time only");
                None
            }
        };

        let notification = RideNotification::for_transition(ride, actor.role);
        let report = self
            .notifier
            .notify(
                counterparty,
                &ChannelAddresses::for_party(counterparty, push_token),
                &notification,
            )
            .await;

        clear_invalid_tokens(self.parties.as_ref(), std::slice::from_ref(&report)).await;
        Some(report)
    }
}
