//! Ride status state machine.
//!
//! ```text
//! requested -> accepted -> arrived -> started -> completed
//!     \___________\___________\__________\_____> cancelled
//! ```
//!
//! Every transition is a compare-and-set on the ride's current status, so a
//! transition either commits completely (status, timestamp, assignment) or
//! not at all. For `accept` this is what makes assignment exclusive.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::ride::{Cancellation, CompletionDetails, Ride, RidePatch, RideStatus};
use crate::observability::metrics::Metrics;
use crate::store::{DriverStore, RideStore};

pub const RIDE_UNAVAILABLE: &str = "ride no longer available";

#[derive(Debug, Clone, PartialEq)]
pub enum RideCommand {
    Accept,
    Arrive,
    Start,
    Complete(CompletionDetails),
    Cancel { reason: Option<String> },
}

impl RideCommand {
    /// Command that moves a ride into `target`. `requested` has no command:
    /// nothing ever re-enters it.
    pub fn for_target(
        target: RideStatus,
        reason: Option<String>,
        completion: CompletionDetails,
    ) -> Option<Self> {
        match target {
            RideStatus::Requested => None,
            RideStatus::Accepted => Some(RideCommand::Accept),
            RideStatus::Arrived => Some(RideCommand::Arrive),
            RideStatus::Started => Some(RideCommand::Start),
            RideStatus::Completed => Some(RideCommand::Complete(completion)),
            RideStatus::Cancelled => Some(RideCommand::Cancel { reason }),
        }
    }

    pub fn target(&self) -> RideStatus {
        match self {
            RideCommand::Accept => RideStatus::Accepted,
            RideCommand::Arrive => RideStatus::Arrived,
            RideCommand::Start => RideStatus::Started,
            RideCommand::Complete(_) => RideStatus::Completed,
            RideCommand::Cancel { .. } => RideStatus::Cancelled,
        }
    }
}

/// Validates `command` against the transition table and the actor, and
/// returns the patch to apply. Does not touch storage.
pub fn plan(
    ride: &Ride,
    command: &RideCommand,
    actor: &Actor,
    at: DateTime<Utc>,
) -> Result<RidePatch, AppError> {
    let target = command.target();
    let mut patch = RidePatch::to(target, at);

    match command {
        RideCommand::Accept => {
            if ride.status != RideStatus::Requested || ride.driver_id.is_some() {
                return Err(AppError::Conflict(RIDE_UNAVAILABLE.to_string()));
            }
            if actor.role != Role::Driver {
                return Err(AppError::Unauthorized(
                    "only drivers can accept rides".to_string(),
                ));
            }
            if ride.is_rider(actor.id) {
                return Err(AppError::Unauthorized(
                    "a rider cannot accept their own ride".to_string(),
                ));
            }
            patch.driver_id = Some(actor.id);
        }
        RideCommand::Arrive | RideCommand::Start | RideCommand::Complete(_) => {
            let required = match command {
                RideCommand::Arrive => RideStatus::Accepted,
                RideCommand::Start => RideStatus::Arrived,
                _ => RideStatus::Started,
            };
            if ride.status != required {
                return Err(AppError::InvalidTransition {
                    from: ride.status,
                    to: target,
                });
            }
            if !ride.is_assigned_driver(actor.id) {
                return Err(AppError::Unauthorized(format!(
                    "only the assigned driver can mark a ride {target}"
                )));
            }
            if let RideCommand::Complete(details) = command {
                patch.completion = Some(*details);
            }
        }
        RideCommand::Cancel { reason } => {
            if ride.status.is_terminal() {
                return Err(AppError::Conflict(format!(
                    "ride is already {}",
                    ride.status
                )));
            }
            if !ride.is_party(actor.id) {
                return Err(AppError::Unauthorized(
                    "only the rider or the assigned driver can cancel".to_string(),
                ));
            }
            let reason = reason
                .as_deref()
                .map(str::trim)
                .filter(|reason| !reason.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| default_cancellation_reason(ride, actor.id).to_string());
            patch.cancellation = Some(Cancellation {
                by: actor.id,
                reason,
            });
        }
    }

    Ok(patch)
}

fn default_cancellation_reason(ride: &Ride, actor_id: Uuid) -> &'static str {
    if ride.is_rider(actor_id) {
        "rider_cancelled"
    } else {
        "driver_cancelled"
    }
}

#[derive(Clone)]
pub struct RideStateMachine {
    rides: Arc<dyn RideStore>,
    drivers: Arc<dyn DriverStore>,
    metrics: Metrics,
}

impl RideStateMachine {
    pub fn new(rides: Arc<dyn RideStore>, drivers: Arc<dyn DriverStore>, metrics: Metrics) -> Self {
        Self {
            rides,
            drivers,
            metrics,
        }
    }

    /// Applies `command` to `ride` as loaded by the caller. Returns the ride as
    /// stored after the commit.
    pub async fn transition(
        &self,
        ride: &Ride,
        command: RideCommand,
        actor: &Actor,
    ) -> Result<Ride, AppError> {
        let target = command.target();
        let result = self.apply(ride, &command, actor).await;

        let outcome = match &result {
            Ok(_) => "committed",
            Err(err) => err.kind(),
        };
        self.metrics
            .ride_transitions_total
            .with_label_values(&[target.as_str(), outcome])
            .inc();

        result
    }

    async fn apply(
        &self,
        ride: &Ride,
        command: &RideCommand,
        actor: &Actor,
    ) -> Result<Ride, AppError> {
        let patch = plan(ride, command, actor, Utc::now())?;

        if *command == RideCommand::Accept {
            self.ensure_dispatchable(actor.id).await?;
        }

        let applied = self
            .rides
            .conditional_update_ride(ride.id, ride.status, &patch)
            .await?;

        if !applied {
            return Err(self.lost_race(ride, command, actor).await);
        }

        let updated = self.rides.get_ride(ride.id).await?.ok_or_else(|| {
            AppError::Persistence(format!("ride {} missing after update", ride.id))
        })?;

        info!(
            ride_id = %updated.id,
            actor_id = %actor.id,
            from = %ride.status,
            to = %updated.status,
            "ride transition committed"
        );
        Ok(updated)
    }

    async fn ensure_dispatchable(&self, driver_id: Uuid) -> Result<(), AppError> {
        let driver = self
            .drivers
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        if !driver.is_dispatchable() {
            return Err(AppError::Unauthorized(
                "driver must be online and verified to accept rides".to_string(),
            ));
        }
        Ok(())
    }

    async fn lost_race(&self, ride: &Ride, command: &RideCommand, actor: &Actor) -> AppError {
        if *command == RideCommand::Accept {
            self.metrics.accept_conflicts_total.inc();
            warn!(ride_id = %ride.id, driver_id = %actor.id, "accept lost the race");
            return AppError::Conflict(RIDE_UNAVAILABLE.to_string());
        }

        match self.rides.get_ride(ride.id).await {
            Ok(Some(current)) => {
                warn!(
                    ride_id = %ride.id,
                    expected = %ride.status,
                    actual = %current.status,
                    "ride changed concurrently"
                );
                AppError::Conflict(format!(
                    "ride changed concurrently and is now {}",
                    current.status
                ))
            }
            Ok(None) => AppError::NotFound(format!("ride {} not found", ride.id)),
            Err(err) => err,
        }
    }
}
