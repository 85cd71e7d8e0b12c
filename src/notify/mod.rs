//! Ride-event fan-out over the push and real-time channels.
//!
//! [`NotificationDispatcher::notify`] never fails. Each channel is attempted
//! once, independently of the other, and the outcome is returned as a
//! [`DeliveryReport`]. An invalid push token is reported back to the caller,
//! which owns clearing it from storage.

pub mod event;
pub mod push;
pub mod realtime;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::notify::event::{RideEvent, RideNotification};
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PushError {
    #[error("invalid or unregistered push token")]
    InvalidToken,

    #[error("transient push failure: {0}")]
    Transient(String),
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError>;
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("real-time transport error: {0}")]
pub struct TransportError(pub String);

/// At-most-once delivery to a party's room. No acknowledgment is awaited.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn emit_to_party(
        &self,
        room: &str,
        event: &str,
        payload: &Value,
    ) -> Result<(), TransportError>;
}

/// Where a party can be reached. Either address may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelAddresses {
    pub push_token: Option<String>,
    pub realtime_room: Option<String>,
}

impl ChannelAddresses {
    /// The party's own room plus whatever push token is on record.
    pub fn for_party(party_id: Uuid, push_token: Option<String>) -> Self {
        Self {
            push_token,
            realtime_room: Some(party_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChannelOutcome {
    Delivered,
    /// No address for this channel.
    Skipped,
    InvalidToken { token: String },
    Failed { reason: String },
}

impl ChannelOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ChannelOutcome::Delivered => "delivered",
            ChannelOutcome::Skipped => "skipped",
            ChannelOutcome::InvalidToken { .. } => "invalid_token",
            ChannelOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, ChannelOutcome::Delivered)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub party_id: Uuid,
    pub event: RideEvent,
    pub realtime: ChannelOutcome,
    pub push: ChannelOutcome,
}

impl DeliveryReport {
    /// The token that push rejected as invalid, if this report is for
    /// `party_id`. The caller decides whether to clear it.
    pub fn invalid_token_for(&self, party_id: Uuid) -> Option<&str> {
        if self.party_id != party_id {
            return None;
        }
        match &self.push {
            ChannelOutcome::InvalidToken { token } => Some(token.as_str()),
            _ => None,
        }
    }

    pub fn any_delivered(&self) -> bool {
        self.realtime.is_delivered() || self.push.is_delivered()
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    push: Arc<dyn PushSender>,
    realtime: Arc<dyn RealtimeTransport>,
    metrics: Metrics,
}

impl NotificationDispatcher {
    pub fn new(
        push: Arc<dyn PushSender>,
        realtime: Arc<dyn RealtimeTransport>,
        metrics: Metrics,
    ) -> Self {
        Self {
            push,
            realtime,
            metrics,
        }
    }

    pub async fn notify(
        &self,
        party_id: Uuid,
        addresses: &ChannelAddresses,
        notification: &RideNotification,
    ) -> DeliveryReport {
        let (realtime, push) = tokio::join!(
            self.deliver_realtime(party_id, addresses.realtime_room.as_deref(), notification),
            self.deliver_push(party_id, addresses.push_token.as_deref(), notification),
        );

        for (channel, outcome) in [("realtime", &realtime), ("push", &push)] {
            self.metrics
                .notifications_total
                .with_label_values(&[channel, outcome.label()])
                .inc();
        }

        DeliveryReport {
            party_id,
            event: notification.event,
            realtime,
            push,
        }
    }

    async fn deliver_realtime(
        &self,
        party_id: Uuid,
        room: Option<&str>,
        notification: &RideNotification,
    ) -> ChannelOutcome {
        let Some(room) = room else {
            return ChannelOutcome::Skipped;
        };

        match self
            .realtime
            .emit_to_party(room, notification.event.name(), &notification.payload)
            .await
        {
            Ok(()) => ChannelOutcome::Delivered,
            Err(err) => {
                warn!(party_id = %party_id, event = notification.event.name(), error = %err, "real-time delivery failed");
                ChannelOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn deliver_push(
        &self,
        party_id: Uuid,
        token: Option<&str>,
        notification: &RideNotification,
    ) -> ChannelOutcome {
        let Some(token) = token.filter(|token| !token.trim().is_empty()) else {
            return ChannelOutcome::Skipped;
        };

        let message = PushMessage {
            token: token.to_string(),
            title: notification.title.clone(),
            body: notification.body.clone(),
            data: notification.data.clone(),
        };

        match self.push.send(&message).await {
            Ok(()) => {
                debug!(party_id = %party_id, event = notification.event.name(), "push delivered");
                ChannelOutcome::Delivered
            }
            Err(PushError::InvalidToken) => {
                warn!(party_id = %party_id, "push token rejected as invalid");
                ChannelOutcome::InvalidToken {
                    token: token.to_string(),
                }
            }
            Err(err) => {
                warn!(party_id = %party_id, event = notification.event.name(), error = %err, "push delivery failed");
                ChannelOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }
}
