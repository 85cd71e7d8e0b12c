use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::auth::TokenDirectory;
use crate::engine::coordinator::{Collaborators, DispatchCoordinator, DispatchSettings};
use crate::models::actor::{Actor, Role};
use crate::notify::push::LogPushSender;
use crate::notify::realtime::BroadcastRealtime;
use crate::notify::PushSender;
use crate::observability::metrics::Metrics;
use crate::store::memory::InMemoryStore;

pub struct AppState {
    pub dispatch: DispatchCoordinator,
    pub store: Arc<InMemoryStore>,
    pub directory: Arc<TokenDirectory>,
    pub realtime: BroadcastRealtime,
    pub metrics: Metrics,
}

impl AppState {
    /// In-memory wiring with the logging push sink.
    pub fn new(settings: DispatchSettings, event_buffer_size: usize) -> Self {
        Self::with_push(settings, event_buffer_size, Arc::new(LogPushSender))
    }

    pub fn with_push(
        settings: DispatchSettings,
        event_buffer_size: usize,
        push: Arc<dyn PushSender>,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let directory = Arc::new(TokenDirectory::new());
        let realtime = BroadcastRealtime::new(event_buffer_size);
        let metrics = Metrics::new();

        let collaborators = Collaborators {
            rides: store.clone(),
            drivers: store.clone(),
            parties: store.clone(),
            verifier: directory.clone(),
            push,
            realtime: Arc::new(realtime.clone()),
        };

        Self {
            dispatch: DispatchCoordinator::new(collaborators, settings, metrics.clone()),
            store,
            directory,
            realtime,
            metrics,
        }
    }

    /// Binds the operator-supplied admin credential to a fresh admin actor.
    pub fn provision_admin(&self, token: &str) -> Actor {
        let admin = Actor::new(Uuid::new_v4(), Role::Admin);
        self.directory.register(token, admin);
        info!(admin_id = %admin.id, "admin credential provisioned");
        admin
    }
}
