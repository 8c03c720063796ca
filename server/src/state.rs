use std::sync::Arc;

use crate::auth::AuthService;
use crate::chat::CommunicationService;
use crate::hub::BroadcastHub;
use crate::registry::SessionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Authoritative user and session table
    pub registry: Arc<SessionRegistry>,
    /// Live subscriber channels
    pub hub: Arc<BroadcastHub>,
    pub auth: Arc<AuthService>,
    pub chat: Arc<CommunicationService>,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        admins: impl IntoIterator<Item = String>,
        subscriber_buffer: usize,
    ) -> Self {
        let hub = BroadcastHub::new();
        let auth = Arc::new(AuthService::new(registry.clone(), hub.clone(), admins));
        let chat = Arc::new(CommunicationService::new(
            registry.clone(),
            hub.clone(),
            subscriber_buffer,
        ));

        Self {
            registry,
            hub,
            auth,
            chat,
        }
    }
}
