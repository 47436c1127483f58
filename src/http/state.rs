use crate::session::ConversationSession;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The conversation this server controls
    pub session: Arc<ConversationSession>,
}

impl AppState {
    pub fn new(session: Arc<ConversationSession>) -> Self {
        Self { session }
    }
}
