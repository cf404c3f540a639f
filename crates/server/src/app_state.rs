use server_api::ApiContext;
use shared::{domain::UserId, protocol::ServerEvent};
use tokio::sync::broadcast;

/// An event scoped to the `items/{user_id}` key space it belongs to.
#[derive(Debug, Clone)]
pub(crate) struct UserEvent {
    pub(crate) user_id: UserId,
    pub(crate) event: ServerEvent,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) events: broadcast::Sender<UserEvent>,
}

impl AppState {
    pub(crate) fn new(api: ApiContext, event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self { api, events }
    }

    /// Fan out to every open subscription. Having no subscriber is not an error.
    pub(crate) fn publish(&self, user_id: UserId, event: ServerEvent) {
        let _ = self.events.send(UserEvent { user_id, event });
    }
}
