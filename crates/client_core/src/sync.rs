use futures::{Stream, StreamExt};
use shared::{
    domain::{Item, ItemId, UserId},
    protocol::ServerEvent,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

/// A remote change, ready to be applied on the processing context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Added { item: Item, prev_key: Option<ItemId> },
    Changed { item: Item, prev_key: Option<ItemId> },
    Removed { item: Item },
    Moved { item: Item, prev_key: Option<ItemId> },
    SnapshotComplete,
    /// The stream ended. No further events follow.
    Cancelled { reason: String },
}

impl SyncEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::Added { .. } => "added",
            SyncEvent::Changed { .. } => "changed",
            SyncEvent::Removed { .. } => "removed",
            SyncEvent::Moved { .. } => "moved",
            SyncEvent::SnapshotComplete => "snapshot_complete",
            SyncEvent::Cancelled { .. } => "cancelled",
        }
    }
}

impl From<ServerEvent> for SyncEvent {
    fn from(event: ServerEvent) -> Self {
        match event {
            ServerEvent::ItemAdded { item, prev_key } => SyncEvent::Added { item, prev_key },
            ServerEvent::ItemChanged { item, prev_key } => SyncEvent::Changed { item, prev_key },
            ServerEvent::ItemRemoved { item } => SyncEvent::Removed { item },
            ServerEvent::ItemMoved { item, prev_key } => SyncEvent::Moved { item, prev_key },
            ServerEvent::SnapshotComplete { .. } => SyncEvent::SnapshotComplete,
            ServerEvent::Error(err) => SyncEvent::Cancelled {
                reason: format!("{:?}: {}", err.code, err.message),
            },
        }
    }
}

/// Live item stream. Dropping it stops delivery.
#[derive(Debug)]
pub struct Subscription {
    user_id: UserId,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(user_id: UserId, task: JoinHandle<()>) -> Self {
        Self {
            user_id,
            task: Some(task),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!(user_id = self.user_id.0, "item subscription cancelled");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Pumps websocket frames into `sink` until the stream ends or the receiver
/// goes away. A terminal `Cancelled` is sent unless the receiver is gone.
pub(crate) async fn forward_events<S>(mut frames: S, sink: mpsc::Sender<SyncEvent>)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let reason = loop {
        let Some(frame) = frames.next().await else {
            break "item stream ended".to_string();
        };
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                break frame
                    .map(|f| format!("server closed item stream: {}", f.reason))
                    .unwrap_or_else(|| "server closed item stream".to_string());
            }
            Ok(_) => continue,
            Err(err) => break format!("item stream receive failed: {err}"),
        };

        let event = match serde_json::from_str::<ServerEvent>(&text) {
            Ok(event) => event,
            Err(err) => {
                warn!(%err, "skipping malformed server event");
                continue;
            }
        };
        if let ServerEvent::Error(err) = &event {
            warn!(code = ?err.code, message = %err.message, "server reported item stream error");
        }
        let terminal = matches!(event, ServerEvent::Error(_));
        let event = SyncEvent::from(event);
        debug!(kind = event.kind(), "forwarding item event");
        if sink.send(event).await.is_err() {
            debug!("item event receiver dropped; stopping reader");
            return;
        }
        if terminal {
            return;
        }
    };

    info!(%reason, "item stream closed");
    let _ = sink.send(SyncEvent::Cancelled { reason }).await;
}
