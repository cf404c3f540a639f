use serde::{Deserialize, Serialize};

use crate::{
    domain::{Item, ItemId, UserId},
    error::ApiError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: UserId,
}

/// Events pushed over `/ws` for the `items/{user_id}` key space.
///
/// `prev_key` names the item preceding this one when the user's items are
/// ordered by `(exp_date, id)`; `None` means first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    ItemAdded {
        item: Item,
        #[serde(default)]
        prev_key: Option<ItemId>,
    },
    ItemChanged {
        item: Item,
        #[serde(default)]
        prev_key: Option<ItemId>,
    },
    ItemRemoved {
        item: Item,
    },
    ItemMoved {
        item: Item,
        #[serde(default)]
        prev_key: Option<ItemId>,
    },
    SnapshotComplete {
        item_count: usize,
    },
    Error(ApiError),
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::ItemAdded { .. } => "item_added",
            ServerEvent::ItemChanged { .. } => "item_changed",
            ServerEvent::ItemRemoved { .. } => "item_removed",
            ServerEvent::ItemMoved { .. } => "item_moved",
            ServerEvent::SnapshotComplete { .. } => "snapshot_complete",
            ServerEvent::Error(_) => "error",
        }
    }
}
