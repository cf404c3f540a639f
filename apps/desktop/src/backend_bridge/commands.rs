//! Backend commands queued from the UI thread to the backend worker.

use shared::domain::{Item, ItemId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCommand {
    CreateItem { item: Item },
    UpdateItem { item: Item },
    DeleteItem { item_id: ItemId },
    /// Run the expired-item check now, outside its schedule.
    CheckExpired,
    SignOut,
    Shutdown,
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BackendCommand::CreateItem { .. } => "create_item",
            BackendCommand::UpdateItem { .. } => "update_item",
            BackendCommand::DeleteItem { .. } => "delete_item",
            BackendCommand::CheckExpired => "check_expired",
            BackendCommand::SignOut => "sign_out",
            BackendCommand::Shutdown => "shutdown",
        }
    }
}
