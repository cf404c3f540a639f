//! Per-login state: the synchronized collection plus the active sort preference.
//!
//! Created after login and dropped at sign-out, so nothing survives from one
//! user to the next.

use shared::domain::{SortDirection, SortField, UserId};
use tracing::{debug, error, info, warn};

use crate::{
    collection::{ItemListObserver, SyncPhase, SyncedItemCollection},
    error::CollectionError,
    sort::SortPolicy,
    sync::SyncEvent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    Ignored,
    Rejected(CollectionError),
    /// First snapshot-complete signal of this session.
    PrimingComplete,
    Cancelled(String),
}

#[derive(Debug)]
pub struct InventorySession {
    user_id: UserId,
    collection: SyncedItemCollection,
    sort: SortPolicy,
}

impl InventorySession {
    pub fn new(user_id: UserId, sort: SortPolicy) -> Self {
        info!(
            user_id = user_id.0,
            sort_field = %sort.field,
            sort_direction = %sort.direction,
            "inventory session started"
        );
        Self {
            user_id,
            collection: SyncedItemCollection::new(),
            sort,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn collection(&self) -> &SyncedItemCollection {
        &self.collection
    }

    pub fn sort(&self) -> SortPolicy {
        self.sort
    }

    pub fn phase(&self) -> SyncPhase {
        self.collection.phase()
    }

    /// Applies one remote event. Refused events are logged and leave the
    /// collection untouched; they never stop later events from applying.
    pub fn handle(&mut self, event: SyncEvent, observer: &mut dyn ItemListObserver) -> EventOutcome {
        let kind = event.kind();
        let result = match event {
            SyncEvent::Added { item, .. } => self
                .collection
                .on_added(item, self.sort, observer)
                .map(|_| EventOutcome::Applied),
            SyncEvent::Changed { item, .. } => self
                .collection
                .on_changed(item, self.sort, observer)
                .map(|_| EventOutcome::Applied),
            SyncEvent::Removed { item } => self
                .collection
                .on_removed(&item, self.sort, observer)
                .map(|removed| match removed {
                    Some(_) => EventOutcome::Applied,
                    None => EventOutcome::Ignored,
                }),
            SyncEvent::Moved { item, prev_key } => self
                .collection
                .on_moved(&item, prev_key.as_ref())
                .map(|_| EventOutcome::Ignored),
            SyncEvent::SnapshotComplete => {
                if self.collection.mark_live() {
                    info!(
                        user_id = self.user_id.0,
                        item_count = self.collection.len(),
                        "initial item snapshot loaded"
                    );
                    Ok(EventOutcome::PrimingComplete)
                } else {
                    Ok(EventOutcome::Ignored)
                }
            }
            SyncEvent::Cancelled { reason } => {
                warn!(user_id = self.user_id.0, %reason, "item subscription cancelled");
                Ok(EventOutcome::Cancelled(reason))
            }
        };

        result.unwrap_or_else(|err| {
            match &err {
                CollectionError::NotFound(id) => {
                    warn!(user_id = self.user_id.0, item_id = %id, kind, "event for unknown item ignored; delivery out of order")
                }
                CollectionError::DuplicateId(id) => {
                    error!(user_id = self.user_id.0, item_id = %id, kind, "duplicate add delivered; keeping existing entry")
                }
                CollectionError::MissingId { .. } => {
                    error!(user_id = self.user_id.0, kind, %err, "event rejected")
                }
            }
            EventOutcome::Rejected(err)
        })
    }

    pub fn set_sort_field(&mut self, field: SortField, observer: &mut dyn ItemListObserver) {
        self.set_sort_policy(self.sort.with_field(field), observer);
    }

    pub fn set_sort_direction(&mut self, direction: SortDirection, observer: &mut dyn ItemListObserver) {
        self.set_sort_policy(self.sort.with_direction(direction), observer);
    }

    pub fn set_sort_policy(&mut self, sort: SortPolicy, observer: &mut dyn ItemListObserver) {
        self.sort = sort;
        let moved = self.collection.resort(sort, observer);
        debug!(
            sort_field = %sort.field,
            sort_direction = %sort.direction,
            moved,
            "sort preference changed"
        );
    }

    pub fn teardown(mut self) {
        let dropped = self.collection.len();
        self.collection.clear();
        info!(user_id = self.user_id.0, dropped, "inventory session closed");
    }
}
