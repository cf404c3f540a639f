//! In-memory mirror of the `items/{user_id}` key space.
//!
//! Every handler validates before it mutates, so a refused event never leaves
//! the sequence half-updated. Indices reported to the observer refer to the
//! sequence as it was right after the point mutation, before the resort.

use shared::domain::{Item, ItemId};
use tracing::{debug, warn};

use crate::{error::CollectionError, sort::SortPolicy};

/// Row-level notifications for whatever renders the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListChange {
    InsertedAt(usize),
    UpdatedAt(usize),
    RemovedAt(usize),
    FullyReordered,
}

pub trait ItemListObserver {
    fn on_list_change(&mut self, change: ListChange);
}

impl ItemListObserver for Vec<ListChange> {
    fn on_list_change(&mut self, change: ListChange) {
        self.push(change);
    }
}

/// Observational only; event handling never depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Priming,
    Live,
}

#[derive(Debug, Clone, Default)]
pub struct SyncedItemCollection {
    items: Vec<Item>,
    phase: SyncPhase,
}

impl SyncedItemCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn position_of(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id.as_ref() == Some(id))
    }

    pub fn find(&self, id: &ItemId) -> Option<&Item> {
        self.position_of(id).map(|index| &self.items[index])
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Returns `true` only on the first call after priming.
    pub fn mark_live(&mut self) -> bool {
        let was_priming = self.phase == SyncPhase::Priming;
        self.phase = SyncPhase::Live;
        was_priming
    }

    /// Appends a newly observed item. A second add for a known id is refused
    /// rather than overwriting the entry.
    pub fn on_added(
        &mut self,
        item: Item,
        sort: SortPolicy,
        observer: &mut dyn ItemListObserver,
    ) -> Result<usize, CollectionError> {
        let id = require_id(&item, "added")?;
        if self.position_of(id).is_some() {
            return Err(CollectionError::DuplicateId(id.clone()));
        }

        self.items.push(item);
        let index = self.items.len() - 1;
        observer.on_list_change(ListChange::InsertedAt(index));
        self.resort(sort, observer);
        Ok(index)
    }

    /// Replaces every field of the entry with the same id, keeping its row.
    pub fn on_changed(
        &mut self,
        item: Item,
        sort: SortPolicy,
        observer: &mut dyn ItemListObserver,
    ) -> Result<usize, CollectionError> {
        let id = require_id(&item, "changed")?;
        let index = self
            .position_of(id)
            .ok_or_else(|| CollectionError::NotFound(id.clone()))?;

        self.items[index] = item;
        observer.on_list_change(ListChange::UpdatedAt(index));
        self.resort(sort, observer);
        Ok(index)
    }

    /// Deletes the first entry equal to `item` in every field.
    ///
    /// Matching is by value, not by id: an entry whose fields drifted from the
    /// removed value stays in place. `Ok(None)` means nothing matched.
    pub fn on_removed(
        &mut self,
        item: &Item,
        sort: SortPolicy,
        observer: &mut dyn ItemListObserver,
    ) -> Result<Option<usize>, CollectionError> {
        let id = require_id(item, "removed")?;
        let Some(index) = self.items.iter().position(|entry| entry == item) else {
            if let Some(stale) = self.position_of(id) {
                warn!(
                    item_id = %id,
                    index = stale,
                    "removal matched no entry by value although the id is present; local copy is stale"
                );
            } else {
                debug!(item_id = %id, "removal for unknown item ignored");
            }
            return Ok(None);
        };

        self.items.remove(index);
        observer.on_list_change(ListChange::RemovedAt(index));
        self.resort(sort, observer);
        Ok(Some(index))
    }

    /// The remote ordering key never drives local order.
    pub fn on_moved(&self, item: &Item, prev_key: Option<&ItemId>) -> Result<(), CollectionError> {
        let id = require_id(item, "moved")?;
        debug!(item_id = %id, prev_key = ?prev_key, "ignoring remote move");
        Ok(())
    }

    /// Reapplies `sort` and tells the observer to refresh every row.
    pub fn resort(&mut self, sort: SortPolicy, observer: &mut dyn ItemListObserver) -> bool {
        let moved = sort.apply(&mut self.items);
        observer.on_list_change(ListChange::FullyReordered);
        moved
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.phase = SyncPhase::Priming;
    }
}

fn require_id<'a>(item: &'a Item, event: &'static str) -> Result<&'a ItemId, CollectionError> {
    item.assigned_id()
        .ok_or(CollectionError::MissingId { event })
}

#[cfg(test)]
#[path = "tests/collection_tests.rs"]
mod tests;
