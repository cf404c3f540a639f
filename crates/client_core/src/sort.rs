//! Display ordering for the synchronized item list.
//!
//! Keys are compared as plain strings, `exp_date` included. Ties keep their
//! input order in both directions so repeated resorts do not shuffle rows.

use shared::domain::{Item, SortDirection, SortField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SortPolicy {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortPolicy {
    pub const fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub fn with_field(self, field: SortField) -> Self {
        Self { field, ..self }
    }

    pub fn with_direction(self, direction: SortDirection) -> Self {
        Self { direction, ..self }
    }

    pub fn reorder(&self, items: &[Item]) -> Vec<usize> {
        reorder(items, self.field, self.direction)
    }

    /// Rearranges `items` into this policy's order. Returns whether anything moved.
    pub fn apply(&self, items: &mut Vec<Item>) -> bool {
        let ordering = self.reorder(items);
        if is_identity(&ordering) {
            return false;
        }
        let mut slots: Vec<Option<Item>> = items.drain(..).map(Some).collect();
        items.extend(ordering.into_iter().filter_map(|index| slots[index].take()));
        true
    }
}

pub fn sort_key(item: &Item, field: SortField) -> &str {
    match field {
        SortField::ExpDate => &item.exp_date,
        SortField::Name => &item.name,
        SortField::Box => &item.box_label,
    }
}

/// Permutation of input indices: `ordering[k]` is the index of the item shown at row `k`.
pub fn reorder(items: &[Item], field: SortField, direction: SortDirection) -> Vec<usize> {
    let mut ordering: Vec<usize> = (0..items.len()).collect();
    // `sort_by` is stable; descending flips the comparison, never the result.
    ordering.sort_by(|&a, &b| {
        let (ka, kb) = (sort_key(&items[a], field), sort_key(&items[b], field));
        match direction {
            SortDirection::Asc => ka.cmp(kb),
            SortDirection::Desc => kb.cmp(ka),
        }
    });
    ordering
}

fn is_identity(ordering: &[usize]) -> bool {
    ordering
        .iter()
        .enumerate()
        .all(|(row, &index)| row == index)
}
