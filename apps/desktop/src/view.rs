//! Terminal rendering of the synchronized item list.

use std::io::{self, Write};

use client_core::{ItemListObserver, ListChange, SyncPhase, SyncedItemCollection};
use shared::domain::Item;

/// Buffers list notifications and redraws on `flush`.
///
/// Nothing is drawn while the collection is still priming; the first
/// redraw happens in `loading_finished`.
pub struct TerminalListView<W: Write> {
    out: W,
    pending: Vec<ListChange>,
}

impl<W: Write> ItemListObserver for TerminalListView<W> {
    fn on_list_change(&mut self, change: ListChange) {
        self.pending.push(change);
    }
}

impl<W: Write> TerminalListView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            pending: Vec::new(),
        }
    }

    pub fn loading_started(&mut self) -> io::Result<()> {
        writeln!(self.out, "loading items...")?;
        self.out.flush()
    }

    pub fn loading_finished(&mut self, collection: &SyncedItemCollection) -> io::Result<()> {
        self.pending.clear();
        writeln!(self.out, "loaded {} item(s); sorting enabled", collection.len())?;
        self.render(collection.items())
    }

    /// Returns whether anything was drawn.
    pub fn flush(&mut self, collection: &SyncedItemCollection) -> io::Result<bool> {
        if self.pending.is_empty() {
            return Ok(false);
        }
        let changes = std::mem::take(&mut self.pending);
        if collection.phase() == SyncPhase::Priming {
            return Ok(false);
        }

        for change in &changes {
            match change {
                ListChange::InsertedAt(index) => writeln!(self.out, "+ row {}", index + 1)?,
                ListChange::UpdatedAt(index) => writeln!(self.out, "~ row {}", index + 1)?,
                ListChange::RemovedAt(index) => writeln!(self.out, "- row {}", index + 1)?,
                ListChange::FullyReordered => {}
            }
        }
        if changes.contains(&ListChange::FullyReordered) {
            self.render(collection.items())?;
        } else {
            self.out.flush()?;
        }
        Ok(true)
    }

    pub fn render(&mut self, items: &[Item]) -> io::Result<()> {
        if items.is_empty() {
            writeln!(self.out, "(no items)")?;
        }
        for (row, item) in items.iter().enumerate() {
            writeln!(self.out, "{:>3}. {}", row + 1, format_row(item))?;
        }
        self.out.flush()
    }

    pub fn line(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        writeln!(self.out, "{}", text.as_ref())?;
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn format_row(item: &Item) -> String {
    format!(
        "{} | Amount: {} | {} | Box: {}",
        item.name, item.amount, item.exp_date, item.box_label
    )
}
