//! Expiration date handling for the expired-item check.
//!
//! Sorting never goes through here; it compares `exp_date` as a plain string.

use chrono::NaiveDate;
use tracing::debug;

use crate::domain::Item;

const ACCEPTED_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"];

pub fn parse_exp_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    ACCEPTED_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// Items expire the day after their `exp_date`.
pub fn is_expired(item: &Item, today: NaiveDate) -> Option<bool> {
    parse_exp_date(&item.exp_date).map(|date| date < today)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiredSelection {
    pub expired: Vec<Item>,
    pub unparseable: usize,
}

pub fn select_expired<'a>(
    items: impl IntoIterator<Item = &'a Item>,
    today: NaiveDate,
) -> ExpiredSelection {
    let mut selection = ExpiredSelection::default();
    for item in items {
        match is_expired(item, today) {
            Some(true) => selection.expired.push(item.clone()),
            Some(false) => {}
            None => {
                debug!(
                    item_id = ?item.id,
                    exp_date = %item.exp_date,
                    "skipping item with unparseable expiration date"
                );
                selection.unparseable += 1;
            }
        }
    }
    selection
}
