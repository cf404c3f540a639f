use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);

/// Key assigned by the item store on first persist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One warehouse stock record.
///
/// Equality compares every field including `id`; removal events rely on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    pub name: String,
    pub amount: i64,
    pub exp_date: String,
    #[serde(rename = "box")]
    pub box_label: String,
}

impl Item {
    /// An item that has not been persisted yet.
    pub fn draft(
        name: impl Into<String>,
        amount: i64,
        exp_date: impl Into<String>,
        box_label: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            amount,
            exp_date: exp_date.into(),
            box_label: box_label.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<ItemId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The assigned id, ignoring blank placeholders.
    pub fn assigned_id(&self) -> Option<&ItemId> {
        self.id.as_ref().filter(|id| !id.is_blank())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    ExpDate,
    Name,
    Box,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseSortError {
    kind: &'static str,
    value: String,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::ExpDate => "exp_date",
            SortField::Name => "name",
            SortField::Box => "box",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = ParseSortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "exp_date" | "expdate" | "expiration" => Ok(SortField::ExpDate),
            "name" => Ok(SortField::Name),
            "box" => Ok(SortField::Box),
            _ => Err(ParseSortError {
                kind: "sort field",
                value: s.to_string(),
            }),
        }
    }
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDirection {
    type Err = ParseSortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            _ => Err(ParseSortError {
                kind: "sort direction",
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_serializes_box_under_its_wire_name() {
        let item = Item::draft("Flour", 3, "2024-01-01", "A").with_id("1");
        let json = serde_json::to_value(&item).expect("json");
        assert_eq!(json["box"], "A");
        assert_eq!(json["id"], "1");
        assert!(json.get("box_label").is_none());
    }

    #[test]
    fn draft_omits_id_on_the_wire() {
        let json = serde_json::to_value(Item::draft("Salt", 1, "2025-02-02", "C")).expect("json");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn blank_id_is_not_assigned() {
        let item = Item::draft("Salt", 1, "2025-02-02", "C").with_id("  ");
        assert!(item.assigned_id().is_none());
    }

    #[test]
    fn parses_sort_preferences() {
        assert_eq!("exp-date".parse::<SortField>(), Ok(SortField::ExpDate));
        assert_eq!("BOX".parse::<SortField>(), Ok(SortField::Box));
        assert_eq!("descending".parse::<SortDirection>(), Ok(SortDirection::Desc));
        assert!("weight".parse::<SortField>().is_err());
    }
}
