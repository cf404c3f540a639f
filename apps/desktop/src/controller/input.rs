//! Console line parsing for the interactive `watch` mode.

use shared::domain::{Item, SortDirection, SortField};
use thiserror::Error;

pub const HELP: &str = "\
commands:
  list                               show the item list
  sort <field> [asc|desc]            field: exp_date | name | box
  sort <asc|desc>                    change direction only
  add <name> <amount> <exp_date> <box>
  edit <row> key=value...            keys: name, amount, exp_date, box
  remove <row>
  expired                            run the expired-item check now
  quit                               sign out and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    List,
    Sort {
        field: Option<SortField>,
        direction: Option<SortDirection>,
    },
    Add(Item),
    /// `row` is 1-based, as displayed.
    Edit { row: usize, edits: ItemEdits },
    Remove { row: usize },
    CheckExpired,
    Quit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemEdits {
    pub name: Option<String>,
    pub amount: Option<i64>,
    pub exp_date: Option<String>,
    pub box_label: Option<String>,
}

impl ItemEdits {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, item: &Item) -> Item {
        let mut edited = item.clone();
        if let Some(name) = &self.name {
            edited.name = name.clone();
        }
        if let Some(amount) = self.amount {
            edited.amount = amount;
        }
        if let Some(exp_date) = &self.exp_date {
            edited.exp_date = exp_date.clone();
        }
        if let Some(box_label) = &self.box_label {
            edited.box_label = box_label.clone();
        }
        edited
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("unknown command '{0}'; type 'help'")]
    UnknownCommand(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("row must be a number starting at 1, got '{0}'")]
    InvalidRow(String),
    #[error("amount must be a non-negative whole number, got '{0}'")]
    InvalidAmount(String),
    #[error("unknown field '{0}'; expected name, amount, exp_date or box")]
    UnknownField(String),
    #[error(transparent)]
    Sort(#[from] shared::domain::ParseSortError),
}

/// `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, InputError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = tokens.split_first() else {
        return Ok(None);
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "help" | "?" => ConsoleCommand::Help,
        "list" | "ls" => ConsoleCommand::List,
        "sort" => parse_sort(args)?,
        "add" => parse_add(args)?,
        "edit" => parse_edit(args)?,
        "remove" | "rm" => match args {
            [row] => ConsoleCommand::Remove {
                row: parse_row(row)?,
            },
            _ => return Err(InputError::Usage("remove <row>")),
        },
        "expired" => ConsoleCommand::CheckExpired,
        "quit" | "exit" | "logout" => ConsoleCommand::Quit,
        other => return Err(InputError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_sort(args: &[&str]) -> Result<ConsoleCommand, InputError> {
    match args {
        [only] => {
            if let Ok(direction) = only.parse::<SortDirection>() {
                return Ok(ConsoleCommand::Sort {
                    field: None,
                    direction: Some(direction),
                });
            }
            Ok(ConsoleCommand::Sort {
                field: Some(only.parse()?),
                direction: None,
            })
        }
        [field, direction] => Ok(ConsoleCommand::Sort {
            field: Some(field.parse()?),
            direction: Some(direction.parse()?),
        }),
        _ => Err(InputError::Usage("sort <field> [asc|desc] | sort <asc|desc>")),
    }
}

fn parse_add(args: &[&str]) -> Result<ConsoleCommand, InputError> {
    const USAGE: &str = "add <name> <amount> <exp_date> <box>";
    // The name may span several words; the last three tokens are fixed.
    if args.len() < 4 {
        return Err(InputError::Usage(USAGE));
    }
    let (name, rest) = args.split_at(args.len() - 3);
    let [amount, exp_date, box_label] = rest else {
        return Err(InputError::Usage(USAGE));
    };
    Ok(ConsoleCommand::Add(Item::draft(
        name.join(" "),
        parse_amount(amount)?,
        *exp_date,
        *box_label,
    )))
}

fn parse_edit(args: &[&str]) -> Result<ConsoleCommand, InputError> {
    const USAGE: &str = "edit <row> key=value...";
    let Some((row, pairs)) = args.split_first() else {
        return Err(InputError::Usage(USAGE));
    };
    let row = parse_row(row)?;

    let mut edits = ItemEdits::default();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(InputError::Usage(USAGE));
        };
        match key.to_ascii_lowercase().as_str() {
            "name" => edits.name = Some(value.replace('_', " ")),
            "amount" => edits.amount = Some(parse_amount(value)?),
            "exp_date" | "exp" => edits.exp_date = Some(value.to_string()),
            "box" => edits.box_label = Some(value.to_string()),
            other => return Err(InputError::UnknownField(other.to_string())),
        }
    }
    if edits.is_empty() {
        return Err(InputError::Usage(USAGE));
    }
    Ok(ConsoleCommand::Edit { row, edits })
}

fn parse_row(raw: &str) -> Result<usize, InputError> {
    match raw.parse::<usize>() {
        Ok(row) if row >= 1 => Ok(row),
        _ => Err(InputError::InvalidRow(raw.to_string())),
    }
}

fn parse_amount(raw: &str) -> Result<i64, InputError> {
    match raw.parse::<i64>() {
        Ok(amount) if amount >= 0 => Ok(amount),
        _ => Err(InputError::InvalidAmount(raw.to_string())),
    }
}
