use std::{collections::HashMap, fs, time::Duration};

use client_core::{SortPolicy, DEFAULT_EXPIRY_INTERVAL};
use shared::domain::{SortDirection, SortField};
use tracing::warn;

pub const SETTINGS_FILE: &str = "warehouse.toml";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;
const MAX_EXPIRY_INTERVAL_DAYS: u64 = 3650;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub username: Option<String>,
    pub sort: SortPolicy,
    pub expiry_interval: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8443".into(),
            username: None,
            sort: SortPolicy::default(),
            expiry_interval: DEFAULT_EXPIRY_INTERVAL,
        }
    }
}

pub fn load_settings() -> ClientSettings {
    let file_contents = fs::read_to_string(SETTINGS_FILE).ok();
    load_settings_from(file_contents.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then the TOML file, then the environment. `APP__` names win over
/// the `WAREHOUSE_` ones. Command line flags are applied by the caller.
pub fn load_settings_from(
    file_contents: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    let mut raw: HashMap<&'static str, String> = HashMap::new();

    if let Some(contents) = file_contents {
        match toml::from_str::<HashMap<String, toml::Value>>(contents) {
            Ok(file_cfg) => {
                for key in KEYS {
                    match file_cfg.get(key) {
                        Some(toml::Value::String(v)) => {
                            raw.insert(key, v.clone());
                        }
                        Some(toml::Value::Integer(v)) => {
                            raw.insert(key, v.to_string());
                        }
                        Some(other) => {
                            warn!(file = SETTINGS_FILE, key, value = %other, "ignoring setting with unexpected type")
                        }
                        None => {}
                    }
                }
            }
            Err(err) => warn!(file = SETTINGS_FILE, %err, "ignoring unreadable settings file"),
        }
    }

    for key in KEYS {
        let upper = key.to_ascii_uppercase();
        for env_key in [format!("WAREHOUSE_{upper}"), format!("APP__{upper}")] {
            if let Some(v) = env(&env_key) {
                raw.insert(key, v);
            }
        }
    }

    let mut settings = ClientSettings::default();
    if let Some(v) = raw.remove("server_url") {
        settings.server_url = v;
    }
    settings.username = raw.remove("username").filter(|v| !v.trim().is_empty());
    if let Some(v) = raw.remove("sort_field") {
        match v.parse::<SortField>() {
            Ok(field) => settings.sort.field = field,
            Err(err) => warn!(%err, "keeping default sort field"),
        }
    }
    if let Some(v) = raw.remove("sort_direction") {
        match v.parse::<SortDirection>() {
            Ok(direction) => settings.sort.direction = direction,
            Err(err) => warn!(%err, "keeping default sort direction"),
        }
    }
    if let Some(v) = raw.remove("expiry_interval_days") {
        match v.trim().parse::<u64>().ok().and_then(expiry_interval_from_days) {
            Some(interval) => settings.expiry_interval = interval,
            None => warn!(
                value = %v,
                max = MAX_EXPIRY_INTERVAL_DAYS,
                "expiry_interval_days must be a whole number between 1 and max; keeping default"
            ),
        }
    }

    settings
}

fn expiry_interval_from_days(days: u64) -> Option<Duration> {
    if days == 0 || days > MAX_EXPIRY_INTERVAL_DAYS {
        return None;
    }
    days.checked_mul(SECONDS_PER_DAY).map(Duration::from_secs)
}

const KEYS: [&str; 5] = [
    "server_url",
    "username",
    "sort_field",
    "sort_direction",
    "expiry_interval_days",
];

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
