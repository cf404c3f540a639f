//! Backend-to-UI events and error modeling for the terminal client.

use client_core::{SubscriptionError, SyncEvent};
use shared::{
    domain::{Item, ItemId, UserId},
    error::{ApiException, ErrorCode},
};

#[derive(Debug)]
pub enum UiEvent {
    Info(String),
    LoggedIn { user_id: UserId, username: String },
    Sync(SyncEvent),
    ItemSaved(Item),
    ItemDeleted(ItemId),
    ExpiredItems(Vec<Item>),
    Error(UiError),
    SignedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Auth,
    Transport,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    Login,
    Subscribe,
    SaveItem,
    DeleteItem,
    ExpiryCheck,
    General,
}

pub fn classify_login_failure(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    if lower.contains("failed to reach")
        || lower.contains("connection refused")
        || lower.contains("dns")
        || lower.contains("timed out")
    {
        "Item service unreachable; check --server-url and network, then retry.".to_string()
    } else {
        format!("Login/API error: {message}")
    }
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    /// Classifies by the typed error in the chain when there is one, by text otherwise.
    pub fn from_error(context: UiErrorContext, err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        let typed = err.chain().find_map(|cause| {
            if let Some(api) = cause.downcast_ref::<ApiException>() {
                return Some(match api.code {
                    ErrorCode::Unauthorized | ErrorCode::Forbidden => UiErrorCategory::Auth,
                    ErrorCode::Validation | ErrorCode::NotFound => UiErrorCategory::Validation,
                    ErrorCode::Internal => UiErrorCategory::Unknown,
                });
            }
            cause.downcast_ref::<SubscriptionError>().map(|sub| match sub {
                SubscriptionError::NotLoggedIn(_) => UiErrorCategory::Auth,
                SubscriptionError::UnsupportedScheme(_) | SubscriptionError::InvalidUrl { .. } => {
                    UiErrorCategory::Validation
                }
                SubscriptionError::Connect { .. } => UiErrorCategory::Transport,
            })
        });

        match typed {
            Some(category) => Self {
                category,
                context,
                message,
            },
            None => Self::from_message(context, message),
        }
    }

    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("401")
            || message_lower.contains("403")
            || message_lower.contains("unauthorized")
            || message_lower.contains("forbidden")
            || message_lower.contains("not logged in")
        {
            UiErrorCategory::Auth
        } else if message_lower.contains("invalid")
            || message_lower.contains("missing")
            || message_lower.contains("malformed")
            || message_lower.contains("must")
        {
            UiErrorCategory::Validation
        } else if message_lower.contains("timeout")
            || message_lower.contains("timed out")
            || message_lower.contains("connect")
            || message_lower.contains("network")
            || message_lower.contains("unreachable")
            || message_lower.contains("unavailable")
            || message_lower.contains("disconnect")
        {
            UiErrorCategory::Transport
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == UiErrorCategory::Auth
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
