use shared::domain::ItemId;
use thiserror::Error;

/// Why a sync event was refused. The collection is left untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("{event} event carries no item id")]
    MissingId { event: &'static str },
    #[error("item {0} is already present")]
    DuplicateId(ItemId),
    #[error("item {0} not found")]
    NotFound(ItemId),
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("not logged in: {0}")]
    NotLoggedIn(&'static str),
    #[error("server_url must start with http:// or https://, got '{0}'")]
    UnsupportedScheme(String),
    #[error("invalid server url '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("failed to connect item stream {url}: {source}")]
    Connect {
        url: String,
        source: tokio_tungstenite::tungstenite::Error,
    },
}
