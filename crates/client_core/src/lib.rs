use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Item, ItemId, UserId},
    error::{ApiError, ApiException},
    protocol::{LoginRequest, LoginResponse},
};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::connect_async;
use tracing::{info, warn};
use url::Url;

pub mod collection;
pub mod error;
pub mod expiry;
pub mod session;
pub mod sort;
pub mod sync;

pub use collection::{ItemListObserver, ListChange, SyncPhase, SyncedItemCollection};
pub use error::{CollectionError, SubscriptionError};
pub use expiry::{
    ExistingSchedulePolicy, ExpiryCheck, ExpiryNotifier, ExpiryReport, PeriodicScheduler,
    PeriodicTask, RemoteItemSource, DEFAULT_EXPIRY_INTERVAL, EXPIRED_ITEMS_TASK, MAX_PERIODIC_INTERVAL,
};
pub use session::{EventOutcome, InventorySession};
pub use sort::SortPolicy;
pub use sync::{Subscription, SyncEvent};

/// Remote item store operations used by the terminal client.
#[async_trait]
pub trait ClientHandle: Send + Sync {
    async fn login(&self, server_url: &str, username: &str) -> Result<UserId>;
    async fn sign_out(&self) -> Result<()>;
    async fn list_items(&self) -> Result<Vec<Item>>;
    async fn create_item(&self, item: Item) -> Result<Item>;
    async fn update_item(&self, item: Item) -> Result<Item>;
    async fn delete_item(&self, item_id: &ItemId) -> Result<()>;
    /// Streams the user's items into `sink`: one `Added` per stored item,
    /// `SnapshotComplete`, then live changes.
    async fn subscribe_items(&self, sink: mpsc::Sender<SyncEvent>) -> Result<Subscription>;
}

pub struct RealtimeClient {
    http: Client,
    inner: Mutex<RealtimeClientState>,
}

#[derive(Default)]
struct RealtimeClientState {
    server_url: Option<Url>,
    user_id: Option<UserId>,
}

impl Default for RealtimeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            inner: Mutex::new(RealtimeClientState::default()),
        }
    }

    pub async fn user_id(&self) -> Option<UserId> {
        self.inner.lock().await.user_id
    }

    async fn session(&self) -> Result<(Url, UserId), SubscriptionError> {
        let guard = self.inner.lock().await;
        let server_url = guard
            .server_url
            .clone()
            .ok_or(SubscriptionError::NotLoggedIn("missing server_url"))?;
        let user_id = guard
            .user_id
            .ok_or(SubscriptionError::NotLoggedIn("missing user_id"))?;
        Ok((server_url, user_id))
    }
}

#[async_trait]
impl ClientHandle for RealtimeClient {
    async fn login(&self, server_url: &str, username: &str) -> Result<UserId> {
        let base = parse_server_url(server_url)?;
        let res = self
            .http
            .post(endpoint(&base, &["login"]))
            .json(&LoginRequest {
                username: username.to_string(),
            })
            .send()
            .await
            .with_context(|| format!("failed to reach item service at {base}"))?;
        let body: LoginResponse = decode(res).await?;

        let mut guard = self.inner.lock().await;
        guard.server_url = Some(base);
        guard.user_id = Some(body.user_id);
        info!(user_id = body.user_id.0, username, "logged in");
        Ok(body.user_id)
    }

    async fn sign_out(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let previous = guard.user_id.take();
        guard.server_url = None;
        match previous {
            Some(user_id) => info!(user_id = user_id.0, "signed out"),
            None => warn!("sign out requested without an active login"),
        }
        Ok(())
    }

    async fn list_items(&self) -> Result<Vec<Item>> {
        let (base, user_id) = self.session().await?;
        let res = self
            .http
            .get(endpoint(&base, &["items"]))
            .query(&[("user_id", user_id.0)])
            .send()
            .await
            .context("failed to list items")?;
        decode(res).await
    }

    async fn create_item(&self, item: Item) -> Result<Item> {
        let (base, user_id) = self.session().await?;
        let res = self
            .http
            .post(endpoint(&base, &["items"]))
            .query(&[("user_id", user_id.0)])
            .json(&Item { id: None, ..item })
            .send()
            .await
            .context("failed to create item")?;
        decode(res).await
    }

    async fn update_item(&self, item: Item) -> Result<Item> {
        let (base, user_id) = self.session().await?;
        let item_id = item
            .assigned_id()
            .cloned()
            .ok_or_else(|| anyhow!("cannot update an item without an id"))?;
        let res = self
            .http
            .put(endpoint(&base, &["items", item_id.as_str()]))
            .query(&[("user_id", user_id.0)])
            .json(&item)
            .send()
            .await
            .with_context(|| format!("failed to update item {item_id}"))?;
        decode(res).await
    }

    async fn delete_item(&self, item_id: &ItemId) -> Result<()> {
        let (base, user_id) = self.session().await?;
        let res = self
            .http
            .delete(endpoint(&base, &["items", item_id.as_str()]))
            .query(&[("user_id", user_id.0)])
            .send()
            .await
            .with_context(|| format!("failed to delete item {item_id}"))?;
        if !res.status().is_success() {
            return Err(error_from_response(res).await);
        }
        Ok(())
    }

    async fn subscribe_items(&self, sink: mpsc::Sender<SyncEvent>) -> Result<Subscription> {
        let (base, user_id) = self.session().await?;
        let ws_url = ws_endpoint(&base, user_id)?;
        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|source| SubscriptionError::Connect {
                url: ws_url.to_string(),
                source,
            })?;
        // Nothing is sent upstream; the write half is dropped.
        let (_, ws_reader) = ws_stream.split();

        let task = tokio::spawn(sync::forward_events(ws_reader, sink));
        info!(user_id = user_id.0, url = %ws_url, "item subscription opened");
        Ok(Subscription::new(user_id, task))
    }
}

#[async_trait]
impl RemoteItemSource for RealtimeClient {
    async fn fetch_items(&self) -> Result<Vec<Item>> {
        self.list_items().await
    }
}

fn parse_server_url(server_url: &str) -> Result<Url, SubscriptionError> {
    let url = Url::parse(server_url.trim_end_matches('/')).map_err(|source| {
        SubscriptionError::InvalidUrl {
            url: server_url.to_string(),
            source,
        }
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(SubscriptionError::UnsupportedScheme(server_url.to_string())),
    }
}

fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn ws_endpoint(base: &Url, user_id: UserId) -> Result<Url, SubscriptionError> {
    let mut url = endpoint(base, &["ws"]);
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| SubscriptionError::UnsupportedScheme(base.to_string()))?;
    url.query_pairs_mut()
        .append_pair("user_id", &user_id.0.to_string());
    Ok(url)
}

async fn decode<T: DeserializeOwned>(res: Response) -> Result<T> {
    if !res.status().is_success() {
        return Err(error_from_response(res).await);
    }
    res.json::<T>()
        .await
        .context("failed to decode item service response")
}

/// Surfaces the service's `ApiError` body as an `ApiException` when present.
async fn error_from_response(res: Response) -> anyhow::Error {
    let status = res.status();
    match res.json::<ApiError>().await {
        Ok(api_error) => ApiException::from(api_error).into(),
        Err(_) => anyhow!("item service returned {status}"),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
