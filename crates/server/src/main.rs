use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use server_api::{
    create_item, delete_item, list_items, login as api_login, snapshot_events, update_item,
    ApiContext,
};
use shared::{
    domain::{Item, ItemId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{LoginRequest, LoginResponse, ServerEvent},
};
use storage::Storage;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::{AppState, UserEvent};
use config::{load_settings, prepare_database_url};

type HttpResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState::new(ApiContext { storage }, settings.event_buffer);
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "item service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("item service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(login))
        .route("/items", get(http_list_items).post(http_create_item))
        .route(
            "/items/:item_id",
            put(http_update_item).delete(http_delete_item),
        )
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> HttpResult<&'static str> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| reject(ApiError::new(ErrorCode::Internal, e.to_string())))?;
    Ok("ok")
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> HttpResult<Json<LoginResponse>> {
    let user_id = api_login(&state.api, &req.username).await.map_err(reject)?;
    info!(user_id = user_id.0, "user logged in");
    Ok(Json(LoginResponse { user_id }))
}

async fn http_list_items(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
) -> HttpResult<Json<Vec<Item>>> {
    let items = list_items(&state.api, UserId(q.user_id))
        .await
        .map_err(reject)?;
    Ok(Json(items))
}

async fn http_create_item(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
    Json(item): Json<Item>,
) -> HttpResult<(StatusCode, Json<Item>)> {
    let user_id = UserId(q.user_id);
    let event = create_item(&state.api, user_id, item)
        .await
        .map_err(reject)?;
    let created = match &event {
        ServerEvent::ItemAdded { item, .. } => item.clone(),
        other => {
            return Err(reject(ApiError::new(
                ErrorCode::Internal,
                format!("unexpected {} event for item creation", other.kind()),
            )))
        }
    };
    state.publish(user_id, event);
    Ok((StatusCode::CREATED, Json(created)))
}

async fn http_update_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
    Query(q): Query<UserQuery>,
    Json(item): Json<Item>,
) -> HttpResult<Json<Item>> {
    let user_id = UserId(q.user_id);
    let events = update_item(&state.api, user_id, ItemId(item_id), item)
        .await
        .map_err(reject)?;
    let updated = events.iter().find_map(|event| match event {
        ServerEvent::ItemChanged { item, .. } => Some(item.clone()),
        _ => None,
    });
    for event in events {
        state.publish(user_id, event);
    }
    updated.map(Json).ok_or_else(|| {
        reject(ApiError::new(
            ErrorCode::Internal,
            "item update produced no change event",
        ))
    })
}

async fn http_delete_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
    Query(q): Query<UserQuery>,
) -> HttpResult<StatusCode> {
    let user_id = UserId(q.user_id);
    let event = delete_item(&state.api, user_id, ItemId(item_id))
        .await
        .map_err(reject)?;
    state.publish(user_id, event);
    Ok(StatusCode::NO_CONTENT)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket, UserId(q.user_id)))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket, user_id: UserId) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before reading the snapshot so nothing falls in between.
    let mut events_rx = state.events.subscribe();
    let snapshot = match snapshot_events(&state.api, user_id).await {
        Ok(events) => events,
        Err(err) => vec![ServerEvent::Error(err)],
    };
    info!(user_id = user_id.0, snapshot_len = snapshot.len(), "item subscription opened");

    let send_task = tokio::spawn(async move {
        for event in &snapshot {
            if send_event(&mut sender, event).await.is_err() {
                return;
            }
        }
        loop {
            match events_rx.recv().await {
                Ok(UserEvent { user_id: owner, event }) if owner == user_id => {
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(user_id = user_id.0, skipped, "item subscription lagged; closing");
                    let _ = send_event(
                        &mut sender,
                        &ServerEvent::Error(ApiError::new(
                            ErrorCode::Internal,
                            format!("event stream lagged by {skipped} events; resubscribe"),
                        )),
                    )
                    .await;
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    send_task.abort();
    info!(user_id = user_id.0, "item subscription closed");
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(v) => v,
        Err(err) => {
            warn!(kind = event.kind(), %err, "dropping unserializable event");
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    if err.code == ErrorCode::Internal {
        error!(message = %err.message, "item service internal error");
    }
    (status_for(err.code), Json(err))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
