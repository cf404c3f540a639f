use super::*;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use shared::{error::ErrorCode, protocol::ServerEvent};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;

const USER: UserId = UserId(42);

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: i64,
}

#[derive(Clone)]
struct MockState {
    items: Vec<Item>,
    close_stream: bool,
}

fn flour() -> Item {
    Item::draft("Flour", 2, "2024-01-01", "A").with_id("1")
}

fn sugar() -> Item {
    Item::draft("Sugar", 5, "2023-06-01", "B").with_id("2")
}

async fn mock_login() -> Json<LoginResponse> {
    Json(LoginResponse { user_id: USER })
}

async fn mock_list(
    State(state): State<Arc<MockState>>,
    Query(q): Query<UserQuery>,
) -> Result<Json<Vec<Item>>, (StatusCode, Json<ApiError>)> {
    if q.user_id != USER.0 {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiError::new(ErrorCode::Unauthorized, "unknown user")),
        ));
    }
    Ok(Json(state.items.clone()))
}

async fn mock_create(Json(item): Json<Item>) -> (StatusCode, Json<ApiError>) {
    let message = if item.id.is_some() {
        "id must not be set"
    } else {
        "name must not be blank"
    };
    (StatusCode::BAD_REQUEST, Json(ApiError::validation(message)))
}

async fn mock_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<MockState>>,
    Query(q): Query<UserQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_items(socket, state, q.user_id))
}

async fn stream_items(mut socket: WebSocket, state: Arc<MockState>, user_id: i64) {
    if user_id != USER.0 {
        return;
    }
    let mut prev_key = None;
    let mut events = Vec::new();
    for item in &state.items {
        events.push(ServerEvent::ItemAdded {
            item: item.clone(),
            prev_key: prev_key.take(),
        });
        prev_key = item.id.clone();
    }
    events.push(ServerEvent::SnapshotComplete {
        item_count: state.items.len(),
    });

    for event in events {
        let text = serde_json::to_string(&event).expect("json");
        if socket.send(WsMessage::Text(text)).await.is_err() {
            return;
        }
    }
    if state.close_stream {
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    }
    while let Some(Ok(_)) = socket.recv().await {}
}

async fn spawn_mock_server(items: Vec<Item>, close_stream: bool) -> String {
    let state = Arc::new(MockState {
        items,
        close_stream,
    });
    let app = Router::new()
        .route("/login", post(mock_login))
        .route("/items", get(mock_list).post(mock_create))
        .route("/ws", get(mock_ws))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("listener");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn recv(rx: &mut mpsc::Receiver<SyncEvent>) -> Option<SyncEvent> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event before timeout")
}

#[tokio::test]
async fn login_scopes_item_requests_to_the_user() {
    let server_url = spawn_mock_server(vec![flour(), sugar()], true).await;
    let client = RealtimeClient::new();

    assert_eq!(client.login(&server_url, "alice").await.expect("login"), USER);
    assert_eq!(client.user_id().await, Some(USER));
    assert_eq!(client.list_items().await.expect("items"), vec![flour(), sugar()]);
    assert_eq!(client.fetch_items().await.expect("items").len(), 2);
}

#[tokio::test]
async fn service_errors_surface_as_api_exceptions() {
    let server_url = spawn_mock_server(Vec::new(), true).await;
    let client = RealtimeClient::new();
    client.login(&server_url, "alice").await.expect("login");

    let err = client
        .create_item(Item::draft(" ", 1, "2024-01-01", "A"))
        .await
        .expect_err("validation error");
    let api = err.downcast_ref::<ApiException>().expect("api exception");
    assert_eq!(api.code, ErrorCode::Validation);
    // The client strips ids before creating.
    assert_eq!(api.message, "name must not be blank");
}

#[tokio::test]
async fn requests_before_login_or_after_sign_out_fail() {
    let server_url = spawn_mock_server(Vec::new(), true).await;
    let client = RealtimeClient::new();

    let err = client.list_items().await.expect_err("not logged in");
    assert!(matches!(
        err.downcast_ref::<SubscriptionError>(),
        Some(SubscriptionError::NotLoggedIn(_))
    ));

    client.login(&server_url, "alice").await.expect("login");
    client.sign_out().await.expect("sign out");
    assert_eq!(client.user_id().await, None);
    assert!(client.list_items().await.is_err());
}

#[tokio::test]
async fn login_rejects_non_http_urls() {
    let client = RealtimeClient::new();
    let err = client
        .login("ftp://example.com", "alice")
        .await
        .expect_err("bad scheme");
    assert!(matches!(
        err.downcast_ref::<SubscriptionError>(),
        Some(SubscriptionError::UnsupportedScheme(_))
    ));
}

#[test]
fn endpoints_keep_base_path_and_switch_to_ws() {
    let base = parse_server_url("https://inventory.example.com/api/").expect("url");
    assert_eq!(
        endpoint(&base, &["items", "abc"]).as_str(),
        "https://inventory.example.com/api/items/abc"
    );
    assert_eq!(
        ws_endpoint(&base, USER).expect("ws").as_str(),
        "wss://inventory.example.com/api/ws?user_id=42"
    );

    let local = parse_server_url("http://127.0.0.1:8443").expect("url");
    assert_eq!(
        ws_endpoint(&local, USER).expect("ws").as_str(),
        "ws://127.0.0.1:8443/ws?user_id=42"
    );
}

#[tokio::test]
async fn subscription_delivers_snapshot_then_cancellation() {
    let server_url = spawn_mock_server(vec![sugar(), flour()], true).await;
    let client = RealtimeClient::new();
    client.login(&server_url, "alice").await.expect("login");

    let (tx, mut rx) = mpsc::channel(16);
    let _subscription = client.subscribe_items(tx).await.expect("subscribe");

    assert_eq!(
        recv(&mut rx).await,
        Some(SyncEvent::Added {
            item: sugar(),
            prev_key: None
        })
    );
    assert_eq!(
        recv(&mut rx).await,
        Some(SyncEvent::Added {
            item: flour(),
            prev_key: Some(ItemId::from("2"))
        })
    );
    assert_eq!(recv(&mut rx).await, Some(SyncEvent::SnapshotComplete));
    assert!(matches!(
        recv(&mut rx).await,
        Some(SyncEvent::Cancelled { .. })
    ));
    assert_eq!(recv(&mut rx).await, None);
}

#[tokio::test]
async fn dropping_the_subscription_stops_delivery() {
    let server_url = spawn_mock_server(vec![flour()], false).await;
    let client = RealtimeClient::new();
    client.login(&server_url, "alice").await.expect("login");

    let (tx, mut rx) = mpsc::channel(16);
    let subscription = client.subscribe_items(tx).await.expect("subscribe");
    assert!(matches!(recv(&mut rx).await, Some(SyncEvent::Added { .. })));
    assert_eq!(recv(&mut rx).await, Some(SyncEvent::SnapshotComplete));

    drop(subscription);
    assert_eq!(recv(&mut rx).await, None);
}

#[tokio::test]
async fn subscribing_before_login_fails() {
    let client = RealtimeClient::new();
    let (tx, _rx) = mpsc::channel(1);
    assert!(client.subscribe_items(tx).await.is_err());
}
