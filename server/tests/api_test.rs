//! Integration tests for the HTTP API and the WebSocket event stream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chatroom_server::registry::{JsonUserStore, RegistrySettings, SessionRegistry};
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type WsRead = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

struct TestServer {
    base_url: String,
    addr: SocketAddr,
    client: reqwest::Client,
    _data_dir: tempfile::TempDir,
}

/// Helper: start the server on a random port, persisting to a temp dir.
/// `admin` is promoted to admin when it registers.
async fn start_test_server(max_clients: usize, server_password: Option<&str>) -> TestServer {
    let data_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = Arc::new(JsonUserStore::new(data_dir.path().join("users-data.json")));
    let registry = SessionRegistry::load(
        RegistrySettings {
            max_clients,
            server_password: server_password.map(str::to_string),
        },
        store,
    )
    .expect("Failed to load registry");

    let state = chatroom_server::state::AppState::new(
        Arc::new(registry),
        vec!["admin".to_string()],
        64,
    );
    let app = chatroom_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        addr,
        client: reqwest::Client::new(),
        _data_dir: data_dir,
    }
}

impl TestServer {
    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (u16, Value) {
        let mut req = self.client.post(format!("{}{}", self.base_url, path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str, token: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn register(&self, username: &str, password: &str) {
        let (status, body) = self
            .post(
                "/api/register",
                None,
                json!({"username": username, "password": password}),
            )
            .await;
        assert_eq!(status, 201, "Registration failed for {}: {}", username, body);
        assert_eq!(body["status"], "OK");
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .post(
                "/api/login",
                None,
                json!({"username": username, "password": password}),
            )
            .await;
        assert_eq!(status, 200, "Login failed for {}: {}", username, body);
        body["token"].as_str().unwrap().to_string()
    }

    async fn connect_ws(&self, token: &str) -> WsRead {
        let ws_url = format!("ws://{}/ws?token={}", self.addr, token);
        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .expect("Failed to connect to WebSocket");
        let (_write, read) = ws_stream.split();
        read
    }
}

/// Next text frame as JSON. Panics on timeout or on anything but text.
async fn next_json(read: &mut WsRead) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), read.next())
            .await
            .expect("Timed out waiting for WebSocket frame")
            .expect("WebSocket stream ended")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Expected text frame, got {:?}", other),
        }
    }
}

/// Wait for a close frame and return its code.
async fn expect_close(read: &mut WsRead) -> u16 {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), read.next())
            .await
            .expect("Timed out waiting for close frame");
        match msg {
            Some(Ok(Message::Close(Some(frame)))) => return u16::from(frame.code),
            Some(Ok(Message::Text(_))) | Some(Ok(Message::Ping(_))) => continue,
            other => panic!("Expected close frame, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_register_login_send_logout_flow() {
    let server = start_test_server(10, None).await;
    server.register("alice", "pw").await;

    let token = server.login("alice", "pw").await;
    assert_eq!(token.len(), 64);

    let (status, body) = server
        .post("/api/messages", Some(&token), json!({"text": "hello"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "OK");

    let (status, body) = server.get("/api/users", &token).await;
    assert_eq!(status, 200);
    assert_eq!(body["users"], json!(["alice"]));
    assert_eq!(body["max_clients"], 10);

    let (status, _) = server.post("/api/logout", Some(&token), json!({})).await;
    assert_eq!(status, 200);

    // The old token is dead everywhere
    let (status, body) = server
        .post("/api/messages", Some(&token), json!({"text": "ghost"}))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["status"], "INVALID_TOKEN");

    let (status, body) = server.post("/api/logout", Some(&token), json!({})).await;
    assert_eq!(status, 401);
    assert_eq!(body["status"], "INVALID_TOKEN");

    // And a new login issues a different one
    let again = server.login("alice", "pw").await;
    assert_ne!(again, token);
}

#[tokio::test]
async fn test_structured_error_statuses() {
    let server = start_test_server(1, None).await;
    server.register("alice", "pw").await;
    server.register("bob", "pw").await;

    let cases = [
        ("/api/register", json!({"username": "alice", "password": "x"}), 409, "USERNAME_TAKEN"),
        ("/api/register", json!({"username": "", "password": "x"}), 400, "INVALID_USERNAME"),
        ("/api/register", json!({"username": "a b", "password": "x"}), 400, "INVALID_USERNAME"),
        ("/api/login", json!({"username": "nobody", "password": "pw"}), 404, "UNKNOWN_USER"),
        ("/api/login", json!({"username": "alice", "password": "nope"}), 401, "INVALID_CREDENTIALS"),
    ];
    for (path, body, expected_status, expected) in cases {
        let (status, resp) = server.post(path, None, body.clone()).await;
        assert_eq!(status, expected_status, "{} {}", path, body);
        assert_eq!(resp["status"], expected, "{} {}", path, body);
        assert!(resp["message"].is_string());
    }

    server.login("alice", "pw").await;

    let (status, body) = server
        .post("/api/login", None, json!({"username": "alice", "password": "pw"}))
        .await;
    // Capacity is checked first: with one slot taken, even alice sees SERVER_FULL
    assert_eq!(status, 503);
    assert_eq!(body["status"], "SERVER_FULL");

    let (status, body) = server
        .post("/api/login", None, json!({"username": "bob", "password": "pw"}))
        .await;
    assert_eq!(status, 503);
    assert_eq!(body["status"], "SERVER_FULL");

    // Missing and malformed bearer tokens
    let (status, body) = server
        .post("/api/messages", None, json!({"text": "hi"}))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["status"], "INVALID_TOKEN");

    let (status, _) = server.get("/api/users", "garbage").await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_server_password() {
    let server = start_test_server(10, Some("letmein")).await;
    server.register("alice", "pw").await;

    let (status, body) = server
        .post("/api/login", None, json!({"username": "alice", "password": "pw"}))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["status"], "INVALID_CREDENTIALS");

    let (status, body) = server
        .post(
            "/api/login",
            None,
            json!({"username": "alice", "password": "pw", "server_password": "letmein"}),
        )
        .await;
    assert_eq!(status, 200);
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn test_admin_routes() {
    let server = start_test_server(10, None).await;
    server.register("admin", "root-pw").await;
    server.register("bob", "pw").await;

    let admin = server.login("admin", "root-pw").await;
    let bob = server.login("bob", "pw").await;

    // Non-admins are refused
    let (status, body) = server.get("/api/admin/users", &bob).await;
    assert_eq!(status, 403);
    assert_eq!(body["status"], "FORBIDDEN");

    let (status, body) = server.get("/api/admin/users", &admin).await;
    assert_eq!(status, 200);
    assert_eq!(body["connected"], 2);
    assert_eq!(body["admins"], 1);
    let users = body["users"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["username"], "admin");
    assert_eq!(users[0]["admin"], true);
    for user in users {
        assert!(user.get("passwordHash").is_none());
        assert!(user.get("password_hash").is_none());
        assert!(user.get("token").is_none());
    }

    // Ban bob: his session ends and he cannot log back in
    let (status, _) = server
        .post("/api/admin/ban", Some(&admin), json!({"username": "bob"}))
        .await;
    assert_eq!(status, 200);

    let (status, _) = server
        .post("/api/messages", Some(&bob), json!({"text": "hi"}))
        .await;
    assert_eq!(status, 401);

    let (status, body) = server
        .post("/api/login", None, json!({"username": "bob", "password": "pw"}))
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["status"], "USER_BANNED");

    let (status, _) = server
        .post("/api/admin/unban", Some(&admin), json!({"username": "bob"}))
        .await;
    assert_eq!(status, 200);
    let bob = server.login("bob", "pw").await;

    // Grant, then bob can see the admin view
    let (status, _) = server
        .post("/api/admin/grant", Some(&admin), json!({"username": "bob"}))
        .await;
    assert_eq!(status, 200);
    let (status, _) = server.get("/api/admin/users", &bob).await;
    assert_eq!(status, 200);

    // Admins cannot revoke or ban themselves
    let (status, _) = server
        .post("/api/admin/revoke", Some(&admin), json!({"username": "admin"}))
        .await;
    assert_eq!(status, 403);

    let (status, _) = server
        .post("/api/admin/revoke", Some(&admin), json!({"username": "bob"}))
        .await;
    assert_eq!(status, 200);

    // Unknown targets
    let (status, body) = server
        .post("/api/admin/ban", Some(&admin), json!({"username": "nobody"}))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["status"], "UNKNOWN_USER");

    // Removal closes the session and frees the name
    let (status, _) = server
        .post("/api/admin/remove", Some(&admin), json!({"username": "bob"}))
        .await;
    assert_eq!(status, 200);
    let (status, _) = server.get("/api/users", &bob).await;
    assert_eq!(status, 401);
    server.register("bob", "new-pw").await;
}

#[tokio::test]
async fn test_ws_receives_ack_then_events() {
    let server = start_test_server(10, None).await;
    server.register("alice", "pw").await;
    server.register("bob", "pw").await;

    let alice = server.login("alice", "pw").await;
    let mut alice_ws = server.connect_ws(&alice).await;
    assert_eq!(next_json(&mut alice_ws).await, json!({"type": "subscribed"}));

    let bob = server.login("bob", "pw").await;
    assert_eq!(
        next_json(&mut alice_ws).await,
        json!({"type": "user_connected", "username": "bob"})
    );

    let (status, _) = server
        .post("/api/messages", Some(&bob), json!({"text": "hi alice"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(
        next_json(&mut alice_ws).await,
        json!({"type": "chat_message", "username": "bob", "text": "hi alice"})
    );

    server.post("/api/logout", Some(&bob), json!({})).await;
    assert_eq!(
        next_json(&mut alice_ws).await,
        json!({"type": "user_disconnected", "username": "bob"})
    );
}

#[tokio::test]
async fn test_ws_rejects_invalid_token() {
    let server = start_test_server(10, None).await;

    let mut ws = server.connect_ws("not-a-token").await;
    assert_eq!(expect_close(&mut ws).await, 4002);
}

#[tokio::test]
async fn test_ws_closed_on_logout() {
    let server = start_test_server(10, None).await;
    server.register("alice", "pw").await;

    let alice = server.login("alice", "pw").await;
    let mut ws = server.connect_ws(&alice).await;
    assert_eq!(next_json(&mut ws).await, json!({"type": "subscribed"}));

    server.post("/api/logout", Some(&alice), json!({})).await;
    assert_eq!(expect_close(&mut ws).await, 4003);
}

#[tokio::test]
async fn test_health_check() {
    let server = start_test_server(10, None).await;
    let resp = server
        .client
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}
