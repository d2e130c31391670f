#![cfg(feature = "http")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! HTTP tests against a minimal in-process server.
//!
//! The server answers from a fixed route table and records every request,
//! so the tests can check both what `HttpSessionApi` sends and how it
//! interprets the replies. The last test drives a full `EventStreamClient`
//! over SSE against the same server.

mod common;

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use vibechess_client::http::{HttpConfig, HttpSessionApi};
use vibechess_client::{
    AudioCoordinator, ClientError, Color, ConnectionStatus, EventStreamClient, GameStatus,
    SessionApi, SessionEvent, SseConnector, StreamConfig,
};

use common::{game_over_json, move_json, wait_for};

// ════════════════════════════════════════════════════════════════════
// Test server
// ════════════════════════════════════════════════════════════════════

#[derive(Clone)]
struct Route {
    method: &'static str,
    path: &'static str,
    status: &'static str,
    content_type: &'static str,
    body: String,
}

fn json_route(method: &'static str, path: &'static str, body: &str) -> Route {
    Route {
        method,
        path,
        status: "200 OK",
        content_type: "application/json",
        body: body.to_owned(),
    }
}

/// `(method, path, body)` of every request served.
type Requests = Arc<Mutex<Vec<(String, String, String)>>>;

async fn serve(routes: Vec<Route>) -> (String, Requests) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let requests: Requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);

    tokio::spawn(async move {
        loop {
            let Ok((tcp, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(handle(tcp, routes.clone(), Arc::clone(&log)));
        }
    });

    (base, requests)
}

async fn handle(mut tcp: TcpStream, routes: Vec<Route>, log: Requests) {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = tcp.read(&mut buf).await.unwrap();
        if n == 0 {
            return;
        }
        raw.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let mut request_line = head.lines().next().unwrap().split(' ');
    let method = request_line.next().unwrap().to_owned();
    let path = request_line.next().unwrap().to_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while raw.len() < header_end + content_length {
        let n = tcp.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
    }
    let body = String::from_utf8_lossy(&raw[header_end..]).to_string();
    log.lock().unwrap().push((method.clone(), path.clone(), body));

    let route = routes
        .iter()
        .find(|r| r.method == method && r.path == path)
        .cloned()
        .unwrap_or(Route {
            method: "",
            path: "",
            status: "404 Not Found",
            content_type: "application/json",
            body: r#"{"detail":"Game not found"}"#.to_owned(),
        });

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        route.status,
        route.content_type,
        route.body.len(),
        route.body
    );
    tcp.write_all(response.as_bytes()).await.unwrap();
    let _ = tcp.shutdown().await;
}

const SNAPSHOT: &str = r#"{
    "game_code": "K7Q2ZD",
    "status": "in_progress",
    "white_prompt": "Attack the king.",
    "black_prompt": "Trade everything.",
    "board_fen": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
    "current_turn": "black",
    "result": null,
    "moves": [{"move_number": 1, "color": "white", "move_uci": "e2e4", "move_san": "e4", "comment": null, "was_fallback": false, "created_at": null}],
    "created_at": "2025-01-01T11:59:00"
}"#;

fn games_config(base: &str) -> HttpConfig {
    HttpConfig::new(base).with_resource("games")
}

// ════════════════════════════════════════════════════════════════════
// Request / response calls
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn fetch_snapshot_maps_server_body() {
    let (base, requests) = serve(vec![json_route("GET", "/games/K7Q2ZD", SNAPSHOT)]).await;
    let api = HttpSessionApi::new(games_config(&base)).unwrap();

    let state = api.fetch_snapshot("K7Q2ZD").await.unwrap();
    assert_eq!(state.status, GameStatus::InProgress);
    assert!(state.position.starts_with("rnbqkbnr/pppppppp"));
    assert_eq!(state.move_log.as_deref(), Some("1. e4"));
    assert_eq!(state.move_count, 1);

    assert_eq!(requests.lock().unwrap()[0].0, "GET");
}

#[tokio::test]
async fn fetch_status_reuses_snapshot_endpoint_by_default() {
    let (base, requests) = serve(vec![json_route("GET", "/games/K7Q2ZD", SNAPSHOT)]).await;
    let api = HttpSessionApi::new(games_config(&base)).unwrap();

    let status = api.fetch_status("K7Q2ZD").await.unwrap();
    assert!(status.both_submitted());
    assert_eq!(requests.lock().unwrap()[0].1, "/games/K7Q2ZD");
}

#[tokio::test]
async fn fetch_status_uses_configured_path() {
    let (base, requests) = serve(vec![json_route(
        "GET",
        "/sessions/S1/status",
        r#"{"white_submitted":true,"black_submitted":false}"#,
    )])
    .await;
    let api = HttpSessionApi::new(HttpConfig::new(&base).with_status_path("status")).unwrap();

    let status = api.fetch_status("S1").await.unwrap();
    assert!(status.white_submitted);
    assert!(!status.black_submitted);
    assert_eq!(requests.lock().unwrap()[0].1, "/sessions/S1/status");
}

#[tokio::test]
async fn create_session_returns_game_code() {
    let (base, requests) = serve(vec![json_route("POST", "/games", r#"{"game_code":"NEW123"}"#)]).await;
    let api = HttpSessionApi::new(games_config(&base)).unwrap();

    assert_eq!(api.create_session().await.unwrap(), "NEW123");
    assert_eq!(requests.lock().unwrap()[0].0, "POST");
}

#[tokio::test]
async fn submit_prompt_posts_color_and_text() {
    let (base, requests) = serve(vec![json_route(
        "POST",
        "/games/K7Q2ZD/prompt",
        r#"{"message":"Prompt submitted. Game starting!","game_started":true}"#,
    )])
    .await;
    let api = HttpSessionApi::new(games_config(&base)).unwrap();

    let response = api
        .submit_prompt("K7Q2ZD", Color::Black, "Fianchetto both bishops.")
        .await
        .unwrap();
    assert!(response.game_started);

    let requests = requests.lock().unwrap();
    let sent: serde_json::Value = serde_json::from_str(&requests[0].2).unwrap();
    assert_eq!(
        sent,
        serde_json::json!({"color": "black", "prompt": "Fianchetto both bishops."})
    );
}

#[tokio::test]
async fn over_long_prompt_never_reaches_the_server() {
    let (base, requests) = serve(vec![]).await;
    let api = HttpSessionApi::new(games_config(&base)).unwrap();

    let err = api
        .submit_prompt("K7Q2ZD", Color::White, &"a".repeat(2001))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidPrompt(_)));
    assert!(requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_session_is_http_status_error() {
    let (base, _requests) = serve(vec![]).await;
    let api = HttpSessionApi::new(games_config(&base)).unwrap();

    let err = api.fetch_snapshot("NOPE").await.unwrap_err();
    assert!(err.is_transport());
    match err {
        ClientError::HttpStatus { status, url } => {
            assert_eq!(status, 404);
            assert!(url.ends_with("/games/NOPE"));
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn garbage_body_is_parse_error() {
    let (base, _requests) = serve(vec![json_route("GET", "/games/BAD", "<html>oops</html>")]).await;
    let api = HttpSessionApi::new(games_config(&base)).unwrap();

    let err = api.fetch_snapshot("BAD").await.unwrap_err();
    assert!(err.is_parse(), "got {err:?}");
}

// ════════════════════════════════════════════════════════════════════
// End to end
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn live_view_over_sse() {
    let stream_body = format!(
        ": connected\n\ndata: {}\n\ndata: {}\n\n",
        move_json(1, "white", "e4", Some("King's pawn.")),
        game_over_json("white_wins", "resignation"),
    );
    let (base, requests) = serve(vec![
        json_route("GET", "/games/K7Q2ZD", SNAPSHOT),
        Route {
            method: "GET",
            path: "/games/K7Q2ZD/events",
            status: "200 OK",
            content_type: "text/event-stream",
            body: stream_body,
        },
    ])
    .await;

    let config = games_config(&base);
    let api = Arc::new(HttpSessionApi::new(config.clone()).unwrap());
    let connector = Arc::new(SseConnector::new(config).unwrap());
    let (mut client, mut events) = EventStreamClient::open(
        connector,
        api,
        AudioCoordinator::silent(),
        StreamConfig::new("K7Q2ZD"),
    );

    let event = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::Disconnected { .. })
    })
    .await;
    assert_eq!(event, SessionEvent::Disconnected { reason: None });

    let texts: Vec<String> = client
        .messages()
        .await
        .into_iter()
        .map(|m| m.message)
        .collect();
    assert_eq!(
        texts,
        vec![
            "e4: King's pawn.".to_string(),
            "Game Over: white_wins (resignation)".to_string()
        ]
    );
    assert_eq!(client.game_state().await.unwrap().move_count, 1);
    assert_eq!(client.connection_status(), ConnectionStatus::Disconnected);

    // Initial load, one refetch per state-changing frame, and the stream.
    let snapshot_gets = requests
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, path, _)| path == "/games/K7Q2ZD")
        .count();
    assert_eq!(snapshot_gets, 3);

    client.close().await;
    assert_eq!(client.connection_status(), ConnectionStatus::Closed);
}
