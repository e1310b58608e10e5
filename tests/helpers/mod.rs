//! In-process backend fakes for integration tests: one listener that serves
//! both the push WebSocket endpoint and the canned REST collaborator.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

use linguadesk_notify::{NavigationTarget, NotificationEvent, Presenter};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Canned REST responses, adjustable per test.
pub struct CannedApi {
    pub unread_count: u64,
    pub notifications: serde_json::Value,
    pub preferences: serde_json::Value,
}

impl Default for CannedApi {
    fn default() -> Self {
        Self {
            unread_count: 0,
            notifications: serde_json::json!([]),
            preferences: serde_json::json!({}),
        }
    }
}

/// One accepted push connection. Dropping the handle severs the connection
/// from the server side.
pub struct WsConn {
    tx: mpsc::UnboundedSender<Message>,
}

impl WsConn {
    pub fn send_text(&self, text: &str) {
        let _ = self.tx.send(Message::text(text));
    }

    pub fn push_notification(&self, id: &str, kind: &str, requires_sound: bool) {
        self.send_text(&notification_frame(id, kind, requires_sound));
    }
}

pub fn notification_frame(id: &str, kind: &str, requires_sound: bool) -> String {
    serde_json::json!({
        "type": "notification",
        "data": {
            "id": id,
            "type": kind,
            "title": "Test notification",
            "message": "body",
            "requires_sound": requires_sound,
            "created_at": "2026-08-07T10:00:00Z",
        }
    })
    .to_string()
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub api: Arc<Mutex<CannedApi>>,
    requests: Arc<Mutex<Vec<String>>>,
    conn_rx: mpsc::UnboundedReceiver<WsConn>,
}

impl TestServer {
    pub async fn start() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let api = Arc::new(Mutex::new(CannedApi::default()));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();

        let accept_api = Arc::clone(&api);
        let accept_requests = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let api = Arc::clone(&accept_api);
                let requests = Arc::clone(&accept_requests);
                let conn_tx = conn_tx.clone();
                tokio::spawn(async move {
                    handle_connection(stream, api, requests, conn_tx).await;
                });
            }
        });

        Self {
            addr,
            api,
            requests,
            conn_rx,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn next_conn(&mut self) -> WsConn {
        self.next_conn_within(Duration::from_secs(5))
            .await
            .expect("no websocket connection within timeout")
    }

    pub async fn next_conn_within(&mut self, timeout: Duration) -> Option<WsConn> {
        tokio::time::timeout(timeout, self.conn_rx.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn handle_connection(
    stream: TcpStream,
    api: Arc<Mutex<CannedApi>>,
    requests: Arc<Mutex<Vec<String>>>,
    conn_tx: mpsc::UnboundedSender<WsConn>,
) {
    let head = peek_head(&stream).await;
    let head_text = String::from_utf8_lossy(&head).to_ascii_lowercase();
    if head_text.contains("upgrade: websocket") {
        serve_ws(stream, conn_tx).await;
    } else {
        serve_http(stream, api, requests).await;
    }
}

async fn peek_head(stream: &TcpStream) -> Vec<u8> {
    let mut buf = vec![0u8; 4096];
    for _ in 0..200 {
        let n = match stream.peek(&mut buf).await {
            Ok(0) | Err(_) => return Vec::new(),
            Ok(n) => n,
        };
        if buf[..n].windows(4).any(|w| w == b"\r\n\r\n") || n == buf.len() {
            return buf[..n].to_vec();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    buf
}

async fn serve_ws(stream: TcpStream, conn_tx: mpsc::UnboundedSender<WsConn>) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let _ = conn_tx.send(WsConn { tx });

    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(message) => {
                    if ws.send(message).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = ws.close(None).await;
                    break;
                }
            },
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let text: &str = text.as_ref();
                    if text == "ping" && ws.send(Message::text("pong")).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn serve_http(
    mut stream: TcpStream,
    api: Arc<Mutex<CannedApi>>,
    requests: Arc<Mutex<Vec<String>>>,
) {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 2048];
    let header_end = loop {
        match stream.read(&mut tmp).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                buf.extend_from_slice(&tmp[..n]);
                if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
                    break pos + 4;
                }
                if buf.len() > 64 * 1024 {
                    return;
                }
            }
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        match stream.read(&mut tmp).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
        }
    }

    let request_line = head.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();
    requests.lock().unwrap().push(format!("{method} {target}"));

    let (status, body) = route(&method, &target, &api);
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn route(method: &str, target: &str, api: &Arc<Mutex<CannedApi>>) -> (&'static str, String) {
    let api = api.lock().unwrap();
    let path = target.split('?').next().unwrap_or(target);
    match (method, path) {
        ("GET", "/api/notifications/unread-count") => {
            ("200 OK", format!(r#"{{"count":{}}}"#, api.unread_count))
        }
        ("GET", "/api/notifications/preferences") => ("200 OK", api.preferences.to_string()),
        ("PUT", "/api/notifications/preferences") => ("200 OK", "{}".to_string()),
        ("GET", "/api/notifications") => (
            "200 OK",
            serde_json::json!({ "notifications": api.notifications }).to_string(),
        ),
        ("POST", "/api/notifications/read-all") => {
            ("200 OK", format!(r#"{{"affected":{}}}"#, api.unread_count))
        }
        ("POST", path) if path.starts_with("/api/notifications/") && path.ends_with("/read") => {
            ("200 OK", "{}".to_string())
        }
        _ => ("404 Not Found", r#"{"error":"not found"}"#.to_string()),
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Presenter that records every effect for assertions.
#[derive(Default)]
pub struct TestPresenter {
    toasts: Mutex<Vec<String>>,
    sounds: Mutex<Vec<String>>,
    desktops: Mutex<Vec<String>>,
    navigations: Mutex<Vec<String>>,
    selections: Mutex<Vec<NavigationTarget>>,
    pub permission: AtomicBool,
    pub focused: AtomicBool,
}

impl TestPresenter {
    pub fn toasts(&self) -> Vec<String> {
        self.toasts.lock().unwrap().clone()
    }
    pub fn sounds(&self) -> Vec<String> {
        self.sounds.lock().unwrap().clone()
    }
    pub fn desktops(&self) -> Vec<String> {
        self.desktops.lock().unwrap().clone()
    }
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }
    pub fn selections(&self) -> Vec<NavigationTarget> {
        self.selections.lock().unwrap().clone()
    }
}

impl Presenter for TestPresenter {
    fn show_toast(&self, event: &NotificationEvent) {
        self.toasts.lock().unwrap().push(event.id.clone());
    }
    fn show_desktop(&self, event: &NotificationEvent) {
        self.desktops.lock().unwrap().push(event.id.clone());
    }
    fn play_sound(&self, event: &NotificationEvent) {
        self.sounds.lock().unwrap().push(event.id.clone());
    }
    fn desktop_permission_granted(&self) -> bool {
        self.permission.load(Ordering::SeqCst)
    }
    fn is_app_focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }
    fn navigate(&self, path: &str) {
        self.navigations.lock().unwrap().push(path.to_string());
    }
    fn select_entity(&self, target: &NavigationTarget) {
        self.selections.lock().unwrap().push(target.clone());
    }
}
