//! Shared fixtures for taixiu integration tests
//!
//! Two in-process servers: a mock game endpoint speaking the
//! Socket.IO-flavored framing, and a minimal CMS answering the handful
//! of routes the fleet calls.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Mock game server
///
/// Greets every connection with an open packet, answers namespace auth
/// with a connect ack plus a `your-info` push (which is also how token
/// validation succeeds), optionally pings on an interval, and records
/// every text frame tagged with the connection's last-authenticated
/// token.
pub struct MockGameServer {
    pub url: String,
    state: Arc<GameState>,
}

struct GameState {
    /// (token, frame) pairs in arrival order; "?" before auth
    frames: Mutex<Vec<(String, String)>>,
    senders: Mutex<Vec<UnboundedSender<String>>>,
    ping_interval: Option<Duration>,
}

impl MockGameServer {
    pub async fn start(ping_interval: Option<Duration>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let state = Arc::new(GameState {
            frames: Mutex::new(Vec::new()),
            senders: Mutex::new(Vec::new()),
            ping_interval,
        });

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn_state = Arc::clone(&accept_state);
                tokio::spawn(async move {
                    handle_game_conn(stream, conn_state).await;
                });
            }
        });

        Self {
            url: format!("ws://{addr}"),
            state,
        }
    }

    /// All recorded frames from connections authenticated as `token`
    pub fn frames_from(&self, token: &str) -> Vec<String> {
        self.state
            .frames
            .lock()
            .iter()
            .filter(|(t, _)| t == token)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    /// Recorded (token, frame) pairs whose frame starts with `prefix`
    pub fn frames_matching(&self, prefix: &str) -> Vec<(String, String)> {
        self.state
            .frames
            .lock()
            .iter()
            .filter(|(_, frame)| frame.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Push a frame down every open connection
    pub fn broadcast(&self, frame: &str) {
        self.state
            .senders
            .lock()
            .retain(|tx| tx.send(frame.to_string()).is_ok());
    }
}

async fn handle_game_conn(stream: TcpStream, state: Arc<GameState>) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    if ws
        .send(Message::Text(
            r#"0{"sid":"mock","pingInterval":25000,"pingTimeout":20000}"#.to_string(),
        ))
        .await
        .is_err()
    {
        return;
    }

    let (tx, mut rx) = unbounded_channel::<String>();
    state.senders.lock().push(tx);

    let mut token = String::from("?");
    let mut ping = tokio::time::interval(
        state.ping_interval.unwrap_or(Duration::from_secs(3600)),
    );
    ping.tick().await; // swallow the immediate first tick

    loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Some(frame) => {
                        if ws.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping.tick(), if state.ping_interval.is_some() => {
                if ws.send(Message::Text("2".to_string())).await.is_err() {
                    break;
                }
            }
            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(auth) = text.strip_prefix("40/tx,") {
                            if let Ok(v) = serde_json::from_str::<serde_json::Value>(auth) {
                                if let Some(t) = v.get("token").and_then(|t| t.as_str()) {
                                    token = t.to_string();
                                }
                            }
                            state.frames.lock().push((token.clone(), text));
                            let _ = ws.send(Message::Text(r#"40/tx,{"sid":"ns"}"#.into())).await;
                            let _ = ws
                                .send(Message::Text(
                                    r#"42/tx,["your-info",{"money":500000}]"#.into(),
                                ))
                                .await;
                        } else {
                            state.frames.lock().push((token.clone(), text));
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Minimal CMS stub
///
/// Serves fixed balances for user lookups, empty bet totals, and
/// accepts every write with `{"ok":true}`.
pub struct MockCms {
    pub base_url: String,
}

impl MockCms {
    pub async fn start(balance: i64) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    handle_cms_conn(stream, balance).await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
        }
    }
}

async fn handle_cms_conn(mut stream: TcpStream, balance: i64) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    // Read the full request: headers, then content-length bytes of body
    let header_end = loop {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length: usize = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())?
        })
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request = head;
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();

    let body = if path == "/api/users" {
        "[]".to_string()
    } else if let Some(username) = path.strip_prefix("/api/users/") {
        format!(r#"{{"username":"{username}","balance":{balance},"status":"playing"}}"#)
    } else if path.starts_with("/api/bet-totals") {
        r#"{"data":[]}"#.to_string()
    } else {
        r#"{"ok":true}"#.to_string()
    };

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Poll `predicate` until it holds or `budget` elapses
pub async fn wait_until(budget: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + budget;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    predicate()
}
