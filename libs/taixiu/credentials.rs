//! Credential broker
//!
//! Session tokens expire server-side; when one is rejected the broker
//! logs the account back in through its own SOCKS proxy at the gateway,
//! persists the fresh token (and the balance the login response carries)
//! to the CMS, and hands the token back to the caller.
//!
//! Validation is done the only way the game exposes: open the real
//! WebSocket, authenticate, and see whether the server volunteers the
//! `your-info` event.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use linekeeper::core::frame::{self, Codec, Frame};
use linekeeper::core::net::{self, ProxyAddr};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cms::{AccountStatus, CmsClient};

#[derive(Error, Debug)]
pub enum CredentialError {
    /// The CMS row lacks what a login needs
    #[error("missing credential material: {0}")]
    Missing(&'static str),

    /// The gateway answered but refused to issue a token
    #[error("login rejected: {0}")]
    Rejected(String),

    /// The gateway (or the CMS) could not be reached
    #[error("network failure: {0}")]
    Network(String),
}

pub type Result<T> = std::result::Result<T, CredentialError>;

/// How many events to inspect while waiting for `your-info`
const VALIDATE_EVENT_BUDGET: usize = 10;

pub struct CredentialBroker {
    cms: Arc<CmsClient>,
    login_url: Option<String>,
}

impl CredentialBroker {
    pub fn new(cms: Arc<CmsClient>, login_url: Option<String>) -> Self {
        Self { cms, login_url }
    }

    /// Mint a fresh session token for `username`
    ///
    /// Persists the new token and the balance reported by the login
    /// response; persistence failures are logged, not fatal, since the
    /// caller already holds the token.
    pub async fn refresh(&self, username: &str) -> Result<String> {
        let login_url = self
            .login_url
            .as_deref()
            .ok_or(CredentialError::Missing("login gateway url"))?;
        let account = self
            .cms
            .user(username)
            .await
            .map_err(|e| CredentialError::Network(format!("cms lookup: {e}")))?;

        let nickname = account
            .nickname
            .as_deref()
            .ok_or(CredentialError::Missing("nickname"))?;
        let access_token = account
            .access_token
            .as_deref()
            .ok_or(CredentialError::Missing("access_token"))?;
        let proxy_raw = account
            .proxy
            .as_deref()
            .ok_or(CredentialError::Missing("proxy"))?;
        let proxy = match ProxyAddr::parse(proxy_raw) {
            Ok(p) => p,
            Err(e) => {
                warn!("[{username}] proxy endpoint unusable ({e}): {proxy_raw:?}");
                return Err(CredentialError::Missing("proxy"));
            }
        };

        // The gateway expects login traffic to originate from the same
        // egress as the game connection.
        let proxy_url = format!(
            "socks5h://{}:{}@{}:{}",
            proxy.username, proxy.password, proxy.host, proxy.port
        );
        let http = reqwest::Client::builder()
            .proxy(
                reqwest::Proxy::all(&proxy_url)
                    .map_err(|e| CredentialError::Network(e.to_string()))?,
            )
            .timeout(Duration::from_secs(25))
            .build()
            .map_err(|e| CredentialError::Network(e.to_string()))?;

        debug!("[{username}] logging in through {}:{}", proxy.host, proxy.port);
        let resp = http
            .post(login_url)
            .json(&json!({ "nickName": nickname, "accessToken": access_token }))
            .send()
            .await
            .map_err(|e| CredentialError::Network(e.to_string()))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CredentialError::Rejected(format!("unreadable response: {e}")))?;

        let Some(token) = body.get("token").and_then(|t| t.as_str()) else {
            return Err(CredentialError::Rejected(format!(
                "no token in response (http {status})"
            )));
        };

        if let Err(e) = self.cms.update_token(username, token).await {
            warn!("[{username}] could not persist refreshed token: {e}");
        }

        // The login response carries the authoritative balance; take it
        // while we are here.
        let balance = body
            .pointer("/remoteLoginResp/money")
            .or_else(|| body.get("money"))
            .and_then(|m| m.as_i64());
        if let Some(balance) = balance {
            if let Err(e) = self.cms.update_balance(username, balance).await {
                warn!("[{username}] could not persist login balance: {e}");
            }
        }

        info!("[{username}] session token refreshed");
        Ok(token.to_string())
    }
}

/// Check a session token against the live game endpoint
///
/// Connects (through the proxy when given), authenticates, and waits for
/// the server to push `your-info`. Any failure inside the budget
/// (transport, handshake, or silence) counts as invalid.
pub async fn validate_token(
    ws_url: &str,
    namespace: &str,
    token: &str,
    proxy: Option<&ProxyAddr>,
    budget: Duration,
) -> bool {
    let check = validate_inner(ws_url, namespace, token, proxy);
    match tokio::time::timeout(budget, check).await {
        Ok(valid) => valid,
        Err(_) => {
            debug!("token validation exceeded {budget:?}");
            false
        }
    }
}

async fn validate_inner(
    ws_url: &str,
    namespace: &str,
    token: &str,
    proxy: Option<&ProxyAddr>,
) -> bool {
    use futures::SinkExt;
    use tokio_tungstenite::tungstenite::Message;

    let connected = match proxy {
        Some(p) => net::connect_via_proxy(ws_url, p).await,
        None => net::connect_direct(ws_url).await,
    };
    let mut ws = match connected {
        Ok(ws) => ws,
        Err(e) => {
            debug!("token validation connect failed: {e}");
            return false;
        }
    };

    let codec = Codec::new(namespace);

    // Discard the transport greeting, then authenticate
    let _ = ws.next().await;
    if ws.send(Message::Text(codec.auth(token))).await.is_err() {
        return false;
    }

    for _ in 0..VALIDATE_EVENT_BUDGET {
        let msg = match ws.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(_)) => continue,
            _ => break,
        };
        if let Frame::Event(payload) = codec.decode(&msg) {
            if let Ok((name, _)) = frame::parse_event(payload) {
                if name == "your-info" {
                    let _ = ws.close(None).await;
                    return true;
                }
            }
        }
    }
    let _ = ws.close(None).await;
    false
}

/// Validate and mirror the result into the account's CMS status
///
/// Used by the operational `test_token` binary.
pub async fn validate_and_mark(
    cms: &CmsClient,
    ws_url: &str,
    namespace: &str,
    username: &str,
    token: &str,
    proxy: Option<&ProxyAddr>,
    budget: Duration,
) -> bool {
    let ok = validate_token(ws_url, namespace, token, proxy, budget).await;
    let status = if ok {
        AccountStatus::Playing
    } else {
        AccountStatus::TokenFailed
    };
    if let Err(e) = cms.update_status(username, status).await {
        warn!("[{username}] could not record token check result: {e}");
    }
    ok
}
