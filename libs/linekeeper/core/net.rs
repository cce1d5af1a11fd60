//! SOCKS5 transport and WebSocket connect helpers
//!
//! Every game account egresses through its own SOCKS5 endpoint. Before a
//! real connection is opened the endpoint is probed with a bare tunnel
//! to the target host, so a dead proxy fails fast instead of wedging the
//! WebSocket handshake.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::traits::error::{LineError, Result};

/// The stream type every connect path resolves to
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One account's SOCKS5 endpoint
///
/// Stored in the account registry as `host:port:user:pass`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAddr {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ProxyAddr {
    /// Parse the registry's `host:port:user:pass` form
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        let [host, port, username, password] = parts.as_slice() else {
            return Err(LineError::ProxyFormat(format!(
                "expected host:port:user:pass, got {} fields",
                parts.len()
            )));
        };
        let port: u16 = port
            .parse()
            .map_err(|_| LineError::ProxyFormat(format!("bad port in {raw:?}")))?;
        if host.is_empty() {
            return Err(LineError::ProxyFormat("empty host".into()));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Open an authenticated tunnel to `target` through this endpoint
    async fn tunnel(&self, target: (&str, u16)) -> Result<TcpStream> {
        let stream = Socks5Stream::connect_with_password(
            (self.host.as_str(), self.port),
            target,
            &self.username,
            &self.password,
        )
        .await
        .map_err(|e| LineError::Proxy(e.to_string()))?;
        Ok(stream.into_inner())
    }
}

/// Probe a proxy by tunneling to the target host and dropping the stream
///
/// A successful CONNECT is the only signal we need; no bytes are sent.
pub async fn probe(proxy: &ProxyAddr, target: (&str, u16), budget: Duration) -> Result<()> {
    let attempt = proxy.tunnel(target);
    match tokio::time::timeout(budget, attempt).await {
        Ok(Ok(_stream)) => {
            debug!("proxy {}:{} reachable", proxy.host, proxy.port);
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(LineError::Timeout(format!(
            "proxy probe to {}:{} exceeded {budget:?}",
            target.0, target.1
        ))),
    }
}

/// Connect a WebSocket directly (no proxy)
pub async fn connect_direct(url: &str) -> Result<WsStream> {
    let (stream, _response) = connect_async(url)
        .await
        .map_err(|e| LineError::Handshake(e.to_string()))?;
    Ok(stream)
}

/// Connect a WebSocket through an established SOCKS5 tunnel
pub async fn connect_via_proxy(url: &str, proxy: &ProxyAddr) -> Result<WsStream> {
    let request = url
        .into_client_request()
        .map_err(|e| LineError::Handshake(format!("bad url {url:?}: {e}")))?;

    let host = request
        .uri()
        .host()
        .ok_or_else(|| LineError::Handshake(format!("url {url:?} has no host")))?
        .to_string();
    let port = request.uri().port_u16().unwrap_or_else(|| {
        match request.uri().scheme_str() {
            Some("wss") => 443,
            _ => 80,
        }
    });

    let tcp = proxy.tunnel((host.as_str(), port)).await?;
    let (stream, _response) = tokio_tungstenite::client_async_tls(request, tcp)
        .await
        .map_err(|e| LineError::Handshake(e.to_string()))?;
    Ok(stream)
}
