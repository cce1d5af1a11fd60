use thiserror::Error;

/// Main error type for linekeeper
#[derive(Error, Debug)]
pub enum LineError {
    /// SOCKS5 endpoint unreachable or probe ladder exhausted
    #[error("proxy unreachable: {0}")]
    Proxy(String),

    /// Proxy endpoint string did not parse
    #[error("invalid proxy endpoint: {0}")]
    ProxyFormat(String),

    /// Token rejected after refresh attempts were exhausted
    #[error("authentication failed: {0}")]
    Token(String),

    /// WebSocket or namespace handshake failed
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Mid-stream I/O failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The server ended the stream
    #[error("connection closed: {0}")]
    Closed(String),

    /// Operation exceeded its time budget
    #[error("timed out: {0}")]
    Timeout(String),
}

/// Result type for linekeeper operations
pub type Result<T> = std::result::Result<T, LineError>;
