//! # Linekeeper
//!
//! Plumbing for long-lived duplex game connections.
//!
//! The game server speaks a Socket.IO-flavored dialect over WebSocket:
//! single-character keepalive frames, a namespace handshake, and JSON
//! event arrays. Linekeeper owns the pieces of that stack that have no
//! business knowing about accounts or bets:
//!
//! - **Wire codec**: decode inbound frames, encode auth/event/ack frames
//! - **Transport**: SOCKS5 probe and tunneled WebSocket connect
//! - **Liveness**: dual-horizon watchdog (keepalive ack / dead-air)
//! - **Backoff**: finite retry ladders for transport probing

pub mod core;
pub mod traits;

// Re-export commonly used types
pub use traits::backoff::{BackoffSchedule, FixedDelay, StepSchedule};
pub use traits::error::{LineError, Result};

pub use self::core::frame::{Codec, Frame};
pub use self::core::net::{ProxyAddr, WsStream};
pub use self::core::watchdog::PingWatchdog;
