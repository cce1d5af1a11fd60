pub mod frame;
pub mod net;
pub mod watchdog;

pub use frame::{Codec, Frame};
pub use net::{ProxyAddr, WsStream};
pub use watchdog::PingWatchdog;
