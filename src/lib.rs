//! Taixiu fleet - main library
//!
//! Thin presentation layer over the workspace libraries:
//!
//! - **linekeeper**: duplex-line plumbing (codec, SOCKS5, watchdog)
//! - **taixiu**: the betting-fleet domain (sessions, rounds, allocation)
//! - **bin_common**: shared helpers for the binaries

pub use linekeeper;
pub use taixiu;

pub mod bin_common {
    //! Shared utilities for the binary executables

    pub mod cli;

    pub use cli::{parse_args, settings_path_from_env};
}
