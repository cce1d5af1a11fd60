//! # Taixiu fleet library
//!
//! Runs a fleet of game accounts against a real-time dice table: one
//! persistent proxied connection per account, a round coordinator that
//! claims each new session exactly once process-wide, and an allocation
//! engine that splits a randomized stake across the online accounts
//! under configurable selection strategies.
//!
//! External collaborators (the CMS account store, the login gateway, the
//! Telegram channel) are reached over HTTP and treated as advisory: their
//! failures are logged, never allowed to stall round processing.

pub mod allocation;
pub mod cms;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod events;
pub mod notify;
pub mod rounds;
pub mod supervisor;
pub mod util;

pub use allocation::{Assignment, Outcome, PlanOutcome};
pub use cms::{AccountStatus, CmsClient, UserRecord};
pub use config::{Policy, Settings, SettingsSource};
pub use connection::SessionTiming;
pub use supervisor::{Fleet, FleetTuning};
pub use util::init_tracing;
