pub mod bookkeeper;
pub mod coordinator;

pub use bookkeeper::SessionBook;
pub use coordinator::{on_round_start, Claim, RoundCoordinator};
