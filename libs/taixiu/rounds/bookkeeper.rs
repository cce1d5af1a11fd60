//! Per-round participation bookkeeping
//!
//! Records which accounts were handed a bet for each round. Win
//! confirmations remove accounts as they arrive; whoever is still listed
//! when the grace-delay settlement fires is reported lost.

use std::collections::HashMap;

use parking_lot::Mutex;

pub struct SessionBook {
    rounds: Mutex<HashMap<i64, Vec<String>>>,
}

impl SessionBook {
    pub fn new() -> Self {
        Self {
            rounds: Mutex::new(HashMap::new()),
        }
    }

    /// Remember who was assigned a bet this round
    pub fn record_plan(&self, round_id: i64, usernames: Vec<String>) {
        self.rounds.lock().insert(round_id, usernames);
    }

    /// Remove a confirmed winner from a round's pending set
    ///
    /// Returns whether the account was still pending.
    pub fn confirm_win(&self, round_id: i64, username: &str) -> bool {
        let mut rounds = self.rounds.lock();
        let Some(pending) = rounds.get_mut(&round_id) else {
            return false;
        };
        let before = pending.len();
        pending.retain(|u| u != username);
        pending.len() != before
    }

    /// Drop a round and hand back its still-unconfirmed accounts
    pub fn take_round(&self, round_id: i64) -> Vec<String> {
        self.rounds.lock().remove(&round_id).unwrap_or_default()
    }

    /// Snapshot of a round's pending accounts
    pub fn assigned(&self, round_id: i64) -> Vec<String> {
        self.rounds
            .lock()
            .get(&round_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for SessionBook {
    fn default() -> Self {
        Self::new()
    }
}
