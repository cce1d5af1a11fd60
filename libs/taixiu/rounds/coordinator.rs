//! Round coordination
//!
//! Every connected account hears the same `new-session` push; exactly
//! one observer may act on it. The coordinator owns the claim cell (a
//! plain mutex mutated only at non-suspending points), plus the
//! settlement timers for previous rounds and the scheduling of bet
//! deliveries produced by the allocation pass.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::allocation::{build_plan, Assignment, Outcome, PlanOutcome, RoundInputs, DUST_FLOOR};
use crate::cms::{AccountStatus, StreakOutcome};
use crate::events::Command;
use crate::supervisor::Fleet;

/// Result of attempting to claim a round
#[derive(Debug, PartialEq, Eq)]
pub enum Claim {
    /// Another connection already claimed this round id
    AlreadySeen,
    /// This observer owns the round; `previous` is the round it replaced
    Claimed { previous: Option<i64> },
}

struct CoordState {
    last_seen: Option<i64>,
    settlements: Vec<JoinHandle<()>>,
}

pub struct RoundCoordinator {
    state: Mutex<CoordState>,
    grace: Duration,
}

impl RoundCoordinator {
    pub fn new(grace: Duration) -> Self {
        Self {
            state: Mutex::new(CoordState {
                last_seen: None,
                settlements: Vec::new(),
            }),
            grace,
        }
    }

    /// The round currently being played, if any
    pub fn current_round(&self) -> Option<i64> {
        self.state.lock().last_seen
    }

    /// Claim a round id for the calling observer
    ///
    /// Single-writer: the check and the update happen under one lock
    /// with no suspension in between, so a given id is claimed at most
    /// once no matter how many connections report it.
    pub fn claim(&self, round_id: i64) -> Claim {
        let mut state = self.state.lock();
        if state.last_seen == Some(round_id) {
            return Claim::AlreadySeen;
        }
        let previous = state.last_seen.replace(round_id);
        Claim::Claimed { previous }
    }

    fn track_settlement(&self, handle: JoinHandle<()>) {
        let mut state = self.state.lock();
        state.settlements.retain(|h| !h.is_finished());
        state.settlements.push(handle);
    }

    /// Abort any pending settlement timers (shutdown path)
    pub fn abort_settlements(&self) {
        let mut state = self.state.lock();
        for handle in state.settlements.drain(..) {
            handle.abort();
        }
    }
}

/// React to a `new-session` push observed on `observer`'s connection
pub async fn on_round_start(fleet: &Fleet, round_id: i64, observer: &str) {
    let previous = match fleet.coordinator.claim(round_id) {
        Claim::AlreadySeen => {
            debug!("[{observer}] round {round_id} already claimed");
            return;
        }
        Claim::Claimed { previous } => previous,
    };
    info!("[{observer}] claimed round {round_id}");

    // Settle the round we just left: whoever never confirmed a win by
    // the end of the grace delay is recorded lost.
    if let Some(previous) = previous {
        schedule_settlement(fleet, previous);
    }

    let online = fleet.registry.online_users();
    match gather_and_plan(fleet, &online).await {
        PlanOutcome::Skipped(reason) => {
            info!("round {round_id}: no allocation ({reason})");
        }
        PlanOutcome::Infeasible { outcome, amount } => {
            let message =
                format!("round {round_id}: no account can cover {outcome} {amount}, plan discarded");
            warn!("{message}");
            fleet.notifier.alert(&message).await;
        }
        PlanOutcome::Plan(plan) => {
            fleet
                .book
                .record_plan(round_id, plan.iter().map(|a| a.username.clone()).collect());

            let side = |outcome: Outcome| -> i64 {
                plan.iter()
                    .filter(|a| a.outcome == outcome)
                    .map(|a| a.amount)
                    .sum()
            };
            info!(
                "round {round_id}: {} assignments, TAI {} / XIU {}",
                plan.len(),
                side(Outcome::Tai),
                side(Outcome::Xiu)
            );

            for assignment in plan {
                schedule_delivery(fleet, assignment);
            }
        }
    }
}

/// Resolve policy, gather fresh inputs, and run the allocation pass
async fn gather_and_plan(fleet: &Fleet, online: &[String]) -> PlanOutcome {
    let policy = match fleet.settings.policy_now() {
        Ok(policy) => policy,
        Err(e) => {
            warn!("settings unreadable at round start: {e}");
            return PlanOutcome::Skipped(crate::allocation::SkipReason::ConfigUnavailable);
        }
    };
    if policy.pause {
        return PlanOutcome::Skipped(crate::allocation::SkipReason::Paused);
    }

    let balances = fetch_balances(fleet, online).await;

    // Stake totals only matter to the strategies that order by them
    let totals = if policy.strategy_id >= 5 {
        fleet.cms.bet_totals().await.unwrap_or_else(|e| {
            warn!("bet totals unavailable, ordering on zeroes: {e}");
            HashMap::new()
        })
    } else {
        HashMap::new()
    };

    let inputs = RoundInputs {
        online: online.to_vec(),
        balances,
        totals,
    };
    let mut rng = rand::thread_rng();
    build_plan(&policy, &inputs, &mut rng, &fleet.tuning.engine)
}

/// Fresh balances for the online set, flagging broke accounts
async fn fetch_balances(fleet: &Fleet, online: &[String]) -> HashMap<String, i64> {
    let mut balances = HashMap::with_capacity(online.len());
    for user in online {
        let balance = match fleet.cms.user(user).await {
            Ok(record) => record.balance,
            Err(e) => {
                warn!("[{user}] balance fetch failed, treating as 0: {e}");
                0
            }
        };
        if balance < DUST_FLOOR {
            if let Err(e) = fleet.cms.update_status(user, AccountStatus::OutOfMoney).await {
                warn!("[{user}] could not flag out_of_money: {e}");
            }
        }
        balances.insert(user.clone(), balance);
    }
    balances
}

fn schedule_settlement(fleet: &Fleet, previous_round: i64) {
    let grace = fleet.coordinator.grace;
    let fleet_for_task = fleet.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        let unconfirmed = fleet_for_task.book.take_round(previous_round);
        for user in unconfirmed {
            match fleet_for_task
                .cms
                .record_streak(&user, StreakOutcome::Lost)
                .await
            {
                Ok(()) => info!("[{user}] recorded lost for round {previous_round}"),
                Err(e) => warn!("[{user}] streak update failed: {e}"),
            }
        }
    });
    fleet.coordinator.track_settlement(handle);
}

/// Schedule the staggered delivery of one assignment
///
/// Replaces any delivery still pending for the account from an earlier
/// plan; delayed deliveries never accumulate.
fn schedule_delivery(fleet: &Fleet, assignment: Assignment) {
    let fleet_for_task = fleet.clone();
    let username = assignment.username.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(assignment.delay).await;
        let command = Command::Bet {
            outcome: assignment.outcome,
            amount: assignment.amount,
        };
        if !fleet_for_task.registry.enqueue(&assignment.username, command) {
            warn!(
                "[{}] no live connection at delivery time, bet dropped",
                assignment.username
            );
        }
    });
    fleet.registry.set_bet_task(&username, handle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_round_ids_are_claimed_once() {
        let coordinator = RoundCoordinator::new(Duration::from_secs(10));

        assert_eq!(
            coordinator.claim(100),
            Claim::Claimed { previous: None }
        );
        assert_eq!(coordinator.claim(100), Claim::AlreadySeen);
        assert_eq!(
            coordinator.claim(101),
            Claim::Claimed {
                previous: Some(100)
            }
        );
        assert_eq!(coordinator.current_round(), Some(101));
    }
}
