//! Game event model and dispatch
//!
//! Inbound frames decode into [`GameEvent`] values; handlers run as
//! independent tasks so the receive loop never blocks on the CMS.
//! Outbound [`Command`]s encode into wire frames at drain time.

use linekeeper::core::frame::Codec;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::allocation::Outcome;
use crate::cms::{BetRecord, StreakOutcome};
use crate::rounds;
use crate::supervisor::Fleet;

/// Label written into bet-history rows
pub const GAME_LABEL: &str = "taixiu";

/// A structured inbound application event
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Account snapshot pushed after auth (and on request)
    YourInfo { balance: i64 },
    /// A new round opened
    NewSession { id: i64 },
    /// The server accepted one of our bets
    BetResult {
        amount: i64,
        door: String,
        post_balance: Option<i64>,
    },
    /// This account won the round
    WonSession {
        amount: i64,
        door: String,
        balance: Option<i64>,
        prize: i64,
        dices: Vec<i64>,
    },
    /// This account lost the round
    LostSession {
        amount: i64,
        door: String,
        balance: Option<i64>,
        prize: i64,
        dices: Vec<i64>,
    },
    /// Recognized framing, unhandled event name
    Other(String),
}

fn int_field(data: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| {
        let v = data.get(k)?;
        v.as_i64()
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    })
}

fn dices_field(data: &Value) -> Vec<i64> {
    data.get("dices")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

fn door_field(data: &Value) -> String {
    data.get("type")
        .or_else(|| data.get("door"))
        .and_then(Value::as_str)
        .map(str::to_ascii_uppercase)
        .unwrap_or_default()
}

/// Decode a parsed event array into a [`GameEvent`]
pub fn decode_event(name: &str, data: &Value) -> GameEvent {
    match name {
        "your-info" => GameEvent::YourInfo {
            balance: int_field(data, &["money", "balance"]).unwrap_or(0),
        },
        "new-session" => match int_field(data, &["id"]) {
            Some(id) => GameEvent::NewSession { id },
            None => GameEvent::Other("new-session without id".into()),
        },
        "bet-result" => GameEvent::BetResult {
            amount: int_field(data, &["amount"]).unwrap_or(0),
            door: door_field(data),
            post_balance: int_field(data, &["postBalance"]),
        },
        "won-session" => GameEvent::WonSession {
            amount: int_field(data, &["amount"]).unwrap_or(0),
            door: door_field(data),
            balance: int_field(data, &["balance"]),
            prize: int_field(data, &["prize"]).unwrap_or(0),
            dices: dices_field(data),
        },
        "lost-session" => GameEvent::LostSession {
            amount: int_field(data, &["amount"]).unwrap_or(0),
            door: door_field(data),
            balance: int_field(data, &["balance"]),
            prize: int_field(data, &["prize"]).unwrap_or(0),
            dices: dices_field(data),
        },
        other => GameEvent::Other(other.to_string()),
    }
}

/// An outbound command queued for delivery on one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Bet { outcome: Outcome, amount: i64 },
    /// Ask the server to push a fresh `your-info`
    RequestInfo,
}

impl Command {
    pub fn encode(&self, codec: &Codec) -> String {
        match self {
            Command::Bet { outcome, amount } => codec.event(
                "bet",
                Some(&json!({ "type": outcome.as_wire(), "amount": amount })),
            ),
            Command::RequestInfo => codec.event("your-info", None),
        }
    }
}

/// Handle one inbound event for one account
///
/// Runs detached from the receive loop. CMS and streak-sink failures are
/// logged and swallowed; they must never block round processing.
pub async fn dispatch(fleet: Fleet, user: String, event: GameEvent) {
    match event {
        GameEvent::YourInfo { balance } => {
            match fleet.cms.update_balance(&user, balance).await {
                Ok(()) => info!("[{user}] balance {balance}"),
                Err(e) => warn!("[{user}] balance update failed: {e}"),
            }
        }

        GameEvent::NewSession { id } => {
            rounds::on_round_start(&fleet, id, &user).await;
        }

        GameEvent::BetResult {
            amount,
            door,
            post_balance,
        } => {
            if let Some(balance) = post_balance {
                if let Err(e) = fleet.cms.update_balance(&user, balance).await {
                    warn!("[{user}] balance update failed: {e}");
                }
                info!("[{user}] bet accepted: {door} {amount}, balance {balance}");
            } else {
                info!("[{user}] bet accepted: {door} {amount}");
            }
            let record = BetRecord {
                username: user.clone(),
                game: GAME_LABEL.into(),
                amount,
                door,
                status: "success".into(),
                balance: post_balance,
                prize: None,
                dices: None,
            };
            if let Err(e) = fleet.cms.record_bet(&record).await {
                warn!("[{user}] bet history write failed: {e}");
            }
        }

        GameEvent::WonSession {
            amount,
            door,
            balance,
            prize,
            dices,
        } => {
            if let Some(balance) = balance {
                if let Err(e) = fleet.cms.update_balance(&user, balance).await {
                    warn!("[{user}] balance update failed: {e}");
                }
            }
            info!("[{user}] won round: prize {prize}, dices {dices:?}");
            let record = BetRecord {
                username: user.clone(),
                game: GAME_LABEL.into(),
                amount,
                door,
                status: "won".into(),
                balance,
                prize: Some(prize),
                dices: Some(dices),
            };
            if let Err(e) = fleet.cms.record_bet(&record).await {
                warn!("[{user}] bet history write failed: {e}");
            }

            // A confirmed win removes this account from the live round's
            // pending set before the grace-delay lost check fires.
            if let Some(round_id) = fleet.coordinator.current_round() {
                fleet.book.confirm_win(round_id, &user);
            }
            if let Err(e) = fleet.cms.record_streak(&user, StreakOutcome::Won).await {
                warn!("[{user}] streak update failed: {e}");
            }
        }

        GameEvent::LostSession {
            amount,
            door,
            balance,
            prize,
            dices,
        } => {
            if let Some(balance) = balance {
                if let Err(e) = fleet.cms.update_balance(&user, balance).await {
                    warn!("[{user}] balance update failed: {e}");
                }
            }
            info!("[{user}] lost round: prize {prize}, dices {dices:?}");
            let record = BetRecord {
                username: user.clone(),
                game: GAME_LABEL.into(),
                amount,
                door,
                status: "lost".into(),
                balance,
                prize: Some(prize),
                dices: Some(dices),
            };
            if let Err(e) = fleet.cms.record_bet(&record).await {
                warn!("[{user}] bet history write failed: {e}");
            }
        }

        GameEvent::Other(name) => {
            debug!("[{user}] ignoring event {name:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_your_info_balance_aliases() {
        let ev = decode_event("your-info", &json!({ "money": 120_000 }));
        assert_eq!(ev, GameEvent::YourInfo { balance: 120_000 });

        let ev = decode_event("your-info", &json!({ "balance": "88000" }));
        assert_eq!(ev, GameEvent::YourInfo { balance: 88_000 });
    }

    #[test]
    fn decodes_new_session_and_rejects_missing_id() {
        assert_eq!(
            decode_event("new-session", &json!({ "id": 991 })),
            GameEvent::NewSession { id: 991 }
        );
        assert!(matches!(
            decode_event("new-session", &json!({})),
            GameEvent::Other(_)
        ));
    }

    #[test]
    fn decodes_bet_result() {
        let ev = decode_event(
            "bet-result",
            &json!({ "amount": 50_000, "type": "tai", "postBalance": 450_000 }),
        );
        assert_eq!(
            ev,
            GameEvent::BetResult {
                amount: 50_000,
                door: "TAI".into(),
                post_balance: Some(450_000),
            }
        );
    }

    #[test]
    fn decodes_won_session_with_dices() {
        let ev = decode_event(
            "won-session",
            &json!({ "balance": 600_000, "prize": 98_000, "dices": [6, 5, 4] }),
        );
        match ev {
            GameEvent::WonSession { prize, dices, .. } => {
                assert_eq!(prize, 98_000);
                assert_eq!(dices, vec![6, 5, 4]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn encodes_commands() {
        let codec = Codec::new("/tx");
        let bet = Command::Bet {
            outcome: Outcome::Xiu,
            amount: 70_000,
        };
        assert_eq!(bet.encode(&codec), r#"42/tx,["bet",{"type":"XIU","amount":70000}]"#);
        assert_eq!(Command::RequestInfo.encode(&codec), r#"42/tx,["your-info"]"#);
    }
}
