//! Fleet configuration
//!
//! Settings live in a JSON file owned by the operator and are re-read at
//! every decision point, so live edits apply from the next round onward
//! without a restart. Policy knobs (pause flag, stake range, player
//! count, strategy, priority tiers) can be overridden inside wall-clock
//! time windows; at most one window is active at a time and windows may
//! wrap across midnight.

use std::path::{Path, PathBuf};

use chrono::{FixedOffset, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Fallback stake range, in raw units (scaled by the stake multiplier)
const DEFAULT_BET_RANGE: BetRange = BetRange {
    start: 50,
    stop: 71,
    step: 10,
};

const DEFAULT_PLAYER_COUNT: u32 = 4;
const DEFAULT_STRATEGY: u8 = 1;

/// The fleet operates on Indochina Time regardless of host timezone
const UTC_OFFSET_SECS: i32 = 7 * 3600;

/// Wall-clock time in the fleet's operating timezone
pub fn local_now() -> NaiveTime {
    let offset = FixedOffset::east_opt(UTC_OFFSET_SECS).expect("static offset");
    Utc::now().with_timezone(&offset).time()
}

/// Inclusive-start stake range with a fixed step, in raw units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRange {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl BetRange {
    /// A range cannot produce a draw when start has reached stop
    pub fn is_valid(&self) -> bool {
        self.start < self.stop && self.step > 0
    }
}

impl Default for BetRange {
    fn default() -> Self {
        DEFAULT_BET_RANGE
    }
}

/// Partial stake range as it appears in config; missing fields fall
/// through to the next configuration level
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PartialBetRange {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl PartialBetRange {
    fn over(&self, base: BetRange) -> BetRange {
        BetRange {
            start: self.start.unwrap_or(base.start),
            stop: self.stop.unwrap_or(base.stop),
            step: self.step.unwrap_or(base.step),
        }
    }
}

/// One wall-clock override window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    /// "HH:MM", inclusive
    pub start: String,
    /// "HH:MM", exclusive; may be earlier than `start` (wraps midnight)
    pub end: String,
    #[serde(default)]
    pub pause: bool,
    #[serde(default)]
    pub bet_range: Option<PartialBetRange>,
    #[serde(default)]
    pub player_count: Option<u32>,
    #[serde(default)]
    pub assign_strategy: Option<u8>,
    #[serde(default)]
    pub priority_users: Option<Vec<String>>,
    #[serde(default)]
    pub priority_users_v2: Option<Vec<String>>,
    #[serde(default)]
    pub priority_users_v3: Option<Vec<String>>,
}

impl TimeWindow {
    /// Whether `now` falls inside this window
    ///
    /// Unparsable bounds disqualify the window rather than the config.
    fn contains(&self, now: NaiveTime) -> bool {
        let parse = |s: &str| NaiveTime::parse_from_str(s, "%H:%M").ok();
        let (Some(start), Some(end)) = (parse(&self.start), parse(&self.end)) else {
            return false;
        };
        if start < end {
            start <= now && now < end
        } else {
            now >= start || now < end
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
}

/// Root settings document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// CMS account-store base url, e.g. `http://127.0.0.1:3000`
    pub cms_base_url: String,
    /// Game WebSocket url
    pub game_ws_url: String,
    /// Host probed through each account's proxy before connecting
    pub game_host: String,
    #[serde(default = "default_game_port")]
    pub game_port: u16,
    /// Socket namespace on the game server
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Login gateway used by the credential broker
    #[serde(default)]
    pub login_url: Option<String>,
    #[serde(default)]
    pub telegram: Option<TelegramSettings>,

    #[serde(default)]
    pub bet_range: Option<PartialBetRange>,
    #[serde(default = "default_player_count")]
    pub player_count: u32,
    #[serde(default)]
    pub assign_strategy: Option<u8>,
    #[serde(default)]
    pub priority_users: Vec<String>,
    #[serde(default)]
    pub priority_users_v2: Vec<String>,
    #[serde(default)]
    pub priority_users_v3: Vec<String>,
    #[serde(default)]
    pub time_windows: Vec<TimeWindow>,
}

fn default_game_port() -> u16 {
    443
}

fn default_namespace() -> String {
    "/tx".to_string()
}

fn default_player_count() -> u32 {
    DEFAULT_PLAYER_COUNT
}

/// Drop empty entries and stray whitespace from a configured user list
fn clean(list: &[String]) -> Vec<String> {
    list.iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect()
}

fn valid_strategy(id: Option<u8>) -> Option<u8> {
    id.filter(|id| (1..=11).contains(id))
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// The window containing `now`, if any; first match wins
    pub fn active_window(&self, now: NaiveTime) -> Option<&TimeWindow> {
        self.time_windows.iter().find(|w| w.contains(now))
    }

    /// Resolve the effective policy at `now`
    ///
    /// Window values override root values field by field; the stake range
    /// merges per-field down to the built-in default; a strategy id
    /// outside 1..=11 is ignored at that level.
    pub fn policy_at(&self, now: NaiveTime) -> Policy {
        let window = self.active_window(now);

        let mut bet_range = DEFAULT_BET_RANGE;
        if let Some(root) = &self.bet_range {
            bet_range = root.over(bet_range);
        }
        if let Some(win) = window.and_then(|w| w.bet_range.as_ref()) {
            bet_range = win.over(bet_range);
        }

        let strategy_id = window
            .and_then(|w| valid_strategy(w.assign_strategy))
            .or_else(|| valid_strategy(self.assign_strategy))
            .unwrap_or(DEFAULT_STRATEGY);

        let pick_list = |win: Option<&Vec<String>>, root: &[String]| -> Vec<String> {
            clean(win.map(|v| v.as_slice()).unwrap_or(root))
        };

        Policy {
            pause: window.map(|w| w.pause).unwrap_or(false),
            bet_range,
            player_count: window
                .and_then(|w| w.player_count)
                .unwrap_or(self.player_count),
            strategy_id,
            tiers: PriorityTiers {
                tier1: pick_list(
                    window.and_then(|w| w.priority_users.as_ref()),
                    &self.priority_users,
                ),
                tier2: pick_list(
                    window.and_then(|w| w.priority_users_v2.as_ref()),
                    &self.priority_users_v2,
                ),
                tier3: pick_list(
                    window.and_then(|w| w.priority_users_v3.as_ref()),
                    &self.priority_users_v3,
                ),
            },
        }
    }
}

/// Priority user tiers, in configured order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorityTiers {
    pub tier1: Vec<String>,
    pub tier2: Vec<String>,
    pub tier3: Vec<String>,
}

impl PriorityTiers {
    pub fn in_tier2(&self, user: &str) -> bool {
        self.tier2.iter().any(|u| u == user)
    }

    pub fn in_tier3(&self, user: &str) -> bool {
        self.tier3.iter().any(|u| u == user)
    }
}

/// Effective policy for one decision point
#[derive(Debug, Clone)]
pub struct Policy {
    pub pause: bool,
    pub bet_range: BetRange,
    pub player_count: u32,
    /// Validated selection strategy id, 1..=11
    pub strategy_id: u8,
    pub tiers: PriorityTiers,
}

/// Handle to the settings file, re-read on every call
#[derive(Debug, Clone)]
pub struct SettingsSource {
    path: PathBuf,
}

impl SettingsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings> {
        Settings::load(&self.path)
    }

    /// Load and resolve the policy for the current wall-clock time
    pub fn policy_now(&self) -> Result<Policy> {
        Ok(self.load()?.policy_at(local_now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn base_settings() -> Settings {
        serde_json::from_value(serde_json::json!({
            "cms_base_url": "http://127.0.0.1:3000",
            "game_ws_url": "wss://game.example/tx/?EIO=4&transport=websocket",
            "game_host": "game.example"
        }))
        .unwrap()
    }

    #[test]
    fn defaults_apply_without_windows() {
        let policy = base_settings().policy_at(t("12:00"));
        assert!(!policy.pause);
        assert_eq!(policy.bet_range, BetRange { start: 50, stop: 71, step: 10 });
        assert_eq!(policy.player_count, 4);
        assert_eq!(policy.strategy_id, 1);
    }

    #[test]
    fn window_bounds_are_inclusive_start_exclusive_end() {
        let w = TimeWindow {
            start: "08:00".into(),
            end: "10:00".into(),
            ..Default::default()
        };
        assert!(w.contains(t("08:00")));
        assert!(w.contains(t("09:59")));
        assert!(!w.contains(t("10:00")));
        assert!(!w.contains(t("07:59")));
    }

    #[test]
    fn windows_wrap_midnight_when_start_exceeds_end() {
        let w = TimeWindow {
            start: "22:00".into(),
            end: "02:00".into(),
            ..Default::default()
        };
        assert!(w.contains(t("23:30")));
        assert!(w.contains(t("01:59")));
        assert!(!w.contains(t("02:00")));
        assert!(!w.contains(t("12:00")));
    }

    #[test]
    fn unparsable_window_bounds_disqualify_the_window() {
        let w = TimeWindow {
            start: "8am".into(),
            end: "10:00".into(),
            ..Default::default()
        };
        assert!(!w.contains(t("09:00")));
    }

    #[test]
    fn priority_lists_are_cleaned() {
        let mut settings = base_settings();
        settings.priority_users_v2 =
            vec!["  alice ".into(), "".into(), "bob".into(), "   ".into()];
        let policy = settings.policy_at(t("12:00"));
        assert_eq!(policy.tiers.tier2, vec!["alice".to_string(), "bob".to_string()]);
    }
}
