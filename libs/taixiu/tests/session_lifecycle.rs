//! End-to-end session lifecycle tests against the in-process mocks
//!
//! Timings are compressed via `FleetTuning`; the mock game server
//! answers auth with `your-info`, so token validation passes without a
//! credential gateway.

mod common;

use std::path::PathBuf;
use std::time::Duration;

use common::{wait_until, MockCms, MockGameServer};
use linekeeper::StepSchedule;
use taixiu::allocation::{EngineOptions, Outcome};
use taixiu::connection::SessionTiming;
use taixiu::events::Command;
use taixiu::rounds::Claim;
use taixiu::{Fleet, FleetTuning, SettingsSource, UserRecord};

fn write_settings(
    dir: &tempfile::TempDir,
    cms_url: &str,
    game_url: &str,
    player_count: u32,
) -> PathBuf {
    let path = dir.path().join("config.json");
    let body = serde_json::json!({
        "cms_base_url": cms_url,
        "game_ws_url": game_url,
        "game_host": "127.0.0.1",
        "game_port": 1,
        "player_count": player_count,
        "assign_strategy": 1,
    });
    std::fs::write(&path, body.to_string()).unwrap();
    path
}

fn fast_tuning() -> FleetTuning {
    FleetTuning {
        session: SessionTiming {
            poll: Duration::from_millis(20),
            keepalive_horizon: Duration::from_millis(250),
            dead_air_horizon: Duration::from_secs(3),
            token_budget: Duration::from_secs(2),
            probe_budget: Duration::from_millis(500),
            greeting_budget: Duration::from_millis(300),
            proxy_backoff: StepSchedule::from_secs(&[0]),
            refresh_attempts: 1,
        },
        engine: EngineOptions {
            resample_cap: 8,
            delay_range: 0..=0,
        },
        grace: Duration::from_millis(200),
        reconcile_interval: Duration::from_millis(500),
    }
}

/// A proxyless account whose token doubles as its name
fn account(name: &str) -> UserRecord {
    UserRecord {
        username: name.to_string(),
        nickname: None,
        access_token: None,
        jwt: Some(name.to_string()),
        proxy: None,
        balance: 0,
        status: Some("playing".to_string()),
    }
}

#[tokio::test]
async fn connects_authenticates_and_acks_keepalives() {
    let game = MockGameServer::start(Some(Duration::from_millis(50))).await;
    let cms = MockCms::start(500_000).await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_settings(&dir, &cms.base_url, &game.url, 8);
    let fleet = Fleet::with_tuning(SettingsSource::new(path), fast_tuning()).unwrap();

    fleet.connect(account("alice")).await;

    assert!(
        wait_until(Duration::from_secs(5), || {
            game.frames_from("alice")
                .iter()
                .any(|f| f.starts_with("40/tx,"))
        })
        .await,
        "auth frame never arrived"
    );
    assert!(fleet.registry.contains("alice"));

    // The server pings every 50ms; the session must answer each with "3"
    assert!(
        wait_until(Duration::from_secs(5), || {
            game.frames_from("alice").iter().any(|f| f == "3")
        })
        .await,
        "keepalive ack never arrived"
    );

    fleet.shutdown_all().await;
}

#[tokio::test]
async fn drains_queued_bets_on_poll_expiry() {
    let game = MockGameServer::start(Some(Duration::from_millis(50))).await;
    let cms = MockCms::start(500_000).await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_settings(&dir, &cms.base_url, &game.url, 8);
    let fleet = Fleet::with_tuning(SettingsSource::new(path), fast_tuning()).unwrap();

    fleet.connect(account("bob")).await;
    assert!(
        wait_until(Duration::from_secs(5), || {
            game.frames_from("bob").iter().any(|f| f.starts_with("40/tx,"))
        })
        .await
    );

    fleet.registry.enqueue(
        "bob",
        Command::Bet {
            outcome: Outcome::Tai,
            amount: 50_000,
        },
    );

    assert!(
        wait_until(Duration::from_secs(5), || {
            game.frames_from("bob")
                .iter()
                .any(|f| f == r#"42/tx,["bet",{"type":"TAI","amount":50000}]"#)
        })
        .await,
        "bet frame never delivered"
    );

    fleet.shutdown_all().await;
}

#[tokio::test]
async fn disconnect_is_idempotent_and_allows_reconnect() {
    let game = MockGameServer::start(Some(Duration::from_millis(50))).await;
    let cms = MockCms::start(500_000).await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_settings(&dir, &cms.base_url, &game.url, 8);
    let fleet = Fleet::with_tuning(SettingsSource::new(path), fast_tuning()).unwrap();

    fleet.connect(account("carol")).await;
    assert!(
        wait_until(Duration::from_secs(5), || {
            game.frames_from("carol").iter().any(|f| f.starts_with("40/tx,"))
        })
        .await
    );

    // Double disconnect: one removal, no panic, slot freed exactly once
    fleet.disconnect("carol");
    fleet.disconnect("carol");

    assert!(
        wait_until(Duration::from_secs(5), || !fleet.registry.contains("carol")).await,
        "slot never released"
    );

    // The slot is reusable afterwards
    fleet.connect(account("carol")).await;
    assert!(
        wait_until(Duration::from_secs(5), || fleet.registry.contains("carol")).await
    );

    fleet.shutdown_all().await;
}

#[tokio::test]
async fn force_reconnect_supersedes_without_destroying_the_new_slot() {
    let game = MockGameServer::start(Some(Duration::from_millis(50))).await;
    let cms = MockCms::start(500_000).await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_settings(&dir, &cms.base_url, &game.url, 8);
    let fleet = Fleet::with_tuning(SettingsSource::new(path), fast_tuning()).unwrap();

    fleet.connect(account("dave")).await;
    assert!(
        wait_until(Duration::from_secs(5), || {
            game.frames_from("dave").iter().any(|f| f.starts_with("40/tx,"))
        })
        .await
    );
    let first_id = fleet.registry.conn_id("dave").unwrap();

    fleet.force_reconnect(account("dave")).await;
    let second_id = fleet.registry.conn_id("dave").unwrap();
    assert_ne!(first_id, second_id);

    // The superseded task must exit without tearing down the new entry
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(fleet.registry.is_current("dave", second_id));
    assert_eq!(fleet.registry.connection_count(), 1);

    fleet.shutdown_all().await;
}

#[tokio::test]
async fn dead_air_tears_the_session_down() {
    // No server pings at all: the dead-air horizon must trip
    let game = MockGameServer::start(None).await;
    let cms = MockCms::start(500_000).await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_settings(&dir, &cms.base_url, &game.url, 8);

    let mut tuning = fast_tuning();
    tuning.session.dead_air_horizon = Duration::from_millis(400);
    let fleet = Fleet::with_tuning(SettingsSource::new(path), tuning).unwrap();

    fleet.connect(account("erin")).await;
    assert!(
        wait_until(Duration::from_secs(5), || fleet.registry.contains("erin")).await
    );

    // Without a supervisor pass there is no replacement: the slot stays
    // free once the watchdog fires.
    assert!(
        wait_until(Duration::from_secs(5), || !fleet.registry.contains("erin")).await,
        "dead-air teardown never happened"
    );

    fleet.shutdown_all().await;
}

#[tokio::test]
async fn a_round_is_claimed_once_and_bets_fan_out() {
    let game = MockGameServer::start(Some(Duration::from_millis(50))).await;
    let cms = MockCms::start(500_000).await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_settings(&dir, &cms.base_url, &game.url, 8);
    let fleet = Fleet::with_tuning(SettingsSource::new(path), fast_tuning()).unwrap();

    let names = ["a1", "a2", "a3", "a4", "a5", "a6", "a7", "a8"];
    for name in names {
        fleet.connect(account(name)).await;
    }
    assert!(
        wait_until(Duration::from_secs(10), || {
            names.iter().all(|name| {
                game.frames_from(name).iter().any(|f| f.starts_with("40/tx,"))
            })
        })
        .await,
        "fleet never fully connected"
    );

    // Every connection observes the same round push
    game.broadcast(r#"42/tx,["new-session",{"id":41}]"#);

    // The plan lands in the book and every assignment is delivered
    assert!(
        wait_until(Duration::from_secs(10), || {
            let planned = fleet.book.assigned(41).len();
            planned > 0 && game.frames_matching(r#"42/tx,["bet""#).len() == planned
        })
        .await,
        "plan was not delivered"
    );

    // One claim process-wide, no matter how many observers
    assert_eq!(fleet.coordinator.claim(41), Claim::AlreadySeen);

    let bets = game.frames_matching(r#"42/tx,["bet""#);
    let mut senders: Vec<&str> = bets.iter().map(|(token, _)| token.as_str()).collect();
    senders.sort();
    let before = senders.len();
    senders.dedup();
    assert_eq!(senders.len(), before, "an account received two bets");

    for (_, frame) in &bets {
        let payload: serde_json::Value =
            serde_json::from_str(frame.strip_prefix("42/tx,").unwrap()).unwrap();
        let amount = payload[1]["amount"].as_i64().unwrap();
        assert!(amount > 0 && amount < 200_000, "bad amount {amount}");
    }

    // The next round settles the previous one after the grace delay
    game.broadcast(r#"42/tx,["new-session",{"id":42}]"#);
    assert!(
        wait_until(Duration::from_secs(10), || {
            fleet.coordinator.current_round() == Some(42)
                && fleet.book.assigned(41).is_empty()
        })
        .await,
        "previous round never settled"
    );

    fleet.shutdown_all().await;
}
