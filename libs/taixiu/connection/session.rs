//! One account's connection lifecycle
//!
//! `DISCONNECTED -> PROXY_CHECKING -> AUTHENTICATING -> CONNECTED ->
//! (HEARTBEATING <-> DRAINING) -> CLOSING -> DISCONNECTED`, driven as a
//! single task per account. The task re-checks slot ownership on every
//! iteration and at every wait; losing the conn-id race means exiting
//! immediately and leaving teardown to the new owner. Proxy and token
//! failures are terminal for the attempt and surface as CMS status
//! changes; mid-stream failures just end the task and the supervisor
//! opens a fresh session on its next pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use linekeeper::core::frame::{self, Frame, KEEPALIVE_ACK};
use linekeeper::core::net::{self, ProxyAddr, WsStream};
use linekeeper::traits::backoff::BackoffSchedule;
use linekeeper::{LineError, PingWatchdog};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::cms::{AccountStatus, UserRecord};
use crate::credentials;
use crate::events::{self, Command};
use crate::supervisor::Fleet;

use super::registry::SessionHandles;

/// How a session left its loop without erroring
#[derive(Debug)]
enum ExitReason {
    /// A newer connection owns the slot; no teardown on this side
    Superseded,
    /// A cooperative close was requested
    Closed,
    /// Nothing heard inside the dead-air bound
    DeadAir,
}

/// Run one account's session to completion
pub(crate) async fn run(fleet: Fleet, account: UserRecord, handles: SessionHandles) {
    let username = account.username.clone();
    let conn_id = handles.conn_id;
    debug!("[{username}] session starting (conn {conn_id})");

    match drive(&fleet, &account, &handles).await {
        Ok(ExitReason::Superseded) => {
            debug!("[{username}] superseded, leaving teardown to the new owner");
        }
        Ok(reason) => info!("[{username}] session ended: {reason:?}"),
        Err(e) => {
            match &e {
                LineError::Proxy(_) | LineError::ProxyFormat(_) | LineError::Timeout(_) => {
                    warn!("[{username}] proxy failure: {e}");
                    if let Err(e) = fleet.cms.update_status(&username, AccountStatus::ProxyFailed).await {
                        warn!("[{username}] could not record proxy failure: {e}");
                    }
                }
                LineError::Token(_) => {
                    warn!("[{username}] auth failure: {e}");
                    if let Err(e) = fleet.cms.update_status(&username, AccountStatus::TokenFailed).await {
                        warn!("[{username}] could not record token failure: {e}");
                    }
                }
                _ => warn!("[{username}] session error: {e}"),
            }
        }
    }

    // Idempotent, owner-gated: a superseded task matches nothing here,
    // and the second of two racing closers finds the slot already gone.
    if fleet.registry.release_if_owner(&username, conn_id) {
        debug!("[{username}] slot released (conn {conn_id})");
    }
}

async fn drive(
    fleet: &Fleet,
    account: &UserRecord,
    handles: &SessionHandles,
) -> linekeeper::Result<ExitReason> {
    let username = &account.username;
    let conn_id = handles.conn_id;
    let timing = &fleet.tuning.session;

    if !fleet.registry.is_current(username, conn_id) {
        return Ok(ExitReason::Superseded);
    }

    // ----- proxy check -----
    let proxy = match account.proxy.as_deref() {
        Some(raw) => Some(ProxyAddr::parse(raw)?),
        None => None,
    };

    if let Some(proxy) = &proxy {
        let mut reached = false;
        let mut attempt = 0;
        while let Some(delay) = timing.proxy_backoff.delay(attempt) {
            attempt += 1;
            if !delay.is_zero() && !pause(fleet, username, conn_id, &handles.closing, delay).await {
                return Ok(ExitReason::Closed);
            }
            if !fleet.registry.is_current(username, conn_id) {
                return Ok(ExitReason::Superseded);
            }
            match net::probe(
                proxy,
                (fleet.game_host.as_str(), fleet.game_port),
                timing.probe_budget,
            )
            .await
            {
                Ok(()) => {
                    info!("[{username}] proxy reachable (attempt {attempt})");
                    reached = true;
                    break;
                }
                Err(e) => warn!("[{username}] proxy probe failed (attempt {attempt}): {e}"),
            }
        }
        if !reached {
            return Err(LineError::Proxy("probe ladder exhausted".into()));
        }
    }

    // ----- authenticate -----
    let mut token = account.jwt.clone().unwrap_or_default();
    let cached_ok = !token.is_empty()
        && credentials::validate_token(
            &fleet.game_ws_url,
            &fleet.namespace,
            &token,
            proxy.as_ref(),
            timing.token_budget,
        )
        .await;

    if !cached_ok {
        warn!("[{username}] cached token rejected, refreshing");
        let mut fresh = None;
        for attempt in 1..=timing.refresh_attempts {
            if handles.closing.load(Ordering::Acquire) {
                return Ok(ExitReason::Closed);
            }
            match fleet.broker.refresh(username).await {
                Ok(new_token) => {
                    fresh = Some(new_token);
                    break;
                }
                Err(e) => warn!("[{username}] token refresh attempt {attempt} failed: {e}"),
            }
        }
        token = fresh.ok_or_else(|| LineError::Token("refresh attempts exhausted".into()))?;
    }

    // ----- connect and stream -----
    let ws = match &proxy {
        Some(p) => net::connect_via_proxy(&fleet.game_ws_url, p).await?,
        None => net::connect_direct(&fleet.game_ws_url).await?,
    };

    stream_loop(fleet, username, conn_id, handles, ws, &token).await
}

async fn stream_loop(
    fleet: &Fleet,
    username: &str,
    conn_id: u64,
    handles: &SessionHandles,
    mut ws: WsStream,
    token: &str,
) -> linekeeper::Result<ExitReason> {
    let timing = &fleet.tuning.session;

    // Swallow the transport greeting, then authenticate the namespace
    let _ = tokio::time::timeout(timing.greeting_budget, ws.next()).await;
    ws.send(Message::Text(fleet.codec.auth(token)))
        .await
        .map_err(|e| LineError::Handshake(format!("auth send: {e}")))?;
    info!("[{username}] connected (conn {conn_id})");

    let mut watchdog = PingWatchdog::new(timing.keepalive_horizon, timing.dead_air_horizon);

    loop {
        if handles.closing.load(Ordering::Acquire) {
            let _ = ws.close(None).await;
            return Ok(ExitReason::Closed);
        }
        if !fleet.registry.is_current(username, conn_id) {
            return Ok(ExitReason::Superseded);
        }
        if watchdog.dead_air() {
            warn!(
                "[{username}] silent for {:?}, tearing down for reconnect",
                timing.dead_air_horizon
            );
            let _ = ws.close(None).await;
            return Ok(ExitReason::DeadAir);
        }
        if watchdog.ack_due() {
            // No server ping inside the horizon: volunteer the ack so
            // the server side does not expire the session.
            debug!("[{username}] volunteering keepalive ack");
            send_text(&mut ws, KEEPALIVE_ACK.to_string()).await?;
            watchdog.note_keepalive();
        }
        if fleet.registry.take_poke(username, conn_id) {
            debug!("[{username}] poked, requesting your-info");
            send_text(&mut ws, Command::RequestInfo.encode(&fleet.codec)).await?;
        }

        match tokio::time::timeout(timing.poll, ws.next()).await {
            // Quiet poll window: push out whatever is queued
            Err(_elapsed) => {
                while let Ok(command) = handles.outbound.try_recv() {
                    let frame = command.encode(&fleet.codec);
                    debug!("[{username}] -> {frame}");
                    send_text(&mut ws, frame).await?;
                }
            }
            Ok(None) => return Err(LineError::Closed("stream ended".into())),
            Ok(Some(Err(e))) => return Err(LineError::Transport(e.to_string())),
            Ok(Some(Ok(message))) => {
                watchdog.note_message();
                match message {
                    Message::Text(text) => match fleet.codec.decode(&text) {
                        Frame::Keepalive => {
                            send_text(&mut ws, KEEPALIVE_ACK.to_string()).await?;
                            watchdog.note_keepalive();
                        }
                        Frame::Event(payload) => match frame::parse_event(payload) {
                            Ok((name, data)) => {
                                let event = events::decode_event(&name, &data);
                                // Handlers run detached so a slow CMS
                                // cannot stall the receive loop.
                                let task = tokio::spawn(events::dispatch(
                                    fleet.clone(),
                                    username.to_string(),
                                    event,
                                ));
                                fleet.registry.track(username, conn_id, task);
                            }
                            Err(e) => warn!("[{username}] undecodable event: {e}"),
                        },
                        Frame::Open(_) | Frame::Connected(_) | Frame::KeepaliveAck => {}
                        Frame::Other(raw) => debug!("[{username}] unhandled frame: {raw}"),
                    },
                    Message::Close(_) => {
                        return Err(LineError::Closed("server close frame".into()))
                    }
                    // Control frames are answered by the transport layer
                    _ => {}
                }
            }
        }
    }
}

async fn send_text(ws: &mut WsStream, text: String) -> linekeeper::Result<()> {
    ws.send(Message::Text(text))
        .await
        .map_err(|e| LineError::Transport(e.to_string()))
}

/// Sleep in short slices, bailing out on close or supersession
///
/// Returns false when the wait was interrupted and the caller should
/// stop what it is doing.
async fn pause(
    fleet: &Fleet,
    username: &str,
    conn_id: u64,
    closing: &Arc<AtomicBool>,
    duration: Duration,
) -> bool {
    let slice = Duration::from_millis(100);
    let mut elapsed = Duration::ZERO;
    while elapsed < duration {
        if closing.load(Ordering::Acquire) || !fleet.registry.is_current(username, conn_id) {
            return false;
        }
        let step = slice.min(duration - elapsed);
        tokio::time::sleep(step).await;
        elapsed += step;
    }
    !closing.load(Ordering::Acquire)
}
