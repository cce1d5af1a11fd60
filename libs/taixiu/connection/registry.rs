//! The authoritative connection registry
//!
//! One entry per account that currently owns (or is acquiring) a
//! connection slot. Invariants:
//!
//! - at most one entry per username at any instant;
//! - the entry's `conn_id` is the sole arbiter of slot ownership: only
//!   the session task holding the matching id may clean up and remove
//!   the entry;
//! - create-or-replace for a username is serialized by a per-username
//!   async mutex, never by sentinel entries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::Command;

/// What a session task needs to run against its slot
pub struct SessionHandles {
    pub conn_id: u64,
    /// Outbound command queue, drained on each poll expiry
    pub outbound: Receiver<Command>,
    /// Set by `request_close`; the session exits through teardown
    pub closing: Arc<AtomicBool>,
    /// Set by `poke`; the session requests a fresh `your-info`
    pub poke: Arc<AtomicBool>,
}

struct ConnEntry {
    conn_id: u64,
    outbound_tx: Sender<Command>,
    outbound_rx: Receiver<Command>,
    closing: Arc<AtomicBool>,
    poke: Arc<AtomicBool>,
    /// The session task itself
    task: Option<JoinHandle<()>>,
    /// Pending delayed bet delivery; replaced, never accumulated
    bet_task: Option<JoinHandle<()>>,
    /// Supervised background work (event dispatches), pruned as it ends
    scheduled: Vec<JoinHandle<()>>,
}

impl ConnEntry {
    fn new(conn_id: u64) -> Self {
        let (outbound_tx, outbound_rx) = unbounded();
        Self {
            conn_id,
            outbound_tx,
            outbound_rx,
            closing: Arc::new(AtomicBool::new(false)),
            poke: Arc::new(AtomicBool::new(false)),
            task: None,
            bet_task: None,
            scheduled: Vec::new(),
        }
    }

    fn handles(&self) -> SessionHandles {
        SessionHandles {
            conn_id: self.conn_id,
            outbound: self.outbound_rx.clone(),
            closing: Arc::clone(&self.closing),
            poke: Arc::clone(&self.poke),
        }
    }

    /// Abort owned work and discard queued commands
    fn cancel_work(&mut self) {
        if let Some(bet) = self.bet_task.take() {
            bet.abort();
        }
        for handle in self.scheduled.drain(..) {
            handle.abort();
        }
        while self.outbound_rx.try_recv().is_ok() {}
    }
}

pub struct ConnectionRegistry {
    entries: RwLock<HashMap<String, ConnEntry>>,
    next_conn_id: AtomicU64,
    creation_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
            creation_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The per-username guard serializing create-or-replace
    pub fn creation_lock(&self, username: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.creation_locks.lock();
        Arc::clone(
            locks
                .entry(username.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Install a fresh entry for `username`, superseding any old one
    ///
    /// A replaced entry has its closing flag raised and its owned work
    /// aborted; its session task, having lost the conn-id race, exits
    /// without performing teardown bookkeeping.
    pub fn install(&self, username: &str) -> SessionHandles {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let entry = ConnEntry::new(conn_id);
        let handles = entry.handles();

        let mut entries = self.entries.write();
        if let Some(mut old) = entries.insert(username.to_string(), entry) {
            debug!(
                "[{username}] conn {} superseded by conn {conn_id}",
                old.conn_id
            );
            old.closing.store(true, Ordering::Release);
            old.cancel_work();
        }
        handles
    }

    /// Attach the session task handle to its entry
    pub fn set_task(&self, username: &str, conn_id: u64, task: JoinHandle<()>) {
        let mut entries = self.entries.write();
        match entries.get_mut(username) {
            Some(entry) if entry.conn_id == conn_id => entry.task = Some(task),
            // Slot already re-owned; the task will notice and exit
            _ => {}
        }
    }

    pub fn conn_id(&self, username: &str) -> Option<u64> {
        self.entries.read().get(username).map(|e| e.conn_id)
    }

    /// Whether `conn_id` still owns the slot for `username`
    pub fn is_current(&self, username: &str, conn_id: u64) -> bool {
        self.conn_id(username) == Some(conn_id)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.entries.read().contains_key(username)
    }

    pub fn connection_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Connected usernames, sorted for deterministic allocation order
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.entries.read().keys().cloned().collect();
        users.sort();
        users
    }

    /// Queue a command for delivery on the account's connection
    pub fn enqueue(&self, username: &str, command: Command) -> bool {
        let entries = self.entries.read();
        match entries.get(username) {
            Some(entry) => entry.outbound_tx.send(command).is_ok(),
            None => false,
        }
    }

    /// Ask the session to request a fresh balance snapshot
    pub fn poke(&self, username: &str) -> bool {
        let entries = self.entries.read();
        match entries.get(username) {
            Some(entry) => {
                entry.poke.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Consume a pending poke, owner-gated
    pub fn take_poke(&self, username: &str, conn_id: u64) -> bool {
        let entries = self.entries.read();
        match entries.get(username) {
            Some(entry) if entry.conn_id == conn_id => {
                entry.poke.swap(false, Ordering::AcqRel)
            }
            _ => false,
        }
    }

    /// Request a cooperative close; teardown happens in the session
    pub fn request_close(&self, username: &str) -> bool {
        let entries = self.entries.read();
        match entries.get(username) {
            Some(entry) => {
                entry.closing.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Replace the account's pending bet delivery task
    pub fn set_bet_task(&self, username: &str, task: JoinHandle<()>) {
        let mut entries = self.entries.write();
        match entries.get_mut(username) {
            Some(entry) => {
                if let Some(old) = entry.bet_task.replace(task) {
                    old.abort();
                }
            }
            None => task.abort(),
        }
    }

    /// Supervise a background task under the account's entry
    ///
    /// Finished handles are pruned on each call so long-lived sessions
    /// do not hoard them. If the slot has moved on the task is left to
    /// finish detached; dispatch work is short-lived.
    pub fn track(&self, username: &str, conn_id: u64, task: JoinHandle<()>) {
        let mut entries = self.entries.write();
        match entries.get_mut(username) {
            Some(entry) if entry.conn_id == conn_id => {
                entry.scheduled.retain(|h| !h.is_finished());
                entry.scheduled.push(task);
            }
            _ => {}
        }
    }

    /// Owner-gated teardown: cancel owned work, drain the queue, free
    /// the slot
    ///
    /// Idempotent and race-free: whichever of natural exit, requested
    /// close, or supersession gets here first with the matching id does
    /// the cleanup exactly once; everyone else is a no-op.
    pub fn release_if_owner(&self, username: &str, conn_id: u64) -> bool {
        let mut entries = self.entries.write();
        let owned = matches!(entries.get(username), Some(entry) if entry.conn_id == conn_id);
        if !owned {
            return false;
        }
        if let Some(mut entry) = entries.remove(username) {
            entry.cancel_work();
        }
        true
    }

    /// Raise every closing flag and take the session task handles
    pub fn close_all(&self) -> Vec<JoinHandle<()>> {
        let mut entries = self.entries.write();
        let mut tasks = Vec::new();
        for entry in entries.values_mut() {
            entry.closing.store(true, Ordering::Release);
            if let Some(task) = entry.task.take() {
                tasks.push(task);
            }
        }
        tasks
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
