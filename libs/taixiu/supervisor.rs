//! Fleet supervisor
//!
//! Owns the shared services (CMS client, credential broker, registry,
//! round coordinator, bookkeeper, notifier) and runs the reconcile
//! loop: open sessions for accounts that should be playing, recycle
//! accounts whose tokens went bad, and wind everything down on Ctrl+C.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use linekeeper::Codec;
use tracing::{info, warn};

use crate::allocation::EngineOptions;
use crate::cms::{AccountStatus, CmsClient, UserRecord};
use crate::config::{self, SettingsSource};
use crate::connection::{session, ConnectionRegistry, SessionTiming};
use crate::credentials::CredentialBroker;
use crate::notify::Notifier;
use crate::rounds::{RoundCoordinator, SessionBook};
use crate::util::Shutdown;

/// Fleet-wide tunables; tests compress the durations
#[derive(Debug, Clone)]
pub struct FleetTuning {
    pub session: SessionTiming,
    pub engine: EngineOptions,
    /// Grace delay before a round's unconfirmed accounts are marked lost
    pub grace: Duration,
    /// Pause between reconcile passes
    pub reconcile_interval: Duration,
}

impl Default for FleetTuning {
    fn default() -> Self {
        Self {
            session: SessionTiming::default(),
            engine: EngineOptions::default(),
            grace: Duration::from_secs(10),
            reconcile_interval: Duration::from_secs(20),
        }
    }
}

/// Shared services and state behind the [`Fleet`] handle
pub struct FleetInner {
    pub settings: SettingsSource,
    pub cms: Arc<CmsClient>,
    pub broker: CredentialBroker,
    pub registry: ConnectionRegistry,
    pub coordinator: RoundCoordinator,
    pub book: SessionBook,
    pub notifier: Notifier,
    pub shutdown: Shutdown,
    pub tuning: FleetTuning,

    pub(crate) game_ws_url: String,
    pub(crate) game_host: String,
    pub(crate) game_port: u16,
    pub(crate) namespace: String,
    pub(crate) codec: Codec,
}

/// Cheaply cloneable handle to the fleet context
///
/// Every task in the process holds one of these; clones share the same
/// inner state.
#[derive(Clone)]
pub struct Fleet {
    inner: Arc<FleetInner>,
}

impl Deref for Fleet {
    type Target = FleetInner;

    fn deref(&self) -> &FleetInner {
        &self.inner
    }
}

impl Fleet {
    pub fn new(settings: SettingsSource) -> config::Result<Self> {
        Self::with_tuning(settings, FleetTuning::default())
    }

    /// Endpoints are fixed at startup; policy knobs are re-read from the
    /// settings file at every decision point.
    pub fn with_tuning(settings: SettingsSource, tuning: FleetTuning) -> config::Result<Self> {
        let loaded = settings.load()?;
        let cms = Arc::new(CmsClient::new(&loaded.cms_base_url));
        let broker = CredentialBroker::new(Arc::clone(&cms), loaded.login_url.clone());
        let notifier = Notifier::new(loaded.telegram.clone());
        let codec = Codec::new(&loaded.namespace);

        Ok(Self {
            inner: Arc::new(FleetInner {
                settings,
                cms,
                broker,
                registry: ConnectionRegistry::new(),
                coordinator: RoundCoordinator::new(tuning.grace),
                book: SessionBook::new(),
                notifier,
                shutdown: Shutdown::new(),
                game_ws_url: loaded.game_ws_url,
                game_host: loaded.game_host,
                game_port: loaded.game_port,
                namespace: loaded.namespace,
                codec,
                tuning,
            }),
        })
    }

    /// Open a session for an account that has none
    ///
    /// The per-username creation lock makes the check-install-spawn
    /// sequence atomic against concurrent creators of the same account.
    pub async fn connect(&self, account: UserRecord) {
        let username = account.username.clone();
        let lock = self.registry.creation_lock(&username);
        let _guard = lock.lock().await;

        if self.registry.contains(&username) {
            return;
        }
        info!("[{username}] opening connection");
        let handles = self.registry.install(&username);
        let conn_id = handles.conn_id;
        let task = tokio::spawn(session::run(self.clone(), account, handles));
        self.registry.set_task(&username, conn_id, task);
    }

    /// Replace whatever session the account has with a fresh one
    ///
    /// The superseded task notices the conn-id change and exits without
    /// teardown; the new entry owns the slot from the moment it lands.
    pub async fn force_reconnect(&self, account: UserRecord) {
        let username = account.username.clone();
        let lock = self.registry.creation_lock(&username);
        let _guard = lock.lock().await;

        info!("[{username}] force reconnect");
        let handles = self.registry.install(&username);
        let conn_id = handles.conn_id;
        let task = tokio::spawn(session::run(self.clone(), account, handles));
        self.registry.set_task(&username, conn_id, task);
    }

    /// Ask an account's session to close; its own teardown path runs
    pub fn disconnect(&self, username: &str) -> bool {
        self.registry.request_close(username)
    }

    /// Ask an account's session to refresh its balance snapshot
    pub fn poke(&self, username: &str) -> bool {
        self.registry.poke(username)
    }

    /// Run the reconcile loop until shutdown
    pub async fn run(&self) {
        self.shutdown.listen_for_ctrl_c();
        info!("supervisor started");

        while self.shutdown.is_running() {
            self.reconcile().await;
            self.shutdown
                .sleep_while_running(self.tuning.reconcile_interval)
                .await;
        }

        self.shutdown_all().await;
    }

    /// One reconcile pass against the CMS account list
    pub async fn reconcile(&self) {
        let users = match self.cms.users().await {
            Ok(users) => users,
            Err(e) => {
                warn!("reconcile skipped, account list unavailable: {e}");
                return;
            }
        };

        // Recycle connected accounts whose tokens the game rejected
        for record in &users {
            if record.has_status(AccountStatus::TokenFailed)
                && self.registry.contains(&record.username)
            {
                let username = &record.username;
                info!("[{username}] token flagged bad, recycling connection");
                self.disconnect(username);
                match self.broker.refresh(username).await {
                    Ok(_token) => {
                        if let Err(e) = self
                            .cms
                            .update_status(username, AccountStatus::Playing)
                            .await
                        {
                            warn!("[{username}] could not restore status: {e}");
                        }
                    }
                    Err(e) => warn!("[{username}] token refresh failed: {e}"),
                }
            }
        }

        // Open sessions for eligible accounts that have none
        for record in users {
            if record.has_status(AccountStatus::Playing)
                && !self.registry.contains(&record.username)
            {
                self.connect(record).await;
            }
        }
    }

    /// Close every session and wait for the tasks to drain
    pub async fn shutdown_all(&self) {
        info!(
            "closing {} connection(s)",
            self.registry.connection_count()
        );
        self.coordinator.abort_settlements();
        for task in self.registry.close_all() {
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                warn!("a session task did not stop in time");
            }
        }
        info!("supervisor stopped");
    }
}
