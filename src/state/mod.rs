pub mod match_machine;
pub mod scoring;
pub mod tournament;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig, dao::tournament_store::TournamentStore, error::ServiceError,
    state::tournament::Tournament,
};

pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push messages to a connected client socket.
pub struct ClientConnection {
    /// Identity backing this connection.
    pub user_id: Uuid,
    /// Writer-task channel for outbound frames.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state storing persistent connections and database handles.
pub struct AppState {
    config: AppConfig,
    store: RwLock<Option<Arc<dyn TournamentStore>>>,
    connections: DashMap<Uuid, ClientConnection>,
    tournament: RwLock<Tournament>,
    degraded: watch::Sender<bool>,
    command_gate: Mutex<()>,
    bootstrapped: AtomicBool,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let tournament = Tournament::bootstrap(&config);
        Arc::new(Self {
            config,
            store: RwLock::new(None),
            connections: DashMap::new(),
            tournament: RwLock::new(tournament),
            degraded: degraded_tx,
            command_gate: Mutex::new(()),
            bootstrapped: AtomicBool::new(false),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current tournament store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn TournamentStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain a handle to the current tournament store, or fail because the
    /// application is degraded.
    pub async fn require_store(&self) -> Result<Arc<dyn TournamentStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new tournament store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn TournamentStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current tournament store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Registry of active client sockets keyed by their connection identifier.
    pub fn connections(&self) -> &DashMap<Uuid, ClientConnection> {
        &self.connections
    }

    /// Shared tournament arena.
    pub fn tournament(&self) -> &RwLock<Tournament> {
        &self.tournament
    }

    /// Serialization gate: every client command and deferred cascade runs
    /// under this lock, so commands observe and mutate the arena atomically.
    pub fn command_gate(&self) -> &Mutex<()> {
        &self.command_gate
    }

    /// Flip the one-shot bootstrap flag; true exactly once, on the first call.
    pub fn mark_bootstrapped(&self) -> bool {
        !self.bootstrapped.swap(true, Ordering::SeqCst)
    }

    /// Re-arm the bootstrap flag after a failed restore so the next storage
    /// connection retries it.
    pub fn clear_bootstrapped(&self) {
        self.bootstrapped.store(false, Ordering::SeqCst);
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        let _ = self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}
