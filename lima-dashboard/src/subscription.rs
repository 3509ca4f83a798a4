//! Subscription lifecycle manager
//!
//! Keeps exactly one live subscription open while a session is present.
//! Everything that belongs to a session (local view, profile cache,
//! classifier state, alert de-duplication) is created when the subscription
//! opens and dropped when it closes; nothing survives a session change.
//!
//! Opening always tears down the previous subscription first and waits for
//! its stream task to finish, so two subscriptions are never live at once.

use std::sync::Arc;
use std::time::Duration;

use lima_common::events::{DashboardEvent, EventBus};
use lima_common::DashboardConfig;
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::classifier::{ChangeClassifier, LocalView, NormalizedBatch};
use crate::display::RecordSummary;
use crate::error::{Result, SyncError};
use crate::filter::filter;
use crate::model::{NewRecord, Record, ViewFilter};
use crate::normalizer::normalize;
use crate::notifier::Notifier;
use crate::profiles::ProfileCache;
use crate::store::{LiveSubscription, MemoryStore, ProfileSource, RecordStore, RecordWriter};

/// Session identity as published by the authenticator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSignal {
    pub session_id: Option<String>,
    /// Session resolution still in progress; transitions are ignored meanwhile
    pub loading: bool,
}

impl SessionSignal {
    pub fn signed_in(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            loading: false,
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn loading() -> Self {
        Self {
            session_id: None,
            loading: true,
        }
    }
}

/// Engine knobs taken from [`DashboardConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub notification_duration: Duration,
    pub fallback_id_len: usize,
    /// Bound on each profile lookup; a batch never waits longer than this
    pub profile_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&DashboardConfig::default())
    }
}

impl From<&DashboardConfig> for EngineSettings {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            notification_duration: config.notification_duration(),
            fallback_id_len: config.fallback_id_len,
            profile_timeout: config.profile_timeout(),
        }
    }
}

/// UI-facing engine state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStatus {
    pub session_id: Option<String>,
    /// True from subscription open until the initial batch is classified
    pub is_synchronizing: bool,
    pub record_count: usize,
    pub last_error: Option<String>,
    pub configuration_error: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    view: LocalView,
    is_synchronizing: bool,
    last_error: Option<SyncError>,
}

/// State owned by one session's subscription
struct SessionShared<P> {
    session_id: String,
    profiles: ProfileCache<P>,
    state: RwLock<SessionState>,
}

struct ActiveSubscription<P> {
    shared: Arc<SessionShared<P>>,
    cancel: CancellationToken,
    /// `None` when the subscription failed to open
    task: Option<JoinHandle<()>>,
}

/// Live view synchronization engine for one dashboard client
pub struct SubscriptionManager<S, P> {
    store: Arc<S>,
    profile_source: Arc<P>,
    bus: EventBus,
    settings: EngineSettings,
    active: Mutex<Option<ActiveSubscription<P>>>,
}

/// Engine over the in-process store
pub type DashboardEngine = SubscriptionManager<MemoryStore, MemoryStore>;

impl<S, P> SubscriptionManager<S, P>
where
    S: RecordStore + RecordWriter,
    P: ProfileSource,
{
    pub fn new(store: Arc<S>, profile_source: Arc<P>, bus: EventBus, settings: EngineSettings) -> Self {
        Self {
            store,
            profile_source,
            bus,
            settings,
            active: Mutex::new(None),
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// React to a session signal
    ///
    /// Only identity transitions open or close the subscription; repeating
    /// the current identity is a no-op.
    pub async fn session_changed(&self, signal: &SessionSignal) -> Result<()> {
        if signal.loading {
            debug!("Session still resolving; keeping current subscription");
            return Ok(());
        }

        let current = self.current_session_id().await;
        match (&signal.session_id, current) {
            (Some(new), Some(old)) if *new == old => Ok(()),
            (Some(new), _) => self.open(new).await,
            (None, Some(_)) => {
                self.close().await;
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    /// Open the live subscription for `session_id`, closing any previous one
    ///
    /// On failure the session stays current with an empty view and the
    /// error in [`EngineStatus::last_error`]; nothing retries until the next
    /// session change or [`refresh`](Self::refresh).
    pub async fn open(&self, session_id: &str) -> Result<()> {
        let mut active = self.active.lock().await;
        self.teardown(&mut active).await;

        info!("Opening live subscription for session {}", session_id);
        let shared = Arc::new(SessionShared {
            session_id: session_id.to_string(),
            profiles: ProfileCache::new(Arc::clone(&self.profile_source), self.settings.profile_timeout),
            state: RwLock::new(SessionState {
                is_synchronizing: true,
                ..SessionState::default()
            }),
        });
        let cancel = CancellationToken::new();

        let live = match self.store.subscribe_live().await {
            Ok(live) => live,
            Err(e) => {
                let err = SyncError::from_query(e);
                self.record_open_failure(&shared, &err).await;
                *active = Some(ActiveSubscription {
                    shared,
                    cancel,
                    task: None,
                });
                return Err(err);
            }
        };

        self.bus.emit_lossy(DashboardEvent::SubscriptionOpened {
            session_id: session_id.to_string(),
            timestamp: lima_common::time::now(),
        });

        let notifier = Notifier::new(
            self.bus.clone(),
            self.settings.notification_duration,
            self.settings.fallback_id_len,
        );
        let task = tokio::spawn(stream_loop(
            Arc::clone(&shared),
            live,
            cancel.clone(),
            notifier,
            self.bus.clone(),
        ));

        *active = Some(ActiveSubscription {
            shared,
            cancel,
            task: Some(task),
        });
        Ok(())
    }

    /// Close the subscription and discard all session state
    pub async fn close(&self) {
        let mut active = self.active.lock().await;
        self.teardown(&mut active).await;
    }

    /// Reopen the subscription for the current session
    pub async fn refresh(&self) -> Result<()> {
        match self.current_session_id().await {
            Some(session_id) => self.open(&session_id).await,
            None => Err(SyncError::NoSession),
        }
    }

    /// Follow the session signal until its sender is dropped
    pub async fn run(&self, mut session_rx: watch::Receiver<SessionSignal>) {
        loop {
            let signal = session_rx.borrow_and_update().clone();
            if let Err(e) = self.session_changed(&signal).await {
                warn!("Session transition left the view empty: {}", e);
            }
            if session_rx.changed().await.is_err() {
                break;
            }
        }
        info!("Session signal closed; shutting down subscription");
        self.close().await;
    }

    pub async fn status(&self) -> EngineStatus {
        let Some(shared) = self.shared().await else {
            return EngineStatus::default();
        };
        let state = shared.state.read().await;
        EngineStatus {
            session_id: Some(shared.session_id.clone()),
            is_synchronizing: state.is_synchronizing,
            record_count: state.view.len(),
            last_error: state.last_error.as_ref().map(ToString::to_string),
            configuration_error: state
                .last_error
                .as_ref()
                .is_some_and(SyncError::is_configuration),
        }
    }

    /// Read-only copy of the live view (empty without a session)
    pub async fn view_snapshot(&self) -> LocalView {
        match self.shared().await {
            Some(shared) => shared.state.read().await.view.clone(),
            None => LocalView::new(),
        }
    }

    /// Filter view over the current live view
    pub async fn filtered(&self, criteria: &ViewFilter) -> Vec<Record> {
        match self.shared().await {
            Some(shared) => filter(&shared.state.read().await.view, criteria),
            None => Vec::new(),
        }
    }

    /// Card summaries using whatever the profile cache holds
    pub async fn summarize(&self, records: &[Record]) -> Vec<RecordSummary> {
        let shared = self.shared().await;
        let mut summaries = Vec::with_capacity(records.len());
        for record in records {
            let name = match &shared {
                Some(shared) => shared
                    .profiles
                    .cached(record.submitter_id())
                    .await
                    .flatten()
                    .map(|p| p.display_name),
                None => None,
            };
            summaries.push(RecordSummary::new(record, name));
        }
        summaries
    }

    /// Record detail; a pending record is marked viewed in the store
    ///
    /// The returned record is the local copy as it stands. The viewed state
    /// shows up once the store delivers the modification.
    pub async fn open_record(&self, id: &str) -> Result<Record> {
        let shared = self.shared().await.ok_or(SyncError::NoSession)?;
        let record = shared
            .state
            .read()
            .await
            .view
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;

        if record.is_pending() {
            debug!("Marking {} as viewed", id);
            if let Err(e) = self.store.mark_viewed(id).await {
                warn!("Failed to mark {} as viewed: {}", id, SyncError::from_write(e));
            }
        }
        Ok(record)
    }

    /// Move a record to the archived partition
    pub async fn archive(&self, id: &str) -> Result<()> {
        if self.shared().await.is_none() {
            return Err(SyncError::NoSession);
        }
        info!("Archiving record {}", id);
        self.store.archive(id).await.map_err(SyncError::from_write)
    }

    /// Submit a new record; it appears through the live query like any other
    pub async fn create_record(&self, draft: NewRecord) -> Result<String> {
        let id = self
            .store
            .create_record(draft)
            .await
            .map_err(SyncError::from_write)?;
        info!("Created record {}", id);
        Ok(id)
    }

    /// One-shot query of the archived partition, newest first
    pub async fn load_history(&self) -> Result<Vec<Record>> {
        let shared = self.shared().await.ok_or(SyncError::NoSession)?;
        let documents = self
            .store
            .fetch_archived()
            .await
            .map_err(SyncError::from_query)?;

        let history: LocalView = documents
            .iter()
            .filter_map(|doc| match normalize(doc) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping archived document: {}", e);
                    None
                }
            })
            .filter(|record| record.envelope.archived)
            .collect();

        shared
            .profiles
            .resolve_batch(history.records().map(Record::submitter_id))
            .await;

        debug!("Loaded {} archived records", history.len());
        Ok(history.ordered().into_iter().cloned().collect())
    }

    async fn current_session_id(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|a| a.shared.session_id.clone())
    }

    async fn shared(&self) -> Option<Arc<SessionShared<P>>> {
        self.active.lock().await.as_ref().map(|a| Arc::clone(&a.shared))
    }

    async fn teardown(&self, active: &mut Option<ActiveSubscription<P>>) {
        let Some(previous) = active.take() else {
            return;
        };
        info!("Closing live subscription for session {}", previous.shared.session_id);
        previous.cancel.cancel();
        if let Some(task) = previous.task {
            if let Err(e) = task.await {
                error!("Subscription task for {} ended abnormally: {}", previous.shared.session_id, e);
            }
        }
        self.bus.emit_lossy(DashboardEvent::SubscriptionClosed {
            session_id: previous.shared.session_id.clone(),
            timestamp: lima_common::time::now(),
        });
    }

    async fn record_open_failure(&self, shared: &SessionShared<P>, err: &SyncError) {
        {
            let mut state = shared.state.write().await;
            state.is_synchronizing = false;
            state.last_error = Some(err.clone());
        }

        let session_id = shared.session_id.clone();
        let message = err.to_string();
        let timestamp = lima_common::time::now();
        if err.is_configuration() {
            error!("Live query is not configured on the store: {}", message);
            self.bus.emit_lossy(DashboardEvent::ConfigurationError {
                session_id,
                message,
                timestamp,
            });
        } else {
            error!("Failed to open live subscription: {}", message);
            self.bus.emit_lossy(DashboardEvent::SubscriptionError {
                session_id,
                message,
                timestamp,
            });
        }
    }
}

/// Apply snapshots in delivery order until cancelled or the store ends the stream
async fn stream_loop<P: ProfileSource>(
    shared: Arc<SessionShared<P>>,
    mut live: LiveSubscription,
    cancel: CancellationToken,
    mut notifier: Notifier,
    bus: EventBus,
) {
    let mut classifier = ChangeClassifier::new();

    loop {
        let snapshot = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = live.next_snapshot() => match next {
                Some(snapshot) => snapshot,
                None => {
                    warn!("Store ended the live query for session {}", shared.session_id);
                    break;
                }
            },
        };

        let batch = NormalizedBatch::from_snapshot(&snapshot);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = shared.profiles.resolve_batch(batch.submitter_ids()) => {}
        }
        if cancel.is_cancelled() {
            break;
        }

        let (notifiable, is_initial, stats, record_count) = {
            let mut state = shared.state.write().await;
            let classified = classifier.apply(&state.view, batch);
            state.view = classified.view;
            if classified.is_initial {
                state.is_synchronizing = false;
            }
            (
                classified.notifiable,
                classified.is_initial,
                classified.stats,
                state.view.len(),
            )
        };

        for record in &notifiable {
            let profile = shared.profiles.cached(record.submitter_id()).await.flatten();
            notifier.notify(record, profile.as_ref());
        }

        let timestamp = lima_common::time::now();
        if is_initial {
            info!(
                "Initial load for session {}: {} records",
                shared.session_id, record_count
            );
            bus.emit_lossy(DashboardEvent::InitialLoadComplete {
                session_id: shared.session_id.clone(),
                record_count,
                timestamp,
            });
        } else {
            debug!(
                "Batch for session {}: +{} ~{} -{} ({} redelivered)",
                shared.session_id, stats.added, stats.modified, stats.removed, stats.redelivered
            );
            bus.emit_lossy(DashboardEvent::ViewUpdated {
                session_id: shared.session_id.clone(),
                record_count,
                added: stats.added,
                modified: stats.modified,
                removed: stats.removed,
                timestamp,
            });
        }
    }

    live.close();
    debug!("Stream task for session {} finished", shared.session_id);
}
