//! Polling controller
//!
//! Keeps the published snapshot fresh. Once data has been shown it is never
//! replaced by an empty set or an error: failed refreshes keep the previous
//! snapshot and stay silent.
//!
//! ```text
//! Bootstrapping ──cache hit──▶ Ready ◀──ok── RefreshFailed
//!       │                        │ ──err──▶      ▲
//!       └──cache miss──▶ Loading ┴──err──────────┘
//! ```

use crate::{
    cache::{FileStorage, SnapshotCache},
    client::ResilientClient,
    config::{clamp_refresh_interval, SyncConfig},
    constants::EMPTY_CACHE_ERROR_MESSAGE,
    endpoint::Service,
    error::{FetchError, SyncError},
    metrics::{MetricsCollector, RefreshMetrics},
    normalize::normalize,
    store::SnapshotStore,
    transports::HttpTransport,
    types::{ComponentHealth, HealthStatus, SyncEvent, SyncPhase, SyncState},
};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Shared state behind the controller handle and its spawned tasks
struct Inner {
    client: Arc<ResilientClient>,
    cache: SnapshotCache,
    store: SnapshotStore,
    metrics: MetricsCollector,
    stopped: AtomicBool,
    /// Bumped by every `start`; a subscription only stops its own start
    generation: AtomicU64,
    /// Manual refreshes currently in flight; `loading` stays on while > 0
    manual_in_flight: AtomicUsize,
    /// Serializes cache write + state swap so the cache mirrors `data`,
    /// and orders them against `stop`
    apply_lock: Mutex<()>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Owner of the market snapshot and its refresh timer
///
/// Cheap to clone; all clones drive the same state.
///
/// # Example
/// ```no_run
/// use coinwatch_sdk::{PollingController, SyncConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let controller = PollingController::from_config(&SyncConfig::from_env())?;
/// let mut subscription = controller.start(std::time::Duration::from_secs(5));
///
/// while let Some(state) = subscription.changed().await {
///     println!("{} pairs, loading={}", state.data.len(), state.loading);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PollingController {
    inner: Arc<Inner>,
}

impl PollingController {
    /// Creates a controller with the reqwest transport and file-backed cache
    pub fn from_config(config: &SyncConfig) -> Result<Self, FetchError> {
        let transport = Arc::new(HttpTransport::with_options(
            config.request_timeout,
            &config.user_agent,
        )?);
        let client = Arc::new(ResilientClient::new(Service::Gate, transport, config));
        let cache = SnapshotCache::new(Arc::new(FileStorage::new(&config.cache_dir)));
        Ok(Self::new(client, cache))
    }

    /// Creates a controller from its collaborators
    ///
    /// Nothing is read or fetched until `start`.
    pub fn new(client: Arc<ResilientClient>, cache: SnapshotCache) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                cache,
                store: SnapshotStore::default(),
                metrics: MetricsCollector::new(),
                stopped: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                manual_in_flight: AtomicUsize::new(0),
                apply_lock: Mutex::new(()),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Seeds from the cache, fetches immediately, then every `interval`
    ///
    /// Dropping the returned subscription (or calling `stop`) cancels the
    /// timer. Calling `start` again restarts the timer with the new interval;
    /// from then on only the newest subscription stops it when dropped.
    ///
    /// Intervals shorter than `MIN_REFRESH_INTERVAL_MS` are raised to it.
    #[must_use = "dropping the subscription stops polling immediately"]
    pub fn start(&self, interval: Duration) -> Subscription {
        let inner = &self.inner;
        let interval = clamp_refresh_interval(interval);
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.stopped.store(false, Ordering::SeqCst);

        let cached = inner.cache.load();
        inner.store.update(|state| {
            if let Some(snapshot) = cached {
                if !snapshot.is_empty() {
                    state.data = snapshot;
                }
            }
            if state.data.is_empty() {
                state.loading = true;
                state.phase = SyncPhase::Loading;
            } else {
                state.loading = false;
                state.phase = SyncPhase::Ready;
            }
        });

        // Subscribe before the first tick so the startup fetch is observable.
        let subscription = Subscription {
            state: inner.store.subscribe(),
            events: inner.store.subscribe_events(),
            controller: self.clone(),
            generation,
        };

        tracing::info!(
            refresh_interval_ms = interval.as_millis() as u64,
            cached_pairs = inner.store.current().data.len(),
            environment = ?inner.client.environment(),
            "Starting ticker polling"
        );

        let task_inner = inner.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if task_inner.stopped.load(Ordering::SeqCst) {
                    break;
                }
                // Each tick runs on its own task: a slow refresh may overlap
                // the next one, and the later completion wins.
                let tick_inner = task_inner.clone();
                tokio::spawn(async move {
                    if let Err(e) = tick_inner.refresh(false).await {
                        tracing::debug!(error = %e, "Scheduled refresh did not update data");
                    }
                });
            }
        });

        if let Some(previous) = inner.lock_timer().replace(handle) {
            previous.abort();
        }

        subscription
    }

    /// Cancels the timer; in-flight refreshes finish but are discarded
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_running(&self) -> bool {
        !self.inner.stopped.load(Ordering::SeqCst) && self.inner.lock_timer().is_some()
    }

    /// Out-of-band refresh (pull-to-refresh)
    ///
    /// Toggles `loading` for its duration and leaves the timer schedule alone.
    pub async fn refresh_now(&self) -> Result<(), SyncError> {
        self.inner.refresh(true).await
    }

    /// Current published state
    pub fn state(&self) -> SyncState {
        self.inner.store.current()
    }

    /// Watch receiver over the published state
    pub fn watch(&self) -> watch::Receiver<SyncState> {
        self.inner.store.subscribe()
    }

    /// Receiver of discrete sync events
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.store.subscribe_events()
    }

    pub fn client(&self) -> &Arc<ResilientClient> {
        &self.inner.client
    }

    /// Refresh latency percentiles, success rate, and route counters
    pub async fn metrics(&self) -> RefreshMetrics {
        self.inner
            .metrics
            .get_metrics(self.inner.client.route_stats())
            .await
    }

    /// Perform a health check on the controller
    pub async fn health_check(&self) -> ComponentHealth {
        let state = self.state();
        let metrics = self.metrics().await;
        let mut details = std::collections::HashMap::new();

        details.insert("pairs".to_string(), serde_json::json!(state.data.len()));
        details.insert("phase".to_string(), serde_json::json!(state.phase));
        details.insert(
            "prefers_proxy".to_string(),
            serde_json::json!(self.inner.client.prefers_proxy()),
        );
        details.insert(
            "success_rate".to_string(),
            serde_json::json!(metrics.success_rate),
        );
        if let Some(at) = state.last_updated {
            details.insert("last_updated".to_string(), serde_json::json!(at));
        }

        let status = if state.data.is_empty() {
            HealthStatus::Unhealthy
        } else if state.phase == SyncPhase::RefreshFailed {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let message = match status {
            HealthStatus::Healthy => "Ticker snapshot is fresh".to_string(),
            HealthStatus::Degraded => format!(
                "Serving retained snapshot after failed refresh: {}",
                state.last_failure.as_deref().unwrap_or("unknown")
            ),
            HealthStatus::Unhealthy => "No ticker data available".to_string(),
        };

        ComponentHealth {
            name: "ticker_sync".to_string(),
            status,
            message: Some(message),
            details,
            last_checked: Utc::now(),
        }
    }
}

impl Inner {
    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.lock_timer().take() {
            handle.abort();
        }
        // A refresh holding the lock finishes applying first; any later one
        // sees `stopped` and backs off.
        let _guard = self.lock_apply();
        self.store.update(|state| {
            state.loading = false;
            state.phase = SyncPhase::Stopped;
        });
        tracing::info!("Stopped ticker polling");
    }

    /// Stops only if no newer `start` has happened since `generation`
    fn stop_generation(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.stop();
        } else {
            tracing::debug!(generation, "Ignoring stop from superseded subscription");
        }
    }

    fn lock_apply(&self) -> std::sync::MutexGuard<'_, ()> {
        self.apply_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Drops an outcome that arrived after `stop`, undoing its `loading`
    fn discard(&self, manual_left: usize) -> SyncError {
        tracing::debug!("Discarding refresh outcome after stop");
        self.store.update(|state| state.loading = manual_left > 0);
        SyncError::Stopped
    }

    /// One fetch → normalize → publish cycle
    async fn refresh(&self, manual: bool) -> Result<(), SyncError> {
        if self.is_stopped() {
            return Err(SyncError::Stopped);
        }

        if manual {
            self.manual_in_flight.fetch_add(1, Ordering::SeqCst);
            self.store.update(|state| state.loading = true);
        }

        let started = Instant::now();
        let outcome = self.client.fetch_tickers().await;
        let elapsed = started.elapsed();

        let manual_left = if manual {
            self.manual_in_flight.fetch_sub(1, Ordering::SeqCst) - 1
        } else {
            self.manual_in_flight.load(Ordering::SeqCst)
        };

        if self.is_stopped() {
            return Err(self.discard(manual_left));
        }

        self.metrics.record_refresh(elapsed, outcome.is_ok()).await;

        match outcome {
            Ok(raw) => {
                let snapshot = normalize(raw);
                let pairs = snapshot.len();

                let _guard = self.lock_apply();
                if self.is_stopped() {
                    return Err(self.discard(manual_left));
                }
                // Synchronous write: the snapshot is one small JSON file and
                // must land before the state swap it mirrors.
                if let Err(e) = self.cache.save(&snapshot) {
                    tracing::warn!(error = %e, "Failed to persist snapshot cache");
                }
                self.store.update(|state| {
                    state.data = snapshot;
                    state.error = None;
                    state.loading = manual_left > 0;
                    state.phase = SyncPhase::Ready;
                    state.last_updated = Some(Utc::now());
                    state.last_failure = None;
                });
                self.store.emit(SyncEvent::snapshot_updated(pairs));

                tracing::debug!(
                    pairs,
                    latency_ms = elapsed.as_millis() as u64,
                    manual,
                    "Refreshed ticker snapshot"
                );
                Ok(())
            }
            Err(e) => {
                let _guard = self.lock_apply();
                if self.is_stopped() {
                    return Err(self.discard(manual_left));
                }
                let mut has_data = false;
                self.store.update(|state| {
                    has_data = !state.data.is_empty();
                    state.loading = manual_left > 0;
                    state.last_failure = Some(e.to_string());
                    state.phase = SyncPhase::RefreshFailed;
                    if !has_data {
                        state.error = Some(EMPTY_CACHE_ERROR_MESSAGE.to_string());
                    }
                });
                self.store
                    .emit(SyncEvent::refresh_failed(e.to_string(), has_data));

                tracing::warn!(
                    error = %e,
                    data_retained = has_data,
                    manual,
                    "Failed to refresh tickers"
                );

                if has_data {
                    Err(SyncError::Fetch(e))
                } else {
                    Err(SyncError::empty_cache(EMPTY_CACHE_ERROR_MESSAGE, e))
                }
            }
        }
    }
}

/// Live view of a started controller
///
/// Dropping it stops the controller, like unmounting the component that
/// owned the polling hook. A subscription superseded by a later `start`
/// no longer stops anything.
#[must_use = "dropping the subscription stops polling immediately"]
pub struct Subscription {
    state: watch::Receiver<SyncState>,
    events: broadcast::Receiver<SyncEvent>,
    controller: PollingController,
    generation: u64,
}

impl Subscription {
    /// Latest published state
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Waits for the next state change; `None` once the store is gone
    pub async fn changed(&mut self) -> Option<SyncState> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Waits for the next event, skipping over any the receiver lagged past
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Sync event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn controller(&self) -> &PollingController {
        &self.controller
    }

    /// Stops the controller's timer, unless a newer `start` replaced it
    pub fn stop(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.controller.inner.stop_generation(self.generation);
    }
}
