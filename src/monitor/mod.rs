//! Polling loop, status cache and alert policy.
//!
//! [`Monitor::run`] drives two timers: a poll deadline derived from the
//! current settings snapshot (unlocked threshold), and a lock check every few
//! seconds that fires one extra check right after the workstation gets locked
//! (locked threshold). All HID work runs on blocking worker threads.

pub mod alert;
pub mod cache;
pub mod session;

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::StatusReader;
use crate::config::{SettingsProvider, MIN_POLL_INTERVAL_MINUTES};
use crate::notify::BatteryNotifier;
use crate::pulsar::BatteryStatus;

use alert::AlertTracker;
use cache::{Resolved, StatusCache};
use session::SessionLock;

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Which alert threshold applies to a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertContext {
    Unlocked,
    Locked,
}

/// One resolved reading, as handed to history consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: BatteryStatus,
    pub captured_at: SystemTime,
    pub from_cache: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorTiming {
    pub lock_check_interval: Duration,
    /// Gap between the two lock probes that must agree.
    pub lock_settle_delay: Duration,
    /// How soon after the last unlocked observation the locked check may run.
    pub post_lock_window: Duration,
}

impl Default for MonitorTiming {
    fn default() -> Self {
        Self {
            lock_check_interval: Duration::from_secs(5),
            lock_settle_delay: Duration::from_secs(2),
            post_lock_window: Duration::from_secs(10),
        }
    }
}

/// Outcome of a check that may have found another one in flight.
enum Tick {
    Skipped,
    Ran(Option<BatteryStatus>),
}

#[derive(Debug, Default)]
struct MonitorState {
    cache: StatusCache,
    alerts: AlertTracker,
}

pub struct Monitor {
    reader: Arc<dyn StatusReader>,
    settings: Arc<dyn SettingsProvider>,
    session: Arc<dyn SessionLock>,
    notifier: Arc<dyn BatteryNotifier>,
    timing: MonitorTiming,
    /// Held for a whole check so checks never overlap; queries do not take it.
    tick: Mutex<()>,
    state: Mutex<MonitorState>,
    snapshots: broadcast::Sender<StatusSnapshot>,
}

impl Monitor {
    pub fn new(
        reader: Arc<dyn StatusReader>,
        settings: Arc<dyn SettingsProvider>,
        session: Arc<dyn SessionLock>,
        notifier: Arc<dyn BatteryNotifier>,
    ) -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            reader,
            settings,
            session,
            notifier,
            timing: MonitorTiming::default(),
            tick: Mutex::new(()),
            state: Mutex::new(MonitorState::default()),
            snapshots,
        }
    }

    pub fn with_timing(mut self, timing: MonitorTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Replaces the cache (and whatever it holds) with an empty one using `ttl`.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.state.get_mut().cache = StatusCache::with_ttl(ttl);
        self
    }

    /// Every resolved reading (live or cached), in order.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.snapshots.subscribe()
    }

    /// Current battery status: a live read, or the cached one if the device
    /// stays silent. No alert evaluation.
    pub async fn query(&self) -> Option<BatteryStatus> {
        let mut state = self.state.lock().await;
        self.read_resolved(&mut state).await.map(|r| r.status)
    }

    /// Reads the battery and applies the alert policy for `context`. Skipped
    /// (returns `None`) while a previous check is still in flight. A query in
    /// flight only delays it.
    pub async fn check(&self, context: AlertContext) -> Option<BatteryStatus> {
        match self.try_check(context).await {
            Tick::Ran(status) => status,
            Tick::Skipped => None,
        }
    }

    async fn try_check(&self, context: AlertContext) -> Tick {
        let Ok(_tick) = self.tick.try_lock() else {
            debug!("previous check still running, skipping tick");
            return Tick::Skipped;
        };
        let mut state = self.state.lock().await;
        Tick::Ran(self.evaluate(&mut state, context).await)
    }

    async fn evaluate(
        &self,
        state: &mut MonitorState,
        context: AlertContext,
    ) -> Option<BatteryStatus> {
        let Some(resolved) = self.read_resolved(state).await else {
            debug!("Battery status not available");
            return None;
        };

        let policy = self.settings.snapshot().policy();
        let threshold = match context {
            AlertContext::Unlocked => policy.unlocked_threshold,
            AlertContext::Locked => policy.locked_threshold,
        };
        let status = resolved.status;

        if let Some(change) = state.alerts.observe_level(&status) {
            self.notifier.level_changed(&change);
        }

        debug!(
            percentage = status.percentage,
            charging = status.is_charging,
            threshold,
            ?context,
            "evaluating alert"
        );
        if let Some(alert) =
            state
                .alerts
                .evaluate(&status, threshold, policy.alert_cooldown, Instant::now())
        {
            self.notifier.low_battery(&alert, policy.beeps_enabled);
        }

        Some(status)
    }

    /// Runs both timers until `shutdown` flips to `true` (or its sender is
    /// dropped). A read already in flight finishes on its own deadline.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut lock_check = tokio::time::interval(self.timing.lock_check_interval);
        lock_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut next_poll = tokio::time::Instant::now();
        let mut locked = false;
        let mut last_unlocked_at: Option<Instant> = None;
        let mut post_lock_checked = false;

        info!("Battery monitor started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                // A deadline passed while locked stays due until unlock
                _ = tokio::time::sleep_until(next_poll), if !locked => {
                    self.check(AlertContext::Unlocked).await;
                    next_poll = tokio::time::Instant::now() + self.poll_interval();
                }
                _ = lock_check.tick() => {
                    if !self.confirm_locked().await {
                        locked = false;
                        post_lock_checked = false;
                        last_unlocked_at = Some(Instant::now());
                        continue;
                    }

                    if !locked {
                        info!("Workstation locked");
                        locked = true;
                    }

                    let just_locked = last_unlocked_at
                        .is_some_and(|at| at.elapsed() < self.timing.post_lock_window);
                    if just_locked && !post_lock_checked {
                        post_lock_checked =
                            matches!(self.try_check(AlertContext::Locked).await, Tick::Ran(_));
                    }
                }
            }
        }
        info!("Battery monitor stopped");
    }

    fn poll_interval(&self) -> Duration {
        let floor = Duration::from_secs_f64(MIN_POLL_INTERVAL_MINUTES * 60.0);
        self.settings.snapshot().policy().poll_interval.max(floor)
    }

    /// Locked only if two probes `lock_settle_delay` apart agree.
    async fn confirm_locked(&self) -> bool {
        if !self.probe_locked().await {
            return false;
        }
        tokio::time::sleep(self.timing.lock_settle_delay).await;
        self.probe_locked().await
    }

    async fn probe_locked(&self) -> bool {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || session.is_locked())
            .await
            .unwrap_or(false)
    }

    async fn read_resolved(&self, state: &mut MonitorState) -> Option<Resolved> {
        let reader = Arc::clone(&self.reader);
        let live = match tokio::task::spawn_blocking(move || reader.read_battery_status()).await {
            Ok(status) => status,
            Err(e) => {
                warn!("battery read task failed: {}", e);
                None
            }
        };

        let resolved = state.cache.resolve(live, Instant::now())?;
        if resolved.from_cache {
            debug!(percentage = resolved.status.percentage, "Using cached battery status");
        }

        // No subscribers is fine
        let _ = self.snapshots.send(StatusSnapshot {
            status: resolved.status.clone(),
            captured_at: SystemTime::now(),
            from_cache: resolved.from_cache,
        });
        Some(resolved)
    }
}
