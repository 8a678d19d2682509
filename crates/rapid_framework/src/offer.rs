//! Time-boxed offers (trade requests, party invites, duel challenges...)
//! that a player has to accept or decline before they expire.
//!
//! Each outstanding offer owns one timer task on the worker pool. The timer
//! polls the remaining time, reports progress at the configured thresholds and
//! fires the timeout when the deadline passes. Every user callback is marshaled
//! to the synchronous context.
//!
//! Accept and decline cancel the timer on a best-effort basis. When the timer
//! has already queued `on_timeout` on the synchronous context, that callback
//! still runs even though accept/decline also succeeded. Callers that need
//! mutual exclusion between the two outcomes must check their own state inside
//! the callbacks.

use crate::error::TaskError;
use crate::tasks::{SyncJob, TaskHandle, TaskSupervisor};
use crate::types::PlayerId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How long a player has to answer an offer by default.
pub const DEFAULT_WAITING_WINDOW: Duration = Duration::from_millis(10_000);

/// How often an offer timer re-checks the remaining time.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Remaining-time marks (ms) at which progress is reported by default.
pub const DEFAULT_THRESHOLDS: [u64; 8] = [180_000, 60_000, 30_000, 5_000, 4_000, 3_000, 2_000, 1_000];

/// Progress callback, invoked with the threshold (ms remaining) that was crossed.
pub type ProgressCallback = Arc<dyn Fn(u64) -> anyhow::Result<()> + Send + Sync>;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferConfig {
    /// Time between sending an offer and its automatic expiry
    pub waiting_window: Duration,
    /// Sleep between two remaining-time checks of an offer timer
    pub poll_interval: Duration,
}

impl Default for OfferConfig {
    fn default() -> Self {
        Self {
            waiting_window: DEFAULT_WAITING_WINDOW,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Remaining-time thresholds in milliseconds, always strictly descending.
///
/// Any input order is accepted; duplicates are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u64>", into = "Vec<u64>")]
pub struct Thresholds(Vec<u64>);

impl Thresholds {
    pub fn new(values: impl IntoIterator<Item = u64>) -> Self {
        let mut values: Vec<u64> = values.into_iter().collect();
        values.sort_unstable_by(|a, b| b.cmp(a));
        values.dedup();
        Self(values)
    }

    /// No progress notifications at all.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLDS)
    }
}

impl From<Vec<u64>> for Thresholds {
    fn from(values: Vec<u64>) -> Self {
        Self::new(values)
    }
}

impl From<&[u64]> for Thresholds {
    fn from(values: &[u64]) -> Self {
        Self::new(values.iter().copied())
    }
}

impl<const N: usize> From<[u64; N]> for Thresholds {
    fn from(values: [u64; N]) -> Self {
        Self::new(values)
    }
}

impl From<Thresholds> for Vec<u64> {
    fn from(thresholds: Thresholds) -> Self {
        thresholds.0
    }
}

// ============================================================================
// Offer Scheduler
// ============================================================================

struct PendingOffer {
    /// Distinguishes this offer from earlier ones sent to the same subject
    seq: u64,
    deadline: Instant,
    on_accept: Mutex<SyncJob>,
    timer: TaskHandle,
}

impl std::fmt::Debug for PendingOffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOffer")
            .field("seq", &self.seq)
            .field("deadline", &self.deadline)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

/// Tracks at most one pending offer per player.
pub struct OfferScheduler {
    supervisor: Arc<dyn TaskSupervisor>,
    config: OfferConfig,
    offers: Arc<DashMap<PlayerId, PendingOffer>>,
    next_seq: AtomicU64,
}

impl OfferScheduler {
    /// Creates a scheduler with the default 10 second waiting window.
    pub fn new(supervisor: Arc<dyn TaskSupervisor>) -> Self {
        Self::with_config(supervisor, OfferConfig::default())
    }

    pub fn with_config(supervisor: Arc<dyn TaskSupervisor>, config: OfferConfig) -> Self {
        Self {
            supervisor,
            config,
            offers: Arc::new(DashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &OfferConfig {
        &self.config
    }

    /// Sends an offer to `subject`.
    ///
    /// `on_progress` is called with each threshold once the remaining time
    /// drops to or below it. `on_accept` runs if [`accept`](Self::accept) is
    /// called in time; `on_timeout` runs once the waiting window has elapsed.
    /// All three run on the synchronous context.
    ///
    /// Returns `false` without doing anything if `subject` already has a
    /// pending offer.
    pub fn send<P, A, T>(
        &self,
        subject: PlayerId,
        on_progress: P,
        on_accept: A,
        on_timeout: T,
        thresholds: impl Into<Thresholds>,
    ) -> bool
    where
        P: Fn(u64) -> anyhow::Result<()> + Send + Sync + 'static,
        A: FnOnce() -> anyhow::Result<()> + Send + 'static,
        T: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let window = self.config.waiting_window;
        self.send_with_window(subject, window, on_progress, on_accept, on_timeout, thresholds)
    }

    /// [`send`](Self::send) with a waiting window other than the configured one.
    pub fn send_with_window<P, A, T>(
        &self,
        subject: PlayerId,
        window: Duration,
        on_progress: P,
        on_accept: A,
        on_timeout: T,
        thresholds: impl Into<Thresholds>,
    ) -> bool
    where
        P: Fn(u64) -> anyhow::Result<()> + Send + Sync + 'static,
        A: FnOnce() -> anyhow::Result<()> + Send + 'static,
        T: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let slot = match self.offers.entry(subject) {
            Entry::Occupied(_) => {
                debug!("Offer for {} rejected: already waiting for a response", subject);
                return false;
            }
            Entry::Vacant(slot) => slot,
        };

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + window;

        let timer = OfferTimer {
            subject,
            seq,
            deadline,
            poll_interval: self.config.poll_interval,
            thresholds: thresholds.into(),
            on_progress: Arc::new(on_progress),
            on_timeout: Box::new(on_timeout),
            supervisor: self.supervisor.clone(),
            offers: self.offers.clone(),
        };
        let handle = self.supervisor.run_async(Box::pin(timer.run()));

        slot.insert(PendingOffer {
            seq,
            deadline,
            on_accept: Mutex::new(Box::new(on_accept)),
            timer: handle,
        });

        info!("📨 Offer sent to {} ({}ms to respond)", subject, window.as_millis());
        true
    }

    /// [`send`](Self::send) with [`DEFAULT_THRESHOLDS`].
    pub fn send_default<P, A, T>(&self, subject: PlayerId, on_progress: P, on_accept: A, on_timeout: T) -> bool
    where
        P: Fn(u64) -> anyhow::Result<()> + Send + Sync + 'static,
        A: FnOnce() -> anyhow::Result<()> + Send + 'static,
        T: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.send(subject, on_progress, on_accept, on_timeout, Thresholds::default())
    }

    /// Accepts the pending offer of `subject`, queueing its accept action.
    ///
    /// Returns `false` if there is nothing to accept.
    pub fn accept(&self, subject: PlayerId) -> bool {
        let Some((_, pending)) = self.offers.remove(&subject) else {
            return false;
        };

        pending.timer.cancel();
        info!("✅ {} accepted offer #{}", subject, pending.seq);

        let on_accept = pending
            .on_accept
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Not awaited: the caller may itself be running on the synchronous context.
        let receipt = self.supervisor.run_sync(on_accept);
        if !receipt.is_queued() {
            warn!(
                "Accept action of offer #{} for {} dropped: synchronous context closed",
                pending.seq, subject
            );
        }
        true
    }

    /// Withdraws the pending offer of `subject` without running any callback.
    ///
    /// Returns `false` if there is nothing to decline.
    pub fn decline(&self, subject: PlayerId) -> bool {
        let Some((_, pending)) = self.offers.remove(&subject) else {
            return false;
        };

        pending.timer.cancel();
        info!("❌ {} declined offer #{}", subject, pending.seq);
        true
    }

    pub fn is_pending(&self, subject: PlayerId) -> bool {
        self.offers.contains_key(&subject)
    }

    pub fn pending_count(&self) -> usize {
        self.offers.len()
    }

    /// Time left before the pending offer of `subject` expires.
    pub fn time_left(&self, subject: PlayerId) -> Option<Duration> {
        self.offers
            .get(&subject)
            .map(|pending| pending.deadline.saturating_duration_since(Instant::now()))
    }

    /// Players that currently have a pending offer.
    pub fn pending_subjects(&self) -> Vec<PlayerId> {
        self.offers.iter().map(|entry| *entry.key()).collect()
    }

    /// Declines every pending offer. Returns how many were withdrawn.
    pub fn cancel_all(&self) -> usize {
        let cancelled = self
            .pending_subjects()
            .into_iter()
            .filter(|subject| self.decline(*subject))
            .count();

        if cancelled > 0 {
            info!("🧹 Withdrew {} pending offers", cancelled);
        }
        cancelled
    }
}

impl std::fmt::Debug for OfferScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfferScheduler")
            .field("config", &self.config)
            .field("pending", &self.offers.len())
            .finish()
    }
}

// ============================================================================
// Offer Timer
// ============================================================================

struct OfferTimer {
    subject: PlayerId,
    seq: u64,
    deadline: Instant,
    poll_interval: Duration,
    thresholds: Thresholds,
    on_progress: ProgressCallback,
    on_timeout: SyncJob,
    supervisor: Arc<dyn TaskSupervisor>,
    offers: Arc<DashMap<PlayerId, PendingOffer>>,
}

impl OfferTimer {
    async fn run(self) {
        let OfferTimer {
            subject,
            seq,
            deadline,
            poll_interval,
            thresholds,
            on_progress,
            on_timeout,
            supervisor,
            offers,
        } = self;

        // Runs on every exit path, including cancellation.
        let _slot = SlotRelease { offers, subject, seq };

        let marks = thresholds.as_slice();
        let mut next = 0;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let remaining = (deadline - now).as_millis() as u64;

            while next < marks.len() && marks[next] >= remaining {
                let threshold = marks[next];
                next += 1;

                let progress = on_progress.clone();
                let receipt = supervisor.run_sync(Box::new(move || progress(threshold)));
                match receipt.wait().await {
                    Ok(()) => {}
                    Err(TaskError::ContextClosed) => {
                        warn!("Offer timer for {} stopped: synchronous context closed", subject);
                        return;
                    }
                    Err(e) => warn!("Progress callback for {} failed: {}", subject, e),
                }
            }

            tokio::time::sleep(poll_interval).await;
        }

        debug!("⌛ Offer #{} for {} timed out", seq, subject);
        if let Err(e) = supervisor.run_sync(on_timeout).wait().await {
            warn!("Timeout callback for {} failed: {}", subject, e);
        }
    }
}

/// Frees the subject's slot when its timer ends, unless a newer offer already
/// took the slot over.
struct SlotRelease {
    offers: Arc<DashMap<PlayerId, PendingOffer>>,
    subject: PlayerId,
    seq: u64,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        let seq = self.seq;
        if self
            .offers
            .remove_if(&self.subject, |_, pending| pending.seq == seq)
            .is_some()
        {
            debug!("Offer slot of {} released", self.subject);
        }
    }
}
