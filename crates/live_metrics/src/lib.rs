// Rust guideline compliant 2026-10-05

//! Live metrics store -- aggregate counters fed by polling and by push.
//!
//! Both sources go through [`LiveMetricsStore::apply`], which keeps
//! whichever update carries the newer timestamp. Every accepted update
//! produces a new immutable [`MetricsSnapshot`]; readers holding the
//! previous one are unaffected.

use chrono::{DateTime, Utc};
use domain::{HandlerError, MetricsSnapshot, MetricsSource, MetricsUpdate, events};
use event_bus::{ConsumerId, EventBus, Subscription};
use serde::Deserialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::Notify;

/// Consumer label used on the event bus.
pub const CONSUMER: &str = "live_metrics";

// ---------------------------------------------------------------------------
// LiveMetricsError
// ---------------------------------------------------------------------------

/// Errors raised while configuring the store.
#[derive(Debug, thiserror::Error)]
pub enum LiveMetricsError {
    /// The supplied configuration is invalid.
    #[error("invalid live metrics configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// LiveMetricsConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`LiveMetricsStore`].
#[derive(Debug, Clone)]
pub struct LiveMetricsConfig {
    /// Delay between two polls.
    pub poll_interval: Duration,
}

/// Builder for [`LiveMetricsConfig`].
#[derive(Debug)]
pub struct LiveMetricsConfigBuilder {
    poll_interval: Duration,
}

impl LiveMetricsConfig {
    /// Create a builder. Default `poll_interval = 30 s`.
    #[must_use]
    pub fn builder() -> LiveMetricsConfigBuilder {
        LiveMetricsConfigBuilder { poll_interval: Duration::from_secs(30) }
    }
}

impl Default for LiveMetricsConfig {
    fn default() -> Self {
        Self { poll_interval: Self::builder().poll_interval }
    }
}

impl LiveMetricsConfigBuilder {
    /// Override the polling cadence.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LiveMetricsError::InvalidConfig`] when `poll_interval` is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<LiveMetricsConfig, LiveMetricsError> {
        if self.poll_interval.is_zero() {
            return Err(LiveMetricsError::InvalidConfig {
                reason: "poll_interval must be > 0".to_owned(),
            });
        }
        Ok(LiveMetricsConfig { poll_interval: self.poll_interval })
    }
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// Where an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    /// `analytics:update` on the live channel.
    Push,
    /// Periodic poll of the metrics endpoint.
    Poll,
}

impl fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Push => "push",
            Self::Poll => "poll",
        })
    }
}

/// Result of [`LiveMetricsStore::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A new snapshot replaced the previous one.
    Applied,
    /// Older than the current snapshot; ignored.
    Outdated,
    /// Carried neither metrics nor trend; ignored.
    Empty,
}

/// `analytics:update` payload. `transactions` is left to the query cache.
#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(flatten)]
    update: MetricsUpdate,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// LiveMetricsStore
// ---------------------------------------------------------------------------

/// Holds the current [`MetricsSnapshot`].
pub struct LiveMetricsStore {
    config: LiveMetricsConfig,
    current: RefCell<Rc<MetricsSnapshot>>,
    stopped: Cell<bool>,
    stop_signal: Notify,
}

impl LiveMetricsStore {
    /// Create a store holding [`MetricsSnapshot::empty`].
    #[must_use]
    pub fn new(config: LiveMetricsConfig) -> Self {
        Self::with_snapshot(config, MetricsSnapshot::empty())
    }

    /// Create a store seeded with `initial`, shown until a newer update arrives.
    #[must_use]
    pub fn with_snapshot(config: LiveMetricsConfig, initial: MetricsSnapshot) -> Self {
        Self {
            config,
            current: RefCell::new(Rc::new(initial)),
            stopped: Cell::new(false),
            stop_signal: Notify::new(),
        }
    }

    /// The current snapshot. Never mutated after it is handed out.
    #[must_use]
    pub fn snapshot(&self) -> Rc<MetricsSnapshot> {
        Rc::clone(&self.current.borrow())
    }

    /// Merge `update` observed at `observed_at`, last writer wins.
    ///
    /// An update older than the current snapshot is dropped; on a tie the
    /// incoming update wins. Absent fields keep their previous values.
    pub fn apply(&self, update: &MetricsUpdate, observed_at: DateTime<Utc>, source: UpdateSource) -> ApplyOutcome {
        if update.metrics.is_none() && update.trend.is_none() {
            tracing::debug!(%source, "live_metrics.update.empty");
            return ApplyOutcome::Empty;
        }
        let previous = self.snapshot();
        if observed_at < previous.as_of {
            tracing::debug!(%source, %observed_at, as_of = %previous.as_of, "live_metrics.update.outdated");
            return ApplyOutcome::Outdated;
        }

        let mut next = match &update.metrics {
            Some(metrics) => MetricsSnapshot::from_metrics(metrics, observed_at),
            None => MetricsSnapshot { as_of: observed_at, ..(*previous).clone() },
        };
        next.trend = update.trend.clone().unwrap_or_else(|| previous.trend.clone());

        *self.current.borrow_mut() = Rc::new(next);
        tracing::debug!(%source, %observed_at, "live_metrics.update.applied");
        ApplyOutcome::Applied
    }

    /// Subscribe to `analytics:update`. A missing `timestamp` means "now";
    /// an event without payload changes nothing.
    pub fn attach(self: &Rc<Self>, bus: &EventBus) -> Subscription {
        let store = Rc::downgrade(self);
        bus.on(events::ANALYTICS_UPDATE, &ConsumerId::new(CONSUMER), move |event| {
            if event.payload.is_null() {
                tracing::debug!("live_metrics.update.empty: no payload");
                return Ok(());
            }
            let payload: PushPayload = serde_json::from_value(event.payload.clone())
                .map_err(|e| HandlerError::Payload { reason: e.to_string() })?;
            if let Some(store) = store.upgrade() {
                store.apply(&payload.update, payload.timestamp.unwrap_or_else(Utc::now), UpdateSource::Push);
            }
            Ok(())
        })
    }

    /// Poll `source` immediately, then every `poll_interval`, until
    /// [`stop`](Self::stop). Failed polls are logged and skipped.
    ///
    /// Returns the number of polls issued.
    pub async fn run_polling<S: MetricsSource>(&self, source: &S) -> u64 {
        let mut polls = 0u64;
        while !self.stopped.get() {
            polls += 1;
            match source.poll().await {
                Ok(reading) => {
                    self.apply(&reading.update, reading.observed_at, UpdateSource::Poll);
                }
                Err(e) => tracing::warn!(error = %e, "live_metrics.poll.failed"),
            }
            if self.stopped.get() {
                break;
            }
            tokio::select! {
                () = tokio::time::sleep(self.config.poll_interval) => {}
                () = self.stop_signal.notified() => {}
            }
        }
        tracing::info!(polls, "live_metrics.polling.stopped");
        polls
    }

    /// End [`run_polling`](Self::run_polling), interrupting its wait.
    pub fn stop(&self) {
        self.stopped.set(true);
        self.stop_signal.notify_waiters();
    }
}

impl fmt::Debug for LiveMetricsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveMetricsStore")
            .field("config", &self.config)
            .field("as_of", &self.current.borrow().as_of)
            .field("stopped", &self.stopped.get())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
