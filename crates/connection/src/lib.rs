// Rust guideline compliant 2026-10-02

//! Connection manager -- owns the single live channel shared by every consumer.
//!
//! Opens the channel through a [`Transport`] port, retries with bounded
//! exponential backoff, and reports state to observers instead of failing.
//! Carries no business logic: events are handed out through
//! [`ConnectionManager::recv`] for the event bus to fan out.
//!
//! Entry points: [`ConnectionManager::connect`], [`ConnectionManager::disconnect`],
//! [`ConnectionManager::on_state_change`], [`ConnectionManager::recv`].
//! Configuration via [`ReconnectPolicy::builder`].

use domain::{ChannelEvent, ConnectionState, ConnectionStatus, Transport, TransportEvent};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// ConnectionError
// ---------------------------------------------------------------------------

/// Errors raised while configuring the connection manager.
///
/// Runtime connection failures are never errors: they are reported as
/// [`ConnectionStatus`] changes.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The supplied configuration is invalid.
    #[error("invalid reconnect policy: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// ReconnectPolicy + builder
// ---------------------------------------------------------------------------

/// Bounded exponential backoff used by [`ConnectionManager`].
///
/// Construct via [`ReconnectPolicy::builder`].
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Growth factor between consecutive delays (`>= 1.0`).
    pub multiplier: f64,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Open attempts per connect sequence before giving up (`>= 1`).
    pub max_attempts: u32,
    /// Random spread applied to each delay, fraction in `[0, 1]`.
    pub jitter: f64,
    /// Optional RNG seed for reproducible jitter. `None` seeds from the OS.
    pub seed: Option<u64>,
}

/// Builder for [`ReconnectPolicy`].
///
/// Obtain via [`ReconnectPolicy::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct ReconnectPolicyBuilder {
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    max_attempts: u32,
    jitter: f64,
    seed: Option<u64>,
}

impl ReconnectPolicy {
    /// Create a builder.
    ///
    /// Default values: `initial_delay = 1 s`, `multiplier = 2.0`,
    /// `max_delay = 5 s`, `max_attempts = 5`, `jitter = 0.5`, `seed = None`.
    #[must_use]
    pub fn builder() -> ReconnectPolicyBuilder {
        ReconnectPolicyBuilder {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            max_attempts: 5,
            jitter: 0.5,
            seed: None,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// `initial_delay * multiplier^(attempt - 1)`, spread by `jitter`,
    /// never above `max_delay`.
    #[must_use]
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let base = Duration::try_from_secs_f64(raw).unwrap_or(self.max_delay).min(self.max_delay);
        if self.jitter == 0.0 {
            return base;
        }
        // Uniform in [1 - jitter, 1 + jitter).
        let spread = 1.0 + self.jitter * (2.0 * rng.random::<f64>() - 1.0);
        Duration::try_from_secs_f64(base.as_secs_f64() * spread)
            .unwrap_or(base)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        let b = Self::builder();
        Self {
            initial_delay: b.initial_delay,
            multiplier: b.multiplier,
            max_delay: b.max_delay,
            max_attempts: b.max_attempts,
            jitter: b.jitter,
            seed: b.seed,
        }
    }
}

impl ReconnectPolicyBuilder {
    /// Override the first retry delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Override the growth factor.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Override the delay cap.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Override the attempt budget.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Override the jitter fraction. `0.0` makes delays exact.
    #[must_use]
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Fix the RNG seed for deterministic jitter (useful in tests).
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate and build the policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidConfig`] when `max_attempts` is zero,
    /// `multiplier < 1.0`, `jitter` is outside `[0, 1]`, or
    /// `initial_delay > max_delay`.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<ReconnectPolicy, ConnectionError> {
        let invalid = |reason: &str| Err(ConnectionError::InvalidConfig { reason: reason.to_owned() });
        if self.max_attempts == 0 {
            return invalid("max_attempts must be >= 1");
        }
        if !(self.multiplier >= 1.0 && self.multiplier.is_finite()) {
            return invalid("multiplier must be a finite value >= 1.0");
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return invalid("jitter must be within [0, 1]");
        }
        if self.initial_delay > self.max_delay {
            return invalid("initial_delay must not exceed max_delay");
        }
        Ok(ReconnectPolicy {
            initial_delay: self.initial_delay,
            multiplier: self.multiplier,
            max_delay: self.max_delay,
            max_attempts: self.max_attempts,
            jitter: self.jitter,
            seed: self.seed,
        })
    }
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

type StateHandler = Rc<dyn Fn(ConnectionStatus)>;

#[derive(Default)]
struct ObserverRegistry {
    next_id: Cell<u64>,
    entries: RefCell<Vec<(u64, StateHandler)>>,
}

impl ObserverRegistry {
    fn insert(&self, handler: StateHandler) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push((id, handler));
        id
    }

    fn remove(&self, id: u64) {
        // Drop the handler outside the borrow; it may own other watches.
        let removed = {
            let mut entries = self.entries.borrow_mut();
            entries.iter().position(|(entry_id, _)| *entry_id == id).map(|i| entries.remove(i))
        };
        drop(removed);
    }

    fn notify(&self, status: ConnectionStatus) {
        // Snapshot first: a handler may drop its own watch while being called.
        let handlers: Vec<StateHandler> =
            self.entries.borrow().iter().map(|(_, h)| Rc::clone(h)).collect();
        for handler in handlers {
            handler(status);
        }
    }
}

/// Registration of a connection-state observer.
///
/// The observer is removed when this handle is dropped.
#[must_use = "dropping the watch unregisters the observer immediately"]
pub struct StateWatch {
    id: u64,
    registry: Weak<ObserverRegistry>,
}

impl StateWatch {
    /// Unregister explicitly. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for StateWatch {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl fmt::Debug for StateWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateWatch").field("id", &self.id).finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

/// Owns the one physical live channel and its state.
///
/// Generic over `T: Transport` for zero-cost static dispatch. Designed for a
/// `current_thread` runtime: interior mutability is `Cell`/`RefCell`, and no
/// borrow is held across an `.await`.
pub struct ConnectionManager<T> {
    transport: T,
    policy: ReconnectPolicy,
    /// Interior mutability required because all public methods take `&self`.
    rng: RefCell<StdRng>,
    status: Cell<ConnectionStatus>,
    /// Set by `disconnect`, cleared by `connect`; stops reconnection.
    stopped: Cell<bool>,
    stop_signal: Notify,
    state_changed: Notify,
    observers: Rc<ObserverRegistry>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a disconnected manager over `transport`.
    ///
    /// Seeds the jitter RNG from `policy.seed` if set, otherwise from the OS.
    #[must_use]
    pub fn new(transport: T, policy: ReconnectPolicy) -> Self {
        let rng = match policy.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            transport,
            policy,
            rng: RefCell::new(rng),
            status: Cell::new(ConnectionStatus::default()),
            stopped: Cell::new(false),
            stop_signal: Notify::new(),
            state_changed: Notify::new(),
            observers: Rc::new(ObserverRegistry::default()),
        }
    }

    /// Current state and attempt counter.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status.get().state
    }

    /// Borrow the underlying transport (tests and adapters only).
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Register an observer called on every status change.
    ///
    /// The observer stays registered for as long as the returned
    /// [`StateWatch`] is alive.
    pub fn on_state_change(&self, handler: impl Fn(ConnectionStatus) + 'static) -> StateWatch {
        let id = self.observers.insert(Rc::new(handler));
        StateWatch { id, registry: Rc::downgrade(&self.observers) }
    }

    /// Open the channel unless it is already open or opening.
    ///
    /// A call while `Connecting` opens nothing and only cancels a pending
    /// `disconnect`. Failed opens are retried per the [`ReconnectPolicy`];
    /// when the budget is exhausted the manager settles in `Disconnected`.
    /// Never fails: returns the resulting state.
    pub async fn connect(&self) -> ConnectionState {
        self.stopped.set(false);
        match self.state() {
            ConnectionState::Connected | ConnectionState::Connecting => {
                tracing::debug!(state = %self.state(), "connection.connect.skipped");
                self.state()
            }
            ConnectionState::Disconnected => self.open_with_backoff().await,
        }
    }

    /// Tear the channel down and stop any reconnection.
    ///
    /// An open attempt already in flight is closed as soon as it settles.
    pub async fn disconnect(&self) {
        self.stopped.set(true);
        self.stop_signal.notify_waiters();
        match self.state() {
            ConnectionState::Connected => {
                self.transport.close().await;
                self.set_status(ConnectionState::Disconnected, 0);
                tracing::info!("connection.disconnected");
            }
            ConnectionState::Connecting => {
                tracing::debug!("connection.disconnect.pending: open attempt in flight");
            }
            ConnectionState::Disconnected => {}
        }
    }

    /// Wait for the next channel event.
    ///
    /// Transparently reconnects when the transport reports the channel lost.
    /// Returns `None` once the channel is down for good (manual disconnect or
    /// exhausted reconnect budget). Events lost during an outage are not replayed.
    pub async fn recv(&self) -> Option<ChannelEvent> {
        loop {
            match self.state() {
                ConnectionState::Disconnected => return None,
                ConnectionState::Connecting => {
                    self.state_changed.notified().await;
                    continue;
                }
                ConnectionState::Connected => {}
            }

            match self.transport.next_event().await {
                TransportEvent::Event(event) => {
                    if self.stopped.get() {
                        return None;
                    }
                    return Some(event);
                }
                TransportEvent::Lost { reason } => {
                    if self.stopped.get() || self.state() != ConnectionState::Connected {
                        continue;
                    }
                    tracing::warn!(%reason, "connection.lost");
                    self.set_status(ConnectionState::Disconnected, 0);
                    self.open_with_backoff().await;
                }
            }
        }
    }

    /// Run one connect sequence: up to `max_attempts` opens with backoff in between.
    async fn open_with_backoff(&self) -> ConnectionState {
        let mut attempt = 1u32;
        loop {
            if self.stopped.get() {
                self.set_status(ConnectionState::Disconnected, 0);
                return ConnectionState::Disconnected;
            }

            self.set_status(ConnectionState::Connecting, attempt);
            match self.transport.open().await {
                Ok(()) if self.stopped.get() => {
                    // disconnect() arrived while the open was in flight.
                    self.transport.close().await;
                    self.set_status(ConnectionState::Disconnected, 0);
                    tracing::info!("connection.disconnected");
                    return ConnectionState::Disconnected;
                }
                Ok(()) => {
                    self.set_status(ConnectionState::Connected, 0);
                    tracing::info!(attempt, "connection.connected");
                    return ConnectionState::Connected;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "connection.open.failed");
                    if self.stopped.get() {
                        // disconnect() arrived while the open was in flight.
                        self.set_status(ConnectionState::Disconnected, 0);
                        tracing::info!("connection.disconnected");
                        return ConnectionState::Disconnected;
                    }
                    if attempt >= self.policy.max_attempts {
                        self.set_status(ConnectionState::Disconnected, attempt);
                        tracing::error!(attempts = attempt, "connection.reconnect.exhausted");
                        return ConnectionState::Disconnected;
                    }
                    let delay = self.policy.delay_for(attempt, &mut *self.rng.borrow_mut());
                    tracing::info!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "connection.reconnect.scheduled"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.stop_signal.notified() => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    fn set_status(&self, state: ConnectionState, attempt: u32) {
        let status = ConnectionStatus { state, attempt };
        if self.status.replace(status) == status {
            return;
        }
        tracing::debug!(%state, attempt, "connection.state.changed");
        self.state_changed.notify_waiters();
        self.observers.notify(status);
    }
}

impl<T: fmt::Debug> fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("transport", &self.transport)
            .field("policy", &self.policy)
            .field("status", &self.status.get())
            .field("stopped", &self.stopped.get())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{ConnectionError, ConnectionManager, ReconnectPolicy};
    use domain::{ChannelEvent, ConnectionState, ConnectionStatus, Transport, TransportError, TransportEvent};
    use rand::{SeedableRng, rngs::StdRng};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::time::Duration;

    // ------------------------------------------------------------------
    // Test helpers
    // ------------------------------------------------------------------

    /// Scripted transport: open results and events are consumed in order.
    /// Unscripted opens fail; an exhausted event script reports the channel lost.
    struct MockTransport {
        open_results: RefCell<VecDeque<Result<(), TransportError>>>,
        events: RefCell<VecDeque<TransportEvent>>,
        open_delay: Duration,
        open_calls: Cell<u32>,
        close_calls: Cell<u32>,
        closed: Cell<bool>,
    }

    impl MockTransport {
        fn new(open_results: Vec<Result<(), TransportError>>, events: Vec<TransportEvent>) -> Self {
            Self {
                open_results: RefCell::new(open_results.into()),
                events: RefCell::new(events.into()),
                open_delay: Duration::ZERO,
                open_calls: Cell::new(0),
                close_calls: Cell::new(0),
                closed: Cell::new(true),
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.open_delay = delay;
            self
        }
    }

    impl Transport for MockTransport {
        async fn open(&self) -> Result<(), TransportError> {
            self.open_calls.set(self.open_calls.get() + 1);
            if !self.open_delay.is_zero() {
                tokio::time::sleep(self.open_delay).await;
            }
            let result = self.open_results.borrow_mut().pop_front().unwrap_or_else(|| {
                Err(TransportError::ConnectFailed { reason: "unscripted".to_owned() })
            });
            if result.is_ok() {
                self.closed.set(false);
            }
            result
        }

        async fn close(&self) {
            self.close_calls.set(self.close_calls.get() + 1);
            self.closed.set(true);
        }

        async fn next_event(&self) -> TransportEvent {
            if self.closed.get() {
                return TransportEvent::Lost { reason: "closed".to_owned() };
            }
            let next = self.events.borrow_mut().pop_front();
            next.unwrap_or_else(|| {
                self.closed.set(true);
                TransportEvent::Lost { reason: "script exhausted".to_owned() }
            })
        }
    }

    fn failed() -> Result<(), TransportError> {
        Err(TransportError::ConnectFailed { reason: "refused".to_owned() })
    }

    fn exact_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::builder()
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(5))
            .max_attempts(max_attempts)
            .jitter(0.0)
            .build()
            .unwrap()
    }

    fn event(name: &str) -> TransportEvent {
        TransportEvent::Event(ChannelEvent::signal(name))
    }

    fn record_statuses<T: Transport>(
        manager: &ConnectionManager<T>,
    ) -> (Rc<RefCell<Vec<ConnectionStatus>>>, super::StateWatch) {
        let seen = Rc::new(RefCell::new(vec![]));
        let sink = Rc::clone(&seen);
        let watch = manager.on_state_change(move |s| sink.borrow_mut().push(s));
        (seen, watch)
    }

    // ------------------------------------------------------------------
    // ReconnectPolicy
    // ------------------------------------------------------------------

    #[test]
    fn policy_rejects_zero_attempts() {
        let result = ReconnectPolicy::builder().max_attempts(0).build();
        assert!(matches!(result, Err(ConnectionError::InvalidConfig { .. })));
    }

    #[test]
    fn policy_rejects_shrinking_multiplier_and_bad_jitter() {
        assert!(ReconnectPolicy::builder().multiplier(0.5).build().is_err());
        assert!(ReconnectPolicy::builder().jitter(1.5).build().is_err());
        assert!(
            ReconnectPolicy::builder()
                .initial_delay(Duration::from_secs(10))
                .max_delay(Duration::from_secs(1))
                .build()
                .is_err()
        );
    }

    #[test]
    fn policy_defaults() {
        let policy = ReconnectPolicy::builder().build().unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn delays_grow_exponentially_up_to_cap() {
        let policy = exact_policy(10);
        let mut rng = StdRng::seed_from_u64(0);
        let delays: Vec<u64> = (1..=5).map(|a| policy.delay_for(a, &mut rng).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn jittered_delays_stay_in_bounds() {
        let policy = ReconnectPolicy::builder().jitter(0.5).seed(7).build().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..=20 {
            let d = policy.delay_for(attempt, &mut rng);
            assert!(d <= policy.max_delay, "attempt {attempt}: {d:?} above cap");
            assert!(d >= Duration::from_millis(500), "attempt {attempt}: {d:?} below spread");
        }
    }

    // ------------------------------------------------------------------
    // connect / disconnect
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn connect_reports_connecting_then_connected() {
        let manager = ConnectionManager::new(MockTransport::new(vec![Ok(())], vec![]), exact_policy(3));
        let (seen, _watch) = record_statuses(&manager);

        assert_eq!(manager.connect().await, ConnectionState::Connected);

        assert_eq!(
            *seen.borrow(),
            vec![
                ConnectionStatus { state: ConnectionState::Connecting, attempt: 1 },
                ConnectionStatus { state: ConnectionState::Connected, attempt: 0 },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_connect_opens_one_channel() {
        let transport = MockTransport::new(vec![Ok(())], vec![]).slow(Duration::from_millis(200));
        let manager = ConnectionManager::new(transport, exact_policy(3));

        let (first, second) = tokio::join!(manager.connect(), manager.connect());

        assert_eq!(first, ConnectionState::Connected);
        assert_eq!(second, ConnectionState::Connecting);
        assert_eq!(manager.transport().open_calls.get(), 1);
        assert_eq!(manager.connect().await, ConnectionState::Connected);
        assert_eq!(manager.transport().open_calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_retries_with_backoff() {
        let manager =
            ConnectionManager::new(MockTransport::new(vec![failed(), failed(), Ok(())], vec![]), exact_policy(5));
        let (seen, _watch) = record_statuses(&manager);
        let started = tokio::time::Instant::now();

        assert_eq!(manager.connect().await, ConnectionState::Connected);

        // 1 s after attempt 1, 2 s after attempt 2.
        assert_eq!(started.elapsed().as_secs(), 3);
        let attempts: Vec<u32> = seen
            .borrow()
            .iter()
            .filter(|s| s.state == ConnectionState::Connecting)
            .map(|s| s.attempt)
            .collect();
        assert_eq!(attempts, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_gives_up_without_error() {
        let manager = ConnectionManager::new(MockTransport::new(vec![], vec![]), exact_policy(3));

        assert_eq!(manager.connect().await, ConnectionState::Disconnected);

        assert_eq!(manager.transport().open_calls.get(), 3);
        assert_eq!(manager.status(), ConnectionStatus { state: ConnectionState::Disconnected, attempt: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_backoff_stops_retrying() {
        let manager = ConnectionManager::new(MockTransport::new(vec![failed()], vec![]), exact_policy(5));

        let (state, ()) = tokio::join!(manager.connect(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            manager.disconnect().await;
        });

        assert_eq!(state, ConnectionState::Disconnected);
        assert_eq!(manager.transport().open_calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_failing_open_skips_the_backoff() {
        let transport = MockTransport::new(vec![failed()], vec![]).slow(Duration::from_millis(500));
        let manager = ConnectionManager::new(transport, exact_policy(5));
        let started = tokio::time::Instant::now();

        let (state, ()) = tokio::join!(manager.connect(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            manager.disconnect().await;
        });

        assert_eq!(state, ConnectionState::Disconnected);
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert_eq!(manager.status(), ConnectionStatus { state: ConnectionState::Disconnected, attempt: 0 });
        assert_eq!(manager.transport().open_calls.get(), 1);
    }

    // ------------------------------------------------------------------
    // recv
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn recv_reconnects_after_loss() {
        let events = vec![
            event("a"),
            TransportEvent::Lost { reason: "socket reset".to_owned() },
            event("b"),
        ];
        let manager = ConnectionManager::new(MockTransport::new(vec![Ok(()), Ok(())], events), exact_policy(3));
        manager.connect().await;

        assert_eq!(manager.recv().await.unwrap().name, "a");
        assert_eq!(manager.recv().await.unwrap().name, "b");
        assert_eq!(manager.transport().open_calls.get(), 2);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn recv_returns_none_after_disconnect() {
        let manager = ConnectionManager::new(MockTransport::new(vec![Ok(())], vec![event("a")]), exact_policy(3));
        manager.connect().await;
        manager.disconnect().await;

        assert!(manager.recv().await.is_none());
        assert_eq!(manager.transport().close_calls.get(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn recv_before_connect_returns_none() {
        let manager = ConnectionManager::new(MockTransport::new(vec![], vec![]), exact_policy(1));
        assert!(manager.recv().await.is_none());
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn dropped_watch_stops_notifications() {
        let manager = ConnectionManager::new(MockTransport::new(vec![Ok(())], vec![]), exact_policy(1));
        let (seen, watch) = record_statuses(&manager);
        drop(watch);

        manager.connect().await;

        assert!(seen.borrow().is_empty());
    }

    #[tokio::test]
    async fn observer_may_unsubscribe_itself() {
        let manager = ConnectionManager::new(MockTransport::new(vec![Ok(())], vec![]), exact_policy(1));
        let slot: Rc<RefCell<Option<super::StateWatch>>> = Rc::new(RefCell::new(None));
        let calls = Rc::new(Cell::new(0u32));
        let (slot_in, calls_in) = (Rc::clone(&slot), Rc::clone(&calls));
        let watch = manager.on_state_change(move |_| {
            calls_in.set(calls_in.get() + 1);
            slot_in.borrow_mut().take();
        });
        *slot.borrow_mut() = Some(watch);

        manager.connect().await;

        assert_eq!(calls.get(), 1);
    }
}
