// Rust guideline compliant 2026-10-08

//! Simulated adapter for the `Transport` port.
//!
//! Emits `transaction:new` and `analytics:update` events on a fixed cadence,
//! fails handshakes and drops the channel at configurable rates. Every
//! announced transaction is also recorded in the shared [`Ledger`] so the
//! demo fetcher serves what the channel announced.
//!
//! The RNG borrow is always released before an `.await`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;
use domain::{ChannelEvent, Metrics, Transport, TransportError, TransportEvent, events};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::json;
use tokio::sync::Notify;

use super::demo_fetcher::Ledger;

/// Merchants the simulated stream picks from, with an amount range.
const MERCHANTS: [(&str, u32, u32); 8] = [
    ("Swiggy", 150, 900),
    ("Amazon", 300, 12_000),
    ("BigBasket", 400, 3_500),
    ("Uber", 120, 700),
    ("Apollo Hospital", 2_000, 90_000),
    ("KYC Update Services", 9_999, 75_000),
    ("Lucky Lottery Claims", 5_000, 50_000),
    ("Croma", 1_500, 60_000),
];

/// `Transport` adapter generating a plausible live stream.
#[derive(Debug)]
pub struct SimulatedTransport {
    ledger: Rc<Ledger>,
    rng: RefCell<StdRng>,
    open: Cell<bool>,
    closed: Notify,
    totals: RefCell<Metrics>,
    event_interval: Duration,
    handshake: Duration,
    drop_rate: f64,
    open_failure_rate: f64,
}

impl SimulatedTransport {
    /// Create a closed transport: one event every 2 s, 2 % drops per event,
    /// 20 % failed handshakes.
    ///
    /// `seed = Some(s)` produces a deterministic stream; `None` seeds from the OS.
    #[must_use]
    pub fn new(ledger: Rc<Ledger>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        Self {
            ledger,
            rng: RefCell::new(rng),
            open: Cell::new(false),
            closed: Notify::new(),
            totals: RefCell::new(Metrics {
                total_transactions: 1_523,
                fraud_blocked: 87,
                amount_saved: 4_230_000.0,
                success_rate: 94.3,
            }),
            event_interval: Duration::from_secs(2),
            handshake: Duration::from_millis(100),
            drop_rate: 0.02,
            open_failure_rate: 0.2,
        }
    }

    /// Override the event cadence.
    #[must_use]
    pub fn with_event_interval(mut self, interval: Duration) -> Self {
        self.event_interval = interval;
        self
    }

    /// Probability in `[0, 1]` that the channel drops instead of delivering an event.
    #[must_use]
    pub fn with_drop_rate(mut self, rate: f64) -> Self {
        self.drop_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Probability in `[0, 1]` that an `open` fails.
    #[must_use]
    pub fn with_open_failure_rate(mut self, rate: f64) -> Self {
        self.open_failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    fn closed_event() -> TransportEvent {
        TransportEvent::Lost { reason: "channel closed".to_owned() }
    }

    fn next_payload(&self) -> ChannelEvent {
        let mut rng = self.rng.borrow_mut();
        if rng.random_bool(0.7) {
            let (merchant, low, high) = MERCHANTS[rng.random_range(0..MERCHANTS.len())];
            let amount = f64::from(rng.random_range(low..=high));
            let roll = rng.random_range(0..100u8);
            let (decision, risk_score) = match roll {
                0..6 => ("BLOCK", rng.random_range(90..=100u8)),
                6..10 => ("CHALLENGE", rng.random_range(71..90u8)),
                _ => ("SAFE", rng.random_range(0..41u8)),
            };
            let payload = json!({
                "merchant": merchant,
                "amount": amount,
                "decision": decision,
                "risk_score": risk_score,
                "timestamp": Utc::now(),
            });
            self.ledger.record(payload.clone());
            ChannelEvent::new(events::TRANSACTION_NEW, payload)
        } else {
            let metrics = {
                let mut totals = self.totals.borrow_mut();
                totals.total_transactions += rng.random_range(1..=6);
                totals.clone()
            };
            let mut payload = json!({ "metrics": metrics, "timestamp": Utc::now() });
            if rng.random_bool(0.3) {
                payload["transactions"] = json!({ "changed": true });
            }
            ChannelEvent::new(events::ANALYTICS_UPDATE, payload)
        }
    }
}

impl Transport for SimulatedTransport {
    async fn open(&self) -> Result<(), TransportError> {
        tokio::time::sleep(self.handshake).await;
        if self.rng.borrow_mut().random_bool(self.open_failure_rate) {
            return Err(TransportError::ConnectFailed { reason: "simulated handshake timeout".to_owned() });
        }
        self.open.set(true);
        tracing::debug!("simulated_transport.opened");
        Ok(())
    }

    async fn close(&self) {
        self.open.set(false);
        self.closed.notify_waiters();
    }

    async fn next_event(&self) -> TransportEvent {
        if !self.open.get() {
            return Self::closed_event();
        }
        tokio::select! {
            () = tokio::time::sleep(self.event_interval) => {}
            () = self.closed.notified() => return Self::closed_event(),
        }
        if !self.open.get() {
            return Self::closed_event();
        }
        if self.rng.borrow_mut().random_bool(self.drop_rate) {
            self.open.set(false);
            tracing::debug!("simulated_transport.dropped");
            return TransportEvent::Lost { reason: "simulated network drop".to_owned() };
        }
        TransportEvent::Event(self.next_payload())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
