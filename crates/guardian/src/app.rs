// Rust guideline compliant 2026-10-09

//! Wiring shared by both entry points.
//!
//! [`Guardian`] owns one instance of every component, connected to the demo
//! adapters. [`Guardian::run`] drives the live pipeline (event bus pump,
//! query-cache refresh loop, metrics polling) concurrently with a scripted
//! walkthrough of the payment flow, and shuts the loops down when the
//! script ends. Everything runs on one `current_thread` runtime.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context as _;
use connection::{ConnectionManager, ReconnectPolicy, StateWatch};
use decision_flow::{AnalyzeOutcome, DecisionFlow, FlowConfig, FlowError, PaymentForm, Screen};
use domain::{Decision, QueryKey, SessionStore, format_rupees, namespaces};
use event_bus::{EventBus, Subscription};
use live_metrics::{LiveMetricsConfig, LiveMetricsStore};
use notifications::NotificationQueue;
use query_cache::{CachePolicy, QueryCache};
use staging::{PaymentDraft, StagingStore};
use tracing::Instrument as _;

use crate::adapters::demo_classifier::DemoClassifier;
use crate::adapters::demo_fetcher::{DemoFetcher, Ledger};
use crate::adapters::demo_metrics_source::DemoMetricsSource;
use crate::adapters::simulated_transport::SimulatedTransport;

/// Classifier calls per payment before the walkthrough gives up on it.
const MAX_ANALYZE_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Process-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// `GUARDIAN_SEED`: fixes every RNG for a reproducible run.
    pub seed: Option<u64>,
    /// Pause between two scripted payments.
    pub pause: Duration,
    /// Cadence of the simulated live channel.
    pub event_interval: Duration,
    /// Probability that the simulated channel drops per event.
    pub drop_rate: f64,
    /// Probability that a simulated handshake fails.
    pub open_failure_rate: f64,
    /// Probability that a demo classifier call fails.
    pub classifier_failure_rate: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            seed: None,
            pause: Duration::from_secs(3),
            event_interval: Duration::from_secs(2),
            drop_rate: 0.02,
            open_failure_rate: 0.2,
            classifier_failure_rate: 0.15,
        }
    }
}

impl Settings {
    /// Defaults, with `GUARDIAN_SEED` (optional, `u64`) applied.
    ///
    /// # Errors
    ///
    /// Returns an error when `GUARDIAN_SEED` is set but not a `u64`.
    pub fn from_env() -> anyhow::Result<Self> {
        let seed = std::env::var("GUARDIAN_SEED")
            .ok()
            .map(|raw| raw.parse::<u64>().with_context(|| format!("GUARDIAN_SEED={raw:?} is not a u64")))
            .transpose()?;
        Ok(Self { seed, ..Self::default() })
    }

    fn seed_for(&self, component: u64) -> Option<u64> {
        self.seed.map(|s| s.wrapping_add(component))
    }
}

// ---------------------------------------------------------------------------
// Walkthrough script
// ---------------------------------------------------------------------------

/// One payment the walkthrough types into the form.
struct ScriptedPayment {
    merchant: &'static str,
    amount: &'static str,
    phone_activity: bool,
    hour: u8,
    otp: &'static str,
}

const SCRIPT: [ScriptedPayment; 5] = [
    ScriptedPayment { merchant: "Swiggy", amount: "450", phone_activity: false, hour: 13, otp: "" },
    ScriptedPayment { merchant: "S", amount: "0", phone_activity: false, hour: 13, otp: "" },
    ScriptedPayment { merchant: "KYC Update Services", amount: "\u{20b9}50,000", phone_activity: true, hour: 2, otp: "" },
    ScriptedPayment { merchant: "Apollo Hospital", amount: "80000", phone_activity: false, hour: 11, otp: "482913" },
    ScriptedPayment { merchant: "Croma", amount: "20,000", phone_activity: false, hour: 15, otp: "120384" },
];

// ---------------------------------------------------------------------------
// Guardian
// ---------------------------------------------------------------------------

/// Every component, wired to the demo adapters.
pub struct Guardian<S: SessionStore> {
    manager: ConnectionManager<SimulatedTransport>,
    bus: EventBus,
    cache: Rc<QueryCache<DemoFetcher>>,
    metrics: Rc<LiveMetricsStore>,
    source: DemoMetricsSource,
    notifications: Rc<NotificationQueue>,
    flow: DecisionFlow<DemoClassifier, S, Rc<NotificationQueue>>,
    pause: Duration,
    _subscriptions: Vec<Subscription>,
    _watches: [StateWatch; 2],
}

impl<S: SessionStore> Guardian<S> {
    /// Build every component on top of `store`.
    ///
    /// # Errors
    ///
    /// Returns an error when a component configuration is rejected.
    pub fn new(store: S, settings: &Settings) -> anyhow::Result<Self> {
        let mut policy = ReconnectPolicy::builder();
        if let Some(seed) = settings.seed_for(1) {
            policy = policy.seed(seed);
        }
        let policy = policy.build().context("failed to build reconnect policy")?;

        let ledger = Rc::new(Ledger::new());
        let transport = SimulatedTransport::new(Rc::clone(&ledger), settings.seed_for(2))
            .with_event_interval(settings.event_interval)
            .with_drop_rate(settings.drop_rate)
            .with_open_failure_rate(settings.open_failure_rate);
        let manager = ConnectionManager::new(transport, policy);
        let status = manager.on_state_change(|status| {
            tracing::info!(state = %status.state, attempt = status.attempt, "guardian.connection.status");
        });

        let bus = EventBus::new();
        let cache_policy = CachePolicy::builder().build().context("failed to build cache policy")?;
        let cache = Rc::new(QueryCache::new(DemoFetcher::new(ledger), cache_policy));
        let metrics_config = LiveMetricsConfig::builder().build().context("failed to build metrics config")?;
        let metrics = Rc::new(LiveMetricsStore::new(metrics_config));
        let notifications = Rc::new(NotificationQueue::new());

        let reconnect = cache.watch_connection(&manager);
        let mut subscriptions = cache.attach(&bus);
        subscriptions.push(metrics.attach(&bus));
        subscriptions.push(notifications.attach(&bus));

        let flow_config = FlowConfig::builder().build().context("failed to build flow config")?;
        let flow = DecisionFlow::new(
            flow_config,
            DemoClassifier::new(settings.seed_for(3)).with_failure_rate(settings.classifier_failure_rate),
            StagingStore::new(store),
            Rc::clone(&notifications),
        );

        Ok(Self {
            manager,
            bus,
            cache,
            metrics,
            source: DemoMetricsSource::new(settings.seed_for(4)),
            notifications,
            flow,
            pause: settings.pause,
            _subscriptions: subscriptions,
            _watches: [status, reconnect],
        })
    }

    /// Run the pipeline and the walkthrough until the walkthrough ends.
    ///
    /// # Errors
    ///
    /// Returns the walkthrough's error, after the pipeline has stopped.
    pub async fn run(&self) -> anyhow::Result<()> {
        let state = self.manager.connect().await;
        tracing::info!(%state, "guardian.started");

        let (events, rounds, polls, walkthrough) = tokio::join!(
            self.bus.run(&self.manager).instrument(tracing::info_span!("event_bus")),
            self.cache.run().instrument(tracing::info_span!("query_cache")),
            self.metrics.run_polling(&self.source).instrument(tracing::info_span!("live_metrics")),
            async {
                let r = self.walkthrough().await;
                // Stop the loops so join! resolves.
                self.shutdown().await;
                r
            }
            .instrument(tracing::info_span!("walkthrough")),
        );
        tracing::info!(events, rounds, polls, "guardian.stopped");
        walkthrough
    }

    /// Stop every background loop. Idempotent.
    pub async fn shutdown(&self) {
        self.manager.disconnect().await;
        self.cache.close();
        self.metrics.stop();
        tracing::info!("guardian.shutdown");
    }

    async fn walkthrough(&self) -> anyhow::Result<()> {
        let staging = self.flow.staging();
        let theme = staging.theme().await.context("failed to read theme")?.toggled();
        staging.set_theme(theme).await.context("failed to save theme")?;
        tracing::info!(theme = theme.as_str(), "guardian.walkthrough.theme");

        if let Some(draft) = staging.load_draft().await.context("failed to read draft")? {
            tracing::info!(merchant = %draft.merchant, amount = %draft.amount, "guardian.walkthrough.draft_found");
        }
        let screen = self.flow.restore().await;
        if screen != Screen::Entry {
            tracing::info!(?screen, "guardian.walkthrough.resumed: abandoning previous payment");
            self.flow.cancel().await.context("failed to abandon previous payment")?;
        }

        for payment in &SCRIPT {
            tokio::time::sleep(self.pause).await;
            self.pay(payment).await?;
            self.report(payment.merchant);
        }

        let unread = self.notifications.unread_count();
        for n in self.notifications.items() {
            tracing::info!(kind = ?n.kind, title = %n.title, message = %n.message, "guardian.walkthrough.notification");
        }
        tracing::info!(unread, marked = self.notifications.mark_all(), "guardian.walkthrough.done");
        Ok(())
    }

    async fn pay(&self, payment: &ScriptedPayment) -> anyhow::Result<()> {
        let draft = PaymentDraft {
            merchant: payment.merchant.to_owned(),
            amount: payment.amount.to_owned(),
            phone_activity: payment.phone_activity,
            ..PaymentDraft::default()
        };
        self.flow.staging().save_draft(&draft).await.context("failed to save draft")?;

        let form = PaymentForm::from(&draft).at_hour(payment.hour);
        match self.flow.stage(&form).await {
            Ok(staged) => {
                tracing::info!(version = %staged.version, merchant = %staged.transaction.merchant, "guardian.walkthrough.staged");
            }
            Err(FlowError::Validation(e)) => {
                for field in &e.fields {
                    tracing::warn!(field = ?field.field, message = %field.message, "guardian.walkthrough.invalid");
                }
                return Ok(());
            }
            Err(e) => return Err(e).context("failed to stage payment"),
        }

        let mut outcome = self.flow.analyze().await;
        let mut attempt = 1;
        while let Err(FlowError::Classification(e)) = &outcome
            && attempt < MAX_ANALYZE_ATTEMPTS
        {
            tracing::warn!(attempt, error = %e, "guardian.walkthrough.retrying");
            attempt += 1;
            outcome = self.flow.analyze().await;
        }

        match outcome {
            Ok(AnalyzeOutcome::Decided(decision)) => self.settle(decision, payment.otp).await,
            Ok(AnalyzeOutcome::Discarded) => {
                tracing::info!("guardian.walkthrough.discarded");
                Ok(())
            }
            Err(FlowError::Classification(e)) => {
                tracing::warn!(attempts = attempt, error = %e, "guardian.walkthrough.gave_up");
                self.flow.cancel().await.context("failed to cancel payment")
            }
            Err(e) => Err(e).context("analysis failed"),
        }
    }

    async fn settle(&self, decision: Decision, otp: &str) -> anyhow::Result<()> {
        // A screen transition rebuilds the state from the session.
        let screen = self.flow.restore().await;
        let state = self.flow.state();
        if let Some(result) = state.result() {
            tracing::info!(
                %decision,
                risk_score = result.risk_score,
                reasons = ?result.reasons,
                ?screen,
                "guardian.walkthrough.decided"
            );
        }

        match decision {
            Decision::Safe => {
                let receipt = self.flow.confirm().await.context("failed to confirm payment")?;
                tracing::info!(reference = %receipt.reference, amount = %format_rupees(receipt.amount), "guardian.walkthrough.paid");
            }
            Decision::Challenge => {
                if let Err(FlowError::ResendNotReady { remaining_secs }) = self.flow.resend_otp() {
                    tracing::debug!(remaining_secs, "guardian.walkthrough.resend_wait");
                }
                let receipt = self.flow.verify(otp).await.context("failed to verify OTP")?;
                tracing::info!(reference = %receipt.reference, amount = %format_rupees(receipt.amount), "guardian.walkthrough.verified");
            }
            Decision::Block => {
                self.flow.return_home().await.context("failed to leave blocked payment")?;
                tracing::info!(screen = ?self.flow.screen(), "guardian.walkthrough.blocked");
            }
        }
        Ok(())
    }

    fn report(&self, merchant: &str) {
        // Reads never wait; a miss schedules a refresh for the cache loop.
        let recent = self.cache.get(&QueryKey::new(namespaces::TRANSACTIONS).with_param("limit", "5"));
        let blocked = self.cache.get(&QueryKey::new(namespaces::TRANSACTIONS).with_param("status", "BLOCK"));
        let intel = self.cache.get(&QueryKey::new(namespaces::MERCHANT_INTEL).with_param("merchant", merchant));
        let snapshot = self.metrics.snapshot();
        tracing::info!(
            recent = recent.as_ref().and_then(|v| v["total"].as_u64()),
            blocked = blocked.as_ref().and_then(|v| v["total"].as_u64()),
            merchant_trust = intel.as_ref().and_then(|v| v["trust_score"].as_u64()),
            total_transactions = snapshot.total_transactions,
            fraud_blocked = snapshot.fraud_blocked,
            amount_saved = %format_rupees(snapshot.amount_saved),
            unread = self.notifications.unread_count(),
            connection = %self.manager.state(),
            "guardian.walkthrough.dashboard"
        );
    }
}

impl<S: SessionStore> fmt::Debug for Guardian<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guardian")
            .field("manager", &self.manager)
            .field("cache", &self.cache)
            .field("metrics", &self.metrics)
            .field("notifications", &self.notifications)
            .field("flow", &self.flow)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
