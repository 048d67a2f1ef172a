// Rust guideline compliant 2026-10-07

//! Decision state machine -- takes one payment from entry through risk
//! classification to a terminal outcome.
//!
//! ```text
//! Entry -> Staged -> Analyzing -> { Safe | Challenge | Blocked } -> Confirmed
//!                        |
//!                        +-> Failed (retryable) -> Analyzing
//! any state but Confirmed -> Abandoned
//! ```
//!
//! The machine owns the [`StagingStore`] and calls the [`Classifier`]
//! directly. Every staged transaction carries a version; a classifier
//! answer is applied only while its version is still the one being
//! analyzed, so a late answer for a replaced transaction is discarded.
//!
//! Entry points: [`DecisionFlow::stage`], [`DecisionFlow::analyze`],
//! [`DecisionFlow::verify`], [`DecisionFlow::confirm`], [`DecisionFlow::restore`].
//! Configuration via [`FlowConfig::builder`].

mod form;
mod timers;

pub use form::{MAX_AMOUNT, PaymentForm, validate};
pub use timers::{Countdown, PHASES, ProcessingIndicator};

use chrono::{DateTime, Timelike, Utc};
use domain::{
    ClassificationError, Classifier, Decision, DecisionResult, FieldError, FormField, NewNotification,
    NotificationKind, Notifier, SessionStore, StagedTransaction, StateIntegrityError, StoreError, Transaction,
    ValidationError, format_rupees,
};
use staging::{StagingError, StagingStore};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// FlowError
// ---------------------------------------------------------------------------

/// Errors surfaced by [`DecisionFlow`] operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlowError {
    /// The supplied configuration is invalid.
    #[error("invalid flow configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// User input is invalid; the state did not change.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The classifier call failed; the flow is in a retryable state.
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    /// Staged state was missing or mismatched; the flow was reset to entry.
    #[error(transparent)]
    Integrity(#[from] StateIntegrityError),
    /// The session store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The action is not available in the current state.
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        /// Requested action.
        action: &'static str,
        /// State the flow was in.
        state: &'static str,
    },
    /// The resend countdown has not run out yet.
    #[error("OTP can be resent in {remaining_secs} s")]
    ResendNotReady {
        /// Whole seconds left.
        remaining_secs: u64,
    },
}

impl From<StagingError> for FlowError {
    fn from(e: StagingError) -> Self {
        match e {
            StagingError::Store(e) => Self::Store(e),
            StagingError::Integrity(e) => Self::Integrity(e),
        }
    }
}

// ---------------------------------------------------------------------------
// FlowConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`DecisionFlow`].
///
/// Construct via [`FlowConfig::builder`].
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Budget for one classifier call; expiry is a retryable failure.
    pub classifier_timeout: Duration,
    /// Cadence of the cosmetic progress indicator.
    pub progress_tick: Duration,
    /// Percentage added per tick (`1..=100`).
    pub progress_step: u8,
    /// Wait before an OTP may be resent.
    pub resend_countdown: Duration,
    /// Paying user.
    pub user_id: String,
    /// Device fingerprint sent with every transaction.
    pub device_id: String,
    /// Client IP sent with every transaction.
    pub ip_address: String,
}

/// Builder for [`FlowConfig`].
#[derive(Debug)]
pub struct FlowConfigBuilder {
    classifier_timeout: Duration,
    progress_tick: Duration,
    progress_step: u8,
    resend_countdown: Duration,
    user_id: String,
    device_id: String,
    ip_address: String,
}

impl FlowConfig {
    /// Create a builder.
    ///
    /// Default values: `classifier_timeout = 30 s`, `progress_tick = 700 ms`,
    /// `progress_step = 20`, `resend_countdown = 30 s`,
    /// `user_id = "priya_123"`, `device_id = "device-123"`, `ip_address = "1.2.3.4"`.
    #[must_use]
    pub fn builder() -> FlowConfigBuilder {
        FlowConfigBuilder {
            classifier_timeout: Duration::from_secs(30),
            progress_tick: Duration::from_millis(700),
            progress_step: 20,
            resend_countdown: Duration::from_secs(30),
            user_id: "priya_123".to_owned(),
            device_id: "device-123".to_owned(),
            ip_address: "1.2.3.4".to_owned(),
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        let b = Self::builder();
        Self {
            classifier_timeout: b.classifier_timeout,
            progress_tick: b.progress_tick,
            progress_step: b.progress_step,
            resend_countdown: b.resend_countdown,
            user_id: b.user_id,
            device_id: b.device_id,
            ip_address: b.ip_address,
        }
    }
}

impl FlowConfigBuilder {
    /// Override the classifier budget.
    #[must_use]
    pub fn classifier_timeout(mut self, timeout: Duration) -> Self {
        self.classifier_timeout = timeout;
        self
    }

    /// Override the indicator cadence.
    #[must_use]
    pub fn progress_tick(mut self, tick: Duration) -> Self {
        self.progress_tick = tick;
        self
    }

    /// Override the indicator increment.
    #[must_use]
    pub fn progress_step(mut self, step: u8) -> Self {
        self.progress_step = step;
        self
    }

    /// Override the OTP resend wait.
    #[must_use]
    pub fn resend_countdown(mut self, countdown: Duration) -> Self {
        self.resend_countdown = countdown;
        self
    }

    /// Set the identity reported with every transaction.
    #[must_use]
    pub fn identity(mut self, user_id: &str, device_id: &str, ip_address: &str) -> Self {
        user_id.clone_into(&mut self.user_id);
        device_id.clone_into(&mut self.device_id);
        ip_address.clone_into(&mut self.ip_address);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidConfig`] when a duration is zero,
    /// `progress_step` is outside `1..=100`, or `user_id` is blank.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<FlowConfig, FlowError> {
        let invalid = |reason: &str| Err(FlowError::InvalidConfig { reason: reason.to_owned() });
        if self.classifier_timeout.is_zero() {
            return invalid("classifier_timeout must be > 0");
        }
        if self.progress_tick.is_zero() {
            return invalid("progress_tick must be > 0");
        }
        if !(1..=100).contains(&self.progress_step) {
            return invalid("progress_step must be within [1, 100]");
        }
        if self.resend_countdown.is_zero() {
            return invalid("resend_countdown must be > 0");
        }
        if self.user_id.trim().is_empty() {
            return invalid("user_id must not be blank");
        }
        Ok(FlowConfig {
            classifier_timeout: self.classifier_timeout,
            progress_tick: self.progress_tick,
            progress_step: self.progress_step,
            resend_countdown: self.resend_countdown,
            user_id: self.user_id,
            device_id: self.device_id,
            ip_address: self.ip_address,
        })
    }
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Proof of a completed payment.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    /// Payment reference shown to the user.
    pub reference: Uuid,
    /// Merchant paid.
    pub merchant: String,
    /// Amount paid.
    pub amount: f64,
    /// Completion time.
    pub confirmed_at: DateTime<Utc>,
}

/// State of the payment flow.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    /// Nothing staged.
    Entry,
    /// A validated transaction waits for analysis.
    Staged(StagedTransaction),
    /// The classifier call is in flight.
    Analyzing(StagedTransaction),
    /// The classifier call failed; the transaction is kept for a retry.
    Failed {
        /// Transaction to retry.
        staged: StagedTransaction,
        /// Why the call failed.
        error: ClassificationError,
    },
    /// Approved; waits for the user to confirm.
    Safe {
        /// Analyzed transaction.
        staged: StagedTransaction,
        /// Classifier output.
        result: DecisionResult,
    },
    /// Step-up verification required.
    Challenge {
        /// Analyzed transaction.
        staged: StagedTransaction,
        /// Classifier output.
        result: DecisionResult,
        /// Wait before the OTP can be resent.
        countdown: Countdown,
        /// OTPs resent so far.
        resends: u32,
    },
    /// Refused; waits for the user to go back home.
    Blocked {
        /// Analyzed transaction.
        staged: StagedTransaction,
        /// Classifier output.
        result: DecisionResult,
    },
    /// Payment completed.
    Confirmed(Receipt),
    /// Flow left without completing.
    Abandoned,
}

impl FlowState {
    /// Short name for logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Staged(_) => "staged",
            Self::Analyzing(_) => "analyzing",
            Self::Failed { .. } => "failed",
            Self::Safe { .. } => "safe",
            Self::Challenge { .. } => "challenge",
            Self::Blocked { .. } => "blocked",
            Self::Confirmed(_) => "confirmed",
            Self::Abandoned => "abandoned",
        }
    }

    /// The transaction this state is about, if any.
    #[must_use]
    pub fn staged(&self) -> Option<&StagedTransaction> {
        match self {
            Self::Staged(staged)
            | Self::Analyzing(staged)
            | Self::Failed { staged, .. }
            | Self::Safe { staged, .. }
            | Self::Challenge { staged, .. }
            | Self::Blocked { staged, .. } => Some(staged),
            Self::Entry | Self::Confirmed(_) | Self::Abandoned => None,
        }
    }

    /// The decision result, in decision states.
    #[must_use]
    pub fn result(&self) -> Option<&DecisionResult> {
        match self {
            Self::Safe { result, .. } | Self::Challenge { result, .. } | Self::Blocked { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Screen that renders this state.
    #[must_use]
    pub fn screen(&self) -> Screen {
        match self {
            Self::Entry => Screen::Entry,
            Self::Staged(_) => Screen::Review,
            Self::Analyzing(_) => Screen::Processing,
            Self::Failed { .. } => Screen::Retry,
            Self::Safe { .. } => Screen::Safe,
            Self::Challenge { .. } => Screen::Verify,
            Self::Blocked { .. } => Screen::Blocked,
            Self::Confirmed(_) => Screen::Success,
            Self::Abandoned => Screen::Home,
        }
    }

    fn decided(staged: StagedTransaction, result: DecisionResult, resend_countdown: Duration) -> Self {
        match result.decision {
            Decision::Safe => Self::Safe { staged, result },
            Decision::Challenge => {
                Self::Challenge { staged, result, countdown: Countdown::start(resend_countdown), resends: 0 }
            }
            Decision::Block => Self::Blocked { staged, result },
        }
    }
}

/// Screen to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Payment form.
    Entry,
    /// Filled form, ready to submit.
    Review,
    /// Analysis in progress.
    Processing,
    /// Analysis failed, retry offered.
    Retry,
    /// Approved.
    Safe,
    /// OTP entry.
    Verify,
    /// Refused.
    Blocked,
    /// Payment completed.
    Success,
    /// Landing page.
    Home,
}

/// How a call to [`DecisionFlow::analyze`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzeOutcome {
    /// The flow moved to the state for this decision.
    Decided(Decision),
    /// The transaction was replaced or abandoned while the call was in
    /// flight; the answer was dropped.
    Discarded,
}

// ---------------------------------------------------------------------------
// DecisionFlow
// ---------------------------------------------------------------------------

/// Per-payment workflow over a classifier, a session store and a notifier.
///
/// Generic over the three ports for static dispatch. All methods take
/// `&self`; no `RefCell` borrow is held across an `.await`, so a
/// concurrent [`stage`](Self::stage) may replace a transaction under
/// analysis.
pub struct DecisionFlow<C: Classifier, S: SessionStore, N: Notifier> {
    config: FlowConfig,
    classifier: C,
    staging: StagingStore<S>,
    notifier: N,
    state: RefCell<FlowState>,
    indicator: Cell<Option<ProcessingIndicator>>,
    calls: Cell<u64>,
    // Bumped by every analysis and by a superseding `stage`; an analysis
    // only applies its answer while the ticket is still its own.
    ticket: Cell<u64>,
}

impl<C: Classifier, S: SessionStore, N: Notifier> DecisionFlow<C, S, N> {
    /// Create a flow in [`FlowState::Entry`].
    #[must_use]
    pub fn new(config: FlowConfig, classifier: C, staging: StagingStore<S>, notifier: N) -> Self {
        Self {
            config,
            classifier,
            staging,
            notifier,
            state: RefCell::new(FlowState::Entry),
            indicator: Cell::new(None),
            calls: Cell::new(0),
            ticket: Cell::new(0),
        }
    }

    /// Copy of the current state.
    #[must_use]
    pub fn state(&self) -> FlowState {
        self.state.borrow().clone()
    }

    /// Screen for the current state.
    #[must_use]
    pub fn screen(&self) -> Screen {
        self.state.borrow().screen()
    }

    /// Processing indicator of the latest analysis, if one was started.
    #[must_use]
    pub fn indicator(&self) -> Option<ProcessingIndicator> {
        self.indicator.get()
    }

    /// Classifier calls issued so far.
    #[must_use]
    pub fn classifier_calls(&self) -> u64 {
        self.calls.get()
    }

    /// The staging store.
    #[must_use]
    pub fn staging(&self) -> &StagingStore<S> {
        &self.staging
    }

    /// The classifier port.
    #[must_use]
    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Validate `form` and stage it under a new version.
    ///
    /// Allowed from any state. Staging while another transaction is being
    /// analyzed makes that analysis discard its answer.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] (state unchanged, no network call)
    /// or [`FlowError::Store`] (the previous transaction stays staged).
    pub async fn stage(&self, form: &PaymentForm) -> Result<StagedTransaction, FlowError> {
        let (merchant, amount) = validate(form).inspect_err(|e| {
            tracing::debug!(error = %e, "decision_flow.stage.invalid");
        })?;
        let transaction = Transaction {
            user_id: self.config.user_id.clone(),
            merchant,
            amount,
            time_hour: form.time_hour.filter(|h| *h < 24).unwrap_or_else(local_hour),
            phone_activity: form.phone_activity,
            device_id: self.config.device_id.clone(),
            ip_address: self.config.ip_address.clone(),
        };
        // Leave `Analyzing` before the first await so an answer settling
        // while the new transaction is written is already stale.
        let superseded = match &*self.state.borrow() {
            FlowState::Analyzing(previous) => Some(previous.clone()),
            _ => None,
        };
        if let Some(previous) = superseded {
            self.ticket.set(self.ticket.get() + 1);
            tracing::info!(
                previous = %previous.version,
                "decision_flow.stage.superseded: in-flight answer will be discarded"
            );
            self.transition(FlowState::Staged(previous));
        }
        let staged = self.staging.put(transaction).await?;
        self.transition(FlowState::Staged(staged.clone()));
        Ok(staged)
    }

    /// Classify the staged transaction, exactly one call per invocation.
    ///
    /// Allowed from `Staged` and `Failed` (retry). The cosmetic indicator
    /// ticks while the call runs; the transition happens only when the call
    /// settles, success or failure.
    ///
    /// # Errors
    ///
    /// - [`FlowError::Classification`]: the call failed or timed out; the
    ///   flow is `Failed` and the transaction is still staged.
    /// - [`FlowError::Integrity`]: the staged transaction vanished from the
    ///   session; the flow was reset to `Entry`.
    /// - [`FlowError::InvalidTransition`] or [`FlowError::Store`].
    pub async fn analyze(&self) -> Result<AnalyzeOutcome, FlowError> {
        let staged = match &*self.state.borrow() {
            FlowState::Staged(staged) | FlowState::Failed { staged, .. } => staged.clone(),
            other => return Err(FlowError::InvalidTransition { action: "analyze", state: other.name() }),
        };
        self.transition(FlowState::Analyzing(staged.clone()));
        let ticket = self.ticket.get() + 1;
        self.ticket.set(ticket);
        self.indicator.set(Some(ProcessingIndicator::start(self.config.progress_step)));

        let current = match self.staging.require_staged().await {
            Ok(current) => current,
            Err(StagingError::Integrity(e)) => {
                self.reset_if_analyzing(staged.version, ticket).await;
                return Err(e.into());
            }
            Err(StagingError::Store(e)) => {
                self.restore_if_analyzing(&staged, ticket);
                return Err(e.into());
            }
        };
        if current.version != staged.version {
            self.reset_if_analyzing(staged.version, ticket).await;
            return Err(StateIntegrityError::VersionMismatch { staged: current.version, result: staged.version }.into());
        }

        let settled = self.call_classifier(&staged.transaction).await;

        if !self.is_analyzing(staged.version, ticket) {
            tracing::info!(version = %staged.version, "decision_flow.analyze.discarded: transaction replaced");
            return Ok(AnalyzeOutcome::Discarded);
        }
        let result = match settled {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(version = %staged.version, %error, "decision_flow.analyze.failed: retry offered");
                self.transition(FlowState::Failed { staged, error: error.clone() });
                return Err(error.into());
            }
        };

        match self.staging.put_result(staged.version, &result).await {
            Ok(()) => {}
            Err(StagingError::Integrity(e)) => {
                tracing::info!(version = %staged.version, error = %e, "decision_flow.analyze.discarded");
                return Ok(AnalyzeOutcome::Discarded);
            }
            Err(StagingError::Store(e)) => {
                self.restore_if_analyzing(&staged, ticket);
                return Err(e.into());
            }
        }
        if !self.is_analyzing(staged.version, ticket) {
            tracing::info!(version = %staged.version, "decision_flow.analyze.discarded: transaction replaced");
            return Ok(AnalyzeOutcome::Discarded);
        }

        let decision = result.decision;
        tracing::info!(
            version = %staged.version,
            %decision,
            risk_score = result.risk_score,
            classifier = self.classifier.name(),
            "decision_flow.analyze.settled"
        );
        self.notify_decision(&staged.transaction, decision);
        self.transition(FlowState::decided(staged, result, self.config.resend_countdown));
        Ok(AnalyzeOutcome::Decided(decision))
    }

    /// Resend the OTP once the countdown has run out, and restart it.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::ResendNotReady`] while the countdown runs and
    /// [`FlowError::InvalidTransition`] outside `Challenge`.
    pub fn resend_otp(&self) -> Result<Countdown, FlowError> {
        let mut state = self.state.borrow_mut();
        match &mut *state {
            FlowState::Challenge { countdown, resends, .. } => {
                if !countdown.is_expired() {
                    return Err(FlowError::ResendNotReady { remaining_secs: countdown.seconds_left() });
                }
                *countdown = Countdown::start(self.config.resend_countdown);
                *resends += 1;
                tracing::info!(resends = *resends, "decision_flow.otp.resent");
                Ok(*countdown)
            }
            other => Err(FlowError::InvalidTransition { action: "resend OTP", state: other.name() }),
        }
    }

    /// Check the OTP and complete the payment.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] unless `otp` is six digits (state
    /// unchanged), [`FlowError::InvalidTransition`] outside `Challenge`, or
    /// [`FlowError::Store`].
    pub async fn verify(&self, otp: &str) -> Result<Receipt, FlowError> {
        let staged = match &*self.state.borrow() {
            FlowState::Challenge { staged, .. } => staged.clone(),
            other => return Err(FlowError::InvalidTransition { action: "verify", state: other.name() }),
        };
        if !form::is_otp(otp) {
            return Err(ValidationError {
                fields: vec![FieldError { field: FormField::Otp, message: "Enter the 6-digit code".to_owned() }],
            }
            .into());
        }
        self.complete(&staged).await
    }

    /// Acknowledge an approved payment.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidTransition`] outside `Safe`, or [`FlowError::Store`].
    pub async fn confirm(&self) -> Result<Receipt, FlowError> {
        let staged = match &*self.state.borrow() {
            FlowState::Safe { staged, .. } => staged.clone(),
            other => return Err(FlowError::InvalidTransition { action: "confirm", state: other.name() }),
        };
        self.complete(&staged).await
    }

    /// Acknowledge a blocked payment and leave the flow.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidTransition`] outside `Blocked`, or [`FlowError::Store`].
    pub async fn return_home(&self) -> Result<(), FlowError> {
        match &*self.state.borrow() {
            FlowState::Blocked { .. } => {}
            other => return Err(FlowError::InvalidTransition { action: "return home", state: other.name() }),
        }
        self.abandon().await
    }

    /// Leave the flow from any state but `Confirmed`. Idempotent once abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidTransition`] after `Confirmed`, or
    /// [`FlowError::Store`] when the staged state could not be cleared.
    pub async fn cancel(&self) -> Result<(), FlowError> {
        match &*self.state.borrow() {
            FlowState::Confirmed(_) => {
                return Err(FlowError::InvalidTransition { action: "cancel", state: "confirmed" });
            }
            FlowState::Abandoned => return Ok(()),
            _ => {}
        }
        self.abandon().await
    }

    /// Rebuild the state from the session, e.g. after a screen transition.
    ///
    /// Missing, orphaned or mismatched session state resets the flow to
    /// `Entry`; a terminal screen is never shown without its data.
    pub async fn restore(&self) -> Screen {
        let staged = match self.staging.get().await {
            Ok(staged) => staged,
            Err(e) => {
                tracing::warn!(error = %e, "decision_flow.restore.failed: back to entry");
                self.transition(FlowState::Entry);
                return Screen::Entry;
            }
        };
        let result = match self.staging.get_result().await {
            Ok(result) => result,
            Err(StagingError::Integrity(e)) => {
                tracing::warn!(error = %e, "decision_flow.restore.integrity: back to entry");
                self.reset().await;
                return Screen::Entry;
            }
            Err(StagingError::Store(e)) => {
                tracing::warn!(error = %e, "decision_flow.restore.failed: back to entry");
                self.transition(FlowState::Entry);
                return Screen::Entry;
            }
        };
        let next = match (staged, result) {
            (None, _) => FlowState::Entry,
            (Some(staged), None) => FlowState::Staged(staged),
            (Some(staged), Some(result)) => FlowState::decided(staged, result, self.config.resend_countdown),
        };
        let screen = next.screen();
        self.transition(next);
        screen
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn call_classifier(&self, tx: &Transaction) -> Result<DecisionResult, ClassificationError> {
        self.calls.set(self.calls.get() + 1);
        let call = tokio::time::timeout(self.config.classifier_timeout, self.classifier.classify(tx));
        tokio::pin!(call);
        let tick = self.config.progress_tick;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
        loop {
            tokio::select! {
                biased;
                settled = &mut call => {
                    return settled.unwrap_or_else(|_| {
                        let after_ms = u64::try_from(self.config.classifier_timeout.as_millis()).unwrap_or(u64::MAX);
                        Err(ClassificationError::Timeout { after_ms })
                    });
                }
                _ = ticker.tick() => {
                    if let Some(mut indicator) = self.indicator.get() {
                        indicator.advance();
                        self.indicator.set(Some(indicator));
                    }
                }
            }
        }
    }

    async fn complete(&self, staged: &StagedTransaction) -> Result<Receipt, FlowError> {
        self.staging.clear().await?;
        let receipt = Receipt {
            reference: Uuid::new_v4(),
            merchant: staged.transaction.merchant.clone(),
            amount: staged.transaction.amount,
            confirmed_at: Utc::now(),
        };
        tracing::info!(reference = %receipt.reference, "decision_flow.confirmed");
        self.transition(FlowState::Confirmed(receipt.clone()));
        Ok(receipt)
    }

    async fn abandon(&self) -> Result<(), FlowError> {
        self.staging.clear().await?;
        self.transition(FlowState::Abandoned);
        Ok(())
    }

    /// Best-effort clear, then `Entry`.
    async fn reset(&self) {
        if let Err(e) = self.staging.clear().await {
            tracing::warn!(error = %e, "decision_flow.reset.clear_failed");
        }
        self.transition(FlowState::Entry);
    }

    async fn reset_if_analyzing(&self, version: Uuid, ticket: u64) {
        if self.is_analyzing(version, ticket) {
            self.reset().await;
        }
    }

    fn restore_if_analyzing(&self, staged: &StagedTransaction, ticket: u64) {
        if self.is_analyzing(staged.version, ticket) {
            self.transition(FlowState::Staged(staged.clone()));
        }
    }

    fn is_analyzing(&self, version: Uuid, ticket: u64) -> bool {
        self.ticket.get() == ticket && matches!(&*self.state.borrow(), FlowState::Analyzing(s) if s.version == version)
    }

    fn notify_decision(&self, tx: &Transaction, decision: Decision) {
        let amount = format_rupees(tx.amount);
        let merchant = &tx.merchant;
        let notification = match decision {
            Decision::Block => {
                NewNotification::new(NotificationKind::Fraud, "Fraud blocked", format!("{amount} blocked from {merchant}"))
            }
            Decision::Challenge => NewNotification::new(
                NotificationKind::Alert,
                "Verification required",
                format!("{amount} to {merchant} needs a quick check"),
            ),
            Decision::Safe => NewNotification::new(
                NotificationKind::Safe,
                "Transaction approved",
                format!("{amount} to {merchant} approved"),
            ),
        };
        self.notifier.notify(notification);
    }

    fn transition(&self, next: FlowState) {
        let previous = self.state.replace(next);
        tracing::debug!(from = previous.name(), to = self.state.borrow().name(), "decision_flow.transition");
    }
}

impl<C: Classifier, S: SessionStore, N: Notifier> fmt::Debug for DecisionFlow<C, S, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionFlow")
            .field("config", &self.config)
            .field("classifier", &self.classifier.name())
            .field("state", &self.state.borrow().name())
            .field("calls", &self.calls.get())
            .finish_non_exhaustive()
    }
}

fn local_hour() -> u8 {
    u8::try_from(chrono::Local::now().hour()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{AnalyzeOutcome, DecisionFlow, FlowConfig, FlowError, FlowState, PaymentForm, Screen};
    use domain::{
        ClassificationError, Classifier, Decision, DecisionResult, FormField, NewNotification, NotificationKind,
        Notifier, SessionStore, StateIntegrityError, StoreError, Transaction,
    };
    use staging::{StagingStore, keys};
    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;
    use std::time::Duration;
    use tokio::time::sleep;

    // ------------------------------------------------------------------
    // Mock ports
    // ------------------------------------------------------------------

    /// Replies from a script; each reply waits `latency` first. An empty
    /// script never answers.
    struct ScriptedClassifier {
        replies: RefCell<VecDeque<(Duration, Result<DecisionResult, ClassificationError>)>>,
        seen: RefCell<Vec<Transaction>>,
    }

    impl ScriptedClassifier {
        fn new() -> Self {
            Self { replies: RefCell::new(VecDeque::new()), seen: RefCell::new(vec![]) }
        }

        fn reply(self, latency: Duration, reply: Result<DecisionResult, ClassificationError>) -> Self {
            self.replies.borrow_mut().push_back((latency, reply));
            self
        }

        fn answer(self, decision: Decision, risk_score: u8, reasons: &[&str]) -> Self {
            let result = DecisionResult {
                decision,
                risk_score,
                reasons: reasons.iter().map(|r| (*r).to_owned()).collect(),
            };
            self.reply(Duration::from_millis(300), Ok(result))
        }
    }

    impl Classifier for ScriptedClassifier {
        async fn classify(&self, tx: &Transaction) -> Result<DecisionResult, ClassificationError> {
            self.seen.borrow_mut().push(tx.clone());
            let next = self.replies.borrow_mut().pop_front();
            match next {
                Some((latency, reply)) => {
                    sleep(latency).await;
                    reply
                }
                None => std::future::pending().await,
            }
        }

        fn name(&self) -> &str {
            "SCRIPTED"
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        values: RefCell<HashMap<String, String>>,
        broken: Cell<bool>,
        // Writes suspend this long before they take effect, like a database.
        write_delay: Cell<Duration>,
    }

    impl MemoryStore {
        async fn write(&self) -> Result<(), StoreError> {
            let delay = self.write_delay.get();
            if !delay.is_zero() {
                sleep(delay).await;
            }
            if self.broken.get() {
                return Err(StoreError::Unavailable { reason: "broken".to_owned() });
            }
            Ok(())
        }
    }

    /// Lets two flows share one session, like two screens of one tab.
    #[derive(Clone, Default)]
    struct SharedStore(Rc<MemoryStore>);

    impl SessionStore for SharedStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            if self.0.broken.get() {
                return Err(StoreError::Unavailable { reason: "broken".to_owned() });
            }
            Ok(self.0.values.borrow().get(key).cloned())
        }

        async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
            self.0.write().await?;
            self.0.values.borrow_mut().insert(key.to_owned(), value);
            Ok(())
        }

        async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
            self.0.write().await?;
            let mut values = self.0.values.borrow_mut();
            for key in keys {
                values.remove(*key);
            }
            Ok(())
        }

        async fn replace(&self, key: &str, value: String, remove: &[&str]) -> Result<(), StoreError> {
            self.0.write().await?;
            let mut values = self.0.values.borrow_mut();
            for key in remove {
                values.remove(*key);
            }
            values.insert(key.to_owned(), value);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier(RefCell<Vec<NewNotification>>);

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: NewNotification) -> uuid::Uuid {
            self.0.borrow_mut().push(notification);
            uuid::Uuid::new_v4()
        }
    }

    type Flow = DecisionFlow<ScriptedClassifier, SharedStore, Rc<RecordingNotifier>>;

    fn flow_with(classifier: ScriptedClassifier, store: &SharedStore, notifier: &Rc<RecordingNotifier>) -> Flow {
        DecisionFlow::new(FlowConfig::default(), classifier, StagingStore::new(store.clone()), Rc::clone(notifier))
    }

    fn setup(classifier: ScriptedClassifier) -> (Flow, SharedStore, Rc<RecordingNotifier>) {
        let store = SharedStore::default();
        let notifier = Rc::new(RecordingNotifier::default());
        (flow_with(classifier, &store, &notifier), store, notifier)
    }

    fn swiggy() -> PaymentForm {
        PaymentForm::new("Swiggy", "450").at_hour(13)
    }

    fn kyc() -> PaymentForm {
        PaymentForm::new("KYC Update Services", "50000").at_hour(2).with_phone_activity(true)
    }

    // ------------------------------------------------------------------
    // Config
    // ------------------------------------------------------------------

    #[test]
    fn config_defaults_and_validation() {
        let config = FlowConfig::default();
        assert_eq!(config.classifier_timeout, Duration::from_secs(30));
        assert_eq!(config.progress_tick, Duration::from_millis(700));
        assert_eq!(config.progress_step, 20);
        assert_eq!(config.resend_countdown, Duration::from_secs(30));

        assert!(FlowConfig::builder().progress_step(0).build().is_err());
        assert!(FlowConfig::builder().classifier_timeout(Duration::ZERO).build().is_err());
        assert!(FlowConfig::builder().identity(" ", "d", "ip").build().is_err());
        assert!(FlowConfig::builder().identity("u", "d", "ip").build().is_ok());
    }

    // ------------------------------------------------------------------
    // Staging and validation
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn invalid_form_stays_in_entry_without_a_call() {
        let (flow, _, _) = setup(ScriptedClassifier::new());

        let err = flow.stage(&PaymentForm::new("S", "2000000")).await.unwrap_err();

        let FlowError::Validation(validation) = err else { panic!("expected validation error, got {err:?}") };
        assert_eq!(validation.message_for(FormField::Merchant), Some("Name too short"));
        assert_eq!(validation.message_for(FormField::Amount), Some("Amount exceeds limit (\u{20b9}10,00,000)"));
        assert_eq!(flow.state(), FlowState::Entry);
        assert_eq!(flow.classifier_calls(), 0);
        assert_eq!(flow.staging().get().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stage_fills_identity_from_config() {
        let (flow, _, _) = setup(ScriptedClassifier::new());

        let staged = flow.stage(&swiggy()).await.unwrap();

        assert_eq!(flow.screen(), Screen::Review);
        assert_eq!(staged.transaction.user_id, "priya_123");
        assert_eq!(staged.transaction.device_id, "device-123");
        assert_eq!(staged.transaction.ip_address, "1.2.3.4");
        assert_eq!(staged.transaction.time_hour, 13);
        assert_eq!(flow.staging().get().await.unwrap(), Some(staged));
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_requires_a_staged_transaction() {
        let (flow, _, _) = setup(ScriptedClassifier::new());
        let err = flow.analyze().await.unwrap_err();
        assert_eq!(err, FlowError::InvalidTransition { action: "analyze", state: "entry" });
    }

    // ------------------------------------------------------------------
    // Decisions
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn high_risk_payment_is_blocked_with_classifier_reasons() {
        let classifier = ScriptedClassifier::new().answer(Decision::Block, 94, &["Velocity spike"]);
        let (flow, _, notifier) = setup(classifier);
        flow.stage(&kyc()).await.unwrap();

        let outcome = flow.analyze().await.unwrap();

        assert_eq!(outcome, AnalyzeOutcome::Decided(Decision::Block));
        let FlowState::Blocked { result, staged } = flow.state() else { panic!("expected Blocked") };
        assert_eq!(result.risk_score, 94);
        assert_eq!(result.reasons, vec!["Velocity spike".to_owned()]);
        assert_eq!(staged.transaction.time_hour, 2);
        assert!(staged.transaction.phone_activity);
        {
            let seen = flow.classifier().seen.borrow();
            assert_eq!(seen[0].merchant, "KYC Update Services");
            assert!((seen[0].amount - 50_000.0).abs() < f64::EPSILON);
        }
        assert_eq!(flow.screen(), Screen::Blocked);
        assert_eq!(flow.staging().get_result().await.unwrap(), Some(result));

        let sent = notifier.0.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::Fraud);
        assert_eq!(sent[0].message, "\u{20b9}50,000 blocked from KYC Update Services");
    }

    #[tokio::test(start_paused = true)]
    async fn each_code_reaches_its_state() {
        for (decision, screen) in
            [(Decision::Safe, Screen::Safe), (Decision::Challenge, Screen::Verify), (Decision::Block, Screen::Blocked)]
        {
            let (flow, _, _) = setup(ScriptedClassifier::new().answer(decision, 50, &[]));
            flow.stage(&swiggy()).await.unwrap();
            flow.analyze().await.unwrap();
            assert_eq!(flow.screen(), screen, "decision {decision}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_code_falls_back_to_challenge() {
        let result: DecisionResult =
            serde_json::from_str(r#"{"decision":"CAUTION","risk_score":55,"reasons":["New merchant"]}"#).unwrap();
        let (flow, _, notifier) = setup(ScriptedClassifier::new().reply(Duration::from_millis(10), Ok(result)));
        flow.stage(&swiggy()).await.unwrap();

        assert_eq!(flow.analyze().await.unwrap(), AnalyzeOutcome::Decided(Decision::Challenge));
        assert_eq!(flow.screen(), Screen::Verify);
        assert_eq!(notifier.0.borrow()[0].kind, NotificationKind::Alert);
    }

    // ------------------------------------------------------------------
    // Failures and retry
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn timeout_is_retryable_and_keeps_the_transaction() {
        // First call never answers; the retry answers SAFE.
        let classifier = ScriptedClassifier::new();
        let (flow, _, notifier) = setup(classifier);
        let staged = flow.stage(&swiggy()).await.unwrap();

        let err = flow.analyze().await.unwrap_err();

        assert_eq!(err, FlowError::Classification(ClassificationError::Timeout { after_ms: 30_000 }));
        assert!(matches!(flow.state(), FlowState::Failed { .. }));
        assert_eq!(flow.screen(), Screen::Retry);
        assert_eq!(flow.staging().get().await.unwrap(), Some(staged.clone()));
        assert!(notifier.0.borrow().is_empty());

        flow.classifier().replies.borrow_mut().push_back((
            Duration::from_millis(200),
            Ok(DecisionResult { decision: Decision::Safe, risk_score: 12, reasons: vec![] }),
        ));
        assert_eq!(flow.analyze().await.unwrap(), AnalyzeOutcome::Decided(Decision::Safe));

        assert_eq!(flow.classifier_calls(), 2);
        assert_eq!(flow.classifier().seen.borrow().len(), 2);
        assert_eq!(flow.state().staged(), Some(&staged));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_never_escalate_to_blocked() {
        let unavailable = || Err(ClassificationError::Unavailable { reason: "503".to_owned() });
        let classifier = ScriptedClassifier::new()
            .reply(Duration::from_millis(10), unavailable())
            .reply(Duration::from_millis(10), unavailable())
            .reply(Duration::from_millis(10), unavailable());
        let (flow, _, _) = setup(classifier);
        flow.stage(&swiggy()).await.unwrap();

        for _ in 0..3 {
            assert!(matches!(flow.analyze().await, Err(FlowError::Classification(_))));
            assert!(matches!(flow.state(), FlowState::Failed { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_analyze_while_in_flight_is_refused() {
        let (flow, _, _) = setup(ScriptedClassifier::new().answer(Decision::Safe, 10, &[]));
        flow.stage(&swiggy()).await.unwrap();

        let (first, second) = tokio::join!(flow.analyze(), async {
            sleep(Duration::from_millis(50)).await;
            flow.analyze().await
        });

        assert_eq!(first.unwrap(), AnalyzeOutcome::Decided(Decision::Safe));
        assert_eq!(second.unwrap_err(), FlowError::InvalidTransition { action: "analyze", state: "analyzing" });
        assert_eq!(flow.classifier_calls(), 1);
    }

    // ------------------------------------------------------------------
    // Re-entrancy and progress
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn late_answer_for_a_replaced_transaction_is_discarded() {
        let classifier = ScriptedClassifier::new()
            .reply(
                Duration::from_secs(5),
                Ok(DecisionResult { decision: Decision::Block, risk_score: 94, reasons: vec![] }),
            )
            .answer(Decision::Safe, 8, &[]);
        let (flow, _, notifier) = setup(classifier);
        flow.stage(&kyc()).await.unwrap();

        let (late, restaged) = tokio::join!(flow.analyze(), async {
            sleep(Duration::from_secs(1)).await;
            flow.stage(&swiggy()).await.unwrap()
        });

        assert_eq!(late.unwrap(), AnalyzeOutcome::Discarded);
        assert_eq!(flow.state(), FlowState::Staged(restaged.clone()));
        assert_eq!(flow.staging().get_result().await.unwrap(), None);
        assert!(notifier.0.borrow().is_empty());

        assert_eq!(flow.analyze().await.unwrap(), AnalyzeOutcome::Decided(Decision::Safe));
        assert_eq!(flow.state().staged(), Some(&restaged));
    }

    #[tokio::test(start_paused = true)]
    async fn restaging_on_a_slow_store_discards_the_old_answer() {
        let (flow, store, notifier) = setup(ScriptedClassifier::new().answer(Decision::Block, 96, &["Reported merchant"]));
        flow.stage(&kyc()).await.unwrap();
        store.0.write_delay.set(Duration::from_millis(10));

        // The answer settles at 300 ms, while the new transaction is being written.
        let (late, restaged) = tokio::join!(flow.analyze(), async {
            sleep(Duration::from_millis(295)).await;
            flow.stage(&swiggy()).await.unwrap()
        });

        assert_eq!(late.unwrap(), AnalyzeOutcome::Discarded);
        assert_eq!(flow.state(), FlowState::Staged(restaged.clone()));
        assert!(notifier.0.borrow().is_empty());
        assert_eq!(flow.staging().get().await.unwrap(), Some(restaged));
        assert_eq!(flow.staging().get_result().await.unwrap(), None);
        assert_eq!(flow.restore().await, Screen::Review);
    }

    #[tokio::test(start_paused = true)]
    async fn answer_landing_during_result_write_is_not_applied() {
        let (flow, store, notifier) = setup(ScriptedClassifier::new().answer(Decision::Block, 96, &[]));
        flow.stage(&kyc()).await.unwrap();
        store.0.write_delay.set(Duration::from_millis(10));

        // The result write runs from 300 ms to 310 ms; the restage lands inside it.
        let (late, restaged) = tokio::join!(flow.analyze(), async {
            sleep(Duration::from_millis(305)).await;
            flow.stage(&swiggy()).await.unwrap()
        });

        assert_eq!(late.unwrap(), AnalyzeOutcome::Discarded);
        assert!(notifier.0.borrow().is_empty());
        assert_eq!(flow.state(), FlowState::Staged(restaged.clone()));
        assert_eq!(flow.staging().get().await.unwrap(), Some(restaged));
        assert_eq!(flow.staging().get_result().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_restage_still_discards_and_allows_a_retry() {
        let classifier = ScriptedClassifier::new()
            .reply(
                Duration::from_secs(2),
                Ok(DecisionResult { decision: Decision::Block, risk_score: 94, reasons: vec![] }),
            )
            .answer(Decision::Block, 94, &[]);
        let (flow, store, notifier) = setup(classifier);
        let staged = flow.stage(&kyc()).await.unwrap();

        let (late, restaged) = tokio::join!(flow.analyze(), async {
            sleep(Duration::from_secs(1)).await;
            store.0.broken.set(true);
            let restaged = flow.stage(&swiggy()).await;
            store.0.broken.set(false);
            restaged
        });

        assert!(matches!(restaged, Err(FlowError::Store(_))));
        assert_eq!(late.unwrap(), AnalyzeOutcome::Discarded);
        assert!(notifier.0.borrow().is_empty());
        assert_eq!(flow.state(), FlowState::Staged(staged));

        assert_eq!(flow.analyze().await.unwrap(), AnalyzeOutcome::Decided(Decision::Block));
        assert_eq!(notifier.0.borrow().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn indicator_does_not_gate_the_transition() {
        let classifier = ScriptedClassifier::new().reply(
            Duration::from_secs(10),
            Ok(DecisionResult { decision: Decision::Safe, risk_score: 5, reasons: vec![] }),
        );
        let (flow, _, _) = setup(classifier);
        flow.stage(&swiggy()).await.unwrap();

        let (outcome, ()) = tokio::join!(flow.analyze(), async {
            sleep(Duration::from_millis(1_500)).await;
            let indicator = flow.indicator().unwrap();
            assert_eq!(indicator.progress(), 40);
            assert_eq!(indicator.phase(), 2);

            sleep(Duration::from_secs(5)).await;
            let indicator = flow.indicator().unwrap();
            assert!(indicator.is_complete());
            assert_eq!(indicator.label(), "Finalizing decision...");
            assert_eq!(flow.screen(), Screen::Processing, "full bar must not end the analysis");
        });

        assert_eq!(outcome.unwrap(), AnalyzeOutcome::Decided(Decision::Safe));
    }

    // ------------------------------------------------------------------
    // Challenge
    // ------------------------------------------------------------------

    async fn challenged() -> (Flow, SharedStore, Rc<RecordingNotifier>) {
        let (flow, store, notifier) = setup(ScriptedClassifier::new().answer(Decision::Challenge, 68, &["New merchant"]));
        flow.stage(&swiggy()).await.unwrap();
        flow.analyze().await.unwrap();
        (flow, store, notifier)
    }

    #[tokio::test(start_paused = true)]
    async fn resend_waits_for_the_countdown() {
        let (flow, _, _) = challenged().await;

        assert_eq!(flow.resend_otp().unwrap_err(), FlowError::ResendNotReady { remaining_secs: 30 });

        tokio::time::advance(Duration::from_secs(30)).await;
        let countdown = flow.resend_otp().unwrap();

        assert_eq!(countdown.seconds_left(), 30);
        let FlowState::Challenge { resends, .. } = flow.state() else { panic!("expected Challenge") };
        assert_eq!(resends, 1);
        assert!(matches!(flow.resend_otp(), Err(FlowError::ResendNotReady { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn verify_confirms_and_clears_staging() {
        let (flow, _, _) = challenged().await;

        let err = flow.verify("12ab").await.unwrap_err();
        let FlowError::Validation(validation) = err else { panic!("expected validation error") };
        assert_eq!(validation.message_for(FormField::Otp), Some("Enter the 6-digit code"));
        assert_eq!(flow.screen(), Screen::Verify);

        let receipt = flow.verify("482913").await.unwrap();

        assert_eq!(receipt.merchant, "Swiggy");
        assert_eq!(flow.state(), FlowState::Confirmed(receipt));
        assert_eq!(flow.staging().get().await.unwrap(), None);
        assert_eq!(flow.staging().get_result().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_abandons_and_clears_staging() {
        let (flow, _, _) = challenged().await;

        flow.cancel().await.unwrap();
        flow.cancel().await.unwrap();

        assert_eq!(flow.state(), FlowState::Abandoned);
        assert_eq!(flow.screen(), Screen::Home);
        assert_eq!(flow.staging().get().await.unwrap(), None);
    }

    // ------------------------------------------------------------------
    // Terminal acknowledgements
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn safe_confirm_and_blocked_return_home() {
        let (flow, _, _) = setup(ScriptedClassifier::new().answer(Decision::Safe, 12, &[]));
        flow.stage(&swiggy()).await.unwrap();
        flow.analyze().await.unwrap();
        assert_eq!(
            flow.return_home().await.unwrap_err(),
            FlowError::InvalidTransition { action: "return home", state: "safe" }
        );
        assert!(matches!(flow.state(), FlowState::Safe { .. }));
        flow.confirm().await.unwrap();
        assert_eq!(flow.screen(), Screen::Success);
        assert!(matches!(flow.cancel().await, Err(FlowError::InvalidTransition { .. })));

        let (flow, _, _) = setup(ScriptedClassifier::new().answer(Decision::Block, 94, &[]));
        flow.stage(&kyc()).await.unwrap();
        flow.analyze().await.unwrap();
        assert!(flow.confirm().await.is_err());
        flow.return_home().await.unwrap();
        assert_eq!(flow.state(), FlowState::Abandoned);
        assert_eq!(flow.staging().get().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_clear_keeps_the_state() {
        let (flow, store, _) = setup(ScriptedClassifier::new().answer(Decision::Safe, 12, &[]));
        flow.stage(&swiggy()).await.unwrap();
        flow.analyze().await.unwrap();

        store.0.broken.set(true);
        assert!(matches!(flow.confirm().await, Err(FlowError::Store(_))));

        assert_eq!(flow.screen(), Screen::Safe);
    }

    // ------------------------------------------------------------------
    // Restore
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn restore_rebuilds_the_decision_screen() {
        let (first, store, notifier) = setup(ScriptedClassifier::new().answer(Decision::Block, 94, &["Velocity spike"]));
        first.stage(&kyc()).await.unwrap();
        first.analyze().await.unwrap();

        let second = flow_with(ScriptedClassifier::new(), &store, &notifier);

        assert_eq!(second.restore().await, Screen::Blocked);
        assert_eq!(second.state().result().map(|r| r.risk_score), Some(94));
    }

    #[tokio::test(start_paused = true)]
    async fn restore_without_staged_state_goes_to_entry() {
        let (flow, _, _) = setup(ScriptedClassifier::new());
        assert_eq!(flow.restore().await, Screen::Entry);

        flow.stage(&swiggy()).await.unwrap();
        assert_eq!(flow.restore().await, Screen::Review);
    }

    #[tokio::test(start_paused = true)]
    async fn restore_with_mismatched_result_resets_to_entry() {
        let (flow, store, _) = setup(ScriptedClassifier::new());
        flow.stage(&swiggy()).await.unwrap();
        let foreign = serde_json::json!({
            "version": uuid::Uuid::new_v4(),
            "result": { "decision": "SAFE", "risk_score": 3, "reasons": [] },
        });
        store.set(keys::DECISION_RESULT, foreign.to_string()).await.unwrap();

        assert_eq!(flow.restore().await, Screen::Entry);

        assert_eq!(flow.state(), FlowState::Entry);
        assert_eq!(flow.staging().get().await.unwrap(), None);
        assert!(store.0.values.borrow().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_after_session_was_cleared_resets_to_entry() {
        let (flow, store, _) = setup(ScriptedClassifier::new().answer(Decision::Safe, 1, &[]));
        flow.stage(&swiggy()).await.unwrap();
        store.remove_many(&[keys::CURRENT_TRANSACTION]).await.unwrap();

        let err = flow.analyze().await.unwrap_err();

        assert_eq!(err, FlowError::Integrity(StateIntegrityError::MissingTransaction));
        assert_eq!(flow.state(), FlowState::Entry);
        assert_eq!(flow.classifier_calls(), 0);
    }
}
