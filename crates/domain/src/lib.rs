// Rust guideline compliant 2026-10-02

//! Shared domain types for the Guardian sync and decision-flow engine.
//!
//! Defines the data model (transactions, decision results, notifications,
//! metrics snapshots, channel events), the error kinds shared across
//! components, and the hexagonal port traits: `Transport`, `Classifier`,
//! `Fetcher`, `MetricsSource`, `SessionStore`, and `Notifier`.
//! All components depend on this crate; no other workspace crate is imported here.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Live channel
// ---------------------------------------------------------------------------

/// Names of the live channel events the engine consumes.
pub mod events {
    /// A transaction was recorded server-side. Used purely as an invalidation signal.
    pub const TRANSACTION_NEW: &str = "transaction:new";
    /// Partial analytics update: optional `metrics`, `trend`, `transactions`.
    pub const ANALYTICS_UPDATE: &str = "analytics:update";
}

/// Connection state of the single live channel.
///
/// Owned by the connection manager; every other component only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No channel open (initial state).
    #[default]
    Disconnected,
    /// An open attempt is in progress.
    Connecting,
    /// The channel is open and delivering events.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// What connection observers receive on every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Current open attempt, starting at 1. `0` when idle or connected; after
    /// the attempt budget runs out it keeps the number of failed attempts.
    pub attempt: u32,
}

/// A named event received on the live channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    /// Event name, e.g. [`events::TRANSACTION_NEW`].
    pub name: String,
    /// JSON payload; `Value::Null` when the event carries none.
    pub payload: serde_json::Value,
}

impl ChannelEvent {
    /// Build an event with a payload.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { name: name.into(), payload }
    }

    /// Build a payload-less signal event.
    #[must_use]
    pub fn signal(name: impl Into<String>) -> Self {
        Self::new(name, serde_json::Value::Null)
    }
}

/// What a transport yields while open.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// An application event.
    Event(ChannelEvent),
    /// The physical channel dropped.
    Lost {
        /// Human-readable description.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Transactions and decisions
// ---------------------------------------------------------------------------

/// A payment the user is about to make, as sent to the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Paying user.
    pub user_id: String,
    /// Merchant or recipient name.
    pub merchant: String,
    /// Amount in rupees, range `(0, 1_000_000]`.
    pub amount: f64,
    /// Local hour of day, `0..=23`.
    pub time_hour: u8,
    /// `true` when a phone call was active around the payment.
    pub phone_activity: bool,
    /// Device fingerprint.
    pub device_id: String,
    /// Client IP address.
    pub ip_address: String,
}

/// A transaction held by the staging store, tagged with the version minted on `put`.
///
/// The version is the identity that pairs a [`DecisionResult`] with the
/// transaction it was computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedTransaction {
    /// Minted on every stage; never reused.
    pub version: uuid::Uuid,
    /// The staged payment.
    pub transaction: Transaction,
}

/// Classifier verdict.
///
/// Wire codes are matched case-insensitively. Any code outside the three
/// known ones maps to [`Decision::Challenge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Decision {
    /// Approve without friction.
    Safe,
    /// Step-up verification required.
    Challenge,
    /// Refuse the payment.
    Block,
}

impl Decision {
    /// Map a wire code to a decision. Unknown codes become `Challenge`.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "SAFE" => Self::Safe,
            "CHALLENGE" => Self::Challenge,
            "BLOCK" => Self::Block,
            other => {
                tracing::warn!(code = other, "domain.decision.unknown_code: mapped to CHALLENGE");
                Self::Challenge
            }
        }
    }

    /// Wire code for this decision.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Challenge => "CHALLENGE",
            Self::Block => "BLOCK",
        }
    }
}

impl From<String> for Decision {
    fn from(code: String) -> Self {
        Self::from_code(&code)
    }
}

impl From<Decision> for String {
    fn from(decision: Decision) -> Self {
        decision.code().to_owned()
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Clamp a raw classifier score into `[0, 100]`. `NaN` is treated as maximal risk.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "value is rounded and clamped to [0, 100] first"
)]
pub fn clamp_risk_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 100;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

fn deserialize_risk_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    Ok(clamp_risk_score(raw))
}

/// Classifier output for one staged transaction. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    /// Verdict.
    pub decision: Decision,
    /// Risk score in `[0, 100]`.
    #[serde(deserialize_with = "deserialize_risk_score")]
    pub risk_score: u8,
    /// Ordered, human-readable reasons.
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Format a rupee amount with Indian digit grouping, e.g. `₹10,00,000`.
///
/// Fractional paise are shown only when present (`₹1,234.50`).
#[must_use]
pub fn format_rupees(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", amount.abs());
    let (whole, paise) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::new();
    if whole.len() > 3 {
        let (head, tail) = whole.split_at(whole.len() - 3);
        let lead = head.len() % 2;
        for (i, c) in head.chars().enumerate() {
            if i > 0 && (i + 2 - lead) % 2 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        grouped.push(',');
        grouped.push_str(tail);
    } else {
        grouped.push_str(whole);
    }
    if paise == "00" {
        format!("{sign}\u{20b9}{grouped}")
    } else {
        format!("{sign}\u{20b9}{grouped}.{paise}")
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Category of a user-facing alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Fraud blocked.
    Fraud,
    /// Something needs attention.
    Alert,
    /// Payment went through.
    Safe,
}

/// An entry of the notification feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique id assigned on insertion.
    pub id: uuid::Uuid,
    /// Category.
    pub kind: NotificationKind,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Flips false -> true only.
    pub read: bool,
}

/// Caller-supplied part of a notification; id, time and read flag are assigned on insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    /// Category.
    pub kind: NotificationKind,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
}

impl NewNotification {
    /// Build a notification payload.
    #[must_use]
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind, title: title.into(), message: message.into() }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// One point of the risk trend series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Calendar day.
    pub date: NaiveDate,
    /// Value for that day.
    pub value: f64,
}

/// Aggregate counters, as carried by `analytics:update` and the polling endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Transactions seen today.
    pub total_transactions: u64,
    /// Transactions blocked today.
    pub fraud_blocked: u64,
    /// Sum of blocked amounts.
    pub amount_saved: f64,
    /// Percentage of SAFE decisions.
    pub success_rate: f64,
}

/// Partial metrics update; absent fields leave prior state unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsUpdate {
    /// New counters, if present.
    #[serde(default)]
    pub metrics: Option<Metrics>,
    /// New trend series, if present.
    #[serde(default)]
    pub trend: Option<Vec<TrendPoint>>,
}

/// A polled metrics update with the time it was observed at the source.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsReading {
    /// Observed values.
    pub update: MetricsUpdate,
    /// Source-side observation time.
    pub observed_at: DateTime<Utc>,
}

/// Immutable metrics snapshot, replaced wholesale on every accepted update.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// Transactions seen today.
    pub total_transactions: u64,
    /// Transactions blocked today.
    pub fraud_blocked: u64,
    /// Sum of blocked amounts.
    pub amount_saved: f64,
    /// Percentage of SAFE decisions.
    pub success_rate: f64,
    /// Ordered trend series.
    pub trend: Vec<TrendPoint>,
    /// Timestamp of the update that produced this snapshot.
    pub as_of: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Empty snapshot dated at the Unix epoch, so any real update wins.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_metrics(&Metrics::default(), DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Snapshot with the given counters, an empty trend and timestamp `as_of`.
    #[must_use]
    pub fn from_metrics(metrics: &Metrics, as_of: DateTime<Utc>) -> Self {
        Self {
            total_transactions: metrics.total_transactions,
            fraud_blocked: metrics.fraud_blocked,
            amount_saved: metrics.amount_saved,
            success_rate: metrics.success_rate,
            trend: vec![],
            as_of,
        }
    }
}

// ---------------------------------------------------------------------------
// Query keys
// ---------------------------------------------------------------------------

/// Cache key namespaces.
pub mod namespaces {
    /// Filtered transaction history.
    pub const TRANSACTIONS: &str = "transactions";
    /// Merchant intelligence lookups.
    pub const MERCHANT_INTEL: &str = "merchant-intel";
}

/// Key of a server-derived collection: a namespace plus its query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    /// Collection namespace, e.g. [`namespaces::TRANSACTIONS`].
    pub namespace: String,
    /// Query parameters (filters), ordered for stable hashing.
    pub params: BTreeMap<String, String>,
}

impl QueryKey {
    /// Key for the whole collection, no parameters.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), params: BTreeMap::new() }
    }

    /// Add one query parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.namespace)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{k}={v}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Live channel failures. Reported as state, never thrown across components.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// The channel could not be opened.
    #[error("connect failed: {reason}")]
    ConnectFailed {
        /// Human-readable description.
        reason: String,
    },
    /// The channel is closed.
    #[error("channel closed")]
    Closed,
}

/// Failure raised by one event-bus handler. Captured; the fan-out continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    /// The event payload did not have the expected shape.
    #[error("malformed payload: {reason}")]
    Payload {
        /// Human-readable description.
        reason: String,
    },
    /// The handler could not apply the event.
    #[error("handler failed: {reason}")]
    Failed {
        /// Human-readable description.
        reason: String,
    },
}

/// Source-of-record fetch failures (query cache, metrics polling).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// The source could not be reached.
    #[error("source unavailable: {reason}")]
    Unavailable {
        /// Human-readable description.
        reason: String,
    },
    /// The source answered with something unusable.
    #[error("invalid response: {reason}")]
    InvalidResponse {
        /// Human-readable description.
        reason: String,
    },
}

/// Classifier call failures. Always retryable; never turned into a decision.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassificationError {
    /// No answer within the configured timeout.
    #[error("classifier timed out after {after_ms} ms")]
    Timeout {
        /// Elapsed budget in milliseconds.
        after_ms: u64,
    },
    /// The classifier could not be reached.
    #[error("classifier unavailable: {reason}")]
    Unavailable {
        /// Human-readable description.
        reason: String,
    },
    /// The classifier answered with something unusable.
    #[error("invalid classifier response: {reason}")]
    InvalidResponse {
        /// Human-readable description.
        reason: String,
    },
}

/// Form field a validation message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    /// Merchant or recipient name.
    Merchant,
    /// Payment amount.
    Amount,
    /// One-time password.
    Otp,
}

/// One field-level validation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Offending field.
    pub field: FormField,
    /// User-facing message.
    pub message: String,
}

/// Local, user-correctable input errors. Block a transition, no retry needed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation failed on {} field(s)", .fields.len())]
pub struct ValidationError {
    /// Messages per offending field, in form order.
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    /// Message for `field`, if it failed.
    #[must_use]
    pub fn message_for(&self, field: FormField) -> Option<&str> {
        self.fields.iter().find(|e| e.field == field).map(|e| e.message.as_str())
    }
}

/// Staged state is missing or mismatched. Resolved by resetting to entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateIntegrityError {
    /// A step needed a staged transaction and there is none.
    #[error("no staged transaction")]
    MissingTransaction,
    /// A result exists but belongs to another transaction version.
    #[error("result for version {result} does not match staged version {staged}")]
    VersionMismatch {
        /// Version of the staged transaction.
        staged: uuid::Uuid,
        /// Version the result was computed for.
        result: uuid::Uuid,
    },
    /// A result exists without any staged transaction.
    #[error("result present without a staged transaction")]
    OrphanResult,
}

/// Session key/value store failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be used.
    #[error("session store unavailable: {reason}")]
    Unavailable {
        /// Human-readable description.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Hexagonal port: the physical live channel.
///
/// Only the connection manager drives this trait. Implementations must
/// tolerate `close` on an already-closed channel.
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait Transport {
    /// Open the channel.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectFailed` when the channel cannot be opened.
    async fn open(&self) -> Result<(), TransportError>;

    /// Close the channel. Idempotent.
    async fn close(&self);

    /// Wait for the next event or for the channel to drop.
    async fn next_event(&self) -> TransportEvent;
}

/// Hexagonal port: the external risk classifier.
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait Classifier {
    /// Score one transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`ClassificationError`] when the call fails. Timeouts are
    /// enforced by the caller.
    async fn classify(&self, tx: &Transaction) -> Result<DecisionResult, ClassificationError>;

    /// Name of this classifier (e.g. `"DEMO"`).
    fn name(&self) -> &str;
}

/// Hexagonal port: source-of-record fetch behind the query cache.
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait Fetcher {
    /// Collection value type.
    type Value: Clone;

    /// Fetch the current value for `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when the source cannot answer.
    async fn fetch(&self, key: &QueryKey) -> Result<Self::Value, FetchError>;
}

/// Hexagonal port: polling source for live metrics.
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait MetricsSource {
    /// Read the current metrics.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when the source cannot answer.
    async fn poll(&self) -> Result<MetricsReading, FetchError>;
}

/// Hexagonal port: session-scoped string key/value store.
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait SessionStore {
    /// Read `key`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` when the store cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `key`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` when the store cannot be written.
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Remove every key in `keys` as one atomic operation: either all are
    /// gone afterwards or none was touched.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` when the store cannot be written.
    async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError>;

    /// Write `key` and remove every key in `remove` as one atomic
    /// operation: a reader never sees the new value next to a removed key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` when the store cannot be written;
    /// nothing was touched then.
    async fn replace(&self, key: &str, value: String, remove: &[&str]) -> Result<(), StoreError>;
}

/// Hexagonal port: user-facing notification delivery.
pub trait Notifier {
    /// Deliver a notification and return the id it was stored under.
    fn notify(&self, notification: NewNotification) -> uuid::Uuid;
}

impl<N: Notifier + ?Sized> Notifier for Rc<N> {
    fn notify(&self, notification: NewNotification) -> uuid::Uuid {
        (**self).notify(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn make_tx() -> Transaction {
        Transaction {
            user_id: "priya_123".to_owned(),
            merchant: "Swiggy".to_owned(),
            amount: 450.0_f64,
            time_hour: 13,
            phone_activity: false,
            device_id: "device-123".to_owned(),
            ip_address: "1.2.3.4".to_owned(),
        }
    }

    // ------------------------------------------------------------------
    // Decision codes
    // ------------------------------------------------------------------

    #[test]
    fn known_codes_map_to_their_decision() {
        assert_eq!(Decision::from_code("SAFE"), Decision::Safe);
        assert_eq!(Decision::from_code("CHALLENGE"), Decision::Challenge);
        assert_eq!(Decision::from_code("BLOCK"), Decision::Block);
    }

    #[test]
    fn codes_are_case_insensitive() {
        assert_eq!(Decision::from_code("block"), Decision::Block);
        assert_eq!(Decision::from_code(" Safe "), Decision::Safe);
    }

    #[test]
    fn unknown_codes_map_to_challenge() {
        for code in ["CAUTION", "", "APPROVE", "ALLOW", "null"] {
            assert_eq!(Decision::from_code(code), Decision::Challenge, "code {code:?}");
        }
    }

    #[test]
    fn decision_result_decodes_classifier_response() {
        let raw = r#"{"decision":"BLOCK","risk_score":94,"reasons":["Velocity spike"]}"#;
        let result: DecisionResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.decision, Decision::Block);
        assert_eq!(result.risk_score, 94);
        assert_eq!(result.reasons, vec!["Velocity spike".to_owned()]);
    }

    #[test]
    fn decision_result_clamps_score_and_defaults_reasons() {
        let raw = r#"{"decision":"CAUTION","risk_score":130.4}"#;
        let result: DecisionResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.decision, Decision::Challenge);
        assert_eq!(result.risk_score, 100);
        assert!(result.reasons.is_empty());

        assert_eq!(clamp_risk_score(-3.0), 0);
        assert_eq!(clamp_risk_score(41.6), 42);
        assert_eq!(clamp_risk_score(f64::NAN), 100);
    }

    #[test]
    fn transaction_serializes_with_wire_field_names() {
        let value = serde_json::to_value(make_tx()).unwrap();
        for field in ["user_id", "merchant", "amount", "time_hour", "phone_activity", "device_id", "ip_address"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
    }

    // ------------------------------------------------------------------
    // Misc types
    // ------------------------------------------------------------------

    #[test]
    fn metrics_update_accepts_partial_payloads() {
        let update: MetricsUpdate =
            serde_json::from_value(serde_json::json!({ "metrics": { "totalTransactions": 5, "fraudBlocked": 1, "amountSaved": 10.0, "successRate": 80.0 } }))
                .unwrap();
        assert_eq!(update.metrics.unwrap().total_transactions, 5);
        assert!(update.trend.is_none());
    }

    #[test]
    fn query_key_display_is_stable() {
        let key = QueryKey::new(namespaces::TRANSACTIONS).with_param("status", "blocked").with_param("limit", "10");
        assert_eq!(key.to_string(), "transactions?limit=10&status=blocked");
    }

    #[test]
    fn rupees_use_indian_grouping() {
        assert_eq!(format_rupees(450.0), "\u{20b9}450");
        assert_eq!(format_rupees(50_000.0), "\u{20b9}50,000");
        assert_eq!(format_rupees(1_000_000.0), "\u{20b9}10,00,000");
        assert_eq!(format_rupees(4_230_000.0), "\u{20b9}42,30,000");
        assert_eq!(format_rupees(1_234.5), "\u{20b9}1,234.50");
    }

    #[test]
    fn validation_error_lookup() {
        let err = ValidationError {
            fields: vec![FieldError { field: FormField::Amount, message: "Enter an amount".to_owned() }],
        };
        assert_eq!(err.message_for(FormField::Amount), Some("Enter an amount"));
        assert_eq!(err.message_for(FormField::Merchant), None);
        assert_eq!(err.to_string(), "validation failed on 1 field(s)");
    }

    #[test]
    fn error_messages() {
        assert_eq!(ClassificationError::Timeout { after_ms: 30_000 }.to_string(), "classifier timed out after 30000 ms");
        assert_eq!(StateIntegrityError::MissingTransaction.to_string(), "no staged transaction");
        assert_eq!(TransportError::Closed.to_string(), "channel closed");
    }

    #[test]
    fn rc_notifier_delegates() {
        struct Recorder(RefCell<Vec<String>>);
        impl Notifier for Recorder {
            fn notify(&self, notification: NewNotification) -> uuid::Uuid {
                self.0.borrow_mut().push(notification.title);
                uuid::Uuid::nil()
            }
        }
        let recorder = Rc::new(Recorder(RefCell::new(vec![])));
        let shared = Rc::clone(&recorder);
        shared.notify(NewNotification::new(NotificationKind::Safe, "ok", "done"));
        assert_eq!(recorder.0.borrow().as_slice(), ["ok"]);
    }

    /// Verify that minimal port implementations compile and satisfy all methods.
    #[tokio::test]
    async fn port_trait_struct_impl() {
        struct AllPorts;

        impl Classifier for AllPorts {
            async fn classify(&self, _tx: &Transaction) -> Result<DecisionResult, ClassificationError> {
                Ok(DecisionResult { decision: Decision::Safe, risk_score: 5, reasons: vec![] })
            }

            fn name(&self) -> &str {
                "minimal"
            }
        }

        impl Fetcher for AllPorts {
            type Value = u32;

            async fn fetch(&self, _key: &QueryKey) -> Result<u32, FetchError> {
                Ok(7)
            }
        }

        let ports = AllPorts;
        let result = ports.classify(&make_tx()).await.unwrap();
        assert_eq!(result.decision, Decision::Safe);
        assert_eq!(ports.name(), "minimal");
        assert_eq!(ports.fetch(&QueryKey::new("x")).await.unwrap(), 7);
    }
}
