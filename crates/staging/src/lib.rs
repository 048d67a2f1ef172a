// Rust guideline compliant 2026-10-06

//! Staging store -- the transaction in flight and its decision, kept across
//! screen transitions within one session.
//!
//! A typed layer over the [`SessionStore`] port. Every staged transaction
//! carries a version minted on [`StagingStore::put`]; a result is only ever
//! read back against the version it was computed for. [`StagingStore::put`]
//! and [`StagingStore::clear`] each touch both keys in one atomic call.
//!
//! Stored values are JSON. A malformed value is logged and treated as absent.

use domain::{DecisionResult, SessionStore, StagedTransaction, StateIntegrityError, StoreError, Transaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Session keys owned by the staging store.
pub mod keys {
    /// Staged transaction.
    pub const CURRENT_TRANSACTION: &str = "currentTransaction";
    /// Decision result of the staged transaction.
    pub const DECISION_RESULT: &str = "fraudCheckResult";
    /// Draft payment form.
    pub const PAYMENT_DRAFT: &str = "gs-payment";
    /// Theme preference, stored as plain text.
    pub const THEME: &str = "gs-theme";
}

// ---------------------------------------------------------------------------
// StagingError
// ---------------------------------------------------------------------------

/// Errors returned by staging operations that need consistent state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StagingError {
    /// The backing session store failed.
    #[error("session store error: {0}")]
    Store(#[from] StoreError),
    /// Staged state is missing or mismatched; the caller resets to entry.
    #[error("staged state integrity violated: {0}")]
    Integrity(#[from] StateIntegrityError),
}

// ---------------------------------------------------------------------------
// Persisted values
// ---------------------------------------------------------------------------

/// A decision result tagged with the transaction version it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedResult {
    /// Version of the staged transaction the result was computed for.
    pub version: Uuid,
    /// Classifier output.
    pub result: DecisionResult,
}

/// Payment form as last edited, restored when the user comes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDraft {
    /// Merchant or recipient, as typed.
    #[serde(default)]
    pub merchant: String,
    /// Amount, as typed (not yet validated).
    #[serde(default)]
    pub amount: String,
    /// Remember this payee.
    #[serde(default = "default_save_beneficiary")]
    pub save_beneficiary: bool,
    /// A call was active while paying.
    #[serde(default)]
    pub phone_activity: bool,
    /// Free-text note.
    #[serde(default)]
    pub remark: String,
}

fn default_save_beneficiary() -> bool {
    true
}

impl Default for PaymentDraft {
    fn default() -> Self {
        Self {
            merchant: String::new(),
            amount: String::new(),
            save_beneficiary: true,
            phone_activity: false,
            remark: String::new(),
        }
    }
}

/// UI theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemePreference {
    /// Dark theme.
    #[default]
    Dark,
    /// Light theme.
    Light,
}

impl ThemePreference {
    /// Stored text form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }

    /// Parse the stored text form; anything unrecognized is `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            _ => None,
        }
    }

    /// The other theme.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }
}

// ---------------------------------------------------------------------------
// StagingStore
// ---------------------------------------------------------------------------

/// Typed session state for the payment flow.
///
/// Writes and the paired read in [`get_result`](Self::get_result) are
/// serialized, so a result is never written for a transaction that a
/// concurrent [`put`](Self::put) is replacing.
pub struct StagingStore<S: SessionStore> {
    store: S,
    pairing: Mutex<()>,
}

impl<S: SessionStore> StagingStore<S> {
    /// Wrap a session store.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store, pairing: Mutex::new(()) }
    }

    /// The underlying session store.
    #[must_use]
    pub fn session(&self) -> &S {
        &self.store
    }

    /// Stage `transaction` under a fresh version.
    ///
    /// The write and the removal of any previous result are one atomic
    /// store call, so a result never sits next to a transaction it was not
    /// computed for.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the session store fails; the previous
    /// transaction and result are left as they were.
    pub async fn put(&self, transaction: Transaction) -> Result<StagedTransaction, StoreError> {
        let staged = StagedTransaction { version: Uuid::new_v4(), transaction };
        let _pairing = self.pairing.lock().await;
        self.store.replace(keys::CURRENT_TRANSACTION, to_json(&staged)?, &[keys::DECISION_RESULT]).await?;
        tracing::debug!(version = %staged.version, merchant = %staged.transaction.merchant, "staging.put");
        Ok(staged)
    }

    /// The staged transaction, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the session store fails.
    pub async fn get(&self) -> Result<Option<StagedTransaction>, StoreError> {
        self.read_json(keys::CURRENT_TRANSACTION).await
    }

    /// The staged transaction, or [`StateIntegrityError::MissingTransaction`].
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::Integrity`] when nothing is staged and
    /// [`StagingError::Store`] when the session store fails.
    pub async fn require_staged(&self) -> Result<StagedTransaction, StagingError> {
        self.get().await?.ok_or(StagingError::Integrity(StateIntegrityError::MissingTransaction))
    }

    /// Store `result` for the transaction staged under `version`.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::Integrity`] when nothing is staged or a newer
    /// transaction replaced `version`, and [`StagingError::Store`] when the
    /// session store fails.
    pub async fn put_result(&self, version: Uuid, result: &DecisionResult) -> Result<(), StagingError> {
        let _pairing = self.pairing.lock().await;
        let staged = self.require_staged().await?;
        if staged.version != version {
            return Err(StateIntegrityError::VersionMismatch { staged: staged.version, result: version }.into());
        }
        let record = StagedResult { version, result: result.clone() };
        self.write_json(keys::DECISION_RESULT, &record).await?;
        tracing::debug!(%version, decision = %result.decision, "staging.result.put");
        Ok(())
    }

    /// The result paired with the staged transaction.
    ///
    /// `Ok(None)` when no result has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateIntegrityError::OrphanResult`] when a result exists
    /// without a transaction, [`StateIntegrityError::VersionMismatch`] when it
    /// belongs to another version, and [`StagingError::Store`] when the
    /// session store fails.
    pub async fn get_result(&self) -> Result<Option<DecisionResult>, StagingError> {
        let _pairing = self.pairing.lock().await;
        let record: Option<StagedResult> = self.read_json(keys::DECISION_RESULT).await?;
        let staged = self.get().await?;
        match (staged, record) {
            (_, None) => Ok(None),
            (None, Some(_)) => Err(StateIntegrityError::OrphanResult.into()),
            (Some(staged), Some(record)) if staged.version != record.version => {
                Err(StateIntegrityError::VersionMismatch { staged: staged.version, result: record.version }.into())
            }
            (Some(_), Some(record)) => Ok(Some(record.result)),
        }
    }

    /// Remove the staged transaction and its result in one atomic call.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the session store fails; nothing is removed then.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _pairing = self.pairing.lock().await;
        self.store.remove_many(&[keys::CURRENT_TRANSACTION, keys::DECISION_RESULT]).await?;
        tracing::debug!("staging.cleared");
        Ok(())
    }

    /// Last saved payment draft.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the session store fails.
    pub async fn load_draft(&self) -> Result<Option<PaymentDraft>, StoreError> {
        self.read_json(keys::PAYMENT_DRAFT).await
    }

    /// Save the payment draft.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the session store fails.
    pub async fn save_draft(&self, draft: &PaymentDraft) -> Result<(), StoreError> {
        self.write_json(keys::PAYMENT_DRAFT, draft).await
    }

    /// Current theme; unset or unrecognized values give the default.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the session store fails.
    pub async fn theme(&self) -> Result<ThemePreference, StoreError> {
        let raw = self.store.get(keys::THEME).await?;
        Ok(raw.as_deref().and_then(ThemePreference::parse).unwrap_or_default())
    }

    /// Persist the theme.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the session store fails.
    pub async fn set_theme(&self, theme: ThemePreference) -> Result<(), StoreError> {
        self.store.set(keys::THEME, theme.as_str().to_owned()).await
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "staging.read.malformed: treated as absent");
                Ok(None)
            }
        }
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.store.set(key, to_json(value)?).await
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Unavailable { reason: e.to_string() })
}

impl<S: SessionStore> fmt::Debug for StagingStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingStore").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
