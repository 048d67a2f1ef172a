// Rust guideline compliant 2026-10-08

//! DEMO adapter for the `Fetcher` port, plus the shared [`Ledger`].
//!
//! The ledger records every transaction the simulated channel announces;
//! the fetcher serves the `transactions` namespace from it and answers
//! `merchant-intel` lookups from a small built-in directory. Values are JSON,
//! shaped like the backend responses.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use domain::{FetchError, Fetcher, QueryKey, namespaces};
use serde_json::{Value, json};

/// Maximum number of transactions kept in the ledger.
const LEDGER_CAPACITY: usize = 200;
/// Page size when the key carries no `limit`.
const DEFAULT_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Recent transactions as announced on the live channel, newest first.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: RefCell<VecDeque<Value>>,
}

impl Ledger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one transaction payload.
    pub fn record(&self, entry: Value) {
        let mut entries = self.entries.borrow_mut();
        entries.push_front(entry);
        entries.truncate(LEDGER_CAPACITY);
    }

    /// Up to `limit` entries, optionally filtered on their `decision` code.
    #[must_use]
    pub fn recent(&self, decision: Option<&str>, limit: usize) -> Vec<Value> {
        self.entries
            .borrow()
            .iter()
            .filter(|e| match decision {
                Some(code) => e.get("decision").and_then(Value::as_str).is_some_and(|d| d.eq_ignore_ascii_case(code)),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// DemoFetcher
// ---------------------------------------------------------------------------

/// `Fetcher` adapter answering from the [`Ledger`] after a fixed latency.
#[derive(Debug)]
pub struct DemoFetcher {
    ledger: Rc<Ledger>,
    latency: Duration,
}

impl DemoFetcher {
    /// Create a fetcher over `ledger` answering after 150 ms.
    #[must_use]
    pub fn new(ledger: Rc<Ledger>) -> Self {
        Self { ledger, latency: Duration::from_millis(150) }
    }
}

impl Fetcher for DemoFetcher {
    type Value = Value;

    async fn fetch(&self, key: &QueryKey) -> Result<Value, FetchError> {
        tokio::time::sleep(self.latency).await;
        match key.namespace.as_str() {
            namespaces::TRANSACTIONS => {
                let limit = match key.params.get("limit") {
                    Some(raw) => raw.parse::<usize>().map_err(|e| FetchError::InvalidResponse {
                        reason: format!("limit {raw:?}: {e}"),
                    })?,
                    None => DEFAULT_LIMIT,
                };
                let rows = self.ledger.recent(key.params.get("status").map(String::as_str), limit);
                Ok(json!({ "total": rows.len(), "transactions": rows }))
            }
            namespaces::MERCHANT_INTEL => {
                let name = key.params.get("merchant").map_or("", String::as_str);
                Ok(merchant_intel(name))
            }
            other => Err(FetchError::Unavailable { reason: format!("no such collection: {other}") }),
        }
    }
}

fn merchant_intel(name: &str) -> Value {
    let lower = name.to_lowercase();
    let (category, verified, trust_score) = if lower.contains("hospital") || lower.contains("fortis") {
        ("healthcare", true, 92)
    } else if ["university", "college", "school"].iter().any(|v| lower.contains(v)) {
        ("education", true, 88)
    } else if ["swiggy", "amazon", "bigbasket", "zara", "flipkart"].contains(&lower.as_str()) {
        ("retail", true, 95)
    } else if lower.contains("kyc") || lower.contains("refund") || lower.contains("lottery") {
        ("reported", false, 8)
    } else {
        ("unknown", false, 50)
    };
    json!({ "merchant": name, "category": category, "verified": verified, "trust_score": trust_score })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
