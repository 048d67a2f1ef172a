// Rust guideline compliant 2026-10-08

//! DEMO adapter for the `Classifier` port.
//!
//! Scores transactions with fixed rules against one hard-coded user
//! baseline (average spend 2 500, deviation 1 200, usual hour 14, five
//! trusted merchants). Latency and failures are simulated with a seedable
//! RNG so reproducible runs are possible.

use std::cell::RefCell;
use std::time::Duration;

use domain::{ClassificationError, Classifier, Decision, DecisionResult, Transaction, clamp_risk_score};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Average amount of the demo user.
const AVG_AMOUNT: f64 = 2_500.0;
/// Standard deviation of the demo user's amounts.
const STD_AMOUNT: f64 = 1_200.0;
/// Merchants the demo user pays regularly.
const TRUSTED_MERCHANTS: [&str; 5] = ["swiggy", "amazon", "bigbasket", "zara", "flipkart"];
/// Name fragments of verified healthcare providers.
const HEALTHCARE: [&str; 5] = ["apollo hospital", "max hospital", "fortis", "manipal hospital", "hospital"];
/// Name fragments of verified education institutions.
const EDUCATION: [&str; 5] = ["university", "college", "school", "iit", "nit"];

/// Rule-based `Classifier` with simulated network behaviour.
#[derive(Debug)]
pub struct DemoClassifier {
    rng: RefCell<StdRng>,
    latency: Duration,
    failure_rate: f64,
}

impl DemoClassifier {
    /// Create a classifier answering after 1.2 s and never failing.
    ///
    /// `seed = Some(s)` produces deterministic jitter; `None` seeds from the OS.
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        Self { rng: RefCell::new(rng), latency: Duration::from_millis(1_200), failure_rate: 0.0 }
    }

    /// Base answer latency; each call adds up to 50 % jitter.
    #[cfg(test)]
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Probability in `[0, 1]` that a call fails as unavailable.
    #[must_use]
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }
}

impl Classifier for DemoClassifier {
    async fn classify(&self, tx: &Transaction) -> Result<DecisionResult, ClassificationError> {
        let (delay, fails) = {
            let mut rng = self.rng.borrow_mut();
            let jitter = rng.random_range(0.0..=0.5);
            (self.latency.mul_f64(1.0 + jitter), rng.random_bool(self.failure_rate))
        };
        tokio::time::sleep(delay).await;
        if fails {
            tracing::debug!(merchant = %tx.merchant, "demo_classifier.unavailable");
            return Err(ClassificationError::Unavailable { reason: "simulated 503 from scoring service".to_owned() });
        }
        let result = score(tx);
        tracing::debug!(
            merchant = %tx.merchant,
            risk_score = result.risk_score,
            decision = %result.decision,
            "demo_classifier.classify"
        );
        Ok(result)
    }

    fn name(&self) -> &str {
        "DEMO"
    }
}

// ---------------------------------------------------------------------------
// Scoring rules
// ---------------------------------------------------------------------------

/// Score `tx` against the demo baseline.
#[must_use]
pub fn score(tx: &Transaction) -> DecisionResult {
    let merchant = tx.merchant.trim().to_lowercase();
    let deviation = (tx.amount - AVG_AMOUNT) / STD_AMOUNT;
    let unusual_hour = tx.time_hour < 6 || tx.time_hour > 22;
    let trusted = TRUSTED_MERCHANTS.contains(&merchant.as_str());
    let healthcare = HEALTHCARE.iter().any(|v| merchant.contains(v));
    let education = EDUCATION.iter().any(|v| merchant.contains(v));

    let probability = (0.2 + 0.02 * deviation.max(0.0)).min(0.9);
    let mut points = probability * 100.0;
    if tx.phone_activity {
        points += 20.0;
    }
    if unusual_hour {
        points += 10.0;
    }
    if !trusted {
        points += 8.0;
    }
    if healthcare {
        points -= 15.0;
    }
    if education {
        points -= 10.0;
    }
    if trusted {
        points -= 20.0;
    }
    let risk_score = clamp_risk_score(points);

    let code = match risk_score {
        90.. => "BLOCK",
        71.. if healthcare || education => "CHALLENGE",
        71.. => "BLOCK",
        41.. if trusted => "SAFE",
        41.. => "CAUTION",
        _ => "SAFE",
    };

    DecisionResult { decision: Decision::from_code(code), risk_score, reasons: reasons(tx, deviation, unusual_hour, trusted) }
}

#[expect(clippy::cast_possible_truncation, reason = "display only; deviation is finite and truncated like the score")]
fn reasons(tx: &Transaction, deviation: f64, unusual_hour: bool, trusted: bool) -> Vec<String> {
    let mut reasons = vec![];
    if tx.phone_activity {
        reasons.push("Phone call detected recently - possible social engineering".to_owned());
    }
    if deviation > 50.0 {
        reasons.push(format!("Amount {}x above your 30-day baseline", deviation as i64));
    } else if deviation > 10.0 {
        reasons.push(format!("Amount {}% above your 30-day baseline", (deviation * 100.0) as i64));
    }
    if unusual_hour {
        let meridiem = if tx.time_hour < 12 { "AM" } else { "PM" };
        reasons.push(format!(
            "Unusual transaction time ({}:00 {meridiem} - outside your active hours)",
            tx.time_hour
        ));
    }
    if !trusted {
        reasons.push("New merchant you've never used before".to_owned());
    }
    reasons
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
