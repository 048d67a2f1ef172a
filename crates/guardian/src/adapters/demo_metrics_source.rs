// Rust guideline compliant 2026-10-08

//! DEMO adapter for the `MetricsSource` port.
//!
//! Starts from the dashboard's fallback figures (1 523 transactions, 87
//! blocked, 42.3 lakh saved, 94.3 % success) and drifts them upward on each
//! poll. The seven-day risk trend is fixed.

use std::cell::RefCell;

use chrono::{Days, Utc};
use domain::{FetchError, Metrics, MetricsReading, MetricsSource, MetricsUpdate, TrendPoint};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Average risk per day, oldest first.
const RISK_TREND: [f64; 7] = [23.0, 28.0, 25.0, 31.0, 27.0, 29.0, 26.0];

/// `MetricsSource` adapter producing plausible, slowly growing counters.
#[derive(Debug)]
pub struct DemoMetricsSource {
    metrics: RefCell<Metrics>,
    rng: RefCell<StdRng>,
}

impl DemoMetricsSource {
    /// Create a source; `seed` as for the demo classifier.
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        Self {
            metrics: RefCell::new(Metrics {
                total_transactions: 1_523,
                fraud_blocked: 87,
                amount_saved: 4_230_000.0,
                success_rate: 94.3,
            }),
            rng: RefCell::new(rng),
        }
    }
}

impl MetricsSource for DemoMetricsSource {
    async fn poll(&self) -> Result<MetricsReading, FetchError> {
        let metrics = {
            let mut rng = self.rng.borrow_mut();
            let mut metrics = self.metrics.borrow_mut();
            let seen = rng.random_range(0..=12);
            let blocked = u64::from(rng.random_ratio(1, 8));
            metrics.total_transactions += seen;
            metrics.fraud_blocked += blocked;
            if blocked > 0 {
                metrics.amount_saved += f64::from(rng.random_range(5_000_u32..=80_000));
            }
            metrics.clone()
        };
        let today = Utc::now().date_naive();
        let trend = RISK_TREND
            .iter()
            .zip((0..7u64).rev())
            .filter_map(|(value, back)| today.checked_sub_days(Days::new(back)).map(|date| TrendPoint { date, value: *value }))
            .collect();
        tracing::debug!(total = metrics.total_transactions, blocked = metrics.fraud_blocked, "demo_metrics.poll");
        Ok(MetricsReading {
            update: MetricsUpdate { metrics: Some(metrics), trend: Some(trend) },
            observed_at: Utc::now(),
        })
    }
}
