// Rust guideline compliant 2026-10-07

//! Cosmetic processing indicator and the OTP resend countdown.
//!
//! Both are display state only: neither gates a transition of the flow.

use std::time::Duration;
use tokio::time::Instant;

/// Labels shown while a transaction is being analyzed, in order.
pub const PHASES: [&str; 5] = [
    "Verifying user identity...",
    "Analyzing behavioral patterns...",
    "Checking merchant reputation...",
    "Calculating risk score...",
    "Finalizing decision...",
];

/// Progress bar state while ANALYZING.
///
/// Advances on a fixed tick and holds at 100 % on the last phase until the
/// classifier call settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingIndicator {
    progress: u8,
    phase: usize,
    step: u8,
    started_at: Instant,
}

impl ProcessingIndicator {
    pub(crate) fn start(step: u8) -> Self {
        Self { progress: 0, phase: 0, step, started_at: Instant::now() }
    }

    pub(crate) fn advance(&mut self) {
        self.progress = self.progress.saturating_add(self.step).min(100);
        self.phase = (self.phase + 1).min(PHASES.len() - 1);
    }

    /// Percentage shown, `0..=100`.
    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Index into [`PHASES`].
    #[must_use]
    pub fn phase(&self) -> usize {
        self.phase
    }

    /// Label of the current phase.
    #[must_use]
    pub fn label(&self) -> &'static str {
        PHASES[self.phase]
    }

    /// `true` once the bar is full.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.progress >= 100
    }

    /// Time since the analysis started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Time left before an OTP can be resent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    started_at: Instant,
    duration: Duration,
}

impl Countdown {
    pub(crate) fn start(duration: Duration) -> Self {
        Self { started_at: Instant::now(), duration }
    }

    /// Time left; zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.started_at.elapsed())
    }

    /// Whole seconds left, rounded up, as displayed.
    #[must_use]
    pub fn seconds_left(&self) -> u64 {
        let left = self.remaining();
        left.as_secs() + u64::from(left.subsec_nanos() > 0)
    }

    /// `true` when a resend is allowed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}
