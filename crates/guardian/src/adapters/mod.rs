// Rust guideline compliant 2026-10-08

//! Adapters (secondary ports) for the guardian binaries.
//!
//! Each sub-module implements one or more hexagonal port traits defined in the
//! `domain` crate. The SQLite session store is loaded by `guardian_sqlite`
//! only.

pub mod demo_classifier;
pub mod demo_fetcher;
pub mod demo_metrics_source;
pub mod memory_session_store;
pub mod simulated_transport;
