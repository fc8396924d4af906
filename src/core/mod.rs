//! Core Reconciliation and Aggregation Modules
//!
//! - Canonical record and table models
//! - Normalization, diff, pivot and consolidation engines
//! - Period, launch and trend metrics

pub mod engine;
pub mod metrics;
pub mod models;
