//! Lead marketplace engine: quality scoring, tier pricing, budget ledger,
//! assignment distribution, contact-access gating, and demand insights.

pub mod config;
pub mod error;
pub mod marketplace;
pub mod telemetry;
