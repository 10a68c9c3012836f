//! The lead marketplace engine.
//!
//! Leads flow submission -> scoring -> pricing -> distribution, with the
//! budget ledger debited at assignment time and the access gate governing
//! every later contact read. Insights run as a detached batch over the same
//! records.

pub mod access;
pub mod budget;
pub mod distribution;
pub mod domain;
pub mod insights;
pub mod pricing;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use access::{AccessError, AccessGate, AccessTier, ContactView};
pub use budget::{
    AdjustmentKind, BudgetAdjustment, BudgetError, BudgetLedger, BudgetTransaction,
};
pub use distribution::{
    Bid, BidReceipt, Candidate, CloseOutcome, ControllerMetrics, DistributionController,
    DistributionError, DistributionMode,
};
pub use domain::{
    lead_from_submission, Assignment, AssignmentStatus, Company, CompanyId, ContactDetails, Lead,
    LeadId, LeadStatus, LeadSubmission, SmartStartSubmission, ValidationError,
};
pub use insights::{
    CoverageGap, FunnelStats, GapSeverity, InsightsAggregator, InsightsData, InsightsError,
    InsightsFilters, PostcodeStats, ServiceStats,
};
pub use pricing::{PriceTier, PricingEngine, PricingRecord};
pub use repository::{
    AlertError, AlertPublisher, CompanyRepository, LeadRecord, LeadRepository, MarketplaceAlert,
    RepositoryError, SubmissionRepository,
};
pub use router::marketplace_router;
pub use scoring::{Grade, ScoreRecord, ScoringConfig, ScoringEngine};
pub use service::{
    AssignmentOutcome, DistributionMetrics, MarketSettings, MarketplaceError, MarketplaceService,
    QueueStatus,
};
