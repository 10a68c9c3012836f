use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{Company, CompanyId, Lead, LeadId, SmartStartSubmission};
use super::pricing::PricingRecord;
use super::scoring::ScoreRecord;

/// Repository record for a lead plus its computed score and pricing. Score
/// and pricing stay `None` when computation was deferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub lead: Lead,
    pub score: Option<ScoreRecord>,
    pub pricing: Option<PricingRecord>,
}

/// Storage abstraction for leads so the service can be exercised in
/// isolation.
pub trait LeadRepository: Send + Sync {
    fn insert(&self, record: LeadRecord) -> Result<LeadRecord, RepositoryError>;
    fn update(&self, record: LeadRecord) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &LeadId) -> Result<Option<LeadRecord>, RepositoryError>;
    fn list(&self) -> Result<Vec<LeadRecord>, RepositoryError>;
}

/// Storage abstraction for company profiles. Balances live in the ledger.
pub trait CompanyRepository: Send + Sync {
    fn upsert(&self, company: Company) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError>;
    fn list(&self) -> Result<Vec<Company>, RepositoryError>;
    fn set_paused(&self, id: &CompanyId, paused: bool) -> Result<(), RepositoryError>;
}

/// Append-only store for early-funnel submissions feeding insights.
pub trait SubmissionRepository: Send + Sync {
    fn insert(&self, submission: SmartStartSubmission) -> Result<(), RepositoryError>;
    fn list(&self) -> Result<Vec<SmartStartSubmission>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Trait describing outbound alert hooks (low-budget warnings, assignment
/// notifications). Delivery itself belongs to an external collaborator.
pub trait AlertPublisher: Send + Sync {
    fn publish(&self, alert: MarketplaceAlert) -> Result<(), AlertError>;
}

/// Simple alert payload so routes/tests can assert integration boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceAlert {
    pub template: String,
    pub company_id: CompanyId,
    pub details: BTreeMap<String, String>,
}

/// Alert dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert transport unavailable: {0}")]
    Transport(String),
}
