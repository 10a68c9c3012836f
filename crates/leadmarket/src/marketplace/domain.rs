use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for leads flowing through the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeadId(pub String);

/// Identifier wrapper for buying companies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompanyId(pub String);

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) fn new_lead_id() -> LeadId {
    LeadId(format!("lead-{}", uuid::Uuid::new_v4()))
}

/// Raw customer contact fields. These never leave the engine unmasked except
/// through the access gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// An inbound customer service request after intake validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub category: String,
    pub postcode: String,
    pub contact: ContactDetails,
    pub description: String,
    pub urgent: bool,
    pub budget_hint_cents: Option<i64>,
    pub property_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Raw submission payload supplied by the intake collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadSubmission {
    pub category: String,
    pub postcode: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub budget_hint_cents: Option<i64>,
    #[serde(default)]
    pub property_type: Option<String>,
}

/// Intake validation failures surfaced back to the submitting collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("submission is missing a service category")]
    MissingCategory,
    #[error("postcode '{0}' is not a four digit code")]
    InvalidPostcode(String),
    #[error("submission carries no reachable contact channel")]
    MissingContact,
}

/// Validate a submission and mint the lead it describes.
pub fn lead_from_submission(
    submission: LeadSubmission,
    now: DateTime<Utc>,
) -> Result<Lead, ValidationError> {
    if submission.category.trim().is_empty() {
        return Err(ValidationError::MissingCategory);
    }

    let postcode = submission.postcode.trim().to_string();
    if postcode.len() != 4 || !postcode.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidPostcode(postcode));
    }

    let email = submission.customer_email.trim().to_string();
    let phone = submission.customer_phone.trim().to_string();
    if email.is_empty() && phone.is_empty() {
        return Err(ValidationError::MissingContact);
    }

    Ok(Lead {
        id: new_lead_id(),
        category: submission.category.trim().to_string(),
        postcode,
        contact: ContactDetails {
            name: submission.customer_name.trim().to_string(),
            email,
            phone,
        },
        description: submission.description,
        urgent: submission.urgent,
        budget_hint_cents: submission.budget_hint_cents,
        property_type: submission.property_type,
        created_at: now,
    })
}

/// A buying company as configured by the account collaborator. The spendable
/// balance lives in the budget ledger, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub modules_access: BTreeSet<String>,
    pub daily_budget_cents: i64,
    pub low_budget_threshold_cents: i64,
    /// Contracted per-lead price override. Absent means the lead tier's base
    /// price applies.
    pub lead_cost_per_unit_cents: Option<i64>,
    pub auto_accept_leads: bool,
    pub paused: bool,
}

/// Response lifecycle of a lead assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Contacted,
    Won,
    Lost,
    Failed,
}

impl AssignmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Contacted => "contacted",
            AssignmentStatus::Won => "won",
            AssignmentStatus::Lost => "lost",
            AssignmentStatus::Failed => "failed",
        }
    }

    /// Active assignments hold the lead exclusively.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            AssignmentStatus::Pending | AssignmentStatus::Contacted | AssignmentStatus::Won
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            AssignmentStatus::Won | AssignmentStatus::Lost | AssignmentStatus::Failed
        )
    }

    /// The full transition table. Everything not listed here is rejected.
    pub const fn can_transition_to(self, next: AssignmentStatus) -> bool {
        matches!(
            (self, next),
            (AssignmentStatus::Pending, AssignmentStatus::Contacted)
                | (AssignmentStatus::Pending, AssignmentStatus::Failed)
                | (AssignmentStatus::Contacted, AssignmentStatus::Won)
                | (AssignmentStatus::Contacted, AssignmentStatus::Lost)
        )
    }
}

/// The record linking a lead to a company and tracking its response lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub lead_id: LeadId,
    pub company_id: CompanyId,
    pub status: AssignmentStatus,
    pub cost_cents: i64,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// Derived lead lifecycle view. Never persisted; always computed from the
/// assignment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Unassigned,
    Assigned(AssignmentStatus),
}

impl LeadStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LeadStatus::Unassigned => "unassigned",
            LeadStatus::Assigned(status) => status.label(),
        }
    }
}

/// Early-funnel intake record feeding the insights aggregator only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartStartSubmission {
    pub postcode: String,
    #[serde(default)]
    pub requested_services: Vec<String>,
    pub lead_created: bool,
    pub created_at: DateTime<Utc>,
}
