use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use crate::marketplace::budget::BudgetAdjustment;
use crate::marketplace::domain::{
    Company, CompanyId, Lead, LeadId, LeadSubmission, SmartStartSubmission,
};
use crate::marketplace::repository::{
    AlertError, AlertPublisher, CompanyRepository, LeadRecord, LeadRepository, MarketplaceAlert,
    RepositoryError, SubmissionRepository,
};
use crate::marketplace::scoring::ScoringConfig;
use crate::marketplace::service::{MarketSettings, MarketplaceService};

pub(super) type TestService =
    MarketplaceService<MemoryLeads, MemoryCompanies, MemorySubmissions, MemoryAlerts>;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// All contact fields present, urgency signal, high-demand category in a
/// metro postcode.
pub(super) fn strong_submission() -> LeadSubmission {
    LeadSubmission {
        category: "Strøm".to_string(),
        postcode: "0255".to_string(),
        customer_name: "Kari Nordmann".to_string(),
        customer_email: "kari.nordmann@example.no".to_string(),
        customer_phone: "+47 912 34 567".to_string(),
        description: "Ny strømavtale, haster før vinteren".to_string(),
        urgent: true,
        budget_hint_cents: Some(45_000_00),
        property_type: Some("villa".to_string()),
    }
}

/// Same category and postcode, but contactless and empty-handed.
pub(super) fn sparse_submission() -> LeadSubmission {
    LeadSubmission {
        category: "Strøm".to_string(),
        postcode: "0255".to_string(),
        customer_name: String::new(),
        customer_email: String::new(),
        customer_phone: "12345".to_string(),
        description: String::new(),
        urgent: false,
        budget_hint_cents: None,
        property_type: None,
    }
}

pub(super) fn company(id: &str, categories: &[&str]) -> Company {
    Company {
        id: CompanyId(id.to_string()),
        name: id.to_uppercase(),
        modules_access: categories.iter().map(|c| c.to_string()).collect(),
        daily_budget_cents: 100_000,
        low_budget_threshold_cents: 10_000,
        lead_cost_per_unit_cents: None,
        auto_accept_leads: true,
        paused: false,
    }
}

pub(super) fn settings() -> MarketSettings {
    MarketSettings {
        assignment_sla_hours: 24,
        bidding_window_minutes: 30,
    }
}

pub(super) fn build_service() -> (
    TestService,
    Arc<MemoryLeads>,
    Arc<MemoryCompanies>,
    Arc<MemorySubmissions>,
    Arc<MemoryAlerts>,
) {
    let leads = Arc::new(MemoryLeads::default());
    let companies = Arc::new(MemoryCompanies::default());
    let submissions = Arc::new(MemorySubmissions::default());
    let alerts = Arc::new(MemoryAlerts::default());
    let service = MarketplaceService::new(
        leads.clone(),
        companies.clone(),
        submissions.clone(),
        alerts.clone(),
        ScoringConfig::default(),
        settings(),
    );
    (service, leads, companies, submissions, alerts)
}

/// Register a company with an opening balance and optional contracted cost.
pub(super) fn seed_company(
    service: &TestService,
    id: &str,
    categories: &[&str],
    balance_cents: i64,
    cost_override: Option<i64>,
) -> CompanyId {
    let mut company = company(id, categories);
    company.lead_cost_per_unit_cents = cost_override;
    let company_id = company.id.clone();
    service.register_company(company).expect("company registers");
    if balance_cents > 0 {
        service
            .adjust_budget(
                &company_id,
                BudgetAdjustment::credit(balance_cents, "opening balance"),
                now(),
            )
            .expect("opening credit applies");
    }
    company_id
}

pub(super) fn submitted_lead(service: &TestService, submission: LeadSubmission) -> Lead {
    service
        .submit_lead(submission, now())
        .expect("submission accepted")
        .lead
}

#[derive(Default, Clone)]
pub(super) struct MemoryLeads {
    records: Arc<Mutex<HashMap<LeadId, LeadRecord>>>,
}

impl LeadRepository for MemoryLeads {
    fn insert(&self, record: LeadRecord) -> Result<LeadRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("lead mutex poisoned");
        if guard.contains_key(&record.lead.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.lead.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: LeadRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("lead mutex poisoned");
        if !guard.contains_key(&record.lead.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(record.lead.id.clone(), record);
        Ok(())
    }

    fn fetch(&self, id: &LeadId) -> Result<Option<LeadRecord>, RepositoryError> {
        let guard = self.records.lock().expect("lead mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<LeadRecord>, RepositoryError> {
        let guard = self.records.lock().expect("lead mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

/// Accepts inserts but loses every update, to exercise the deferred-score
/// path.
#[derive(Default, Clone)]
pub(super) struct WriteOnceLeads {
    inner: MemoryLeads,
}

impl LeadRepository for WriteOnceLeads {
    fn insert(&self, record: LeadRecord) -> Result<LeadRecord, RepositoryError> {
        self.inner.insert(record)
    }

    fn update(&self, _record: LeadRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("updates offline".to_string()))
    }

    fn fetch(&self, id: &LeadId) -> Result<Option<LeadRecord>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn list(&self) -> Result<Vec<LeadRecord>, RepositoryError> {
        self.inner.list()
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryCompanies {
    records: Arc<Mutex<HashMap<CompanyId, Company>>>,
}

impl CompanyRepository for MemoryCompanies {
    fn upsert(&self, company: Company) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("company mutex poisoned");
        guard.insert(company.id.clone(), company);
        Ok(())
    }

    fn fetch(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        let guard = self.records.lock().expect("company mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Company>, RepositoryError> {
        let guard = self.records.lock().expect("company mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn set_paused(&self, id: &CompanyId, paused: bool) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("company mutex poisoned");
        match guard.get_mut(id) {
            Some(company) => {
                company.paused = paused;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}

#[derive(Default, Clone)]
pub(super) struct MemorySubmissions {
    records: Arc<Mutex<Vec<SmartStartSubmission>>>,
}

impl SubmissionRepository for MemorySubmissions {
    fn insert(&self, submission: SmartStartSubmission) -> Result<(), RepositoryError> {
        self.records
            .lock()
            .expect("submission mutex poisoned")
            .push(submission);
        Ok(())
    }

    fn list(&self) -> Result<Vec<SmartStartSubmission>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("submission mutex poisoned")
            .clone())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryAlerts {
    events: Arc<Mutex<Vec<MarketplaceAlert>>>,
}

impl MemoryAlerts {
    pub(super) fn events(&self) -> Vec<MarketplaceAlert> {
        self.events.lock().expect("alert mutex poisoned").clone()
    }
}

impl AlertPublisher for MemoryAlerts {
    fn publish(&self, alert: MarketplaceAlert) -> Result<(), AlertError> {
        self.events.lock().expect("alert mutex poisoned").push(alert);
        Ok(())
    }
}
