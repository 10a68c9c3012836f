//! Concurrency specifications: the exclusivity guarantee under racing
//! assignment attempts and ledger correctness under parallel debits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{DateTime, TimeZone, Utc};

use leadmarket::marketplace::{
    AlertError, AlertPublisher, BudgetAdjustment, BudgetError, Company, CompanyId,
    CompanyRepository, DistributionError, DistributionMode, LeadId, LeadRecord, LeadRepository,
    LeadStatus, LeadSubmission, MarketSettings, MarketplaceAlert, MarketplaceError,
    MarketplaceService, RepositoryError, ScoringConfig, SmartStartSubmission,
    SubmissionRepository,
};

type Service = MarketplaceService<MemoryLeads, MemoryCompanies, MemorySubmissions, NullAlerts>;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn submission() -> LeadSubmission {
    LeadSubmission {
        category: "Strøm".to_string(),
        postcode: "0255".to_string(),
        customer_name: "Kari Nordmann".to_string(),
        customer_email: "kari.nordmann@example.no".to_string(),
        customer_phone: "+47 912 34 567".to_string(),
        description: "Ny strømavtale".to_string(),
        urgent: false,
        budget_hint_cents: None,
        property_type: None,
    }
}

fn build_service() -> Arc<Service> {
    let service = MarketplaceService::new(
        Arc::new(MemoryLeads::default()),
        Arc::new(MemoryCompanies::default()),
        Arc::new(MemorySubmissions::default()),
        Arc::new(NullAlerts),
        ScoringConfig::default(),
        MarketSettings::default(),
    );
    Arc::new(service)
}

fn seed(service: &Service, id: &str, balance_cents: i64, cost_cents: i64) -> CompanyId {
    let company = Company {
        id: CompanyId(id.to_string()),
        name: id.to_uppercase(),
        modules_access: ["Strøm".to_string()].into_iter().collect(),
        daily_budget_cents: 100_000,
        low_budget_threshold_cents: 0,
        lead_cost_per_unit_cents: Some(cost_cents),
        auto_accept_leads: true,
        paused: false,
    };
    let company_id = company.id.clone();
    service.register_company(company).expect("company registers");
    service
        .adjust_budget(
            &company_id,
            BudgetAdjustment::credit(balance_cents, "opening balance"),
            now(),
        )
        .expect("opening credit applies");
    company_id
}

#[test]
fn racing_assignments_for_one_lead_yield_one_winner_and_one_conflict() {
    let service = build_service();
    seed(&service, "c1", 50_000, 500);
    seed(&service, "c2", 50_000, 500);

    let lead = service
        .submit_lead(submission(), now())
        .expect("submission accepted")
        .lead;

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = service.clone();
            let lead_id = lead.id.clone();
            thread::spawn(move || service.assign_lead(&lead_id, DistributionMode::Direct, now()))
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread joins"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(
                r,
                Err(MarketplaceError::Distribution(
                    DistributionError::ConcurrencyConflict(_)
                ))
            ))
            .count(),
        1
    );
    assert_eq!(service.assignments_for(&lead.id).len(), 1);
}

#[test]
fn concurrent_debits_spend_the_budget_exactly_once_each() {
    let service = build_service();
    let company_id = seed(&service, "c1", 1_000, 500);

    let first = service
        .submit_lead(submission(), now())
        .expect("submission accepted")
        .lead;
    let second = service
        .submit_lead(submission(), now())
        .expect("submission accepted")
        .lead;

    let handles: Vec<_> = [first.id.clone(), second.id.clone()]
        .into_iter()
        .map(|lead_id| {
            let service = service.clone();
            thread::spawn(move || service.assign_lead(&lead_id, DistributionMode::Direct, now()))
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .expect("thread joins")
            .expect("both assignments succeed");
    }
    assert_eq!(service.budget_balance(&company_id).expect("balance"), 0);

    // The pool is exhausted now; a third lead cannot be financed.
    let third = service
        .submit_lead(submission(), now())
        .expect("submission accepted")
        .lead;
    match service.assign_lead(&third.id, DistributionMode::Direct, now()) {
        Err(MarketplaceError::Budget(BudgetError::InsufficientBudget { .. })) => {}
        other => panic!("expected InsufficientBudget, got {other:?}"),
    }
    assert_eq!(
        service.lead_status(&third.id).expect("status"),
        LeadStatus::Unassigned
    );

    // The ledger never went negative and the log adds up.
    let transactions = service
        .budget_transactions(&company_id)
        .expect("transactions");
    for transaction in &transactions {
        assert!(transaction.balance_after_cents >= 0);
        assert_eq!(
            transaction.balance_after_cents,
            transaction.balance_before_cents + transaction.amount_cents
        );
    }
}

#[test]
fn many_leads_across_many_workers_never_double_assign() {
    let service = build_service();
    for company in ["c1", "c2", "c3", "c4"] {
        seed(&service, company, 100_000, 500);
    }

    let leads: Vec<LeadId> = (0..20)
        .map(|_| {
            service
                .submit_lead(submission(), now())
                .expect("submission accepted")
                .lead
                .id
        })
        .collect();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let leads = leads.clone();
            thread::spawn(move || {
                for lead_id in leads {
                    // Losing a race for an already-claimed lead is expected.
                    let _ = service.assign_lead(&lead_id, DistributionMode::Direct, now());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread joins");
    }

    for lead_id in &leads {
        let active = service
            .assignments_for(lead_id)
            .into_iter()
            .filter(|assignment| assignment.status.is_active())
            .count();
        assert_eq!(active, 1, "lead {lead_id} must have exactly one active slot");
    }
}

#[derive(Default, Clone)]
struct MemoryLeads {
    records: Arc<Mutex<HashMap<LeadId, LeadRecord>>>,
}

impl LeadRepository for MemoryLeads {
    fn insert(&self, record: LeadRecord) -> Result<LeadRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("lock");
        if guard.contains_key(&record.lead.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.lead.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: LeadRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("lock");
        guard.insert(record.lead.id.clone(), record);
        Ok(())
    }

    fn fetch(&self, id: &LeadId) -> Result<Option<LeadRecord>, RepositoryError> {
        let guard = self.records.lock().expect("lock");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<LeadRecord>, RepositoryError> {
        let guard = self.records.lock().expect("lock");
        Ok(guard.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
struct MemoryCompanies {
    records: Arc<Mutex<HashMap<CompanyId, Company>>>,
}

impl CompanyRepository for MemoryCompanies {
    fn upsert(&self, company: Company) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("lock");
        guard.insert(company.id.clone(), company);
        Ok(())
    }

    fn fetch(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        let guard = self.records.lock().expect("lock");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Company>, RepositoryError> {
        let guard = self.records.lock().expect("lock");
        Ok(guard.values().cloned().collect())
    }

    fn set_paused(&self, id: &CompanyId, paused: bool) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("lock");
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
struct MemorySubmissions {
    records: Arc<Mutex<Vec<SmartStartSubmission>>>,
}

impl SubmissionRepository for MemorySubmissions {
    fn insert(&self, submission: SmartStartSubmission) -> Result<(), RepositoryError> {
        self.records.lock().expect("lock").push(submission);
        Ok(())
    }

    fn list(&self) -> Result<Vec<SmartStartSubmission>, RepositoryError> {
        Ok(self.records.lock().expect("lock").clone())
    }
}

struct NullAlerts;

impl AlertPublisher for NullAlerts {
    fn publish(&self, _alert: MarketplaceAlert) -> Result<(), AlertError> {
        Ok(())
    }
}
