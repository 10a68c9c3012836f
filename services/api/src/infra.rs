use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;

use leadmarket::config::MarketConfig;
use leadmarket::marketplace::{
    AlertError, AlertPublisher, BudgetAdjustment, Company, CompanyId, CompanyRepository,
    LeadId, LeadRecord, LeadRepository, MarketSettings, MarketplaceAlert, MarketplaceError,
    MarketplaceService, RepositoryError, ScoringConfig, SmartStartSubmission,
    SubmissionRepository,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ApiService = MarketplaceService<
    InMemoryLeadRepository,
    InMemoryCompanyRepository,
    InMemorySubmissionRepository,
    InMemoryAlertPublisher,
>;

pub(crate) struct ServiceHandles {
    pub(crate) service: Arc<ApiService>,
    pub(crate) alerts: Arc<InMemoryAlertPublisher>,
}

pub(crate) fn build_service(settings: MarketSettings) -> ServiceHandles {
    let alerts = Arc::new(InMemoryAlertPublisher::default());
    let service = Arc::new(MarketplaceService::new(
        Arc::new(InMemoryLeadRepository::default()),
        Arc::new(InMemoryCompanyRepository::default()),
        Arc::new(InMemorySubmissionRepository::default()),
        alerts.clone(),
        ScoringConfig::default(),
        settings,
    ));
    ServiceHandles { service, alerts }
}

pub(crate) fn market_settings(config: &MarketConfig) -> MarketSettings {
    MarketSettings {
        assignment_sla_hours: config.assignment_sla_hours,
        bidding_window_minutes: config.bidding_window_minutes,
    }
}

/// Seed a small Norwegian buyer pool for the demo commands.
pub(crate) fn seed_demo_companies(service: &ApiService) -> Result<(), MarketplaceError> {
    let companies = [
        ("nordvarme", vec!["Varmepumpe", "Strøm"], 60_000, Some(8_000)),
        ("elkraft", vec!["Strøm"], 25_000, Some(6_000)),
        ("trygg-forsikring", vec!["Forsikring"], 15_000, Some(4_000)),
    ];

    for (id, categories, balance_cents, cost_override) in companies {
        let company = Company {
            id: CompanyId(id.to_string()),
            name: id.to_uppercase(),
            modules_access: categories.into_iter().map(str::to_string).collect(),
            daily_budget_cents: 100_000,
            low_budget_threshold_cents: 5_000,
            lead_cost_per_unit_cents: cost_override,
            auto_accept_leads: true,
            paused: false,
        };
        let company_id = company.id.clone();
        service.register_company(company)?;
        service.adjust_budget(
            &company_id,
            BudgetAdjustment::credit(balance_cents, "opening balance"),
            Utc::now(),
        )?;
    }
    Ok(())
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryLeadRepository {
    records: Arc<Mutex<HashMap<LeadId, LeadRecord>>>,
}

impl LeadRepository for InMemoryLeadRepository {
    fn insert(&self, record: LeadRecord) -> Result<LeadRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("lead repository mutex poisoned");
        if guard.contains_key(&record.lead.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.lead.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: LeadRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("lead repository mutex poisoned");
        if guard.contains_key(&record.lead.id) {
            guard.insert(record.lead.id.clone(), record);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &LeadId) -> Result<Option<LeadRecord>, RepositoryError> {
        let guard = self.records.lock().expect("lead repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<LeadRecord>, RepositoryError> {
        let guard = self.records.lock().expect("lead repository mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryCompanyRepository {
    records: Arc<Mutex<HashMap<CompanyId, Company>>>,
}

impl CompanyRepository for InMemoryCompanyRepository {
    fn upsert(&self, company: Company) -> Result<(), RepositoryError> {
        let mut guard = self
            .records
            .lock()
            .expect("company repository mutex poisoned");
        guard.insert(company.id.clone(), company);
        Ok(())
    }

    fn fetch(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        let guard = self
            .records
            .lock()
            .expect("company repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Company>, RepositoryError> {
        let guard = self
            .records
            .lock()
            .expect("company repository mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn set_paused(&self, id: &CompanyId, paused: bool) -> Result<(), RepositoryError> {
        let mut guard = self
            .records
            .lock()
            .expect("company repository mutex poisoned");
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
pub(crate) struct InMemorySubmissionRepository {
    records: Arc<Mutex<Vec<SmartStartSubmission>>>,
}

impl SubmissionRepository for InMemorySubmissionRepository {
    fn insert(&self, submission: SmartStartSubmission) -> Result<(), RepositoryError> {
        self.records
            .lock()
            .expect("submission repository mutex poisoned")
            .push(submission);
        Ok(())
    }

    fn list(&self) -> Result<Vec<SmartStartSubmission>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("submission repository mutex poisoned")
            .clone())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryAlertPublisher {
    events: Arc<Mutex<Vec<MarketplaceAlert>>>,
}

impl InMemoryAlertPublisher {
    pub(crate) fn events(&self) -> Vec<MarketplaceAlert> {
        self.events.lock().expect("alert mutex poisoned").clone()
    }
}

impl AlertPublisher for InMemoryAlertPublisher {
    fn publish(&self, alert: MarketplaceAlert) -> Result<(), AlertError> {
        self.events.lock().expect("alert mutex poisoned").push(alert);
        Ok(())
    }
}
