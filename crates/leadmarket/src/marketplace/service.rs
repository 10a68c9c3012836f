use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::access::{AccessError, AccessGate, AccessTier, ContactView};
use super::budget::{BudgetAdjustment, BudgetError, BudgetLedger, BudgetTransaction};
use super::distribution::{
    BidReceipt, Candidate, CloseOutcome, DistributionController, DistributionError,
    DistributionMode,
};
use super::domain::{
    lead_from_submission, Assignment, AssignmentStatus, Company, CompanyId, LeadId, LeadStatus,
    LeadSubmission, SmartStartSubmission, ValidationError,
};
use super::insights::{InsightsAggregator, InsightsData, InsightsError, InsightsFilters};
use super::pricing::{PricingEngine, PricingRecord};
use super::repository::{
    AlertError, AlertPublisher, CompanyRepository, LeadRecord, LeadRepository, MarketplaceAlert,
    RepositoryError, SubmissionRepository,
};
use super::scoring::{ScoreRecord, ScoringConfig, ScoringEngine};

/// Operational dials for the service facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSettings {
    pub assignment_sla_hours: i64,
    pub bidding_window_minutes: i64,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            assignment_sla_hours: 24,
            bidding_window_minutes: 30,
        }
    }
}

impl MarketSettings {
    fn assignment_sla(&self) -> Duration {
        Duration::hours(self.assignment_sla_hours)
    }

    fn bidding_window(&self) -> Duration {
        Duration::minutes(self.bidding_window_minutes)
    }
}

/// Error raised by the marketplace service.
#[derive(Debug, thiserror::Error)]
pub enum MarketplaceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Budget(#[from] BudgetError),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Alert(#[from] AlertError),
    #[error(transparent)]
    Insights(#[from] InsightsError),
    #[error("unknown lead {0}")]
    UnknownLead(LeadId),
    #[error("unknown company {0}")]
    UnknownCompany(CompanyId),
}

/// Result of an `assign_lead` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    Assigned { assignment: Assignment },
    BiddingOpened { closes_at: DateTime<Utc> },
}

/// Backlog of leads still waiting for a company.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub total_queued: u64,
    pub oldest_lead_age_hours: i64,
    pub categories: BTreeMap<String, u64>,
}

/// Read-only dashboard counters for the distribution path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistributionMetrics {
    pub pending_assignments: u64,
    pub failed_assignments: u64,
    pub avg_response_minutes: f64,
    pub paused_companies: u64,
}

/// Service composing the scoring, pricing, ledger, distribution, access, and
/// insights components behind the repository seams.
pub struct MarketplaceService<L, C, S, A> {
    leads: Arc<L>,
    companies: Arc<C>,
    submissions: Arc<S>,
    alerts: Arc<A>,
    scoring: ScoringEngine,
    pricing: PricingEngine,
    ledger: Arc<BudgetLedger>,
    controller: Arc<DistributionController>,
    gate: Arc<AccessGate>,
    aggregator: InsightsAggregator,
    settings: MarketSettings,
}

impl<L, C, S, A> MarketplaceService<L, C, S, A>
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    pub fn new(
        leads: Arc<L>,
        companies: Arc<C>,
        submissions: Arc<S>,
        alerts: Arc<A>,
        scoring_config: ScoringConfig,
        settings: MarketSettings,
    ) -> Self {
        Self {
            leads,
            companies,
            submissions,
            alerts,
            scoring: ScoringEngine::new(scoring_config),
            pricing: PricingEngine,
            ledger: Arc::new(BudgetLedger::new()),
            controller: Arc::new(DistributionController::new()),
            gate: Arc::new(AccessGate::new()),
            aggregator: InsightsAggregator,
            settings,
        }
    }

    /// Validate and persist an inbound lead. Scoring and pricing run eagerly,
    /// but a failure to persist them defers the score instead of failing the
    /// submission.
    pub fn submit_lead(
        &self,
        submission: LeadSubmission,
        now: DateTime<Utc>,
    ) -> Result<LeadRecord, MarketplaceError> {
        let lead = lead_from_submission(submission, now)?;
        let stored = self.leads.insert(LeadRecord {
            lead,
            score: None,
            pricing: None,
        })?;

        let score = self.scoring.score(&stored.lead, now);
        let pricing = self.pricing.price(&score);
        let scored = LeadRecord {
            lead: stored.lead.clone(),
            score: Some(score),
            pricing: Some(pricing),
        };

        match self.leads.update(scored.clone()) {
            Ok(()) => {
                info!(lead_id = %scored.lead.id, category = %scored.lead.category, "lead submitted and scored");
                Ok(scored)
            }
            Err(err) => {
                warn!(lead_id = %stored.lead.id, error = %err, "score persistence deferred");
                Ok(stored)
            }
        }
    }

    /// Recompute (idempotently) and persist the quality score for a lead.
    pub fn calculate_score(
        &self,
        lead_id: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<ScoreRecord, MarketplaceError> {
        let mut record = self.fetch_lead(lead_id)?;
        let score = self.scoring.score(&record.lead, now);
        let pricing = self.pricing.price(&score);
        record.score = Some(score.clone());
        record.pricing = Some(pricing);
        self.leads.update(record)?;
        Ok(score)
    }

    pub fn get_pricing(
        &self,
        lead_id: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<PricingRecord, MarketplaceError> {
        let mut record = self.fetch_lead(lead_id)?;
        self.ensure_priced(&mut record, now)
    }

    pub fn lead(&self, lead_id: &LeadId) -> Result<LeadRecord, MarketplaceError> {
        self.fetch_lead(lead_id)
    }

    pub fn lead_status(&self, lead_id: &LeadId) -> Result<LeadStatus, MarketplaceError> {
        self.fetch_lead(lead_id)?;
        Ok(match self.controller.active_assignment(lead_id) {
            Some(assignment) => LeadStatus::Assigned(assignment.status),
            None => LeadStatus::Unassigned,
        })
    }

    /// Early-funnel intake record; consumed only by insights.
    pub fn record_submission(
        &self,
        submission: SmartStartSubmission,
    ) -> Result<(), MarketplaceError> {
        self.submissions.insert(submission)?;
        Ok(())
    }

    /// Register or update a company profile and make sure a ledger account
    /// exists for it.
    pub fn register_company(&self, company: Company) -> Result<(), MarketplaceError> {
        self.ledger.open_account(&company.id);
        self.companies.upsert(company)?;
        Ok(())
    }

    pub fn adjust_budget(
        &self,
        company_id: &CompanyId,
        adjustment: BudgetAdjustment,
        now: DateTime<Utc>,
    ) -> Result<BudgetTransaction, MarketplaceError> {
        let company = self
            .companies
            .fetch(company_id)?
            .ok_or_else(|| MarketplaceError::UnknownCompany(company_id.clone()))?;

        let transaction = self.ledger.adjust(company_id, adjustment, now)?;
        info!(
            company_id = %company_id,
            kind = transaction.kind.label(),
            amount_cents = transaction.amount_cents,
            balance_cents = transaction.balance_after_cents,
            "budget adjusted"
        );
        self.notify_if_low(&company);
        Ok(transaction)
    }

    pub fn budget_balance(&self, company_id: &CompanyId) -> Result<i64, MarketplaceError> {
        Ok(self.ledger.balance(company_id)?)
    }

    pub fn budget_transactions(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<BudgetTransaction>, MarketplaceError> {
        Ok(self.ledger.transactions(company_id)?)
    }

    pub fn is_low_budget(&self, company_id: &CompanyId) -> Result<bool, MarketplaceError> {
        let company = self
            .companies
            .fetch(company_id)?
            .ok_or_else(|| MarketplaceError::UnknownCompany(company_id.clone()))?;
        Ok(self.ledger.is_low_budget(&company)?)
    }

    /// Distribute a lead under the requested policy. Direct mode assigns and
    /// debits immediately; bidding mode opens the time-boxed window.
    pub fn assign_lead(
        &self,
        lead_id: &LeadId,
        mode: DistributionMode,
        now: DateTime<Utc>,
    ) -> Result<AssignmentOutcome, MarketplaceError> {
        let mut record = self.fetch_lead(lead_id)?;
        match mode {
            DistributionMode::Direct => self
                .assign_direct(&mut record, now)
                .map(|assignment| AssignmentOutcome::Assigned { assignment }),
            DistributionMode::Bidding => {
                let closes_at =
                    self.controller
                        .open_bidding(lead_id, now, self.settings.bidding_window())?;
                info!(lead_id = %lead_id, %closes_at, "bidding window opened");
                Ok(AssignmentOutcome::BiddingOpened { closes_at })
            }
        }
    }

    fn assign_direct(
        &self,
        record: &mut LeadRecord,
        now: DateTime<Utc>,
    ) -> Result<Assignment, MarketplaceError> {
        let mut candidates = self.eligible_candidates(record, now)?;

        loop {
            let assignment = self
                .controller
                .reserve_next(&record.lead.id, &candidates, now)?;

            let debit = BudgetAdjustment::debit(
                assignment.cost_cents,
                format!("lead {} assignment", record.lead.id),
            );
            match self.ledger.adjust(&assignment.company_id, debit, now) {
                Ok(_) => {
                    self.finish_assignment(&assignment);
                    return Ok(assignment);
                }
                Err(err @ BudgetError::InsufficientBudget { .. }) => {
                    self.controller
                        .release(&record.lead.id, &assignment.company_id);
                    candidates.retain(|c| c.company_id != assignment.company_id);
                    if candidates.is_empty() {
                        return Err(err.into());
                    }
                }
                Err(other) => {
                    self.controller
                        .release(&record.lead.id, &assignment.company_id);
                    return Err(other.into());
                }
            }
        }
    }

    /// Bid placement during an open window. Only category-eligible, unpaused
    /// companies that can cover their own bid may compete.
    pub fn place_bid(
        &self,
        lead_id: &LeadId,
        company_id: &CompanyId,
        amount_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<BidReceipt, MarketplaceError> {
        let mut record = self.fetch_lead(lead_id)?;
        let company = self
            .companies
            .fetch(company_id)?
            .ok_or_else(|| MarketplaceError::UnknownCompany(company_id.clone()))?;

        if company.paused || !company.modules_access.contains(&record.lead.category) {
            return Err(DistributionError::IneligibleBidder {
                company_id: company_id.clone(),
            }
            .into());
        }

        let pricing = self.ensure_priced(&mut record, now)?;
        let floor = company
            .lead_cost_per_unit_cents
            .unwrap_or(pricing.base_price_cents);

        let balance = self.ledger.balance(company_id)?;
        if balance < amount_cents {
            return Err(BudgetError::InsufficientBudget {
                requested_cents: amount_cents,
                available_cents: balance,
            }
            .into());
        }

        let receipt = self
            .controller
            .place_bid(lead_id, company_id, amount_cents, floor, now)?;
        info!(lead_id = %lead_id, company_id = %company_id, amount_cents, "bid placed");
        Ok(receipt)
    }

    /// Close a lead's bidding window. Idempotent: the first call picks the
    /// winner and debits it, later calls just report the existing outcome.
    /// Unaffordable winning bids are discarded in rank order.
    pub fn close_bidding(
        &self,
        lead_id: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<Option<Assignment>, MarketplaceError> {
        let record = self.fetch_lead(lead_id)?;

        match self.controller.close_bidding(&record.lead.id, now)? {
            CloseOutcome::AlreadyClosed | CloseOutcome::Cancelled => {
                Ok(self.controller.active_assignment(&record.lead.id))
            }
            CloseOutcome::NoBids => {
                info!(lead_id = %lead_id, "bidding closed with no bids; lead requeued");
                Ok(None)
            }
            CloseOutcome::Winner { bids } => {
                for bid in bids {
                    let assignment = match self.controller.reserve_for(
                        &record.lead.id,
                        &bid.company_id,
                        bid.amount_cents,
                        now,
                    ) {
                        Ok(assignment) => assignment,
                        Err(DistributionError::GloballyPaused) => {
                            warn!(lead_id = %lead_id, "bidding close blocked by global pause; lead requeued");
                            return Ok(None);
                        }
                        Err(err) => return Err(err.into()),
                    };

                    let debit = BudgetAdjustment::debit(
                        bid.amount_cents,
                        format!("lead {} winning bid", record.lead.id),
                    );
                    match self.ledger.adjust(&bid.company_id, debit, now) {
                        Ok(_) => {
                            self.finish_assignment(&assignment);
                            return Ok(Some(assignment));
                        }
                        Err(BudgetError::InsufficientBudget { .. }) => {
                            self.controller.release(&record.lead.id, &bid.company_id);
                            warn!(
                                lead_id = %lead_id,
                                company_id = %bid.company_id,
                                "winning bid no longer affordable; discarded"
                            );
                        }
                        Err(other) => {
                            self.controller.release(&record.lead.id, &bid.company_id);
                            return Err(other.into());
                        }
                    }
                }
                Ok(None)
            }
        }
    }

    /// Withdraw a lead from auction before the window closes.
    pub fn withdraw_lead(&self, lead_id: &LeadId) -> Result<(), MarketplaceError> {
        self.fetch_lead(lead_id)?;
        self.controller.cancel_bidding(lead_id)?;
        info!(lead_id = %lead_id, "bidding cancelled");
        Ok(())
    }

    pub fn mark_contacted(
        &self,
        lead_id: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<Assignment, MarketplaceError> {
        Ok(self
            .controller
            .transition(lead_id, AssignmentStatus::Contacted, now)?)
    }

    /// A won assignment escalates the company's access grant to full.
    pub fn mark_won(
        &self,
        lead_id: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<Assignment, MarketplaceError> {
        let assignment = self
            .controller
            .transition(lead_id, AssignmentStatus::Won, now)?;
        self.gate
            .record(lead_id, &assignment.company_id, AccessTier::Full);
        Ok(assignment)
    }

    pub fn mark_lost(
        &self,
        lead_id: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<Assignment, MarketplaceError> {
        Ok(self
            .controller
            .transition(lead_id, AssignmentStatus::Lost, now)?)
    }

    /// Contact fields for a viewer at its disclosure tier. Raw fields are
    /// only released at full tier; everything else is masked or denied here,
    /// before any payload exists.
    pub fn get_contact_info(
        &self,
        lead_id: &LeadId,
        viewer: &CompanyId,
    ) -> Result<ContactView, MarketplaceError> {
        let record = self.fetch_lead(lead_id)?;
        let statuses = self.controller.company_statuses(lead_id, viewer);

        let derived = if statuses.iter().any(|s| *s == AssignmentStatus::Won) {
            AccessTier::Full
        } else if statuses.is_empty() {
            AccessTier::None
        } else {
            AccessTier::Basic
        };

        Ok(self.gate.contact_view(&record.lead, viewer, derived)?)
    }

    /// Batch rollup for dashboards. Repository failures degrade to zeroed
    /// aggregates rather than surfacing to the consumer.
    pub fn insights(&self, filters: &InsightsFilters) -> InsightsData {
        let submissions = match self.submissions.list() {
            Ok(submissions) => submissions,
            Err(err) => {
                warn!(error = %err, "insights degraded: submissions unavailable");
                return InsightsData::default();
            }
        };
        let leads = match self.leads.list() {
            Ok(records) => records.into_iter().map(|record| record.lead).collect::<Vec<_>>(),
            Err(err) => {
                warn!(error = %err, "insights degraded: leads unavailable");
                return InsightsData::default();
            }
        };
        let companies = match self.companies.list() {
            Ok(companies) => companies,
            Err(err) => {
                warn!(error = %err, "insights degraded: companies unavailable");
                return InsightsData::default();
            }
        };
        let assignments = self.controller.all_assignments();

        self.aggregator
            .aggregate(&submissions, &leads, &assignments, &companies, filters)
    }

    pub fn insights_csv(&self, filters: &InsightsFilters) -> Result<String, MarketplaceError> {
        let data = self.insights(filters);
        Ok(self.aggregator.to_csv(&data)?)
    }

    /// Unassigned backlog visible in the admin queue.
    pub fn queue_status(&self, now: DateTime<Utc>) -> Result<QueueStatus, MarketplaceError> {
        let mut total = 0u64;
        let mut oldest_hours = 0i64;
        let mut categories: BTreeMap<String, u64> = BTreeMap::new();

        for record in self.leads.list()? {
            if self.controller.has_active(&record.lead.id) {
                continue;
            }
            total += 1;
            *categories.entry(record.lead.category.clone()).or_default() += 1;
            let age_hours = (now - record.lead.created_at).num_hours().max(0);
            oldest_hours = oldest_hours.max(age_hours);
        }

        Ok(QueueStatus {
            total_queued: total,
            oldest_lead_age_hours: oldest_hours,
            categories,
        })
    }

    pub fn distribution_metrics(&self) -> Result<DistributionMetrics, MarketplaceError> {
        let metrics = self.controller.metrics();
        let paused_companies = self
            .companies
            .list()?
            .iter()
            .filter(|company| company.paused)
            .count() as u64;

        Ok(DistributionMetrics {
            pending_assignments: metrics.pending_assignments,
            failed_assignments: metrics.failed_assignments,
            avg_response_minutes: metrics.avg_response_secs / 60.0,
            paused_companies,
        })
    }

    /// Block or unblock new assignment creation. Existing assignments are
    /// never touched by the pause.
    pub fn set_global_pause(&self, paused: bool) {
        self.controller.set_global_pause(paused);
        info!(paused, "global distribution pause updated");
    }

    pub fn global_pause(&self) -> bool {
        self.controller.global_pause()
    }

    pub fn set_company_paused(
        &self,
        company_id: &CompanyId,
        paused: bool,
    ) -> Result<(), MarketplaceError> {
        match self.companies.set_paused(company_id, paused) {
            Ok(()) => Ok(()),
            Err(RepositoryError::NotFound) => {
                Err(MarketplaceError::UnknownCompany(company_id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Fail pending assignments past the SLA and return the leads to the
    /// pool. No budget is refunded here; refunds are an administrative
    /// action.
    pub fn expire_stale_assignments(&self, now: DateTime<Utc>) -> u64 {
        let expired = self
            .controller
            .expire_stale(now, self.settings.assignment_sla());
        for assignment in &expired {
            warn!(
                lead_id = %assignment.lead_id,
                company_id = %assignment.company_id,
                "pending assignment exceeded SLA; lead requeued"
            );
        }
        expired.len() as u64
    }

    /// Close every bidding window whose TTL has elapsed.
    pub fn close_due_bidding(&self, now: DateTime<Utc>) -> u64 {
        let mut closed = 0u64;
        for lead_id in self.controller.due_windows(now) {
            match self.close_bidding(&lead_id, now) {
                Ok(_) => closed += 1,
                Err(err) => warn!(lead_id = %lead_id, error = %err, "bidding close failed"),
            }
        }
        closed
    }

    pub fn assignments_for(&self, lead_id: &LeadId) -> Vec<Assignment> {
        self.controller.assignments_for(lead_id)
    }

    pub fn active_assignment(&self, lead_id: &LeadId) -> Option<Assignment> {
        self.controller.active_assignment(lead_id)
    }

    fn fetch_lead(&self, lead_id: &LeadId) -> Result<LeadRecord, MarketplaceError> {
        self.leads
            .fetch(lead_id)?
            .ok_or_else(|| MarketplaceError::UnknownLead(lead_id.clone()))
    }

    fn ensure_priced(
        &self,
        record: &mut LeadRecord,
        now: DateTime<Utc>,
    ) -> Result<PricingRecord, MarketplaceError> {
        if let Some(pricing) = &record.pricing {
            return Ok(pricing.clone());
        }

        let score = self.scoring.score(&record.lead, now);
        let pricing = self.pricing.price(&score);
        record.score = Some(score);
        record.pricing = Some(pricing.clone());
        self.leads.update(record.clone())?;
        Ok(pricing)
    }

    /// Eligible, affordable companies for a lead, with the cost each would
    /// pay. Companies that match the category but cannot afford the cost
    /// produce an `InsufficientBudget` error when nothing else remains;
    /// no category match at all keeps the lead queued (`NoCandidate`).
    fn eligible_candidates(
        &self,
        record: &mut LeadRecord,
        now: DateTime<Utc>,
    ) -> Result<Vec<Candidate>, MarketplaceError> {
        let pricing = self.ensure_priced(record, now)?;
        let mut candidates = Vec::new();
        let mut matched_any = false;
        let mut min_cost = i64::MAX;
        let mut max_balance = 0i64;

        for company in self.companies.list()? {
            if company.paused || !company.modules_access.contains(&record.lead.category) {
                continue;
            }
            matched_any = true;

            let cost = company
                .lead_cost_per_unit_cents
                .unwrap_or(pricing.base_price_cents);
            min_cost = min_cost.min(cost);

            let balance = self.ledger.balance(&company.id).unwrap_or(0);
            max_balance = max_balance.max(balance);
            if balance >= cost {
                candidates.push(Candidate {
                    company_id: company.id.clone(),
                    cost_cents: cost,
                });
            }
        }

        if candidates.is_empty() {
            if matched_any {
                return Err(BudgetError::InsufficientBudget {
                    requested_cents: min_cost,
                    available_cents: max_balance,
                }
                .into());
            }
            return Err(DistributionError::NoCandidate(record.lead.id.clone()).into());
        }

        Ok(candidates)
    }

    fn finish_assignment(&self, assignment: &Assignment) {
        self.gate.record(
            &assignment.lead_id,
            &assignment.company_id,
            AccessTier::Basic,
        );
        info!(
            lead_id = %assignment.lead_id,
            company_id = %assignment.company_id,
            cost_cents = assignment.cost_cents,
            "lead assigned"
        );

        let mut details = BTreeMap::new();
        details.insert("lead_id".to_string(), assignment.lead_id.0.clone());
        details.insert(
            "cost_cents".to_string(),
            assignment.cost_cents.to_string(),
        );
        let alert = MarketplaceAlert {
            template: "lead_assigned".to_string(),
            company_id: assignment.company_id.clone(),
            details,
        };
        if let Err(err) = self.alerts.publish(alert) {
            warn!(company_id = %assignment.company_id, error = %err, "assignment alert dropped");
        }

        if let Ok(Some(company)) = self.companies.fetch(&assignment.company_id) {
            self.notify_if_low(&company);
        }
    }

    fn notify_if_low(&self, company: &Company) {
        match self.ledger.is_low_budget(company) {
            Ok(true) => {
                let balance = self.ledger.balance(&company.id).unwrap_or(0);
                let mut details = BTreeMap::new();
                details.insert("balance_cents".to_string(), balance.to_string());
                details.insert(
                    "threshold_cents".to_string(),
                    company.low_budget_threshold_cents.to_string(),
                );
                let alert = MarketplaceAlert {
                    template: "low_budget".to_string(),
                    company_id: company.id.clone(),
                    details,
                };
                if let Err(err) = self.alerts.publish(alert) {
                    warn!(company_id = %company.id, error = %err, "low budget alert dropped");
                }
            }
            Ok(false) => {}
            Err(err) => warn!(company_id = %company.id, error = %err, "low budget check failed"),
        }
    }
}
