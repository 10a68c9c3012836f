use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::budget::{BudgetAdjustment, BudgetError};
use super::distribution::{DistributionError, DistributionMode};
use super::domain::{Company, CompanyId, LeadId, LeadStatus, SmartStartSubmission};
use super::repository::{
    AlertPublisher, CompanyRepository, LeadRecord, LeadRepository, RepositoryError,
    SubmissionRepository,
};
use super::service::{AssignmentOutcome, MarketplaceError, MarketplaceService};

/// Router builder exposing the engine's HTTP endpoints.
pub fn marketplace_router<L, C, S, A>(service: Arc<MarketplaceService<L, C, S, A>>) -> Router
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    Router::new()
        .route("/api/v1/leads", post(submit_lead_handler::<L, C, S, A>))
        .route("/api/v1/leads/:lead_id", get(lead_handler::<L, C, S, A>))
        .route(
            "/api/v1/leads/:lead_id/score",
            get(score_handler::<L, C, S, A>),
        )
        .route(
            "/api/v1/leads/:lead_id/pricing",
            get(pricing_handler::<L, C, S, A>),
        )
        .route(
            "/api/v1/leads/:lead_id/assign",
            post(assign_handler::<L, C, S, A>),
        )
        .route(
            "/api/v1/leads/:lead_id/bids",
            post(bid_handler::<L, C, S, A>),
        )
        .route(
            "/api/v1/leads/:lead_id/bidding/close",
            post(close_bidding_handler::<L, C, S, A>),
        )
        .route(
            "/api/v1/leads/:lead_id/bidding/cancel",
            post(cancel_bidding_handler::<L, C, S, A>),
        )
        .route(
            "/api/v1/leads/:lead_id/status",
            post(status_handler::<L, C, S, A>),
        )
        .route(
            "/api/v1/leads/:lead_id/contact/:viewer_id",
            get(contact_handler::<L, C, S, A>),
        )
        .route(
            "/api/v1/companies",
            post(register_company_handler::<L, C, S, A>),
        )
        .route(
            "/api/v1/companies/:company_id/budget",
            post(adjust_budget_handler::<L, C, S, A>).get(budget_status_handler::<L, C, S, A>),
        )
        .route(
            "/api/v1/companies/:company_id/pause",
            post(company_pause_handler::<L, C, S, A>),
        )
        .route(
            "/api/v1/submissions",
            post(submission_handler::<L, C, S, A>),
        )
        .route("/api/v1/insights", get(insights_handler::<L, C, S, A>))
        .route(
            "/api/v1/distribution/queue",
            get(queue_handler::<L, C, S, A>),
        )
        .route(
            "/api/v1/distribution/metrics",
            get(metrics_handler::<L, C, S, A>),
        )
        .route(
            "/api/v1/distribution/pause",
            post(global_pause_handler::<L, C, S, A>),
        )
        .with_state(service)
}

fn status_for(err: &MarketplaceError) -> StatusCode {
    match err {
        MarketplaceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MarketplaceError::UnknownLead(_) | MarketplaceError::UnknownCompany(_) => {
            StatusCode::NOT_FOUND
        }
        MarketplaceError::Budget(err) => budget_status(err),
        MarketplaceError::Distribution(err) => match err {
            DistributionError::Budget(err) => budget_status(err),
            DistributionError::NoCandidate(_)
            | DistributionError::ConcurrencyConflict(_)
            | DistributionError::GloballyPaused
            | DistributionError::NotAssigned(_)
            | DistributionError::InvalidTransition { .. }
            | DistributionError::BiddingClosed(_) => StatusCode::CONFLICT,
            DistributionError::BidBelowFloor { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DistributionError::IneligibleBidder { .. } => StatusCode::FORBIDDEN,
        },
        MarketplaceError::Access(_) => StatusCode::FORBIDDEN,
        MarketplaceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        MarketplaceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        MarketplaceError::Repository(RepositoryError::Unavailable(_))
        | MarketplaceError::Alert(_)
        | MarketplaceError::Insights(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn budget_status(err: &BudgetError) -> StatusCode {
    match err {
        BudgetError::InsufficientBudget { .. } => StatusCode::PAYMENT_REQUIRED,
        BudgetError::UnknownCompany(_) => StatusCode::NOT_FOUND,
        BudgetError::NegativeAmount(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl IntoResponse for MarketplaceError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let body = axum::Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Public lead view: never carries contact fields, masked or otherwise.
#[derive(Debug, Serialize)]
pub struct LeadView {
    pub lead_id: LeadId,
    pub category: String,
    pub postcode: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_price_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_price_cents: Option<i64>,
}

fn lead_view(record: &LeadRecord, status: LeadStatus) -> LeadView {
    LeadView {
        lead_id: record.lead.id.clone(),
        category: record.lead.category.clone(),
        postcode: record.lead.postcode.clone(),
        status: status.label(),
        overall_score: record.score.as_ref().map(|score| score.overall_score),
        grade: record.score.as_ref().map(|score| score.grade.label()),
        tier: record.pricing.as_ref().map(|pricing| pricing.tier.label()),
        base_price_cents: record.pricing.as_ref().map(|p| p.base_price_cents),
        full_price_cents: record.pricing.as_ref().map(|p| p.full_price_cents),
    }
}

pub(crate) async fn submit_lead_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    axum::Json(submission): axum::Json<super::domain::LeadSubmission>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    match service.submit_lead(submission, Utc::now()) {
        Ok(record) => {
            let view = lead_view(&record, LeadStatus::Unassigned);
            (StatusCode::ACCEPTED, axum::Json(view)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn lead_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    Path(lead_id): Path<String>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    let lead_id = LeadId(lead_id);
    let record = match service.lead(&lead_id) {
        Ok(record) => record,
        Err(err) => return err.into_response(),
    };
    match service.lead_status(&lead_id) {
        Ok(status) => (StatusCode::OK, axum::Json(lead_view(&record, status))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn score_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    Path(lead_id): Path<String>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    match service.calculate_score(&LeadId(lead_id), Utc::now()) {
        Ok(score) => (StatusCode::OK, axum::Json(score)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn pricing_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    Path(lead_id): Path<String>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    match service.get_pricing(&LeadId(lead_id), Utc::now()) {
        Ok(pricing) => (StatusCode::OK, axum::Json(pricing)).into_response(),
        Err(err) => err.into_response(),
    }
}

fn default_mode() -> DistributionMode {
    DistributionMode::Direct
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignRequest {
    #[serde(default = "default_mode")]
    pub(crate) mode: DistributionMode,
}

pub(crate) async fn assign_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    Path(lead_id): Path<String>,
    axum::Json(request): axum::Json<AssignRequest>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    let lead_id = LeadId(lead_id);
    match service.assign_lead(&lead_id, request.mode, Utc::now()) {
        Ok(AssignmentOutcome::Assigned { assignment }) => {
            (StatusCode::CREATED, axum::Json(assignment)).into_response()
        }
        Ok(outcome @ AssignmentOutcome::BiddingOpened { .. }) => {
            (StatusCode::ACCEPTED, axum::Json(outcome)).into_response()
        }
        // An empty candidate pool is a normal queue state, not a failure.
        Err(MarketplaceError::Distribution(DistributionError::NoCandidate(lead_id))) => {
            let payload = json!({ "status": "queued", "lead_id": lead_id.0 });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BidRequest {
    pub(crate) company_id: String,
    pub(crate) amount_cents: i64,
}

pub(crate) async fn bid_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    Path(lead_id): Path<String>,
    axum::Json(request): axum::Json<BidRequest>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    match service.place_bid(
        &LeadId(lead_id),
        &CompanyId(request.company_id),
        request.amount_cents,
        Utc::now(),
    ) {
        Ok(receipt) => (StatusCode::ACCEPTED, axum::Json(receipt)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn close_bidding_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    Path(lead_id): Path<String>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    let lead_id = LeadId(lead_id);
    match service.close_bidding(&lead_id, Utc::now()) {
        Ok(Some(assignment)) => (StatusCode::OK, axum::Json(assignment)).into_response(),
        Ok(None) => {
            let payload = json!({ "status": "requeued", "lead_id": lead_id.0 });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn cancel_bidding_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    Path(lead_id): Path<String>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    let lead_id = LeadId(lead_id);
    match service.withdraw_lead(&lead_id) {
        Ok(()) => {
            let payload = json!({ "status": "cancelled", "lead_id": lead_id.0 });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ResponseStatus {
    Contacted,
    Won,
    Lost,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusRequest {
    pub(crate) status: ResponseStatus,
}

pub(crate) async fn status_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    Path(lead_id): Path<String>,
    axum::Json(request): axum::Json<StatusRequest>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    let lead_id = LeadId(lead_id);
    let now = Utc::now();
    let result = match request.status {
        ResponseStatus::Contacted => service.mark_contacted(&lead_id, now),
        ResponseStatus::Won => service.mark_won(&lead_id, now),
        ResponseStatus::Lost => service.mark_lost(&lead_id, now),
    };

    match result {
        Ok(assignment) => (StatusCode::OK, axum::Json(assignment)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn contact_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    Path((lead_id, viewer_id)): Path<(String, String)>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    match service.get_contact_info(&LeadId(lead_id), &CompanyId(viewer_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn register_company_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    axum::Json(company): axum::Json<Company>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    let company_id = company.id.clone();
    match service.register_company(company) {
        Ok(()) => {
            let payload = json!({ "status": "registered", "company_id": company_id.0 });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn adjust_budget_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    Path(company_id): Path<String>,
    axum::Json(adjustment): axum::Json<BudgetAdjustment>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    match service.adjust_budget(&CompanyId(company_id), adjustment, Utc::now()) {
        Ok(transaction) => (StatusCode::CREATED, axum::Json(transaction)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn budget_status_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    Path(company_id): Path<String>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    let company_id = CompanyId(company_id);
    let balance = match service.budget_balance(&company_id) {
        Ok(balance) => balance,
        Err(err) => return err.into_response(),
    };
    let low_budget = service.is_low_budget(&company_id).unwrap_or(false);
    let transactions = match service.budget_transactions(&company_id) {
        Ok(transactions) => transactions,
        Err(err) => return err.into_response(),
    };

    let payload = json!({
        "company_id": company_id.0,
        "balance_cents": balance,
        "low_budget": low_budget,
        "transactions": transactions,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct PauseRequest {
    pub(crate) paused: bool,
}

pub(crate) async fn company_pause_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    Path(company_id): Path<String>,
    axum::Json(request): axum::Json<PauseRequest>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    let company_id = CompanyId(company_id);
    match service.set_company_paused(&company_id, request.paused) {
        Ok(()) => {
            let payload = json!({ "company_id": company_id.0, "paused": request.paused });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmissionPayload {
    pub(crate) postcode: String,
    #[serde(default)]
    pub(crate) requested_services: Vec<String>,
    #[serde(default)]
    pub(crate) lead_created: bool,
}

pub(crate) async fn submission_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    axum::Json(payload): axum::Json<SubmissionPayload>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    let submission = SmartStartSubmission {
        postcode: payload.postcode,
        requested_services: payload.requested_services,
        lead_created: payload.lead_created,
        created_at: Utc::now(),
    };
    match service.record_submission(submission) {
        Ok(()) => (StatusCode::ACCEPTED, axum::Json(json!({ "status": "recorded" })))
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct InsightsQuery {
    pub(crate) from: Option<DateTime<Utc>>,
    pub(crate) to: Option<DateTime<Utc>>,
    pub(crate) format: Option<String>,
}

pub(crate) async fn insights_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    Query(query): Query<InsightsQuery>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    let filters = super::insights::InsightsFilters {
        from: query.from,
        to: query.to,
    };

    if query.format.as_deref() == Some("csv") {
        return match service.insights_csv(&filters) {
            Ok(csv) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/csv")],
                csv,
            )
                .into_response(),
            Err(err) => err.into_response(),
        };
    }

    let data = service.insights(&filters);
    (StatusCode::OK, axum::Json(data)).into_response()
}

pub(crate) async fn queue_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    match service.queue_status(Utc::now()) {
        Ok(status) => (StatusCode::OK, axum::Json(status)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn metrics_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    match service.distribution_metrics() {
        Ok(metrics) => (StatusCode::OK, axum::Json(metrics)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn global_pause_handler<L, C, S, A>(
    State(service): State<Arc<MarketplaceService<L, C, S, A>>>,
    axum::Json(request): axum::Json<PauseRequest>,
) -> Response
where
    L: LeadRepository + 'static,
    C: CompanyRepository + 'static,
    S: SubmissionRepository + 'static,
    A: AlertPublisher + 'static,
{
    service.set_global_pause(request.paused);
    let payload = json!({ "globally_paused": request.paused });
    (StatusCode::OK, axum::Json(payload)).into_response()
}
