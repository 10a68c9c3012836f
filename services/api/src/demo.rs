use crate::infra::{build_service, seed_demo_companies, ApiService};
use chrono::{Duration, Utc};
use clap::Args;

use leadmarket::error::AppError;
use leadmarket::marketplace::{
    AssignmentOutcome, CompanyId, DistributionMode, InsightsFilters, LeadSubmission,
    MarketSettings, MarketplaceError, SmartStartSubmission,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Skip the bidding-mode portion of the demo.
    #[arg(long)]
    pub(crate) skip_bidding: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct InsightsArgs {
    /// Emit the report as CSV instead of a readable table.
    #[arg(long)]
    pub(crate) csv: bool,
}

fn demo_submission(category: &str, urgent: bool) -> LeadSubmission {
    LeadSubmission {
        category: category.to_string(),
        postcode: "0255".to_string(),
        customer_name: "Kari Nordmann".to_string(),
        customer_email: "kari.nordmann@example.no".to_string(),
        customer_phone: "+47 912 34 567".to_string(),
        description: if urgent {
            "Ny avtale, haster før vinteren".to_string()
        } else {
            "Ny avtale".to_string()
        },
        urgent,
        budget_hint_cents: Some(45_000_00),
        property_type: Some("enebolig".to_string()),
    }
}

fn record_demo_submissions(service: &ApiService) -> Result<(), MarketplaceError> {
    let now = Utc::now();
    for i in 0..10u32 {
        service.record_submission(SmartStartSubmission {
            postcode: if i % 3 == 0 { "0255" } else { "5003" }.to_string(),
            requested_services: vec![if i % 2 == 0 { "Strøm" } else { "Varmepumpe" }.to_string()],
            lead_created: i % 5 < 2,
            created_at: now - Duration::minutes(i64::from(i)),
        })?;
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let handles = build_service(MarketSettings::default());
    let service = handles.service;
    seed_demo_companies(&service).map_err(AppError::from)?;
    record_demo_submissions(&service).map_err(AppError::from)?;

    let now = Utc::now();
    println!("Lead marketplace demo");

    println!("\nScoring and pricing");
    let record = service
        .submit_lead(demo_submission("Varmepumpe", true), now)
        .map_err(AppError::from)?;
    let lead_id = record.lead.id.clone();
    if let Some(score) = &record.score {
        println!(
            "- Lead {} scored {} (grade {})",
            lead_id,
            score.overall_score,
            score.grade.label()
        );
        println!(
            "  completeness {} | urgency {} | contact {} | budget {} | demand {} | location {}",
            score.completeness,
            score.urgency,
            score.contact_quality,
            score.budget_indicator,
            score.category_demand,
            score.location
        );
    }
    if let Some(pricing) = &record.pricing {
        println!(
            "  tier {} | preview {} øre | full access {} øre",
            pricing.tier.label(),
            pricing.base_price_cents,
            pricing.full_price_cents
        );
    }

    println!("\nDirect distribution");
    let outcome = service
        .assign_lead(&lead_id, DistributionMode::Direct, now)
        .map_err(AppError::from)?;
    let winner = match outcome {
        AssignmentOutcome::Assigned { assignment } => {
            println!(
                "- Assigned to {} for {} øre ({})",
                assignment.company_id,
                assignment.cost_cents,
                assignment.status.label()
            );
            assignment.company_id
        }
        AssignmentOutcome::BiddingOpened { closes_at } => {
            println!("- Unexpected bidding window until {closes_at}");
            return Ok(());
        }
    };
    println!(
        "  {} balance after debit: {} øre",
        winner,
        service.budget_balance(&winner).map_err(AppError::from)?
    );

    println!("\nContact access gate");
    let masked = service
        .get_contact_info(&lead_id, &winner)
        .map_err(AppError::from)?;
    println!(
        "- Preview tier {}: {} | {} | {}",
        masked.tier.label(),
        masked.name,
        masked.email,
        masked.phone
    );
    let outsider = CompanyId("trygg-forsikring".to_string());
    match service.get_contact_info(&lead_id, &outsider) {
        Err(MarketplaceError::Access(_)) => {
            println!("- {} has no relationship: denied, nothing disclosed", outsider)
        }
        other => println!("- Unexpected outsider access result: {other:?}"),
    }

    service
        .mark_contacted(&lead_id, now + Duration::minutes(8))
        .map_err(AppError::from)?;
    service
        .mark_won(&lead_id, now + Duration::hours(1))
        .map_err(AppError::from)?;
    let full = service
        .get_contact_info(&lead_id, &winner)
        .map_err(AppError::from)?;
    println!(
        "- After win, tier {}: {} | {} | {}",
        full.tier.label(),
        full.name,
        full.email,
        full.phone
    );

    if !args.skip_bidding {
        println!("\nBidding distribution");
        let auction = service
            .submit_lead(demo_submission("Strøm", false), now)
            .map_err(AppError::from)?;
        let auction_id = auction.lead.id.clone();
        let closes_at = match service
            .assign_lead(&auction_id, DistributionMode::Bidding, now)
            .map_err(AppError::from)?
        {
            AssignmentOutcome::BiddingOpened { closes_at } => closes_at,
            AssignmentOutcome::Assigned { assignment } => {
                println!("- Unexpected direct assignment to {}", assignment.company_id);
                return Ok(());
            }
        };
        println!("- Window open until {closes_at}");

        let nordvarme = CompanyId("nordvarme".to_string());
        let elkraft = CompanyId("elkraft".to_string());
        for (company, amount) in [(&nordvarme, 9_000), (&elkraft, 11_000)] {
            match service.place_bid(&auction_id, company, amount, now + Duration::minutes(1)) {
                Ok(receipt) => println!("- {} bids {} øre", company, receipt.amount_cents),
                Err(err) => println!("- {} bid rejected: {err}", company),
            }
        }

        match service
            .close_bidding(&auction_id, closes_at)
            .map_err(AppError::from)?
        {
            Some(assignment) => println!(
                "- Window closed: {} wins at {} øre",
                assignment.company_id, assignment.cost_cents
            ),
            None => println!("- Window closed with no affordable bids; lead requeued"),
        }
    }

    println!("\nQueue and metrics");
    let unmatched = service
        .submit_lead(demo_submission("Takrens", false), now - Duration::hours(3))
        .map_err(AppError::from)?;
    match service.assign_lead(&unmatched.lead.id, DistributionMode::Direct, now) {
        Err(MarketplaceError::Distribution(_)) => {
            println!("- No buyer covers Takrens; lead stays in the queue")
        }
        other => println!("- Unexpected distribution result: {other:?}"),
    }
    let queue = service.queue_status(now).map_err(AppError::from)?;
    println!(
        "- Queue: {} lead(s), oldest {}h, categories {:?}",
        queue.total_queued, queue.oldest_lead_age_hours, queue.categories
    );
    let metrics = service.distribution_metrics().map_err(AppError::from)?;
    println!(
        "- Metrics: {} pending, {} failed, {:.1} min avg response, {} paused companies",
        metrics.pending_assignments,
        metrics.failed_assignments,
        metrics.avg_response_minutes,
        metrics.paused_companies
    );

    print_insights(&service, false)?;

    let events = handles.alerts.events();
    if events.is_empty() {
        println!("\nExternal alerts: none dispatched");
    } else {
        println!("\nExternal alerts");
        for alert in events {
            println!("- template={} -> {}", alert.template, alert.company_id);
        }
    }

    Ok(())
}

pub(crate) fn run_insights(args: InsightsArgs) -> Result<(), AppError> {
    let handles = build_service(MarketSettings::default());
    let service = handles.service;
    seed_demo_companies(&service).map_err(AppError::from)?;
    record_demo_submissions(&service).map_err(AppError::from)?;
    print_insights(&service, args.csv)
}

fn print_insights(service: &ApiService, csv: bool) -> Result<(), AppError> {
    let filters = InsightsFilters::default();

    if csv {
        let export = service.insights_csv(&filters).map_err(AppError::from)?;
        println!("{export}");
        return Ok(());
    }

    let data = service.insights(&filters);
    println!("\nDemand insights");
    println!(
        "- {} submissions -> {} leads ({:.1}% conversion)",
        data.total_submissions, data.total_leads, data.conversion_rate
    );
    println!(
        "- Funnel: {} submitted / {} leads / {} assigned / {} won",
        data.funnel.submissions, data.funnel.leads, data.funnel.assigned, data.funnel.won
    );
    for stats in &data.top_postcodes {
        println!(
            "- Postcode {}: {} submissions, {:.1}% conversion",
            stats.postcode, stats.count, stats.conversion_rate
        );
    }
    for stats in &data.top_services {
        println!(
            "- Service {}: {} requests, {:.1}% conversion",
            stats.service, stats.count, stats.conversion_rate
        );
    }
    if data.coverage_gaps.is_empty() {
        println!("- Coverage gaps: none detected");
    } else {
        println!("- Coverage gaps:");
        for gap in &data.coverage_gaps {
            println!(
                "    {} / {}: demand {}, coverage {} ({})",
                gap.postcode,
                gap.service,
                gap.demand,
                gap.coverage,
                gap.severity.label()
            );
        }
    }

    Ok(())
}
