use chrono::Duration;

use super::common::*;
use crate::marketplace::domain::SmartStartSubmission;
use crate::marketplace::insights::{GapSeverity, InsightsAggregator, InsightsFilters};

fn submission_batch(postcode: &str, service: &str, total: u64, converted: u64) -> Vec<SmartStartSubmission> {
    (0..total)
        .map(|i| SmartStartSubmission {
            postcode: postcode.to_string(),
            requested_services: vec![service.to_string()],
            lead_created: i < converted,
            created_at: now() + Duration::minutes(i as i64),
        })
        .collect()
}

#[test]
fn conversion_funnel_matches_the_submission_volume() {
    let aggregator = InsightsAggregator;
    let mut submissions = submission_batch("0255", "Strøm", 50, 20);
    submissions.extend(submission_batch("5003", "Varmepumpe", 30, 12));
    submissions.extend(submission_batch("7010", "Forsikring", 20, 8));

    let data = aggregator.aggregate(&submissions, &[], &[], &[], &InsightsFilters::default());

    assert_eq!(data.total_submissions, 100);
    assert_eq!(data.total_leads, 40);
    assert!((data.conversion_rate - 40.0).abs() < f64::EPSILON);

    let postcodes: Vec<&str> = data
        .top_postcodes
        .iter()
        .map(|stats| stats.postcode.as_str())
        .collect();
    assert_eq!(postcodes, vec!["0255", "5003", "7010"]);
    assert!((data.top_postcodes[0].conversion_rate - 40.0).abs() < f64::EPSILON);
}

#[test]
fn zero_volume_groups_report_zero_not_nan() {
    let aggregator = InsightsAggregator;

    let empty = aggregator.aggregate(&[], &[], &[], &[], &InsightsFilters::default());
    assert_eq!(empty.total_submissions, 0);
    assert_eq!(empty.conversion_rate, 0.0);

    let unconverted = submission_batch("9990", "Mobil", 5, 0);
    let data = aggregator.aggregate(&unconverted, &[], &[], &[], &InsightsFilters::default());
    assert_eq!(data.top_postcodes[0].conversion_rate, 0.0);
    assert_eq!(data.top_services[0].conversion_rate, 0.0);
}

#[test]
fn missing_fields_contribute_zero_instead_of_failing() {
    let aggregator = InsightsAggregator;
    let submissions = vec![
        SmartStartSubmission {
            postcode: "  ".to_string(),
            requested_services: vec![],
            lead_created: true,
            created_at: now(),
        },
        SmartStartSubmission {
            postcode: "0255".to_string(),
            requested_services: vec![String::new(), "Strøm".to_string()],
            lead_created: false,
            created_at: now(),
        },
    ];

    let data = aggregator.aggregate(&submissions, &[], &[], &[], &InsightsFilters::default());
    assert_eq!(data.total_submissions, 2);
    assert_eq!(data.top_postcodes.len(), 1);
    assert_eq!(data.top_services.len(), 1);
    assert_eq!(data.top_services[0].service, "Strøm");
}

#[test]
fn gap_severity_follows_the_demand_coverage_ratio() {
    let aggregator = InsightsAggregator;
    let companies = vec![
        company("c1", &["Strøm"]),
        company("c2", &["Strøm"]),
    ];

    let mut submissions = submission_batch("0255", "Strøm", 6, 0);
    submissions.extend(submission_batch("5003", "Strøm", 3, 0));
    submissions.extend(submission_batch("7010", "Strøm", 1, 0));
    submissions.extend(submission_batch("1473", "Solceller", 2, 0));

    let data = aggregator.aggregate(&submissions, &[], &[], &companies, &InsightsFilters::default());

    let severity_of = |postcode: &str, service: &str| {
        data.coverage_gaps
            .iter()
            .find(|gap| gap.postcode == postcode && gap.service == service)
            .map(|gap| gap.severity)
            .expect("gap present")
    };

    assert_eq!(severity_of("0255", "Strøm"), GapSeverity::High);
    assert_eq!(severity_of("5003", "Strøm"), GapSeverity::Medium);
    assert_eq!(severity_of("7010", "Strøm"), GapSeverity::Low);
    // No company covers the service at all.
    assert_eq!(severity_of("1473", "Solceller"), GapSeverity::High);

    assert_eq!(data.coverage_gaps[0].severity, GapSeverity::High);
}

#[test]
fn date_filters_bound_every_stream() {
    let aggregator = InsightsAggregator;
    let submissions = submission_batch("0255", "Strøm", 10, 5);

    let filters = InsightsFilters {
        from: Some(now()),
        to: Some(now() + Duration::minutes(4)),
    };
    let data = aggregator.aggregate(&submissions, &[], &[], &[], &filters);
    assert_eq!(data.total_submissions, 5);
    assert_eq!(data.total_leads, 5);
}

#[test]
fn csv_export_carries_the_headline_numbers() {
    let aggregator = InsightsAggregator;
    let submissions = submission_batch("0255", "Strøm", 10, 4);
    let data = aggregator.aggregate(&submissions, &[], &[], &[], &InsightsFilters::default());

    let csv = aggregator.to_csv(&data).expect("export succeeds");
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("group_kind,group,count,lead_count,conversion_rate")
    );
    assert_eq!(lines.next(), Some("total,all,10,4,40.0"));
    assert!(csv.lines().any(|line| line.starts_with("postcode,0255")));
    assert!(csv.lines().any(|line| line.starts_with("service,Strøm")));
}

#[test]
fn service_level_insights_compose_all_streams() {
    let (service, _, _, _, _) = build_service();
    seed_company(&service, "c1", &["Strøm"], 50_000, Some(5_000));

    for submission in submission_batch("0255", "Strøm", 4, 2) {
        service.record_submission(submission).expect("recorded");
    }
    let lead = submitted_lead(&service, strong_submission());
    service
        .assign_lead(&lead.id, crate::marketplace::distribution::DistributionMode::Direct, now())
        .expect("assignment succeeds");

    let data = service.insights(&InsightsFilters::default());
    assert_eq!(data.total_submissions, 4);
    assert_eq!(data.total_leads, 2);
    assert_eq!(data.funnel.leads, 1);
    assert_eq!(data.funnel.assigned, 1);
    assert_eq!(data.funnel.won, 0);
}
