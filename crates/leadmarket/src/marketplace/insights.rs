//! Read-only batch rollups over submissions, leads, and assignments. Runs off
//! the distribution path and takes none of its locks; every input snapshot is
//! an owned slice fetched beforehand.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Assignment, AssignmentStatus, Company, Lead, SmartStartSubmission};

/// Optional date-range filter applied to every input stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightsFilters {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl InsightsFilters {
    fn contains(&self, at: DateTime<Utc>) -> bool {
        if let Some(from) = self.from {
            if at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if at > to {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostcodeStats {
    pub postcode: String,
    pub count: u64,
    pub lead_count: u64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub service: String,
    pub count: u64,
    pub lead_count: u64,
    pub conversion_rate: f64,
}

/// Coverage-shortfall severity for a (postcode, service) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapSeverity {
    High,
    Medium,
    Low,
}

impl GapSeverity {
    pub const fn label(self) -> &'static str {
        match self {
            GapSeverity::High => "high",
            GapSeverity::Medium => "medium",
            GapSeverity::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub postcode: String,
    pub service: String,
    pub demand: u64,
    pub coverage: u64,
    pub severity: GapSeverity,
}

/// Submission-to-sale funnel counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelStats {
    pub submissions: u64,
    pub leads: u64,
    pub assigned: u64,
    pub won: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightsData {
    pub total_submissions: u64,
    pub total_leads: u64,
    pub conversion_rate: f64,
    pub top_postcodes: Vec<PostcodeStats>,
    pub top_services: Vec<ServiceStats>,
    pub funnel: FunnelStats,
    pub coverage_gaps: Vec<CoverageGap>,
}

#[derive(Debug, thiserror::Error)]
pub enum InsightsError {
    #[error("csv export failed: {0}")]
    Export(String),
}

/// Demand-to-coverage ratio at or above this is a high gap.
const HIGH_GAP_RATIO: f64 = 3.0;
/// At or above this (and below the high mark) is a medium gap.
const MEDIUM_GAP_RATIO: f64 = 1.5;
const TOP_GROUP_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct InsightsAggregator;

impl InsightsAggregator {
    /// Roll the input snapshots into dashboard aggregates. Missing or empty
    /// fields contribute zero; nothing here divides by zero or panics.
    pub fn aggregate(
        &self,
        submissions: &[SmartStartSubmission],
        leads: &[Lead],
        assignments: &[Assignment],
        companies: &[Company],
        filters: &InsightsFilters,
    ) -> InsightsData {
        let submissions: Vec<&SmartStartSubmission> = submissions
            .iter()
            .filter(|s| filters.contains(s.created_at))
            .collect();
        let leads: Vec<&Lead> = leads
            .iter()
            .filter(|lead| filters.contains(lead.created_at))
            .collect();
        let assignments: Vec<&Assignment> = assignments
            .iter()
            .filter(|a| filters.contains(a.created_at))
            .collect();

        let total_submissions = submissions.len() as u64;
        let total_leads = submissions.iter().filter(|s| s.lead_created).count() as u64;
        let conversion_rate = conversion_rate(total_leads, total_submissions);

        let mut postcode_groups: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        let mut service_groups: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        let mut demand: BTreeMap<(String, String), u64> = BTreeMap::new();

        for submission in &submissions {
            let postcode = submission.postcode.trim();
            if !postcode.is_empty() {
                let entry = postcode_groups.entry(postcode.to_string()).or_default();
                entry.0 += 1;
                if submission.lead_created {
                    entry.1 += 1;
                }
            }

            for service in &submission.requested_services {
                let service = service.trim();
                if service.is_empty() {
                    continue;
                }
                let entry = service_groups.entry(service.to_string()).or_default();
                entry.0 += 1;
                if submission.lead_created {
                    entry.1 += 1;
                }

                if !postcode.is_empty() {
                    *demand
                        .entry((postcode.to_string(), service.to_string()))
                        .or_default() += 1;
                }
            }
        }

        let top_postcodes = top_groups(postcode_groups)
            .into_iter()
            .map(|(postcode, count, lead_count)| PostcodeStats {
                postcode,
                count,
                lead_count,
                conversion_rate: conversion_rate_counts(lead_count, count),
            })
            .collect();

        let top_services = top_groups(service_groups)
            .into_iter()
            .map(|(service, count, lead_count)| ServiceStats {
                service,
                count,
                lead_count,
                conversion_rate: conversion_rate_counts(lead_count, count),
            })
            .collect();

        let assigned_leads: std::collections::BTreeSet<_> =
            assignments.iter().map(|a| a.lead_id.clone()).collect();
        let won = assignments
            .iter()
            .filter(|a| a.status == AssignmentStatus::Won)
            .count() as u64;

        let funnel = FunnelStats {
            submissions: total_submissions,
            leads: leads.len() as u64,
            assigned: assigned_leads.len() as u64,
            won,
        };

        let coverage_gaps = classify_gaps(demand, companies);

        InsightsData {
            total_submissions,
            total_leads,
            conversion_rate,
            top_postcodes,
            top_services,
            funnel,
            coverage_gaps,
        }
    }

    /// Flat CSV export of the aggregate for spreadsheet consumers.
    pub fn to_csv(&self, data: &InsightsData) -> Result<String, InsightsError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut rows: Vec<[String; 5]> = Vec::new();
        rows.push([
            "group_kind".to_string(),
            "group".to_string(),
            "count".to_string(),
            "lead_count".to_string(),
            "conversion_rate".to_string(),
        ]);
        rows.push([
            "total".to_string(),
            "all".to_string(),
            data.total_submissions.to_string(),
            data.total_leads.to_string(),
            format!("{:.1}", data.conversion_rate),
        ]);
        for stats in &data.top_postcodes {
            rows.push([
                "postcode".to_string(),
                stats.postcode.clone(),
                stats.count.to_string(),
                stats.lead_count.to_string(),
                format!("{:.1}", stats.conversion_rate),
            ]);
        }
        for stats in &data.top_services {
            rows.push([
                "service".to_string(),
                stats.service.clone(),
                stats.count.to_string(),
                stats.lead_count.to_string(),
                format!("{:.1}", stats.conversion_rate),
            ]);
        }

        for row in &rows {
            writer
                .write_record(row)
                .map_err(|err| InsightsError::Export(err.to_string()))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|err| InsightsError::Export(err.to_string()))?;
        String::from_utf8(bytes).map_err(|err| InsightsError::Export(err.to_string()))
    }
}

fn conversion_rate(leads: u64, submissions: u64) -> f64 {
    conversion_rate_counts(leads, submissions)
}

fn conversion_rate_counts(leads: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        leads as f64 / total as f64 * 100.0
    }
}

/// Sort groups by volume descending (key ascending on ties) and keep the top
/// slice.
fn top_groups(groups: BTreeMap<String, (u64, u64)>) -> Vec<(String, u64, u64)> {
    let mut rows: Vec<(String, u64, u64)> = groups
        .into_iter()
        .map(|(key, (count, lead_count))| (key, count, lead_count))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    rows.truncate(TOP_GROUP_LIMIT);
    rows
}

fn classify_gaps(
    demand: BTreeMap<(String, String), u64>,
    companies: &[Company],
) -> Vec<CoverageGap> {
    let mut gaps: Vec<CoverageGap> = demand
        .into_iter()
        .map(|((postcode, service), requested)| {
            let coverage = companies
                .iter()
                .filter(|company| company.modules_access.contains(&service))
                .count() as u64;

            let severity = if coverage == 0 {
                GapSeverity::High
            } else {
                let ratio = requested as f64 / coverage as f64;
                if ratio >= HIGH_GAP_RATIO {
                    GapSeverity::High
                } else if ratio >= MEDIUM_GAP_RATIO {
                    GapSeverity::Medium
                } else {
                    GapSeverity::Low
                }
            };

            CoverageGap {
                postcode,
                service,
                demand: requested,
                coverage,
                severity,
            }
        })
        .collect();

    gaps.sort_by(|a, b| a.severity.cmp(&b.severity).then(b.demand.cmp(&a.demand)));
    gaps
}
