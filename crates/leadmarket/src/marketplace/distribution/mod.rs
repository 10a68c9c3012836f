//! Assignment distribution: eligibility-ordered direct placement, time-boxed
//! bidding, the per-lead exclusivity guarantee, and SLA failure handling.

mod bidding;

pub use bidding::{Bid, BidReceipt, CloseOutcome};

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::budget::BudgetError;
use super::domain::{Assignment, AssignmentStatus, CompanyId, LeadId};
use bidding::{BiddingWindow, WindowState};

/// Selection policy requested by the caller of `assign_lead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMode {
    Direct,
    Bidding,
}

/// An eligible company together with the cost it would be debited.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub company_id: CompanyId,
    pub cost_cents: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error("no eligible company for lead {0}")]
    NoCandidate(LeadId),
    #[error(transparent)]
    Budget(#[from] BudgetError),
    #[error("lost the assignment race for lead {0}")]
    ConcurrencyConflict(LeadId),
    #[error("lead {0} has no active assignment")]
    NotAssigned(LeadId),
    #[error("assignment for lead {lead_id} cannot move from {from} to {to}")]
    InvalidTransition {
        lead_id: LeadId,
        from: &'static str,
        to: &'static str,
    },
    #[error("lead distribution is globally paused")]
    GloballyPaused,
    #[error("no open bidding window for lead {0}")]
    BiddingClosed(LeadId),
    #[error("bid of {offered_cents} is below the {floor_cents} floor")]
    BidBelowFloor {
        offered_cents: i64,
        floor_cents: i64,
    },
    #[error("company {company_id} is not eligible to bid on this lead")]
    IneligibleBidder { company_id: CompanyId },
}

/// Read-only counters exposed to dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControllerMetrics {
    pub pending_assignments: u64,
    pub failed_assignments: u64,
    pub avg_response_secs: f64,
}

#[derive(Debug, Default)]
struct ControllerState {
    assignments: HashMap<LeadId, Vec<Assignment>>,
    last_assigned: HashMap<CompanyId, DateTime<Utc>>,
    windows: HashMap<LeadId, BiddingWindow>,
    globally_paused: bool,
    failed_assignments: u64,
    response_total_secs: i64,
    response_samples: u64,
}

impl ControllerState {
    fn has_active(&self, lead_id: &LeadId) -> bool {
        self.assignments
            .get(lead_id)
            .map(|history| history.iter().any(|a| a.status.is_active()))
            .unwrap_or(false)
    }
}

/// Queue controller guarding the exclusivity invariant: every assignment
/// creation is a conditional insert under one lock, so concurrent attempts
/// for the same lead produce exactly one winner.
#[derive(Debug, Default)]
pub struct DistributionController {
    state: Mutex<ControllerState>,
}

impl DistributionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_global_pause(&self, paused: bool) {
        let mut state = self.state.lock().expect("controller mutex poisoned");
        state.globally_paused = paused;
    }

    pub fn global_pause(&self) -> bool {
        let state = self.state.lock().expect("controller mutex poisoned");
        state.globally_paused
    }

    /// Reserve the fairest candidate for the lead: the company with the
    /// longest time since its last assignment, never-assigned companies
    /// first, lowest id on ties. Fails with `ConcurrencyConflict` when an
    /// active assignment already exists, which is how a losing racer learns
    /// to retry.
    pub fn reserve_next(
        &self,
        lead_id: &LeadId,
        candidates: &[Candidate],
        now: DateTime<Utc>,
    ) -> Result<Assignment, DistributionError> {
        let mut state = self.state.lock().expect("controller mutex poisoned");
        if state.globally_paused {
            return Err(DistributionError::GloballyPaused);
        }
        if state.has_active(lead_id) {
            return Err(DistributionError::ConcurrencyConflict(lead_id.clone()));
        }

        let chosen = candidates
            .iter()
            .min_by_key(|candidate| {
                (
                    state.last_assigned.get(&candidate.company_id).copied(),
                    candidate.company_id.clone(),
                )
            })
            .ok_or_else(|| DistributionError::NoCandidate(lead_id.clone()))?
            .clone();

        let assignment = Assignment {
            lead_id: lead_id.clone(),
            company_id: chosen.company_id.clone(),
            status: AssignmentStatus::Pending,
            cost_cents: chosen.cost_cents,
            created_at: now,
            responded_at: None,
        };

        state
            .assignments
            .entry(lead_id.clone())
            .or_default()
            .push(assignment.clone());
        state.last_assigned.insert(chosen.company_id, now);

        Ok(assignment)
    }

    /// Reserve a specific company (bidding winner path). Same exclusivity
    /// rule as `reserve_next`.
    pub fn reserve_for(
        &self,
        lead_id: &LeadId,
        company_id: &CompanyId,
        cost_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<Assignment, DistributionError> {
        self.reserve_next(
            lead_id,
            &[Candidate {
                company_id: company_id.clone(),
                cost_cents,
            }],
            now,
        )
    }

    /// Roll back a reservation whose debit failed. Only removes the slot if
    /// it is still the pending assignment for that company.
    pub fn release(&self, lead_id: &LeadId, company_id: &CompanyId) {
        let mut state = self.state.lock().expect("controller mutex poisoned");
        if let Some(history) = state.assignments.get_mut(lead_id) {
            let matches = history
                .last()
                .map(|a| a.status == AssignmentStatus::Pending && a.company_id == *company_id)
                .unwrap_or(false);
            if matches {
                history.pop();
            }
        }
    }

    pub fn transition(
        &self,
        lead_id: &LeadId,
        next: AssignmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Assignment, DistributionError> {
        let mut guard = self.state.lock().expect("controller mutex poisoned");
        let state = &mut *guard;

        let Some(active) = state
            .assignments
            .get_mut(lead_id)
            .and_then(|history| history.iter_mut().find(|a| a.status.is_active()))
        else {
            return Err(DistributionError::NotAssigned(lead_id.clone()));
        };

        if !active.status.can_transition_to(next) {
            return Err(DistributionError::InvalidTransition {
                lead_id: lead_id.clone(),
                from: active.status.label(),
                to: next.label(),
            });
        }

        active.status = next;
        if next == AssignmentStatus::Contacted {
            active.responded_at = Some(now);
            state.response_total_secs += (now - active.created_at).num_seconds();
            state.response_samples += 1;
        }

        Ok(active.clone())
    }

    /// Fail every pending assignment older than the SLA and return the
    /// failed slots so callers can log and requeue. Contacted assignments are
    /// never touched.
    pub fn expire_stale(&self, now: DateTime<Utc>, sla: Duration) -> Vec<Assignment> {
        let mut state = self.state.lock().expect("controller mutex poisoned");
        let mut expired = Vec::new();

        for history in state.assignments.values_mut() {
            if let Some(assignment) = history
                .iter_mut()
                .find(|a| a.status == AssignmentStatus::Pending)
            {
                if now - assignment.created_at > sla {
                    assignment.status = AssignmentStatus::Failed;
                    expired.push(assignment.clone());
                }
            }
        }

        state.failed_assignments += expired.len() as u64;
        expired
    }

    pub fn active_assignment(&self, lead_id: &LeadId) -> Option<Assignment> {
        let state = self.state.lock().expect("controller mutex poisoned");
        state
            .assignments
            .get(lead_id)
            .and_then(|history| history.iter().find(|a| a.status.is_active()).cloned())
    }

    /// Snapshot of every assignment, for batch consumers like insights.
    pub fn all_assignments(&self) -> Vec<Assignment> {
        let state = self.state.lock().expect("controller mutex poisoned");
        state.assignments.values().flatten().cloned().collect()
    }

    pub fn assignments_for(&self, lead_id: &LeadId) -> Vec<Assignment> {
        let state = self.state.lock().expect("controller mutex poisoned");
        state.assignments.get(lead_id).cloned().unwrap_or_default()
    }

    /// Every status this company has ever held on the lead, for access-tier
    /// derivation.
    pub fn company_statuses(&self, lead_id: &LeadId, company_id: &CompanyId) -> Vec<AssignmentStatus> {
        let state = self.state.lock().expect("controller mutex poisoned");
        state
            .assignments
            .get(lead_id)
            .map(|history| {
                history
                    .iter()
                    .filter(|a| a.company_id == *company_id)
                    .map(|a| a.status)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_active(&self, lead_id: &LeadId) -> bool {
        let state = self.state.lock().expect("controller mutex poisoned");
        state.has_active(lead_id)
    }

    pub fn metrics(&self) -> ControllerMetrics {
        let state = self.state.lock().expect("controller mutex poisoned");
        let pending = state
            .assignments
            .values()
            .flatten()
            .filter(|a| a.status == AssignmentStatus::Pending)
            .count() as u64;
        let avg_response_secs = if state.response_samples == 0 {
            0.0
        } else {
            state.response_total_secs as f64 / state.response_samples as f64
        };

        ControllerMetrics {
            pending_assignments: pending,
            failed_assignments: state.failed_assignments,
            avg_response_secs,
        }
    }

    /// Open (or re-open after a terminal window) the bidding window for a
    /// lead. Idempotent while a window is open: the existing close time is
    /// returned.
    pub fn open_bidding(
        &self,
        lead_id: &LeadId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, DistributionError> {
        let mut state = self.state.lock().expect("controller mutex poisoned");
        if state.has_active(lead_id) {
            return Err(DistributionError::ConcurrencyConflict(lead_id.clone()));
        }

        if let Some(window) = state.windows.get(lead_id) {
            if window.state == WindowState::Open {
                return Ok(window.closes_at);
            }
        }

        let window = BiddingWindow::open(now, ttl);
        let closes_at = window.closes_at;
        state.windows.insert(lead_id.clone(), window);
        Ok(closes_at)
    }

    pub fn place_bid(
        &self,
        lead_id: &LeadId,
        company_id: &CompanyId,
        amount_cents: i64,
        floor_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<BidReceipt, DistributionError> {
        let mut state = self.state.lock().expect("controller mutex poisoned");
        let Some(window) = state.windows.get_mut(lead_id) else {
            return Err(DistributionError::BiddingClosed(lead_id.clone()));
        };
        if window.state != WindowState::Open || now >= window.closes_at {
            return Err(DistributionError::BiddingClosed(lead_id.clone()));
        }
        if amount_cents < floor_cents {
            return Err(DistributionError::BidBelowFloor {
                offered_cents: amount_cents,
                floor_cents,
            });
        }

        window.bids.push(Bid {
            company_id: company_id.clone(),
            amount_cents,
            placed_at: now,
        });

        Ok(BidReceipt {
            lead_id: lead_id.clone(),
            company_id: company_id.clone(),
            amount_cents,
            closes_at: window.closes_at,
        })
    }

    /// The single close event for a window. The first call flips the window
    /// to closed and yields the ranked bids; every later call observes
    /// `AlreadyClosed` (or `Cancelled`) and must not process bids again.
    pub fn close_bidding(
        &self,
        lead_id: &LeadId,
        _now: DateTime<Utc>,
    ) -> Result<CloseOutcome, DistributionError> {
        let mut state = self.state.lock().expect("controller mutex poisoned");
        let Some(window) = state.windows.get_mut(lead_id) else {
            return Err(DistributionError::BiddingClosed(lead_id.clone()));
        };

        match window.state {
            WindowState::Closed => Ok(CloseOutcome::AlreadyClosed),
            WindowState::Cancelled => Ok(CloseOutcome::Cancelled),
            WindowState::Open => {
                window.state = WindowState::Closed;
                if window.bids.is_empty() {
                    Ok(CloseOutcome::NoBids)
                } else {
                    Ok(CloseOutcome::Winner {
                        bids: window.ranked_bids(),
                    })
                }
            }
        }
    }

    /// Cancel an open window (lead withdrawn). Idempotent; a window that
    /// already closed cannot be cancelled.
    pub fn cancel_bidding(&self, lead_id: &LeadId) -> Result<(), DistributionError> {
        let mut state = self.state.lock().expect("controller mutex poisoned");
        match state.windows.get_mut(lead_id) {
            None => Ok(()),
            Some(window) => match window.state {
                WindowState::Open => {
                    window.state = WindowState::Cancelled;
                    window.bids.clear();
                    Ok(())
                }
                WindowState::Cancelled => Ok(()),
                WindowState::Closed => Err(DistributionError::BiddingClosed(lead_id.clone())),
            },
        }
    }

    /// Open windows whose TTL has elapsed, ready for the maintenance sweep.
    pub fn due_windows(&self, now: DateTime<Utc>) -> Vec<LeadId> {
        let state = self.state.lock().expect("controller mutex poisoned");
        state
            .windows
            .iter()
            .filter(|(_, window)| window.state == WindowState::Open && window.closes_at <= now)
            .map(|(lead_id, _)| lead_id.clone())
            .collect()
    }
}
