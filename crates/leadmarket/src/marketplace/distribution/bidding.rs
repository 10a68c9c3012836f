use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::super::domain::{CompanyId, LeadId};

/// A company's offer for an auctioned lead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bid {
    pub company_id: CompanyId,
    pub amount_cents: i64,
    pub placed_at: DateTime<Utc>,
}

/// Acknowledgement returned to a bidder while the window is open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BidReceipt {
    pub lead_id: LeadId,
    pub company_id: CompanyId,
    pub amount_cents: i64,
    pub closes_at: DateTime<Utc>,
}

/// Outcome of the single close event for a bidding window. The close fires
/// exactly once; later calls observe `AlreadyClosed` or `Cancelled`.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    /// Window closed by this call; bids ranked best-first.
    Winner { bids: Vec<Bid> },
    /// Window closed by this call with no bids; the lead returns to the pool.
    NoBids,
    AlreadyClosed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WindowState {
    Open,
    Closed,
    Cancelled,
}

#[derive(Debug)]
pub(crate) struct BiddingWindow {
    pub(crate) closes_at: DateTime<Utc>,
    pub(crate) state: WindowState,
    pub(crate) bids: Vec<Bid>,
}

impl BiddingWindow {
    pub(crate) fn open(now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            closes_at: now + ttl,
            state: WindowState::Open,
            bids: Vec::new(),
        }
    }

    /// Highest amount first; equal amounts resolved by earliest placement.
    pub(crate) fn ranked_bids(&self) -> Vec<Bid> {
        let mut ranked = self.bids.clone();
        ranked.sort_by(|a, b| {
            b.amount_cents
                .cmp(&a.amount_cents)
                .then(a.placed_at.cmp(&b.placed_at))
        });
        ranked
    }
}
