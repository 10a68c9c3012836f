use serde::{Deserialize, Serialize};

use super::domain::LeadId;
use super::scoring::{Grade, ScoreRecord};

/// Commercial tier a scored lead is sold under. One tier per grade band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTier {
    Platinum,
    Gold,
    Silver,
    Bronze,
    Basic,
}

impl PriceTier {
    pub const fn from_grade(grade: Grade) -> Self {
        match grade {
            Grade::A => PriceTier::Platinum,
            Grade::B => PriceTier::Gold,
            Grade::C => PriceTier::Silver,
            Grade::D => PriceTier::Bronze,
            Grade::F => PriceTier::Basic,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            PriceTier::Platinum => "platinum",
            PriceTier::Gold => "gold",
            PriceTier::Silver => "silver",
            PriceTier::Bronze => "bronze",
            PriceTier::Basic => "basic",
        }
    }

    /// Price in øre at the bottom of the tier's score band.
    const fn floor_cents(self) -> i64 {
        match self {
            PriceTier::Platinum => 25_000,
            PriceTier::Gold => 18_000,
            PriceTier::Silver => 12_000,
            PriceTier::Bronze => 8_000,
            PriceTier::Basic => 4_000,
        }
    }

    /// Increment per score point above the band floor.
    const fn step_cents(self) -> i64 {
        match self {
            PriceTier::Platinum => 150,
            PriceTier::Gold => 100,
            PriceTier::Silver => 80,
            PriceTier::Bronze => 60,
            PriceTier::Basic => 40,
        }
    }

    /// Full contact access as a percentage of the base price. Always >= 100,
    /// which keeps base <= full.
    const fn full_multiplier_pct(self) -> i64 {
        match self {
            PriceTier::Platinum => 300,
            PriceTier::Gold => 280,
            PriceTier::Silver => 250,
            PriceTier::Bronze => 220,
            PriceTier::Basic => 200,
        }
    }
}

/// Price points for a scored lead: base buys preview access, full buys the
/// unmasked contact details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRecord {
    pub lead_id: LeadId,
    pub tier: PriceTier,
    pub base_price_cents: i64,
    pub full_price_cents: i64,
    pub score: u8,
}

/// Pure pricing function over a score record. No I/O and no shared state, so
/// it can run off any critical path.
#[derive(Debug, Clone, Copy, Default)]
pub struct PricingEngine;

impl PricingEngine {
    pub fn price(&self, score: &ScoreRecord) -> PricingRecord {
        let tier = PriceTier::from_grade(score.grade);
        let points_above_floor = i64::from(score.overall_score - score.grade.band_floor());
        let base_price_cents = tier.floor_cents() + points_above_floor * tier.step_cents();
        let full_price_cents = base_price_cents * tier.full_multiplier_pct() / 100;

        PricingRecord {
            lead_id: score.lead_id.clone(),
            tier,
            base_price_cents,
            full_price_cents,
            score: score.overall_score,
        }
    }
}
