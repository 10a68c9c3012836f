mod config;
mod factors;

pub use config::{FactorWeights, ScoringConfig};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Lead, LeadId};

/// Grade bands partitioning the 0-100 score range. The floors are fixed
/// constants: A >= 80, B >= 65, C >= 50, D >= 35, F below.
pub const GRADE_A_FLOOR: u8 = 80;
pub const GRADE_B_FLOOR: u8 = 65;
pub const GRADE_C_FLOOR: u8 = 50;
pub const GRADE_D_FLOOR: u8 = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub const fn from_score(score: u8) -> Self {
        if score >= GRADE_A_FLOOR {
            Grade::A
        } else if score >= GRADE_B_FLOOR {
            Grade::B
        } else if score >= GRADE_C_FLOOR {
            Grade::C
        } else if score >= GRADE_D_FLOOR {
            Grade::D
        } else {
            Grade::F
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    /// Lowest score that still lands in this band.
    pub const fn band_floor(self) -> u8 {
        match self {
            Grade::A => GRADE_A_FLOOR,
            Grade::B => GRADE_B_FLOOR,
            Grade::C => GRADE_C_FLOOR,
            Grade::D => GRADE_D_FLOOR,
            Grade::F => 0,
        }
    }
}

/// Quality assessment of a single lead across the six weighted factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub lead_id: LeadId,
    pub completeness: u8,
    pub urgency: u8,
    pub contact_quality: u8,
    pub budget_indicator: u8,
    pub category_demand: u8,
    pub location: u8,
    pub overall_score: u8,
    pub grade: Grade,
    pub calculated_at: DateTime<Utc>,
}

/// Stateless scorer applying the rubric configuration to a lead. Scoring is a
/// pure function of the lead and the fixed configuration; recomputation with
/// identical inputs reproduces the identical record.
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(&self, lead: &Lead, calculated_at: DateTime<Utc>) -> ScoreRecord {
        let subs = factors::sub_scores(lead, &self.config);
        let weights = &self.config.weights;

        let weighted = f32::from(subs.completeness) * weights.completeness
            + f32::from(subs.urgency) * weights.urgency
            + f32::from(subs.contact_quality) * weights.contact_quality
            + f32::from(subs.budget_indicator) * weights.budget_indicator
            + f32::from(subs.category_demand) * weights.category_demand
            + f32::from(subs.location) * weights.location;

        let overall_score = weighted.round().clamp(0.0, 100.0) as u8;

        ScoreRecord {
            lead_id: lead.id.clone(),
            completeness: subs.completeness,
            urgency: subs.urgency,
            contact_quality: subs.contact_quality,
            budget_indicator: subs.budget_indicator,
            category_demand: subs.category_demand,
            location: subs.location,
            overall_score,
            grade: Grade::from_score(overall_score),
            calculated_at,
        }
    }
}
