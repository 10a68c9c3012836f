use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Relative weight of each quality factor. Weights sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    pub completeness: f32,
    pub urgency: f32,
    pub contact_quality: f32,
    pub budget_indicator: f32,
    pub category_demand: f32,
    pub location: f32,
}

/// Rubric configuration for the scoring engine. All values are fixed
/// constants at startup so that recomputation stays deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: FactorWeights,
    /// Keywords in the description that signal a time-critical request.
    pub urgency_keywords: Vec<String>,
    /// Historical demand per category, 0-100.
    pub category_demand: BTreeMap<String, u8>,
    pub default_category_demand: u8,
    /// Postcode prefixes with dense buyer coverage.
    pub metro_postcode_prefixes: Vec<String>,
    pub metro_location_score: u8,
    pub standard_location_score: u8,
    pub fallback_location_score: u8,
    /// Budget prior per declared property type, 0-100.
    pub property_budget_priors: BTreeMap<String, u8>,
    pub default_budget_score: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let category_demand = BTreeMap::from([
            ("Strøm".to_string(), 90),
            ("Varmepumpe".to_string(), 80),
            ("Forsikring".to_string(), 70),
            ("Bredbånd".to_string(), 60),
            ("Mobil".to_string(), 50),
        ]);

        let property_budget_priors = BTreeMap::from([
            ("villa".to_string(), 90),
            ("enebolig".to_string(), 90),
            ("tomannsbolig".to_string(), 80),
            ("rekkehus".to_string(), 70),
            ("leilighet".to_string(), 60),
            ("hybel".to_string(), 30),
        ]);

        Self {
            weights: FactorWeights {
                completeness: 0.25,
                urgency: 0.20,
                contact_quality: 0.25,
                budget_indicator: 0.10,
                category_demand: 0.10,
                location: 0.10,
            },
            urgency_keywords: ["haster", "raskt", "snarest", "akutt"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            category_demand,
            default_category_demand: 50,
            metro_postcode_prefixes: vec!["0".to_string()],
            metro_location_score: 90,
            standard_location_score: 60,
            fallback_location_score: 50,
            property_budget_priors,
            default_budget_score: 40,
        }
    }
}
