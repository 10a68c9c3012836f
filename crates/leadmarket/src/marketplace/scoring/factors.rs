use super::super::domain::Lead;
use super::config::ScoringConfig;

pub(crate) struct SubScores {
    pub completeness: u8,
    pub urgency: u8,
    pub contact_quality: u8,
    pub budget_indicator: u8,
    pub category_demand: u8,
    pub location: u8,
}

pub(crate) fn sub_scores(lead: &Lead, config: &ScoringConfig) -> SubScores {
    SubScores {
        completeness: completeness(lead),
        urgency: urgency(lead, config),
        contact_quality: contact_quality(lead),
        budget_indicator: budget_indicator(lead, config),
        category_demand: category_demand(lead, config),
        location: location(lead, config),
    }
}

/// Required contact fields carry 80% of the completeness score, optional
/// enrichment fields the remaining 20%.
fn completeness(lead: &Lead) -> u8 {
    let required = [
        !lead.contact.name.trim().is_empty(),
        !lead.contact.email.trim().is_empty(),
        !lead.contact.phone.trim().is_empty(),
        !lead.postcode.trim().is_empty(),
    ];
    let optional = [
        !lead.description.trim().is_empty(),
        lead.budget_hint_cents.is_some(),
        lead.property_type.is_some(),
    ];

    let required_ratio = count_true(&required) as f32 / required.len() as f32;
    let optional_ratio = count_true(&optional) as f32 / optional.len() as f32;

    ((required_ratio * 80.0) + (optional_ratio * 20.0)).round() as u8
}

fn urgency(lead: &Lead, config: &ScoringConfig) -> u8 {
    let description = lead.description.to_lowercase();
    let keyword_hit = config
        .urgency_keywords
        .iter()
        .any(|keyword| description.contains(keyword.as_str()));

    match (lead.urgent, keyword_hit) {
        (true, true) => 100,
        (true, false) | (false, true) => 90,
        (false, false) => 30,
    }
}

fn contact_quality(lead: &Lead) -> u8 {
    let mut score = 0u8;
    if plausible_email(&lead.contact.email) {
        score += 50;
    }
    if plausible_norwegian_phone(&lead.contact.phone) {
        score += 40;
    }
    if lead.contact.name.trim().split_whitespace().count() >= 2 {
        score += 10;
    }
    score
}

fn budget_indicator(lead: &Lead, config: &ScoringConfig) -> u8 {
    let prior = lead
        .property_type
        .as_deref()
        .map(str::to_lowercase)
        .and_then(|property| config.property_budget_priors.get(&property).copied())
        .unwrap_or(config.default_budget_score);

    match lead.budget_hint_cents {
        Some(amount) if amount > 0 => prior.max(80),
        _ => prior,
    }
}

fn category_demand(lead: &Lead, config: &ScoringConfig) -> u8 {
    config
        .category_demand
        .get(&lead.category)
        .copied()
        .unwrap_or(config.default_category_demand)
}

fn location(lead: &Lead, config: &ScoringConfig) -> u8 {
    let postcode = lead.postcode.trim();
    if postcode.is_empty() || !postcode.chars().all(|c| c.is_ascii_digit()) {
        return config.fallback_location_score;
    }

    if config
        .metro_postcode_prefixes
        .iter()
        .any(|prefix| postcode.starts_with(prefix.as_str()))
    {
        config.metro_location_score
    } else {
        config.standard_location_score
    }
}

fn count_true(flags: &[bool]) -> usize {
    flags.iter().filter(|present| **present).count()
}

pub(crate) fn plausible_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// Eight national digits, with an optional +47 / 0047 country prefix.
pub(crate) fn plausible_norwegian_phone(phone: &str) -> bool {
    let compact: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
    let national = compact
        .strip_prefix("+47")
        .or_else(|| compact.strip_prefix("0047"))
        .unwrap_or(&compact);
    national.len() == 8 && national.chars().all(|c| c.is_ascii_digit())
}
