//! Contact disclosure gating. Tiers are derived from the viewer's assignment
//! relationship, recorded monotonically, and masking happens here at the data
//! boundary so raw contact fields never reach an unauthorized payload.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::domain::{CompanyId, Lead, LeadId};

/// Disclosure level for a (lead, viewer) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    None,
    Basic,
    Full,
}

impl AccessTier {
    pub const fn label(self) -> &'static str {
        match self {
            AccessTier::None => "none",
            AccessTier::Basic => "basic",
            AccessTier::Full => "full",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("viewer {viewer} has no access to contact details for lead {lead}")]
    Denied { lead: LeadId, viewer: CompanyId },
}

/// Contact payload produced for an authorized viewer. Fields are already
/// masked when the tier is basic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactView {
    pub lead_id: LeadId,
    pub tier: AccessTier,
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Grant store enforcing monotonic escalation: a recorded tier only ever
/// moves upward, and grants are never deleted.
#[derive(Debug, Default)]
pub struct AccessGate {
    grants: Mutex<HashMap<(LeadId, CompanyId), AccessTier>>,
}

impl AccessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a derived tier, keeping the highest level seen so far.
    pub fn record(&self, lead_id: &LeadId, viewer: &CompanyId, tier: AccessTier) -> AccessTier {
        let mut grants = self.grants.lock().expect("grant mutex poisoned");
        let entry = grants
            .entry((lead_id.clone(), viewer.clone()))
            .or_insert(AccessTier::None);
        if tier > *entry {
            *entry = tier;
        }
        *entry
    }

    pub fn recorded_tier(&self, lead_id: &LeadId, viewer: &CompanyId) -> AccessTier {
        let grants = self.grants.lock().expect("grant mutex poisoned");
        grants
            .get(&(lead_id.clone(), viewer.clone()))
            .copied()
            .unwrap_or(AccessTier::None)
    }

    /// Build the disclosure payload for a viewer at an already-derived tier.
    /// Viewers without access get an error and no contact fields at all.
    pub fn contact_view(
        &self,
        lead: &Lead,
        viewer: &CompanyId,
        derived: AccessTier,
    ) -> Result<ContactView, AccessError> {
        let effective = self.record(&lead.id, viewer, derived);

        match effective {
            AccessTier::None => Err(AccessError::Denied {
                lead: lead.id.clone(),
                viewer: viewer.clone(),
            }),
            AccessTier::Basic => Ok(ContactView {
                lead_id: lead.id.clone(),
                tier: AccessTier::Basic,
                name: mask_name(&lead.contact.name),
                email: mask_email(&lead.contact.email),
                phone: mask_phone(&lead.contact.phone),
            }),
            AccessTier::Full => Ok(ContactView {
                lead_id: lead.id.clone(),
                tier: AccessTier::Full,
                name: lead.contact.name.clone(),
                email: lead.contact.email.clone(),
                phone: lead.contact.phone.clone(),
            }),
        }
    }

}

/// First two characters of the local part, masked remainder, TLD only.
pub(crate) fn mask_email(email: &str) -> String {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return "***".to_string();
    };

    let prefix: String = local.chars().take(2).collect();
    match domain.rsplit_once('.') {
        Some((_, tld)) if !tld.is_empty() => format!("{prefix}***@***.{tld}"),
        _ => format!("{prefix}***@***"),
    }
}

/// Country code plus the last two digits; everything else is masked.
pub(crate) fn mask_phone(phone: &str) -> String {
    let compact: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
    let (country_code, national) = match compact.strip_prefix("+47") {
        Some(rest) => ("+47", rest),
        None => ("", compact.as_str()),
    };

    let digits: Vec<char> = national.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 2 {
        return "****".to_string();
    }

    let last_two: String = digits[digits.len() - 2..].iter().collect();
    if country_code.is_empty() {
        format!("******{last_two}")
    } else {
        format!("{country_code} ******{last_two}")
    }
}

/// First name plus the initial of the last name.
pub(crate) fn mask_name(name: &str) -> String {
    let mut words = name.split_whitespace();
    let Some(first) = words.next() else {
        return String::new();
    };

    match words.last() {
        Some(surname) => {
            let initial: String = surname.chars().take(1).collect();
            format!("{first} {initial}.")
        }
        None => first.to_string(),
    }
}
