use chrono::Duration;

use super::common::*;
use crate::marketplace::access::{mask_email, mask_name, mask_phone, AccessGate, AccessTier};
use crate::marketplace::distribution::DistributionMode;
use crate::marketplace::domain::{lead_from_submission, CompanyId};
use crate::marketplace::service::MarketplaceError;

#[test]
fn email_masking_keeps_prefix_and_tld_only() {
    assert_eq!(mask_email("kari.nordmann@example.no"), "ka***@***.no");
    assert_eq!(mask_email("po@firma.co.uk"), "po***@***.uk");
    assert_eq!(mask_email("x@nodomain"), "x***@***");
    assert_eq!(mask_email("not-an-email"), "***");
}

#[test]
fn phone_masking_keeps_country_code_and_last_two_digits() {
    assert_eq!(mask_phone("+47 912 34 567"), "+47 ******67");
    assert_eq!(mask_phone("91234567"), "******67");
    assert_eq!(mask_phone("9"), "****");
}

#[test]
fn name_masking_keeps_first_name_and_surname_initial() {
    assert_eq!(mask_name("Kari Nordmann"), "Kari N.");
    assert_eq!(mask_name("Ola Johan Hansen"), "Ola H.");
    assert_eq!(mask_name("Kari"), "Kari");
    assert_eq!(mask_name("  "), "");
}

#[test]
fn viewers_without_a_relationship_are_denied() {
    let (service, _, _, _, _) = build_service();
    seed_company(&service, "c1", &["Strøm"], 50_000, Some(5_000));
    let stranger = seed_company(&service, "c9", &["Strøm"], 50_000, Some(5_000));
    let lead = submitted_lead(&service, strong_submission());

    service
        .assign_lead(&lead.id, DistributionMode::Direct, now())
        .expect("assignment succeeds");

    // c1 won the rotation; c9 has no relationship and gets nothing.
    match service.get_contact_info(&lead.id, &stranger) {
        Err(MarketplaceError::Access(err)) => {
            assert!(!err.to_string().contains("kari.nordmann"));
        }
        other => panic!("expected access denial, got {other:?}"),
    }
}

#[test]
fn assigned_viewer_sees_masked_fields_until_won() {
    let (service, _, _, _, _) = build_service();
    let company_id = seed_company(&service, "c1", &["Strøm"], 50_000, Some(5_000));
    let lead = submitted_lead(&service, strong_submission());

    service
        .assign_lead(&lead.id, DistributionMode::Direct, now())
        .expect("assignment succeeds");

    let basic = service
        .get_contact_info(&lead.id, &company_id)
        .expect("basic access");
    assert_eq!(basic.tier, AccessTier::Basic);
    assert_eq!(basic.name, "Kari N.");
    assert_eq!(basic.email, "ka***@***.no");
    assert_eq!(basic.phone, "+47 ******67");

    service
        .mark_contacted(&lead.id, now() + Duration::minutes(5))
        .expect("contact transition");
    service
        .mark_won(&lead.id, now() + Duration::hours(1))
        .expect("won transition");

    let full = service
        .get_contact_info(&lead.id, &company_id)
        .expect("full access");
    assert_eq!(full.tier, AccessTier::Full);
    assert_eq!(full.email, "kari.nordmann@example.no");
    assert_eq!(full.phone, "+47 912 34 567");
    assert_eq!(full.name, "Kari Nordmann");
}

#[test]
fn grants_never_downgrade() {
    let gate = AccessGate::new();
    let lead = lead_from_submission(strong_submission(), now()).expect("valid lead");
    let viewer = CompanyId("c1".to_string());

    gate.record(&lead.id, &viewer, AccessTier::Full);
    // A later, lower derivation does not pull the grant back down.
    let view = gate
        .contact_view(&lead, &viewer, AccessTier::Basic)
        .expect("view resolves");
    assert_eq!(view.tier, AccessTier::Full);
    assert_eq!(view.email, "kari.nordmann@example.no");
    assert_eq!(gate.recorded_tier(&lead.id, &viewer), AccessTier::Full);
}

#[test]
fn unknown_lead_fails_closed() {
    let (service, _, _, _, _) = build_service();
    let viewer = seed_company(&service, "c1", &["Strøm"], 50_000, Some(5_000));

    assert!(matches!(
        service.get_contact_info(&crate::marketplace::domain::LeadId("lead-missing".into()), &viewer),
        Err(MarketplaceError::UnknownLead(_))
    ));
}
