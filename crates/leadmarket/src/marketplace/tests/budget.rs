use std::sync::Arc;
use std::thread;

use super::common::*;
use crate::marketplace::budget::{
    AdjustmentKind, BudgetAdjustment, BudgetError, BudgetLedger,
};
use crate::marketplace::domain::CompanyId;

fn ledger_with_account(balance_cents: i64) -> (BudgetLedger, CompanyId) {
    let ledger = BudgetLedger::new();
    let company_id = CompanyId("c-ledger".to_string());
    ledger.open_account(&company_id);
    if balance_cents > 0 {
        ledger
            .adjust(
                &company_id,
                BudgetAdjustment::credit(balance_cents, "opening balance"),
                now(),
            )
            .expect("opening credit applies");
    }
    (ledger, company_id)
}

#[test]
fn credit_and_debit_move_the_balance_by_signed_amounts() {
    let (ledger, company_id) = ledger_with_account(0);

    let credit = ledger
        .adjust(&company_id, BudgetAdjustment::credit(1_000, "topup"), now())
        .expect("credit applies");
    assert_eq!(credit.kind, AdjustmentKind::Credit);
    assert_eq!(credit.balance_before_cents, 0);
    assert_eq!(credit.amount_cents, 1_000);
    assert_eq!(credit.balance_after_cents, 1_000);

    let debit = ledger
        .adjust(&company_id, BudgetAdjustment::debit(400, "lead"), now())
        .expect("debit applies");
    assert_eq!(debit.amount_cents, -400);
    assert_eq!(debit.balance_before_cents, 1_000);
    assert_eq!(debit.balance_after_cents, 600);
    assert_eq!(ledger.balance(&company_id).expect("balance"), 600);
}

#[test]
fn set_records_the_delta_to_the_target() {
    let (ledger, company_id) = ledger_with_account(900);

    let lowered = ledger
        .adjust(&company_id, BudgetAdjustment::set(500, "correction"), now())
        .expect("set applies");
    assert_eq!(lowered.amount_cents, -400);
    assert_eq!(lowered.balance_after_cents, 500);

    let raised = ledger
        .adjust(&company_id, BudgetAdjustment::set(800, "correction"), now())
        .expect("set applies");
    assert_eq!(raised.amount_cents, 300);
    assert_eq!(ledger.balance(&company_id).expect("balance"), 800);
}

#[test]
fn overdraft_is_rejected_without_partial_writes() {
    let (ledger, company_id) = ledger_with_account(300);
    let rows_before = ledger.transactions(&company_id).expect("rows").len();

    match ledger.adjust(&company_id, BudgetAdjustment::debit(500, "lead"), now()) {
        Err(BudgetError::InsufficientBudget {
            requested_cents,
            available_cents,
        }) => {
            assert_eq!(requested_cents, 500);
            assert_eq!(available_cents, 300);
        }
        other => panic!("expected insufficient budget, got {other:?}"),
    }

    assert_eq!(ledger.balance(&company_id).expect("balance"), 300);
    assert_eq!(
        ledger.transactions(&company_id).expect("rows").len(),
        rows_before
    );
}

#[test]
fn transaction_log_sums_to_the_net_balance_change() {
    let (ledger, company_id) = ledger_with_account(0);
    ledger
        .adjust(&company_id, BudgetAdjustment::credit(2_000, "topup"), now())
        .expect("credit");
    ledger
        .adjust(&company_id, BudgetAdjustment::debit(450, "lead"), now())
        .expect("debit");
    ledger
        .adjust(&company_id, BudgetAdjustment::set(1_200, "correction"), now())
        .expect("set");

    let transactions = ledger.transactions(&company_id).expect("rows");
    let signed_sum: i64 = transactions.iter().map(|t| t.amount_cents).sum();
    assert_eq!(signed_sum, ledger.balance(&company_id).expect("balance"));

    for transaction in &transactions {
        assert_eq!(
            transaction.balance_after_cents,
            transaction.balance_before_cents + transaction.amount_cents
        );
    }
}

#[test]
fn unknown_company_and_negative_amounts_are_rejected() {
    let ledger = BudgetLedger::new();
    let ghost = CompanyId("c-ghost".to_string());
    assert!(matches!(
        ledger.adjust(&ghost, BudgetAdjustment::credit(100, "topup"), now()),
        Err(BudgetError::UnknownCompany(_))
    ));

    let (ledger, company_id) = ledger_with_account(100);
    assert!(matches!(
        ledger.adjust(&company_id, BudgetAdjustment::credit(-5, "bad"), now()),
        Err(BudgetError::NegativeAmount(-5))
    ));
}

#[test]
fn low_budget_flag_respects_the_company_threshold() {
    let (ledger, company_id) = ledger_with_account(10_000);
    let mut company = company("c-ledger", &["Strøm"]);
    company.id = company_id.clone();
    company.low_budget_threshold_cents = 5_000;

    assert!(!ledger.is_low_budget(&company).expect("check"));
    ledger
        .adjust(&company_id, BudgetAdjustment::debit(6_000, "lead"), now())
        .expect("debit");
    assert!(ledger.is_low_budget(&company).expect("check"));
}

#[test]
fn concurrent_debits_never_oversell_the_balance() {
    let (ledger, company_id) = ledger_with_account(1_000);
    let ledger = Arc::new(ledger);

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let ledger = ledger.clone();
            let company_id = company_id.clone();
            thread::spawn(move || {
                ledger
                    .adjust(&company_id, BudgetAdjustment::debit(200, "race"), now())
                    .is_ok()
            })
        })
        .collect();

    let successes = handles
        .into_iter()
        .filter(|handle| handle.join().expect("thread joins"))
        .count();

    assert_eq!(successes, 5);
    assert_eq!(ledger.balance(&company_id).expect("balance"), 0);
}
