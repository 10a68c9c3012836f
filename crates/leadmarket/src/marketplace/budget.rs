use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Company, CompanyId};

/// Ledger adjustment kinds. `Set` records the signed delta to the target
/// balance rather than the target itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Credit,
    Debit,
    Set,
}

impl AdjustmentKind {
    pub const fn label(self) -> &'static str {
        match self {
            AdjustmentKind::Credit => "credit",
            AdjustmentKind::Debit => "debit",
            AdjustmentKind::Set => "set",
        }
    }
}

/// Requested balance change. `amount_cents` is the credit/debit magnitude, or
/// the target balance for `Set`. Always non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAdjustment {
    pub kind: AdjustmentKind,
    pub amount_cents: i64,
    pub description: String,
}

impl BudgetAdjustment {
    pub fn credit(amount_cents: i64, description: impl Into<String>) -> Self {
        Self {
            kind: AdjustmentKind::Credit,
            amount_cents,
            description: description.into(),
        }
    }

    pub fn debit(amount_cents: i64, description: impl Into<String>) -> Self {
        Self {
            kind: AdjustmentKind::Debit,
            amount_cents,
            description: description.into(),
        }
    }

    pub fn set(amount_cents: i64, description: impl Into<String>) -> Self {
        Self {
            kind: AdjustmentKind::Set,
            amount_cents,
            description: description.into(),
        }
    }
}

/// Append-only ledger row. `amount_cents` is the signed delta that was
/// applied, so `balance_after = balance_before + amount_cents` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetTransaction {
    pub id: String,
    pub company_id: CompanyId,
    pub kind: AdjustmentKind,
    pub amount_cents: i64,
    pub balance_before_cents: i64,
    pub balance_after_cents: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum BudgetError {
    #[error("debit of {requested_cents} exceeds available balance {available_cents}")]
    InsufficientBudget {
        requested_cents: i64,
        available_cents: i64,
    },
    #[error("no ledger account for company {0}")]
    UnknownCompany(CompanyId),
    #[error("adjustment amount must be non-negative, got {0}")]
    NegativeAmount(i64),
}

#[derive(Debug, Default)]
struct LedgerAccount {
    balance_cents: i64,
    transactions: Vec<BudgetTransaction>,
}

/// Per-company spendable balance backed by an append-only transaction log.
/// Every adjustment is one transaction row plus one balance update inside a
/// single critical section, so no adjustment can be observed half-applied and
/// no two debits can read the same stale balance.
#[derive(Debug, Default)]
pub struct BudgetLedger {
    accounts: Mutex<HashMap<CompanyId, LedgerAccount>>,
}

impl BudgetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty account if one does not exist yet. Idempotent.
    pub fn open_account(&self, company_id: &CompanyId) {
        let mut accounts = self.accounts.lock().expect("ledger mutex poisoned");
        accounts.entry(company_id.clone()).or_default();
    }

    pub fn adjust(
        &self,
        company_id: &CompanyId,
        adjustment: BudgetAdjustment,
        now: DateTime<Utc>,
    ) -> Result<BudgetTransaction, BudgetError> {
        if adjustment.amount_cents < 0 {
            return Err(BudgetError::NegativeAmount(adjustment.amount_cents));
        }

        let mut accounts = self.accounts.lock().expect("ledger mutex poisoned");
        let account = accounts
            .get_mut(company_id)
            .ok_or_else(|| BudgetError::UnknownCompany(company_id.clone()))?;

        let balance_before = account.balance_cents;
        let delta = match adjustment.kind {
            AdjustmentKind::Credit => adjustment.amount_cents,
            AdjustmentKind::Debit => {
                if balance_before - adjustment.amount_cents < 0 {
                    return Err(BudgetError::InsufficientBudget {
                        requested_cents: adjustment.amount_cents,
                        available_cents: balance_before,
                    });
                }
                -adjustment.amount_cents
            }
            AdjustmentKind::Set => adjustment.amount_cents - balance_before,
        };

        let transaction = BudgetTransaction {
            id: format!("txn-{}", uuid::Uuid::new_v4()),
            company_id: company_id.clone(),
            kind: adjustment.kind,
            amount_cents: delta,
            balance_before_cents: balance_before,
            balance_after_cents: balance_before + delta,
            description: adjustment.description,
            created_at: now,
        };

        account.balance_cents = transaction.balance_after_cents;
        account.transactions.push(transaction.clone());
        Ok(transaction)
    }

    pub fn balance(&self, company_id: &CompanyId) -> Result<i64, BudgetError> {
        let accounts = self.accounts.lock().expect("ledger mutex poisoned");
        accounts
            .get(company_id)
            .map(|account| account.balance_cents)
            .ok_or_else(|| BudgetError::UnknownCompany(company_id.clone()))
    }

    pub fn transactions(&self, company_id: &CompanyId) -> Result<Vec<BudgetTransaction>, BudgetError> {
        let accounts = self.accounts.lock().expect("ledger mutex poisoned");
        accounts
            .get(company_id)
            .map(|account| account.transactions.clone())
            .ok_or_else(|| BudgetError::UnknownCompany(company_id.clone()))
    }

    /// Low-budget signal consumed by the alerting collaborator.
    pub fn is_low_budget(&self, company: &Company) -> Result<bool, BudgetError> {
        let balance = self.balance(&company.id)?;
        Ok(balance <= company.low_budget_threshold_cents)
    }
}
