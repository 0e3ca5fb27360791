//! Loan servicing state model.
//!
//! Holds the account-level state the engine operates on: the installment
//! ledger, the payment history, and the derived installment statuses. All
//! mutation goes through the domain operations (penalty accrual, payment
//! application, batch debits); this module only knows how to represent state
//! and derive statuses from it.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::MicrolendError;
use crate::types::{Currency, Money, PaymentFrequency, Rate};
use crate::MicrolendResult;

// ---------------------------------------------------------------------------
// Installments
// ---------------------------------------------------------------------------

/// Status of a single installment, derived from its balances and the
/// reporting date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentStatus {
    #[default]
    Upcoming,
    /// The earliest unsettled installment that has not yet gone past due.
    Current,
    PartiallyPaid,
    Late,
    Paid,
}

/// One line of a loan's repayment ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Installment {
    /// 1-based sequence number.
    pub number: u32,
    pub due_date: NaiveDate,
    pub capital_due: Money,
    pub interest_due: Money,
    #[serde(default)]
    pub fee_due: Money,
    #[serde(default)]
    pub insurance_due: Money,
    #[serde(default)]
    pub capital_paid: Money,
    #[serde(default)]
    pub interest_paid: Money,
    #[serde(default)]
    pub fee_paid: Money,
    #[serde(default)]
    pub insurance_paid: Money,
    /// Cumulative penalty accrued against this installment.
    #[serde(default)]
    pub penalty_accrued: Money,
    #[serde(default)]
    pub penalty_paid: Money,
    /// Last date for which penalty has been accrued. Accrual never runs the
    /// same day twice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_accrued_through: Option<NaiveDate>,
    #[serde(default)]
    pub status: InstallmentStatus,
}

impl Installment {
    pub fn total_due(&self) -> Money {
        self.capital_due + self.interest_due + self.fee_due + self.insurance_due
    }

    pub fn total_paid(&self) -> Money {
        self.capital_paid + self.interest_paid + self.fee_paid + self.insurance_paid
    }

    pub fn capital_outstanding(&self) -> Money {
        self.capital_due - self.capital_paid
    }

    pub fn interest_outstanding(&self) -> Money {
        self.interest_due - self.interest_paid
    }

    pub fn fee_outstanding(&self) -> Money {
        self.fee_due - self.fee_paid
    }

    pub fn insurance_outstanding(&self) -> Money {
        self.insurance_due - self.insurance_paid
    }

    pub fn penalty_outstanding(&self) -> Money {
        self.penalty_accrued - self.penalty_paid
    }

    /// Scheduled amounts still owed, excluding penalties.
    pub fn outstanding(&self) -> Money {
        self.total_due() - self.total_paid()
    }

    /// Settled means every scheduled bucket and all accrued penalty is paid.
    pub fn is_settled(&self) -> bool {
        self.outstanding() <= Decimal::ZERO && self.penalty_outstanding() <= Decimal::ZERO
    }
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

/// Channel through which a repayment arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentChannel {
    Cash,
    /// Automatic debit of the linked savings account.
    SavingsDebit,
    BankTransfer,
    MobileMoney,
    Other(String),
}

/// How a payment was distributed across balance categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationBreakdown {
    #[serde(default)]
    pub penalty: Money,
    #[serde(default)]
    pub interest: Money,
    #[serde(default)]
    pub insurance: Money,
    #[serde(default)]
    pub fee: Money,
    #[serde(default)]
    pub capital: Money,
    /// Overpayment carried as a credit toward future installments.
    #[serde(default)]
    pub advance: Money,
}

impl AllocationBreakdown {
    /// Amount applied to scheduled balances, excluding the advance carry.
    pub fn allocated_total(&self) -> Money {
        self.penalty + self.interest + self.insurance + self.fee + self.capital
    }

    pub fn total(&self) -> Money {
        self.allocated_total() + self.advance
    }

    pub fn negated(&self) -> AllocationBreakdown {
        AllocationBreakdown {
            penalty: -self.penalty,
            interest: -self.interest,
            insurance: -self.insurance,
            fee: -self.fee,
            capital: -self.capital,
            advance: -self.advance,
        }
    }
}

/// A posted repayment. Records are append-only: a mistaken payment is
/// reversed by a contra record, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub date: NaiveDate,
    pub channel: PaymentChannel,
    pub amount: Money,
    pub breakdown: AllocationBreakdown,
    #[serde(default)]
    pub reversed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversal_of: Option<String>,
}

// ---------------------------------------------------------------------------
// Loan account
// ---------------------------------------------------------------------------

/// A disbursed loan with its installment ledger and payment history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub currency: Currency,
    pub principal: Money,
    pub annual_rate: Rate,
    #[serde(default)]
    pub frequency: PaymentFrequency,
    pub disbursement_date: NaiveDate,
    /// Savings account debited by the automatic collection run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings_account_id: Option<String>,
    pub installments: Vec<Installment>,
    /// Prepayment credit not yet applied to a scheduled installment.
    #[serde(default)]
    pub advance_balance: Money,
    #[serde(default)]
    pub payments: Vec<PaymentRecord>,
}

impl LoanAccount {
    pub fn outstanding_capital(&self) -> Money {
        self.installments.iter().map(|i| i.capital_outstanding()).sum()
    }

    pub fn penalty_outstanding(&self) -> Money {
        self.installments.iter().map(|i| i.penalty_outstanding()).sum()
    }

    pub fn penalty_accrued_total(&self) -> Money {
        self.installments.iter().map(|i| i.penalty_accrued).sum()
    }

    /// Unsettled installments due on or before `as_of`, oldest first.
    pub fn due_installments(&self, as_of: NaiveDate) -> Vec<u32> {
        self.installments
            .iter()
            .filter(|i| i.due_date <= as_of && !i.is_settled())
            .map(|i| i.number)
            .collect()
    }

    /// Re-derive every installment status from balances and the reporting
    /// date. The earliest unsettled installment that is not past due becomes
    /// Current.
    pub fn refresh_statuses(&mut self, as_of: NaiveDate) {
        let mut current_assigned = false;
        for inst in self.installments.iter_mut() {
            if inst.is_settled() {
                inst.status = InstallmentStatus::Paid;
            } else if inst.due_date < as_of {
                inst.status = InstallmentStatus::Late;
            } else if inst.total_paid() > Decimal::ZERO {
                inst.status = InstallmentStatus::PartiallyPaid;
                current_assigned = true;
            } else if !current_assigned {
                inst.status = InstallmentStatus::Current;
                current_assigned = true;
            } else {
                inst.status = InstallmentStatus::Upcoming;
            }
        }
    }

    pub fn payment(&self, payment_id: &str) -> Option<&PaymentRecord> {
        self.payments.iter().find(|p| p.id == payment_id)
    }

    /// Deterministic id for the next payment record on this account.
    pub fn next_payment_id(&self) -> String {
        format!("PMT-{}-{:04}", self.id, self.payments.len() + 1)
    }

    /// Structural invariants: installment capital sums to principal and no
    /// bucket is overpaid.
    pub fn validate(&self) -> MicrolendResult<()> {
        if self.principal <= Decimal::ZERO {
            return Err(MicrolendError::InvalidInput {
                field: "principal".into(),
                reason: "Principal must be positive.".into(),
            });
        }
        if self.installments.is_empty() {
            return Err(MicrolendError::InvalidInput {
                field: "installments".into(),
                reason: "Loan has no installment ledger.".into(),
            });
        }
        let capital_total: Money = self.installments.iter().map(|i| i.capital_due).sum();
        if capital_total != self.principal {
            return Err(MicrolendError::FinancialImpossibility(format!(
                "Installment capital ({}) does not sum to principal ({})",
                capital_total, self.principal
            )));
        }
        for inst in &self.installments {
            if inst.capital_outstanding() < Decimal::ZERO
                || inst.interest_outstanding() < Decimal::ZERO
                || inst.fee_outstanding() < Decimal::ZERO
                || inst.insurance_outstanding() < Decimal::ZERO
                || inst.penalty_outstanding() < Decimal::ZERO
            {
                return Err(MicrolendError::FinancialImpossibility(format!(
                    "Installment {} has a negative outstanding balance",
                    inst.number
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
