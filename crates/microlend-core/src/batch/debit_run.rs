//! Automatic debit of linked savings accounts.
//!
//! For a processing date, every loan position with installments due and
//! unpaid is debited from its linked savings balance: one waterfall per loan
//! over its aggregate due buckets, debiting `min(savings, total due)`. A loan
//! stops absorbing funds the moment its savings balance is exhausted and the
//! shortfall is recorded in the manifest. Preview mode computes the full
//! manifest without touching any position.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::allocation::apply::{due_balances, post_payment, PostPaymentInput};
use crate::allocation::waterfall::OverpaymentPolicy;
use crate::batch::run_ledger::format_batch_id;
use crate::error::MicrolendError;
use crate::loan::{AllocationBreakdown, LoanAccount, PaymentChannel};
use crate::penalty::accrual::{accrue_penalties, PenaltyConfig};
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::MicrolendResult;

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

/// A loan and the savings balance available to debit against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebitPosition {
    pub loan: LoanAccount,
    pub savings_balance: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDebitInput {
    pub processing_date: NaiveDate,
    /// Attempt number from the run ledger; feeds the batch id.
    #[serde(default = "default_attempt")]
    pub attempt: u32,
    /// Accrue penalties through the processing date before debiting.
    #[serde(default = "default_true")]
    pub accrue_penalties: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_config: Option<PenaltyConfig>,
    /// When false, compute the manifest without mutating any position.
    #[serde(default)]
    pub execute: bool,
}

fn default_attempt() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanDebitStatus {
    /// Everything due was collected.
    Success,
    /// Savings covered part of the amount due.
    Partial,
    /// Savings balance was empty.
    InsufficientBalance,
    /// Nothing due, or no linked savings account.
    Skipped,
    /// The engine refused the loan (validation or posting error).
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanDebitResult {
    pub loan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings_account_id: Option<String>,
    pub savings_before: Money,
    pub debited: Money,
    pub savings_after: Money,
    pub breakdown: AllocationBreakdown,
    pub remaining_due: Money,
    pub status: LoanDebitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDebitOutput {
    pub batch_id: String,
    pub processing_date: NaiveDate,
    pub executed: bool,
    pub results: Vec<LoanDebitResult>,
    pub loans_processed: usize,
    pub success_count: usize,
    pub partial_count: usize,
    pub insufficient_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub total_debited: Money,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the automatic debit batch over the given positions. In execute mode
/// the positions are mutated in place; in preview mode they are left intact
/// and the manifest reports what an execution would do.
pub fn run_batch_debits(
    input: &BatchDebitInput,
    positions: &mut [DebitPosition],
) -> MicrolendResult<ComputationOutput<BatchDebitOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.accrue_penalties && input.penalty_config.is_none() {
        return Err(MicrolendError::InsufficientData(
            "Penalty accrual requested but no penalty configuration provided.".into(),
        ));
    }
    if input.attempt == 0 {
        return Err(MicrolendError::InvalidInput {
            field: "attempt".into(),
            reason: "Attempt numbering starts at 1.".into(),
        });
    }

    let batch_id = format_batch_id(input.processing_date, input.attempt);
    let mut results: Vec<LoanDebitResult> = Vec::with_capacity(positions.len());

    for position in positions.iter_mut() {
        let result = if input.execute {
            debit_one(position, input)
        } else {
            // Preview: work on a scratch copy, report, discard.
            let mut scratch = position.clone();
            debit_one(&mut scratch, input)
        };
        if result.status == LoanDebitStatus::Failed {
            warnings.push(format!(
                "Loan {} failed: {}",
                result.loan_id,
                result.reason.as_deref().unwrap_or("unknown")
            ));
        }
        results.push(result);
    }

    let count = |s: LoanDebitStatus| results.iter().filter(|r| r.status == s).count();
    let output = BatchDebitOutput {
        batch_id,
        processing_date: input.processing_date,
        executed: input.execute,
        loans_processed: results.len(),
        success_count: count(LoanDebitStatus::Success),
        partial_count: count(LoanDebitStatus::Partial),
        insufficient_count: count(LoanDebitStatus::InsufficientBalance),
        skipped_count: count(LoanDebitStatus::Skipped),
        failed_count: count(LoanDebitStatus::Failed),
        total_debited: results.iter().map(|r| r.debited).sum(),
        results,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "accrue_penalties": input.accrue_penalties,
        "attempt": input.attempt,
        "positions": positions.len(),
    });

    Ok(with_metadata(
        "Batch Savings Debit Run",
        &assumptions,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn debit_one(position: &mut DebitPosition, input: &BatchDebitInput) -> LoanDebitResult {
    let savings_before = position.savings_balance;
    let loan_id = position.loan.id.clone();
    let savings_account_id = position.loan.savings_account_id.clone();

    let skip = |reason: &str, status: LoanDebitStatus| LoanDebitResult {
        loan_id: loan_id.clone(),
        savings_account_id: savings_account_id.clone(),
        savings_before,
        debited: Decimal::ZERO,
        savings_after: savings_before,
        breakdown: AllocationBreakdown::default(),
        remaining_due: Decimal::ZERO,
        status,
        reason: Some(reason.to_string()),
    };

    if savings_account_id.is_none() {
        return skip("no linked savings account", LoanDebitStatus::Skipped);
    }
    if let Err(e) = position.loan.validate() {
        return skip(&e.to_string(), LoanDebitStatus::Failed);
    }

    position.loan.refresh_statuses(input.processing_date);

    if input.accrue_penalties {
        // Config presence was checked up front.
        let config = input.penalty_config.as_ref().unwrap();
        if let Err(e) = accrue_penalties(&mut position.loan, config, input.processing_date) {
            return skip(&e.to_string(), LoanDebitStatus::Failed);
        }
    }

    let balances = due_balances(&position.loan, input.processing_date);
    let total_due = balances.total();
    if total_due.is_zero() {
        return skip("nothing due", LoanDebitStatus::Skipped);
    }
    if position.savings_balance <= Decimal::ZERO {
        let mut r = skip("savings balance exhausted", LoanDebitStatus::InsufficientBalance);
        r.remaining_due = total_due;
        return r;
    }

    let debit = position.savings_balance.min(total_due);
    let post = PostPaymentInput {
        amount: debit,
        value_date: input.processing_date,
        channel: PaymentChannel::SavingsDebit,
        // debit never exceeds total due, so overpayment cannot occur
        policy: OverpaymentPolicy::Reject,
    };

    match post_payment(&mut position.loan, &post) {
        Ok(envelope) => {
            position.savings_balance -= debit;
            let remaining_due = total_due - debit;
            LoanDebitResult {
                loan_id,
                savings_account_id,
                savings_before,
                debited: debit,
                savings_after: position.savings_balance,
                breakdown: envelope.result.breakdown,
                remaining_due,
                status: if remaining_due.is_zero() {
                    LoanDebitStatus::Success
                } else {
                    LoanDebitStatus::Partial
                },
                reason: None,
            }
        }
        Err(e) => skip(&e.to_string(), LoanDebitStatus::Failed),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
