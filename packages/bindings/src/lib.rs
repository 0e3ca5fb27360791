use napi::Result as NapiResult;
use napi_derive::napi;
use serde::{Deserialize, Serialize};

use microlend_core::loan::LoanAccount;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Amortization
// ---------------------------------------------------------------------------

#[napi]
pub fn build_amortization_schedule(input_json: String) -> NapiResult<String> {
    let input: microlend_core::amortization::schedule::ScheduleInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = microlend_core::amortization::schedule::build_schedule(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn loan_effective_rate(input_json: String) -> NapiResult<String> {
    let input: microlend_core::amortization::effective_rate::EffectiveRateInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = microlend_core::amortization::effective_rate::effective_rate(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Penalty accrual
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AccrualBindingInput {
    loan: LoanAccount,
    config: microlend_core::penalty::accrual::PenaltyConfig,
    as_of: chrono::NaiveDate,
}

/// Mutating operations return the updated loan state alongside the report.
#[derive(Serialize)]
struct WithLoan<T: Serialize> {
    #[serde(flatten)]
    output: T,
    loan: LoanAccount,
}

#[napi]
pub fn accrue_loan_penalties(input_json: String) -> NapiResult<String> {
    let mut binding_input: AccrualBindingInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = microlend_core::penalty::accrual::accrue_penalties(
        &mut binding_input.loan,
        &binding_input.config,
        binding_input.as_of,
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&WithLoan {
        output,
        loan: binding_input.loan,
    })
    .map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

#[napi]
pub fn allocate_loan_payment(input_json: String) -> NapiResult<String> {
    let input: microlend_core::allocation::waterfall::AllocationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = microlend_core::allocation::waterfall::allocate_payment(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[derive(Deserialize)]
struct PostPaymentBindingInput {
    loan: LoanAccount,
    #[serde(flatten)]
    payment: microlend_core::allocation::apply::PostPaymentInput,
}

#[napi]
pub fn post_loan_payment(input_json: String) -> NapiResult<String> {
    let mut binding_input: PostPaymentBindingInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = microlend_core::allocation::apply::post_payment(
        &mut binding_input.loan,
        &binding_input.payment,
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&WithLoan {
        output,
        loan: binding_input.loan,
    })
    .map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Batch debits
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct BatchBindingInput {
    #[serde(flatten)]
    run: microlend_core::batch::debit_run::BatchDebitInput,
    positions: Vec<microlend_core::batch::debit_run::DebitPosition>,
}

#[derive(Serialize)]
struct BatchBindingOutput<T: Serialize> {
    #[serde(flatten)]
    output: T,
    positions: Vec<microlend_core::batch::debit_run::DebitPosition>,
}

#[napi]
pub fn run_automatic_debits(input_json: String) -> NapiResult<String> {
    let mut binding_input: BatchBindingInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = microlend_core::batch::debit_run::run_batch_debits(
        &binding_input.run,
        &mut binding_input.positions,
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&BatchBindingOutput {
        output,
        positions: binding_input.positions,
    })
    .map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

#[napi]
pub fn assess_dti(input_json: String) -> NapiResult<String> {
    let input: microlend_core::risk::dti::DtiInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = microlend_core::risk::dti::assess_dti(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Accounting
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct JournalBindingInput {
    loan: LoanAccount,
    payment_id: String,
}

#[napi]
pub fn payment_journal_entries(input_json: String) -> NapiResult<String> {
    let binding_input: JournalBindingInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let payment = binding_input
        .loan
        .payment(&binding_input.payment_id)
        .ok_or_else(|| {
            to_napi_error(format!(
                "No payment {} on loan {}",
                binding_input.payment_id, binding_input.loan.id
            ))
        })?;

    // Contra records map to the reversal entry of their original payment.
    let output = match &payment.reversal_of {
        Some(original_id) => {
            let original = binding_input.loan.payment(original_id).ok_or_else(|| {
                to_napi_error(format!(
                    "Contra record {} references missing payment {original_id}",
                    payment.id
                ))
            })?;
            microlend_core::accounting::entries::reversal_entries(original, &binding_input.loan)
                .map_err(to_napi_error)?
        }
        None => microlend_core::accounting::entries::payment_entries(payment, &binding_input.loan)
            .map_err(to_napi_error)?,
    };
    serde_json::to_string(&output).map_err(to_napi_error)
}
