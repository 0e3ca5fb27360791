//! Amortization schedule generation.
//!
//! Builds the repayment ledger for a loan from its terms:
//! 1. **Declining balance** -- constant-payment annuity, interest on the
//!    outstanding balance.
//! 2. **Straight line** -- constant capital portion, interest on the
//!    outstanding balance.
//! 3. **Flat** -- interest charged on the original principal every period.
//! 4. **Interest only** -- bullet capital at maturity.
//!
//! Per-line amounts are rounded to the currency scale; the final installment
//! absorbs rounding so capital sums exactly to principal and distributed
//! fees/insurance sum exactly to their totals.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::MicrolendError;
use crate::loan::Installment;
use crate::types::{
    round_money, with_metadata, ComputationOutput, Currency, Money, PaymentFrequency, Rate,
};
use crate::MicrolendResult;

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

/// Repayment profile of the schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmortizationMethod {
    /// Constant-payment annuity; interest on outstanding balance.
    #[default]
    DecliningBalance,
    /// Constant capital portion; interest on outstanding balance.
    StraightLine,
    /// Interest on original principal every period.
    Flat,
    /// No capital until the final installment.
    InterestOnly,
}

/// Terms from which the installment ledger is generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan_id: Option<String>,
    pub principal: Money,
    /// Nominal annual rate (0.12 = 12%).
    pub annual_rate: Rate,
    pub installments: u32,
    #[serde(default)]
    pub frequency: PaymentFrequency,
    pub disbursement_date: NaiveDate,
    /// Defaults to one period after disbursement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_due_date: Option<NaiveDate>,
    /// Leading installments that collect interest only.
    #[serde(default)]
    pub grace_periods: u32,
    pub method: AmortizationMethod,
    /// Total file/processing fees, spread evenly across installments.
    #[serde(default)]
    pub fee_total: Money,
    /// Total credit-insurance premium, spread evenly across installments.
    #[serde(default)]
    pub insurance_total: Money,
    #[serde(default)]
    pub currency: Currency,
}

/// One generated installment line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleLine {
    pub number: u32,
    pub due_date: NaiveDate,
    pub capital: Money,
    pub interest: Money,
    pub fee: Money,
    pub insurance: Money,
    pub total: Money,
    pub balance_after: Money,
}

/// Generated schedule with totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_id: Option<String>,
    pub currency: Currency,
    pub lines: Vec<ScheduleLine>,
    /// Constant payment for methods that have one (annuity outside grace).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub periodic_payment: Option<Money>,
    pub total_interest: Money,
    pub total_fees: Money,
    pub total_insurance: Money,
    /// Capital + interest + fees + insurance over the life of the loan.
    pub total_payable: Money,
}

impl ScheduleOutput {
    /// Convert the generated lines into a servicing installment ledger.
    pub fn into_installments(self) -> Vec<Installment> {
        self.lines
            .into_iter()
            .map(|line| Installment {
                number: line.number,
                due_date: line.due_date,
                capital_due: line.capital,
                interest_due: line.interest,
                fee_due: line.fee,
                insurance_due: line.insurance,
                ..Default::default()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Generate the full installment schedule for the given terms.
pub fn build_schedule(input: &ScheduleInput) -> MicrolendResult<ComputationOutput<ScheduleOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;

    let scale = input.currency.scale();
    let n = input.installments;
    let grace = input.grace_periods;
    let amortizing = n - grace;
    let period_rate = input.frequency.period_rate(input.annual_rate);

    let first_due = match input.first_due_date {
        Some(d) => d,
        None => input
            .frequency
            .nth_due_date(input.disbursement_date, 1)
            .ok_or_else(|| {
                MicrolendError::DateError(format!(
                    "Cannot roll {} one period forward",
                    input.disbursement_date
                ))
            })?,
    };
    if first_due <= input.disbursement_date {
        warnings.push(format!(
            "First due date {} is not after disbursement {}",
            first_due, input.disbursement_date
        ));
    }

    // Constant payment for the amortizing stretch, where the method has one.
    let annuity_payment = match input.method {
        AmortizationMethod::DecliningBalance => {
            if period_rate.is_zero() {
                Some(input.principal / Decimal::from(amortizing))
            } else {
                let one_plus = Decimal::ONE + period_rate;
                let pow = one_plus.powd(Decimal::from(amortizing));
                let denom = pow - Decimal::ONE;
                if denom.is_zero() {
                    return Err(MicrolendError::DivisionByZero {
                        context: "annuity payment factor".into(),
                    });
                }
                Some(input.principal * period_rate * pow / denom)
            }
        }
        _ => None,
    };
    let periodic_payment = annuity_payment.map(|p| round_money(p, scale));

    // Even fee/insurance spread, last installment absorbs rounding.
    let fee_per = round_money(input.fee_total / Decimal::from(n), scale);
    let insurance_per = round_money(input.insurance_total / Decimal::from(n), scale);

    let mut lines: Vec<ScheduleLine> = Vec::with_capacity(n as usize);
    let mut balance = input.principal;

    for k in 1..=n {
        let due_date = input
            .frequency
            .nth_due_date(first_due, k - 1)
            .ok_or_else(|| {
                MicrolendError::DateError(format!("Cannot compute due date for installment {k}"))
            })?;

        let interest = match input.method {
            AmortizationMethod::Flat => round_money(input.principal * period_rate, scale),
            _ => round_money(balance * period_rate, scale),
        };

        let is_last = k == n;
        let capital = if k <= grace {
            Decimal::ZERO
        } else if is_last {
            // Absorb rounding: whatever is left of the principal.
            balance
        } else {
            match input.method {
                AmortizationMethod::DecliningBalance => {
                    let payment = periodic_payment.unwrap_or(Decimal::ZERO);
                    (payment - interest).min(balance).max(Decimal::ZERO)
                }
                AmortizationMethod::StraightLine | AmortizationMethod::Flat => {
                    round_money(input.principal / Decimal::from(amortizing), scale)
                }
                AmortizationMethod::InterestOnly => Decimal::ZERO,
            }
        };

        let fee = if is_last {
            input.fee_total - fee_per * Decimal::from(n - 1)
        } else {
            fee_per
        };
        let insurance = if is_last {
            input.insurance_total - insurance_per * Decimal::from(n - 1)
        } else {
            insurance_per
        };

        balance -= capital;
        lines.push(ScheduleLine {
            number: k,
            due_date,
            capital,
            interest,
            fee,
            insurance,
            total: capital + interest + fee + insurance,
            balance_after: balance,
        });
    }

    let capital_total: Money = lines.iter().map(|l| l.capital).sum();
    if capital_total != input.principal {
        return Err(MicrolendError::FinancialImpossibility(format!(
            "Generated capital ({}) does not sum to principal ({})",
            capital_total, input.principal
        )));
    }

    let total_interest: Money = lines.iter().map(|l| l.interest).sum();
    let total_payable: Money = lines.iter().map(|l| l.total).sum();

    let output = ScheduleOutput {
        loan_id: input.loan_id.clone(),
        currency: input.currency.clone(),
        lines,
        periodic_payment,
        total_interest,
        total_fees: input.fee_total,
        total_insurance: input.insurance_total,
        total_payable,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "method": format!("{:?}", input.method),
        "period_rate": period_rate.to_string(),
        "grace_periods": grace,
        "rounding_scale": scale,
        "first_due_date": first_due.to_string(),
    });

    Ok(with_metadata(
        "Amortization Schedule Generation",
        &assumptions,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_input(input: &ScheduleInput) -> MicrolendResult<()> {
    if input.principal <= Decimal::ZERO {
        return Err(MicrolendError::InvalidInput {
            field: "principal".into(),
            reason: "Principal must be positive.".into(),
        });
    }
    if input.annual_rate < Decimal::ZERO {
        return Err(MicrolendError::InvalidInput {
            field: "annual_rate".into(),
            reason: "Rate cannot be negative.".into(),
        });
    }
    if input.installments == 0 {
        return Err(MicrolendError::InvalidInput {
            field: "installments".into(),
            reason: "At least one installment is required.".into(),
        });
    }
    if input.grace_periods >= input.installments {
        return Err(MicrolendError::InvalidInput {
            field: "grace_periods".into(),
            reason: "Grace must leave at least one amortizing installment.".into(),
        });
    }
    if input.fee_total < Decimal::ZERO || input.insurance_total < Decimal::ZERO {
        return Err(MicrolendError::InvalidInput {
            field: "fee_total".into(),
            reason: "Fees and insurance cannot be negative.".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
