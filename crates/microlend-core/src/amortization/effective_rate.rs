//! All-in effective interest rate of a schedule.
//!
//! Solves the period rate that equates the net disbursed amount with the
//! installment stream (Newton-Raphson), then annualizes by compounding at the
//! payment frequency. Upfront fees reduce the net disbursement, so the
//! effective rate reflects the full cost of credit, not just the nominal rate.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::MicrolendError;
use crate::types::{with_metadata, ComputationOutput, Money, PaymentFrequency, Rate};
use crate::MicrolendResult;

const NEWTON_MAX_ITERATIONS: u32 = 100;
const NEWTON_EPSILON: Decimal = dec!(0.0000001);

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveRateInput {
    pub principal: Money,
    /// Fees collected at disbursement; reduce the net amount handed over.
    #[serde(default)]
    pub upfront_fees: Money,
    /// Total collected per installment (capital + interest + fees + insurance).
    pub payments: Vec<Money>,
    #[serde(default)]
    pub frequency: PaymentFrequency,
    /// Starting point for the root search. Defaults to 1% per period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guess: Option<Rate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveRateOutput {
    /// Internal rate per payment period.
    pub period_rate: Rate,
    /// period_rate x periods per year.
    pub nominal_annual_rate: Rate,
    /// (1 + period_rate)^periods_per_year - 1.
    pub effective_annual_rate: Rate,
    pub net_disbursed: Money,
    pub total_repaid: Money,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute the effective annual rate implied by a repayment stream.
pub fn effective_rate(
    input: &EffectiveRateInput,
) -> MicrolendResult<ComputationOutput<EffectiveRateOutput>> {
    let start = Instant::now();
    let warnings: Vec<String> = Vec::new();

    if input.principal <= Decimal::ZERO {
        return Err(MicrolendError::InvalidInput {
            field: "principal".into(),
            reason: "Principal must be positive.".into(),
        });
    }
    if input.payments.is_empty() {
        return Err(MicrolendError::InsufficientData(
            "At least one installment payment is required.".into(),
        ));
    }
    let net = input.principal - input.upfront_fees;
    if net <= Decimal::ZERO {
        return Err(MicrolendError::FinancialImpossibility(
            "Upfront fees consume the entire principal.".into(),
        ));
    }

    let guess = input.guess.unwrap_or(dec!(0.01));
    let rate = period_irr(net, &input.payments, guess)?;

    let ppy = input.frequency.periods_per_year();
    let total_repaid: Money = input.payments.iter().copied().sum();
    let output = EffectiveRateOutput {
        period_rate: rate,
        nominal_annual_rate: rate * ppy,
        effective_annual_rate: (Decimal::ONE + rate).powd(ppy) - Decimal::ONE,
        net_disbursed: net,
        total_repaid,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "upfront_fees": input.upfront_fees.to_string(),
        "installment_count": input.payments.len(),
        "periods_per_year": ppy.to_string(),
    });

    Ok(with_metadata(
        "Effective Interest Rate (period IRR, compounded annual)",
        &assumptions,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Newton-Raphson on f(i) = -net + sum(p_t / (1+i)^t).
fn period_irr(net: Money, payments: &[Money], guess: Rate) -> MicrolendResult<Rate> {
    let mut rate = guess;

    for i in 0..NEWTON_MAX_ITERATIONS {
        let one_plus = Decimal::ONE + rate;
        let mut f = -net;
        let mut df = Decimal::ZERO;

        for (idx, p) in payments.iter().enumerate() {
            let t = Decimal::from(idx as i64 + 1);
            let discount = one_plus.powd(t);
            if discount.is_zero() {
                continue;
            }
            f += p / discount;
            df -= t * p / one_plus.powd(t + Decimal::ONE);
        }

        if f.abs() < NEWTON_EPSILON {
            return Ok(rate);
        }
        if df.is_zero() {
            return Err(MicrolendError::ConvergenceFailure {
                function: "effective_rate".into(),
                iterations: i,
                last_delta: f,
            });
        }

        rate -= f / df;

        // Guard against divergence
        if rate < dec!(-0.99) {
            rate = dec!(-0.99);
        } else if rate > dec!(10.0) {
            rate = dec!(10.0);
        }
    }

    Err(MicrolendError::ConvergenceFailure {
        function: "effective_rate".into(),
        iterations: NEWTON_MAX_ITERATIONS,
        last_delta: Decimal::ZERO,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_payment_rate() {
        let input = EffectiveRateInput {
            principal: dec!(1000),
            upfront_fees: Decimal::ZERO,
            payments: vec![dec!(1100)],
            frequency: PaymentFrequency::Annual,
            guess: None,
        };
        let result = effective_rate(&input).unwrap();
        // 1000 now, 1100 in one period -> 10% exactly
        assert!((result.result.period_rate - dec!(0.10)).abs() < dec!(0.000001));
        assert!((result.result.effective_annual_rate - dec!(0.10)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_annuity_recovers_nominal_rate() {
        // 100,000 repaid in 12 monthly payments of 8,884.88 -> ~1% per month
        let input = EffectiveRateInput {
            principal: dec!(100_000),
            upfront_fees: Decimal::ZERO,
            payments: vec![dec!(8884.88); 12],
            frequency: PaymentFrequency::Monthly,
            guess: None,
        };
        let result = effective_rate(&input).unwrap();
        assert!((result.result.period_rate - dec!(0.01)).abs() < dec!(0.0001));
        // Compounded: (1.01)^12 - 1 ~ 12.68%
        assert!(result.result.effective_annual_rate > dec!(0.125));
        assert!(result.result.effective_annual_rate < dec!(0.13));
    }

    #[test]
    fn test_upfront_fees_raise_effective_rate() {
        let no_fees = EffectiveRateInput {
            principal: dec!(100_000),
            upfront_fees: Decimal::ZERO,
            payments: vec![dec!(8884.88); 12],
            frequency: PaymentFrequency::Monthly,
            guess: None,
        };
        let with_fees = EffectiveRateInput {
            upfront_fees: dec!(2_000),
            ..no_fees.clone()
        };
        let base = effective_rate(&no_fees).unwrap().result.effective_annual_rate;
        let loaded = effective_rate(&with_fees).unwrap().result.effective_annual_rate;
        assert!(loaded > base);
    }

    #[test]
    fn test_fees_consuming_principal_rejected() {
        let input = EffectiveRateInput {
            principal: dec!(1000),
            upfront_fees: dec!(1000),
            payments: vec![dec!(500)],
            frequency: PaymentFrequency::Monthly,
            guess: None,
        };
        let err = effective_rate(&input).unwrap_err();
        match err {
            MicrolendError::FinancialImpossibility(_) => {}
            other => panic!("Expected FinancialImpossibility, got {other:?}"),
        }
    }

    #[test]
    fn test_no_payments_rejected() {
        let input = EffectiveRateInput {
            principal: dec!(1000),
            upfront_fees: Decimal::ZERO,
            payments: vec![],
            frequency: PaymentFrequency::Monthly,
            guess: None,
        };
        assert!(matches!(
            effective_rate(&input).unwrap_err(),
            MicrolendError::InsufficientData(_)
        ));
    }
}
