//! Debt-to-income assessment for credit origination.
//!
//! The proposed installment is normalized to a monthly amount before it is
//! compared against income, so weekly and monthly products are graded on the
//! same footing. Alongside the approve/refuse verdict the assessment reports
//! how much installment headroom the applicant has and the principal that
//! headroom would support at the proposed rate and term.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::MicrolendError;
use crate::types::{round_money, with_metadata, ComputationOutput, Currency, Money, PaymentFrequency, Rate};
use crate::MicrolendResult;

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtiInput {
    /// Verified gross monthly income.
    pub monthly_income: Money,
    /// Existing monthly debt service (other loans, rent treated as debt).
    #[serde(default)]
    pub monthly_obligations: Money,
    /// Installment of the proposed loan, per payment period.
    pub proposed_installment: Money,
    #[serde(default)]
    pub frequency: PaymentFrequency,
    /// DTI above which the application is refused.
    pub max_dti: Rate,
    /// Nominal annual rate of the proposed loan, used to invert the annuity.
    pub annual_rate: Rate,
    /// Term of the proposed loan in installments.
    pub installments: u32,
    #[serde(default)]
    pub currency: Currency,
}

/// Risk grade banded on the post-loan DTI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskGrade {
    A,
    B,
    C,
    D,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtiOutput {
    /// Obligations / income before the proposed loan.
    pub dti_before: Rate,
    /// (Obligations + normalized installment) / income.
    pub dti_after: Rate,
    pub approved: bool,
    pub grade: RiskGrade,
    /// Monthly installment room left under the maximum DTI.
    pub headroom_monthly: Money,
    /// Largest installment (per payment period) the applicant can carry.
    pub max_affordable_installment: Money,
    /// Principal that installment supports at the proposed rate and term.
    pub max_affordable_principal: Money,
    /// Proposed installment expressed per month.
    pub proposed_installment_monthly: Money,
}

const GRADE_A_CEILING: Decimal = dec!(0.20);
const GRADE_B_CEILING: Decimal = dec!(0.35);
const GRADE_C_CEILING: Decimal = dec!(0.50);

const MONTHS_PER_YEAR: Decimal = dec!(12);

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Assess the applicant's debt-to-income position with the proposed loan.
pub fn assess_dti(input: &DtiInput) -> MicrolendResult<ComputationOutput<DtiOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;

    let scale = input.currency.scale();
    let ppy = input.frequency.periods_per_year();

    // Per-period installment -> per-month equivalent.
    let monthly_factor = ppy / MONTHS_PER_YEAR;
    let installment_monthly = input.proposed_installment * monthly_factor;

    let dti_before = input.monthly_obligations / input.monthly_income;
    let dti_after = (input.monthly_obligations + installment_monthly) / input.monthly_income;
    let approved = dti_after <= input.max_dti;

    if dti_before > input.max_dti {
        warnings.push("Applicant exceeds the maximum DTI before the proposed loan.".into());
    }

    let headroom_monthly =
        (input.max_dti * input.monthly_income - input.monthly_obligations).max(Decimal::ZERO);
    let max_installment = headroom_monthly / monthly_factor;

    let period_rate = input.frequency.period_rate(input.annual_rate);
    let max_principal = annuity_principal(max_installment, period_rate, input.installments)?;

    let output = DtiOutput {
        dti_before,
        dti_after,
        approved,
        grade: grade(dti_after),
        headroom_monthly: round_money(headroom_monthly, scale),
        max_affordable_installment: round_money(max_installment, scale),
        max_affordable_principal: round_money(max_principal, scale),
        proposed_installment_monthly: round_money(installment_monthly, scale),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "max_dti": input.max_dti.to_string(),
        "frequency": format!("{:?}", input.frequency),
        "period_rate": period_rate.to_string(),
        "term_installments": input.installments,
    });

    Ok(with_metadata(
        "Debt-to-Income Assessment (monthly-normalized)",
        &assumptions,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn grade(dti_after: Rate) -> RiskGrade {
    if dti_after <= GRADE_A_CEILING {
        RiskGrade::A
    } else if dti_after <= GRADE_B_CEILING {
        RiskGrade::B
    } else if dti_after <= GRADE_C_CEILING {
        RiskGrade::C
    } else {
        RiskGrade::D
    }
}

/// Present value of an annuity: the principal a constant payment supports.
fn annuity_principal(payment: Money, period_rate: Rate, periods: u32) -> MicrolendResult<Money> {
    if payment <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    if period_rate.is_zero() {
        return Ok(payment * Decimal::from(periods));
    }
    let one_plus = Decimal::ONE + period_rate;
    let discount = one_plus.powd(Decimal::from(periods));
    if discount.is_zero() {
        return Err(MicrolendError::DivisionByZero {
            context: "annuity discount factor".into(),
        });
    }
    Ok(payment * (Decimal::ONE - Decimal::ONE / discount) / period_rate)
}

fn validate_input(input: &DtiInput) -> MicrolendResult<()> {
    if input.monthly_income <= Decimal::ZERO {
        return Err(MicrolendError::InvalidInput {
            field: "monthly_income".into(),
            reason: "Monthly income must be positive.".into(),
        });
    }
    if input.monthly_obligations < Decimal::ZERO {
        return Err(MicrolendError::InvalidInput {
            field: "monthly_obligations".into(),
            reason: "Obligations cannot be negative.".into(),
        });
    }
    if input.proposed_installment <= Decimal::ZERO {
        return Err(MicrolendError::InvalidInput {
            field: "proposed_installment".into(),
            reason: "Proposed installment must be positive.".into(),
        });
    }
    if input.max_dti <= Decimal::ZERO || input.max_dti >= Decimal::ONE {
        return Err(MicrolendError::InvalidInput {
            field: "max_dti".into(),
            reason: "Maximum DTI must be between 0 and 1 exclusive.".into(),
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
            reason: "Term must be at least one installment.".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> DtiInput {
        DtiInput {
            monthly_income: dec!(300_000),
            monthly_obligations: dec!(30_000),
            proposed_installment: dec!(60_000),
            frequency: PaymentFrequency::Monthly,
            max_dti: dec!(0.40),
            annual_rate: dec!(0.12),
            installments: 12,
            currency: Currency::XOF,
        }
    }

    #[test]
    fn test_monthly_loan_within_limit_approved() {
        let result = assess_dti(&base_input()).unwrap();
        let d = &result.result;
        // (30,000 + 60,000) / 300,000 = 0.30
        assert_eq!(d.dti_before, dec!(0.1));
        assert_eq!(d.dti_after, dec!(0.3));
        assert!(d.approved);
        assert_eq!(d.grade, RiskGrade::B);
    }

    #[test]
    fn test_over_limit_refused() {
        let mut input = base_input();
        input.proposed_installment = dec!(100_000);
        let result = assess_dti(&input).unwrap();
        // (30,000 + 100,000) / 300,000 ~ 0.433 > 0.40
        assert!(!result.result.approved);
        assert_eq!(result.result.grade, RiskGrade::C);
    }

    #[test]
    fn test_weekly_installment_normalized() {
        let mut input = base_input();
        input.frequency = PaymentFrequency::Weekly;
        input.proposed_installment = dec!(15_000);
        let result = assess_dti(&input).unwrap();
        // 15,000 x 52 / 12 = 65,000 per month
        assert_eq!(result.result.proposed_installment_monthly, dec!(65_000));
    }

    #[test]
    fn test_headroom_and_max_installment() {
        let result = assess_dti(&base_input()).unwrap();
        let d = &result.result;
        // 0.40 x 300,000 - 30,000 = 90,000
        assert_eq!(d.headroom_monthly, dec!(90_000));
        assert_eq!(d.max_affordable_installment, dec!(90_000));
        // 90,000/month at 1%/month over 12 months -> ~1,012,765
        assert!(d.max_affordable_principal > dec!(1_000_000));
        assert!(d.max_affordable_principal < dec!(1_020_000));
    }

    #[test]
    fn test_already_over_limit_warns() {
        let mut input = base_input();
        input.monthly_obligations = dec!(150_000);
        let result = assess_dti(&input).unwrap();
        assert!(!result.result.approved);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.result.headroom_monthly, Decimal::ZERO);
        assert_eq!(result.result.max_affordable_principal, Decimal::ZERO);
    }

    #[test]
    fn test_grade_bands() {
        let grade_for = |installment: Decimal| {
            let mut input = base_input();
            input.monthly_obligations = Decimal::ZERO;
            input.proposed_installment = installment;
            assess_dti(&input).unwrap().result.grade
        };
        assert_eq!(grade_for(dec!(50_000)), RiskGrade::A); // 0.167
        assert_eq!(grade_for(dec!(90_000)), RiskGrade::B); // 0.30
        assert_eq!(grade_for(dec!(140_000)), RiskGrade::C); // 0.467
        assert_eq!(grade_for(dec!(200_000)), RiskGrade::D); // 0.667
    }

    #[test]
    fn test_zero_rate_principal_is_simple_product() {
        let mut input = base_input();
        input.annual_rate = Decimal::ZERO;
        let result = assess_dti(&input).unwrap();
        // 90,000 x 12
        assert_eq!(result.result.max_affordable_principal, dec!(1_080_000));
    }

    #[test]
    fn test_zero_income_rejected() {
        let mut input = base_input();
        input.monthly_income = Decimal::ZERO;
        let err = assess_dti(&input).unwrap_err();
        match err {
            MicrolendError::InvalidInput { field, .. } => assert_eq!(field, "monthly_income"),
            other => panic!("Expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_max_dti_bounds_rejected() {
        for bad in [Decimal::ZERO, Decimal::ONE, dec!(1.2)] {
            let mut input = base_input();
            input.max_dti = bad;
            assert!(assess_dti(&input).is_err(), "{bad}");
        }
    }
}
