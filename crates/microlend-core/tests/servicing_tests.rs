use chrono::NaiveDate;
use microlend_core::allocation::apply::{post_payment, reverse_payment, PostPaymentInput};
use microlend_core::allocation::waterfall::OverpaymentPolicy;
use microlend_core::amortization::schedule::{build_schedule, AmortizationMethod, ScheduleInput};
use microlend_core::loan::{InstallmentStatus, LoanAccount, PaymentChannel};
use microlend_core::penalty::accrual::{accrue_penalties, PenaltyConfig};
use microlend_core::types::{Currency, PaymentFrequency};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Full servicing lifecycle: schedule -> arrears -> accrual -> repayment
// ===========================================================================

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 100,000 XOF over 4 months, straight line, with distributed fees.
fn disbursed_loan() -> LoanAccount {
    let input = ScheduleInput {
        loan_id: Some("LN-INT-1".into()),
        principal: dec!(100_000),
        annual_rate: dec!(0.12),
        installments: 4,
        frequency: PaymentFrequency::Monthly,
        disbursement_date: date(2024, 1, 10),
        first_due_date: None,
        grace_periods: 0,
        method: AmortizationMethod::StraightLine,
        fee_total: dec!(2_000),
        insurance_total: Decimal::ZERO,
        currency: Currency::XOF,
    };
    let schedule = build_schedule(&input).unwrap().result;

    LoanAccount {
        id: "LN-INT-1".into(),
        client_id: Some("CL-9".into()),
        currency: Currency::XOF,
        principal: dec!(100_000),
        annual_rate: dec!(0.12),
        frequency: PaymentFrequency::Monthly,
        disbursement_date: date(2024, 1, 10),
        savings_account_id: Some("SV-9".into()),
        installments: schedule.into_installments(),
        advance_balance: Decimal::ZERO,
        payments: Vec::new(),
    }
}

fn penalty_config() -> PenaltyConfig {
    PenaltyConfig {
        daily_rate: dec!(0.01),
        ceiling_pct: dec!(0.10),
        grace_days: 0,
        compound: false,
    }
}

#[test]
fn test_generated_ledger_passes_loan_invariants() {
    let loan = disbursed_loan();
    loan.validate().unwrap();
    assert_eq!(loan.outstanding_capital(), dec!(100_000));
    // Straight line: 25,000 capital per line, fees 500 each
    assert_eq!(loan.installments[0].capital_due, dec!(25_000));
    assert_eq!(loan.installments[0].fee_due, dec!(500));
    assert_eq!(loan.installments[0].due_date, date(2024, 2, 10));
    // First month interest: 1% of 100,000
    assert_eq!(loan.installments[0].interest_due, dec!(1_000));
}

#[test]
fn test_arrears_accrue_then_payment_clears_in_order() {
    let mut loan = disbursed_loan();

    // Five days past the first due date
    let as_of = date(2024, 2, 15);
    loan.refresh_statuses(as_of);
    assert_eq!(loan.installments[0].status, InstallmentStatus::Late);

    let accrual = accrue_penalties(&mut loan, &penalty_config(), as_of)
        .unwrap()
        .result;
    // Base is unpaid capital + interest = 26,000 (fees excluded); 5 days x 1%
    assert_eq!(accrual.accrued_this_run, dec!(1_300));

    // A repayment that covers penalty, interest, fee and part of capital
    let record = post_payment(
        &mut loan,
        &PostPaymentInput {
            amount: dec!(10_000),
            value_date: as_of,
            channel: PaymentChannel::Cash,
            policy: OverpaymentPolicy::Reject,
        },
    )
    .unwrap()
    .result;

    assert_eq!(record.breakdown.penalty, dec!(1_300));
    assert_eq!(record.breakdown.interest, dec!(1_000));
    assert_eq!(record.breakdown.fee, dec!(500));
    assert_eq!(record.breakdown.capital, dec!(7_200));
    assert_eq!(record.breakdown.total(), dec!(10_000));

    // Next-day accrual base shrinks to the unpaid 17,800 of installment 1
    let next = accrue_penalties(&mut loan, &penalty_config(), date(2024, 2, 16))
        .unwrap()
        .result;
    assert_eq!(next.accrued_this_run, dec!(178));
}

#[test]
fn test_settling_everything_closes_the_loan() {
    let mut loan = disbursed_loan();
    let as_of = date(2024, 5, 15);
    accrue_penalties(&mut loan, &penalty_config(), as_of).unwrap();

    let penalty = loan.penalty_outstanding();
    let scheduled: Decimal = loan.installments.iter().map(|i| i.outstanding()).sum();
    post_payment(
        &mut loan,
        &PostPaymentInput {
            amount: penalty + scheduled,
            value_date: as_of,
            channel: PaymentChannel::BankTransfer,
            policy: OverpaymentPolicy::Reject,
        },
    )
    .unwrap();

    assert_eq!(loan.outstanding_capital(), Decimal::ZERO);
    assert_eq!(loan.penalty_outstanding(), Decimal::ZERO);
    for inst in &loan.installments {
        assert_eq!(inst.status, InstallmentStatus::Paid);
    }
}

#[test]
fn test_reversal_round_trip_preserves_audit_trail() {
    let mut loan = disbursed_loan();
    let as_of = date(2024, 2, 15);
    accrue_penalties(&mut loan, &penalty_config(), as_of).unwrap();
    let snapshot = loan.clone();

    let record = post_payment(
        &mut loan,
        &PostPaymentInput {
            amount: dec!(5_000),
            value_date: as_of,
            channel: PaymentChannel::MobileMoney,
            policy: OverpaymentPolicy::Reject,
        },
    )
    .unwrap()
    .result;

    reverse_payment(&mut loan, &record.id, date(2024, 2, 16)).unwrap();

    for (after, before) in loan.installments.iter().zip(snapshot.installments.iter()) {
        assert_eq!(after.capital_paid, before.capital_paid);
        assert_eq!(after.interest_paid, before.interest_paid);
        assert_eq!(after.fee_paid, before.fee_paid);
        assert_eq!(after.penalty_paid, before.penalty_paid);
    }
    // Original and contra both remain on the account
    assert_eq!(loan.payments.len(), 2);
    assert!(loan.payments[0].reversed);
    assert_eq!(
        loan.payments[1].reversal_of,
        Some(loan.payments[0].id.clone())
    );
}

#[test]
fn test_penalty_ceiling_binds_across_runs() {
    let mut loan = disbursed_loan();
    let config = PenaltyConfig {
        ceiling_pct: dec!(0.01),
        ..penalty_config()
    };
    // Far past maturity; uncapped accrual would dwarf the ceiling
    let result = accrue_penalties(&mut loan, &config, date(2024, 8, 1))
        .unwrap()
        .result;
    assert!(result.capped);
    assert_eq!(loan.penalty_accrued_total(), dec!(1_000));

    // Later runs stay at the cap
    let again = accrue_penalties(&mut loan, &config, date(2024, 9, 1))
        .unwrap()
        .result;
    assert_eq!(again.accrued_this_run, Decimal::ZERO);
    assert_eq!(loan.penalty_accrued_total(), dec!(1_000));
}

#[test]
fn test_overpayment_lands_in_advance_balance() {
    let mut loan = disbursed_loan();
    let as_of = date(2024, 2, 15);
    // Installment 1 due: 25,000 + 1,000 + 500 = 26,500
    let record = post_payment(
        &mut loan,
        &PostPaymentInput {
            amount: dec!(30_000),
            value_date: as_of,
            channel: PaymentChannel::Cash,
            policy: OverpaymentPolicy::Prepayment,
        },
    )
    .unwrap()
    .result;
    assert_eq!(record.breakdown.advance, dec!(3_500));
    assert_eq!(loan.advance_balance, dec!(3_500));
    assert_eq!(loan.installments[0].status, InstallmentStatus::Paid);
}
