//! Posting payments against a loan account.
//!
//! `post_payment` runs the waterfall over the amounts currently due and
//! writes the result back to the installment ledger, oldest installment
//! first within each bucket. `reverse_payment` undoes a posted payment with
//! a contra record; the original is marked reversed but never deleted.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::allocation::waterfall::{allocate, BucketBalances, OverpaymentPolicy};
use crate::error::MicrolendError;
use crate::loan::{Installment, LoanAccount, PaymentChannel, PaymentRecord};
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::MicrolendResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPaymentInput {
    pub amount: Money,
    pub value_date: NaiveDate,
    pub channel: PaymentChannel,
    #[serde(default)]
    pub policy: OverpaymentPolicy,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Balances currently due on the loan, in waterfall order. Scheduled buckets
/// count installments due on or before `as_of`; penalty counts the whole
/// unpaid penalty position.
pub fn due_balances(loan: &LoanAccount, as_of: NaiveDate) -> BucketBalances {
    let due: Vec<&Installment> = loan
        .installments
        .iter()
        .filter(|i| i.due_date <= as_of && !i.is_settled())
        .collect();
    BucketBalances {
        penalty: loan.penalty_outstanding(),
        interest: due.iter().map(|i| i.interest_outstanding()).sum(),
        insurance: due.iter().map(|i| i.insurance_outstanding()).sum(),
        fee: due.iter().map(|i| i.fee_outstanding()).sum(),
        capital: due.iter().map(|i| i.capital_outstanding()).sum(),
    }
}

/// Allocate and post a repayment against the loan's due balances.
pub fn post_payment(
    loan: &mut LoanAccount,
    input: &PostPaymentInput,
) -> MicrolendResult<ComputationOutput<PaymentRecord>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    loan.validate()?;
    loan.refresh_statuses(input.value_date);

    let balances = due_balances(loan, input.value_date);
    let breakdown = allocate(input.amount, &balances, input.policy)?;

    let due_date_cutoff = input.value_date;
    spread_bucket(loan, breakdown.penalty, due_date_cutoff, BucketKind::Penalty)?;
    spread_bucket(loan, breakdown.interest, due_date_cutoff, BucketKind::Interest)?;
    spread_bucket(loan, breakdown.insurance, due_date_cutoff, BucketKind::Insurance)?;
    spread_bucket(loan, breakdown.fee, due_date_cutoff, BucketKind::Fee)?;
    spread_bucket(loan, breakdown.capital, due_date_cutoff, BucketKind::Capital)?;

    if breakdown.advance > Decimal::ZERO {
        loan.advance_balance += breakdown.advance;
        warnings.push(format!(
            "Overpayment of {} carried as prepayment credit",
            breakdown.advance
        ));
    }

    let record = PaymentRecord {
        id: loan.next_payment_id(),
        date: input.value_date,
        channel: input.channel.clone(),
        amount: input.amount,
        breakdown,
        reversed: false,
        reversal_of: None,
    };
    loan.payments.push(record.clone());
    loan.refresh_statuses(input.value_date);

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "due_total": balances.total().to_string(),
        "policy": format!("{:?}", input.policy),
        "channel": format!("{:?}", input.channel),
    });

    Ok(with_metadata(
        "Payment Posting (waterfall over due balances)",
        &assumptions,
        warnings,
        elapsed,
        record,
    ))
}

/// Reverse a posted payment with a contra record, restoring the installment
/// ledger to its prior balances.
pub fn reverse_payment(
    loan: &mut LoanAccount,
    payment_id: &str,
    value_date: NaiveDate,
) -> MicrolendResult<ComputationOutput<PaymentRecord>> {
    let start = Instant::now();
    let warnings: Vec<String> = Vec::new();

    let original = loan
        .payment(payment_id)
        .ok_or_else(|| MicrolendError::InvalidInput {
            field: "payment_id".into(),
            reason: format!("No payment {payment_id} on loan {}", loan.id),
        })?
        .clone();

    if original.reversed {
        return Err(MicrolendError::InvalidInput {
            field: "payment_id".into(),
            reason: format!("Payment {payment_id} is already reversed"),
        });
    }
    if original.reversal_of.is_some() {
        return Err(MicrolendError::InvalidInput {
            field: "payment_id".into(),
            reason: "Cannot reverse a reversal record".into(),
        });
    }

    let b = &original.breakdown;
    unwind_bucket(loan, b.penalty, BucketKind::Penalty)?;
    unwind_bucket(loan, b.interest, BucketKind::Interest)?;
    unwind_bucket(loan, b.insurance, BucketKind::Insurance)?;
    unwind_bucket(loan, b.fee, BucketKind::Fee)?;
    unwind_bucket(loan, b.capital, BucketKind::Capital)?;

    if b.advance > Decimal::ZERO {
        if loan.advance_balance < b.advance {
            return Err(MicrolendError::FinancialImpossibility(format!(
                "Prepayment credit of {} already consumed; cannot reverse {}",
                loan.advance_balance, payment_id
            )));
        }
        loan.advance_balance -= b.advance;
    }

    let contra = PaymentRecord {
        id: format!("REV-{payment_id}"),
        date: value_date,
        channel: original.channel.clone(),
        amount: -original.amount,
        breakdown: original.breakdown.negated(),
        reversed: false,
        reversal_of: Some(payment_id.to_string()),
    };

    if let Some(p) = loan.payments.iter_mut().find(|p| p.id == payment_id) {
        p.reversed = true;
    }
    loan.payments.push(contra.clone());
    loan.refresh_statuses(value_date);

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "original_payment": payment_id,
        "original_amount": original.amount.to_string(),
    });

    Ok(with_metadata(
        "Payment Reversal (contra record)",
        &assumptions,
        warnings,
        elapsed,
        contra,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum BucketKind {
    Penalty,
    Interest,
    Insurance,
    Fee,
    Capital,
}

impl BucketKind {
    fn outstanding(&self, inst: &Installment) -> Money {
        match self {
            BucketKind::Penalty => inst.penalty_outstanding(),
            BucketKind::Interest => inst.interest_outstanding(),
            BucketKind::Insurance => inst.insurance_outstanding(),
            BucketKind::Fee => inst.fee_outstanding(),
            BucketKind::Capital => inst.capital_outstanding(),
        }
    }

    fn paid_field<'a>(&self, inst: &'a mut Installment) -> &'a mut Money {
        match self {
            BucketKind::Penalty => &mut inst.penalty_paid,
            BucketKind::Interest => &mut inst.interest_paid,
            BucketKind::Insurance => &mut inst.insurance_paid,
            BucketKind::Fee => &mut inst.fee_paid,
            BucketKind::Capital => &mut inst.capital_paid,
        }
    }
}

/// Distribute a bucket portion across installments, oldest first. Penalty is
/// spread over any installment carrying unpaid penalty; scheduled buckets only
/// over installments due by the cutoff.
fn spread_bucket(
    loan: &mut LoanAccount,
    portion: Money,
    due_cutoff: NaiveDate,
    kind: BucketKind,
) -> MicrolendResult<()> {
    let mut remaining = portion;
    for inst in loan.installments.iter_mut() {
        if remaining.is_zero() {
            break;
        }
        if !matches!(kind, BucketKind::Penalty) && inst.due_date > due_cutoff {
            continue;
        }
        let room = kind.outstanding(inst);
        if room <= Decimal::ZERO {
            continue;
        }
        let take = remaining.min(room);
        *kind.paid_field(inst) += take;
        remaining -= take;
    }
    if !remaining.is_zero() {
        return Err(MicrolendError::FinancialImpossibility(format!(
            "Allocated amount of {} could not be applied to the ledger",
            remaining
        )));
    }
    Ok(())
}

/// Remove a previously applied bucket portion, newest installment first
/// (the mirror image of application order).
fn unwind_bucket(loan: &mut LoanAccount, portion: Money, kind: BucketKind) -> MicrolendResult<()> {
    let mut remaining = portion;
    for inst in loan.installments.iter_mut().rev() {
        if remaining.is_zero() {
            break;
        }
        let paid = *kind.paid_field(inst);
        if paid <= Decimal::ZERO {
            continue;
        }
        let take = remaining.min(paid);
        *kind.paid_field(inst) -= take;
        remaining -= take;
    }
    if !remaining.is_zero() {
        return Err(MicrolendError::FinancialImpossibility(format!(
            "Reversal amount of {} exceeds amounts applied to the ledger",
            remaining
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::InstallmentStatus;
    use crate::types::{Currency, PaymentFrequency};
    use rust_decimal_macros::dec;

    fn two_installment_loan() -> LoanAccount {
        let inst = |number: u32, month: u32| Installment {
            number,
            due_date: NaiveDate::from_ymd_opt(2024, month, 15).unwrap(),
            capital_due: dec!(25_000),
            interest_due: dec!(1_000),
            ..Default::default()
        };
        LoanAccount {
            id: "LN-010".into(),
            client_id: None,
            currency: Currency::XOF,
            principal: dec!(50_000),
            annual_rate: dec!(0.12),
            frequency: PaymentFrequency::Monthly,
            disbursement_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            savings_account_id: None,
            installments: vec![inst(1, 2), inst(2, 3)],
            advance_balance: Decimal::ZERO,
            payments: Vec::new(),
        }
    }

    fn post(loan: &mut LoanAccount, amount: Decimal, policy: OverpaymentPolicy) -> PaymentRecord {
        let input = PostPaymentInput {
            amount,
            value_date: NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(),
            channel: PaymentChannel::Cash,
            policy,
        };
        post_payment(loan, &input).unwrap().result
    }

    #[test]
    fn test_interest_spreads_oldest_first() {
        let mut loan = two_installment_loan();
        let record = post(&mut loan, dec!(1_500), OverpaymentPolicy::Prepayment);
        assert_eq!(record.breakdown.interest, dec!(1_500));
        assert_eq!(loan.installments[0].interest_paid, dec!(1_000));
        assert_eq!(loan.installments[1].interest_paid, dec!(500));
        assert_eq!(loan.installments[0].capital_paid, Decimal::ZERO);
    }

    #[test]
    fn test_penalty_consumed_before_interest() {
        let mut loan = two_installment_loan();
        loan.installments[0].penalty_accrued = dec!(500);
        let record = post(&mut loan, dec!(700), OverpaymentPolicy::Prepayment);
        assert_eq!(record.breakdown.penalty, dec!(500));
        assert_eq!(record.breakdown.interest, dec!(200));
        assert_eq!(loan.installments[0].penalty_paid, dec!(500));
    }

    #[test]
    fn test_full_settlement_marks_paid() {
        let mut loan = two_installment_loan();
        post(&mut loan, dec!(52_000), OverpaymentPolicy::Reject);
        assert_eq!(loan.installments[0].status, InstallmentStatus::Paid);
        assert_eq!(loan.installments[1].status, InstallmentStatus::Paid);
        assert_eq!(loan.outstanding_capital(), Decimal::ZERO);
    }

    #[test]
    fn test_overpayment_becomes_advance() {
        let mut loan = two_installment_loan();
        let record = post(&mut loan, dec!(52_300), OverpaymentPolicy::Prepayment);
        assert_eq!(record.breakdown.advance, dec!(300));
        assert_eq!(loan.advance_balance, dec!(300));
    }

    #[test]
    fn test_overpayment_rejected_leaves_state_untouched() {
        let mut loan = two_installment_loan();
        let input = PostPaymentInput {
            amount: dec!(60_000),
            value_date: NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(),
            channel: PaymentChannel::Cash,
            policy: OverpaymentPolicy::Reject,
        };
        let err = post_payment(&mut loan, &input).unwrap_err();
        assert!(matches!(err, MicrolendError::OverpaymentRejected { .. }));
        assert_eq!(loan.installments[0].total_paid(), Decimal::ZERO);
        assert!(loan.payments.is_empty());
    }

    #[test]
    fn test_upcoming_installments_not_in_scheduled_buckets() {
        let mut loan = two_installment_loan();
        // Value date before installment 2 falls due
        let input = PostPaymentInput {
            amount: dec!(26_000),
            value_date: NaiveDate::from_ymd_opt(2024, 2, 20).unwrap(),
            channel: PaymentChannel::Cash,
            policy: OverpaymentPolicy::Prepayment,
        };
        let record = post_payment(&mut loan, &input).unwrap().result;
        // Only installment 1 was due; the full 26,000 settles it exactly
        assert_eq!(record.breakdown.interest, dec!(1_000));
        assert_eq!(record.breakdown.capital, dec!(25_000));
        assert_eq!(loan.installments[1].total_paid(), Decimal::ZERO);
    }

    #[test]
    fn test_reversal_restores_ledger() {
        let mut loan = two_installment_loan();
        loan.installments[0].penalty_accrued = dec!(500);
        let before = loan.clone();

        let record = post(&mut loan, dec!(27_500), OverpaymentPolicy::Prepayment);
        let contra = reverse_payment(
            &mut loan,
            &record.id,
            NaiveDate::from_ymd_opt(2024, 3, 25).unwrap(),
        )
        .unwrap()
        .result;

        assert_eq!(contra.amount, dec!(-27_500));
        assert_eq!(contra.reversal_of, Some(record.id.clone()));
        for (a, b) in loan.installments.iter().zip(before.installments.iter()) {
            assert_eq!(a.total_paid(), b.total_paid());
            assert_eq!(a.penalty_paid, b.penalty_paid);
        }
        assert_eq!(loan.advance_balance, before.advance_balance);
        // Audit trail: both records remain
        assert_eq!(loan.payments.len(), 2);
        assert!(loan.payments[0].reversed);
    }

    #[test]
    fn test_double_reversal_rejected() {
        let mut loan = two_installment_loan();
        let record = post(&mut loan, dec!(1_000), OverpaymentPolicy::Prepayment);
        let date = NaiveDate::from_ymd_opt(2024, 3, 25).unwrap();
        reverse_payment(&mut loan, &record.id, date).unwrap();
        let err = reverse_payment(&mut loan, &record.id, date).unwrap_err();
        assert!(matches!(err, MicrolendError::InvalidInput { .. }));
    }

    #[test]
    fn test_reversing_a_contra_record_rejected() {
        let mut loan = two_installment_loan();
        let record = post(&mut loan, dec!(1_000), OverpaymentPolicy::Prepayment);
        let date = NaiveDate::from_ymd_opt(2024, 3, 25).unwrap();
        let contra = reverse_payment(&mut loan, &record.id, date).unwrap().result;
        let err = reverse_payment(&mut loan, &contra.id, date).unwrap_err();
        assert!(matches!(err, MicrolendError::InvalidInput { .. }));
    }

    #[test]
    fn test_payment_ids_are_sequential() {
        let mut loan = two_installment_loan();
        let first = post(&mut loan, dec!(100), OverpaymentPolicy::Prepayment);
        let second = post(&mut loan, dec!(100), OverpaymentPolicy::Prepayment);
        assert_eq!(first.id, "PMT-LN-010-0001");
        assert_eq!(second.id, "PMT-LN-010-0002");
    }
}
