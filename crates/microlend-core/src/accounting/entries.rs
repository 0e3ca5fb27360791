//! Journal entry generation for servicing events.
//!
//! Every posted payment, reversal, and disbursement maps to one balanced
//! double-entry journal over a minimal chart of accounts. Entries are value
//! objects; persistence and posting to a general ledger live outside the
//! engine. An entry whose debits and credits disagree is refused at
//! construction, never emitted.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::MicrolendError;
use crate::loan::{LoanAccount, PaymentChannel, PaymentRecord};
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::MicrolendResult;

// ---------------------------------------------------------------------------
// Chart of accounts
// ---------------------------------------------------------------------------

/// Minimal servicing chart of accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Account {
    Cash,
    /// Liability mirror of client savings; debited by automatic collections.
    SavingsControl,
    LoanReceivable,
    InterestIncome,
    PenaltyIncome,
    FeeIncome,
    InsurancePayable,
    /// Prepayment credits held for the client.
    ClientAdvances,
}

impl Account {
    /// Account a repayment funds from, by channel.
    fn funding(channel: &PaymentChannel) -> Account {
        match channel {
            PaymentChannel::SavingsDebit => Account::SavingsControl,
            _ => Account::Cash,
        }
    }
}

// ---------------------------------------------------------------------------
// Journal types
// ---------------------------------------------------------------------------

/// One debit or credit line. Exactly one side is non-zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalLine {
    pub account: Account,
    #[serde(default)]
    pub debit: Money,
    #[serde(default)]
    pub credit: Money,
}

impl JournalLine {
    fn debit(account: Account, amount: Money) -> Self {
        JournalLine {
            account,
            debit: amount,
            credit: Decimal::ZERO,
        }
    }

    fn credit(account: Account, amount: Money) -> Self {
        JournalLine {
            account,
            debit: Decimal::ZERO,
            credit: amount,
        }
    }

    fn swapped(&self) -> Self {
        JournalLine {
            account: self.account,
            debit: self.credit,
            credit: self.debit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub date: NaiveDate,
    pub reference: String,
    pub description: String,
    pub lines: Vec<JournalLine>,
    pub total_debits: Money,
    pub total_credits: Money,
}

impl JournalEntry {
    /// Build an entry, dropping zero lines and enforcing balance.
    fn build(
        date: NaiveDate,
        reference: String,
        description: String,
        lines: Vec<JournalLine>,
    ) -> MicrolendResult<Self> {
        let lines: Vec<JournalLine> = lines
            .into_iter()
            .filter(|l| !l.debit.is_zero() || !l.credit.is_zero())
            .collect();
        if lines.is_empty() {
            return Err(MicrolendError::InsufficientData(
                "Journal entry has no non-zero lines.".into(),
            ));
        }
        let total_debits: Money = lines.iter().map(|l| l.debit).sum();
        let total_credits: Money = lines.iter().map(|l| l.credit).sum();
        if total_debits != total_credits {
            return Err(MicrolendError::FinancialImpossibility(format!(
                "Journal entry {reference} does not balance: debits {total_debits}, credits {total_credits}"
            )));
        }
        Ok(JournalEntry {
            date,
            reference,
            description,
            lines,
            total_debits,
            total_credits,
        })
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Journal entry for a posted repayment: debit the funding account, credit
/// one line per non-zero allocation bucket.
pub fn payment_entries(
    payment: &PaymentRecord,
    loan: &LoanAccount,
) -> MicrolendResult<ComputationOutput<JournalEntry>> {
    let start = Instant::now();

    if payment.amount <= Decimal::ZERO {
        return Err(MicrolendError::InvalidInput {
            field: "payment".into(),
            reason: "Journal generation expects a positive payment; use reversal_entries for contra records.".into(),
        });
    }

    let entry = JournalEntry::build(
        payment.date,
        payment.id.clone(),
        format!("Repayment on loan {}", loan.id),
        repayment_lines(payment),
    )?;

    finish(start, payment, loan, entry)
}

/// Contra entry for a reversed repayment: the original entry with debit and
/// credit sides swapped. Pass the original payment record, not the contra.
pub fn reversal_entries(
    original: &PaymentRecord,
    loan: &LoanAccount,
) -> MicrolendResult<ComputationOutput<JournalEntry>> {
    let start = Instant::now();

    if original.amount <= Decimal::ZERO || original.reversal_of.is_some() {
        return Err(MicrolendError::InvalidInput {
            field: "payment".into(),
            reason: "Reversal entries are generated from the original payment record.".into(),
        });
    }

    let lines = repayment_lines(original)
        .into_iter()
        .map(|l| l.swapped())
        .collect();
    let entry = JournalEntry::build(
        original.date,
        format!("REV-{}", original.id),
        format!("Reversal of {} on loan {}", original.id, loan.id),
        lines,
    )?;

    finish(start, original, loan, entry)
}

/// Journal entry for loan origination: receivable against cash.
pub fn disbursement_entries(
    loan: &LoanAccount,
) -> MicrolendResult<ComputationOutput<JournalEntry>> {
    let start = Instant::now();

    if loan.principal <= Decimal::ZERO {
        return Err(MicrolendError::InvalidInput {
            field: "principal".into(),
            reason: "Principal must be positive.".into(),
        });
    }

    let entry = JournalEntry::build(
        loan.disbursement_date,
        format!("DSB-{}", loan.id),
        format!("Disbursement of loan {}", loan.id),
        vec![
            JournalLine::debit(Account::LoanReceivable, loan.principal),
            JournalLine::credit(Account::Cash, loan.principal),
        ],
    )?;

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "loan_id": loan.id,
        "principal": loan.principal.to_string(),
    });
    Ok(with_metadata(
        "Disbursement Journal Entry",
        &assumptions,
        Vec::new(),
        elapsed,
        entry,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn repayment_lines(payment: &PaymentRecord) -> Vec<JournalLine> {
    let b = &payment.breakdown;
    vec![
        JournalLine::debit(Account::funding(&payment.channel), payment.amount),
        JournalLine::credit(Account::PenaltyIncome, b.penalty),
        JournalLine::credit(Account::InterestIncome, b.interest),
        JournalLine::credit(Account::InsurancePayable, b.insurance),
        JournalLine::credit(Account::FeeIncome, b.fee),
        JournalLine::credit(Account::LoanReceivable, b.capital),
        JournalLine::credit(Account::ClientAdvances, b.advance),
    ]
}

fn finish(
    start: Instant,
    payment: &PaymentRecord,
    loan: &LoanAccount,
    entry: JournalEntry,
) -> MicrolendResult<ComputationOutput<JournalEntry>> {
    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "loan_id": loan.id,
        "payment_id": payment.id,
        "channel": format!("{:?}", payment.channel),
    });
    Ok(with_metadata(
        "Repayment Journal Entry",
        &assumptions,
        Vec::new(),
        elapsed,
        entry,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::AllocationBreakdown;
    use crate::types::{Currency, PaymentFrequency};
    use rust_decimal_macros::dec;

    fn loan() -> LoanAccount {
        LoanAccount {
            id: "LN-300".into(),
            client_id: None,
            currency: Currency::XOF,
            principal: dec!(100_000),
            annual_rate: dec!(0.12),
            frequency: PaymentFrequency::Monthly,
            disbursement_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            savings_account_id: None,
            installments: Vec::new(),
            advance_balance: Decimal::ZERO,
            payments: Vec::new(),
        }
    }

    fn payment(channel: PaymentChannel) -> PaymentRecord {
        PaymentRecord {
            id: "PMT-LN-300-0001".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            channel,
            amount: dec!(10_000),
            breakdown: AllocationBreakdown {
                penalty: dec!(500),
                interest: dec!(1_500),
                insurance: dec!(200),
                fee: dec!(300),
                capital: dec!(7_000),
                advance: dec!(500),
            },
            reversed: false,
            reversal_of: None,
        }
    }

    fn line(entry: &JournalEntry, account: Account) -> &JournalLine {
        entry
            .lines
            .iter()
            .find(|l| l.account == account)
            .unwrap_or_else(|| panic!("no line for {account:?}"))
    }

    #[test]
    fn test_cash_payment_entry_balances() {
        let entry = payment_entries(&payment(PaymentChannel::Cash), &loan())
            .unwrap()
            .result;
        assert_eq!(entry.total_debits, entry.total_credits);
        assert_eq!(entry.total_debits, dec!(10_000));
        assert_eq!(line(&entry, Account::Cash).debit, dec!(10_000));
        assert_eq!(line(&entry, Account::PenaltyIncome).credit, dec!(500));
        assert_eq!(line(&entry, Account::InterestIncome).credit, dec!(1_500));
        assert_eq!(line(&entry, Account::LoanReceivable).credit, dec!(7_000));
        assert_eq!(line(&entry, Account::ClientAdvances).credit, dec!(500));
    }

    #[test]
    fn test_savings_debit_funds_from_savings_control() {
        let entry = payment_entries(&payment(PaymentChannel::SavingsDebit), &loan())
            .unwrap()
            .result;
        assert_eq!(line(&entry, Account::SavingsControl).debit, dec!(10_000));
        assert!(entry.lines.iter().all(|l| l.account != Account::Cash));
    }

    #[test]
    fn test_zero_buckets_emit_no_lines() {
        let mut p = payment(PaymentChannel::Cash);
        p.amount = dec!(7_000);
        p.breakdown = AllocationBreakdown {
            capital: dec!(7_000),
            ..Default::default()
        };
        let entry = payment_entries(&p, &loan()).unwrap().result;
        // Funding debit + capital credit only
        assert_eq!(entry.lines.len(), 2);
    }

    #[test]
    fn test_reversal_swaps_sides() {
        let original = payment(PaymentChannel::Cash);
        let entry = reversal_entries(&original, &loan()).unwrap().result;
        assert_eq!(entry.total_debits, entry.total_credits);
        assert_eq!(line(&entry, Account::Cash).credit, dec!(10_000));
        assert_eq!(line(&entry, Account::InterestIncome).debit, dec!(1_500));
        assert_eq!(line(&entry, Account::LoanReceivable).debit, dec!(7_000));
        assert!(entry.reference.starts_with("REV-"));
    }

    #[test]
    fn test_reversal_of_contra_record_rejected() {
        let mut contra = payment(PaymentChannel::Cash);
        contra.amount = dec!(-10_000);
        contra.reversal_of = Some("PMT-LN-300-0001".into());
        assert!(reversal_entries(&contra, &loan()).is_err());
    }

    #[test]
    fn test_disbursement_entry() {
        let entry = disbursement_entries(&loan()).unwrap().result;
        assert_eq!(entry.total_debits, dec!(100_000));
        assert_eq!(line(&entry, Account::LoanReceivable).debit, dec!(100_000));
        assert_eq!(line(&entry, Account::Cash).credit, dec!(100_000));
    }

    #[test]
    fn test_unbalanced_breakdown_refused() {
        // Breakdown totals 9,500 against a 10,000 payment
        let mut p = payment(PaymentChannel::Cash);
        p.breakdown.advance = Decimal::ZERO;
        let err = payment_entries(&p, &loan()).unwrap_err();
        assert!(matches!(err, MicrolendError::FinancialImpossibility(_)));
    }
}
