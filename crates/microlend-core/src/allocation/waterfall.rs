//! Fixed-order payment allocation.
//!
//! A repayment is consumed by the outstanding balance categories strictly in
//! the order penalties, interest, insurance, fees, capital. Each bucket
//! absorbs `min(remaining, balance)`. What is left after the capital bucket is
//! an overpayment, handled per policy.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::MicrolendError;
use crate::loan::AllocationBreakdown;
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::MicrolendResult;

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

/// What to do with funds left over once every bucket is covered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverpaymentPolicy {
    /// Refuse the payment outright.
    Reject,
    /// Carry the excess as a credit toward future installments.
    #[default]
    Prepayment,
}

/// Outstanding balances per category, in allocation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketBalances {
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
}

impl BucketBalances {
    pub fn total(&self) -> Money {
        self.penalty + self.interest + self.insurance + self.fee + self.capital
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationInput {
    pub amount: Money,
    pub balances: BucketBalances,
    #[serde(default)]
    pub policy: OverpaymentPolicy,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Distribute `amount` across the buckets in fixed priority order.
///
/// Guarantees: no bucket receives more than its balance, the allocated total
/// never exceeds `amount`, and the capital bucket receives funds only after
/// penalties, interest, insurance, and fees are fully covered.
pub fn allocate(
    amount: Money,
    balances: &BucketBalances,
    policy: OverpaymentPolicy,
) -> MicrolendResult<AllocationBreakdown> {
    if amount <= Decimal::ZERO {
        return Err(MicrolendError::InvalidInput {
            field: "amount".into(),
            reason: "Payment amount must be positive.".into(),
        });
    }
    for (name, balance) in [
        ("penalty", balances.penalty),
        ("interest", balances.interest),
        ("insurance", balances.insurance),
        ("fee", balances.fee),
        ("capital", balances.capital),
    ] {
        if balance < Decimal::ZERO {
            return Err(MicrolendError::InvalidInput {
                field: name.into(),
                reason: "Bucket balance cannot be negative.".into(),
            });
        }
    }

    let mut remaining = amount;
    let mut take = |balance: Money| {
        let portion = remaining.min(balance);
        remaining -= portion;
        portion
    };

    let penalty = take(balances.penalty);
    let interest = take(balances.interest);
    let insurance = take(balances.insurance);
    let fee = take(balances.fee);
    let capital = take(balances.capital);

    let advance = match policy {
        _ if remaining.is_zero() => Decimal::ZERO,
        OverpaymentPolicy::Reject => {
            return Err(MicrolendError::OverpaymentRejected { excess: remaining })
        }
        OverpaymentPolicy::Prepayment => remaining,
    };

    Ok(AllocationBreakdown {
        penalty,
        interest,
        insurance,
        fee,
        capital,
        advance,
    })
}

/// Envelope wrapper over [`allocate`] for external callers.
pub fn allocate_payment(
    input: &AllocationInput,
) -> MicrolendResult<ComputationOutput<AllocationBreakdown>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let breakdown = allocate(input.amount, &input.balances, input.policy)?;
    if breakdown.advance > Decimal::ZERO {
        warnings.push(format!(
            "Overpayment of {} carried as prepayment credit",
            breakdown.advance
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "order": ["penalty", "interest", "insurance", "fee", "capital"],
        "policy": format!("{:?}", input.policy),
        "total_due": input.balances.total().to_string(),
    });

    Ok(with_metadata(
        "Payment Allocation Waterfall",
        &assumptions,
        warnings,
        elapsed,
        breakdown,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
