//! Daily penalty accrual on overdue installments.
//!
//! Accrual is driven by a per-installment watermark (`penalty_accrued_through`)
//! so a given calendar day is never charged twice, no matter how often the
//! daily job runs. Cumulative accrued penalty on a loan is capped at
//! `ceiling_pct` of the remaining capital; once the cap is hit further days
//! accrue nothing but the watermark still advances.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::MicrolendError;
use crate::loan::LoanAccount;
use crate::types::{round_money, with_metadata, ComputationOutput, Money, Rate};
use crate::MicrolendResult;

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyConfig {
    /// Penalty per day as a fraction of the overdue base (0.01 = 1%/day).
    pub daily_rate: Rate,
    /// Cumulative accrued penalty never exceeds this fraction of the loan's
    /// remaining capital.
    pub ceiling_pct: Rate,
    /// Days past due before penalties start.
    #[serde(default)]
    pub grace_days: u32,
    /// When true the daily base includes unpaid penalty already accrued
    /// (compound accrual). The default charges on overdue capital + interest
    /// only, so accrual is linear in days late.
    #[serde(default)]
    pub compound: bool,
}

/// One day of penalty charged against one installment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyAccrual {
    pub installment_number: u32,
    pub date: NaiveDate,
    pub days_late: i64,
    /// Overdue amount the daily rate was applied to.
    pub base: Money,
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrualOutput {
    pub as_of: NaiveDate,
    pub new_accruals: Vec<PenaltyAccrual>,
    pub accrued_this_run: Money,
    /// Unpaid penalty across the loan after this run.
    pub penalty_balance_after: Money,
    pub ceiling: Money,
    /// True if the ceiling clamped any accrual in this run.
    pub capped: bool,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Accrue penalties on every overdue installment of `loan` through `as_of`.
/// Running twice with the same `as_of` accrues nothing the second time.
pub fn accrue_penalties(
    loan: &mut LoanAccount,
    config: &PenaltyConfig,
    as_of: NaiveDate,
) -> MicrolendResult<ComputationOutput<AccrualOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_config(config)?;

    let scale = loan.currency.scale();
    let ceiling = config.ceiling_pct * loan.outstanding_capital();
    let mut accrued_total = loan.penalty_accrued_total();
    let mut capped = false;

    if accrued_total >= ceiling && ceiling > Decimal::ZERO {
        warnings.push("Penalty ceiling already reached before this run.".into());
    }

    let mut new_accruals: Vec<PenaltyAccrual> = Vec::new();

    for inst in loan.installments.iter_mut() {
        if inst.is_settled() {
            continue;
        }
        let first_chargeable = inst.due_date + Duration::days(config.grace_days as i64 + 1);
        if as_of < first_chargeable {
            continue;
        }
        let from = match inst.penalty_accrued_through {
            Some(watermark) => (watermark + Duration::days(1)).max(first_chargeable),
            None => first_chargeable,
        };

        let mut day = from;
        while day <= as_of {
            let mut base = inst.capital_outstanding() + inst.interest_outstanding();
            if config.compound {
                base += inst.penalty_outstanding();
            }
            let raw = round_money(base * config.daily_rate, scale);
            let room = (ceiling - accrued_total).max(Decimal::ZERO);
            let amount = raw.min(room);
            if amount < raw {
                capped = true;
            }
            if amount > Decimal::ZERO {
                new_accruals.push(PenaltyAccrual {
                    installment_number: inst.number,
                    date: day,
                    days_late: (day - inst.due_date).num_days(),
                    base,
                    amount,
                });
                inst.penalty_accrued += amount;
                accrued_total += amount;
            }
            day += Duration::days(1);
        }

        inst.penalty_accrued_through = Some(as_of);
    }

    let accrued_this_run: Money = new_accruals.iter().map(|a| a.amount).sum();
    let output = AccrualOutput {
        as_of,
        new_accruals,
        accrued_this_run,
        penalty_balance_after: loan.penalty_outstanding(),
        ceiling,
        capped,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "daily_rate": config.daily_rate.to_string(),
        "ceiling_pct": config.ceiling_pct.to_string(),
        "grace_days": config.grace_days,
        "compound": config.compound,
    });

    Ok(with_metadata(
        "Daily Penalty Accrual (watermarked, ceiling-capped)",
        &assumptions,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_config(config: &PenaltyConfig) -> MicrolendResult<()> {
    if config.daily_rate < Decimal::ZERO {
        return Err(MicrolendError::InvalidInput {
            field: "daily_rate".into(),
            reason: "Daily penalty rate cannot be negative.".into(),
        });
    }
    if config.ceiling_pct < Decimal::ZERO {
        return Err(MicrolendError::InvalidInput {
            field: "ceiling_pct".into(),
            reason: "Penalty ceiling cannot be negative.".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
