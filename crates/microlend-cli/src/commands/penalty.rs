use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use microlend_core::loan::LoanAccount;
use microlend_core::penalty::accrual::{self, PenaltyConfig};

use crate::input;

/// Arguments for penalty accrual
#[derive(Args)]
pub struct PenaltyArgs {
    /// Path to JSON or YAML file holding the loan state (and optionally
    /// "config" and "as_of"); flags override file values
    #[arg(long)]
    pub input: Option<String>,

    /// Daily penalty rate as a decimal (0.01 = 1%/day)
    #[arg(long)]
    pub daily_rate: Option<Decimal>,

    /// Penalty ceiling as a fraction of remaining capital
    #[arg(long)]
    pub ceiling_pct: Option<Decimal>,

    /// Days past due before penalties start
    #[arg(long)]
    pub grace_days: Option<u32>,

    /// Compound unpaid penalty into the daily base
    #[arg(long)]
    pub compound: bool,

    /// Report date (YYYY-MM-DD)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

/// File shape: the loan plus optional embedded config and report date.
#[derive(Deserialize)]
struct PenaltyFile {
    loan: LoanAccount,
    #[serde(default)]
    config: Option<PenaltyConfig>,
    #[serde(default)]
    as_of: Option<NaiveDate>,
}

pub fn run_penalty(args: PenaltyArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let file: PenaltyFile = if let Some(ref path) = args.input {
        input::file::read_typed(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("penalty accrual needs loan state: provide --input or pipe JSON".into());
    };

    let mut loan = file.loan;
    let config = match (file.config, args.daily_rate, args.ceiling_pct) {
        (Some(mut config), daily, ceiling) => {
            if let Some(d) = daily {
                config.daily_rate = d;
            }
            if let Some(c) = ceiling {
                config.ceiling_pct = c;
            }
            if let Some(g) = args.grace_days {
                config.grace_days = g;
            }
            if args.compound {
                config.compound = true;
            }
            config
        }
        (None, Some(daily), Some(ceiling)) => PenaltyConfig {
            daily_rate: daily,
            ceiling_pct: ceiling,
            grace_days: args.grace_days.unwrap_or(0),
            compound: args.compound,
        },
        _ => {
            return Err(
                "penalty config missing: embed \"config\" in the file or pass --daily-rate and --ceiling-pct"
                    .into(),
            )
        }
    };

    let as_of = args
        .as_of
        .or(file.as_of)
        .ok_or("--as-of is required (or embed \"as_of\" in the file)")?;

    let result = accrual::accrue_penalties(&mut loan, &config, as_of)?;

    // Return the accrual report together with the updated loan state so the
    // caller can persist it.
    let mut value = serde_json::to_value(result)?;
    if let Value::Object(ref mut map) = value {
        map.insert("loan".into(), serde_json::to_value(&loan)?);
    }
    Ok(value)
}
