use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use microlend_core::risk::dti::{self, DtiInput};

use crate::commands::amortization::{parse_currency, parse_frequency};
use crate::input;

/// Arguments for debt-to-income assessment
#[derive(Args)]
pub struct DtiArgs {
    /// Path to JSON or YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Gross monthly income
    #[arg(long)]
    pub monthly_income: Option<Decimal>,

    /// Existing monthly debt service
    #[arg(long, default_value = "0")]
    pub monthly_obligations: Decimal,

    /// Installment of the proposed loan, per payment period
    #[arg(long)]
    pub installment: Option<Decimal>,

    /// Payment frequency of the proposed loan
    #[arg(long, default_value = "monthly")]
    pub frequency: String,

    /// Maximum DTI for approval (0.40 = 40%)
    #[arg(long, default_value = "0.4")]
    pub max_dti: Decimal,

    /// Nominal annual rate of the proposed loan
    #[arg(long)]
    pub annual_rate: Option<Decimal>,

    /// Term of the proposed loan in installments
    #[arg(long)]
    pub installments: Option<u32>,

    /// Currency code
    #[arg(long, default_value = "XOF")]
    pub currency: String,
}

pub fn run_dti(args: DtiArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let dti_input: DtiInput = if let Some(ref path) = args.input {
        input::file::read_typed(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        DtiInput {
            monthly_income: args
                .monthly_income
                .ok_or("--monthly-income is required (or provide --input)")?,
            monthly_obligations: args.monthly_obligations,
            proposed_installment: args
                .installment
                .ok_or("--installment is required (or provide --input)")?,
            frequency: parse_frequency(&args.frequency)?,
            max_dti: args.max_dti,
            annual_rate: args
                .annual_rate
                .ok_or("--annual-rate is required (or provide --input)")?,
            installments: args
                .installments
                .ok_or("--installments is required (or provide --input)")?,
            currency: parse_currency(&args.currency),
        }
    };

    let result = dti::assess_dti(&dti_input)?;
    Ok(serde_json::to_value(result)?)
}
