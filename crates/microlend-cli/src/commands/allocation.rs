use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use microlend_core::allocation::waterfall::{
    self, AllocationInput, BucketBalances, OverpaymentPolicy,
};

use crate::input;

/// Arguments for payment allocation
#[derive(Args)]
pub struct AllocateArgs {
    /// Path to JSON or YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Payment amount to distribute
    #[arg(long)]
    pub amount: Option<Decimal>,

    /// Outstanding penalty balance
    #[arg(long, default_value = "0")]
    pub penalty: Decimal,

    /// Outstanding interest balance
    #[arg(long, default_value = "0")]
    pub interest: Decimal,

    /// Outstanding insurance balance
    #[arg(long, default_value = "0")]
    pub insurance: Decimal,

    /// Outstanding fee balance
    #[arg(long, default_value = "0")]
    pub fee: Decimal,

    /// Outstanding capital balance
    #[arg(long, default_value = "0")]
    pub capital: Decimal,

    /// Overpayment policy: reject or prepayment
    #[arg(long, default_value = "prepayment")]
    pub policy: String,
}

pub fn run_allocate(args: AllocateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let allocation_input: AllocationInput = if let Some(ref path) = args.input {
        input::file::read_typed(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        AllocationInput {
            amount: args
                .amount
                .ok_or("--amount is required (or provide --input)")?,
            balances: BucketBalances {
                penalty: args.penalty,
                interest: args.interest,
                insurance: args.insurance,
                fee: args.fee,
                capital: args.capital,
            },
            policy: parse_policy(&args.policy)?,
        }
    };

    let result = waterfall::allocate_payment(&allocation_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn parse_policy(s: &str) -> Result<OverpaymentPolicy, Box<dyn std::error::Error>> {
    match s.to_ascii_lowercase().as_str() {
        "reject" => Ok(OverpaymentPolicy::Reject),
        "prepayment" | "advance" => Ok(OverpaymentPolicy::Prepayment),
        other => Err(format!("Unknown overpayment policy '{other}'").into()),
    }
}
