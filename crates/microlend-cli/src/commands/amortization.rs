use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use microlend_core::amortization::effective_rate::{self, EffectiveRateInput};
use microlend_core::amortization::schedule::{self, AmortizationMethod, ScheduleInput};
use microlend_core::types::{Currency, PaymentFrequency};

use crate::input;

/// Arguments for amortization schedule generation
#[derive(Args)]
pub struct ScheduleArgs {
    /// Path to JSON or YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Loan principal
    #[arg(long)]
    pub principal: Option<Decimal>,

    /// Nominal annual rate as a decimal (0.12 = 12%)
    #[arg(long, alias = "rate")]
    pub annual_rate: Option<Decimal>,

    /// Number of installments
    #[arg(long)]
    pub installments: Option<u32>,

    /// Payment frequency: daily, weekly, biweekly, monthly, quarterly, semiannual, annual
    #[arg(long, default_value = "monthly")]
    pub frequency: String,

    /// Disbursement date (YYYY-MM-DD)
    #[arg(long)]
    pub disbursement_date: Option<NaiveDate>,

    /// First due date (defaults to one period after disbursement)
    #[arg(long)]
    pub first_due_date: Option<NaiveDate>,

    /// Leading interest-only periods
    #[arg(long, default_value_t = 0)]
    pub grace_periods: u32,

    /// Repayment method: declining, straight-line, flat, interest-only
    #[arg(long, default_value = "declining")]
    pub method: String,

    /// Total fees distributed across installments
    #[arg(long, default_value = "0")]
    pub fee_total: Decimal,

    /// Total insurance premium distributed across installments
    #[arg(long, default_value = "0")]
    pub insurance_total: Decimal,

    /// Currency code (XOF, XAF, NGN, GHS, EUR, USD, GBP)
    #[arg(long, default_value = "XOF")]
    pub currency: String,
}

/// Arguments for effective rate calculation
#[derive(Args)]
pub struct EffectiveRateArgs {
    /// Path to JSON or YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Loan principal
    #[arg(long)]
    pub principal: Option<Decimal>,

    /// Fees collected at disbursement
    #[arg(long, default_value = "0")]
    pub upfront_fees: Decimal,

    /// Constant installment amount (repeated --count times)
    #[arg(long)]
    pub payment: Option<Decimal>,

    /// Number of installments when using --payment
    #[arg(long)]
    pub count: Option<u32>,

    /// Payment frequency
    #[arg(long, default_value = "monthly")]
    pub frequency: String,
}

pub fn run_schedule(args: ScheduleArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let schedule_input: ScheduleInput = if let Some(ref path) = args.input {
        input::file::read_typed(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        ScheduleInput {
            loan_id: None,
            principal: args
                .principal
                .ok_or("--principal is required (or provide --input)")?,
            annual_rate: args
                .annual_rate
                .ok_or("--annual-rate is required (or provide --input)")?,
            installments: args
                .installments
                .ok_or("--installments is required (or provide --input)")?,
            frequency: parse_frequency(&args.frequency)?,
            disbursement_date: args
                .disbursement_date
                .ok_or("--disbursement-date is required (or provide --input)")?,
            first_due_date: args.first_due_date,
            grace_periods: args.grace_periods,
            method: parse_method(&args.method)?,
            fee_total: args.fee_total,
            insurance_total: args.insurance_total,
            currency: parse_currency(&args.currency),
        }
    };

    let result = schedule::build_schedule(&schedule_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_effective_rate(args: EffectiveRateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let rate_input: EffectiveRateInput = if let Some(ref path) = args.input {
        input::file::read_typed(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let payment = args
            .payment
            .ok_or("--payment is required (or provide --input)")?;
        let count = args
            .count
            .ok_or("--count is required when using --payment")?;
        EffectiveRateInput {
            principal: args
                .principal
                .ok_or("--principal is required (or provide --input)")?,
            upfront_fees: args.upfront_fees,
            payments: vec![payment; count as usize],
            frequency: parse_frequency(&args.frequency)?,
            guess: None,
        }
    };

    let result = effective_rate::effective_rate(&rate_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn parse_frequency(s: &str) -> Result<PaymentFrequency, Box<dyn std::error::Error>> {
    match s.to_ascii_lowercase().as_str() {
        "daily" => Ok(PaymentFrequency::Daily),
        "weekly" => Ok(PaymentFrequency::Weekly),
        "biweekly" => Ok(PaymentFrequency::Biweekly),
        "monthly" => Ok(PaymentFrequency::Monthly),
        "quarterly" => Ok(PaymentFrequency::Quarterly),
        "semiannual" => Ok(PaymentFrequency::SemiAnnual),
        "annual" => Ok(PaymentFrequency::Annual),
        other => Err(format!("Unknown frequency '{other}'").into()),
    }
}

pub fn parse_currency(s: &str) -> Currency {
    match s.to_ascii_uppercase().as_str() {
        "XOF" => Currency::XOF,
        "XAF" => Currency::XAF,
        "NGN" => Currency::NGN,
        "GHS" => Currency::GHS,
        "EUR" => Currency::EUR,
        "USD" => Currency::USD,
        "GBP" => Currency::GBP,
        other => Currency::Other(other.to_string()),
    }
}

fn parse_method(s: &str) -> Result<AmortizationMethod, Box<dyn std::error::Error>> {
    match s.to_ascii_lowercase().as_str() {
        "declining" | "declining-balance" | "annuity" => Ok(AmortizationMethod::DecliningBalance),
        "straight-line" | "linear" => Ok(AmortizationMethod::StraightLine),
        "flat" => Ok(AmortizationMethod::Flat),
        "interest-only" | "bullet" => Ok(AmortizationMethod::InterestOnly),
        other => Err(format!("Unknown amortization method '{other}'").into()),
    }
}
