use chrono::NaiveDate;
use clap::Args;
use serde::Deserialize;
use serde_json::Value;

use microlend_core::batch::debit_run::{self, BatchDebitInput, DebitPosition};

use crate::input;

/// Arguments for the automatic debit batch
#[derive(Args)]
pub struct BatchDebitArgs {
    /// Path to a JSON or YAML file with the run parameters and positions
    #[arg(long)]
    pub input: Option<String>,

    /// Processing date override (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Attempt number override (from the run ledger)
    #[arg(long)]
    pub attempt: Option<u32>,

    /// Post the debits; without this flag the run is a preview
    #[arg(long)]
    pub execute: bool,
}

/// File shape: run parameters plus the loan/savings positions to process.
#[derive(Deserialize)]
struct BatchFile {
    #[serde(flatten)]
    run: BatchDebitInput,
    positions: Vec<DebitPosition>,
}

pub fn run_batch_debit(args: BatchDebitArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut file: BatchFile = if let Some(ref path) = args.input {
        input::file::read_typed(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("batch debit needs positions: provide --input or pipe JSON".into());
    };

    if let Some(date) = args.date {
        file.run.processing_date = date;
    }
    if let Some(attempt) = args.attempt {
        file.run.attempt = attempt;
    }
    file.run.execute = args.execute;

    let result = debit_run::run_batch_debits(&file.run, &mut file.positions)?;

    let mut value = serde_json::to_value(result)?;
    if args.execute {
        // Executed runs return the mutated positions for persistence.
        if let Value::Object(ref mut map) = value {
            map.insert("positions".into(), serde_json::to_value(&file.positions)?);
        }
    }
    Ok(value)
}
