mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::allocation::AllocateArgs;
use commands::amortization::{EffectiveRateArgs, ScheduleArgs};
use commands::batch::BatchDebitArgs;
use commands::penalty::PenaltyArgs;
use commands::risk::DtiArgs;

/// Microfinance loan servicing calculations
#[derive(Parser)]
#[command(
    name = "mlend",
    version,
    about = "Microfinance loan servicing calculations",
    long_about = "A CLI for microfinance loan servicing with decimal precision. \
                  Generates amortization schedules, accrues arrears penalties, \
                  allocates repayments across balance categories, previews and \
                  executes automatic savings debits, and assesses debt-to-income \
                  at origination."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an amortization schedule from loan terms
    Schedule(ScheduleArgs),
    /// Effective annual rate of a repayment stream (all-in cost)
    EffectiveRate(EffectiveRateArgs),
    /// Accrue daily penalties on overdue installments
    Penalty(PenaltyArgs),
    /// Distribute a payment across balance categories in waterfall order
    Allocate(AllocateArgs),
    /// Preview or execute the automatic savings debit batch
    BatchDebit(BatchDebitArgs),
    /// Debt-to-income assessment for a proposed loan
    Dti(DtiArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Schedule(args) => commands::amortization::run_schedule(args),
        Commands::EffectiveRate(args) => commands::amortization::run_effective_rate(args),
        Commands::Penalty(args) => commands::penalty::run_penalty(args),
        Commands::Allocate(args) => commands::allocation::run_allocate(args),
        Commands::BatchDebit(args) => commands::batch::run_batch_debit(args),
        Commands::Dti(args) => commands::risk::run_dti(args),
        Commands::Version => {
            println!("mlend {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
