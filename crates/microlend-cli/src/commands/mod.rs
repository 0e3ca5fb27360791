pub mod allocation;
pub mod amortization;
pub mod batch;
pub mod penalty;
pub mod risk;
