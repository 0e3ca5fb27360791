pub mod effective_rate;
pub mod schedule;
