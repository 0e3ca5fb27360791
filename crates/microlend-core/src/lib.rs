pub mod error;
pub mod loan;
pub mod types;

#[cfg(feature = "amortization")]
pub mod amortization;

#[cfg(feature = "penalty")]
pub mod penalty;

#[cfg(feature = "allocation")]
pub mod allocation;

#[cfg(feature = "batch")]
pub mod batch;

#[cfg(feature = "risk")]
pub mod risk;

#[cfg(feature = "accounting")]
pub mod accounting;

pub use error::MicrolendError;
pub use types::*;

/// Standard result type for all loan servicing operations
pub type MicrolendResult<T> = Result<T, MicrolendError>;
