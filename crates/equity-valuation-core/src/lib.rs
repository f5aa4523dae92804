pub mod error;
pub mod time_value;
pub mod types;

#[cfg(feature = "valuation")]
pub mod valuation;

#[cfg(feature = "pe")]
pub mod pe;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

pub use error::ValuationError;
pub use types::*;

/// Standard result type for all equity-valuation operations
pub type ValuationResult<T> = Result<T, ValuationError>;
