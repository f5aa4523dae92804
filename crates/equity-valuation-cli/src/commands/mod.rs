pub mod monte_carlo;
pub mod pe;
pub mod valuation;
