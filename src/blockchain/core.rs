// core.rs splits the ledger (chain + pending pool) from chain validation.
pub mod chain;
pub mod validation;

pub use chain::*;
pub use validation::*;
