// Thin re-export module: implementation lives in `blockchain/core.rs`, split
// into the ledger itself and the chain validator.

pub mod core;
pub use core::*;
