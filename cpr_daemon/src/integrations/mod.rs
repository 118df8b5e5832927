//! Glue between the HTTP deposit clients and the engine's source traits.

mod deposit_sources;

pub use deposit_sources::{ExchangeDepositSource, ExplorerTxVerifier};
