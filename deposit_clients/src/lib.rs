//! HTTP clients for the two deposit feeds the reconciliation engine consumes: the exchange
//! deposit-history API and the blockchain explorer. Both return thin wire records; the engine
//! works with its own normalised types, and the daemon owns the conversion.

mod config;
mod data_objects;
mod error;
mod exchange_api;
mod explorer_api;

pub use config::{ExchangeConfig, ExplorerConfig};
pub use data_objects::{ConfirmationRequirement, DepositRecord, TxRecord};
pub use error::DepositClientError;
pub use exchange_api::ExchangeApi;
pub use explorer_api::ExplorerApi;
