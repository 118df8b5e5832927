mod coin_amount;
mod helpers;

pub mod op;
mod secret;

pub use coin_amount::{CoinAmount, CoinAmountError, ATOMS_PER_COIN, COIN_DECIMALS};
pub use helpers::parse_boolean_flag;
pub use secret::Secret;
