//! Currency-class tables used by matching and settlement.

/// Currencies pegged to fiat. These match tightly; everything else gets a volatility buffer.
pub const STABLECOINS: [&str; 4] = ["USDT", "USDC", "DAI", "BUSD"];

/// Matching tolerance for stablecoin invoices, in basis points (0.1%).
pub const STABLECOIN_TOLERANCE_BPS: i64 = 10;
/// Matching tolerance for every other currency, in basis points (0.5%).
pub const VOLATILE_TOLERANCE_BPS: i64 = 50;

pub fn is_stablecoin(currency: &str) -> bool {
    STABLECOINS.iter().any(|c| currency.eq_ignore_ascii_case(c))
}

pub fn default_tolerance_bps(currency: &str) -> i64 {
    if is_stablecoin(currency) {
        STABLECOIN_TOLERANCE_BPS
    } else {
        VOLATILE_TOLERANCE_BPS
    }
}

/// Fallback confirmation thresholds, used when the exchange API cannot supply one for the
/// currency/network pair.
pub fn default_required_confirmations(network: &str) -> i64 {
    match network.to_ascii_uppercase().as_str() {
        "BTC" | "BITCOIN" => 2,
        "ETH" | "ERC20" | "ETHEREUM" => 12,
        "TRX" | "TRC20" | "TRON" => 19,
        "BSC" | "BEP20" => 15,
        "SOL" | "SOLANA" => 32,
        "MATIC" | "POLYGON" => 64,
        _ => 6,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stablecoin_classification() {
        assert!(is_stablecoin("USDT"));
        assert!(is_stablecoin("usdc"));
        assert!(!is_stablecoin("BTC"));
        assert_eq!(default_tolerance_bps("DAI"), STABLECOIN_TOLERANCE_BPS);
        assert_eq!(default_tolerance_bps("ETH"), VOLATILE_TOLERANCE_BPS);
    }

    #[test]
    fn confirmation_fallbacks() {
        assert_eq!(default_required_confirmations("TRC20"), 19);
        assert_eq!(default_required_confirmations("btc"), 2);
        assert_eq!(default_required_confirmations("UNKNOWN-NET"), 6);
    }
}
