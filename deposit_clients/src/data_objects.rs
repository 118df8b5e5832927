use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One deposit row from the exchange deposit-history API. Amounts cross the wire as decimal
/// strings, exactly as the exchange sends them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRecord {
    #[serde(alias = "txid")]
    pub tx_id: String,
    pub amount: String,
    pub currency: String,
    pub network: String,
    #[serde(default)]
    pub confirmations: i64,
    pub timestamp: DateTime<Utc>,
}

/// The exchange's confirmation policy for a currency/network pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRequirement {
    pub currency: String,
    pub network: String,
    pub required_confirmations: i64,
}

/// One transaction as the blockchain explorer reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxRecord {
    pub tx_hash: String,
    pub amount: String,
    pub to_address: String,
    #[serde(default)]
    pub confirmations: i64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deposit_record_deserializes_from_exchange_json() {
        let json = r#"{
            "txid": "9a2f77c1",
            "amount": "100.05",
            "currency": "USDT",
            "network": "TRC20",
            "confirmations": 3,
            "timestamp": "2024-06-01T12:30:00Z"
        }"#;
        let record: DepositRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.tx_id, "9a2f77c1");
        assert_eq!(record.amount, "100.05");
        assert_eq!(record.confirmations, 3);
    }

    #[test]
    fn missing_confirmations_defaults_to_zero() {
        let json = r#"{
            "tx_id": "feed01",
            "amount": "0.5",
            "currency": "BTC",
            "network": "BTC",
            "timestamp": "2024-06-01T12:30:00Z"
        }"#;
        let record: DepositRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.confirmations, 0);
    }

    #[test]
    fn tx_record_deserializes_from_explorer_json() {
        let json = r#"{
            "tx_hash": "0xabc123",
            "amount": "1.25",
            "to_address": "0xSharedWallet",
            "confirmations": 14,
            "timestamp": "2024-06-02T08:00:00Z"
        }"#;
        let record: TxRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.to_address, "0xSharedWallet");
        assert_eq!(record.confirmations, 14);
    }
}
