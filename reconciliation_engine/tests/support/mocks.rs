use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
    },
};

use chrono::{DateTime, Utc};
use reconciliation_engine::{
    db_types::{Deposit, TxDetails},
    AdapterError,
    DepositSource,
    TxVerifier,
};

/// An in-memory exchange feed. Tests push deposits in, flip the offline flag, and adjust
/// confirmation counts between poll cycles.
#[derive(Clone)]
pub struct MockDepositSource {
    deposits: Arc<Mutex<Vec<Deposit>>>,
    required_confirmations: Arc<Mutex<i64>>,
    offline: Arc<AtomicBool>,
}

impl Default for MockDepositSource {
    fn default() -> Self {
        Self {
            deposits: Arc::new(Mutex::new(Vec::new())),
            required_confirmations: Arc::new(Mutex::new(1)),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl MockDepositSource {
    pub fn with_required_confirmations(required: i64) -> Self {
        let source = Self::default();
        *source.required_confirmations.lock().unwrap() = required;
        source
    }

    pub fn push(&self, deposit: Deposit) {
        self.deposits.lock().unwrap().push(deposit);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_confirmations(&self, tx_hash: &str, confirmations: i64) {
        let mut deposits = self.deposits.lock().unwrap();
        if let Some(deposit) = deposits.iter_mut().find(|d| d.tx_hash == tx_hash) {
            deposit.confirmations = confirmations;
        }
    }
}

impl DepositSource for MockDepositSource {
    async fn deposits(
        &self,
        currency: &str,
        network: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Deposit>, AdapterError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AdapterError::Unreachable("mock exchange is offline".to_string()));
        }
        let deposits = self.deposits.lock().unwrap();
        Ok(deposits
            .iter()
            .filter(|d| d.currency == currency && d.network == network && d.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn required_confirmations(&self, _currency: &str, _network: &str) -> Result<i64, AdapterError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AdapterError::Unreachable("mock exchange is offline".to_string()));
        }
        Ok(*self.required_confirmations.lock().unwrap())
    }
}

/// An in-memory blockchain explorer keyed by tx hash.
#[derive(Clone, Default)]
pub struct MockTxVerifier {
    transactions: Arc<Mutex<HashMap<String, TxDetails>>>,
}

impl MockTxVerifier {
    pub fn insert(&self, tx: TxDetails) {
        self.transactions.lock().unwrap().insert(tx.tx_hash.clone(), tx);
    }
}

impl TxVerifier for MockTxVerifier {
    async fn verify_transaction(
        &self,
        tx_hash: &str,
        _currency: &str,
        _network: &str,
    ) -> Result<Option<TxDetails>, AdapterError> {
        Ok(self.transactions.lock().unwrap().get(tx_hash).cloned())
    }
}
