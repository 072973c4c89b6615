//! A scripted [`ChainOracle`] for tests.
//!
//! Each transaction hash has a queue of answers. Every query pops the next one, and the last answer repeats forever.
//! Hashes without a script answer [`ChainTxStatus::Pending`].
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use crate::{
    db_types::{ChainId, TxHash},
    traits::{ChainOracle, ChainTxStatus},
};

#[derive(Debug, Clone, Default)]
pub struct MockChainOracle {
    scripts: Arc<Mutex<HashMap<TxHash, VecDeque<ChainTxStatus>>>>,
    queries: Arc<Mutex<HashMap<TxHash, usize>>>,
    total: Arc<AtomicUsize>,
    latency: Option<Duration>,
}

impl MockChainOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every query sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replaces the script for `tx_hash`.
    pub fn script(&self, tx_hash: &TxHash, answers: &[ChainTxStatus]) {
        let mut scripts = self.scripts.lock().expect("oracle script lock poisoned");
        scripts.insert(tx_hash.clone(), answers.iter().copied().collect());
    }

    pub fn set_status(&self, tx_hash: &TxHash, status: ChainTxStatus) {
        self.script(tx_hash, &[status]);
    }

    pub fn query_count(&self, tx_hash: &TxHash) -> usize {
        self.queries.lock().expect("oracle query lock poisoned").get(tx_hash).copied().unwrap_or_default()
    }

    pub fn total_queries(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    fn next_answer(&self, tx_hash: &TxHash) -> ChainTxStatus {
        *self.queries.lock().expect("oracle query lock poisoned").entry(tx_hash.clone()).or_default() += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts.lock().expect("oracle script lock poisoned");
        match scripts.get_mut(tx_hash) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(ChainTxStatus::Pending),
            Some(queue) => queue.front().copied().unwrap_or(ChainTxStatus::Pending),
            None => ChainTxStatus::Pending,
        }
    }
}

impl ChainOracle for MockChainOracle {
    async fn query_status(&self, _chain_id: ChainId, tx_hash: &TxHash) -> ChainTxStatus {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.next_answer(tx_hash)
    }
}
