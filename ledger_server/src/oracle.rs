use chain_rpc::{ChainRpcApi, ReceiptStatus};
use ledger_engine::{
    db_types::{ChainId, TxHash},
    ChainOracle,
    ChainTxStatus,
};
use log::*;

/// A [`ChainOracle`] that asks EVM JSON-RPC nodes for transaction receipts.
#[derive(Debug, Clone)]
pub struct RpcChainOracle {
    api: ChainRpcApi,
    required_confirmations: u64,
}

impl RpcChainOracle {
    pub fn new(api: ChainRpcApi) -> Self {
        let required_confirmations = api.config().required_confirmations;
        Self { api, required_confirmations }
    }
}

impl ChainOracle for RpcChainOracle {
    async fn query_status(&self, chain_id: ChainId, tx_hash: &TxHash) -> ChainTxStatus {
        match self.api.transaction_status(chain_id.value(), tx_hash.as_str()).await {
            Ok(status) => status_from_receipt(status, self.required_confirmations),
            Err(e) => {
                warn!("🔗️ Could not fetch the status of {tx_hash} on chain {chain_id}: {e}");
                ChainTxStatus::Unknown
            },
        }
    }
}

/// A receipt only becomes terminal once it is buried under `required` blocks. This applies to reverted transactions
/// as well, since a reorg can put the same transaction into a block where it succeeds.
pub fn status_from_receipt(status: ReceiptStatus, required: u64) -> ChainTxStatus {
    match status {
        ReceiptStatus::NotFound => ChainTxStatus::Pending,
        ReceiptStatus::Included { confirmations, .. } if confirmations < required => ChainTxStatus::Pending,
        ReceiptStatus::Included { success: true, .. } => ChainTxStatus::Confirmed,
        ReceiptStatus::Included { success: false, .. } => ChainTxStatus::Failed,
    }
}

#[cfg(test)]
mod test {
    use chain_rpc::{parse_endpoints, ChainRpcConfig};

    use super::*;

    #[test]
    fn receipts_map_to_chain_status() {
        assert_eq!(status_from_receipt(ReceiptStatus::NotFound, 12), ChainTxStatus::Pending);
        let shallow = ReceiptStatus::Included { success: true, confirmations: 3 };
        assert_eq!(status_from_receipt(shallow, 12), ChainTxStatus::Pending);
        let deep = ReceiptStatus::Included { success: true, confirmations: 12 };
        assert_eq!(status_from_receipt(deep, 12), ChainTxStatus::Confirmed);
        let reverted = ReceiptStatus::Included { success: false, confirmations: 40 };
        assert_eq!(status_from_receipt(reverted, 12), ChainTxStatus::Failed);
        let shallow_revert = ReceiptStatus::Included { success: false, confirmations: 1 };
        assert_eq!(status_from_receipt(shallow_revert, 12), ChainTxStatus::Pending);
    }

    #[tokio::test]
    async fn rpc_errors_are_unknown() {
        let config = ChainRpcConfig { endpoints: parse_endpoints("1=http://127.0.0.1:1"), ..Default::default() };
        let oracle = RpcChainOracle::new(ChainRpcApi::new(config).unwrap());
        let hash: TxHash = "0xabc".parse().unwrap();
        // No endpoint for chain 7
        assert_eq!(oracle.query_status(ChainId::new(7).unwrap(), &hash).await, ChainTxStatus::Unknown);
        // Nothing listens on port 1
        assert_eq!(oracle.query_status(ChainId::new(1).unwrap(), &hash).await, ChainTxStatus::Unknown);
    }
}
