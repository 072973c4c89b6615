use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use log::*;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::{
    config::ChainRpcConfig,
    data_objects::{JsonRpcRequest, JsonRpcResponse, ReceiptStatus, TransactionReceipt},
    helpers::parse_hex_quantity,
    ChainRpcError,
};

#[derive(Clone)]
pub struct ChainRpcApi {
    config: ChainRpcConfig,
    client: Arc<Client>,
    next_id: Arc<AtomicU64>,
}

impl Debug for ChainRpcApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChainRpcApi ({} chains)", self.config.endpoints.len())
    }
}

impl ChainRpcApi {
    pub fn new(config: ChainRpcConfig) -> Result<Self, ChainRpcError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ChainRpcError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client), next_id: Arc::new(AtomicU64::new(1)) })
    }

    pub fn config(&self) -> &ChainRpcConfig {
        &self.config
    }

    pub fn is_configured(&self, chain_id: u64) -> bool {
        self.config.endpoint(chain_id).is_some()
    }

    /// Issues a single JSON-RPC call. A JSON `null` result is returned as `Ok(None)`.
    pub async fn rpc_call<T: DeserializeOwned>(
        &self,
        chain_id: u64,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, ChainRpcError> {
        let url = self.config.endpoint(chain_id).ok_or(ChainRpcError::UnknownChain(chain_id))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest { jsonrpc: "2.0", id, method, params };
        trace!("🔗️ Sending {method} (#{id}) to chain {chain_id}");
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainRpcError::RequestError(e.without_url().to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ChainRpcError::HttpError { status, message });
        }
        let body = response
            .json::<JsonRpcResponse<T>>()
            .await
            .map_err(|e| ChainRpcError::JsonError(e.without_url().to_string()))?;
        if let Some(err) = body.error {
            return Err(ChainRpcError::NodeError { code: err.code, message: err.message });
        }
        Ok(body.result)
    }

    pub async fn block_number(&self, chain_id: u64) -> Result<u64, ChainRpcError> {
        let height = self
            .rpc_call::<String>(chain_id, "eth_blockNumber", json!([]))
            .await?
            .ok_or_else(|| ChainRpcError::EmptyResponse("eth_blockNumber".into()))?;
        parse_hex_quantity(&height)
    }

    pub async fn transaction_receipt(
        &self,
        chain_id: u64,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>, ChainRpcError> {
        self.rpc_call::<TransactionReceipt>(chain_id, "eth_getTransactionReceipt", json!([tx_hash])).await
    }

    /// Looks up the receipt for `tx_hash` and, if it has been mined, how deep it is buried.
    pub async fn transaction_status(&self, chain_id: u64, tx_hash: &str) -> Result<ReceiptStatus, ChainRpcError> {
        let Some(receipt) = self.transaction_receipt(chain_id, tx_hash).await? else {
            debug!("🔗️ No receipt yet for {tx_hash} on chain {chain_id}");
            return Ok(ReceiptStatus::NotFound);
        };
        let Some(block) = receipt.block_number.as_deref() else {
            return Ok(ReceiptStatus::NotFound);
        };
        let block = parse_hex_quantity(block)?;
        let success = match receipt.status.as_deref() {
            Some(status) => parse_hex_quantity(status)? == 1,
            None => {
                warn!("🔗️ Receipt for {tx_hash} has no status field. Treating it as successful.");
                true
            },
        };
        let head = self.block_number(chain_id).await?;
        let confirmations = head.saturating_sub(block) + 1;
        debug!("🔗️ {tx_hash} on chain {chain_id}: success={success}, confirmations={confirmations}");
        Ok(ReceiptStatus::Included { success, confirmations })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse_endpoints;

    #[tokio::test]
    async fn unknown_chain_is_rejected_before_any_request() {
        let config = ChainRpcConfig { endpoints: parse_endpoints("1=http://127.0.0.1:1"), ..Default::default() };
        let api = ChainRpcApi::new(config).unwrap();
        assert!(api.is_configured(1));
        let err = api.transaction_status(5, "0xabc").await.unwrap_err();
        assert!(matches!(err, ChainRpcError::UnknownChain(5)));
    }
}
