/*
 * JSON-RPC client used for read-only contract calls
 */

use crate::models::{Result, SwaplineError};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, Bytes, TransactionRequest};
use std::sync::Arc;
use tracing::debug;

pub struct RpcClient {
    provider: Arc<Provider<Http>>,
    chain_id: u64,
}

impl RpcClient {
    /// Connects and refuses endpoints serving a different chain.
    pub async fn new(rpc_url: &str, chain_id: u64) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| SwaplineError::RpcError(format!("Failed to create provider: {e}")))?;

        let chain = provider
            .get_chainid()
            .await
            .map_err(|e| SwaplineError::RpcError(format!("Failed to get chain ID: {e}")))?;

        if chain.as_u64() != chain_id {
            return Err(SwaplineError::RpcError(format!(
                "Chain ID mismatch: expected {}, got {}",
                chain_id,
                chain.as_u64()
            )));
        }

        Ok(Self {
            provider: Arc::new(provider),
            chain_id,
        })
    }

    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// `eth_call` against the latest block. `method` only labels errors.
    pub async fn call(&self, to: Address, data: Bytes, method: &str) -> Result<Bytes> {
        debug!(%method, to = ?to, "eth_call");

        let tx = TransactionRequest::new().to(to).data(data);
        self.provider
            .call(&tx.into(), None)
            .await
            .map_err(|e| SwaplineError::ContractError(format!("Failed to call {method}: {e}")))
    }
}
