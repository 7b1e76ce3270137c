/*
 * eth_call-backed implementation of every chain source
 */

use super::{AllowanceSource, CurveSource, ReserveSource, TaxRateSource};
use crate::calls::{abi::encode_call, Deployment};
use crate::curve::CurveState;
use crate::models::{Asset, Authorization, Bps, PoolKey, ReserveSnapshot, Result, SwaplineError};
use crate::rpc::RpcClient;
use async_trait::async_trait;
use ethers::abi::{decode, ParamType, Token};
use ethers::types::{Address, U256};
use std::sync::Arc;

pub struct ChainReader {
    rpc: Arc<RpcClient>,
    deployment: Deployment,
}

impl ChainReader {
    #[must_use]
    pub fn new(rpc: Arc<RpcClient>, deployment: Deployment) -> Self {
        Self { rpc, deployment }
    }

    async fn read_words(&self, to: Address, signature: &str, params: &[Token], words: usize) -> Result<Option<Vec<U256>>> {
        let result = self.rpc.call(to, encode_call(signature, params), signature).await?;
        if result.is_empty() {
            return Ok(None);
        }
        if result.len() < words * 32 {
            return Err(SwaplineError::ContractError(format!(
                "Invalid {signature} response: {} bytes",
                result.len()
            )));
        }

        let kinds = vec![ParamType::Uint(256); words];
        let tokens = decode(&kinds, &result)
            .map_err(|e| SwaplineError::ContractError(format!("Failed to decode {signature}: {e}")))?;
        Ok(Some(tokens.into_iter().filter_map(Token::into_uint).collect()))
    }
}

#[async_trait]
impl ReserveSource for ChainReader {
    async fn reserves(&self, key: &PoolKey) -> Result<Option<ReserveSnapshot>> {
        let words = self
            .read_words(self.deployment.amm, "pools(uint256)", &[Token::Uint(key.pool_id())], 2)
            .await?;
        Ok(words.map(|w| ReserveSnapshot::new(w[0], w[1])))
    }
}

#[async_trait]
impl AllowanceSource for ChainReader {
    async fn authorization(&self, owner: Address, spender: Address, asset: &Asset) -> Result<Option<Authorization>> {
        let params = [Token::Address(owner), Token::Address(spender)];
        match asset {
            Asset::Native => Ok(None),
            Asset::Erc20 { address } => {
                let words = self
                    .read_words(*address, "allowance(address,address)", &params, 1)
                    .await?;
                Ok(words.map(|w| Authorization::Allowance(w[0])))
            }
            Asset::Erc6909 { contract, .. } => {
                let words = self
                    .read_words(*contract, "isOperator(address,address)", &params, 1)
                    .await?;
                Ok(words.map(|w| Authorization::Operator(!w[0].is_zero())))
            }
        }
    }
}

#[async_trait]
impl TaxRateSource for ChainReader {
    async fn tax_bps(&self, key: &PoolKey) -> Result<Option<Bps>> {
        let words = self
            .read_words(self.deployment.tax_router, "taxBps(uint256)", &[Token::Uint(key.pool_id())], 1)
            .await?;
        words
            .map(|w| {
                if w[0] > U256::from(Bps::MAX) {
                    return Err(SwaplineError::ContractError(format!("Tax rate out of range: {}", w[0])));
                }
                Ok(w[0].low_u32())
            })
            .transpose()
    }
}

#[async_trait]
impl CurveSource for ChainReader {
    /// A sale that was never opened reads back as all zeros.
    async fn curve_state(&self, coin_id: U256) -> Result<Option<CurveState>> {
        let words = self
            .read_words(self.deployment.curve, "sales(uint256)", &[Token::Uint(coin_id)], 3)
            .await?;
        Ok(words
            .filter(|w| w.iter().any(|word| !word.is_zero()))
            .map(|w| CurveState::from_packed(w[0], w[1], w[2])))
    }
}
