/*
 * Read-only chain collaborators feeding the trade builder
 */

mod reader;

pub use reader::ChainReader;

use crate::curve::CurveState;
use crate::models::{Asset, Authorization, Bps, PoolKey, ReserveSnapshot, Result};
use async_trait::async_trait;
use ethers::types::{Address, U256};

/// `Ok(None)` means the pool is unknown to the AMM.
#[async_trait]
pub trait ReserveSource: Send + Sync {
    async fn reserves(&self, key: &PoolKey) -> Result<Option<ReserveSnapshot>>;
}

#[async_trait]
pub trait AllowanceSource: Send + Sync {
    async fn authorization(&self, owner: Address, spender: Address, asset: &Asset) -> Result<Option<Authorization>>;
}

/// Tax rates may change between queries; nothing here caches them.
#[async_trait]
pub trait TaxRateSource: Send + Sync {
    async fn tax_bps(&self, key: &PoolKey) -> Result<Option<Bps>>;
}

#[async_trait]
pub trait CurveSource: Send + Sync {
    async fn curve_state(&self, coin_id: U256) -> Result<Option<CurveState>>;
}
