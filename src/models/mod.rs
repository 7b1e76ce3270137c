/*
 * Data models, error taxonomy and shared types for the pricing kernel
 */

use ethers::{
    abi::{encode, Token},
    types::{Address, Bytes, U256},
    utils::keccak256,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Basis points; 10000 bps = 100%.
pub type Bps = u32;

pub const BPS_DENOMINATOR: Bps = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub reserve0: U256,
    pub reserve1: U256,
}

impl ReserveSnapshot {
    #[must_use]
    pub fn new(reserve0: U256, reserve1: U256) -> Self {
        Self { reserve0, reserve1 }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reserve0.is_zero() || self.reserve1.is_zero()
    }

    /// Returns `(reserve_in, reserve_out)` for a swap in the given direction.
    #[must_use]
    pub fn oriented(&self, zero_for_one: bool) -> (U256, U256) {
        if zero_for_one {
            (self.reserve0, self.reserve1)
        } else {
            (self.reserve1, self.reserve0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Asset {
    Native,
    Erc20 { address: Address },
    Erc6909 { contract: Address, id: U256 },
}

impl Asset {
    #[must_use]
    pub fn from_parts(token: Address, id: U256) -> Self {
        if token.is_zero() {
            Asset::Native
        } else if id.is_zero() {
            Asset::Erc20 { address: token }
        } else {
            Asset::Erc6909 { contract: token, id }
        }
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }

    #[must_use]
    pub fn contract(&self) -> Option<Address> {
        match self {
            Asset::Native => None,
            Asset::Erc20 { address } => Some(*address),
            Asset::Erc6909 { contract, .. } => Some(*contract),
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Asset::Native => write!(f, "native"),
            Asset::Erc20 { address } => write!(f, "erc20:{address:?}"),
            Asset::Erc6909 { contract, id } => write!(f, "erc6909:{contract:?}/{id}"),
        }
    }
}

/// Identifies a two-sided pool. The native currency is `token == 0, id == 0`;
/// a non-zero `hook` marks a hook-taxed pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolKey {
    pub id0: U256,
    pub id1: U256,
    pub token0: Address,
    pub token1: Address,
    pub fee_bps: Bps,
    pub hook: Address,
}

impl PoolKey {
    #[must_use]
    pub fn asset0(&self) -> Asset {
        Asset::from_parts(self.token0, self.id0)
    }

    #[must_use]
    pub fn asset1(&self) -> Asset {
        Asset::from_parts(self.token1, self.id1)
    }

    #[must_use]
    pub fn is_taxed(&self) -> bool {
        !self.hook.is_zero()
    }

    /// `Some(zero_for_one)` when the pool trades `sell` for `buy`.
    #[must_use]
    pub fn direction(&self, sell: &Asset, buy: &Asset) -> Option<bool> {
        let (a0, a1) = (self.asset0(), self.asset1());
        if a0 == *sell && a1 == *buy {
            Some(true)
        } else if a1 == *sell && a0 == *buy {
            Some(false)
        } else {
            None
        }
    }

    #[must_use]
    pub fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Uint(self.id0),
            Token::Uint(self.id1),
            Token::Address(self.token0),
            Token::Address(self.token1),
            Token::Uint(self.fee_bps.into()),
            Token::Address(self.hook),
        ])
    }

    #[must_use]
    pub fn pool_id(&self) -> U256 {
        let encoded = encode(&[self.to_token()]);
        U256::from_big_endian(&keccak256(encoded))
    }
}

/// Authorization the owner of the sold asset has already granted the spender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Authorization {
    Allowance(U256),
    Operator(bool),
}

impl Authorization {
    #[must_use]
    pub fn covers(&self, required: U256) -> bool {
        match self {
            Authorization::Allowance(allowance) => *allowance >= required,
            Authorization::Operator(approved) => *approved,
        }
    }
}

/// One unsigned invocation, executed strictly in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "camelCase")]
pub enum TradeKind {
    ExactIn(U256),
    ExactOut(U256),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub kind: TradeKind,
    pub sell: Asset,
    pub buy: Asset,
    pub slippage_bps: Bps,
    pub recipient: Address,
    pub deadline: U256,
}

#[derive(Debug, Error)]
pub enum SwaplineError {
    #[error("Pool has no liquidity")]
    EmptyPool,

    #[error("Requested output {requested} exceeds available reserve {reserve}")]
    InsufficientLiquidity { requested: U256, reserve: U256 },

    #[error("Purchase of {requested} exceeds what the sale can still provide ({available})")]
    ExceedsSaleCap { requested: U256, available: U256 },

    #[error("Refund of {requested} exceeds what the sale can return ({available})")]
    InsufficientSaleHistory { requested: U256, available: U256 },

    #[error("Curve invariant violated: {0}")]
    NonMonotonicCurve(String),

    #[error("Missing reserves for pool {0:#x}")]
    MissingReserves(U256),

    #[error("Missing tax rate for hook-taxed pool {0:#x}")]
    MissingTaxRate(U256),

    #[error("Missing authorization data for {0}")]
    MissingAllowance(String),

    #[error("No route available: {0}")]
    NoRouteAvailable(String),

    #[error("Invalid basis points: {0}")]
    InvalidBps(Bps),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract interaction error: {0}")]
    ContractError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl SwaplineError {
    /// Stable label used for metrics and API payloads.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SwaplineError::EmptyPool => "empty_pool",
            SwaplineError::InsufficientLiquidity { .. } => "insufficient_liquidity",
            SwaplineError::ExceedsSaleCap { .. } => "exceeds_sale_cap",
            SwaplineError::InsufficientSaleHistory { .. } => "insufficient_sale_history",
            SwaplineError::NonMonotonicCurve(_) => "non_monotonic_curve",
            SwaplineError::MissingReserves(_) => "missing_reserves",
            SwaplineError::MissingTaxRate(_) => "missing_tax_rate",
            SwaplineError::MissingAllowance(_) => "missing_allowance",
            SwaplineError::NoRouteAvailable(_) => "no_route_available",
            SwaplineError::InvalidBps(_) => "invalid_bps",
            SwaplineError::InvalidAmount(_) => "invalid_amount",
            SwaplineError::Overflow(_) => "overflow",
            SwaplineError::RpcError(_) => "rpc",
            SwaplineError::ContractError(_) => "contract",
            SwaplineError::ConfigError(_) => "config",
            SwaplineError::SerializationError(_) => "serialization",
        }
    }

    /// Errors raised by the pricing kernel itself, as opposed to collaborators.
    #[must_use]
    pub fn is_pricing_error(&self) -> bool {
        !matches!(
            self,
            SwaplineError::RpcError(_)
                | SwaplineError::ContractError(_)
                | SwaplineError::ConfigError(_)
                | SwaplineError::SerializationError(_)
        )
    }

    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            SwaplineError::EmptyPool => "This pool has no liquidity yet.",
            SwaplineError::InsufficientLiquidity { .. } => {
                "Not enough liquidity in the pool for this amount."
            }
            SwaplineError::ExceedsSaleCap { .. } => {
                "Trade is too large for the current sale phase."
            }
            SwaplineError::InsufficientSaleHistory { .. } => {
                "The sale cannot refund that much; reduce the amount."
            }
            SwaplineError::NonMonotonicCurve(_) => {
                "Sale pricing is temporarily unavailable."
            }
            SwaplineError::MissingReserves(_) => "Pool data is still loading.",
            SwaplineError::MissingTaxRate(_) => "Pool tax rate is still loading.",
            SwaplineError::MissingAllowance(_) => "Approval status is still loading.",
            SwaplineError::NoRouteAvailable(_) => "No route exists between these tokens.",
            SwaplineError::InvalidBps(_) => "Slippage or fee setting is out of range.",
            SwaplineError::InvalidAmount(_) => "Enter a valid amount.",
            SwaplineError::Overflow(_) => "Amount is too large.",
            SwaplineError::RpcError(_)
            | SwaplineError::ContractError(_)
            | SwaplineError::ConfigError(_)
            | SwaplineError::SerializationError(_) => "Something went wrong. Please try again.",
        }
    }
}

pub type Result<T> = std::result::Result<T, SwaplineError>;
