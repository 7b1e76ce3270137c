/*
 * Display and parsing helpers around raw on-chain integers
 */

use crate::models::{ReserveSnapshot, Result, SwaplineError};
use ethers::types::U256;
use rust_decimal::Decimal;

/// Scales a raw integer amount down by `decimals`.
pub fn format_units(value: U256, decimals: u32) -> Result<Decimal> {
    if value > U256::from(u128::MAX) {
        return Err(SwaplineError::Overflow("format_units"));
    }
    let mantissa = i128::try_from(value.as_u128()).map_err(|_| SwaplineError::Overflow("format_units"))?;
    Decimal::try_from_i128_with_scale(mantissa, decimals)
        .map(|d| d.normalize())
        .map_err(|_| SwaplineError::Overflow("format_units"))
}

/// Raw integer from decimal or `0x`-prefixed hex.
pub fn parse_uint(value: &str) -> Result<U256> {
    let trimmed = value.trim();
    let parsed = match trimmed.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => U256::from_dec_str(trimmed).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| SwaplineError::InvalidAmount(format!("{value}: {e}")))
}

/// Price of asset0 denominated in asset1.
pub fn spot_price(reserves: &ReserveSnapshot, decimals0: u32, decimals1: u32) -> Result<Decimal> {
    if reserves.is_empty() {
        return Err(SwaplineError::EmptyPool);
    }
    let reserve0 = format_units(reserves.reserve0, decimals0)?;
    let reserve1 = format_units(reserves.reserve1, decimals1)?;
    reserve1
        .checked_div(reserve0)
        .ok_or(SwaplineError::Overflow("spot_price"))
}
