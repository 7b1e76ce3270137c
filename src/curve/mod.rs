/*
 * Bonding-curve sale math: quadratic price up to the quad cap, linear after
 */

mod cache;

pub use cache::{CacheCounters, CacheStats, CurveOp, CurveQuoteCache};

use crate::models::{Result, SwaplineError};
use ethers::types::{U256, U512};
use serde::{Deserialize, Serialize};

/// Quantization granularity of the curve; every position is a whole number of ticks.
pub const UNIT_SCALE: u64 = 1_000_000_000_000;

/// One unit of the native currency (1e18 wei).
pub const ONE_NATIVE: u64 = 1_000_000_000_000_000_000;

fn unit() -> U256 {
    U256::from(UNIT_SCALE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveState {
    pub net_sold: U256,
    pub sale_cap: U256,
    pub quad_cap: U256,
    pub divisor: U256,
}

impl CurveState {
    /// Builds a state from the sale record, where the sale cap sits in the
    /// high 128 bits and the quad cap in the low 128 bits of one word.
    #[must_use]
    pub fn from_packed(net_sold: U256, packed_caps: U256, divisor: U256) -> Self {
        let low_mask = (U256::one() << 128) - U256::one();
        Self {
            net_sold,
            sale_cap: packed_caps >> 128,
            quad_cap: packed_caps & low_mask,
            divisor,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> U256 {
        self.sale_cap.saturating_sub(self.net_sold)
    }
}

#[must_use]
pub fn quantize_down(amount: U256) -> U256 {
    amount - amount % unit()
}

pub fn quantize_up(amount: U256) -> Result<U256> {
    let rem = amount % unit();
    if rem.is_zero() {
        return Ok(amount);
    }
    amount
        .checked_add(unit() - rem)
        .ok_or(SwaplineError::Overflow("quantize_up"))
}

fn sum_of_squares(m: U256) -> Result<U256> {
    // sum of i^2 for i in [0, m) == m(m-1)(2m-1)/6
    let overflow = SwaplineError::Overflow("sum_of_squares");
    let m_minus_one = m - U256::one();
    let two_m_minus_one = (m << 1) - U256::one();
    let product = m
        .checked_mul(m_minus_one)
        .and_then(|p| p.checked_mul(two_m_minus_one))
        .ok_or(overflow)?;
    Ok(product / U256::from(6))
}

fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256> {
    U256::try_from(a.full_mul(b) / U512::from(denominator)).map_err(|_| SwaplineError::Overflow("mul_div"))
}

/// Cumulative cost of the first `units` coins. The first tick is free.
pub fn cost(units: U256, curve: &CurveState) -> Result<U256> {
    if curve.divisor.is_zero() {
        return Err(SwaplineError::NonMonotonicCurve("divisor is zero".to_string()));
    }
    let m = units / unit();
    if m < U256::from(2) {
        return Ok(U256::zero());
    }

    let one = U256::from(ONE_NATIVE);
    let denom = curve
        .divisor
        .checked_mul(U256::from(6))
        .ok_or(SwaplineError::Overflow("cost"))?;
    let k = curve.quad_cap / unit();

    if m <= k {
        return mul_div(sum_of_squares(m)?, one, denom);
    }

    let quad_cost = if k.is_zero() {
        U256::zero()
    } else {
        mul_div(sum_of_squares(k)?, one, denom)?
    };
    let k_squared = k.checked_mul(k).ok_or(SwaplineError::Overflow("cost"))?;
    let marginal_price = mul_div(k_squared, one, denom)?;
    let tail = (m - k)
        .checked_mul(marginal_price)
        .ok_or(SwaplineError::Overflow("cost"))?;

    quad_cost.checked_add(tail).ok_or(SwaplineError::Overflow("cost"))
}

/// Payment required to buy `coins_out` at the current position.
pub fn buy_cost(coins_out: U256, curve: &CurveState) -> Result<U256> {
    let remaining = curve.remaining();
    if coins_out > remaining {
        return Err(SwaplineError::ExceedsSaleCap {
            requested: coins_out,
            available: remaining,
        });
    }
    let after = curve.net_sold + coins_out;
    Ok(cost(after, curve)?.saturating_sub(cost(curve.net_sold, curve)?))
}

/// Refund for selling `coins_in` back; clamped to what has been sold.
pub fn sell_refund(coins_in: U256, curve: &CurveState) -> Result<U256> {
    let coins_in = coins_in.min(curve.net_sold);
    let before = curve.net_sold - coins_in;
    Ok(cost(curve.net_sold, curve)?.saturating_sub(cost(before, curve)?))
}

/// Largest tick-aligned amount of coins `eth_in` pays for, capped by the
/// remaining sale allocation.
pub fn coins_for_eth(eth_in: U256, curve: &CurveState) -> Result<U256> {
    let remaining = curve.remaining();
    if buy_cost(remaining, curve)? <= eth_in {
        return Ok(quantize_down(remaining));
    }

    // buy_cost(lo) <= eth_in < buy_cost(hi)
    let mut lo = U256::zero();
    let mut hi = remaining;
    while hi - lo >= unit() {
        let mid = lo + (hi - lo) / 2;
        if buy_cost(mid, curve)? <= eth_in {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let coins = quantize_down(lo);
    if buy_cost(coins, curve)? > eth_in {
        return Err(SwaplineError::NonMonotonicCurve(format!(
            "{coins} coins cost more than the {eth_in} paid"
        )));
    }
    Ok(coins)
}

/// Smallest tick-aligned amount of coins whose refund covers `eth_out`.
pub fn coins_to_burn_for_eth(eth_out: U256, curve: &CurveState) -> Result<U256> {
    let available = sell_refund(curve.net_sold, curve)?;
    if eth_out > available {
        return Err(SwaplineError::InsufficientSaleHistory {
            requested: eth_out,
            available,
        });
    }
    if eth_out.is_zero() {
        return Ok(U256::zero());
    }

    // sell_refund(lo) < eth_out <= sell_refund(hi)
    let mut lo = U256::zero();
    let mut hi = curve.net_sold;
    while hi - lo >= unit() {
        let mid = lo + (hi - lo) / 2;
        if sell_refund(mid, curve)? >= eth_out {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    let mut coins = quantize_up(hi)?;
    if coins > curve.net_sold {
        coins = quantize_down(curve.net_sold);
    }
    let refund = sell_refund(coins, curve)?;
    if refund < eth_out {
        if coins == quantize_down(curve.net_sold) {
            return Err(SwaplineError::InsufficientSaleHistory {
                requested: eth_out,
                available: refund,
            });
        }
        return Err(SwaplineError::NonMonotonicCurve(format!(
            "burning {coins} coins refunds {refund}, short of {eth_out}"
        )));
    }
    Ok(coins)
}
