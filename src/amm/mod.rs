/*
 * Constant-product pool math mirroring the on-chain integer arithmetic
 */

use crate::models::{Bps, Result, SwaplineError, BPS_DENOMINATOR};
use ethers::types::{U256, U512};

/// Which side of a trade a slippage bound protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Floor bound on an output amount.
    MinOut,
    /// Ceiling bound on an input amount.
    MaxIn,
}

fn ensure_reserves(reserve_in: U256, reserve_out: U256) -> Result<()> {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(SwaplineError::EmptyPool);
    }
    Ok(())
}

fn ensure_bps(bps: Bps) -> Result<U256> {
    if bps > BPS_DENOMINATOR {
        return Err(SwaplineError::InvalidBps(bps));
    }
    Ok(U256::from(bps))
}

fn narrow(value: U512, context: &'static str) -> Result<U256> {
    U256::try_from(value).map_err(|_| SwaplineError::Overflow(context))
}

fn ceil_div(numerator: U512, denominator: U512) -> U512 {
    let (quotient, remainder) = numerator.div_mod(denominator);
    if remainder.is_zero() {
        quotient
    } else {
        quotient + U512::one()
    }
}

/// Output received for `amount_in` after the pool fee, rounded down.
pub fn amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256, fee_bps: Bps) -> Result<U256> {
    ensure_reserves(reserve_in, reserve_out)?;
    let fee = ensure_bps(fee_bps)?;
    let denominator_bps = U256::from(BPS_DENOMINATOR);

    let amount_in_with_fee = amount_in
        .checked_mul(denominator_bps - fee)
        .ok_or(SwaplineError::Overflow("amount_out"))?;
    let numerator = amount_in_with_fee.full_mul(reserve_out);
    let denominator = reserve_in.full_mul(denominator_bps) + U512::from(amount_in_with_fee);

    narrow(numerator / denominator, "amount_out")
}

/// Input required to receive exactly `amount_out`, rounded up so the swap
/// never comes up short on-chain.
pub fn amount_in(amount_out: U256, reserve_in: U256, reserve_out: U256, fee_bps: Bps) -> Result<U256> {
    ensure_reserves(reserve_in, reserve_out)?;
    let fee = ensure_bps(fee_bps)?;
    if fee_bps == BPS_DENOMINATOR {
        return Err(SwaplineError::InvalidBps(fee_bps));
    }
    if amount_out >= reserve_out {
        return Err(SwaplineError::InsufficientLiquidity {
            requested: amount_out,
            reserve: reserve_out,
        });
    }
    let denominator_bps = U256::from(BPS_DENOMINATOR);

    let numerator = reserve_in
        .full_mul(amount_out)
        .checked_mul(U512::from(denominator_bps))
        .ok_or(SwaplineError::Overflow("amount_in"))?;
    let denominator = (reserve_out - amount_out).full_mul(denominator_bps - fee);

    narrow(ceil_div(numerator, denominator), "amount_in")
}

/// Applies a slippage tolerance. The caller states which bound it needs.
pub fn with_slippage(amount: U256, slippage_bps: Bps, bound: Bound) -> Result<U256> {
    let slippage = ensure_bps(slippage_bps)?;
    let denominator_bps = U256::from(BPS_DENOMINATOR);

    match bound {
        Bound::MinOut => {
            let scaled = amount.full_mul(denominator_bps - slippage);
            narrow(scaled / U512::from(denominator_bps), "with_slippage")
        }
        Bound::MaxIn => {
            let scaled = amount.full_mul(denominator_bps + slippage);
            narrow(ceil_div(scaled, U512::from(denominator_bps)), "with_slippage")
        }
    }
}

/// Net amount left after the hook deducts `tax_bps` from `gross`.
pub fn deduct_tax(gross: U256, tax_bps: Bps) -> Result<U256> {
    let tax = gross.full_mul(U256::from(tax_bps)) / U512::from(BPS_DENOMINATOR);
    let tax = narrow(tax, "deduct_tax")?;
    Ok(gross.saturating_sub(tax))
}

/// Smallest gross amount whose post-tax remainder covers `net`.
pub fn gross_up(net: U256, tax_bps: Bps) -> Result<U256> {
    if tax_bps >= BPS_DENOMINATOR {
        return Err(SwaplineError::InvalidBps(tax_bps));
    }
    if tax_bps == 0 || net.is_zero() {
        return Ok(net);
    }
    // gross - floor(gross * t / B) == ceil(gross * (B - t) / B), so the
    // smallest gross netting at least `net` is floor((net - 1) * B / (B - t)) + 1.
    let kept_bps = U512::from(BPS_DENOMINATOR - tax_bps);
    let scaled = (net - U256::one()).full_mul(U256::from(BPS_DENOMINATOR));
    let gross = narrow(scaled / kept_bps, "gross_up")?;
    gross
        .checked_add(U256::one())
        .ok_or(SwaplineError::Overflow("gross_up"))
}

/// Slippage used for min-out bounds on hook-taxed pools: the tax is taken
/// after the swap and must not read as adverse price movement.
#[must_use]
pub fn effective_slippage_bps(slippage_bps: Bps, tax_bps: Bps) -> Bps {
    slippage_bps.saturating_add(tax_bps).min(BPS_DENOMINATOR)
}

/// Output price impact relative to the pre-trade spot price, in bps.
pub fn price_impact_bps(amount_in: U256, amount_out: U256, reserve_in: U256, reserve_out: U256) -> Result<Bps> {
    ensure_reserves(reserve_in, reserve_out)?;
    if amount_in.is_zero() {
        return Ok(0);
    }
    let spot_out = amount_in.full_mul(reserve_out) / U512::from(reserve_in);
    if spot_out.is_zero() {
        return Ok(0);
    }
    let actual = U512::from(amount_out);
    if actual >= spot_out {
        return Ok(0);
    }
    let impact = (spot_out - actual) * U512::from(BPS_DENOMINATOR) / spot_out;
    Ok(impact.low_u32())
}
