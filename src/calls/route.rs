/*
 * Trade classification: one closed variant per way a trade can settle
 */

use super::{CurveSale, PoolSnapshot, TradeSnapshot};
use crate::curve::CurveState;
use crate::models::{Asset, Bps, PoolKey, ReserveSnapshot, Result, SwaplineError, TradeRequest};
use crate::utils;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteKind {
    CurveBuy,
    CurveSell,
    NativeIn,
    NativeOut,
    TokenToToken,
}

impl RouteKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::CurveBuy => "curveBuy",
            RouteKind::CurveSell => "curveSell",
            RouteKind::NativeIn => "nativeIn",
            RouteKind::NativeOut => "nativeOut",
            RouteKind::TokenToToken => "tokenToToken",
        }
    }
}

/// One pool traversal with validated, non-empty reserves.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Hop<'a> {
    pub key: &'a PoolKey,
    pub reserves: ReserveSnapshot,
    pub zero_for_one: bool,
    pub tax_bps: Option<Bps>,
}

impl Hop<'_> {
    pub fn reserves_in_out(&self) -> (ethers::types::U256, ethers::types::U256) {
        self.reserves.oriented(self.zero_for_one)
    }

    /// Raw output units per raw input unit at the current reserves.
    pub fn spot_price(&self) -> Option<Decimal> {
        let (reserve_in, reserve_out) = self.reserves_in_out();
        utils::spot_price(&ReserveSnapshot::new(reserve_in, reserve_out), 0, 0).ok()
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CurveLeg<'a> {
    pub sale: &'a CurveSale,
    pub state: CurveState,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TradeRoute<'a> {
    CurveBuy(CurveLeg<'a>),
    CurveSell(CurveLeg<'a>),
    NativeIn(Hop<'a>),
    NativeOut(Hop<'a>),
    TokenToToken { first: Hop<'a>, second: Hop<'a> },
}

impl TradeRoute<'_> {
    pub fn kind(&self) -> RouteKind {
        match self {
            TradeRoute::CurveBuy(_) => RouteKind::CurveBuy,
            TradeRoute::CurveSell(_) => RouteKind::CurveSell,
            TradeRoute::NativeIn(_) => RouteKind::NativeIn,
            TradeRoute::NativeOut(_) => RouteKind::NativeOut,
            TradeRoute::TokenToToken { .. } => RouteKind::TokenToToken,
        }
    }

    pub fn is_taxed(&self) -> bool {
        match self {
            TradeRoute::NativeIn(hop) | TradeRoute::NativeOut(hop) => hop.tax_bps.is_some(),
            _ => false,
        }
    }
}

fn find_pool<'a>(pools: &'a [PoolSnapshot], sell: &Asset, buy: &Asset) -> Option<(&'a PoolSnapshot, bool)> {
    pools
        .iter()
        .find_map(|pool| pool.key.direction(sell, buy).map(|zero_for_one| (pool, zero_for_one)))
}

fn hop<'a>(pool: &'a PoolSnapshot, zero_for_one: bool) -> Result<Hop<'a>> {
    let reserves = pool
        .reserves
        .ok_or_else(|| SwaplineError::MissingReserves(pool.key.pool_id()))?;
    if reserves.is_empty() {
        return Err(SwaplineError::EmptyPool);
    }
    let tax_bps = if pool.key.is_taxed() {
        Some(pool.tax_bps.ok_or_else(|| SwaplineError::MissingTaxRate(pool.key.pool_id()))?)
    } else {
        None
    };
    Ok(Hop {
        key: &pool.key,
        reserves,
        zero_for_one,
        tax_bps,
    })
}

fn single_hop<'a>(pools: &'a [PoolSnapshot], sell: &Asset, buy: &Asset) -> Result<Hop<'a>> {
    let (pool, zero_for_one) = find_pool(pools, sell, buy)
        .ok_or_else(|| SwaplineError::NoRouteAvailable(format!("no pool between {sell} and {buy}")))?;
    hop(pool, zero_for_one)
}

fn curve_leg(sale: &CurveSale) -> Result<CurveLeg<'_>> {
    let state = sale
        .state
        .ok_or(SwaplineError::MissingReserves(sale.coin_id))?;
    Ok(CurveLeg { sale, state })
}

/// Decides once, up front, how the trade settles.
pub(crate) fn classify<'a>(request: &TradeRequest, snapshot: &'a TradeSnapshot) -> Result<TradeRoute<'a>> {
    let (sell, buy) = (&request.sell, &request.buy);
    if sell == buy {
        return Err(SwaplineError::NoRouteAvailable(format!("cannot trade {sell} for itself")));
    }

    if let Some(sale) = &snapshot.curve {
        if sell.is_native() && *buy == sale.coin {
            return Ok(TradeRoute::CurveBuy(curve_leg(sale)?));
        }
        if *sell == sale.coin && buy.is_native() {
            return Ok(TradeRoute::CurveSell(curve_leg(sale)?));
        }
    }

    match (sell.is_native(), buy.is_native()) {
        (true, _) => Ok(TradeRoute::NativeIn(single_hop(&snapshot.pools, sell, buy)?)),
        (_, true) => Ok(TradeRoute::NativeOut(single_hop(&snapshot.pools, sell, buy)?)),
        (false, false) => {
            let native = Asset::Native;
            let (first, second) = match (
                find_pool(&snapshot.pools, sell, &native),
                find_pool(&snapshot.pools, &native, buy),
            ) {
                (Some(first), Some(second)) => (first, second),
                _ => {
                    return Err(SwaplineError::NoRouteAvailable(format!(
                        "no native-bridged path from {sell} to {buy}"
                    )))
                }
            };
            if first.0.key.is_taxed() || second.0.key.is_taxed() {
                return Err(SwaplineError::NoRouteAvailable(
                    "hook-taxed pools only settle single-hop trades".to_string(),
                ));
            }
            Ok(TradeRoute::TokenToToken {
                first: hop(first.0, first.1)?,
                second: hop(second.0, second.1)?,
            })
        }
    }
}
