/*
 * Trade call builder: turns a trade request plus snapshots into ordered calls
 */

pub mod abi;
mod route;

pub use route::RouteKind;

use crate::amm::{self, Bound};
use crate::curve::{self, CurveQuoteCache, CurveState};
use crate::models::{
    Asset, Authorization, Bps, Call, PoolKey, ReserveSnapshot, Result, SwaplineError, TradeKind,
    TradeRequest, BPS_DENOMINATOR,
};
use ethers::types::{Address, U256};
use route::{CurveLeg, Hop, TradeRoute};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Contracts the emitted calls target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub amm: Address,
    pub tax_router: Address,
    pub curve: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub key: PoolKey,
    pub reserves: Option<ReserveSnapshot>,
    pub tax_bps: Option<Bps>,
}

/// A coin still in its primary sale, priced by the bonding curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveSale {
    pub coin_id: U256,
    pub coin: Asset,
    pub state: Option<CurveState>,
}

/// Everything fetched from the chain for one trade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSnapshot {
    pub pools: Vec<PoolSnapshot>,
    pub curve: Option<CurveSale>,
    pub authorization: Option<Authorization>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub amount_in: U256,
    pub amount_out: U256,
    pub min_amount_out: Option<U256>,
    pub max_amount_in: Option<U256>,
    pub slippage_bps: Bps,
    pub value: U256,
    pub price_impact_bps: Option<Bps>,
    /// Raw output units per raw input unit before the trade, when the
    /// trade is priced by pools.
    pub spot_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradePlan {
    pub route: RouteKind,
    pub taxed: bool,
    pub quote: Quote,
    pub calls: Vec<Call>,
}

/// The swap call of a plan plus what the sold asset must authorize for it.
struct Settlement {
    quote: Quote,
    call: Call,
    spender: Option<Address>,
    required: U256,
}

pub struct TradeCallBuilder {
    deployment: Deployment,
    cache: Option<Arc<CurveQuoteCache>>,
}

impl TradeCallBuilder {
    #[must_use]
    pub fn new(deployment: Deployment) -> Self {
        Self {
            deployment,
            cache: None,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CurveQuoteCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Contract that will pull the sold asset, so callers know which
    /// authorization to fetch before building.
    #[must_use]
    pub fn spender(&self, request: &TradeRequest, pools: &[PoolKey], curve_coin: Option<&Asset>) -> Option<Address> {
        if request.sell.is_native() {
            return None;
        }
        if curve_coin == Some(&request.sell) && request.buy.is_native() {
            return None;
        }
        match pools
            .iter()
            .find(|key| key.direction(&request.sell, &request.buy).is_some())
        {
            Some(key) if key.is_taxed() => Some(self.deployment.tax_router),
            _ => Some(self.deployment.amm),
        }
    }

    /// Builds the full call list or fails before emitting anything.
    pub fn build(&self, request: &TradeRequest, snapshot: &TradeSnapshot) -> Result<TradePlan> {
        if request.slippage_bps > BPS_DENOMINATOR {
            return Err(SwaplineError::InvalidBps(request.slippage_bps));
        }

        let route = route::classify(request, snapshot)?;
        debug!(route = ?route.kind(), taxed = route.is_taxed(), "classified trade");

        let settlement = match route {
            TradeRoute::CurveBuy(leg) => self.curve_buy(request, leg)?,
            TradeRoute::CurveSell(leg) => self.curve_sell(request, leg)?,
            TradeRoute::NativeIn(hop) | TradeRoute::NativeOut(hop) => self.single_hop(request, hop)?,
            TradeRoute::TokenToToken { first, second } => self.two_hop(request, first, second)?,
        };

        let mut calls = Vec::with_capacity(2);
        if let Some(spender) = settlement.spender {
            if let Some(authorization) =
                authorization_call(&request.sell, spender, settlement.required, snapshot.authorization)?
            {
                calls.push(authorization);
            }
        }
        calls.push(settlement.call);

        debug!(calls = calls.len(), value = %settlement.quote.value, "built trade calls");

        Ok(TradePlan {
            route: route.kind(),
            taxed: route.is_taxed(),
            quote: settlement.quote,
            calls,
        })
    }

    fn coins_for_eth(&self, eth_in: U256, state: &CurveState) -> Result<U256> {
        match &self.cache {
            Some(cache) => cache.coins_for_eth(eth_in, state),
            None => curve::coins_for_eth(eth_in, state),
        }
    }

    fn coins_to_burn_for_eth(&self, eth_out: U256, state: &CurveState) -> Result<U256> {
        match &self.cache {
            Some(cache) => cache.coins_to_burn_for_eth(eth_out, state),
            None => curve::coins_to_burn_for_eth(eth_out, state),
        }
    }

    fn single_hop(&self, request: &TradeRequest, hop: Hop<'_>) -> Result<Settlement> {
        let (reserve_in, reserve_out) = hop.reserves_in_out();
        let fee = hop.key.fee_bps;
        let native_in = request.sell.is_native();
        let to = if hop.tax_bps.is_some() {
            self.deployment.tax_router
        } else {
            self.deployment.amm
        };

        match request.kind {
            TradeKind::ExactIn(amount_in) => {
                let amount_out = amm::amount_out(amount_in, reserve_in, reserve_out, fee)?;
                let slippage_bps = match hop.tax_bps {
                    Some(tax) => amm::effective_slippage_bps(request.slippage_bps, tax),
                    None => request.slippage_bps,
                };
                let min_out = amm::with_slippage(amount_out, slippage_bps, Bound::MinOut)?;
                let data = if hop.tax_bps.is_some() {
                    abi::swap_exact_in_taxed(hop.key, amount_in, min_out, hop.zero_for_one, request.recipient, request.deadline)
                } else {
                    abi::swap_exact_in(hop.key, amount_in, min_out, hop.zero_for_one, request.recipient, request.deadline)
                };
                let value = if native_in { amount_in } else { U256::zero() };

                Ok(Settlement {
                    quote: Quote {
                        amount_in,
                        amount_out,
                        min_amount_out: Some(min_out),
                        max_amount_in: None,
                        slippage_bps,
                        value,
                        price_impact_bps: Some(amm::price_impact_bps(amount_in, amount_out, reserve_in, reserve_out)?),
                        spot_price: hop.spot_price(),
                    },
                    call: Call { to, value, data },
                    spender: Some(to),
                    required: amount_in,
                })
            }
            TradeKind::ExactOut(amount_out) => {
                let amount_in = amm::amount_in(amount_out, reserve_in, reserve_out, fee)?;
                let max_in = amm::with_slippage(amount_in, request.slippage_bps, Bound::MaxIn)?;
                let data = if hop.tax_bps.is_some() {
                    abi::swap_exact_out_taxed(hop.key, amount_out, max_in, hop.zero_for_one, request.recipient, request.deadline)
                } else {
                    abi::swap_exact_out(hop.key, amount_out, max_in, hop.zero_for_one, request.recipient, request.deadline)
                };
                // The tax on a native payment is paid in the same call, so the
                // attached value covers principal and tax together.
                let value = match (native_in, hop.tax_bps) {
                    (true, Some(tax)) => amm::gross_up(max_in, tax)?,
                    (true, None) => max_in,
                    (false, _) => U256::zero(),
                };

                Ok(Settlement {
                    quote: Quote {
                        amount_in,
                        amount_out,
                        min_amount_out: None,
                        max_amount_in: Some(max_in),
                        slippage_bps: request.slippage_bps,
                        value,
                        price_impact_bps: Some(amm::price_impact_bps(amount_in, amount_out, reserve_in, reserve_out)?),
                        spot_price: hop.spot_price(),
                    },
                    call: Call { to, value, data },
                    spender: Some(to),
                    required: max_in,
                })
            }
        }
    }

    fn two_hop(&self, request: &TradeRequest, first: Hop<'_>, second: Hop<'_>) -> Result<Settlement> {
        let amm_address = self.deployment.amm;
        let (first_in, first_out) = first.reserves_in_out();
        let (second_in, second_out) = second.reserves_in_out();
        let spot_price = first
            .spot_price()
            .zip(second.spot_price())
            .and_then(|(a, b)| a.checked_mul(b));

        let (quote, data, required) = match request.kind {
            TradeKind::ExactIn(amount_in) => {
                let bridged = amm::amount_out(amount_in, first_in, first_out, first.key.fee_bps)?;
                let amount_out = amm::amount_out(bridged, second_in, second_out, second.key.fee_bps)?;
                let min_out = amm::with_slippage(amount_out, request.slippage_bps, Bound::MinOut)?;
                let data = abi::multicall(vec![
                    abi::swap_exact_in(first.key, amount_in, U256::zero(), first.zero_for_one, amm_address, request.deadline),
                    abi::swap_exact_in(second.key, U256::zero(), min_out, second.zero_for_one, request.recipient, request.deadline),
                ]);
                let quote = Quote {
                    amount_in,
                    amount_out,
                    min_amount_out: Some(min_out),
                    max_amount_in: None,
                    slippage_bps: request.slippage_bps,
                    value: U256::zero(),
                    price_impact_bps: None,
                    spot_price,
                };
                (quote, data, amount_in)
            }
            TradeKind::ExactOut(amount_out) => {
                let bridged = amm::amount_in(amount_out, second_in, second_out, second.key.fee_bps)?;
                // The first leg buys the second pool's tolerance up front; the
                // second leg can only spend what the first one credited.
                let bridge_max = amm::with_slippage(bridged, request.slippage_bps, Bound::MaxIn)?;
                let amount_in = amm::amount_in(bridge_max, first_in, first_out, first.key.fee_bps)?;
                let max_in = amm::with_slippage(amount_in, request.slippage_bps, Bound::MaxIn)?;
                let data = abi::multicall(vec![
                    abi::swap_exact_out(first.key, bridge_max, max_in, first.zero_for_one, amm_address, request.deadline),
                    abi::swap_exact_out(second.key, amount_out, bridge_max, second.zero_for_one, request.recipient, request.deadline),
                ]);
                let quote = Quote {
                    amount_in,
                    amount_out,
                    min_amount_out: None,
                    max_amount_in: Some(max_in),
                    slippage_bps: request.slippage_bps,
                    value: U256::zero(),
                    price_impact_bps: None,
                    spot_price,
                };
                (quote, data, max_in)
            }
        };

        Ok(Settlement {
            quote,
            call: Call {
                to: amm_address,
                value: U256::zero(),
                data,
            },
            spender: Some(amm_address),
            required,
        })
    }

    fn curve_buy(&self, request: &TradeRequest, leg: CurveLeg<'_>) -> Result<Settlement> {
        let state = leg.state;
        let coin_id = leg.sale.coin_id;

        let (quote, data) = match request.kind {
            TradeKind::ExactIn(eth_in) => {
                let full_allocation = curve::buy_cost(state.remaining(), &state)?;
                if eth_in > full_allocation {
                    return Err(SwaplineError::ExceedsSaleCap {
                        requested: eth_in,
                        available: full_allocation,
                    });
                }
                let coins = self.coins_for_eth(eth_in, &state)?;
                let min_coins = amm::with_slippage(coins, request.slippage_bps, Bound::MinOut)?;
                let data = abi::buy_for_exact_eth(coin_id, min_coins, request.recipient, request.deadline);
                let quote = Quote {
                    amount_in: eth_in,
                    amount_out: coins,
                    min_amount_out: Some(min_coins),
                    max_amount_in: None,
                    slippage_bps: request.slippage_bps,
                    value: eth_in,
                    price_impact_bps: None,
                    spot_price: None,
                };
                (quote, data)
            }
            TradeKind::ExactOut(coins_out) => {
                let coins_out = curve::quantize_down(coins_out);
                let cost = curve::buy_cost(coins_out, &state)?;
                let max_eth = amm::with_slippage(cost, request.slippage_bps, Bound::MaxIn)?;
                let data = abi::buy_exact_coins(coin_id, coins_out, max_eth, request.recipient, request.deadline);
                let quote = Quote {
                    amount_in: cost,
                    amount_out: coins_out,
                    min_amount_out: None,
                    max_amount_in: Some(max_eth),
                    slippage_bps: request.slippage_bps,
                    value: max_eth,
                    price_impact_bps: None,
                    spot_price: None,
                };
                (quote, data)
            }
        };

        Ok(Settlement {
            call: Call {
                to: self.deployment.curve,
                value: quote.value,
                data,
            },
            quote,
            spender: None,
            required: U256::zero(),
        })
    }

    fn curve_sell(&self, request: &TradeRequest, leg: CurveLeg<'_>) -> Result<Settlement> {
        let state = leg.state;
        let coin_id = leg.sale.coin_id;

        let (quote, data) = match request.kind {
            TradeKind::ExactIn(coins_in) => {
                let coins_in = curve::quantize_down(coins_in);
                if coins_in > state.net_sold {
                    return Err(SwaplineError::InsufficientSaleHistory {
                        requested: coins_in,
                        available: state.net_sold,
                    });
                }
                let refund = curve::sell_refund(coins_in, &state)?;
                let min_eth = amm::with_slippage(refund, request.slippage_bps, Bound::MinOut)?;
                let data = abi::sell_exact_coins(coin_id, coins_in, min_eth, request.recipient, request.deadline);
                let quote = Quote {
                    amount_in: coins_in,
                    amount_out: refund,
                    min_amount_out: Some(min_eth),
                    max_amount_in: None,
                    slippage_bps: request.slippage_bps,
                    value: U256::zero(),
                    price_impact_bps: None,
                    spot_price: None,
                };
                (quote, data)
            }
            TradeKind::ExactOut(eth_out) => {
                let coins = self.coins_to_burn_for_eth(eth_out, &state)?;
                let max_coins = amm::with_slippage(coins, request.slippage_bps, Bound::MaxIn)?.min(state.net_sold);
                let data = abi::sell_for_exact_eth(coin_id, eth_out, max_coins, request.recipient, request.deadline);
                let quote = Quote {
                    amount_in: coins,
                    amount_out: eth_out,
                    min_amount_out: None,
                    max_amount_in: Some(max_coins),
                    slippage_bps: request.slippage_bps,
                    value: U256::zero(),
                    price_impact_bps: None,
                    spot_price: None,
                };
                (quote, data)
            }
        };

        Ok(Settlement {
            quote,
            call: Call {
                to: self.deployment.curve,
                value: U256::zero(),
                data,
            },
            spender: None,
            required: U256::zero(),
        })
    }
}

/// Approval call the sold asset still needs, if any.
fn authorization_call(
    sell: &Asset,
    spender: Address,
    required: U256,
    authorization: Option<Authorization>,
) -> Result<Option<Call>> {
    let Some(token) = sell.contract() else {
        return Ok(None);
    };
    let missing = || SwaplineError::MissingAllowance(format!("{sell} -> {spender:?}"));
    let granted = authorization.ok_or_else(missing)?;

    let data = match (sell, granted) {
        (Asset::Erc20 { .. }, Authorization::Allowance(_)) => abi::approve(spender, required),
        (Asset::Erc6909 { .. }, Authorization::Operator(_)) => abi::set_operator(spender, true),
        _ => return Err(missing()),
    };
    if granted.covers(required) {
        return Ok(None);
    }

    Ok(Some(Call {
        to: token,
        value: U256::zero(),
        data,
    }))
}
