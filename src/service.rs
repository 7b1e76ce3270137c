/*
 * Trade service: fetches chain snapshots and hands them to the call builder
 */

use crate::{
    calls::{CurveSale, Deployment, PoolSnapshot, TradeCallBuilder, TradePlan, TradeSnapshot},
    chain::{AllowanceSource, ChainReader, CurveSource, ReserveSource, TaxRateSource},
    config::{Config, TradingConfig},
    curve::{self, CurveQuoteCache, CurveState},
    metrics::Metrics,
    models::{Asset, Authorization, Bps, PoolKey, Result, SwaplineError, TradeKind, TradeRequest},
    rpc::RpcClient,
};
use chrono::Utc;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// A trade as submitted by a client: the request plus the pools it may route through.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOrder {
    pub trade: TradeKind,
    pub sell: Asset,
    pub buy: Asset,
    pub recipient: Address,
    /// Holder of the sold asset; defaults to the recipient.
    pub owner: Option<Address>,
    pub slippage_bps: Option<Bps>,
    pub deadline: Option<U256>,
    #[serde(default)]
    pub pools: Vec<PoolKey>,
    /// Set while the bought or sold coin is still in its primary sale.
    pub coin_id: Option<U256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveQuery {
    EthIn(U256),
    CoinsOut(U256),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveQuote {
    pub coin_id: U256,
    pub eth: U256,
    pub coins: U256,
    pub net_sold: U256,
    pub remaining: U256,
}

pub struct TradeService {
    builder: TradeCallBuilder,
    cache: Arc<CurveQuoteCache>,
    metrics: Arc<Metrics>,
    reserves: Arc<dyn ReserveSource>,
    allowances: Arc<dyn AllowanceSource>,
    taxes: Arc<dyn TaxRateSource>,
    curves: Arc<dyn CurveSource>,
    trading: TradingConfig,
}

impl TradeService {
    pub async fn new(config: &Config, metrics: Arc<Metrics>) -> Result<Self> {
        info!("Initializing trade service");

        let rpc = Arc::new(RpcClient::new(&config.chain.rpc_url, config.chain.chain_id).await?);
        info!(chain_id = rpc.chain_id(), "Connected to RPC");

        let reader = Arc::new(ChainReader::new(rpc, config.chain.deployment));
        let cache = CurveQuoteCache::new(config.cache.ttl(), config.cache.capacity);

        Ok(Self::with_sources(
            config.chain.deployment,
            config.trading.clone(),
            cache,
            metrics,
            reader,
        ))
    }

    /// Wires the service to any chain source, e.g. an in-memory one in tests.
    pub fn with_sources<S>(
        deployment: Deployment,
        trading: TradingConfig,
        cache: CurveQuoteCache,
        metrics: Arc<Metrics>,
        source: Arc<S>,
    ) -> Self
    where
        S: ReserveSource + AllowanceSource + TaxRateSource + CurveSource + 'static,
    {
        let cache = Arc::new(cache.with_counters(metrics.cache_counters()));
        Self {
            builder: TradeCallBuilder::new(deployment).with_cache(cache.clone()),
            cache,
            metrics,
            reserves: source.clone(),
            allowances: source.clone(),
            taxes: source.clone(),
            curves: source,
            trading,
        }
    }

    pub async fn plan_trade(&self, order: TradeOrder) -> Result<TradePlan> {
        let result = self.plan_trade_inner(&order).await;
        match &result {
            Ok(plan) => {
                self.metrics.record_plan(plan.route.as_str());
                info!(
                    route = plan.route.as_str(),
                    calls = plan.calls.len(),
                    amount_in = %plan.quote.amount_in,
                    amount_out = %plan.quote.amount_out,
                    "Trade plan built"
                );
            }
            Err(e) => {
                self.metrics.record_rejection(e);
                warn!(kind = e.kind(), "Trade rejected: {e}");
            }
        }
        result
    }

    async fn plan_trade_inner(&self, order: &TradeOrder) -> Result<TradePlan> {
        let request = TradeRequest {
            kind: order.trade,
            sell: order.sell,
            buy: order.buy,
            slippage_bps: order.slippage_bps.unwrap_or(self.trading.default_slippage_bps),
            recipient: order.recipient,
            deadline: order.deadline.unwrap_or_else(|| self.default_deadline()),
        };

        let curve_coin = order
            .coin_id
            .map(|_| if request.sell.is_native() { request.buy } else { request.sell });
        let spender = self.builder.spender(&request, &order.pools, curve_coin.as_ref());
        let owner = order.owner.unwrap_or(order.recipient);

        let (pools, curve, authorization) = tokio::try_join!(
            self.fetch_pools(&order.pools),
            self.fetch_curve(order.coin_id, curve_coin),
            self.fetch_authorization(owner, spender, &request.sell)
        )?;

        let snapshot = TradeSnapshot {
            pools,
            curve,
            authorization,
        };
        debug!(pools = snapshot.pools.len(), curve = snapshot.curve.is_some(), "Snapshot fetched");

        self.builder.build(&request, &snapshot)
    }

    pub async fn curve_quote(&self, coin_id: U256, query: CurveQuery) -> Result<CurveQuote> {
        let state = self.curve_state(coin_id).await?;

        let (eth, coins) = match query {
            CurveQuery::EthIn(eth_in) => (eth_in, self.cache.coins_for_eth(eth_in, &state)?),
            CurveQuery::CoinsOut(coins_out) => {
                let coins = curve::quantize_down(coins_out);
                (curve::buy_cost(coins, &state)?, coins)
            }
        };

        let stats = self.cache.stats();
        debug!(hits = stats.hits, misses = stats.misses, "Curve quote served");

        Ok(CurveQuote {
            coin_id,
            eth,
            coins,
            net_sold: state.net_sold,
            remaining: state.remaining(),
        })
    }

    pub fn metrics_text(&self) -> Result<String> {
        self.metrics.render()
    }

    fn default_deadline(&self) -> U256 {
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        U256::from(now.saturating_add(self.trading.deadline_secs))
    }

    async fn curve_state(&self, coin_id: U256) -> Result<CurveState> {
        self.curves
            .curve_state(coin_id)
            .await?
            .ok_or(SwaplineError::MissingReserves(coin_id))
    }

    /// All pools are read at once; the result keeps the order of `keys`.
    async fn fetch_pools(&self, keys: &[PoolKey]) -> Result<Vec<PoolSnapshot>> {
        let mut tasks = JoinSet::new();
        for (index, key) in keys.iter().cloned().enumerate() {
            let reserves = self.reserves.clone();
            let taxes = self.taxes.clone();
            tasks.spawn(async move {
                let (reserves, tax_bps) = tokio::try_join!(reserves.reserves(&key), fetch_tax(taxes.as_ref(), &key))?;
                Ok::<_, SwaplineError>((index, PoolSnapshot { key, reserves, tax_bps }))
            });
        }

        let mut pools: Vec<Option<PoolSnapshot>> = vec![None; keys.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, pool) =
                joined.map_err(|e| SwaplineError::RpcError(format!("Pool fetch task failed: {e}")))??;
            pools[index] = Some(pool);
        }
        Ok(pools.into_iter().flatten().collect())
    }

    async fn fetch_curve(&self, coin_id: Option<U256>, coin: Option<Asset>) -> Result<Option<CurveSale>> {
        match (coin_id, coin) {
            (Some(coin_id), Some(coin)) => Ok(Some(CurveSale {
                coin_id,
                coin,
                state: self.curves.curve_state(coin_id).await?,
            })),
            _ => Ok(None),
        }
    }

    async fn fetch_authorization(
        &self,
        owner: Address,
        spender: Option<Address>,
        asset: &Asset,
    ) -> Result<Option<Authorization>> {
        match spender {
            Some(spender) => self.allowances.authorization(owner, spender, asset).await,
            None => Ok(None),
        }
    }
}

async fn fetch_tax(taxes: &dyn TaxRateSource, key: &PoolKey) -> Result<Option<Bps>> {
    if key.is_taxed() {
        taxes.tax_bps(key).await
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amm;
    use crate::calls::RouteKind;
    use crate::curve::UNIT_SCALE;
    use crate::models::ReserveSnapshot;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryChain {
        reserves: HashMap<U256, ReserveSnapshot>,
        taxes: HashMap<U256, Bps>,
        curves: HashMap<U256, CurveState>,
        allowance: Option<Authorization>,
        tax_queries: Mutex<u32>,
    }

    #[async_trait]
    impl ReserveSource for MemoryChain {
        async fn reserves(&self, key: &PoolKey) -> Result<Option<ReserveSnapshot>> {
            Ok(self.reserves.get(&key.pool_id()).copied())
        }
    }

    #[async_trait]
    impl AllowanceSource for MemoryChain {
        async fn authorization(&self, _owner: Address, _spender: Address, _asset: &Asset) -> Result<Option<Authorization>> {
            Ok(self.allowance)
        }
    }

    #[async_trait]
    impl TaxRateSource for MemoryChain {
        async fn tax_bps(&self, key: &PoolKey) -> Result<Option<Bps>> {
            *self.tax_queries.lock().unwrap() += 1;
            Ok(self.taxes.get(&key.pool_id()).copied())
        }
    }

    #[async_trait]
    impl CurveSource for MemoryChain {
        async fn curve_state(&self, coin_id: U256) -> Result<Option<CurveState>> {
            Ok(self.curves.get(&coin_id).copied())
        }
    }

    /// Holds every reserve read until `parties` of them are in flight.
    struct GatedChain {
        inner: MemoryChain,
        gate: tokio::sync::Barrier,
    }

    #[async_trait]
    impl ReserveSource for GatedChain {
        async fn reserves(&self, key: &PoolKey) -> Result<Option<ReserveSnapshot>> {
            self.gate.wait().await;
            self.inner.reserves(key).await
        }
    }

    #[async_trait]
    impl AllowanceSource for GatedChain {
        async fn authorization(&self, owner: Address, spender: Address, asset: &Asset) -> Result<Option<Authorization>> {
            self.inner.authorization(owner, spender, asset).await
        }
    }

    #[async_trait]
    impl TaxRateSource for GatedChain {
        async fn tax_bps(&self, key: &PoolKey) -> Result<Option<Bps>> {
            self.inner.tax_bps(key).await
        }
    }

    #[async_trait]
    impl CurveSource for GatedChain {
        async fn curve_state(&self, coin_id: U256) -> Result<Option<CurveState>> {
            self.inner.curve_state(coin_id).await
        }
    }

    struct FailingChain;

    #[async_trait]
    impl ReserveSource for FailingChain {
        async fn reserves(&self, _key: &PoolKey) -> Result<Option<ReserveSnapshot>> {
            Err(SwaplineError::RpcError("connection refused".to_string()))
        }
    }

    #[async_trait]
    impl AllowanceSource for FailingChain {
        async fn authorization(&self, _owner: Address, _spender: Address, _asset: &Asset) -> Result<Option<Authorization>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl TaxRateSource for FailingChain {
        async fn tax_bps(&self, _key: &PoolKey) -> Result<Option<Bps>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl CurveSource for FailingChain {
        async fn curve_state(&self, _coin_id: U256) -> Result<Option<CurveState>> {
            Ok(None)
        }
    }

    fn ether(n: u64) -> U256 {
        U256::from(n) * U256::exp10(18)
    }

    fn token() -> Asset {
        Asset::Erc20 { address: Address::repeat_byte(0x11) }
    }

    fn key(hook: Address) -> PoolKey {
        PoolKey {
            id0: U256::zero(),
            id1: U256::zero(),
            token0: Address::zero(),
            token1: Address::repeat_byte(0x11),
            fee_bps: 30,
            hook,
        }
    }

    fn service<S>(source: S) -> TradeService
    where
        S: ReserveSource + AllowanceSource + TaxRateSource + CurveSource + 'static,
    {
        TradeService::with_sources(
            Deployment {
                amm: Address::repeat_byte(0xa1),
                tax_router: Address::repeat_byte(0xa2),
                curve: Address::repeat_byte(0xa3),
            },
            TradingConfig {
                default_slippage_bps: 50,
                deadline_secs: 600,
            },
            CurveQuoteCache::new(std::time::Duration::from_secs(5), 32),
            Arc::new(Metrics::new().unwrap()),
            Arc::new(source),
        )
    }

    fn order(trade: TradeKind, sell: Asset, buy: Asset, pools: Vec<PoolKey>) -> TradeOrder {
        TradeOrder {
            trade,
            sell,
            buy,
            recipient: Address::repeat_byte(0xee),
            owner: None,
            slippage_bps: None,
            deadline: Some(U256::from(1_700_000_000u64)),
            pools,
            coin_id: None,
        }
    }

    #[test]
    fn plans_native_in_trade_with_default_slippage() {
        let pool = key(Address::zero());
        let mut chain = MemoryChain::default();
        chain
            .reserves
            .insert(pool.pool_id(), ReserveSnapshot::new(ether(1_000), ether(2_000_000)));
        let service = service(chain);

        let plan = tokio_test::block_on(service.plan_trade(order(
            TradeKind::ExactIn(ether(1)),
            Asset::Native,
            token(),
            vec![pool],
        )))
        .unwrap();

        assert_eq!(plan.route, RouteKind::NativeIn);
        assert_eq!(plan.quote.slippage_bps, 50);
        assert_eq!(plan.calls.len(), 1);
        assert!(service.metrics_text().unwrap().contains("route=\"nativeIn\""));
    }

    #[test]
    fn tax_rate_is_only_fetched_for_hooked_pools() {
        let plain = key(Address::zero());
        let taxed = key(Address::repeat_byte(0x77));
        let mut chain = MemoryChain::default();
        chain
            .reserves
            .insert(plain.pool_id(), ReserveSnapshot::new(ether(1_000), ether(2_000_000)));
        chain
            .reserves
            .insert(taxed.pool_id(), ReserveSnapshot::new(ether(1_000), ether(2_000_000)));
        chain.taxes.insert(taxed.pool_id(), 10);
        let chain = Arc::new(chain);
        let service = TradeService::with_sources(
            Deployment {
                amm: Address::repeat_byte(0xa1),
                tax_router: Address::repeat_byte(0xa2),
                curve: Address::repeat_byte(0xa3),
            },
            TradingConfig {
                default_slippage_bps: 100,
                deadline_secs: 600,
            },
            CurveQuoteCache::new(std::time::Duration::from_secs(5), 32),
            Arc::new(Metrics::new().unwrap()),
            chain.clone(),
        );

        let plan = tokio_test::block_on(service.plan_trade(order(
            TradeKind::ExactIn(ether(1)),
            Asset::Native,
            token(),
            vec![taxed, plain],
        )))
        .unwrap();

        assert!(plan.taxed);
        assert_eq!(plan.quote.slippage_bps, 110);
        assert_eq!(*chain.tax_queries.lock().unwrap(), 1);
    }

    #[test]
    fn pools_are_read_concurrently_and_keep_their_order() {
        let first = key(Address::zero());
        let mut second = key(Address::zero());
        second.token1 = Address::repeat_byte(0x22);
        let mut inner = MemoryChain::default();
        for pool in [&first, &second] {
            inner
                .reserves
                .insert(pool.pool_id(), ReserveSnapshot::new(ether(1_000), ether(2_000_000)));
        }
        inner.allowance = Some(Authorization::Allowance(U256::MAX));
        let service = service(GatedChain {
            inner,
            gate: tokio::sync::Barrier::new(2),
        });

        let plan = tokio_test::block_on(async {
            tokio::time::timeout(
                std::time::Duration::from_secs(5),
                service.plan_trade(order(
                    TradeKind::ExactIn(ether(1)),
                    token(),
                    Asset::Erc20 { address: Address::repeat_byte(0x22) },
                    vec![first, second],
                )),
            )
            .await
        })
        .expect("reserve reads were serialized")
        .unwrap();

        assert_eq!(plan.route, RouteKind::TokenToToken);
        let bridged = amm::amount_out(ether(1), ether(2_000_000), ether(1_000), 30).unwrap();
        assert_eq!(plan.quote.amount_out, amm::amount_out(bridged, ether(1_000), ether(2_000_000), 30).unwrap());
    }

    #[test]
    fn token_sale_fetches_allowance_and_prepends_approval() {
        let pool = key(Address::zero());
        let mut chain = MemoryChain::default();
        chain
            .reserves
            .insert(pool.pool_id(), ReserveSnapshot::new(ether(1_000), ether(2_000_000)));
        chain.allowance = Some(Authorization::Allowance(U256::zero()));
        let service = service(chain);

        let plan = tokio_test::block_on(service.plan_trade(order(
            TradeKind::ExactIn(ether(10)),
            token(),
            Asset::Native,
            vec![pool],
        )))
        .unwrap();
        assert_eq!(plan.calls.len(), 2);
        assert_eq!(plan.calls[0].to, Address::repeat_byte(0x11));
    }

    #[test]
    fn curve_quote_reads_state_and_uses_cache() {
        let unit = U256::from(UNIT_SCALE);
        let state = CurveState {
            net_sold: U256::zero(),
            sale_cap: U256::from(1_000u64) * unit,
            quad_cap: U256::from(100u64) * unit,
            divisor: U256::from(1_000_000u64),
        };
        let mut chain = MemoryChain::default();
        chain.curves.insert(U256::from(7), state);
        let service = service(chain);

        let by_coins = tokio_test::block_on(service.curve_quote(U256::from(7), CurveQuery::CoinsOut(U256::from(2u64) * unit + U256::one())))
            .unwrap();
        assert_eq!(by_coins.coins, U256::from(2u64) * unit);
        assert_eq!(by_coins.eth, curve::buy_cost(by_coins.coins, &state).unwrap());
        assert_eq!(by_coins.remaining, state.sale_cap);

        let eth_in = U256::exp10(16);
        let first = tokio_test::block_on(service.curve_quote(U256::from(7), CurveQuery::EthIn(eth_in))).unwrap();
        let second = tokio_test::block_on(service.curve_quote(U256::from(7), CurveQuery::EthIn(eth_in))).unwrap();
        assert_eq!(first, second);
        assert!(service.metrics_text().unwrap().contains("swapline_curve_cache_hits_total 1"));

        let missing = tokio_test::block_on(service.curve_quote(U256::from(8), CurveQuery::EthIn(eth_in)));
        assert!(matches!(missing, Err(SwaplineError::MissingReserves(_))));
    }

    #[test]
    fn collaborator_failures_propagate_and_are_counted() {
        let service = service(FailingChain);
        let err = tokio_test::block_on(service.plan_trade(order(
            TradeKind::ExactIn(ether(1)),
            Asset::Native,
            token(),
            vec![key(Address::zero())],
        )))
        .unwrap_err();

        assert!(matches!(err, SwaplineError::RpcError(_)));
        assert!(!err.is_pricing_error());
        assert!(service.metrics_text().unwrap().contains("kind=\"rpc\""));
    }
}
