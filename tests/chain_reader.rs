//! ChainReader against a mocked JSON-RPC endpoint

use ethers::abi::{encode, Token};
use ethers::types::{Address, U256};
use ethers::utils::hex;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::sync::Arc;
use swapline::calls::Deployment;
use swapline::chain::{AllowanceSource, ChainReader, CurveSource, ReserveSource, TaxRateSource};
use swapline::models::{Asset, Authorization, PoolKey, SwaplineError};
use swapline::rpc::RpcClient;

fn deployment() -> Deployment {
    Deployment {
        amm: Address::repeat_byte(0xa1),
        tax_router: Address::repeat_byte(0xa2),
        curve: Address::repeat_byte(0xa3),
    }
}

fn pool_key() -> PoolKey {
    PoolKey {
        id0: U256::zero(),
        id1: U256::zero(),
        token0: Address::zero(),
        token1: Address::repeat_byte(0x11),
        fee_bps: 30,
        hook: Address::repeat_byte(0x77),
    }
}

fn rpc_result(result: serde_json::Value) -> String {
    json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string()
}

fn words(values: &[U256]) -> serde_json::Value {
    let tokens: Vec<Token> = values.iter().map(|v| Token::Uint(*v)).collect();
    json!(format!("0x{}", hex::encode(encode(&tokens))))
}

async fn mock_chain_id(server: &mut ServerGuard, chain_id: &str) {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": "eth_chainId"})))
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!(chain_id)))
        .create_async()
        .await;
}

/// Answers `eth_call`s addressed to `to` with `result`.
async fn mock_call(server: &mut ServerGuard, to: Address, result: serde_json::Value) {
    server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(json!({"method": "eth_call"})),
            Matcher::Regex(format!("{to:?}")),
        ]))
        .with_header("content-type", "application/json")
        .with_body(rpc_result(result))
        .create_async()
        .await;
}

async fn reader(server: &ServerGuard) -> ChainReader {
    let rpc = RpcClient::new(&server.url(), 1).await.unwrap();
    ChainReader::new(Arc::new(rpc), deployment())
}

#[tokio::test]
async fn chain_id_mismatch_is_refused() {
    let mut server = Server::new_async().await;
    mock_chain_id(&mut server, "0x2105").await;

    let err = RpcClient::new(&server.url(), 1).await.err().unwrap();
    assert!(matches!(err, SwaplineError::RpcError(msg) if msg.contains("mismatch")));
}

#[tokio::test]
async fn reserves_decode_leading_words() {
    let mut server = Server::new_async().await;
    mock_chain_id(&mut server, "0x1").await;
    mock_call(
        &mut server,
        deployment().amm,
        words(&[U256::from(1_000), U256::from(2_000), U256::from(42)]),
    )
    .await;

    let reserves = reader(&server).await.reserves(&pool_key()).await.unwrap().unwrap();
    assert_eq!(reserves.reserve0, U256::from(1_000));
    assert_eq!(reserves.reserve1, U256::from(2_000));
}

#[tokio::test]
async fn empty_return_means_unknown_pool() {
    let mut server = Server::new_async().await;
    mock_chain_id(&mut server, "0x1").await;
    mock_call(&mut server, deployment().amm, json!("0x")).await;

    assert!(reader(&server).await.reserves(&pool_key()).await.unwrap().is_none());
}

#[tokio::test]
async fn authorization_follows_the_asset_standard() {
    let mut server = Server::new_async().await;
    mock_chain_id(&mut server, "0x1").await;
    let token = Address::repeat_byte(0x11);
    let multi = Address::repeat_byte(0x33);
    mock_call(&mut server, token, words(&[U256::from(500)])).await;
    mock_call(&mut server, multi, words(&[U256::one()])).await;

    let reader = reader(&server).await;
    let owner = Address::repeat_byte(0xee);
    let spender = deployment().amm;

    let erc20 = reader
        .authorization(owner, spender, &Asset::Erc20 { address: token })
        .await
        .unwrap();
    assert_eq!(erc20, Some(Authorization::Allowance(U256::from(500))));

    let erc6909 = reader
        .authorization(owner, spender, &Asset::Erc6909 { contract: multi, id: U256::from(9) })
        .await
        .unwrap();
    assert_eq!(erc6909, Some(Authorization::Operator(true)));

    assert_eq!(reader.authorization(owner, spender, &Asset::Native).await.unwrap(), None);
}

#[tokio::test]
async fn tax_rate_is_range_checked() {
    let mut server = Server::new_async().await;
    mock_chain_id(&mut server, "0x1").await;
    mock_call(&mut server, deployment().tax_router, words(&[U256::from(25)])).await;

    assert_eq!(reader(&server).await.tax_bps(&pool_key()).await.unwrap(), Some(25));
}

#[tokio::test]
async fn oversized_tax_rate_is_a_contract_error() {
    let mut server = Server::new_async().await;
    mock_chain_id(&mut server, "0x1").await;
    mock_call(&mut server, deployment().tax_router, words(&[U256::MAX])).await;

    let err = reader(&server).await.tax_bps(&pool_key()).await.unwrap_err();
    assert!(matches!(err, SwaplineError::ContractError(_)));
}

#[tokio::test]
async fn curve_sale_unpacks_caps() {
    let mut server = Server::new_async().await;
    mock_chain_id(&mut server, "0x1").await;
    let sale_cap = U256::from(1_000_000u64);
    let quad_cap = U256::from(300u64);
    let packed = (sale_cap << 128) | quad_cap;
    mock_call(
        &mut server,
        deployment().curve,
        words(&[U256::from(77), packed, U256::from(1_000_000u64)]),
    )
    .await;

    let state = reader(&server).await.curve_state(U256::from(5)).await.unwrap().unwrap();
    assert_eq!(state.net_sold, U256::from(77));
    assert_eq!(state.sale_cap, sale_cap);
    assert_eq!(state.quad_cap, quad_cap);
    assert_eq!(state.divisor, U256::from(1_000_000u64));
}

#[tokio::test]
async fn unopened_sale_reads_as_none() {
    let mut server = Server::new_async().await;
    mock_chain_id(&mut server, "0x1").await;
    mock_call(&mut server, deployment().curve, words(&[U256::zero(), U256::zero(), U256::zero()])).await;

    assert!(reader(&server).await.curve_state(U256::from(5)).await.unwrap().is_none());
}
