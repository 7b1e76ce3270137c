/*
 * Calldata encoders for the AMM, the taxed-pool router, the curve sale and token authorization
 */

use crate::models::PoolKey;
use ethers::{
    abi::{encode, Token},
    types::{Address, Bytes, U256},
    utils::keccak256,
};

const POOL_KEY_TUPLE: &str = "(uint256,uint256,address,address,uint256,address)";

pub(crate) fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub(crate) fn encode_call(signature: &str, params: &[Token]) -> Bytes {
    let mut call_data = Vec::from(selector(signature));
    call_data.extend_from_slice(&encode(params));
    Bytes::from(call_data)
}

fn swap_signature(name: &str) -> String {
    format!("{name}({POOL_KEY_TUPLE},uint256,uint256,bool,address,uint256)")
}

fn swap_params(key: &PoolKey, amount: U256, limit: U256, zero_for_one: bool, to: Address, deadline: U256) -> Vec<Token> {
    vec![
        key.to_token(),
        Token::Uint(amount),
        Token::Uint(limit),
        Token::Bool(zero_for_one),
        Token::Address(to),
        Token::Uint(deadline),
    ]
}

/// Standard AMM exact-input swap. An `amount_in` of zero spends whatever the
/// preceding call in the same multicall credited to the AMM.
pub fn swap_exact_in(
    key: &PoolKey,
    amount_in: U256,
    amount_out_min: U256,
    zero_for_one: bool,
    to: Address,
    deadline: U256,
) -> Bytes {
    encode_call(
        &swap_signature("swapExactIn"),
        &swap_params(key, amount_in, amount_out_min, zero_for_one, to, deadline),
    )
}

pub fn swap_exact_out(
    key: &PoolKey,
    amount_out: U256,
    amount_in_max: U256,
    zero_for_one: bool,
    to: Address,
    deadline: U256,
) -> Bytes {
    encode_call(
        &swap_signature("swapExactOut"),
        &swap_params(key, amount_out, amount_in_max, zero_for_one, to, deadline),
    )
}

/// Taxed-pool router entry points; the hook takes its cut inside the call.
pub fn swap_exact_in_taxed(
    key: &PoolKey,
    amount_in: U256,
    amount_out_min: U256,
    zero_for_one: bool,
    to: Address,
    deadline: U256,
) -> Bytes {
    encode_call(
        &swap_signature("swapExactInTaxed"),
        &swap_params(key, amount_in, amount_out_min, zero_for_one, to, deadline),
    )
}

pub fn swap_exact_out_taxed(
    key: &PoolKey,
    amount_out: U256,
    amount_in_max: U256,
    zero_for_one: bool,
    to: Address,
    deadline: U256,
) -> Bytes {
    encode_call(
        &swap_signature("swapExactOutTaxed"),
        &swap_params(key, amount_out, amount_in_max, zero_for_one, to, deadline),
    )
}

pub fn multicall(calls: Vec<Bytes>) -> Bytes {
    let inner = calls.into_iter().map(|c| Token::Bytes(c.to_vec())).collect();
    encode_call("multicall(bytes[])", &[Token::Array(inner)])
}

pub fn buy_for_exact_eth(coin_id: U256, min_coins: U256, to: Address, deadline: U256) -> Bytes {
    encode_call(
        "buyForExactETH(uint256,uint256,address,uint256)",
        &[Token::Uint(coin_id), Token::Uint(min_coins), Token::Address(to), Token::Uint(deadline)],
    )
}

pub fn buy_exact_coins(coin_id: U256, coins_out: U256, max_eth: U256, to: Address, deadline: U256) -> Bytes {
    encode_call(
        "buyExactCoins(uint256,uint256,uint256,address,uint256)",
        &[
            Token::Uint(coin_id),
            Token::Uint(coins_out),
            Token::Uint(max_eth),
            Token::Address(to),
            Token::Uint(deadline),
        ],
    )
}

pub fn sell_exact_coins(coin_id: U256, coins_in: U256, min_eth: U256, to: Address, deadline: U256) -> Bytes {
    encode_call(
        "sellExactCoins(uint256,uint256,uint256,address,uint256)",
        &[
            Token::Uint(coin_id),
            Token::Uint(coins_in),
            Token::Uint(min_eth),
            Token::Address(to),
            Token::Uint(deadline),
        ],
    )
}

pub fn sell_for_exact_eth(coin_id: U256, eth_out: U256, max_coins: U256, to: Address, deadline: U256) -> Bytes {
    encode_call(
        "sellForExactETH(uint256,uint256,uint256,address,uint256)",
        &[
            Token::Uint(coin_id),
            Token::Uint(eth_out),
            Token::Uint(max_coins),
            Token::Address(to),
            Token::Uint(deadline),
        ],
    )
}

pub fn approve(spender: Address, amount: U256) -> Bytes {
    encode_call("approve(address,uint256)", &[Token::Address(spender), Token::Uint(amount)])
}

pub fn set_operator(operator: Address, approved: bool) -> Bytes {
    encode_call("setOperator(address,bool)", &[Token::Address(operator), Token::Bool(approved)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{decode, ParamType};

    #[test]
    fn approve_uses_erc20_selector() {
        let data = approve(Address::repeat_byte(1), U256::from(5));
        assert_eq!(&data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        let params = decode(&[ParamType::Address, ParamType::Uint(256)], &data[4..]).unwrap();
        assert_eq!(params[0], Token::Address(Address::repeat_byte(1)));
        assert_eq!(params[1], Token::Uint(U256::from(5)));
    }

    #[test]
    fn multicall_wraps_inner_calls_in_order() {
        let first = approve(Address::repeat_byte(1), U256::one());
        let second = set_operator(Address::repeat_byte(2), true);
        let data = multicall(vec![first.clone(), second.clone()]);
        assert_eq!(&data[..4], &selector("multicall(bytes[])"));
        let decoded = decode(&[ParamType::Array(Box::new(ParamType::Bytes))], &data[4..]).unwrap();
        assert_eq!(
            decoded[0],
            Token::Array(vec![Token::Bytes(first.to_vec()), Token::Bytes(second.to_vec())])
        );
    }

    #[test]
    fn taxed_and_standard_swaps_differ_only_by_selector() {
        let key = PoolKey {
            id0: U256::zero(),
            id1: U256::zero(),
            token0: Address::zero(),
            token1: Address::repeat_byte(3),
            fee_bps: 30,
            hook: Address::repeat_byte(4),
        };
        let plain = swap_exact_in(&key, U256::one(), U256::zero(), true, Address::zero(), U256::one());
        let taxed = swap_exact_in_taxed(&key, U256::one(), U256::zero(), true, Address::zero(), U256::one());
        assert_ne!(&plain[..4], &taxed[..4]);
        assert_eq!(&plain[4..], &taxed[4..]);
    }
}
