/*
 * Swapline - pricing kernel and trade-call builder
 * Core library exports and module declarations
 */

pub mod amm;
pub mod api;
pub mod calls;
pub mod chain;
pub mod config;
pub mod curve;
pub mod metrics;
pub mod models;
pub mod rpc;
pub mod service;
pub mod utils;

pub use calls::{TradeCallBuilder, TradePlan};
pub use config::Config;
pub use models::*;
pub use service::TradeService;
