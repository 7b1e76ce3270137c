/*
 * REST API module for the trade planning service
 */

use crate::calls::TradePlan;
use crate::config::Config;
use crate::models::SwaplineError;
use crate::service::{CurveQuery, CurveQuote, TradeOrder, TradeService};
use crate::utils::parse_uint;
use rocket::http::{ContentType, Status};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{get, post, routes, State};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

pub struct ApiState {
    pub config: Config,
    pub service: Arc<TradeService>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: &'static str,
    pub message: &'static str,
    pub detail: String,
}

type ApiResult<T> = std::result::Result<Json<T>, Custom<Json<ApiError>>>;

/// Kernel errors are the caller's to fix; anything else is upstream trouble.
fn reject(e: &SwaplineError) -> Custom<Json<ApiError>> {
    let status = match e {
        SwaplineError::InvalidAmount(_) => Status::BadRequest,
        e if e.is_pricing_error() => Status::UnprocessableEntity,
        _ => {
            error!("Upstream failure: {e}");
            Status::BadGateway
        }
    };
    Custom(
        status,
        Json(ApiError {
            error: e.kind(),
            message: e.user_message(),
            detail: e.to_string(),
        }),
    )
}

#[post("/api/v1/trade", format = "json", data = "<order>")]
pub async fn plan_trade(order: Json<TradeOrder>, state: &State<ApiState>) -> ApiResult<TradePlan> {
    state
        .service
        .plan_trade(order.into_inner())
        .await
        .map(Json)
        .map_err(|e| reject(&e))
}

#[get("/api/v1/curve/<coin_id>/quote?<eth_in>&<coins_out>")]
pub async fn curve_quote(
    coin_id: &str,
    eth_in: Option<&str>,
    coins_out: Option<&str>,
    state: &State<ApiState>,
) -> ApiResult<CurveQuote> {
    let coin_id = parse_uint(coin_id).map_err(|e| reject(&e))?;
    let query = match (eth_in, coins_out) {
        (Some(eth), None) => CurveQuery::EthIn(parse_uint(eth).map_err(|e| reject(&e))?),
        (None, Some(coins)) => CurveQuery::CoinsOut(parse_uint(coins).map_err(|e| reject(&e))?),
        _ => {
            return Err(reject(&SwaplineError::InvalidAmount(
                "exactly one of eth_in or coins_out is required".to_string(),
            )))
        }
    };

    state
        .service
        .curve_quote(coin_id, query)
        .await
        .map(Json)
        .map_err(|e| reject(&e))
}

#[get("/metrics")]
pub fn metrics(state: &State<ApiState>) -> std::result::Result<(ContentType, String), Custom<String>> {
    state
        .service
        .metrics_text()
        .map(|body| (ContentType::Plain, body))
        .map_err(|e| Custom(Status::InternalServerError, e.to_string()))
}

#[get("/health")]
pub async fn health_check() -> &'static str {
    "OK"
}

#[must_use]
pub fn create_rocket(state: ApiState) -> rocket::Rocket<rocket::Build> {
    let figment = rocket::Config::figment()
        .merge(("address", state.config.server.host.clone()))
        .merge(("port", state.config.server.port));

    rocket::custom(figment)
        .manage(state)
        .mount("/", routes![plan_trade, curve_quote, metrics, health_check])
}
