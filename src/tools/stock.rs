/// Stock Quote Tool
///
/// get_stock_price reads the chart endpoint of a Yahoo-Finance-compatible
/// quote API. The market (and fallback currency) is inferred from the symbol
/// suffix: `.NS` for NSE, `.BO` for BSE, anything else is treated as US.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::error::ToolError;
use crate::core::registry::{Arguments, RegistryError, ToolDescriptor, ToolHandler, ToolRegistry};
use crate::tools::http::HttpClient;
use crate::tools::required_str;

pub fn register(
    registry: &mut ToolRegistry,
    http: &HttpClient,
    stock_url: &str,
) -> Result<(), RegistryError> {
    registry.register(
        ToolDescriptor::new(
            "get_stock_price",
            "Get live stock price for US (NYSE/NASDAQ) or Indian (NSE/BSE) markets. Use .NS suffix for NSE, .BO for BSE, no suffix for US stocks.",
            json!({
                "type": "object",
                "properties": {
                    "symbol": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Stock ticker symbol (e.g., 'AAPL' for Apple, 'RELIANCE.NS' for Reliance on NSE, 'TCS.BO' for TCS on BSE)"
                    }
                },
                "required": ["symbol"]
            }),
        ),
        Arc::new(GetStockPrice {
            http: http.clone(),
            base_url: stock_url.trim_end_matches('/').to_string(),
        }),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Market {
    pub name: &'static str,
    pub currency: &'static str,
}

pub fn detect_market(symbol: &str) -> Market {
    if symbol.ends_with(".NS") {
        Market { name: "NSE", currency: "INR" }
    } else if symbol.ends_with(".BO") {
        Market { name: "BSE", currency: "INR" }
    } else {
        Market { name: "US", currency: "USD" }
    }
}

// Only the fields we read are modeled; everything is optional upstream.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: QuoteMeta,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteMeta {
    symbol: Option<String>,
    short_name: Option<String>,
    currency: Option<String>,
    exchange_name: Option<String>,
    market_state: Option<String>,
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
    chart_previous_close: Option<f64>,
    regular_market_day_high: Option<f64>,
    day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    day_low: Option<f64>,
    regular_market_volume: Option<i64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StockQuote {
    pub symbol: String,
    pub name: String,
    pub market: &'static str,
    pub currency: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub day_high: Value,
    pub day_low: Value,
    pub volume: Value,
    pub market_state: String,
    pub exchange: String,
    pub timestamp: Value,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn or_na<T: Serialize>(value: Option<T>) -> Value {
    value.map_or_else(|| Value::from("N/A"), |v| json!(v))
}

fn quote_from_meta(symbol: &str, meta: QuoteMeta) -> StockQuote {
    let market = detect_market(symbol);
    let price = meta.regular_market_price.unwrap_or(0.0);
    let previous_close = meta
        .previous_close
        .or(meta.chart_previous_close)
        .unwrap_or(0.0);

    let (change, change_percent) = if previous_close != 0.0 {
        let change = round2(price - previous_close);
        (change, round2(change / previous_close * 100.0))
    } else {
        (0.0, 0.0)
    };

    StockQuote {
        symbol: symbol.to_string(),
        name: meta
            .short_name
            .or(meta.symbol)
            .unwrap_or_else(|| symbol.to_string()),
        market: market.name,
        currency: meta.currency.unwrap_or_else(|| market.currency.to_string()),
        price,
        change,
        change_percent,
        day_high: or_na(meta.regular_market_day_high.or(meta.day_high)),
        day_low: or_na(meta.regular_market_day_low.or(meta.day_low)),
        volume: or_na(meta.regular_market_volume),
        market_state: meta.market_state.unwrap_or_else(|| "UNKNOWN".to_string()),
        exchange: meta.exchange_name.unwrap_or_else(|| market.name.to_string()),
        timestamp: or_na(meta.regular_market_time),
    }
}

struct GetStockPrice {
    http: HttpClient,
    base_url: String,
}

impl GetStockPrice {
    async fn fetch(&self, symbol: &str) -> Result<StockQuote, ToolError> {
        let url = format!("{}/{}", self.base_url, urlencoding::encode(symbol));
        let response = match self.http.get(&url).await {
            Ok(response) => response,
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => {
                return Err(ToolError::failed(format!(
                    "Symbol not found: {symbol}. For Indian stocks, use .NS (NSE) or .BO (BSE) suffix."
                )));
            }
            Err(e) if e.is_status() => return Err(e.into()),
            Err(e) => {
                return Err(ToolError::failed(format!("Error fetching stock price: {e}")));
            }
        };

        let chart: ChartResponse = response
            .json()
            .await
            .map_err(|e| ToolError::failed(format!("Error fetching stock price: {e}")))?;
        let Some(first) = chart.chart.result.and_then(|results| results.into_iter().next()) else {
            return Err(ToolError::failed(format!("No data found for symbol: {symbol}")));
        };
        Ok(quote_from_meta(symbol, first.meta))
    }
}

#[async_trait]
impl ToolHandler for GetStockPrice {
    async fn call(&self, args: Arguments) -> Result<Value, ToolError> {
        let symbol = required_str(&args, "symbol")?.trim().to_uppercase();
        let quote = self.fetch(&symbol).await?;
        tracing::debug!(symbol = %quote.symbol, price = quote.price, "stock quote fetched");
        serde_json::to_value(quote).map_err(|e| ToolError::Internal(e.to_string()))
    }
}
