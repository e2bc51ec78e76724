//! Currency conversion tool.
//!
//! Converts an amount between currencies using the latest exchange rates.
//! Where the rates come from is a [`RateSource`]: the public open.er-api.com
//! endpoint in production, a fixed table in tests and offline runs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use toolwright_core::tool::{ExecutionFailure, ParamType, ParameterSchema, ToolExecutor, ToolSpec};

pub const TOOL_NAME: &str = "convert_currency";

/// Supplies exchange rates.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Units of `to` per one unit of `from`. Codes are upper-case ISO 4217.
    async fn rate(&self, from: &str, to: &str) -> Result<f64, ExecutionFailure>;
}

/// Rates from the open.er-api.com "latest" endpoint.
pub struct OpenExchangeRates {
    base_url: String,
    client: reqwest::Client,
}

impl OpenExchangeRates {
    pub fn new() -> Self {
        Self::with_base_url("https://open.er-api.com/v6")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                warn!(
                    error = %e,
                    "Failed to build rates client, using defaults without timeout"
                );
                reqwest::Client::new()
            });
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

impl Default for OpenExchangeRates {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    result: String,
    #[serde(default, rename = "error-type")]
    error_type: Option<String>,
    #[serde(default)]
    rates: Option<HashMap<String, f64>>,
}

impl LatestRates {
    fn rate_for(self, from: &str, to: &str) -> Result<f64, ExecutionFailure> {
        if self.result != "success" {
            let reason = self.error_type.unwrap_or(self.result);
            return Err(ExecutionFailure::new(format!(
                "rate lookup for {from} failed: {reason}"
            )));
        }
        let rates = self
            .rates
            .ok_or_else(|| ExecutionFailure::new(format!("no rates returned for {from}")))?;
        rates
            .get(to)
            .copied()
            .ok_or_else(|| ExecutionFailure::new(format!("unknown currency: {to}")))
    }
}

#[async_trait]
impl RateSource for OpenExchangeRates {
    async fn rate(&self, from: &str, to: &str) -> Result<f64, ExecutionFailure> {
        let url = format!("{}/latest/{from}", self.base_url);
        debug!(%url, "Fetching exchange rates");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExecutionFailure::new(format!("exchange rate request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() && status.as_u16() != 404 {
            return Err(ExecutionFailure::new(format!(
                "exchange rate service returned {status}"
            )));
        }

        let payload: LatestRates = response
            .json()
            .await
            .map_err(|e| ExecutionFailure::new(format!("unreadable exchange rates: {e}")))?;
        payload.rate_for(from, to)
    }
}

/// A fixed rate table.
///
/// A pair that is not listed is derived from its inverse when possible.
#[derive(Debug, Clone, Default)]
pub struct StaticRates {
    rates: HashMap<(String, String), f64>,
}

impl StaticRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, from: &str, to: &str, rate: f64) -> Self {
        self.rates
            .insert((from.to_uppercase(), to.to_uppercase()), rate);
        self
    }
}

#[async_trait]
impl RateSource for StaticRates {
    async fn rate(&self, from: &str, to: &str) -> Result<f64, ExecutionFailure> {
        if from == to {
            return Ok(1.0);
        }
        if let Some(rate) = self.rates.get(&(from.to_string(), to.to_string())) {
            return Ok(*rate);
        }
        match self.rates.get(&(to.to_string(), from.to_string())) {
            Some(inverse) if *inverse != 0.0 => Ok(1.0 / inverse),
            _ => Err(ExecutionFailure::new(format!(
                "no exchange rate from {from} to {to}"
            ))),
        }
    }
}

/// Successful conversion, as returned to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub amount: f64,
    pub from: String,
    pub to: String,
    pub rate: f64,
    pub converted: f64,
}

/// Executor half of `convert_currency`.
pub struct CurrencyConverter<S> {
    source: S,
}

impl<S: RateSource> CurrencyConverter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

fn currency_code(arguments: &Map<String, Value>, name: &str) -> Result<String, ExecutionFailure> {
    let code = arguments
        .get(name)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_uppercase())
        .unwrap_or_default();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ExecutionFailure::new(format!(
            "{name} must be a three-letter currency code"
        )));
    }
    Ok(code)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[async_trait]
impl<S: RateSource> ToolExecutor for CurrencyConverter<S> {
    async fn execute(&self, arguments: &Map<String, Value>) -> Result<Value, ExecutionFailure> {
        let amount = arguments
            .get("amount")
            .and_then(Value::as_f64)
            .filter(|a| a.is_finite() && *a >= 0.0)
            .ok_or_else(|| ExecutionFailure::new("amount must be a non-negative number"))?;
        let from = currency_code(arguments, "from_currency")?;
        let to = currency_code(arguments, "to_currency")?;

        let rate = self.source.rate(&from, &to).await?;
        let conversion = Conversion {
            amount,
            from,
            to,
            rate,
            converted: round_cents(amount * rate),
        };

        serde_json::to_value(&conversion)
            .map_err(|e| ExecutionFailure::new(format!("unserializable conversion: {e}")))
    }
}

/// The `convert_currency` tool backed by `source`.
pub fn convert_currency_spec(source: impl RateSource + 'static) -> ToolSpec {
    ToolSpec::new(
        TOOL_NAME,
        "Converts currency using latest exchange rates.",
        ParameterSchema::new()
            .required("amount", ParamType::Number, "Amount to convert")
            .required("from_currency", ParamType::String, "Source currency code (e.g. USD)")
            .required("to_currency", ParamType::String, "Target currency code (e.g. EUR)"),
        CurrencyConverter::new(source),
    )
}
