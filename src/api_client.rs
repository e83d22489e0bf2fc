use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{BYBIT_PUBLIC_URL, HTTP_CONNECT_TIMEOUT_SECS, HTTP_TIMEOUT_SECS};
use crate::rules::Rule;
use crate::types::{Position, Side};

// ── Error types ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    /// Network failure, timeout, or a body we could not parse.
    Transport(String),
    /// Application-level error payload from the service.
    Service(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Transport(msg) => write!(f, "transport error: {}", msg),
            ApiError::Service(msg) => write!(f, "service error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

// ── Wire shapes ───────────────────────────────────────────────────────────────

/// Body of POST /api/tp-sl/set. Also reused when re-applying the remainder
/// after a single rule removal.
#[derive(Clone, Debug, Serialize)]
pub struct SetRulesRequest {
    pub symbol: String,
    pub category: String,
    pub side: Side,
    pub original_size: f64,
    pub rules: Vec<Rule>,
}

#[derive(Deserialize)]
struct PositionsEnvelope {
    #[serde(default)]
    positions: Option<Vec<Position>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct MutationEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

// ── Client ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RuleServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl RuleServiceClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .build()
            .expect("HTTP client build failed");

        RuleServiceClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Poll the position snapshot. An `error` field in the envelope counts as
    /// a service error even when the transport succeeded.
    pub async fn fetch_positions(&self, category: &str) -> Result<Vec<Position>, ApiError> {
        let url = format!("{}/api/positions?category={}", self.base_url, category);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Transport(format!("HTTP error: {}", e)))?;

        let envelope: PositionsEnvelope = resp
            .json()
            .await
            .map_err(|e| ApiError::Transport(format!("Parse error: {}", e)))?;

        if let Some(msg) = envelope.error {
            return Err(ApiError::Service(msg));
        }
        Ok(envelope.positions.unwrap_or_default())
    }

    /// Apply (or re-apply) a rule set for one symbol.
    pub async fn submit_rules(&self, request: &SetRulesRequest) -> Result<(), ApiError> {
        let url = format!("{}/api/tp-sl/set", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::Transport(format!("HTTP error: {}", e)))?;

        let envelope: MutationEnvelope = resp
            .json()
            .await
            .map_err(|e| ApiError::Transport(format!("Parse error: {}", e)))?;

        if envelope.success {
            log::info!(
                "Rules applied: {} ({} rule(s))",
                request.symbol,
                request.rules.len()
            );
            Ok(())
        } else {
            Err(ApiError::Service(envelope.error.unwrap_or_else(|| {
                "rule service rejected the request".to_string()
            })))
        }
    }

    /// Remove the whole monitor for a symbol.
    pub async fn remove_all_rules(&self, symbol: &str) -> Result<(), ApiError> {
        let url = format!("{}/api/tp-sl/remove/{}", self.base_url, symbol);
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| ApiError::Transport(format!("HTTP error: {}", e)))?;

        let envelope: MutationEnvelope = resp
            .json()
            .await
            .map_err(|e| ApiError::Transport(format!("Parse error: {}", e)))?;

        if envelope.success {
            log::info!("Rules removed: {}", symbol);
            Ok(())
        } else {
            Err(ApiError::Service(envelope.error.unwrap_or_else(|| {
                "rule service rejected the removal".to_string()
            })))
        }
    }

    /// Market-close a position through the service.
    pub async fn close_position(&self, symbol: &str, category: &str) -> Result<(), ApiError> {
        let url = format!("{}/api/close-position", self.base_url);
        let body = serde_json::json!({
            "symbol": symbol,
            "category": category,
        });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Transport(format!("HTTP error: {}", e)))?;

        let envelope: MutationEnvelope = resp
            .json()
            .await
            .map_err(|e| ApiError::Transport(format!("Parse error: {}", e)))?;

        if envelope.success {
            log::info!("Position closed: {}", symbol);
            Ok(())
        } else {
            Err(ApiError::Service(envelope.error.unwrap_or_else(|| {
                "close order rejected".to_string()
            })))
        }
    }

    /// Current BTCUSDT spot price from the public Bybit ticker endpoint.
    pub async fn fetch_btc_price(&self) -> Result<f64, ApiError> {
        let url = format!(
            "{}/v5/market/tickers?category=spot&symbol=BTCUSDT",
            BYBIT_PUBLIC_URL
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Transport(format!("HTTP error: {}", e)))?;

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ApiError::Transport(format!("Parse error: {}", e)))?;

        let ret_code = json["retCode"].as_i64().unwrap_or(-1);
        if ret_code != 0 {
            let msg = json["retMsg"].as_str().unwrap_or("unknown");
            return Err(ApiError::Service(msg.to_string()));
        }

        json["result"]["list"]
            .as_array()
            .and_then(|list| list.first())
            .and_then(|ticker| ticker["lastPrice"].as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| ApiError::Transport("ticker response missing lastPrice".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_rules_request_serializes_wire_shape() {
        let request = SetRulesRequest {
            symbol: "SOLUSDT".to_string(),
            category: "linear".to_string(),
            side: Side::Buy,
            original_size: 10.0,
            rules: vec![Rule::set_sl(90000.0, 1.5)],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["symbol"], "SOLUSDT");
        assert_eq!(json["side"], "Buy");
        assert_eq!(json["original_size"], 10.0);
        assert_eq!(json["rules"][0]["type"], "set_sl");
        assert_eq!(json["rules"][0]["close_percent"], 100.0);
    }

    #[test]
    fn error_envelope_beats_positions() {
        let envelope: PositionsEnvelope =
            serde_json::from_str(r#"{"error": "API credentials not configured"}"#).unwrap();
        assert!(envelope.positions.is_none());
        assert_eq!(envelope.error.as_deref(), Some("API credentials not configured"));
    }
}
