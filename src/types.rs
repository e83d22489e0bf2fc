use serde::{Deserialize, Serialize};

use crate::rules::Rule;

/// Direction of a tracked position, as the data provider reports it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
    Spot,
}

impl Side {
    pub fn is_spot(&self) -> bool {
        matches!(self, Side::Spot)
    }

    /// Display label (the wire keeps Buy/Sell, the UI shows LONG/SHORT).
    pub fn label(&self) -> &'static str {
        match self {
            Side::Buy => "LONG",
            Side::Sell => "SHORT",
            Side::Spot => "SPOT",
        }
    }
}

/// One open position from the provider snapshot. Keyed by `symbol`;
/// replaced wholesale every poll, never patched field by field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Base coin for spot rows (spot cards are titled by coin, not symbol).
    #[serde(default)]
    pub coin: Option<String>,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub current_price: f64,
    /// Meaningful only for Buy/Sell; the provider sends 1 for spot.
    #[serde(default)]
    pub leverage: f64,
    pub position_value: f64,
    pub unrealized_pnl: f64,
    pub pnl_percentage: f64,
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub liquidation_price: Option<f64>,
    /// Present iff the position has at least one active BTC rule.
    #[serde(default)]
    pub monitor: Option<MonitorState>,
    #[serde(default)]
    pub updated_at: String,
}

impl Position {
    /// Card title: spot rows show the base coin, everything else the symbol.
    pub fn title(&self) -> &str {
        match (&self.coin, self.side) {
            (Some(coin), Side::Spot) => coin,
            _ => &self.symbol,
        }
    }

    /// Exchange category this position trades under.
    pub fn category(&self) -> &'static str {
        if self.side.is_spot() {
            "spot"
        } else {
            "linear"
        }
    }
}

/// Materialized TP/SL state once a set_tp/set_sl rule has fired server-side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveStop {
    pub price: f64,
    pub close_percent: f64,
}

/// Rule-store state attached to a position. Replaced wholesale on every
/// rule-set mutation; structural equality drives the re-render decision.
/// Store bookkeeping fields (created_at, previous_btc_price) are dropped on
/// deserialization so they never count as a structural change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitorState {
    #[serde(default)]
    pub symbol: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub side: Side,
    pub original_size: f64,
    /// Decreases monotonically as partial/full closes execute.
    /// Invariant: 0 <= remaining_size <= original_size.
    pub remaining_size: f64,
    pub rules: Vec<Rule>,
    /// Ids of rules that already fired. Append-only from our side.
    #[serde(default)]
    pub triggered_rules: Vec<String>,
    #[serde(default)]
    pub active_tp: Option<ActiveStop>,
    #[serde(default)]
    pub active_sl: Option<ActiveStop>,
}

fn default_category() -> String {
    "linear".to_string()
}

impl MonitorState {
    pub fn is_triggered(&self, rule: &Rule) -> bool {
        self.triggered_rules.contains(&rule.id())
    }

    /// Share of the original size already closed, in percent.
    pub fn closed_percent(&self) -> f64 {
        if self.original_size <= 0.0 {
            return 0.0;
        }
        (self.original_size - self.remaining_size) / self.original_size * 100.0
    }

    pub fn remaining_percent(&self) -> f64 {
        if self.original_size <= 0.0 {
            return 0.0;
        }
        self.remaining_size / self.original_size * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor_json() -> &'static str {
        r#"{
            "symbol": "SOLUSDT",
            "category": "linear",
            "side": "Buy",
            "original_size": 10.0,
            "remaining_size": 5.0,
            "rules": [
                {"type": "full_close", "btc_price": 100000},
                {"type": "partial_close", "btc_price": 95000, "close_percent": 50}
            ],
            "triggered_rules": ["partial_close_95000_50"],
            "active_tp": {"price": 2.5, "close_percent": 30},
            "active_sl": null,
            "created_at": "2026-02-11T09:15:00.000000",
            "previous_btc_price": 94100.5
        }"#
    }

    #[test]
    fn monitor_deserializes_provider_payload() {
        let monitor: MonitorState = serde_json::from_str(monitor_json()).unwrap();
        assert_eq!(monitor.rules.len(), 2);
        assert_eq!(monitor.triggered_rules, vec!["partial_close_95000_50"]);
        assert_eq!(monitor.active_tp.as_ref().unwrap().price, 2.5);
        assert!(monitor.active_sl.is_none());
        assert!(monitor.is_triggered(&monitor.rules[1]));
        assert!(!monitor.is_triggered(&monitor.rules[0]));
    }

    #[test]
    fn monitor_equality_ignores_store_bookkeeping() {
        // previous_btc_price moves every evaluation tick server-side; it must
        // not count as a structural change.
        let a: MonitorState = serde_json::from_str(monitor_json()).unwrap();
        let altered = monitor_json().replace("94100.5", "94250.0");
        let b: MonitorState = serde_json::from_str(&altered).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn closed_and_remaining_percent() {
        let monitor: MonitorState = serde_json::from_str(monitor_json()).unwrap();
        assert_eq!(monitor.closed_percent(), 50.0);
        assert_eq!(monitor.remaining_percent(), 50.0);
    }

    #[test]
    fn spot_position_titled_by_coin() {
        let pos: Position = serde_json::from_str(
            r#"{
                "symbol": "SOLUSDT",
                "coin": "SOL",
                "side": "Spot",
                "size": 12.0,
                "entry_price": 140.0,
                "current_price": 150.0,
                "leverage": 1,
                "position_value": 1800.0,
                "unrealized_pnl": 120.0,
                "pnl_percentage": 7.14,
                "updated_at": "2026-02-11T09:15:01.000000"
            }"#,
        )
        .unwrap();
        assert_eq!(pos.title(), "SOL");
        assert_eq!(pos.category(), "spot");
    }
}
