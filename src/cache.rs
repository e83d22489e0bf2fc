use crate::types::Position;

/// Last-known position snapshot, in the provider's display order. Immutable
/// between polls: the only write path is wholesale replacement after a
/// reconciliation pass.
#[derive(Debug, Default)]
pub struct PositionCache {
    positions: Vec<Position>,
}

impl PositionCache {
    pub fn new() -> Self {
        PositionCache::default()
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn find(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    /// Swap in a fresh snapshot; the old one is handed back so the caller can
    /// finish its reconciliation pass before dropping it.
    pub fn replace(&mut self, new_snapshot: Vec<Position>) -> Vec<Position> {
        std::mem::replace(&mut self.positions, new_snapshot)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn position(symbol: &str) -> Position {
        Position {
            symbol: symbol.to_string(),
            coin: None,
            side: Side::Buy,
            size: 1.0,
            entry_price: 100.0,
            current_price: 100.0,
            leverage: 5.0,
            position_value: 100.0,
            unrealized_pnl: 0.0,
            pnl_percentage: 0.0,
            take_profit: None,
            stop_loss: None,
            liquidation_price: None,
            monitor: None,
            updated_at: String::new(),
        }
    }

    #[test]
    fn replace_returns_the_previous_snapshot() {
        let mut cache = PositionCache::new();
        cache.replace(vec![position("SOLUSDT")]);
        let old = cache.replace(vec![position("ETHUSDT"), position("XRPUSDT")]);
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].symbol, "SOLUSDT");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn find_by_symbol() {
        let mut cache = PositionCache::new();
        cache.replace(vec![position("SOLUSDT"), position("ETHUSDT")]);
        assert!(cache.find("ETHUSDT").is_some());
        assert!(cache.find("BTCUSDT").is_none());
    }

    #[test]
    fn server_order_is_retained() {
        let mut cache = PositionCache::new();
        cache.replace(vec![position("XRPUSDT"), position("ETHUSDT"), position("SOLUSDT")]);
        let symbols: Vec<&str> = cache.positions().iter().map(|p| p.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["XRPUSDT", "ETHUSDT", "SOLUSDT"]);
    }
}
