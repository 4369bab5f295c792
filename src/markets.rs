//! Market resolver: symbol to market-id lookup, read-only after startup.

use std::collections::HashMap;

use tracing::info;

use crate::models::Market;

/// Lookup table over the exchange's listed markets, built once at startup
/// from the gateway listing. Only active markets are resolvable by symbol.
#[derive(Debug)]
pub struct MarketResolver {
    by_id: HashMap<u32, Market>,
    by_symbol: HashMap<String, u32>,
}

impl MarketResolver {
    pub fn from_markets(markets: Vec<Market>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_symbol = HashMap::new();

        for market in markets {
            if market.is_active() {
                by_symbol.insert(market.symbol.to_uppercase(), market.market_id);
            }
            by_id.insert(market.market_id, market);
        }

        info!(
            markets = by_id.len(),
            active = by_symbol.len(),
            "market resolver loaded"
        );

        Self { by_id, by_symbol }
    }

    /// Resolve a trading symbol to its market id. Case-insensitive.
    pub fn resolve(&self, symbol: &str) -> Option<u32> {
        self.by_symbol.get(&symbol.to_uppercase()).copied()
    }

    pub fn get(&self, market_id: u32) -> Option<&Market> {
        self.by_id.get(&market_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn market(id: u32, symbol: &str, status: &str) -> Market {
        Market {
            market_id: id,
            symbol: symbol.to_string(),
            status: status.to_string(),
            price_decimals: 2,
            size_decimals: 3,
            min_base_amount: dec!(0.001),
            min_quote_amount: dec!(10),
        }
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let resolver =
            MarketResolver::from_markets(vec![market(1, "ETH", "active"), market(2, "BTC", "active")]);
        assert_eq!(resolver.resolve("eth"), Some(1));
        assert_eq!(resolver.resolve("BTC"), Some(2));
        assert_eq!(resolver.resolve("DOGE"), None);
    }

    #[test]
    fn test_inactive_market_not_resolvable_by_symbol() {
        let resolver = MarketResolver::from_markets(vec![market(3, "OLD", "frozen")]);
        assert_eq!(resolver.resolve("OLD"), None);
        // still reachable by id for diagnostics
        assert!(resolver.get(3).is_some());
    }
}
