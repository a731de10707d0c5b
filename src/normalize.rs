//! Raw ticker payload -> normalized snapshot

use crate::types::{CoinInfo, MarketSnapshot, TickersResponse};

/// Normalizes an upstream ticker listing
///
/// Each key is lowercased and split on its separator into uppercase
/// base/quote symbols. The result replaces the previous snapshot wholesale.
pub fn normalize(raw: TickersResponse) -> MarketSnapshot {
    raw.into_iter()
        .map(|(key, ticker)| CoinInfo::from_ticker(&key, ticker))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_eth_usdt() {
        let raw: TickersResponse = serde_json::from_str(
            r#"{"eth_usdt": {"last":"3000.5", "percentChange":"-2.1", "baseVolume":"12.5"}}"#,
        )
        .unwrap();

        let snapshot = normalize(raw);
        let eth = snapshot.get("eth_usdt").unwrap();

        assert_eq!(eth.symbol, "eth_usdt");
        assert_eq!(eth.base, "ETH");
        assert_eq!(eth.quote, "USDT");
        assert_eq!(eth.ticker.last, "3000.5");
        assert_eq!(eth.ticker.percent_change, "-2.1");
    }

    #[test]
    fn test_every_entry_keeps_pair_invariant() {
        let raw: TickersResponse = serde_json::from_str(
            r#"{
                "btc_usdt": {"last":"65000"},
                "ETH_BTC": {"last":"0.05"},
                "sol_usdc": {"last":"150.25"},
                "1inch_usdt": {"last":"0.4"}
            }"#,
        )
        .unwrap();

        let snapshot = normalize(raw);

        assert_eq!(snapshot.len(), 4);
        for coin in snapshot.iter() {
            assert_eq!(coin.symbol, coin.symbol.to_lowercase());
            assert_eq!(
                coin.symbol,
                format!("{}_{}", coin.base.to_lowercase(), coin.quote.to_lowercase())
            );
            assert_eq!(coin.base, coin.base.to_uppercase());
            assert_eq!(coin.quote, coin.quote.to_uppercase());
        }
        assert!(snapshot.contains("eth_btc"));
    }

    #[test]
    fn test_normalize_empty_payload() {
        assert!(normalize(TickersResponse::new()).is_empty());
    }
}
