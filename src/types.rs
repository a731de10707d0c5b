//! Types for the ticker synchronization layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Separator between base and quote in a pair identifier
pub const PAIR_SEPARATOR: char = '_';

/// Accepts either a JSON string or a JSON number and keeps its exact text.
///
/// The exchange documents every ticker field as a decimal string, but some
/// relays re-encode bodies and turn them into numbers.
mod decimal_string {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
        Null(()),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
            Raw::Null(()) => String::new(),
        })
    }
}

/// One trading pair's market statistics, as delivered by the exchange
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerRecord {
    /// Exchange status flag ("true" on healthy rows)
    #[serde(default, deserialize_with = "decimal_string::deserialize")]
    pub result: String,

    /// Last trade price
    #[serde(default, deserialize_with = "decimal_string::deserialize")]
    pub last: String,

    /// Best ask
    #[serde(default, deserialize_with = "decimal_string::deserialize")]
    pub lowest_ask: String,

    /// Best bid
    #[serde(default, deserialize_with = "decimal_string::deserialize")]
    pub highest_bid: String,

    /// 24h change in percent
    #[serde(default, deserialize_with = "decimal_string::deserialize")]
    pub percent_change: String,

    /// 24h volume in base currency
    #[serde(default, deserialize_with = "decimal_string::deserialize")]
    pub base_volume: String,

    /// 24h volume in quote currency
    #[serde(default, deserialize_with = "decimal_string::deserialize")]
    pub quote_volume: String,

    /// 24h high
    #[serde(default, rename = "high24hr", deserialize_with = "decimal_string::deserialize")]
    pub high_24hr: String,

    /// 24h low
    #[serde(default, rename = "low24hr", deserialize_with = "decimal_string::deserialize")]
    pub low_24hr: String,
}

/// Raw upstream payload of `/api2/1/tickers`
pub type TickersResponse = BTreeMap<String, TickerRecord>;

/// A ticker with its normalized pair identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinInfo {
    #[serde(flatten)]
    pub ticker: TickerRecord,

    /// Lowercase pair identifier, e.g. `btc_usdt`
    pub symbol: String,

    /// Uppercase base symbol, e.g. `BTC`
    pub base: String,

    /// Uppercase quote symbol, e.g. `USDT`
    pub quote: String,
}

impl CoinInfo {
    /// Builds a CoinInfo from an upstream key and its ticker.
    ///
    /// The key is lowercased and split on the first separator. A key with no
    /// separator yields an empty quote.
    pub fn from_ticker(key: &str, ticker: TickerRecord) -> Self {
        let symbol = key.trim().to_lowercase();
        let (base, quote) = match symbol.split_once(PAIR_SEPARATOR) {
            Some((base, quote)) => (base.to_uppercase(), quote.to_uppercase()),
            None => (symbol.to_uppercase(), String::new()),
        };

        Self {
            ticker,
            symbol,
            base,
            quote,
        }
    }

    /// Display label, e.g. `BTC/USDT`
    pub fn display_pair(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

/// Complete set of tracked pairs, replaced wholesale on each successful fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketSnapshot(BTreeMap<String, CoinInfo>);

impl MarketSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<&CoinInfo> {
        self.0.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.0.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates pairs in identifier order
    pub fn iter(&self) -> impl Iterator<Item = &CoinInfo> {
        self.0.values()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl FromIterator<CoinInfo> for MarketSnapshot {
    fn from_iter<I: IntoIterator<Item = CoinInfo>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|coin| (coin.symbol.clone(), coin))
                .collect(),
        )
    }
}

/// Lifecycle of the polling controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Cache read, nothing sent yet
    Bootstrapping,
    /// First network attempt in flight with no prior data
    Loading,
    /// Snapshot available
    Ready,
    /// Last refresh failed; previous snapshot retained
    RefreshFailed,
    /// Timer cancelled
    Stopped,
}

/// State published to consumers at all times
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub data: MarketSnapshot,
    pub loading: bool,
    /// User-facing error; only set when there is no data to show
    pub error: Option<String>,
    pub phase: SyncPhase,
    /// When `data` was last replaced by a successful fetch
    pub last_updated: Option<DateTime<Utc>>,
    /// Diagnostic text of the most recent failed refresh (not user-facing)
    pub last_failure: Option<String>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            data: MarketSnapshot::default(),
            loading: false,
            error: None,
            phase: SyncPhase::Bootstrapping,
            last_updated: None,
            last_failure: None,
        }
    }
}

impl SyncState {
    /// True when no successful fetch happened within `threshold_seconds`
    pub fn is_stale(&self, threshold_seconds: u64) -> bool {
        match self.last_updated {
            Some(at) => Utc::now().signed_duration_since(at).num_seconds() > threshold_seconds as i64,
            None => true,
        }
    }
}

/// Discrete notifications emitted by the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncEvent {
    /// A new snapshot replaced the previous one
    SnapshotUpdated {
        id: Uuid,
        pairs: usize,
        timestamp: DateTime<Utc>,
    },

    /// A refresh failed
    RefreshFailed {
        id: Uuid,
        error_message: String,
        data_retained: bool,
        timestamp: DateTime<Utc>,
    },

    /// Controller moved to another lifecycle phase
    PhaseChanged {
        id: Uuid,
        from: SyncPhase,
        to: SyncPhase,
        timestamp: DateTime<Utc>,
    },
}

impl SyncEvent {
    pub fn snapshot_updated(pairs: usize) -> Self {
        SyncEvent::SnapshotUpdated {
            id: Uuid::new_v4(),
            pairs,
            timestamp: Utc::now(),
        }
    }

    pub fn refresh_failed(error_message: impl Into<String>, data_retained: bool) -> Self {
        SyncEvent::RefreshFailed {
            id: Uuid::new_v4(),
            error_message: error_message.into(),
            data_retained,
            timestamp: Utc::now(),
        }
    }

    pub fn phase_changed(from: SyncPhase, to: SyncPhase) -> Self {
        SyncEvent::PhaseChanged {
            id: Uuid::new_v4(),
            from,
            to,
            timestamp: Utc::now(),
        }
    }

    /// Get the event ID
    pub fn id(&self) -> Uuid {
        match self {
            SyncEvent::SnapshotUpdated { id, .. } => *id,
            SyncEvent::RefreshFailed { id, .. } => *id,
            SyncEvent::PhaseChanged { id, .. } => *id,
        }
    }

    /// Get the event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::SnapshotUpdated { .. } => "SNAPSHOT_UPDATED",
            SyncEvent::RefreshFailed { .. } => "REFRESH_FAILED",
            SyncEvent::PhaseChanged { .. } => "PHASE_CHANGED",
        }
    }
}

impl std::fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncEvent::SnapshotUpdated { pairs, .. } => {
                write!(f, "Snapshot updated: {} pairs", pairs)
            }
            SyncEvent::RefreshFailed {
                error_message,
                data_retained,
                ..
            } => {
                write!(
                    f,
                    "Refresh failed ({}): {}",
                    if *data_retained { "data retained" } else { "no data" },
                    error_message
                )
            }
            SyncEvent::PhaseChanged { from, to, .. } => {
                write!(f, "Phase {:?} -> {:?}", from, to)
            }
        }
    }
}

/// Overall health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Fresh snapshot, last refresh succeeded
    Healthy,
    /// Serving a retained snapshot after a failed refresh
    Degraded,
    /// Nothing to serve
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub details: std::collections::HashMap<String, serde_json::Value>,
    pub last_checked: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_accepts_numbers_and_strings() {
        let ticker: TickerRecord = serde_json::from_str(
            r#"{"result":"true","last":"3000.5","lowestAsk":3001,"highestBid":"3000.1","percentChange":"-2.1","high24hr":"3100","low24hr":null}"#,
        )
        .unwrap();
        assert_eq!(ticker.last, "3000.5");
        assert_eq!(ticker.lowest_ask, "3001");
        assert_eq!(ticker.percent_change, "-2.1");
        assert_eq!(ticker.high_24hr, "3100");
        assert_eq!(ticker.low_24hr, "");
        assert_eq!(ticker.base_volume, "");
    }

    #[test]
    fn test_coin_info_splits_and_uppercases() {
        let coin = CoinInfo::from_ticker("eth_usdt", TickerRecord::default());
        assert_eq!(coin.symbol, "eth_usdt");
        assert_eq!(coin.base, "ETH");
        assert_eq!(coin.quote, "USDT");
        assert_eq!(coin.display_pair(), "ETH/USDT");
    }

    #[test]
    fn test_coin_info_serializes_flat() {
        let ticker = TickerRecord {
            last: "1.5".to_string(),
            ..TickerRecord::default()
        };
        let coin = CoinInfo::from_ticker("doge_usdt", ticker);
        let value = serde_json::to_value(&coin).unwrap();
        assert_eq!(value["last"], "1.5");
        assert_eq!(value["symbol"], "doge_usdt");
        assert_eq!(value["base"], "DOGE");

        let back: CoinInfo = serde_json::from_value(value).unwrap();
        assert_eq!(back, coin);
    }

    #[test]
    fn test_state_without_update_is_stale() {
        let state = SyncState::default();
        assert!(state.is_stale(60));

        let fresh = SyncState {
            last_updated: Some(Utc::now()),
            ..SyncState::default()
        };
        assert!(!fresh.is_stale(60));
    }
}
