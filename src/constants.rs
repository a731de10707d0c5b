//! Constants for the CoinWatch synchronization layer
//!
//! Compile-time defaults live here. `SyncConfig::from_env` may override a
//! handful of them at construction time; nothing is re-read afterwards.

/// Default polling period for the ticker refresh (in milliseconds)
pub const REFRESH_INTERVAL_MS: u64 = 5000;

/// Shortest accepted polling period; zero or smaller values are raised to this
pub const MIN_REFRESH_INTERVAL_MS: u64 = 1000;

/// reqwest client-level timeout (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Upper bound for a single direct or relayed attempt (in seconds)
pub const ATTEMPT_TIMEOUT_SECS: u64 = 8;

/// Upper bound for a whole direct-then-relay sequence (in seconds)
pub const CYCLE_DEADLINE_SECS: u64 = 30;

/// While relays are preferred, every Nth call still probes the direct route first
pub const DIRECT_PROBE_EVERY: u64 = 5;

/// Storage key for the cached ticker snapshot
pub const SNAPSHOT_CACHE_KEY: &str = "coinwatch_tickers_cache";

/// Storage key for persisted user preferences
pub const PREFERENCES_KEY: &str = "coin-watch-storage";

/// Default cache directory name (created under the OS temp dir)
pub const CACHE_DIR_NAME: &str = "coinwatch";

/// Message published when the first fetch fails and nothing is cached
pub const EMPTY_CACHE_ERROR_MESSAGE: &str = "无法获取行情数据";

/// Gate exchange API, production origin
pub const GATE_API_URL: &str = "https://data.gateapi.io";

/// Dev-server origin the same-origin development paths are served from
pub const DEV_ORIGIN: &str = "http://localhost:5173";

/// Gate exchange API, same-origin development path
pub const GATE_DEV_PATH: &str = "/proxy";

/// CoinGecko market-info API, production origin
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com";

/// CoinGecko market-info API, same-origin development path
pub const COINGECKO_DEV_PATH: &str = "/api";

/// Ticker listing endpoint (all pairs)
pub const GATE_TICKERS_ENDPOINT: &str = "/api2/1/tickers";

/// Public CORS relays, tried first
pub const PUBLIC_RELAYS: &[&str] = &[
    "https://api.allorigins.win/raw?url=",
    "https://cors-anywhere.herokuapp.com/",
    "https://api.codetabs.com/v1/proxy?quest=",
];

/// Free relay APIs, tried after the public group
pub const FREE_RELAYS: &[&str] = &["https://jsonp.afeld.me/?url=", "https://corsproxy.io/?"];

/// Environment variable selecting development or production endpoints
pub const ENV_VAR_ENVIRONMENT: &str = "COINWATCH_ENV";

/// Environment variable overriding the refresh interval (milliseconds)
pub const ENV_VAR_REFRESH_MS: &str = "COINWATCH_REFRESH_MS";

/// Environment variable overriding the cache directory
pub const ENV_VAR_CACHE_DIR: &str = "COINWATCH_CACHE_DIR";

/// Environment variable overriding the development server origin
pub const ENV_VAR_DEV_ORIGIN: &str = "COINWATCH_DEV_ORIGIN";

/// User agent for HTTP requests
pub const USER_AGENT: &str = "CoinWatch-App/1.0";
