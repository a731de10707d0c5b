//! Endpoint resolution: logical service + environment -> base URL
//!
//! In development the client talks to a same-origin path that a local
//! reverse proxy rewrites to the upstream. In production it talks to the
//! upstream origin directly.

use crate::constants::{
    COINGECKO_API_URL, COINGECKO_DEV_PATH, ENV_VAR_ENVIRONMENT, GATE_API_URL, GATE_DEV_PATH,
    GATE_TICKERS_ENDPOINT,
};
use serde::{Deserialize, Serialize};

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    /// Reads `COINWATCH_ENV`; anything other than `dev`/`development` is production
    pub fn from_env() -> Self {
        std::env::var(ENV_VAR_ENVIRONMENT)
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "dev" | "development" => Environment::Development,
            _ => Environment::Production,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Upstream services the client can reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Service {
    /// Gate exchange ticker API
    Gate,
    /// CoinGecko market-info API
    CoinGecko,
}

/// Development path and production origin of one service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointBinding {
    pub development: &'static str,
    pub production: &'static str,
}

impl Service {
    pub fn binding(&self) -> EndpointBinding {
        match self {
            Service::Gate => EndpointBinding {
                development: GATE_DEV_PATH,
                production: GATE_API_URL,
            },
            Service::CoinGecko => EndpointBinding {
                development: COINGECKO_DEV_PATH,
                production: COINGECKO_API_URL,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Service::Gate => "gate",
            Service::CoinGecko => "coinGecko",
        }
    }
}

/// Base URL for `service` in `environment`
pub fn resolve(service: Service, environment: Environment) -> &'static str {
    let binding = service.binding();
    match environment {
        Environment::Development => binding.development,
        Environment::Production => binding.production,
    }
}

/// Joins a base URL and a request path with exactly one slash between them
pub fn join(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Gate exchange request paths
pub mod gate {
    use super::GATE_TICKERS_ENDPOINT;

    pub fn tickers() -> String {
        GATE_TICKERS_ENDPOINT.to_string()
    }

    pub fn ticker(symbol: &str) -> String {
        format!("/api2/1/ticker?symbol={}", urlencoding::encode(symbol))
    }

    pub fn order_book(symbol: &str) -> String {
        format!("/api2/1/orderBook?symbol={}", urlencoding::encode(symbol))
    }

    pub fn trades(symbol: &str) -> String {
        format!("/api2/1/trades?symbol={}", urlencoding::encode(symbol))
    }
}

/// CoinGecko request paths
pub mod coingecko {
    pub fn markets() -> String {
        "/v3/coins/markets".to_string()
    }

    pub fn detail(id: &str) -> String {
        format!("/v3/coins/{}", urlencoding::encode(id))
    }

    pub fn search(query: &str) -> String {
        format!("/v3/search?query={}", urlencoding::encode(query))
    }
}
