//! Resilient fetch client
//!
//! Resolves the service base URL for the current environment and performs the
//! request. In production a failed direct request falls back to the relay
//! chain, one relay at a time, in order.
//!
//! ```text
//! get(path)
//!     ↓
//! direct  ──ok──▶ T
//!     ↓ err
//! relay #1 ──ok──▶ T
//!     ↓ err
//! ...
//! relay #N ──err──▶ AllProxiesExhausted
//! ```

use crate::{
    config::SyncConfig,
    constants::DIRECT_PROBE_EVERY,
    endpoint::{self, Environment, Service},
    error::FetchError,
    metrics::{RouteCounters, RouteStats},
    proxy::ProxyChain,
    transport::{Transport, TransportRequest},
    types::TickersResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Route label used in logs for the non-relayed request
const ROUTE_DIRECT: &str = "direct";

/// Longest response body excerpt kept in an `HttpStatus` error
const ERROR_BODY_LIMIT: usize = 256;

/// Per-request options for `get`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Query parameters appended to the path (values are percent-encoded)
    pub query: Vec<(String, String)>,
    /// Skip the relay chain even in production
    pub direct_only: bool,
}

impl RequestOptions {
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn direct_only(mut self) -> Self {
        self.direct_only = true;
        self
    }
}

/// HTTP client with environment-aware endpoints and ordered relay failover
pub struct ResilientClient {
    service: Service,
    environment: Environment,
    transport: Arc<dyn Transport>,
    proxies: ProxyChain,
    /// Origin prepended to the same-origin development paths
    dev_origin: String,
    attempt_timeout: Duration,
    cycle_deadline: Duration,
    /// Hint: the direct route recently failed while a relay worked
    prefer_proxy: AtomicBool,
    calls: AtomicU64,
    routes: RouteCounters,
}

impl ResilientClient {
    /// Creates a client for `service` with the default relay chain
    pub fn new(service: Service, transport: Arc<dyn Transport>, config: &SyncConfig) -> Self {
        Self {
            service,
            environment: config.environment,
            transport,
            proxies: ProxyChain::default(),
            dev_origin: config.dev_origin.clone(),
            attempt_timeout: config.attempt_timeout,
            cycle_deadline: config.cycle_deadline,
            prefer_proxy: AtomicBool::new(false),
            calls: AtomicU64::new(0),
            routes: RouteCounters::default(),
        }
    }

    /// Replaces the relay chain
    pub fn with_proxies(mut self, proxies: ProxyChain) -> Self {
        self.proxies = proxies;
        self
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn proxies(&self) -> &ProxyChain {
        &self.proxies
    }

    /// Absolute base URL for this client's service in its environment
    ///
    /// Development paths are relative to the dev server, so they are joined
    /// onto `dev_origin`; a native client has no page origin to fall back on.
    pub fn base_url(&self) -> String {
        let base = endpoint::resolve(self.service, self.environment);
        if self.environment.is_development() {
            endpoint::join(&self.dev_origin, base)
        } else {
            base.to_string()
        }
    }

    /// Whether relays are currently tried before the direct route
    pub fn prefers_proxy(&self) -> bool {
        self.prefer_proxy.load(Ordering::Relaxed)
    }

    /// Counters of which route served requests
    pub fn route_stats(&self) -> RouteStats {
        self.routes.snapshot()
    }

    /// GETs `path` and decodes the JSON body
    pub async fn get<T>(&self, path: &str, options: &RequestOptions) -> Result<T, FetchError>
    where
        T: DeserializeOwned + Send,
    {
        let url = self.target_url(path, options);
        let relayed = !options.direct_only;
        self.execute(TransportRequest::get(url), relayed).await
    }

    /// POSTs a JSON body to `path` and decodes the JSON response
    ///
    /// POSTs never go through the relays: the public relays only forward GETs.
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, FetchError>
    where
        T: DeserializeOwned + Send,
        B: Serialize + ?Sized,
    {
        let url = endpoint::join(&self.base_url(), path);
        let body = serde_json::to_value(body)?;
        self.execute(TransportRequest::post(url, Some(body)), false)
            .await
    }

    /// Fetches the full ticker listing
    pub async fn fetch_tickers(&self) -> Result<TickersResponse, FetchError> {
        self.get(&endpoint::gate::tickers(), &RequestOptions::default())
            .await
    }

    fn target_url(&self, path: &str, options: &RequestOptions) -> String {
        let mut url = endpoint::join(&self.base_url(), path);
        if !options.query.is_empty() {
            let query = options
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            let separator = if url.contains('?') { '&' } else { '?' };
            url = format!("{}{}{}", url, separator, query);
        }
        url
    }

    async fn execute<T>(&self, request: TransportRequest, relayed: bool) -> Result<T, FetchError>
    where
        T: DeserializeOwned + Send,
    {
        // Development goes through the local reverse proxy, which already
        // handles CORS; relays would only add latency.
        if self.environment.is_development() || !relayed || self.proxies.is_empty() {
            let result = self.attempt(&request, ROUTE_DIRECT, self.attempt_timeout).await;
            if result.is_ok() {
                self.routes.record_direct_hit();
            }
            return result;
        }

        let started = Instant::now();
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        let direct_first = !self.prefers_proxy() || call % DIRECT_PROBE_EVERY == 0;
        let mut attempts = 0usize;
        let mut last_error: Option<FetchError> = None;

        if direct_first {
            attempts += 1;
            match self.attempt(&request, ROUTE_DIRECT, self.budget(started)).await {
                Ok(value) => {
                    self.prefer_proxy.store(false, Ordering::Relaxed);
                    self.routes.record_direct_hit();
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(
                        url = %request.url,
                        error = %e,
                        "Direct request failed, falling back to relays"
                    );
                    last_error = Some(e);
                }
            }
        }

        for (prefix, relay_url) in self.proxies.wrapped(&request.url) {
            if started.elapsed() >= self.cycle_deadline {
                return Err(FetchError::DeadlineExceeded { attempts });
            }
            attempts += 1;
            match self
                .attempt(&request.with_url(relay_url), prefix, self.budget(started))
                .await
            {
                Ok(value) => {
                    self.prefer_proxy.store(true, Ordering::Relaxed);
                    self.routes.record_proxy_hit();
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(relay = prefix, error = %e, "Relay attempt failed");
                    last_error = Some(e);
                }
            }
        }

        // The hint skipped the direct route up front; give it a last chance so
        // a recovered upstream is noticed.
        if !direct_first {
            if started.elapsed() >= self.cycle_deadline {
                return Err(FetchError::DeadlineExceeded { attempts });
            }
            attempts += 1;
            match self.attempt(&request, ROUTE_DIRECT, self.budget(started)).await {
                Ok(value) => {
                    self.prefer_proxy.store(false, Ordering::Relaxed);
                    self.routes.record_direct_hit();
                    return Ok(value);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(FetchError::AllProxiesExhausted {
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Time left for the next attempt: the per-attempt timeout, capped by the cycle deadline
    fn budget(&self, started: Instant) -> Duration {
        let remaining = self.cycle_deadline.saturating_sub(started.elapsed());
        self.attempt_timeout.min(remaining)
    }

    async fn attempt<T>(
        &self,
        request: &TransportRequest,
        route: &str,
        budget: Duration,
    ) -> Result<T, FetchError>
    where
        T: DeserializeOwned + Send,
    {
        tracing::debug!(
            route,
            url = %request.url,
            transport = self.transport.transport_name(),
            "Sending request"
        );

        let result = match tokio::time::timeout(budget, self.transport.send(request.clone())).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        };

        let decoded = result.and_then(|response| {
            if !response.is_success() {
                let body: String = response.body.chars().take(ERROR_BODY_LIMIT).collect();
                return Err(FetchError::http_status(response.status, body));
            }
            serde_json::from_str::<T>(&response.body)
                .map_err(|e| FetchError::decode(format!("{} (route {})", e, route)))
        });

        if decoded.is_err() {
            self.routes.record_failed_attempt();
        }
        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{mock::MockTransport, Method};
    use serde_json::Value;

    const TICKERS_URL: &str = "https://data.gateapi.io/api2/1/tickers";
    const DEV_TICKERS_URL: &str = "http://localhost:5173/proxy/api2/1/tickers";
    const BODY: &str = r#"{"btc_usdt":{"last":"65000.1","percentChange":"1.2"}}"#;

    fn chain() -> ProxyChain {
        ProxyChain::new(["https://relay-one/?url=", "https://relay-two/", "https://relay-three/?q="])
    }

    fn client(mock: Arc<MockTransport>, environment: Environment) -> ResilientClient {
        let config = SyncConfig::default().with_environment(environment);
        ResilientClient::new(Service::Gate, mock, &config).with_proxies(chain())
    }

    #[tokio::test]
    async fn test_direct_success_skips_relays() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(TICKERS_URL, 200, BODY);
        let client = client(mock.clone(), Environment::Production);

        let tickers = client.fetch_tickers().await.unwrap();

        assert_eq!(tickers["btc_usdt"].last, "65000.1");
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.calls_to("https://relay-"), 0);
        assert_eq!(client.route_stats().direct_hits, 1);
        assert!(!client.prefers_proxy());
    }

    #[tokio::test]
    async fn test_first_relay_success_short_circuits() {
        let mock = Arc::new(MockTransport::new());
        mock.fail(TICKERS_URL, FetchError::transport("CORS"));
        mock.respond("https://relay-one/", 200, BODY);
        let client = client(mock.clone(), Environment::Production);

        let tickers = client.fetch_tickers().await.unwrap();

        assert!(tickers.contains_key("btc_usdt"));
        assert_eq!(
            mock.called_urls(),
            vec![
                TICKERS_URL.to_string(),
                "https://relay-one/?url=https%3A%2F%2Fdata.gateapi.io%2Fapi2%2F1%2Ftickers"
                    .to_string(),
            ]
        );
        assert_eq!(mock.calls_to("https://relay-two/"), 0);
        assert_eq!(mock.calls_to("https://relay-three/"), 0);
        assert!(client.prefers_proxy());
    }

    #[tokio::test]
    async fn test_relays_tried_in_order_until_one_decodes() {
        let mock = Arc::new(MockTransport::new());
        mock.respond("https://relay-one/", 502, "bad gateway");
        mock.respond("https://relay-two/", 200, "<html>not json</html>");
        mock.respond("https://relay-three/", 200, BODY);
        let client = client(mock.clone(), Environment::Production);

        let tickers = client.fetch_tickers().await.unwrap();

        assert_eq!(tickers.len(), 1);
        let urls = mock.called_urls();
        assert_eq!(urls.len(), 4);
        assert!(urls[1].starts_with("https://relay-one/"));
        assert!(urls[2].starts_with("https://relay-two/"));
        assert!(urls[3].starts_with("https://relay-three/"));
        assert_eq!(client.route_stats().failed_attempts, 3);
    }

    #[tokio::test]
    async fn test_all_relays_failing_is_exhausted() {
        let mock = Arc::new(MockTransport::new());
        let client = client(mock.clone(), Environment::Production);

        let err = client.fetch_tickers().await.unwrap_err();

        match err {
            FetchError::AllProxiesExhausted { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn test_development_never_uses_relays() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(DEV_TICKERS_URL, 503, "unavailable");
        let client = client(mock.clone(), Environment::Development);

        let err = client.fetch_tickers().await.unwrap_err();

        assert_eq!(err, FetchError::http_status(503, "unavailable"));
        assert_eq!(mock.called_urls(), vec![DEV_TICKERS_URL.to_string()]);
    }

    #[tokio::test]
    async fn test_development_urls_are_absolute() {
        let mock = Arc::new(MockTransport::new());
        mock.respond("http://127.0.0.1:3000/", 200, BODY);
        let config = SyncConfig::default()
            .with_environment(Environment::Development)
            .with_dev_origin("http://127.0.0.1:3000/");
        let client = ResilientClient::new(Service::Gate, mock.clone(), &config);

        assert_eq!(client.base_url(), "http://127.0.0.1:3000/proxy");
        client.fetch_tickers().await.unwrap();
        let _: Value = client
            .post(&endpoint::gate::tickers(), &serde_json::json!({}))
            .await
            .unwrap();

        let urls = mock.called_urls();
        assert_eq!(urls[0], "http://127.0.0.1:3000/proxy/api2/1/tickers");
        assert!(urls.iter().all(|u| u.starts_with("http://")));
    }

    #[tokio::test]
    async fn test_development_success() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(DEV_TICKERS_URL, 200, BODY);
        let client = client(mock.clone(), Environment::Development);

        let tickers = client.fetch_tickers().await.unwrap();
        assert_eq!(tickers["btc_usdt"].percent_change, "1.2");
    }

    #[tokio::test]
    async fn test_direct_malformed_json_falls_back() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(TICKERS_URL, 200, "{truncated");
        mock.respond("https://relay-one/", 200, BODY);
        let client = client(mock.clone(), Environment::Production);

        assert!(client.fetch_tickers().await.is_ok());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_prefer_proxy_hint_still_retries_direct() {
        let mock = Arc::new(MockTransport::new());
        mock.fail(TICKERS_URL, FetchError::transport("CORS"));
        mock.respond("https://relay-one/", 200, BODY);
        let client = client(mock.clone(), Environment::Production);

        // call 0 probes direct and sets the hint
        client.fetch_tickers().await.unwrap();
        assert!(client.prefers_proxy());

        // calls 1..4 go straight to the relay
        for _ in 1..DIRECT_PROBE_EVERY {
            client.fetch_tickers().await.unwrap();
        }
        assert_eq!(mock.calls_to(TICKERS_URL), 1);

        // upstream recovers; the next probe call notices and clears the hint
        mock.clear();
        mock.respond(TICKERS_URL, 200, BODY);
        client.fetch_tickers().await.unwrap();
        assert_eq!(mock.calls_to(TICKERS_URL), 2);
        assert!(!client.prefers_proxy());
    }

    #[tokio::test]
    async fn test_prefer_proxy_falls_back_to_direct_last() {
        let mock = Arc::new(MockTransport::new());
        mock.fail(TICKERS_URL, FetchError::transport("CORS"));
        mock.respond("https://relay-one/", 200, BODY);
        let client = client(mock.clone(), Environment::Production);
        client.fetch_tickers().await.unwrap();

        // relays go down, upstream comes back
        mock.clear();
        mock.respond(TICKERS_URL, 200, BODY);
        client.fetch_tickers().await.unwrap();

        let urls = mock.called_urls();
        assert_eq!(urls.last().map(String::as_str), Some(TICKERS_URL));
        assert!(!client.prefers_proxy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out_and_falls_back() {
        let mock = Arc::new(MockTransport::new());
        mock.delay(TICKERS_URL, Duration::from_secs(60), BODY);
        mock.respond("https://relay-one/", 200, BODY);
        let config = SyncConfig::default().with_attempt_timeout(Duration::from_secs(2));
        let client = ResilientClient::new(Service::Gate, mock.clone(), &config).with_proxies(chain());

        assert!(client.fetch_tickers().await.is_ok());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_deadline_stops_the_chain() {
        let mock = Arc::new(MockTransport::new());
        mock.delay(TICKERS_URL, Duration::from_secs(60), BODY);
        mock.delay("https://relay-", Duration::from_secs(60), BODY);
        let config = SyncConfig::default()
            .with_attempt_timeout(Duration::from_secs(5))
            .with_cycle_deadline(Duration::from_secs(8));
        let client = ResilientClient::new(Service::Gate, mock.clone(), &config).with_proxies(chain());

        let err = client.fetch_tickers().await.unwrap_err();

        assert_eq!(err, FetchError::DeadlineExceeded { attempts: 2 });
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_get_appends_encoded_query() {
        let mock = Arc::new(MockTransport::new());
        mock.respond("https://data.gateapi.io/api2/1/ticker", 200, "{}");
        let client = client(mock.clone(), Environment::Production);

        let options = RequestOptions::default().query("symbol", "btc usdt");
        let _: Value = client.get("/api2/1/ticker", &options).await.unwrap();

        assert_eq!(
            mock.called_urls(),
            vec!["https://data.gateapi.io/api2/1/ticker?symbol=btc%20usdt".to_string()]
        );
    }

    #[tokio::test]
    async fn test_post_is_direct_only() {
        let mock = Arc::new(MockTransport::new());
        let client = client(mock.clone(), Environment::Production);

        let err = client
            .post::<Value, _>("/api2/1/orders", &serde_json::json!({"pair": "btc_usdt"}))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Transport(_)));
        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].body, Some(serde_json::json!({"pair": "btc_usdt"})));
    }
}
