//! Transport abstraction for the resilient client
//!
//! A transport performs exactly one HTTP exchange and reports what came back.
//! It never retries, never decodes, and never judges status codes: a non-2xx
//! answer is still `Ok`. Only failures to obtain a response at all (DNS,
//! connect, TLS, CORS rejection on the wasm side, timeouts) are `Err`.

use crate::error::FetchError;
use async_trait::async_trait;

/// HTTP verbs the client issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    /// JSON body, POST only
    pub body: Option<serde_json::Value>,
}

impl TransportRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body,
        }
    }

    /// Same request aimed at another URL (used to route through a relay)
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            method: self.method,
            url: url.into(),
            body: self.body.clone(),
        }
    }
}

/// Raw response: status code and body text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs single HTTP exchanges
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request and returns whatever response arrived
    ///
    /// # Returns
    /// The response (any status), or a `FetchError` when no response was obtained
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, FetchError>;

    /// Returns the name of this transport
    fn transport_name(&self) -> &'static str;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Canned outcome for a URL prefix
    #[derive(Debug, Clone)]
    pub enum MockReply {
        Respond(TransportResponse),
        Fail(FetchError),
        /// Sleep, then respond; used for timeout tests
        Delayed(Duration, TransportResponse),
    }

    /// Mock transport for testing
    ///
    /// Replies are matched by URL prefix, first rule wins. One-shot replies
    /// queued with `enqueue_delayed` are used up before the standing rules.
    /// Unmatched URLs fail with a transport error, which is what a CORS
    /// rejection looks like.
    pub struct MockTransport {
        rules: Arc<Mutex<Vec<(String, MockReply)>>>,
        queued: Arc<Mutex<Vec<(String, MockReply)>>>,
        calls: Arc<Mutex<Vec<TransportRequest>>>,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                rules: Arc::new(Mutex::new(Vec::new())),
                queued: Arc::new(Mutex::new(Vec::new())),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn respond(&self, url_prefix: &str, status: u16, body: &str) {
            self.push(url_prefix, MockReply::Respond(TransportResponse::new(status, body)));
        }

        pub fn fail(&self, url_prefix: &str, error: FetchError) {
            self.push(url_prefix, MockReply::Fail(error));
        }

        pub fn delay(&self, url_prefix: &str, delay: Duration, body: &str) {
            self.push(
                url_prefix,
                MockReply::Delayed(delay, TransportResponse::new(200, body)),
            );
        }

        /// Answers the next matching call only, after `delay`
        pub fn enqueue_delayed(&self, url_prefix: &str, delay: Duration, body: &str) {
            self.queued.lock().unwrap().push((
                url_prefix.to_string(),
                MockReply::Delayed(delay, TransportResponse::new(200, body)),
            ));
        }

        /// Drops all rules; every call fails afterwards
        pub fn clear(&self) {
            self.rules.lock().unwrap().clear();
        }

        fn push(&self, url_prefix: &str, reply: MockReply) {
            self.rules
                .lock()
                .unwrap()
                .push((url_prefix.to_string(), reply));
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn calls_to(&self, url_prefix: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.url.starts_with(url_prefix))
                .count()
        }

        pub fn called_urls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.url.clone())
                .collect()
        }

        pub fn requests(&self) -> Vec<TransportRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse, FetchError> {
            self.calls.lock().unwrap().push(request.clone());
            let queued = {
                let mut queued = self.queued.lock().unwrap();
                queued
                    .iter()
                    .position(|(prefix, _)| request.url.starts_with(prefix.as_str()))
                    .map(|i| queued.remove(i).1)
            };
            let reply = queued.or_else(|| {
                self.rules
                    .lock()
                    .unwrap()
                    .iter()
                    .find(|(prefix, _)| request.url.starts_with(prefix.as_str()))
                    .map(|(_, reply)| reply.clone())
            });

            match reply {
                Some(MockReply::Respond(response)) => Ok(response),
                Some(MockReply::Fail(error)) => Err(error),
                Some(MockReply::Delayed(delay, response)) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
                None => Err(FetchError::transport(format!(
                    "Failed to fetch {}",
                    request.url
                ))),
            }
        }

        fn transport_name(&self) -> &'static str {
            "mock"
        }
    }
}
