//! reqwest-backed transport

use crate::{
    constants::{REQUEST_TIMEOUT_SECS, USER_AGENT},
    error::FetchError,
    transport::{Method, Transport, TransportRequest, TransportResponse},
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Transport over a shared reqwest client
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with the default timeout and user agent
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    /// Creates a transport with a custom client-level timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        Self::with_options(timeout, USER_AGENT)
    }

    /// Creates a transport with a custom timeout and user agent
    pub fn with_options(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wraps an existing reqwest client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, FetchError> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => {
                let builder = self.client.post(&request.url);
                match &request.body {
                    Some(body) => builder.json(body),
                    None => builder,
                }
            }
        };

        let response = builder.send().await.map_err(FetchError::from)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(FetchError::from)?;

        Ok(TransportResponse { status, body })
    }

    fn transport_name(&self) -> &'static str {
        "reqwest"
    }
}
