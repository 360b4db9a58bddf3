//! Transport seam between the GraphQL client and the network
//!
//! The client only ever sees an [`HttpReply`]; how it got there is the
//! transport's business. [`HttpTransport`] talks to the Shopify Admin API,
//! tests substitute an in-memory shop.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::Serialize;
use std::time::Duration;

use crate::config::{Config, StoreConfig};
use crate::error::Result;

/// A GraphQL request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    /// Query or mutation document
    pub query: String,

    /// Variables object
    pub variables: serde_json::Value,

    /// Name of the operation inside `query`
    pub operation_name: String,
}

/// Raw reply to a GraphQL request
#[derive(Debug, Clone)]
pub struct HttpReply {
    /// HTTP status code
    pub status: u16,

    /// `Retry-After` header, when the server sent one
    pub retry_after: Option<Duration>,

    /// Parsed JSON body (`Null` when the body was not JSON)
    pub body: serde_json::Value,
}

impl HttpReply {
    /// A 200 reply with the given body
    pub fn ok(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body,
        }
    }
}

/// Failure to obtain any reply at all
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Sends GraphQL requests to one store
#[async_trait]
pub trait GraphqlTransport: Send + Sync {
    /// Shop domain this transport talks to
    fn shop(&self) -> &str;

    /// Send a request and return whatever came back
    async fn send(&self, request: &GraphqlRequest) -> std::result::Result<HttpReply, TransportError>;
}

/// Transport backed by `reqwest`
pub struct HttpTransport {
    client: Client,
    shop: String,
    endpoint: String,
}

impl HttpTransport {
    /// Build a transport for a store using the shared configuration
    pub fn new(config: &Config, store: &StoreConfig) -> Result<Self> {
        let mut token = header::HeaderValue::from_str(&store.token).map_err(|_| {
            crate::error::Error::ConfigInvalid {
                message: format!("access token for {} contains invalid characters", store.shop),
            }
        })?;
        token.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert("X-Shopify-Access-Token", token);
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            shop: store.shop.clone(),
            endpoint: endpoint(&store.shop, config.api_version_for(store)),
        })
    }
}

/// Delay of a server-supplied number of seconds.
///
/// Negative and NaN values give no delay hint; values too large for a
/// `Duration` saturate and are capped by the retry policy.
pub fn delay_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}

/// Admin GraphQL endpoint for a shop
pub fn endpoint(shop: &str, api_version: &str) -> String {
    format!("https://{}/admin/api/{}/graphql.json", shop, api_version)
}

#[async_trait]
impl GraphqlTransport for HttpTransport {
    fn shop(&self) -> &str {
        &self.shop
    }

    async fn send(&self, request: &GraphqlRequest) -> std::result::Result<HttpReply, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .and_then(delay_from_secs);

        let text = response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let body = serde_json::from_str(&text).unwrap_or_else(|_| serde_json::Value::String(text));

        Ok(HttpReply {
            status,
            retry_after,
            body,
        })
    }
}
