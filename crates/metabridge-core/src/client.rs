//! Shopify Admin GraphQL client
//!
//! Wraps a [`GraphqlTransport`] with response classification, bounded
//! retries for throttling and server errors, and cursor pagination.
//!
//! # Retry behavior
//!
//! | Reply                                   | Outcome                    |
//! |-----------------------------------------|----------------------------|
//! | 401 / 403, `ACCESS_DENIED`              | [`Error::Auth`], no retry  |
//! | 429, 5xx, `THROTTLED`, transport error  | sleep, retry               |
//! | other non-2xx                           | [`Error::Http`]            |
//! | other GraphQL errors                    | [`Error::GraphQl`]         |
//!
//! Once `max_attempts` is spent the last transient reason is reported as
//! [`Error::RetriesExhausted`].

use futures::{Stream, TryStreamExt, stream};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::{Config, RetryConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::transport::{GraphqlRequest, GraphqlTransport, HttpReply, HttpTransport, delay_from_secs};

/// Bounded retry policy for transient failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per request, including the first
    pub max_attempts: u32,
    /// Delay before the first retry when the API gives no hint
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given failed attempt (1-based).
    ///
    /// A server hint wins over the exponential schedule; both are capped.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let delay = hint.unwrap_or_else(|| {
            let exponent = attempt.saturating_sub(1).min(16);
            self.base_delay.saturating_mul(1u32 << exponent)
        });
        delay.min(self.max_delay)
    }
}

/// How a single reply should be handled
#[derive(Debug)]
enum Outcome {
    Data(serde_json::Value),
    Retry {
        reason: String,
        hint: Option<Duration>,
    },
    Fail(Error),
}

/// GraphQL client for one store
pub struct ShopifyClient<T = HttpTransport> {
    transport: T,
    retry: RetryPolicy,
    page_size: u32,
}

impl ShopifyClient<HttpTransport> {
    /// Build a client for a configured store
    pub fn connect(config: &Config, store: &StoreConfig) -> Result<Self> {
        let transport = HttpTransport::new(config, store)?;
        Ok(Self::new(transport, config))
    }
}

impl<T: GraphqlTransport> ShopifyClient<T> {
    /// Wrap a transport using the retry and paging settings of `config`
    pub fn new(transport: T, config: &Config) -> Self {
        Self {
            transport,
            retry: RetryPolicy::from(&config.retry),
            page_size: config.page_size,
        }
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Shop domain
    pub fn shop(&self) -> &str {
        self.transport.shop()
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run a query or mutation and return its `data` object
    pub async fn query(
        &self,
        operation: &str,
        document: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let request = GraphqlRequest {
            query: document.to_string(),
            variables,
            operation_name: operation.to_string(),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(
                shop = self.shop(),
                operation,
                attempt,
                "Sending GraphQL request"
            );

            let outcome = match self.transport.send(&request).await {
                Ok(reply) => classify(self.shop(), operation, reply),
                Err(e) => Outcome::Retry {
                    reason: format!("transport error: {}", e),
                    hint: None,
                },
            };

            match outcome {
                Outcome::Data(data) => return Ok(data),
                Outcome::Fail(err) => return Err(err),
                Outcome::Retry { reason, hint } => {
                    if attempt >= self.retry.max_attempts {
                        return Err(Error::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            last: reason,
                        });
                    }
                    let delay = self.retry.delay_for(attempt, hint);
                    tracing::warn!(
                        shop = self.shop(),
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "{}, backing off",
                        reason
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Lazily walk every node of a connection.
    ///
    /// Pages are requested only as the stream is polled; dropping the
    /// stream stops pagination. A stream cannot be resumed: to start over,
    /// call `paginate` again.
    pub fn paginate<'a, N>(&'a self, query: &'a PageQuery) -> impl Stream<Item = Result<N>> + 'a
    where
        N: DeserializeOwned + 'a,
    {
        enum Cursor {
            Start,
            After(String),
            Done,
        }

        let start = match &query.start_after {
            Some(cursor) => Cursor::After(cursor.clone()),
            None => Cursor::Start,
        };

        let pages = stream::try_unfold(start, move |cursor| async move {
            let after = match cursor {
                Cursor::Done => return Ok(None),
                Cursor::Start => None,
                Cursor::After(c) => Some(c),
            };

            let page: Page<N> = self.fetch_page(query, after.as_deref()).await?;
            let next = match (page.page_info.has_next_page, page.page_info.end_cursor) {
                (false, _) => Cursor::Done,
                (true, Some(cursor)) => {
                    tracing::info!(
                        shop = self.shop(),
                        operation = query.operation,
                        "Fetched page, continuing after cursor {}",
                        cursor
                    );
                    Cursor::After(cursor)
                }
                (true, None) => {
                    return Err(Error::UnexpectedResponse {
                        operation: query.operation.to_string(),
                        message: "hasNextPage is true but endCursor is missing".to_string(),
                    });
                }
            };
            Ok(Some((page.nodes, next)))
        });

        pages
            .map_ok(|nodes| stream::iter(nodes.into_iter().map(Ok::<N, Error>)))
            .try_flatten()
    }

    async fn fetch_page<N: DeserializeOwned>(
        &self,
        query: &PageQuery,
        after: Option<&str>,
    ) -> Result<Page<N>> {
        let mut variables = query.variables.clone();
        variables.insert("first".into(), self.page_size.into());
        variables.insert(
            "after".into(),
            after.map_or(serde_json::Value::Null, |c| c.into()),
        );

        let data = self
            .query(
                query.operation,
                query.document,
                serde_json::Value::Object(variables),
            )
            .await?;

        let connection = query
            .path
            .iter()
            .try_fold(&data, |value, key| value.get(*key))
            .filter(|v| !v.is_null())
            .ok_or_else(|| Error::UnexpectedResponse {
                operation: query.operation.to_string(),
                message: format!("missing connection at '{}'", query.path.join(".")),
            })?;

        Page::deserialize(connection).map_err(|e| Error::UnexpectedResponse {
            operation: query.operation.to_string(),
            message: e.to_string(),
        })
    }
}

/// A paginated connection query.
///
/// The document must declare `$first: Int!` and `$after: String`; the
/// client fills both. `path` locates the connection inside `data`.
#[derive(Debug, Clone)]
pub struct PageQuery {
    /// Operation name
    pub operation: &'static str,
    /// GraphQL document
    pub document: &'static str,
    /// Keys leading from `data` to the connection object
    pub path: Vec<&'static str>,
    /// Extra variables besides `first` and `after`
    pub variables: serde_json::Map<String, serde_json::Value>,
    /// Cursor to resume after instead of starting at the first page
    pub start_after: Option<String>,
}

impl PageQuery {
    /// Query for a top-level connection such as `products`
    pub fn new(operation: &'static str, document: &'static str, path: &[&'static str]) -> Self {
        Self {
            operation,
            document,
            path: path.to_vec(),
            variables: serde_json::Map::new(),
            start_after: None,
        }
    }

    /// Begin after a cursor already obtained elsewhere
    pub fn starting_after(mut self, cursor: impl Into<String>) -> Self {
        self.start_after = Some(cursor.into());
        self
    }

    /// Add a variable
    pub fn with_variable(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }
}

/// Cursor information of a connection
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// More pages follow
    pub has_next_page: bool,
    /// Cursor of the last node in this page
    pub end_cursor: Option<String>,
}

/// One page of a connection
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<N> {
    /// Cursor information
    pub page_info: PageInfo,
    /// Nodes in this page
    pub nodes: Vec<N>,
}

fn classify(shop: &str, operation: &str, reply: HttpReply) -> Outcome {
    let status = reply.status;

    if status == 401 || status == 403 {
        return Outcome::Fail(Error::Auth {
            shop: shop.to_string(),
            status,
            message: body_excerpt(&reply.body),
        });
    }
    if status == 429 || (500..600).contains(&status) {
        return Outcome::Retry {
            reason: format!("HTTP {}", status),
            hint: reply.retry_after,
        };
    }
    if !(200..300).contains(&status) {
        return Outcome::Fail(Error::Http {
            operation: operation.to_string(),
            status,
            body: body_excerpt(&reply.body),
        });
    }

    if let Some(errors) = reply.body.get("errors") {
        let codes: Vec<&str> = error_entries(errors)
            .filter_map(|e| e.pointer("/extensions/code").and_then(|c| c.as_str()))
            .collect();

        if codes.contains(&"THROTTLED") {
            return Outcome::Retry {
                reason: "throttled".to_string(),
                hint: throttle_delay(&reply.body).or(reply.retry_after),
            };
        }
        if codes.contains(&"ACCESS_DENIED") {
            return Outcome::Fail(Error::Auth {
                shop: shop.to_string(),
                status,
                message: error_messages(errors).join("; "),
            });
        }
        if codes.contains(&"INTERNAL_SERVER_ERROR") {
            return Outcome::Retry {
                reason: "internal server error".to_string(),
                hint: None,
            };
        }
        return Outcome::Fail(Error::GraphQl {
            operation: operation.to_string(),
            messages: error_messages(errors),
        });
    }

    match reply.body.get("data") {
        Some(data) if !data.is_null() => Outcome::Data(data.clone()),
        _ => Outcome::Fail(Error::UnexpectedResponse {
            operation: operation.to_string(),
            message: "response has no data".to_string(),
        }),
    }
}

/// Shopify's `errors` is normally an array but is a bare string for some
/// transport-level failures.
fn error_entries(errors: &serde_json::Value) -> impl Iterator<Item = &serde_json::Value> {
    errors.as_array().into_iter().flatten()
}

fn error_messages(errors: &serde_json::Value) -> Vec<String> {
    match errors {
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(items) => items
            .iter()
            .map(|e| {
                e.get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| e.to_string())
            })
            .collect(),
        other => vec![other.to_string()],
    }
}

/// Time until enough query cost has been restored to rerun the request.
fn throttle_delay(body: &serde_json::Value) -> Option<Duration> {
    let cost = body.pointer("/extensions/cost")?;
    let requested = cost.get("requestedQueryCost")?.as_f64()?;
    let available = cost.pointer("/throttleStatus/currentlyAvailable")?.as_f64()?;
    let restore_rate = cost.pointer("/throttleStatus/restoreRate")?.as_f64()?;
    if restore_rate <= 0.0 {
        return None;
    }
    let deficit = (requested - available).max(0.0);
    delay_from_secs(deficit / restore_rate)
}

fn body_excerpt(body: &serde_json::Value) -> String {
    let text = match body {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.chars().take(500).collect()
}
