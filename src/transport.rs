use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{AbortHandle, AbortRegistration, Abortable};
use uuid::Uuid;

use crate::error::{ApiFailure, BuildError};
use crate::request::{RequestDescriptor, JSON_CONTENT_TYPE};

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Status, headers and fully read body of one HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are lowercase
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .map(|value| value.to_ascii_lowercase().contains(JSON_CONTENT_TYPE))
            .unwrap_or(false)
    }
}

/// Caller side of a cancellation pair
#[derive(Debug, Clone)]
pub struct CancelHandle(AbortHandle);

/// Transport side of a cancellation pair, consumed by one `send`
#[derive(Debug)]
pub struct CancelSignal(AbortRegistration);

/// Create a linked cancellation handle and signal
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (handle, registration) = AbortHandle::new_pair();
    (CancelHandle(handle), CancelSignal(registration))
}

impl CancelSignal {
    /// Drive `future` until it completes or the paired handle cancels it.
    ///
    /// On cancellation the future is dropped, releasing whatever it holds
    /// (sockets, a share of an in-flight token refresh).
    pub async fn guard<F: Future>(self, future: F) -> Result<F::Output, ApiFailure> {
        Abortable::new(future, self.0)
            .await
            .map_err(|_aborted| ApiFailure::cancelled())
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_aborted()
    }

    /// Cancel once `after` elapses; this is how callers impose a timeout
    pub fn cancel_after(&self, after: Duration) -> tokio::task::JoinHandle<()> {
        let handle = self.0.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            handle.abort();
        })
    }
}

/// Executes a single HTTP attempt; retry policy belongs to the caller
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        descriptor: &RequestDescriptor,
        cancel: Option<CancelSignal>,
    ) -> Result<RawResponse, ApiFailure>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, connect_timeout: Option<Duration>) -> Result<Self, BuildError> {
        let mut builder = reqwest::Client::builder().user_agent(user_agent.to_string());

        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| BuildError::HttpClient(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        descriptor: &RequestDescriptor,
        cancel: Option<CancelSignal>,
    ) -> Result<RawResponse, ApiFailure> {
        let request_id = descriptor
            .header(REQUEST_ID_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut request = self
            .client
            .request(descriptor.method.into(), descriptor.url.clone());

        for (name, value) in &descriptor.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if descriptor.header(REQUEST_ID_HEADER).is_none() {
            request = request.header(REQUEST_ID_HEADER, request_id.as_str());
        }
        if let Some(body) = &descriptor.body {
            request = request.body(body.clone());
        }

        tracing::debug!(
            method = %descriptor.method,
            path = %descriptor.path,
            tenant = descriptor.tenant_slug().unwrap_or("-"),
            request_id = %request_id,
            "Sending request"
        );

        let exchange = async move {
            let response = request.send().await.map_err(describe_error)?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_string(), value.to_string()))
                })
                .collect();
            let body = response.bytes().await.map_err(describe_error)?;

            Ok::<_, ApiFailure>(RawResponse {
                status,
                headers,
                body,
            })
        };

        let result = match cancel {
            Some(signal) => signal.guard(exchange).await.and_then(|result| result),
            None => exchange.await,
        };

        match &result {
            Ok(response) => tracing::debug!(
                request_id = %request_id,
                status = response.status,
                "Received response"
            ),
            Err(failure) => tracing::warn!(
                request_id = %request_id,
                path = %descriptor.path,
                "Transport failure: {}",
                failure.message
            ),
        }

        result
    }
}

fn describe_error(error: reqwest::Error) -> ApiFailure {
    let prefix = if error.is_timeout() {
        "request timed out"
    } else if error.is_connect() {
        "connection failed"
    } else if error.is_builder() {
        "invalid request"
    } else {
        "request failed"
    };

    // reqwest's Display omits the underlying cause (DNS, refused, ...)
    let mut message = format!("{}: {}", prefix, error);
    let mut source = std::error::Error::source(&error);
    while let Some(cause) = source {
        message.push_str(&format!(": {}", cause));
        source = cause.source();
    }

    ApiFailure::transport(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_json_matches_content_type() {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "Application/JSON; charset=utf-8".to_string());
        let response = RawResponse {
            status: 200,
            headers,
            body: Bytes::new(),
        };

        assert!(response.is_json());
        assert_eq!(response.header("Content-Type"), Some("Application/JSON; charset=utf-8"));
    }

    #[tokio::test]
    async fn test_cancel_after_marks_handle() {
        let (handle, _signal) = cancellation();
        assert!(!handle.is_cancelled());

        handle.cancel_after(Duration::from_millis(10)).await.unwrap();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_guard_passes_through_uncancelled_output() {
        let (_handle, signal) = cancellation();
        assert_eq!(signal.guard(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_guard_drops_pending_future_on_cancel() {
        let (handle, signal) = cancellation();
        handle.cancel_after(Duration::from_millis(20));

        let outcome = signal.guard(futures::future::pending::<()>()).await;
        assert_eq!(outcome, Err(ApiFailure::cancelled()));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let builder =
            crate::request::RequestBuilder::new(&format!("http://127.0.0.1:{}", port)).unwrap();
        let descriptor = builder
            .build("/health", None, &crate::request::RequestOptions::new())
            .unwrap();

        let transport = HttpTransport::new("studio-test", None).unwrap();
        let failure = transport.send(&descriptor, None).await.unwrap_err();

        assert_eq!(failure.status, 0);
        assert!(failure.is_transport());
        assert!(failure.message.starts_with("connection failed"), "{}", failure.message);
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let builder = crate::request::RequestBuilder::new("http://127.0.0.1:9").unwrap();
        let descriptor = builder
            .build("/health", None, &crate::request::RequestOptions::new())
            .unwrap();

        let (handle, signal) = cancellation();
        handle.cancel();

        let transport = HttpTransport::new("studio-test", None).unwrap();
        let failure = transport.send(&descriptor, Some(signal)).await.unwrap_err();
        assert_eq!(failure, ApiFailure::cancelled());
    }
}
