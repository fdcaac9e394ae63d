//! Outbound JSON calls to other services.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read response body: {0}")]
    Body(#[from] hyper::Error),

    #[error("unexpected status {status} (expected {expected}) for {url}: {message}")]
    UnexpectedStatus {
        status: StatusCode,
        expected: StatusCode,
        url: String,
        message: String,
    },

    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

/// A pooled HTTP/1 client.
///
/// Cloning is cheap and clones share the connection pool.
#[derive(Clone)]
pub struct Requester {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl Requester {
    pub fn new() -> Self {
        Self { client: Client::builder(TokioExecutor::new()).build_http() }
    }

    /// Sends `body` (JSON-encoded, if any) and returns the raw response body.
    ///
    /// A status other than `expected` is an error carrying the body text.
    /// `headers` are sent as given; nothing is added.
    pub async fn fetch(
        &self,
        method: Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
        expected: StatusCode,
    ) -> Result<Bytes, RequestError> {
        let payload = match body {
            Some(value) => Bytes::from(serde_json::to_vec(value).map_err(RequestError::Encode)?),
            None => Bytes::new(),
        };

        let mut builder = http::Request::builder().method(method).uri(url);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        let req = builder.body(Full::new(payload))?;

        let res = self.client.request(req).await?;
        let status = res.status();
        let bytes = res.into_body().collect().await?.to_bytes();

        if status != expected {
            return Err(RequestError::UnexpectedStatus {
                status,
                expected,
                url: url.to_owned(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes)
    }

    /// [`fetch`](Requester::fetch), then decodes the body as JSON.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
        expected: StatusCode,
    ) -> Result<T, RequestError> {
        let bytes = self.fetch(method, url, headers, body, expected).await?;
        serde_json::from_slice(&bytes).map_err(RequestError::Decode)
    }
}

impl Default for Requester {
    fn default() -> Self { Self::new() }
}
