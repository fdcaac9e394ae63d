//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;

use crate::body::{self, BodyError};
use crate::context::RequestContext;
use crate::list_params::{ListParams, ListParamsError};

/// An incoming HTTP request with its body already buffered.
///
/// The body is read once at dispatch. Every wrapper and the endpoint see the
/// same bytes, so logging the body never starves the handler.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) context: RequestContext,
}

impl Request {
    pub(crate) fn new(
        parts: http::request::Parts,
        body: Bytes,
        params: HashMap<String, String>,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params,
            context: RequestContext::default(),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn context(&self) -> &RequestContext { &self.context }
    pub fn context_mut(&mut self) -> &mut RequestContext { &mut self.context }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Host` header, falling back to the URI authority.
    pub fn host(&self) -> &str {
        self.header("host")
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
            .unwrap_or_default()
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parses list/pagination parameters from the query string.
    pub fn list_params(&self) -> Result<ListParams, ListParamsError> {
        ListParams::from_query(self.query())
    }

    /// Decodes the body according to its `Content-Type`.
    pub fn parse_body<T: DeserializeOwned>(&self) -> Result<T, BodyError> {
        body::parse_body(self)
    }
}

/// Builds a request from an already-buffered `http::Request`, with no path
/// parameters. Handy for calling endpoints directly.
impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts, body, HashMap::new())
    }
}
