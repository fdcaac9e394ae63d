//! Response envelope and the [`Reply`] every endpoint returns.
//!
//! An endpoint never touches the wire. It returns a [`Response`] on success or
//! an [`Error`] on failure, and the serialization wrapper at the edge of the
//! chain decides how to write it:
//!
//! ```rust
//! use stoa::{Error, Request, Response, REQUEST};
//! use serde_json::json;
//!
//! async fn get_item(req: Request) -> Result<Response, Error> {
//!     let Some(id) = req.param("id") else {
//!         return Err(REQUEST.bad_request(9, &["id is required"]));
//!     };
//!     Ok(Response::ok(json!({ "id": id })))
//! }
//! ```

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::StatusCode;
use serde_json::Value;

use crate::error::Error;

static NO_HEADERS: BTreeMap<String, String> = BTreeMap::new();

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content types written by the serialization wrappers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    FormData,   // application/x-www-form-urlencoded
    Json,       // application/json; charset=UTF-8
    Png,        // image/png
    Prometheus, // text/plain; version=0.0.4 (exposition format)
    Text,       // text/plain; charset=utf-8
}

impl ContentType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FormData   => "application/x-www-form-urlencoded",
            Self::Json       => "application/json; charset=UTF-8",
            Self::Png        => "image/png",
            Self::Prometheus => "text/plain; version=0.0.4; charset=utf-8",
            Self::Text       => "text/plain; charset=utf-8",
        }
    }
}

// ── Payload ───────────────────────────────────────────────────────────────────

/// The body an endpoint hands back.
///
/// `Json` covers structured data and the redirect convention (a
/// `Value::String` holding the target URL). `Bytes` is for binary content
/// such as images or spreadsheet exports.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Json(Value),
    Bytes(Bytes),
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self { Self::Json(v) }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self { Self::Bytes(b) }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self { Self::Bytes(Bytes::from(b)) }
}

impl From<String> for Payload {
    fn from(s: String) -> Self { Self::Json(Value::String(s)) }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self { Self::Json(Value::String(s.to_owned())) }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// A successful endpoint result: status, payload and extra headers.
///
/// Headers may be changed until the serialization wrapper consumes the
/// envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    status: StatusCode,
    data: Payload,
    headers: BTreeMap<String, String>,
}

impl Response {
    pub fn new(
        status: StatusCode,
        data: impl Into<Payload>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        Self { status, data: data.into(), headers }
    }

    /// `200 OK`.
    pub fn ok(data: impl Into<Payload>) -> Self {
        Self::new(StatusCode::OK, data, BTreeMap::new())
    }

    /// `201 Created`.
    pub fn created(data: impl Into<Payload>) -> Self {
        Self::new(StatusCode::CREATED, data, BTreeMap::new())
    }

    /// A `301`/`302` whose payload is the target URL, as the
    /// [`json`](crate::middleware::json) wrapper expects.
    pub fn redirect(status: StatusCode, location: impl Into<String>) -> Self {
        Self::new(status, location.into(), BTreeMap::new())
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn data(&self) -> &Payload { &self.data }
    pub fn headers(&self) -> &BTreeMap<String, String> { &self.headers }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub(crate) fn into_parts(self) -> (StatusCode, Payload, BTreeMap<String, String>) {
        (self.status, self.data, self.headers)
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// What an endpoint produces: a [`Response`] or an [`Error`].
///
/// Both sides expose a status, headers and a JSON-renderable body, so
/// wrappers treat them uniformly and only the serializer tells them apart.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Success(Response),
    Failure(Error),
}

impl Reply {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Success(res) => res.status(),
            Self::Failure(err) => err.status(),
        }
    }

    /// Custom headers. Errors never carry any.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        match self {
            Self::Success(res) => res.headers(),
            Self::Failure(_) => &NO_HEADERS,
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers().get(key).map(String::as_str)
    }

    /// Sets a header on a successful reply; errors ignore it.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if let Self::Success(res) = self {
            res.set_header(key, value);
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// The body rendered as JSON. Byte payloads encode as a padded base64
    /// string.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Self::Success(res) => match res.data() {
                Payload::Json(v) => serde_json::to_vec(v),
                Payload::Bytes(b) => serde_json::to_vec(&STANDARD.encode(b)),
            },
            Self::Failure(err) => serde_json::to_vec(err),
        }
    }
}

impl From<Response> for Reply {
    fn from(res: Response) -> Self { Self::Success(res) }
}

impl From<Error> for Reply {
    fn from(err: Error) -> Self { Self::Failure(err) }
}

/// Lets endpoints use `?` on anything that converts into an [`Error`].
impl From<Result<Response, Error>> for Reply {
    fn from(res: Result<Response, Error>) -> Self {
        match res {
            Ok(res) => Self::Success(res),
            Err(err) => Self::Failure(err),
        }
    }
}
