//! Serialization wrappers: the edge where a [`Reply`] becomes bytes.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use serde_json::Value;
use tracing::warn;

use crate::handler::{Endpoint, Handler, HttpResponse};
use crate::request::Request;
use crate::response::{ContentType, Payload, Reply};

/// JSON serializer.
///
/// Sets `application/json`, then copies the reply's own headers (which may
/// override it). A `301`/`302` is written as a redirect to the URL held in
/// the payload, with no body. An encoding failure turns into a plain-text
/// `500` carrying the error text; headers already copied stay.
pub fn json(endpoint: impl Endpoint) -> impl Handler {
    let inner = endpoint.into_boxed_endpoint();
    move |req: Request| {
        let inner = Arc::clone(&inner);
        async move { write_json(inner.call(req).await) }
    }
}

/// PNG serializer. Byte payloads are written as-is; anything else (errors
/// included) is JSON-encoded under the `image/png` content type.
pub fn image_png(endpoint: impl Endpoint) -> impl Handler {
    let inner = endpoint.into_boxed_endpoint();
    move |req: Request| {
        let inner = Arc::clone(&inner);
        async move { write_png(inner.call(req).await) }
    }
}

/// Spreadsheet download serializer.
///
/// Writes the reply's headers and status. The endpoint sets its own
/// `content-type`/`content-disposition` and supplies the file as a byte
/// payload; a JSON payload is not written.
pub fn file_xls(endpoint: impl Endpoint) -> impl Handler {
    let inner = endpoint.into_boxed_endpoint();
    move |req: Request| {
        let inner = Arc::clone(&inner);
        async move { write_file(inner.call(req).await) }
    }
}

fn write_json(reply: Reply) -> HttpResponse {
    let status = reply.status();
    let mut res = start(status, Some(ContentType::Json), reply.headers());

    if status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::FOUND {
        let location = match &reply {
            Reply::Success(r) => match r.data() {
                Payload::Json(Value::String(url)) => HeaderValue::from_str(url).ok(),
                _ => None,
            },
            Reply::Failure(_) => None,
        };
        return match location {
            Some(url) => {
                res.headers_mut().insert(LOCATION, url);
                res
            }
            None => fail(res, "redirect payload must be a valid URL string"),
        };
    }

    match reply.to_json() {
        Ok(body) => {
            *res.body_mut() = Full::new(Bytes::from(body));
            res
        }
        Err(e) => fail(res, &e.to_string()),
    }
}

fn write_png(reply: Reply) -> HttpResponse {
    let mut res = start(reply.status(), Some(ContentType::Png), reply.headers());

    let body = match &reply {
        Reply::Success(r) => match r.data() {
            Payload::Bytes(bytes) => Ok(bytes.clone()),
            Payload::Json(_) => reply.to_json().map(Bytes::from),
        },
        Reply::Failure(_) => reply.to_json().map(Bytes::from),
    };
    match body {
        Ok(body) => {
            *res.body_mut() = Full::new(body);
            res
        }
        Err(e) => fail(res, &e.to_string()),
    }
}

fn write_file(reply: Reply) -> HttpResponse {
    let mut res = start(reply.status(), None, reply.headers());
    if let Reply::Success(r) = reply {
        if let (_, Payload::Bytes(bytes), _) = r.into_parts() {
            *res.body_mut() = Full::new(bytes);
        }
    }
    res
}

/// Status, optional content type, then the reply's headers on top.
fn start(
    status: StatusCode,
    content_type: Option<ContentType>,
    headers: &BTreeMap<String, String>,
) -> HttpResponse {
    let mut res = HttpResponse::new(Full::new(Bytes::new()));
    *res.status_mut() = status;
    if let Some(ct) = content_type {
        res.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(ct.as_str()));
    }
    for (name, value) in headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                res.headers_mut().insert(name, value);
            }
            _ => warn!(header = %name, "dropping response header with invalid name or value"),
        }
    }
    res
}

/// Plain-text 500. Keeps whatever headers `res` already carries.
fn fail(mut res: HttpResponse, message: &str) -> HttpResponse {
    *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    let headers = res.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(ContentType::Text.as_str()));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    *res.body_mut() = Full::new(Bytes::from(format!("{message}\n")));
    res
}

/// A bare response with one content type; used for infrastructure routes.
pub(crate) fn raw(status: StatusCode, content_type: ContentType, body: Bytes) -> HttpResponse {
    let mut res = HttpResponse::new(Full::new(body));
    *res.status_mut() = status;
    res.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
    res
}
