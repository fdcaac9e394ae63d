//! Per-request audit log.

use std::sync::Arc;
use std::time::Instant;

use http::Method;
use tracing::{debug, warn};

use crate::body::{FORM, media_type};
use crate::handler::Endpoint;
use crate::request::Request;

/// Logs every request with its outcome.
///
/// The line carries method, URL, host, every header, the form data of a POST,
/// the raw request body, elapsed time, status and the JSON-rendered reply.
/// Statuses selected by [`is_flagged`] log at `warn`, the rest at `debug`.
pub fn logging(endpoint: impl Endpoint) -> impl Endpoint {
    let inner = endpoint.into_boxed_endpoint();
    move |req: Request| {
        let inner = Arc::clone(&inner);
        async move {
            let start = Instant::now();
            let request = describe_request(&req);
            let body = String::from_utf8_lossy(req.body()).into_owned();

            let reply = inner.call(req).await;

            let elapsed = start.elapsed();
            let status = reply.status().as_u16();
            let response = match reply.to_json() {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => format!("<unencodable: {e}>"),
            };

            if is_flagged(status) {
                warn!(%request, %body, ?elapsed, status, %response, "request");
            } else {
                debug!(%request, %body, ?elapsed, status, %response, "request");
            }
            reply
        }
    }
}

/// `true` when `status % 200` or `status % 300` is below 100.
///
/// In practice that is every status from 200 through 499; 1xx and 5xx are
/// not flagged.
pub(crate) fn is_flagged(status: u16) -> bool {
    status % 200 < 100 || status % 300 < 100
}

/// One-line rendering of the request: `GET /path?q Host: h name: value …`.
fn describe_request(req: &Request) -> String {
    let mut parts = vec![
        format!("{} {}", req.method(), req.uri()),
        format!("Host: {}", req.host()),
    ];
    for (name, value) in req.headers() {
        parts.push(format!("{}: {}", name.as_str(), String::from_utf8_lossy(value.as_bytes())));
    }
    if req.method() == Method::POST {
        parts.push(" ".to_owned());
        parts.push(post_form(req));
    }
    parts.join(" ") + " "
}

/// Query and form-body pairs of a POST, body first, sorted by key and
/// re-encoded.
fn post_form(req: &Request) -> String {
    let mut pairs: Vec<(String, String)> = Vec::new();
    if media_type(req.header("content-type")).as_deref() == Some(FORM) {
        pairs.extend(url::form_urlencoded::parse(req.body()).into_owned());
    }
    if let Some(query) = req.query() {
        pairs.extend(url::form_urlencoded::parse(query.as_bytes()).into_owned());
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{Payload, Reply, Response};
    use bytes::Bytes;
    use serde_json::json;

    fn post(uri: &str, content_type: &str, body: &'static str) -> Request {
        Request::from(
            http::Request::builder()
                .method("POST")
                .uri(uri)
                .header("host", "api.local")
                .header("Content-Type", content_type)
                .body(Bytes::from_static(body.as_bytes()))
                .unwrap(),
        )
    }

    #[test]
    fn flagged_statuses_follow_the_arithmetic() {
        for status in [200, 201, 204, 250, 299, 300, 301, 302, 350, 400, 404, 422] {
            assert!(is_flagged(status), "{status}");
        }
        for status in [100, 101, 500, 502, 503] {
            assert!(!is_flagged(status), "{status}");
        }
    }

    #[test]
    fn describes_post_with_sorted_form() {
        let req = post(
            "/signup?ref=ad",
            "application/x-www-form-urlencoded",
            "name=ann&age=30",
        );
        let line = describe_request(&req);

        assert!(line.starts_with("POST /signup?ref=ad Host: api.local "), "{line}");
        assert!(line.contains("content-type: application/x-www-form-urlencoded"), "{line}");
        assert!(line.ends_with("age=30&name=ann&ref=ad "), "{line}");
    }

    #[test]
    fn json_post_only_logs_query_pairs() {
        let req = post("/items?dry=1", "application/json", r#"{"a":1}"#);
        assert_eq!(post_form(&req), "dry=1");
    }

    #[tokio::test]
    async fn body_still_reaches_the_endpoint() {
        async fn echo(req: Request) -> Response {
            let body: serde_json::Value = serde_json::from_slice(req.body()).unwrap_or_default();
            Response::created(body)
        }

        let reply = logging(echo)
            .into_boxed_endpoint()
            .call(post("/items", "application/json", r#"{"name":"lamp"}"#))
            .await;

        let Reply::Success(res) = reply else { panic!("expected success") };
        assert_eq!(res.status(), http::StatusCode::CREATED);
        assert_eq!(res.data(), &Payload::Json(json!({"name": "lamp"})));
    }
}
