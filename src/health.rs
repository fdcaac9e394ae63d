//! Default health-check endpoint.
//!
//! [`Server::serve`](crate::Server::serve) mounts whatever health endpoint it
//! is given on two paths:
//!
//! | Listener | Path |
//! |---|---|
//! | application | `GET /_/health` |
//! | metrics | `GET /health` |
//!
//! Pass [`liveness`] when the process answering HTTP is proof enough. Gate on
//! dependencies with your own endpoint:
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use stoa::{Error, Request, Response, HTTP};
//!
//! async fn health(_req: Request) -> Result<Response, Error> {
//!     if database_is_up().await {
//!         Ok(Response::ok(serde_json::json!({ "status": "ok" })))
//!     } else {
//!         Err(HTTP.new_error(StatusCode::SERVICE_UNAVAILABLE, 1, &["database unreachable"]))
//!     }
//! }
//!
//! async fn database_is_up() -> bool { true }
//! ```

use serde_json::json;

use crate::{Request, Response};

/// Always `200 OK` with `{"status":"ok"}`. Has no dependencies.
pub async fn liveness(_req: Request) -> Response {
    Response::ok(json!({ "status": "ok" }))
}
