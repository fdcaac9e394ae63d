//! # stoa
//!
//! The shared plumbing of a JSON REST service: one error envelope, one
//! response envelope, and a fixed middleware chain around plain async
//! endpoints.
//!
//! ## The contract
//!
//! An endpoint is an async function from [`Request`] to a [`Response`], an
//! [`Error`], or `Result<Response, Error>`. It never touches headers on the
//! wire, status lines or encoders. [`Server::handle`] wraps it as
//!
//! ```text
//! metrics(path, json(logging(endpoint)))
//! ```
//!
//! and callers add [`acl`](middleware::acl) or [`bearer`](middleware::bearer)
//! innermost when the route needs a token.
//!
//! Errors are values with a stable, machine-readable code:
//!
//! ```text
//! {"system":"REQUEST","status":400,"series":10,"code":"REQUEST.400103",
//!  "message":"last and first params are used together", ...}
//! ```
//!
//! Each subsystem owns an [`ErrorSystem`] (a name plus a series number) and
//! mints its errors from it, so two services never collide on a code.
//!
//! What stoa ships besides the chain:
//!
//! - List query parsing: `ipp`, `p`, `first`, `last`, `q`, `sort`, `fields`
//! - Body decoding by content type: JSON or form
//! - A second listener for `/health` and Prometheus `/metrics`
//! - Ordered graceful shutdown on SIGTERM / Ctrl-C
//! - [`Requester`] for calling other services
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::Method;
//! use stoa::middleware::acl;
//! use stoa::{Error, ListResponse, Request, Response, Server, health};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), stoa::ServerError> {
//!     Server::bind("0.0.0.0:3000")
//!         .handle(Method::GET, "/items", acl(list_items))
//!         .serve(health::liveness, || {})
//!         .await
//! }
//!
//! async fn list_items(req: Request) -> Result<Response, Error> {
//!     let params = req.list_params()?;
//!     let items: Vec<serde_json::Value> = Vec::new();
//!     let page = ListResponse::new(params.pagination, 0, items);
//!     Ok(Response::ok(serde_json::to_value(page).map_err(|e| {
//!         stoa::REQUEST.internal_server_error(1, &["encoding failed", e.to_string().as_str()])
//!     })?))
//! }
//! ```

mod body;
mod context;
mod error;
mod handler;
mod list_params;
mod metrics;
mod request;
mod requester;
mod response;
mod router;
mod server;

pub mod health;
pub mod middleware;

pub use body::{BodyError, parse_body};
pub use context::RequestContext;
pub use error::{ACL, Error, ErrorSystem, HTTP, REQUEST, detect_error_envelope};
pub use handler::{Endpoint, Handler, HttpResponse};
pub use list_params::{ListParams, ListParamsError, ListResponse, Pagination, Sequence, Sort};
pub use metrics::Metrics;
pub use request::Request;
pub use requester::{RequestError, Requester};
pub use response::{ContentType, Payload, Reply, Response};
pub use router::Router;
pub use server::{Server, ServerError};
