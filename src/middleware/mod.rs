//! Middleware layer.
//!
//! Every wrapper is a plain function taking the next layer and returning a new
//! one, so a chain reads inside-out:
//!
//! ```rust,no_run
//! # use stoa::{Request, Response};
//! # use stoa::middleware::{acl, json, logging};
//! # async fn list(_: Request) -> Response { Response::ok(serde_json::json!([])) }
//! let handler = json(logging(acl(list)));
//! ```
//!
//! Built-in middleware:
//! - [`acl`] / [`bearer`]: bearer-token checks that fill the request context
//! - [`logging`]: one audit line per request, level picked by status
//! - [`metrics`]: handler latency histogram per route pattern
//! - [`json`], [`image_png`], [`file_xls`]: turn a reply into HTTP bytes
//!
//! [`Server::handle`](crate::Server::handle) already applies `metrics`,
//! `json` and `logging`; callers only add the auth layer.

pub mod auth;
mod logging;
mod metrics;
pub(crate) mod serialize;

pub use auth::{AuthError, Claims, TokenValidator, UnverifiedClaims, acl, acl_with, bearer};
pub use logging::logging;
pub use metrics::metrics;
pub use serialize::{file_xls, image_png, json};
