//! Endpoint and handler traits, and their type-erased forms.
//!
//! Two layers of the chain have different outputs:
//!
//! ```text
//! async fn list(req: Request) -> Result<Response, Error>   ← Endpoint (→ Reply)
//!        ↓ acl / bearer / logging                          ← still Endpoints
//!        ↓ json / image_png / file_xls                     ← Endpoint → Handler
//!        ↓ metrics                                          ← Handler → Handler
//! HttpResponse                                              ← what hyper writes
//! ```
//!
//! Wrappers box their inner layer once at registration (`Arc<dyn …>`). Per
//! request the cost is one Arc clone and one virtual call per layer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;

use crate::request::Request;
use crate::response::Reply;

/// The fully serialized response handed to hyper.
pub type HttpResponse = http::Response<Full<Bytes>>;

/// A heap-allocated, type-erased future. `Send + 'static` so tokio can move
/// it between worker threads.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

// ── Endpoint ──────────────────────────────────────────────────────────────────

#[doc(hidden)]
pub trait ErasedEndpoint {
    fn call(&self, req: Request) -> BoxFuture<Reply>;
}

#[doc(hidden)]
pub type BoxedEndpoint = Arc<dyn ErasedEndpoint + Send + Sync + 'static>;

/// Implemented for every function usable as an endpoint:
///
/// ```text
/// async fn name(req: Request) -> impl Into<Reply>
/// ```
///
/// `Response`, `Error` and `Result<Response, Error>` all qualify. Sealed: only
/// the blanket impl below satisfies it.
pub trait Endpoint: private::SealedEndpoint + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_endpoint(self) -> BoxedEndpoint;
}

// ── Handler ───────────────────────────────────────────────────────────────────

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<HttpResponse>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// A function that answers a request with a finished [`HttpResponse`].
///
/// Produced by the serialization wrappers; this is what the router stores.
pub trait Handler: private::SealedHandler + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait SealedEndpoint {}
    pub trait SealedHandler {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::SealedEndpoint for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Into<Reply> + Send + 'static,
{
}

impl<F, Fut, R> Endpoint for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Into<Reply> + Send + 'static,
{
    fn into_boxed_endpoint(self) -> BoxedEndpoint {
        Arc::new(FnEndpoint(self))
    }
}

impl<F, Fut> private::SealedHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

struct FnEndpoint<F>(F);

impl<F, Fut, R> ErasedEndpoint for FnEndpoint<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: Into<Reply> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Reply> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into() })
    }
}

struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<HttpResponse> {
        Box::pin((self.0)(req))
    }
}

/// Re-exposes an already boxed endpoint as an [`Endpoint`], so one endpoint
/// can be mounted behind several serializers.
pub(crate) fn shared(endpoint: &BoxedEndpoint) -> impl Endpoint + use<> {
    let endpoint = Arc::clone(endpoint);
    move |req: Request| endpoint.call(req)
}
