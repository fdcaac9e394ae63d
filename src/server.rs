//! HTTP server and graceful shutdown.
//!
//! # Listeners
//!
//! A running server owns two listeners:
//!
//! | Listener | Default | Routes |
//! |---|---|---|
//! | application | [`Server::bind`] | everything registered with [`Server::handle`], plus `GET /_/health` and `GET /_/metrics` |
//! | metrics | `0.0.0.0:10101` | `GET /health`, `GET /metrics` |
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Stopping `accept()` on the application listener and draining its
//!    in-flight connections.
//! 2. Doing the same for the metrics listener, so health checks keep
//!    answering while the application drains.
//! 3. Running the cleanup callback passed to [`Server::serve`].
//!
//! Each drain is bounded by [`Server::shutdown_timeout`]. A drain that runs
//! over is aborted and logged; shutdown carries on regardless.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::handler::{BoxedEndpoint, Endpoint, shared};
use crate::metrics::{Metrics, exposition};
use crate::middleware::{json, logging, metrics};
use crate::router::Router;

const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:10101";
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Failures that keep the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// The HTTP server.
///
/// ```rust,no_run
/// use http::Method;
/// use stoa::{Request, Response, Server, health};
///
/// # async fn list(_: Request) -> Response { Response::ok(serde_json::json!([])) }
/// # async fn run() -> Result<(), stoa::ServerError> {
/// Server::bind("0.0.0.0:3000")
///     .handle(Method::GET, "/items", list)
///     .serve(health::liveness, || {})
///     .await
/// # }
/// ```
pub struct Server {
    addr: SocketAddr,
    metrics_addr: SocketAddr,
    shutdown_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
    routes: Vec<(Method, String, BoxedEndpoint)>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    pub fn bind(addr: &str) -> Self {
        Self {
            addr: parse_addr(addr),
            metrics_addr: parse_addr(DEFAULT_METRICS_ADDR),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            metrics: None,
            routes: Vec::new(),
        }
    }

    /// Address of the metrics listener. Defaults to `0.0.0.0:10101`.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    pub fn metrics_addr(mut self, addr: &str) -> Self {
        self.metrics_addr = parse_addr(addr);
        self
    }

    /// Upper bound on each listener's drain. Defaults to 30 s.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Records into `metrics` instead of a sink created at startup.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Registers `endpoint` for a method + path pair.
    ///
    /// The endpoint is mounted as `metrics(path, json(logging(endpoint)))`;
    /// wrap it in [`acl`](crate::middleware::acl) or
    /// [`bearer`](crate::middleware::bearer) first when it needs auth.
    ///
    /// Routes are validated when the server starts: an invalid or duplicate
    /// pattern panics in [`serve`](Server::serve).
    pub fn handle(mut self, method: Method, path: &str, endpoint: impl Endpoint) -> Self {
        self.routes.push((method, path.to_owned(), endpoint.into_boxed_endpoint()));
        self
    }

    /// Serves until SIGTERM or Ctrl-C, then shuts down in order and runs
    /// `cleanup`.
    ///
    /// `health` answers `GET /_/health` and the metrics listener's
    /// `GET /health`.
    pub async fn serve(
        self,
        health: impl Endpoint,
        cleanup: impl FnOnce() + Send,
    ) -> Result<(), ServerError> {
        self.serve_with_shutdown(health, cleanup, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but shuts down when `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        health: impl Endpoint,
        cleanup: impl FnOnce() + Send,
        signal: impl Future<Output = ()> + Send,
    ) -> Result<(), ServerError> {
        let sink = match &self.metrics {
            Some(sink) => Arc::clone(sink),
            None => Arc::new(Metrics::new()?),
        };
        let (app, ops) = self.routers(&sink, health.into_boxed_endpoint());

        let app_listener = listen(self.addr).await?;
        let ops_listener = listen(self.metrics_addr).await?;
        info!(addr = %self.addr, metrics_addr = %self.metrics_addr, "stoa listening");

        let (stop_app, app_stopped) = watch::channel(false);
        let (stop_ops, ops_stopped) = watch::channel(false);
        let mut app_task = tokio::spawn(accept_loop(app_listener, Arc::new(app), app_stopped));
        let mut ops_task = tokio::spawn(accept_loop(ops_listener, Arc::new(ops), ops_stopped));

        signal.await;
        info!("shutdown signal received");

        stop("application", &stop_app, &mut app_task, self.shutdown_timeout).await;
        stop("metrics", &stop_ops, &mut ops_task, self.shutdown_timeout).await;

        debug!("running cleanup");
        cleanup();

        info!("stoa stopped");
        Ok(())
    }

    /// Composes the application and metrics routers.
    fn routers(&self, sink: &Arc<Metrics>, health: BoxedEndpoint) -> (Router, Router) {
        let mut app = Router::new()
            .on(Method::GET, "/_/health", json(shared(&health)))
            .on(Method::GET, "/_/metrics", exposition(Arc::clone(sink)));

        for (method, path, endpoint) in &self.routes {
            let chain = metrics(Arc::clone(sink), path, json(logging(shared(endpoint))));
            app = app.on(method.clone(), path, chain);
        }

        let ops = Router::new()
            .on(Method::GET, "/health", json(shared(&health)))
            .on(Method::GET, "/metrics", exposition(Arc::clone(sink)));

        (app, ops)
    }
}

fn parse_addr(addr: &str) -> SocketAddr {
    addr.parse()
        .unwrap_or_else(|e| panic!("invalid socket address `{addr}`: {e}"))
}

async fn listen(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Accepts connections on `listener` until `stop` flips to `true`, then
/// closes the listener and waits for every open connection to finish.
async fn accept_loop(listener: TcpListener, router: Arc<Router>, stop: watch::Receiver<bool>) {
    // JoinSet tracks every spawned connection task so the drain can wait
    // for them all.
    let mut tasks = JoinSet::new();
    let mut stop_accepting = stop.clone();

    loop {
        tokio::select! {
            // Shutdown is checked first so a stop request wins over queued
            // connections.
            biased;

            () = stopped(&mut stop_accepting) => break,

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let router = Arc::clone(&router);
                let mut stop = stop.clone();
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    // Called once per request on the connection.
                    let svc = service_fn(move |req: http::Request<hyper::body::Incoming>| {
                        let router = Arc::clone(&router);
                        async move { Ok::<_, Infallible>(router.dispatch(req).await) }
                    });

                    let builder = ConnBuilder::new(TokioExecutor::new());
                    let conn = builder.serve_connection(io, svc);
                    tokio::pin!(conn);

                    let res = tokio::select! {
                        res = conn.as_mut() => res,
                        () = stopped(&mut stop) => {
                            // Finish the request in flight, refuse the next.
                            conn.as_mut().graceful_shutdown();
                            conn.await
                        }
                    };
                    if let Err(e) = res {
                        error!(peer = %peer, "connection error: {e}");
                    }
                });
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound on long-running servers.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(listener);
    debug!(in_flight = tasks.len(), "listener closed, draining connections");
    while tasks.join_next().await.is_some() {}
}

/// Resolves once the stop flag is set. A dropped sender counts as set.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// Flips the stop flag for one listener and waits up to `grace` for its
/// drain. On timeout the accept loop is aborted, which drops its open
/// connections.
async fn stop(
    name: &str,
    flag: &watch::Sender<bool>,
    task: &mut JoinHandle<()>,
    grace: Duration,
) {
    debug!(listener = name, "stopping listener");
    flag.send_replace(true);

    match tokio::time::timeout(grace, &mut *task).await {
        Ok(Ok(())) => debug!(listener = name, "listener drained"),
        Ok(Err(e)) => warn!(listener = name, "listener task failed: {e}"),
        Err(_) => {
            warn!(listener = name, timeout = ?grace, "drain timed out, dropping open connections");
            task.abort();
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available. A handler that cannot be installed
/// is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves, so on non-Unix platforms the SIGTERM arm
    // is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::handler::HttpResponse;
    use crate::health::liveness;
    use crate::middleware::acl;
    use crate::request::Request;
    use crate::response::Response;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::{BodyExt, Full};
    use serde_json::{Value, json as js};

    async fn items(req: Request) -> Result<Response, Error> {
        let params = req.list_params()?;
        Ok(Response::ok(js!({ "page": params.pagination.page })))
    }

    fn server() -> Server {
        Server::bind("127.0.0.1:0")
            .handle(Method::GET, "/items", items)
            .handle(Method::GET, "/me", acl(items))
    }

    fn request(uri: &str, auth: Option<&str>) -> http::Request<Full<Bytes>> {
        let mut builder = http::Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    async fn body(res: HttpResponse) -> Bytes {
        res.into_body().collect().await.unwrap().to_bytes()
    }

    fn routers() -> (Arc<Metrics>, Router, Router) {
        let sink = Arc::new(Metrics::new().unwrap());
        let (app, ops) = server().routers(&sink, liveness.into_boxed_endpoint());
        (sink, app, ops)
    }

    #[tokio::test]
    async fn registered_route_goes_through_the_chain() {
        let (sink, app, _) = routers();

        let res = app.dispatch(request("/items?p=3", None)).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["content-type"], "application/json; charset=UTF-8");
        assert_eq!(serde_json::from_slice::<Value>(&body(res).await).unwrap(), js!({"page": 3}));

        let text = sink.encode().unwrap();
        assert!(text.contains(r#"http_handlers_duration_seconds_count{path="/items"} 1"#), "{text}");
    }

    #[tokio::test]
    async fn first_and_last_together_conflict() {
        let (_, app, _) = routers();

        let res = app.dispatch(request("/items?first=10&last=5", None)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let err: Value = serde_json::from_slice(&body(res).await).unwrap();
        assert_eq!(err["code"], "REQUEST.400103");
    }

    #[tokio::test]
    async fn empty_bearer_token_is_rejected() {
        let (_, app, _) = routers();

        let res = app.dispatch(request("/me", Some("Bearer "))).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let err: Value = serde_json::from_slice(&body(res).await).unwrap();
        assert!(err["code"].as_str().unwrap().ends_with("10"), "{err}");
    }

    #[tokio::test]
    async fn unknown_route_is_a_structured_404() {
        let (_, app, _) = routers();

        let res = app.dispatch(request("/missing", None)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let err: Value = serde_json::from_slice(&body(res).await).unwrap();
        assert_eq!(err["system"], "HTTP");
        assert_eq!(err["message"], "Route not found: /missing");
    }

    #[tokio::test]
    async fn health_and_metrics_on_both_listeners() {
        let (_, app, ops) = routers();

        for (router, health, metrics) in [(&app, "/_/health", "/_/metrics"), (&ops, "/health", "/metrics")] {
            let res = router.dispatch(request(health, None)).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(body(res).await, r#"{"status":"ok"}"#);

            let res = router.dispatch(request(metrics, None)).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(res.headers()["content-type"], "text/plain; version=0.0.4; charset=utf-8");
        }

        // Application routes stay off the metrics listener.
        let res = ops.dispatch(request("/items", None)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    #[should_panic(expected = "invalid socket address")]
    fn bad_bind_address_panics() {
        let _ = Server::bind("not an address");
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let err = Server::bind(&addr)
            .metrics_addr("127.0.0.1:0")
            .serve_with_shutdown(liveness, || {}, async {})
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }), "{err}");
    }
}
