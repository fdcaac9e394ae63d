//! Latency histogram wrapper.

use std::sync::Arc;
use std::time::Instant;

use crate::handler::Handler;
use crate::metrics::Metrics;
use crate::request::Request;

/// Times `handler`, serialization included, and records the result under the
/// route pattern `path` (not the concrete URL, to keep label cardinality flat).
pub fn metrics<H: Handler>(sink: Arc<Metrics>, path: &str, handler: H) -> impl Handler + use<H> {
    let inner = handler.into_boxed_handler();
    let path: Arc<str> = Arc::from(path);
    move |req: Request| {
        let inner = Arc::clone(&inner);
        let sink = Arc::clone(&sink);
        let path = Arc::clone(&path);
        async move {
            let start = Instant::now();
            let res = inner.call(req).await;
            sink.observe(&path, start.elapsed());
            res
        }
    }
}
