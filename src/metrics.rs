//! Prometheus metrics sink.
//!
//! ## Histograms
//! - `http_handlers_duration_seconds{path}` - handler latency per route
//!   pattern, serialization included.
//!
//! The registry is owned by [`Metrics`] rather than being process-global, so
//! two servers (or two tests) never share counters.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use prometheus::{Encoder, HistogramOpts, HistogramVec, Registry, TextEncoder};
use tracing::warn;

use crate::handler::{Handler, HttpResponse};
use crate::middleware::serialize::raw;
use crate::request::Request;
use crate::response::ContentType;

pub struct Metrics {
    registry: Registry,
    handler_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let handler_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_handlers_duration_seconds",
                "Handlers request duration in seconds",
            ),
            &["path"],
        )?;
        registry.register(Box::new(handler_duration.clone()))?;

        Ok(Self { registry, handler_duration })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Records one handler run for the route pattern `path`.
    pub fn observe(&self, path: &str, elapsed: Duration) {
        self.handler_duration
            .with_label_values(&[path])
            .observe(elapsed.as_secs_f64());
    }

    /// Encodes every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// `GET /metrics` handler.
pub(crate) fn exposition(metrics: Arc<Metrics>) -> impl Handler + use<> {
    move |_req: Request| {
        let encoded = metrics.encode();
        async move { render(encoded) }
    }
}

fn render(encoded: Result<String, prometheus::Error>) -> HttpResponse {
    match encoded {
        Ok(text) => raw(StatusCode::OK, ContentType::Prometheus, Bytes::from(text)),
        Err(e) => {
            warn!("metrics encoding failed: {e}");
            raw(StatusCode::INTERNAL_SERVER_ERROR, ContentType::Text, Bytes::from(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observations_show_up_per_path() {
        let metrics = Metrics::new().unwrap();
        metrics.observe("/items", Duration::from_millis(3));
        metrics.observe("/items", Duration::from_millis(5));
        metrics.observe("/items/{id}", Duration::from_millis(1));

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"http_handlers_duration_seconds_count{path="/items"} 2"#), "{text}");
        assert!(text.contains(r#"http_handlers_duration_seconds_count{path="/items/{id}"} 1"#), "{text}");
    }

    #[test]
    fn registries_are_isolated() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.observe("/only-a", Duration::from_millis(1));

        assert!(!b.encode().unwrap().contains("/only-a"));
    }
}
