//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Every stored value is a
//! finished [`Handler`], so the router never sees a [`Reply`](crate::Reply).

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use matchit::Router as MatchitRouter;
use tracing::warn;

use crate::error::{Error, HTTP};
use crate::handler::{BoxedHandler, Handler, HttpResponse};
use crate::middleware::json;
use crate::middleware::serialize::raw;
use crate::request::Request;
use crate::response::ContentType;

/// Method + path table with a fallback for everything unmatched.
///
/// Build it once at startup; [`Router::on`] returns `self` so registrations
/// chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    fallback: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            fallback: json(not_found).into_boxed_handler(),
        }
    }

    /// Registers a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid pattern or collides with one already
    /// registered for `method`.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Replaces the handler used when no route matches.
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.fallback = handler.into_boxed_handler();
        self
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Buffers the body, routes, and runs the matching handler.
    ///
    /// A body that cannot be read answers `400` without reaching a handler.
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> HttpResponse
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(path = parts.uri.path(), "failed to read request body: {e}");
                return raw(StatusCode::BAD_REQUEST, ContentType::Text, Bytes::from(e.to_string()));
            }
        };

        match self.lookup(&parts.method, parts.uri.path()) {
            Some((handler, params)) => handler.call(Request::new(parts, body, params)).await,
            None => self.fallback.call(Request::new(parts, body, HashMap::new())).await,
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

async fn not_found(req: Request) -> Error {
    HTTP.not_found(0, &[format!("Route not found: {}", req.path()).as_str()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Response;
    use http_body_util::Full;
    use serde_json::{Value, json as js};

    async fn user(req: Request) -> Response {
        Response::ok(js!({ "id": req.param("id") }))
    }

    async fn body_json(res: HttpResponse) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> http::Request<Full<Bytes>> {
        http::Request::builder().uri(uri).body(Full::new(Bytes::new())).unwrap()
    }

    #[tokio::test]
    async fn routes_with_path_params() {
        let router = Router::new().on(Method::GET, "/users/{id}", json(user));

        let res = router.dispatch(get("/users/42")).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, js!({"id": "42"}));
    }

    #[tokio::test]
    async fn method_mismatch_falls_through() {
        let router = Router::new().on(Method::POST, "/users/{id}", json(user));

        let res = router.dispatch(get("/users/42")).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_is_a_structured_404() {
        let res = Router::new().dispatch(get("/nope")).await;

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = body_json(res).await;
        assert_eq!(body["system"], "HTTP");
        assert_eq!(body["code"], "HTTP.4044040");
        assert_eq!(body["message"], "Route not found: /nope");
    }

    #[tokio::test]
    async fn custom_fallback() {
        async fn teapot(_req: Request) -> Response {
            Response::new(StatusCode::IM_A_TEAPOT, Value::Null, Default::default())
        }
        let res = Router::new().fallback(json(teapot)).dispatch(get("/x")).await;
        assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
    }

    #[test]
    #[should_panic(expected = "invalid route `/users/{id}`")]
    fn conflicting_routes_panic() {
        let _ = Router::new()
            .on(Method::GET, "/users/{id}", json(user))
            .on(Method::GET, "/users/{id}", json(user));
    }
}
