//! Minimal stoa service: a paginated list behind ACL, a form-accepting
//! create, and a redirect.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl 'http://localhost:3000/items?ipp=2&sort=-name'
//!   curl 'http://localhost:3000/items?first=10&last=5'
//!   curl -X POST http://localhost:3000/items \
//!        -H 'content-type: application/x-www-form-urlencoded' \
//!        -d 'name=lamp'
//!   curl -i http://localhost:3000/docs
//!   curl http://localhost:3000/_/health
//!   curl http://localhost:10101/metrics

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use stoa::middleware::acl;
use stoa::{Error, ListResponse, REQUEST, Request, Response, Server, health};

#[derive(Clone, Serialize, Deserialize)]
struct Item {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), stoa::ServerError> {
    tracing_subscriber::fmt::init();

    Server::bind("0.0.0.0:3000")
        .handle(Method::GET, "/items", acl(list_items))
        .handle(Method::POST, "/items", create_item)
        .handle(Method::GET, "/docs", docs)
        .serve(health::liveness, || tracing::info!("bye"))
        .await
}

// GET /items
//
// Needs `Authorization: Bearer <jwt>` whose `aud` has at least three
// `/`-separated segments.
async fn list_items(req: Request) -> Result<Response, Error> {
    let params = req.list_params()?;
    let ctx = req.context();
    tracing::info!(user = ?ctx.user_id, brand = ?ctx.brand, "listing items");

    let all = ["desk", "lamp", "shelf"].map(|name| Item { name: name.to_owned() });
    let ipp = params.pagination.items_per_page as usize;
    let skip = (params.pagination.page as usize - 1) * ipp;
    let items: Vec<Item> = all.iter().skip(skip).take(ipp).cloned().collect();

    let page = ListResponse::new(params.pagination, all.len() as u64, items);
    let body = serde_json::to_value(page)
        .map_err(|e| REQUEST.internal_server_error(1, &["encoding failed", e.to_string().as_str()]))?;
    Ok(Response::ok(body))
}

// POST /items, JSON or form body.
async fn create_item(req: Request) -> Result<Response, Error> {
    let item: Item = req.parse_body()?;
    let mut res = Response::created(serde_json::json!({ "name": item.name }));
    res.set_header("location", format!("/items/{}", item.name));
    Ok(res)
}

// GET /docs → 302 to the API reference.
async fn docs(_req: Request) -> Response {
    Response::redirect(StatusCode::FOUND, "https://example.com/api")
}
