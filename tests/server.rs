use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use http::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use stoa::{Error, Metrics, Request, RequestError, Requester, Response, Server, detect_error_envelope, health};
use tokio::sync::oneshot;

#[derive(Debug, Deserialize)]
struct Created {
    name: String,
}

async fn create(req: Request) -> Result<Response, Error> {
    let body: Value = req.parse_body()?;
    Ok(Response::created(body))
}

async fn slow(_req: Request) -> Response {
    tokio::time::sleep(Duration::from_millis(400)).await;
    Response::ok(json!({"done": true}))
}

fn free_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

/// What the cleanup callback saw when it ran.
#[derive(Default)]
struct Cleanup {
    ran: AtomicBool,
    app_closed: AtomicBool,
    metrics_closed: AtomicBool,
}

struct Running {
    addr: String,
    base: String,
    metrics_base: String,
    metrics: Arc<Metrics>,
    cleanup: Arc<Cleanup>,
    stop: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<Result<(), stoa::ServerError>>,
}

async fn start() -> Running {
    let (addr, metrics_addr) = (free_addr(), free_addr());
    let metrics = Arc::new(Metrics::new().unwrap());
    let cleanup = Arc::new(Cleanup::default());
    let (stop, stopped) = oneshot::channel::<()>();

    let server = Server::bind(&addr)
        .metrics_addr(&metrics_addr)
        .shutdown_timeout(Duration::from_secs(5))
        .with_metrics(Arc::clone(&metrics))
        .handle(Method::POST, "/items", create)
        .handle(Method::GET, "/slow", slow);

    let seen = Arc::clone(&cleanup);
    let (app, metrics_listener) = (addr.clone(), metrics_addr.clone());
    let task = tokio::spawn(server.serve_with_shutdown(
        health::liveness,
        move || {
            seen.app_closed.store(refuses(&app), Ordering::SeqCst);
            seen.metrics_closed.store(refuses(&metrics_listener), Ordering::SeqCst);
            seen.ran.store(true, Ordering::SeqCst);
        },
        async move {
            let _ = stopped.await;
        },
    ));

    let running = Running {
        base: format!("http://{addr}"),
        metrics_base: format!("http://{metrics_addr}"),
        addr,
        metrics,
        cleanup,
        stop,
        task,
    };
    wait_until_up(&format!("{}/_/health", running.base)).await;
    running
}

/// `true` when nothing accepts connections on `addr` any more.
fn refuses(addr: &str) -> bool {
    std::net::TcpStream::connect(addr).is_err()
}

async fn get_json(url: &str) -> Result<Value, RequestError> {
    // A fresh client per call, so no pooled connection hides a closed listener.
    Requester::new()
        .fetch_json(Method::GET, url, &BTreeMap::new(), None, StatusCode::OK)
        .await
}

async fn wait_until_up(url: &str) {
    let client = Requester::new();
    for _ in 0..100 {
        let res = client.fetch(Method::GET, url, &BTreeMap::new(), None, StatusCode::OK).await;
        if res.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server at {url} never came up");
}

#[tokio::test]
async fn serves_routes_health_and_metrics() {
    let running = start().await;
    let client = Requester::new();
    let none = BTreeMap::new();

    // JSON body through the full chain.
    let created: Created = client
        .fetch_json(
            Method::POST,
            &format!("{}/items", running.base),
            &BTreeMap::from([("content-type".to_owned(), "application/json".to_owned())]),
            Some(&json!({"name": "lamp"})),
            StatusCode::CREATED,
        )
        .await
        .unwrap();
    assert_eq!(created.name, "lamp");

    // Unknown route: structured 404 that round-trips through envelope detection.
    let err = client
        .fetch(Method::GET, &format!("{}/nope", running.base), &none, None, StatusCode::OK)
        .await
        .unwrap_err();
    let RequestError::UnexpectedStatus { status, message, .. } = err else {
        panic!("expected a status error");
    };
    assert_eq!(status, StatusCode::NOT_FOUND);
    let envelope = detect_error_envelope(message.as_bytes()).expect("error envelope");
    assert_eq!(envelope.system(), "HTTP");
    assert_eq!(envelope.message(), "Route not found: /nope");

    // Metrics listener.
    let health: Value = client
        .fetch_json(Method::GET, &format!("{}/health", running.metrics_base), &none, None, StatusCode::OK)
        .await
        .unwrap();
    assert_eq!(health, json!({"status": "ok"}));

    let exposition = client
        .fetch(Method::GET, &format!("{}/metrics", running.metrics_base), &none, None, StatusCode::OK)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&exposition);
    assert!(text.contains(r#"http_handlers_duration_seconds_count{path="/items"} 1"#), "{text}");
    assert!(running.metrics.encode().unwrap().contains("/items"));

    running.stop.send(()).unwrap();
    running.task.await.unwrap().unwrap();
    assert!(running.cleanup.ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn drains_application_then_metrics_then_cleans_up() {
    let running = start().await;

    // In flight when shutdown starts.
    let slow_url = format!("{}/slow", running.base);
    let in_flight = tokio::spawn(async move { get_json(&slow_url).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    running.stop.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The application listener is closed and draining; the metrics listener still answers.
    assert!(refuses(&running.addr), "application listener still accepting");
    let health = get_json(&format!("{}/health", running.metrics_base)).await.unwrap();
    assert_eq!(health, json!({"status": "ok"}));
    assert!(!running.cleanup.ran.load(Ordering::SeqCst));
    assert!(!running.task.is_finished());

    running.task.await.unwrap().unwrap();

    assert_eq!(in_flight.await.unwrap().unwrap(), json!({"done": true}));
    assert!(running.cleanup.ran.load(Ordering::SeqCst));
    assert!(running.cleanup.app_closed.load(Ordering::SeqCst), "cleanup ran with the application listener open");
    assert!(running.cleanup.metrics_closed.load(Ordering::SeqCst), "cleanup ran with the metrics listener open");
}
