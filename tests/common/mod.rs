//! Shared harness for the in-process scenario tests.
//!
//! Each test builds the router over a fresh `MemoryStore` and a scripted
//! gateway, then drives it with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot
use uuid::Uuid;

use trendify_commerce::config::Config;
use trendify_commerce::domain::aggregates::{GatewayOutcome, GatewayStatus, Product, ProductDraft, ProductStatus};
use trendify_commerce::gateway::signature::{sign_payload, SIGNATURE_HEADER};
use trendify_commerce::gateway::{GatewayError, InitializeRequest, InitializedTransaction, PaymentGateway};
use trendify_commerce::http::{build_router, AppState};
use trendify_commerce::service::{CommerceService, EventPublisher};
use trendify_commerce::store::MemoryStore;

pub const ADMIN: &str = "Bearer admin-token";

/// Gateway double: records initializations and answers verify from a script.
#[derive(Default)]
pub struct FakeGateway {
    pub initialized: Mutex<Vec<InitializeRequest>>,
    verified: Mutex<Vec<String>>,
    outcomes: Mutex<HashMap<String, GatewayOutcome>>,
    unreachable: Mutex<HashSet<String>>,
}

impl FakeGateway {
    pub fn script(&self, outcome: GatewayOutcome) {
        self.outcomes.lock().unwrap().insert(outcome.reference.clone(), outcome);
    }

    /// Verify for `reference` fails as if the gateway were down.
    pub fn fail(&self, reference: &str) {
        self.unreachable.lock().unwrap().insert(reference.to_string());
    }

    pub fn verify_calls(&self) -> usize {
        self.verified.lock().unwrap().len()
    }

    pub fn last_reference(&self) -> String {
        self.initialized.lock().unwrap().last().expect("no initialization recorded").reference.clone()
    }
}

#[async_trait::async_trait]
impl PaymentGateway for FakeGateway {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn initialize(&self, req: InitializeRequest) -> Result<InitializedTransaction, GatewayError> {
        let tx = InitializedTransaction {
            authorization_url: format!("https://checkout.test/{}", req.reference),
            access_code: format!("ac_{}", req.reference),
            reference: req.reference.clone(),
        };
        self.initialized.lock().unwrap().push(req);
        Ok(tx)
    }

    async fn verify(&self, reference: &str) -> Result<GatewayOutcome, GatewayError> {
        self.verified.lock().unwrap().push(reference.to_string());
        if self.unreachable.lock().unwrap().contains(reference) {
            return Err(GatewayError::Transport("connection refused".into()));
        }
        self.outcomes
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownReference(reference.to_string()))
    }
}

pub struct Harness {
    pub router: axum::Router,
    pub service: Arc<CommerceService>,
    pub gateway: Arc<FakeGateway>,
    pub config: Arc<Config>,
}

pub fn harness() -> Harness {
    harness_with(Config::for_tests())
}

pub fn harness_with(config: Config) -> Harness {
    let config = Arc::new(config);
    let gateway = Arc::new(FakeGateway::default());
    let service = Arc::new(CommerceService::new(
        Arc::new(MemoryStore::new()),
        gateway.clone(),
        EventPublisher::disabled(),
        Arc::clone(&config),
    ));
    let router = build_router(AppState::new(Arc::clone(&service), Arc::clone(&config)));
    Harness { router, service, gateway, config }
}

/// Drive the router with a single request and return (status, json body).
pub async fn call(router: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp.into_body().collect().await.expect("body collect failed").to_bytes();
    let json = if body.is_empty() { Value::Null } else { serde_json::from_slice(&body).expect("body is not valid JSON") };
    (status, json)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn admin_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    let mut req = json_request(method, uri, body);
    req.headers_mut().insert("authorization", ADMIN.parse().unwrap());
    req
}

/// Marks `req` as arriving over a TCP connection from `peer`, as
/// `into_make_service_with_connect_info` does in the server.
pub fn from_peer(mut req: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = format!("{peer}:40000").parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

pub fn order_request(product_id: Uuid, quantity: i64, key: Option<&str>) -> Request<Body> {
    let mut req = json_request(
        "POST",
        "/api/orders",
        json!({
            "customer_email": "ada@example.com",
            "items": [{ "product_id": product_id, "quantity": quantity }],
            "shipping_address": { "city": "Lagos" }
        }),
    );
    if let Some(key) = key {
        req.headers_mut().insert("idempotency-key", key.parse().unwrap());
    }
    req
}

pub fn webhook_request(secret: &str, payload: &Value) -> Request<Body> {
    let body = payload.to_string();
    Request::builder()
        .method("POST")
        .uri("/api/webhooks/paystack")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, sign_payload(secret, body.as_bytes()))
        .body(Body::from(body))
        .unwrap()
}

pub fn charge_event(event: &str, reference: &str, status: &str, amount: i64, order_id: Uuid) -> Value {
    json!({
        "event": event,
        "data": {
            "reference": reference,
            "status": status,
            "amount": amount,
            "currency": "NGN",
            "channel": "card",
            "gateway_response": "Approved",
            "paid_at": "2024-05-01T10:00:00.000Z",
            "metadata": { "order_id": order_id.to_string() }
        }
    })
}

pub fn outcome(reference: &str, raw_status: &str, amount: i64) -> GatewayOutcome {
    GatewayOutcome {
        reference: reference.to_string(),
        status: GatewayStatus::parse(raw_status),
        raw_status: raw_status.to_string(),
        amount,
        currency: "NGN".into(),
        channel: Some("card".into()),
        gateway_response: Some("Approved".into()),
        paid_at: None,
        order_id: None,
    }
}

pub async fn seed_product(service: &CommerceService, price: i64, stock: i32) -> Product {
    service
        .create_product(ProductDraft {
            name: "Ankara Shirt".into(),
            price,
            stock,
            status: ProductStatus::Active,
            ..Default::default()
        })
        .await
        .expect("seed product")
}

pub async fn stock_of(router: &axum::Router, product_id: Uuid) -> i64 {
    let (_, body) = call(router, get(&format!("/api/products/{product_id}"))).await;
    body["stock"].as_i64().expect("stock field")
}

/// Places an order and starts a payment; returns (order id, reference, total).
pub async fn place_and_initialize(h: &Harness, product_id: Uuid, quantity: i64) -> (Uuid, String, i64) {
    let (status, body) = call(&h.router, order_request(product_id, quantity, None)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let order_id: Uuid = body["order"]["id"].as_str().unwrap().parse().unwrap();
    let total = body["order"]["total"].as_i64().unwrap();
    let (status, body) = call(&h.router, json_request("POST", "/api/payments/initialize", json!({ "order_id": order_id }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    (order_id, body["reference"].as_str().unwrap().to_string(), total)
}

pub async fn order_json(router: &axum::Router, order_id: Uuid) -> Value {
    let (status, body) = call(router, get(&format!("/api/orders/{order_id}"))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

pub fn event_count(detail: &Value, kind: &str) -> usize {
    detail["events"].as_array().map_or(0, |events| events.iter().filter(|e| e["kind"] == kind).count())
}
