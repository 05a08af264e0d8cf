//! Checkout scenarios: idempotent order creation, stock, carts and coupons.

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

#[tokio::test]
async fn repeated_idempotency_key_returns_the_first_order() {
    let h = harness();
    let product = seed_product(&h.service, 1_000_000, 5).await;

    let (status, first) = call(&h.router, order_request(product.id, 2, Some("key-1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["created"], true);
    assert_eq!(first["order"]["total"], 2_150_000);
    assert_eq!(first["order"]["status"], "PENDING");

    let (status, second) = call(&h.router, order_request(product.id, 2, Some("key-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["created"], false);
    assert_eq!(second["order"]["id"], first["order"]["id"]);

    assert_eq!(stock_of(&h.router, product.id).await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_with_one_key_create_one_order() {
    let h = harness();
    let product = seed_product(&h.service, 500_000, 20).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let router = h.router.clone();
        let id = product.id;
        tasks.push(tokio::spawn(async move { call(&router, order_request(id, 1, Some("same-key"))).await }));
    }
    let mut ids = Vec::new();
    let mut created = 0;
    for t in tasks {
        let (status, body) = t.await.unwrap();
        assert!(status == StatusCode::CREATED || status == StatusCode::OK, "{status}: {body}");
        if body["created"] == true {
            created += 1;
        }
        ids.push(body["order"]["id"].clone());
    }
    assert_eq!(created, 1);
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(stock_of(&h.router, product.id).await, 19);
}

#[tokio::test]
async fn idempotency_key_from_another_customer_conflicts() {
    let h = harness();
    let product = seed_product(&h.service, 100_000, 5).await;
    call(&h.router, order_request(product.id, 1, Some("shared"))).await;

    let mut req = json_request(
        "POST",
        "/api/orders",
        json!({ "customer_email": "eve@example.com", "items": [{ "product_id": product.id, "quantity": 1 }] }),
    );
    req.headers_mut().insert("idempotency-key", "shared".parse().unwrap());
    let (status, body) = call(&h.router, req).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");
    assert_eq!(stock_of(&h.router, product.id).await, 4);
}

#[tokio::test]
async fn order_rejections_leave_stock_alone() {
    let h = harness();
    let product = seed_product(&h.service, 100_000, 2).await;

    let (status, body) = call(&h.router, order_request(product.id, 3, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "insufficient_stock");

    let (status, _) = call(&h.router, order_request(product.id, 101, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&h.router, order_request(uuid::Uuid::now_v7(), 1, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "product_unavailable");

    let (status, _) = call(
        &h.router,
        json_request("POST", "/api/orders", json!({ "customer_email": "not-an-email", "items": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(stock_of(&h.router, product.id).await, 2);
}

#[tokio::test]
async fn checkout_from_cart_prices_on_the_server_and_clears_the_cart() {
    let h = harness();
    let a = seed_product(&h.service, 2_000_000, 5).await;
    let b = seed_product(&h.service, 500_000, 5).await;

    for (id, qty) in [(a.id, 2), (b.id, 1), (a.id, 1)] {
        let (status, _) = call(&h.router, json_request("POST", "/api/cart/sess-1", json!({ "product_id": id, "quantity": qty }))).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (_, cart) = call(&h.router, get("/api/cart/sess-1")).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 2);
    assert_eq!(cart["subtotal"]["amount"], 6_500_000);

    let (status, body) = call(
        &h.router,
        json_request("POST", "/api/orders", json!({ "customer_email": "ada@example.com", "cart_session": "sess-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["order"]["subtotal"], 6_500_000);
    // Above the free-shipping threshold.
    assert_eq!(body["order"]["shipping"], 0);
    assert_eq!(body["order"]["total"], 6_500_000);

    let (_, cart) = call(&h.router, get("/api/cart/sess-1")).await;
    assert!(cart["items"].as_array().unwrap().is_empty());
    assert_eq!(stock_of(&h.router, a.id).await, 2);
}

#[tokio::test]
async fn cart_line_cannot_grow_past_the_quantity_cap() {
    let h = harness();
    let product = seed_product(&h.service, 100_000, 500).await;
    let add = |qty: i64| json_request("POST", "/api/cart/sess-cap", json!({ "product_id": product.id, "quantity": qty }));

    let (status, _) = call(&h.router, add(60)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = call(&h.router, add(60)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["code"], "invalid_request");
    let (status, _) = call(&h.router, add(40)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, cart) = call(&h.router, get("/api/cart/sess-cap")).await;
    assert_eq!(cart["items"][0]["quantity"], 100);
}

#[tokio::test]
async fn coupon_is_validated_applied_and_counted_once_paid() {
    let h = harness();
    let product = seed_product(&h.service, 1_000_000, 5).await;

    let (status, _) = call(
        &h.router,
        admin_request("POST", "/api/admin/coupons", json!({ "code": "save10", "kind": "PERCENTAGE", "value": 10, "max_discount": 50_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, quote) = call(&h.router, json_request("POST", "/api/coupons/validate", json!({ "code": "Save10", "subtotal": 1_000_000 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["discount"], 50_000);
    assert_eq!(quote["total_after_discount"], 950_000);

    let (status, body) = call(
        &h.router,
        json_request(
            "POST",
            "/api/orders",
            json!({
                "customer_email": "ada@example.com",
                "items": [{ "product_id": product.id, "quantity": 1 }],
                "coupon_code": "save10"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["order"]["discount"], 50_000);
    assert_eq!(body["order"]["total"], 1_100_000);
    let order_id: uuid::Uuid = body["order"]["id"].as_str().unwrap().parse().unwrap();

    let (_, init) = call(&h.router, json_request("POST", "/api/payments/initialize", json!({ "order_id": order_id }))).await;
    let reference = init["reference"].as_str().unwrap().to_string();
    let payload = charge_event("charge.success", &reference, "success", 1_100_000, order_id);
    for _ in 0..2 {
        let (status, _) = call(&h.router, webhook_request(&h.config.paystack_secret_key, &payload)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, coupons) = call(&h.router, admin_request("GET", "/api/admin/coupons", json!(null))).await;
    assert_eq!(coupons[0]["usage_count"], 1);

    let (status, _) = call(&h.router, admin_request("POST", "/api/admin/coupons/SAVE10/deactivate", json!(null))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&h.router, json_request("POST", "/api/coupons/validate", json!({ "code": "SAVE10", "subtotal": 1_000_000 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "coupon_rejected");

    let (status, body) = call(&h.router, json_request("POST", "/api/coupons/validate", json!({ "code": "NOPE", "subtotal": 1_000 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "coupon_not_found");
}
