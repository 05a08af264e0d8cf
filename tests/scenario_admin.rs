//! Admin guard, fulfilment, returns, rate limiting and the mobile mirror.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use serde_json::json;
use trendify_commerce::config::Config;

#[tokio::test]
async fn health_reports_the_store_backend() {
    let h = harness();
    let (status, body) = call(&h.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn admin_routes_require_the_bearer_token() {
    let h = harness();
    let product = json!({ "name": "Adire Scarf", "price": 450_000, "stock": 4 });

    let (status, body) = call(&h.router, json_request("POST", "/api/products", product.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let mut wrong = json_request("POST", "/api/products", product.clone());
    wrong.headers_mut().insert("authorization", "Bearer guess".parse().unwrap());
    let (status, body) = call(&h.router, wrong).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, body) = call(&h.router, admin_request("POST", "/api/products", product)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "ACTIVE");
    assert!(body["sku"].as_str().unwrap().starts_with("TRD-"));

    let (status, _) = call(&h.router, get("/api/admin/orders")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn catalog_management_round() {
    let h = harness();
    let (status, category) = call(&h.router, admin_request("POST", "/api/categories", json!({ "name": "Men Shoes" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(category["slug"], "men-shoes");

    let (_, product) = call(
        &h.router,
        admin_request("POST", "/api/products", json!({ "name": "Loafer", "price": 900_000, "stock": 2, "category_id": category["id"] })),
    )
    .await;
    let id = product["id"].as_str().unwrap().to_string();

    let (status, adjusted) = call(&h.router, admin_request("POST", &format!("/api/products/{id}/stock"), json!({ "delta": 3 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(adjusted["stock"], 5);
    let (status, body) = call(&h.router, admin_request("POST", &format!("/api/products/{id}/stock"), json!({ "delta": -9 }))).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (_, page) = call(&h.router, get(&format!("/api/products?category={}&search=loaf", category["id"].as_str().unwrap()))).await;
    assert_eq!(page["total"], 1);

    let (status, _) = call(&h.router, admin_request("DELETE", &format!("/api/products/{id}"), json!(null))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&h.router, get(&format!("/api/products/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn fulfilment_and_return_flow() {
    let h = harness();
    let product = seed_product(&h.service, 1_000_000, 3).await;
    let (order_id, reference, total) = place_and_initialize(&h, product.id, 1).await;
    let status_uri = format!("/api/admin/orders/{order_id}/status");

    let (status, body) = call(&h.router, admin_request("POST", &status_uri, json!({ "status": "SHIPPED" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");

    let payload = charge_event("charge.success", &reference, "success", total, order_id);
    call(&h.router, webhook_request(&h.config.paystack_secret_key, &payload)).await;

    for next in ["SHIPPED", "DELIVERED"] {
        let (status, body) = call(&h.router, admin_request("POST", &status_uri, json!({ "status": next }))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["order"]["status"], next);
    }

    let return_uri = format!("/api/orders/{order_id}/return");
    let (status, _) = call(&h.router, json_request("POST", &return_uri, json!({ "reason": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = call(&h.router, json_request("POST", &return_uri, json!({ "reason": "wrong size" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "RETURN_REQUESTED");

    let (status, body) = call(&h.router, admin_request("POST", &format!("/api/admin/orders/{order_id}/return"), json!({ "approve": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "RETURNED");
    assert_eq!(body["order"]["payment_status"], "REFUNDED");
    assert_eq!(stock_of(&h.router, product.id).await, 3);

    let (_, page) = call(&h.router, get("/api/orders?email=ADA@example.com")).await;
    assert_eq!(page["total"], 1);
    let (status, _) = call(&h.router, get("/api/orders")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, page) = call(&h.router, admin_request("GET", "/api/admin/orders?status=RETURNED", json!(null))).await;
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn checkout_is_rate_limited_per_client() {
    let h = harness_with(Config { rate_limit_per_minute: 2, ..Config::for_tests() });
    let product = seed_product(&h.service, 100_000, 10).await;

    for _ in 0..2 {
        let (status, _) = call(&h.router, from_peer(order_request(product.id, 1, None), "203.0.113.1")).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let resp = tower::ServiceExt::oneshot(h.router.clone(), from_peer(order_request(product.id, 1, None), "203.0.113.1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry: u64 = resp.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry));

    let (status, _) = call(&h.router, from_peer(order_request(product.id, 1, None), "203.0.113.2")).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_escape_the_limit() {
    let h = harness_with(Config { rate_limit_per_minute: 2, ..Config::for_tests() });
    let product = seed_product(&h.service, 100_000, 20).await;

    let mut statuses = vec![];
    for n in 0..6 {
        let mut req = from_peer(order_request(product.id, 1, None), "203.0.113.9");
        req.headers_mut().insert("x-forwarded-for", format!("198.51.100.{n}").parse().unwrap());
        let (status, _) = call(&h.router, req).await;
        statuses.push(status);
    }
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 2, "{statuses:?}");
    assert!(statuses[2..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn trusted_proxy_limits_by_the_forwarded_client() {
    let proxy = "10.0.0.2".parse().unwrap();
    let h = harness_with(Config { rate_limit_per_minute: 1, trusted_proxies: vec![proxy], ..Config::for_tests() });
    let product = seed_product(&h.service, 100_000, 20).await;

    let via_proxy = |client: &str| {
        let mut req = from_peer(order_request(product.id, 1, None), "10.0.0.2");
        // The leftmost hop is whatever the client claims; only the proxy's own entry counts.
        req.headers_mut().insert("x-forwarded-for", format!("6.6.6.6, {client}").parse().unwrap());
        req
    };
    let (status, _) = call(&h.router, via_proxy("198.51.100.1")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = call(&h.router, via_proxy("198.51.100.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "rate_limited");
    let (status, _) = call(&h.router, via_proxy("198.51.100.2")).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn mobile_mirror_serves_the_same_api_with_cors() {
    let h = harness();
    let product = seed_product(&h.service, 100_000, 10).await;

    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/mobile/products/{}", product.id))
        .header("origin", "capacitor://localhost")
        .body(Body::empty())
        .unwrap();
    let resp = tower::ServiceExt::oneshot(h.router.clone(), req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");

    let (status, body) = call(&h.router, {
        let mut req = order_request(product.id, 1, None);
        *req.uri_mut() = "/api/mobile/orders".parse().unwrap();
        req
    })
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
}

#[tokio::test]
async fn driver_roster_and_delivery_trail() {
    let h = harness();
    let product = seed_product(&h.service, 500_000, 5).await;
    let (order_id, reference, total) = place_and_initialize(&h, product.id, 1).await;

    let (status, driver) = call(
        &h.router,
        admin_request("POST", "/api/admin/drivers", json!({ "name": "Tunde", "phone": "+234 803-555-0101", "vehicle": "Bike" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{driver}");
    assert_eq!(driver["phone"], "+2348035550101");
    assert_eq!(driver["is_active"], true);
    let driver_id = driver["id"].as_str().unwrap().to_string();

    let (status, body) = call(&h.router, admin_request("POST", "/api/admin/drivers", json!({ "name": "Twin", "phone": "+2348035550101" }))).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    let (status, _) = call(&h.router, get("/api/admin/drivers")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let assign_uri = format!("/api/admin/orders/{order_id}/driver");
    let delivery_uri = format!("/api/admin/orders/{order_id}/delivery");
    let (status, body) = call(&h.router, admin_request("POST", &assign_uri, json!({ "driver_id": driver_id }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "not_dispatchable");

    let payload = charge_event("charge.success", &reference, "success", total, order_id);
    call(&h.router, webhook_request(&h.config.paystack_secret_key, &payload)).await;

    let (status, body) = call(&h.router, admin_request("POST", &delivery_uri, json!({ "stage": "PICKED_UP" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "no_driver");

    let (status, body) = call(&h.router, admin_request("POST", &assign_uri, json!({ "driver_id": driver_id }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["order"]["driver_id"], driver_id.as_str());

    let (status, body) = call(&h.router, admin_request("POST", &delivery_uri, json!({ "stage": "OUT_FOR_DELIVERY", "note": " gate 3 " }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, _) = call(&h.router, admin_request("POST", &delivery_uri, json!({ "stage": "TELEPORTED" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let detail = order_json(&h.router, order_id).await;
    assert_eq!(event_count(&detail, "driver_assigned"), 1);
    assert_eq!(event_count(&detail, "delivery_updated"), 1);

    let (status, body) = call(&h.router, admin_request("DELETE", &format!("/api/admin/drivers/{driver_id}"), json!(null))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);
    let (status, roster) = call(&h.router, admin_request("GET", "/api/admin/drivers", json!(null))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(roster.as_array().unwrap().len(), 1);

    let (_, other) = call(&h.router, admin_request("POST", "/api/admin/drivers", json!({ "name": "Bisi", "phone": "08035550202" }))).await;
    let (status, body) = call(
        &h.router,
        admin_request("PUT", &format!("/api/admin/drivers/{}", other["id"].as_str().unwrap()), json!({ "name": "Bisi", "phone": "08035550202", "is_active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, body) = call(&h.router, admin_request("POST", &assign_uri, json!({ "driver_id": other["id"] }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "driver_inactive");
}

#[tokio::test]
async fn reviews_require_a_delivered_order() {
    let h = harness();
    let product = seed_product(&h.service, 500_000, 5).await;
    let (order_id, reference, total) = place_and_initialize(&h, product.id, 1).await;
    let reviews_uri = format!("/api/products/{}/reviews", product.id);
    let review = |rating: i64, email: &str| json!({ "order_id": order_id, "customer_email": email, "rating": rating, "title": "Fits well" });

    let payload = charge_event("charge.success", &reference, "success", total, order_id);
    call(&h.router, webhook_request(&h.config.paystack_secret_key, &payload)).await;

    let (status, body) = call(&h.router, json_request("POST", &reviews_uri, review(5, "ada@example.com"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "not_reviewable");

    let status_uri = format!("/api/admin/orders/{order_id}/status");
    for next in ["SHIPPED", "DELIVERED"] {
        let (status, body) = call(&h.router, admin_request("POST", &status_uri, json!({ "status": next }))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let (status, body) = call(&h.router, json_request("POST", &reviews_uri, review(6, "ada@example.com"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");
    let (status, body) = call(&h.router, json_request("POST", &reviews_uri, review(4, "eve@example.com"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "not_your_order");

    let (status, body) = call(&h.router, json_request("POST", &reviews_uri, review(4, "ADA@example.com"))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["rating"], 4);
    let (status, body) = call(&h.router, json_request("POST", &reviews_uri, review(5, "ada@example.com"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");

    let (status, summary) = call(&h.router, get(&reviews_uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["count"], 1);
    assert_eq!(summary["average_rating"], 4.0);
}
