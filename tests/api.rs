mod common;

use axum::http::{header, Method, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use common::{token, TestApp};
use storefront::domain::aggregates::CartLineItem;
use storefront::domain::value_objects::Quantity;

#[tokio::test]
async fn health_check() {
    let app = TestApp::new();
    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn product_listing_envelope() {
    let app = TestApp::new();
    let rings = app.seed_category("Rings", "rings").await;
    let vases = app.seed_category("Vases", "vases").await;
    app.seed_product("Gold Ring", &rings, 120, true).await;
    app.seed_product("Silver Ring", &rings, 80, true).await;
    app.seed_product("Retired Ring", &rings, 60, false).await;
    app.seed_product("Clay Vase", &vases, 40, true).await;

    let (status, headers, body) = app.request_with_headers(Method::GET, "/api/products?limit=2&sortBy=price&sortOrder=asc", None, None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "public, max-age=180");
    assert_eq!(body["success"], true);
    assert_eq!(body["pagination"], json!({"currentPage": 1, "totalPages": 2, "totalCount": 3, "limit": 2}));
    let names: Vec<&str> = body["data"].as_array().unwrap().iter().map(|p| p["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["Clay Vase", "Silver Ring"]);
    assert_eq!(body["filters"]["sortBy"], "price");
    assert!(body["timestamp"].is_string());

    let (status, body) = app.get("/api/products/category/rings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["totalCount"], 2);
    assert_eq!(body["filters"]["category"], "rings");
}

#[tokio::test]
async fn invalid_listing_parameters_are_rejected() {
    let app = TestApp::new();
    for uri in [
        "/api/products?page=0",
        "/api/products?limit=101",
        "/api/products?limit=abc",
        "/api/products?sortBy=rating",
        "/api/bestsellers?limit=51",
        "/api/bestsellers?limit=0",
    ] {
        let (status, body) = app.get(uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "validation_error");
    }
}

#[tokio::test]
async fn unknown_category_and_product_are_not_found() {
    let app = TestApp::new();
    let rings = app.seed_category("Rings", "rings").await;
    let hidden = app.seed_product("Hidden", &rings, 10, false).await;
    let shown = app.seed_product("Shown", &rings, 10, true).await;

    assert_eq!(app.get("/api/products/category/lamps", None).await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.get(&format!("/api/products/{}", hidden.id), None).await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/api/products/not-a-uuid", None).await.0, StatusCode::NOT_FOUND);

    let (status, body) = app.get(&format!("/api/products/{}", shown.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Shown");
}

#[tokio::test]
async fn orders_require_a_session() {
    let app = TestApp::new();
    let body = json!({"items": [{"quantity": 1, "base_price": "10"}]});
    let (status, body) = app.request(Method::POST, "/api/orders", None, Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = app.get("/api/orders", Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_need_the_admin_role() {
    let app = TestApp::new();
    let shopper = token(Uuid::new_v4(), None);
    assert_eq!(app.get("/api/admin/orders", Some(&shopper)).await.0, StatusCode::FORBIDDEN);
    assert_eq!(app.get("/api/admin/dashboard", None).await.0, StatusCode::UNAUTHORIZED);

    let admin = token(Uuid::new_v4(), Some("admin"));
    let (status, body) = app.get("/api/admin/dashboard", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_orders"], 0);
    assert_eq!(body["data"]["daily"].as_array().unwrap().len(), 30);
    assert_eq!(app.get("/api/admin/orders?status=shipped", Some(&admin)).await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn order_flow_feeds_bestsellers_and_dashboard() {
    let app = TestApp::new();
    let rings = app.seed_category("Rings", "rings").await;
    let ring = app.seed_product("Gold Ring", &rings, 250, true).await;
    let user = Uuid::new_v4();
    app.seed_profile(user, "Rana", "+961 3 123 456").await;
    let shopper = token(user, None);
    let admin = token(Uuid::new_v4(), Some("admin"));

    let request = json!({
        "items": [{
            "product_id": ring.id,
            "quantity": 2,
            "base_price": "250",
            "customization": {"kind": "engraving", "text": "R"},
            "customization_fee": "50"
        }],
        "notes": "  ring box please  "
    });
    let (status, body) = app.request(Method::POST, "/api/orders", Some(&shopper), Some(request)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["order"]["total_amount"], "600");
    assert_eq!(body["data"]["order"]["status"], "pending");
    let order_id = body["data"]["order"]["id"].as_str().unwrap().to_string();

    let (_, mine) = app.get("/api/orders", Some(&shopper)).await;
    assert_eq!(mine["pagination"]["totalCount"], 1);

    let patch = |status: &str| json!({ "status": status });
    let uri = format!("/api/admin/orders/{order_id}/status");
    let (status, _) = app.request(Method::PATCH, &uri, Some(&admin), Some(patch("delivered"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    for next in ["confirmed", "ready", "delivered"] {
        let (status, body) = app.request(Method::PATCH, &uri, Some(&admin), Some(patch(next))).await;
        assert_eq!(status, StatusCode::OK, "{next}");
        assert_eq!(body["data"]["status"], next);
    }
    assert_eq!(app.messenger.sent().await.len(), 2);

    let (status, body) = app.get("/api/bestsellers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["name"], "Gold Ring");
    assert_eq!(body["data"][0]["total_quantity_sold"], 2);
    assert_eq!(body["data"][0]["total_revenue"], "600");
    assert_eq!(body["data"][0]["rank"], 1);

    let (_, body) = app.get("/api/admin/dashboard", Some(&admin)).await;
    assert_eq!(body["data"]["total_orders"], 1);
    assert_eq!(body["data"]["realized_revenue"], "600");
    assert_eq!(body["data"]["top_products"][0]["name"], "Gold Ring");
}

#[tokio::test]
async fn bag_and_wishlist() {
    let app = TestApp::new();
    let rings = app.seed_category("Rings", "rings").await;
    let ring = app.seed_product("Gold Ring", &rings, 100, true).await;
    let shopper = token(Uuid::new_v4(), None);

    assert_eq!(app.get("/api/bag", None).await.0, StatusCode::UNAUTHORIZED);

    let line = CartLineItem::new(&ring, Quantity::new(3).unwrap(), Utc::now());
    let bag = serde_json::to_value(vec![line.clone(), line]).unwrap();
    let (status, body) = app.request(Method::PUT, "/api/bag", Some(&shopper), Some(bag)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["totalItems"], 3);
    assert_eq!(body["totalPrice"], "300");

    let (_, body) = app.get("/api/bag", Some(&shopper)).await;
    assert_eq!(body["totalItems"], 3);

    // An empty local bag keeps the remote one under the default policy.
    let (_, body) = app.request(Method::POST, "/api/bag/merge", Some(&shopper), Some(json!([]))).await;
    assert_eq!(body["totalItems"], 3);
    assert_eq!(body["writeLocal"], true);

    let (status, _) = app.request(Method::DELETE, "/api/bag", Some(&shopper), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.get("/api/bag", Some(&shopper)).await.1["totalItems"], 0);

    let uri = format!("/api/wishlist/{}", ring.id);
    let (_, body) = app.request(Method::POST, &uri, Some(&shopper), None).await;
    assert_eq!(body["data"]["in_wishlist"], true);
    let (_, list) = app.get("/api/wishlist", Some(&shopper)).await;
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
    let (_, body) = app.request(Method::POST, &uri, Some(&shopper), None).await;
    assert_eq!(body["data"]["in_wishlist"], false);

    let missing = format!("/api/wishlist/{}", Uuid::new_v4());
    assert_eq!(app.request(Method::POST, &missing, Some(&shopper), None).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_update_normalizes_phone() {
    let app = TestApp::new();
    let shopper = token(Uuid::new_v4(), None);
    let (_, body) = app.get("/api/profile", Some(&shopper)).await;
    assert_eq!(body["data"], Value::Null);

    let update = json!({"full_name": "Sami", "phone": "+1 (555) 010-2000"});
    let (status, body) = app.request(Method::PUT, "/api/profile", Some(&shopper), Some(update)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phone"], "+15550102000");
    assert_eq!(body["data"]["email"], "shopper@example.com");

    let (status, _) = app.request(Method::PUT, "/api/profile", Some(&shopper), Some(json!({"phone": "n/a"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_uses_error_envelope() {
    let app = TestApp::new();
    let shopper = token(Uuid::new_v4(), None);
    let (status, body) = app.request(Method::POST, "/api/orders", Some(&shopper), Some(json!({"items": "nope"}))).await;
    assert!(status.is_client_error());
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn webhook_dispatches_status_changes() {
    let app = TestApp::with_webhook_secret(Some("hook"));
    let user = Uuid::new_v4();
    app.seed_profile(user, "Rana", "+961 3 123 456").await;
    let request = json!({"items": [{"quantity": 1, "base_price": "250", "customization_fee": "50"}]});
    let (_, body) = app.request(Method::POST, "/api/orders", Some(&token(user, None)), Some(request)).await;
    let order_id = body["data"]["order"]["id"].clone();

    let payload = |status: &str, old: &str| json!({
        "type": "UPDATE",
        "table": "orders",
        "schema": "public",
        "record": {"id": order_id, "status": status},
        "old_record": {"id": order_id, "status": old}
    });

    let (status, _) = app.request(Method::POST, "/webhooks/order-status", None, Some(payload("confirmed", "pending"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let secret = [("x-webhook-secret", "hook")];
    let (status, _, body) = app.request_with_headers(Method::POST, "/webhooks/order-status", None, Some(payload("confirmed", "confirmed")), &secret).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sent"], false);

    let (_, _, body) = app.request_with_headers(Method::POST, "/webhooks/order-status", None, Some(payload("confirmed", "pending")), &secret).await;
    assert_eq!(body, json!({"success": true, "sent": true}));
    let sent = app.messenger.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("Rana"));
    assert!(sent[0].body.contains("300"));

    let unknown = json!({"type": "UPDATE", "table": "orders", "record": {"id": Uuid::new_v4(), "status": "ready"}});
    let (status, _, body) = app.request_with_headers(Method::POST, "/webhooks/order-status", None, Some(unknown), &secret).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn admin_update_and_webhook_notify_once() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let admin = token(Uuid::new_v4(), Some("admin"));
    app.seed_profile(user, "Rana", "+961 3 123 456").await;
    let request = json!({"items": [{"quantity": 1, "base_price": "250", "customization_fee": "50"}]});
    let (_, body) = app.request(Method::POST, "/api/orders", Some(&token(user, None)), Some(request)).await;
    let order_id = body["data"]["order"]["id"].as_str().unwrap().to_string();

    let uri = format!("/api/admin/orders/{order_id}/status");
    let (status, _) = app.request(Method::PATCH, &uri, Some(&admin), Some(json!({"status": "confirmed"}))).await;
    assert_eq!(status, StatusCode::OK);

    let hook = json!({
        "type": "UPDATE",
        "table": "orders",
        "schema": "public",
        "record": {"id": order_id, "status": "confirmed"},
        "old_record": {"id": order_id, "status": "pending"}
    });
    let (status, body) = app.request(Method::POST, "/webhooks/order-status", None, Some(hook)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "sent": false}));
    assert_eq!(app.messenger.sent().await.len(), 1);
}
