#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use storefront::api::{router, AppState};
use storefront::auth::{AppMetadata, Claims, TokenVerifier, AUTHENTICATED_AUDIENCE};
use storefront::bus::InlinePublisher;
use storefront::domain::aggregates::{Address, Category, Product, Profile};
use storefront::domain::value_objects::Slug;
use storefront::notify::{NotificationDispatcher, RecordingMessenger};
use storefront::store::{AccountStore, MemoryStore};

pub const SECRET: &str = "test-secret";

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub messenger: Arc<RecordingMessenger>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self { Self::with_webhook_secret(None) }

    pub fn with_webhook_secret(secret: Option<&str>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), messenger.clone()));
        let publisher = Arc::new(InlinePublisher::new(dispatcher.clone()));
        let state = AppState::new(store.clone(), TokenVerifier::new(SECRET), publisher, dispatcher)
            .with_webhook_secret(secret.map(str::to_string));
        Self { store, messenger, router: router(state) }
    }

    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let (status, _, body) = self.request_with_headers(method, uri, token, body, &[]).await;
        (status, body)
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(json) => builder.header(header::CONTENT_TYPE, "application/json").body(Body::from(json.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, headers, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn seed_category(&self, name: &str, slug: &str) -> Category {
        let category = Category::new(name, Slug::new(slug).unwrap());
        self.store.insert_category(category.clone()).await;
        category
    }

    pub async fn seed_product(&self, name: &str, category: &Category, price: i64, available: bool) -> Product {
        let mut product = Product::new(name, category.id, Decimal::new(price, 0));
        product.is_available = available;
        self.store.insert_product(product.clone()).await;
        product
    }

    pub async fn seed_profile(&self, user: Uuid, name: &str, phone: &str) {
        self.store.upsert_profile(&Profile {
            id: user,
            full_name: Some(name.into()),
            phone: Some(phone.into()),
            email: None,
            address: Some(Address { street: "14 Olive St".into(), city: "Beirut".into(), ..Default::default() }),
            updated_at: Utc::now(),
        }).await.unwrap();
    }
}

pub fn token(sub: Uuid, role: Option<&str>) -> String {
    let claims = Claims {
        sub,
        exp: (Utc::now().timestamp() + 3600) as usize,
        aud: AUTHENTICATED_AUDIENCE.into(),
        email: Some("shopper@example.com".into()),
        app_metadata: AppMetadata { role: role.map(str::to_string) },
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}
