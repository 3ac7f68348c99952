#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use pharmacy_stock::{
    config::{AppState, Settings},
    db::MemoryStockStore,
    services::auth::JwtService,
};

pub const ALL_PERMS: [&str; 3] = ["stock:read", "stock:write", "stock:count"];

pub struct TestApp {
    pub router: Router,
    pub jwt: JwtService,
}

pub fn setup_test_app() -> TestApp {
    let settings = Settings {
        jwt_secret: "segredo-dos-testes".to_string(),
        ..Settings::default()
    };
    let state = AppState::with_store(&settings, Arc::new(MemoryStockStore::new()))
        .expect("estado de teste");

    TestApp {
        jwt: state.auth_service.clone(),
        router: pharmacy_stock::app(state),
    }
}

impl TestApp {
    pub fn token(&self, actor: &str, perms: &[&str]) -> String {
        self.jwt.issue_token(actor, perms).expect("token de teste")
    }

    pub fn admin_token(&self) -> String {
        self.token("farmaceutica", &ALL_PERMS)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        self.send(request).await
    }

    pub async fn post_csv(&self, uri: &str, token: &str, csv: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from(csv.to_string()))
            .unwrap();

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    // Atalhos usados pelos cenários

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let token = self.admin_token();
        self.request(Method::GET, uri, Some(&token), None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let token = self.admin_token();
        self.request(Method::POST, uri, Some(&token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let token = self.admin_token();
        self.request(Method::PUT, uri, Some(&token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        let token = self.admin_token();
        self.request(Method::DELETE, uri, Some(&token), None).await
    }

    /// Registra um lote no cache com saldo inicial.
    pub async fn seed_batch(&self, product_id: &str, batch_no: &str, quantity: i64) -> Value {
        let (status, body) = self
            .post(
                "/api/medicines-cache",
                serde_json::json!({
                    "product_id": product_id,
                    "batch_no": batch_no,
                    "current_quantity": quantity,
                    "product_price": 9.9
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    pub async fn adjust(&self, product_id: &str, batch_no: &str, kind: &str, quantity: i64) -> (StatusCode, Value) {
        self.post(
            "/api/stock-adjustments",
            serde_json::json!({
                "product_id": product_id,
                "batch_no": batch_no,
                "adjustment_type": kind,
                "quantity_adjusted": quantity,
                "reason": "ajuste de teste"
            }),
        )
        .await
    }

    pub async fn product_quantity(&self, product_id: &str) -> i64 {
        let (status, body) = self.get(&format!("/api/medicines-cache/products/{product_id}")).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["current_quantity"].as_i64().unwrap()
    }
}
