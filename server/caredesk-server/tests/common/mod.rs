//! Shared helpers for the HTTP integration tests: an in-memory server and a
//! small JSON request helper.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use caredesk_server::config::AppConfig;
use caredesk_server::{create_app, CareDeskServer};
use database_layer::DocumentStore;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin12345";

pub struct TestApp {
    pub router: Router,
    pub server: CareDeskServer,
}

impl TestApp {
    /// Fresh in-memory server. With `enforce_auth` off every route is open.
    pub async fn new(enforce_auth: bool) -> Self {
        let server = CareDeskServer::new(AppConfig::in_memory(enforce_auth))
            .await
            .expect("server starts");
        let router = create_app(server.clone());
        Self { router, server }
    }

    /// Open server over a caller-supplied store.
    pub async fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        let server = CareDeskServer::with_store(AppConfig::in_memory(false), store)
            .await
            .expect("server starts");
        let router = create_app(server.clone());
        Self { router, server }
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
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request builds");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body reads")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, None, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, None, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, None, None).await
    }

    /// Create a record and return its `data`, asserting 201.
    pub async fn create(&self, collection: &str, body: Value) -> Value {
        let (status, response) = self.post(&format!("/{collection}"), body).await;
        assert_eq!(status, StatusCode::CREATED, "create {collection}: {response}");
        response["data"].clone()
    }

    /// Sign in and return the bearer token.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let (status, response) = self
            .post(
                "/auth/login",
                json!({"username": username, "password": password}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login {username}: {response}");
        response["data"]["token"]
            .as_str()
            .expect("token in login response")
            .to_string()
    }
}

pub fn patient_payload(name: &str, phone: &str) -> Value {
    json!({
        "fullName": name,
        "dateOfBirth": "1990-01-01",
        "gender": "male",
        "phone": phone,
        "identityCard": "025123456789",
        "address": "X",
        "emergencyContact": {"name": "B", "phone": "0909999999", "relationship": "spouse"},
        "status": "active"
    })
}

pub fn id_of(record: &Value) -> String {
    record["id"].as_str().expect("record id").to_string()
}

pub fn number(value: &Value) -> f64 {
    value.as_f64().unwrap_or_else(|| panic!("expected a number, got {value}"))
}
