//! Sign-in, sessions and role-gated routes with access checks enforced.

mod common;

use axum::http::{Method, StatusCode};
use common::{patient_payload, TestApp, ADMIN_PASSWORD, ADMIN_USERNAME};
use serde_json::json;

async fn create_staff(app: &TestApp, admin_token: &str, username: &str, role: &str) {
    let (status, body) = app
        .request(
            Method::POST,
            "/users",
            Some(admin_token),
            Some(json!({
                "username": username,
                "password": "secret-pass",
                "fullName": format!("Staff {username}"),
                "role": role
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert!(body["data"].get("passwordHash").is_none());
    assert!(body["data"].get("password").is_none());
}

#[tokio::test]
async fn test_login_returns_token_and_navigation() {
    let app = TestApp::new(true).await;

    let (status, body) = app
        .post(
            "/auth/login",
            json!({"username": ADMIN_USERNAME, "password": ADMIN_PASSWORD}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let data = &body["data"];
    assert_eq!(data["tokenType"], "Bearer");
    assert_eq!(data["role"], "admin");
    assert_eq!(data["defaultPage"], "dashboard");
    assert_eq!(data["allowedPages"].as_array().map(Vec::len), Some(9));
    assert_eq!(data["user"]["username"], ADMIN_USERNAME);
    assert!(data["user"]["lastLogin"].is_string());
    assert!(data["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_bad_credentials_are_unauthorized() {
    let app = TestApp::new(true).await;

    let (status, wrong_password) = app
        .post(
            "/auth/login",
            json!({"username": ADMIN_USERNAME, "password": "not-the-password"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, unknown_user) = app
        .post("/auth/login", json!({"username": "ghost", "password": "whatever1"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password["message"], unknown_user["message"]);
}

#[tokio::test]
async fn test_protected_routes_require_a_token() {
    let app = TestApp::new(true).await;

    let (status, _) = app.get("/patients").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(Method::GET, "/patients", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/auth/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_nurse_navigation_and_page_access() {
    let app = TestApp::new(true).await;
    let admin = app.login(ADMIN_USERNAME, ADMIN_PASSWORD).await;
    create_staff(&app, &admin, "nurse.lan", "nurse").await;
    let nurse = app.login("nurse.lan", "secret-pass").await;

    let (status, nav) = app
        .request(Method::GET, "/auth/navigation?page=admin", Some(&nurse), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        nav["data"]["allowedPages"],
        json!(["dashboard", "patients", "appointments", "medical-records"])
    );
    assert_eq!(nav["data"]["activePage"], "dashboard");

    let (_, nav) = app
        .request(Method::GET, "/auth/navigation?page=patients", Some(&nurse), None)
        .await;
    assert_eq!(nav["data"]["activePage"], "patients");

    let (status, _) = app
        .request(
            Method::POST,
            "/patients",
            Some(&nurse),
            Some(patient_payload("A", "0901234567")),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.request(Method::GET, "/invoices", Some(&nurse), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_type"], "authorization_error");

    let (status, _) = app.request(Method::GET, "/users", Some(&nurse), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_prescriptions_open_to_pharmacy_and_medical_records() {
    let app = TestApp::new(true).await;
    let admin = app.login(ADMIN_USERNAME, ADMIN_PASSWORD).await;
    create_staff(&app, &admin, "pharma", "pharmacist").await;
    create_staff(&app, &admin, "lab", "lab-technician").await;
    let pharmacist = app.login("pharma", "secret-pass").await;
    let technician = app.login("lab", "secret-pass").await;

    let (status, _) = app
        .request(Method::GET, "/prescriptions", Some(&pharmacist), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(Method::GET, "/prescriptions", Some(&technician), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(Method::GET, "/lab-tests", Some(&technician), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let app = TestApp::new(true).await;
    let token = app.login(ADMIN_USERNAME, ADMIN_PASSWORD).await;

    let (status, me) = app.request(Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["data"]["username"], ADMIN_USERNAME);

    let (status, _) = app
        .request(Method::POST, "/auth/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.request(Method::GET, "/patients", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.request(Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_inactive_account_cannot_sign_in() {
    let app = TestApp::new(true).await;
    let admin = app.login(ADMIN_USERNAME, ADMIN_PASSWORD).await;
    create_staff(&app, &admin, "former", "receptionist").await;

    let (_, users) = app
        .request(Method::GET, "/users?search=former", Some(&admin), None)
        .await;
    let id = users["data"][0]["id"].as_str().expect("user id").to_string();
    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/users/{id}"),
            Some(&admin),
            Some(json!({"status": "inactive"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post("/auth/login", json!({"username": "former", "password": "secret-pass"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_duplicate_username_conflicts() {
    let app = TestApp::new(true).await;
    let admin = app.login(ADMIN_USERNAME, ADMIN_PASSWORD).await;

    let (status, _) = app
        .request(
            Method::POST,
            "/users",
            Some(&admin),
            Some(json!({
                "username": ADMIN_USERNAME,
                "password": "another-pass",
                "fullName": "Copy",
                "role": "admin"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .request(
            Method::POST,
            "/users",
            Some(&admin),
            Some(json!({"username": "short", "password": "123", "fullName": "S", "role": "nurse"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_password_change_takes_effect() {
    let app = TestApp::new(true).await;
    let admin = app.login(ADMIN_USERNAME, ADMIN_PASSWORD).await;
    create_staff(&app, &admin, "desk", "receptionist").await;

    let (_, users) = app
        .request(Method::GET, "/users?search=desk", Some(&admin), None)
        .await;
    let id = users["data"][0]["id"].as_str().expect("user id").to_string();
    let (status, updated) = app
        .request(
            Method::PUT,
            &format!("/users/{id}"),
            Some(&admin),
            Some(json!({"password": "rotated-pass"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert!(updated["data"].get("passwordHash").is_none());
    assert!(updated["data"].get("password").is_none());

    let (status, _) = app
        .post("/auth/login", json!({"username": "desk", "password": "secret-pass"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    app.login("desk", "rotated-pass").await;
}

#[tokio::test]
async fn test_identity_needs_a_token_without_enforcement() {
    let app = TestApp::new(false).await;

    let (status, _) = app.get("/patients").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/auth/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
