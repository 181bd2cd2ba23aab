//! Login, logout, current user and role navigation

use axum::extract::{Query, State};
use axum::Json;
use database_layer::{DocumentQuery, UnitOfWork};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::passwords::verify_password;
use crate::auth::{Page, Role, DEFAULT_PAGE};
use crate::error::{api_success, ApiError, ApiErrorResponse, ApiResponse, ApiResult};
use crate::handlers::common::crud::respond;
use crate::handlers::common::{text_field, Resource};
use crate::handlers::users::{User, UserStatus, Users, LAST_LOGIN_FIELD, PASSWORD_HASH_FIELD};
use crate::middleware::AuthContext;
use crate::server::CareDeskServer;
use crate::types::ApiJson;
use crate::utils::{now_rfc3339, to_rfc3339};
use database_layer::Document;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    /// Always `Bearer`
    pub token_type: String,
    pub expires_at: String,
    #[schema(value_type = User)]
    pub user: Document,
    pub role: Role,
    pub allowed_pages: Vec<Page>,
    pub default_page: Page,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub message: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct NavigationQuery {
    /// Page the shell wants to show
    pub page: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NavigationResponse {
    pub role: Role,
    pub allowed_pages: Vec<Page>,
    /// The requested page if the role may open it, otherwise the default page
    pub active_page: Page,
}

/// Sign in with username and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ApiErrorResponse),
        (status = 403, description = "Account inactive or locked", body = ApiErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(server): State<CareDeskServer>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<Json<ApiResponse<LoginResponse>>> {
    let username = request.username.trim();
    if username.is_empty() || request.password.is_empty() {
        return Err(ApiError::authentication(INVALID_CREDENTIALS));
    }

    let query = DocumentQuery::new().filter_eq("username", username).window(Some(1), 0);
    let Some(account) = server.store.find(Users::COLLECTION, &query).await?.documents.pop() else {
        logger_redacted::redacted_warn!("Login failed: unknown user {}", username);
        return Err(ApiError::authentication(INVALID_CREDENTIALS));
    };

    let hash = text_field(&account, PASSWORD_HASH_FIELD).unwrap_or_default();
    let verified = !hash.is_empty()
        && verify_password(&request.password, &hash)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
    if !verified {
        logger_redacted::redacted_warn!("Login failed: wrong password for {}", username);
        return Err(ApiError::authentication(INVALID_CREDENTIALS));
    }

    let user: User = serde_json::from_value(serde_json::Value::Object(account.clone()))
        .map_err(|e| ApiError::internal(format!("Stored user is malformed: {e}")))?;
    match user.status {
        UserStatus::Active => {}
        UserStatus::Inactive => return Err(ApiError::authorization("Account is inactive")),
        UserStatus::Locked => return Err(ApiError::authorization("Account is locked")),
    }

    let issued = server.tokens.issue(&user.meta.id, &user.username, user.role)?;

    let login_at = now_rfc3339();
    let mut written = server
        .store
        .commit(UnitOfWork::new().modify(Users::COLLECTION, &user.meta.id, move |mut doc| {
            doc.insert(LAST_LOGIN_FIELD.to_string(), login_at.into());
            Ok(doc)
        }))
        .await?;
    let stored = written.pop().unwrap_or(account);

    tracing::info!(username = %user.username, role = %user.role, "User signed in");

    Ok(Json(api_success(LoginResponse {
        token: issued.token,
        token_type: "Bearer".to_string(),
        expires_at: to_rfc3339(issued.claims.expires_at()),
        user: respond::<Users>(&server, stored).await?,
        role: user.role,
        allowed_pages: user.role.allowed_pages().to_vec(),
        default_page: DEFAULT_PAGE,
    })))
}

/// Sign out, revoking the presented token
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Signed out", body = LogoutResponse),
        (status = 401, description = "Missing or invalid token", body = ApiErrorResponse)
    ),
    tag = "auth",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(server): State<CareDeskServer>,
    context: AuthContext,
) -> ApiResult<Json<ApiResponse<LogoutResponse>>> {
    server.sessions.revoke(&context.token_id, context.expires_at);
    tracing::info!(username = %context.username, "User signed out");

    Ok(Json(api_success(LogoutResponse {
        message: "Logged out successfully".to_string(),
    })))
}

/// The signed-in user
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Missing or invalid token", body = ApiErrorResponse)
    ),
    tag = "auth",
    security(("bearer_auth" = []))
)]
pub async fn me(
    State(server): State<CareDeskServer>,
    context: AuthContext,
) -> ApiResult<Json<ApiResponse<Document>>> {
    let account = server
        .store
        .get(Users::COLLECTION, &context.user_id)
        .await?
        .ok_or_else(|| ApiError::authentication("Account no longer exists"))?;
    Ok(Json(api_success(respond::<Users>(&server, account).await?)))
}

/// Pages the caller may open and where a requested page lands
#[utoipa::path(
    get,
    path = "/auth/navigation",
    params(NavigationQuery),
    responses(
        (status = 200, description = "Navigation for the caller's role", body = NavigationResponse),
        (status = 401, description = "Missing or invalid token", body = ApiErrorResponse)
    ),
    tag = "auth",
    security(("bearer_auth" = []))
)]
pub async fn navigation(
    context: AuthContext,
    Query(query): Query<NavigationQuery>,
) -> ApiResult<Json<ApiResponse<NavigationResponse>>> {
    Ok(Json(api_success(navigation_for(context.role, query.page.as_deref()))))
}

/// Unknown page ids are treated like pages the role may not open.
pub fn navigation_for(role: Role, requested: Option<&str>) -> NavigationResponse {
    let requested = requested.and_then(|page| page.parse::<Page>().ok());
    NavigationResponse {
        role,
        allowed_pages: role.allowed_pages().to_vec(),
        active_page: role.navigate(requested),
    }
}
