//! Staff accounts

use async_trait::async_trait;
use database_layer::{Document, CREATED_AT_FIELD, UPDATED_AT_FIELD};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::passwords::{hash_password, MIN_PASSWORD_LENGTH};
use crate::auth::{Page, Role};
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{RecordMeta, Resource, SortOrder};
use crate::server::CareDeskServer;
use crate::validation::{is_valid_email, is_valid_phone, FieldErrors, RequestValidation};

pub const PASSWORD_HASH_FIELD: &str = "passwordHash";
pub const LAST_LOGIN_FIELD: &str = "lastLogin";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    Locked,
}

/// Staff account
///
/// `password` is accepted on writes only; it is hashed into `passwordHash`,
/// which is never returned.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub username: String,
    #[serde(default, skip_serializing)]
    #[schema(write_only)]
    pub password: Option<String>,
    #[schema(read_only)]
    pub password_hash: Option<String>,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub department: Option<String>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    #[serde(default)]
    pub status: UserStatus,
    #[schema(read_only)]
    pub last_login: Option<String>,
}

impl RequestValidation for User {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("username", &self.username);
        errors.check(
            "username",
            !self.username.chars().any(char::is_whitespace),
            "username must not contain spaces",
        );
        errors.required("fullName", &self.full_name);
        errors.check_optional("email", self.email.as_deref(), is_valid_email, "email is not a valid address");
        errors.check_optional("phone", self.phone.as_deref(), is_valid_phone, "phone must contain 10-11 digits");
        match &self.password {
            Some(password) => errors.check(
                "password",
                password.chars().count() >= MIN_PASSWORD_LENGTH,
                &format!("password must be at least {MIN_PASSWORD_LENGTH} characters"),
            ),
            None => errors.check(
                "password",
                self.password_hash.is_some(),
                "password is required",
            ),
        }
        errors.into_result()
    }
}

pub struct Users;

#[async_trait]
impl Resource for Users {
    type Record = User;

    const COLLECTION: &'static str = "users";
    const LABEL: &'static str = "User";
    const PAGES: &'static [Page] = &[Page::Admin];
    const FILTERS: &'static [&'static str] = &["role", "status", "department"];
    const SEARCH: &'static [&'static str] = &["username", "fullName", "email"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("fullName", SortOrder::Asc);
    const SORTABLE: &'static [&'static str] = &[LAST_LOGIN_FIELD];
    const UNIQUE: &'static [&'static str] = &["username"];

    fn protected_fields() -> Vec<&'static str> {
        vec![
            "id",
            CREATED_AT_FIELD,
            UPDATED_AT_FIELD,
            PASSWORD_HASH_FIELD,
            LAST_LOGIN_FIELD,
        ]
    }

    async fn enrich(_server: &CareDeskServer, user: &mut User) -> ApiResult<()> {
        if let Some(password) = user.password.take() {
            let hash = hash_password(&password)
                .await
                .map_err(|e| ApiError::internal(e.to_string()))?;
            user.password_hash = Some(hash);
        }
        Ok(())
    }

    fn present(mut document: Document) -> Document {
        document.remove(PASSWORD_HASH_FIELD);
        document
    }
}
