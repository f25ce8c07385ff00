//! Typed domain operations: items, categories, employees, files and the
//! auth endpoints. Everything goes through `ApiClient::execute`.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::models::{
    Ack, Category, CategoryUpdate, EmailConfirmation, Employee, Item, ItemUpdate, LoginRequest,
    NewCategory, NewItem, PageRequest, Paged, Registration, TokenResponse,
};

use super::request::{ApiResponse, RequestDescriptor};
use super::{ApiClient, ApiError};

const ITEM_PATH: &str = "/api/Item";
const CATEGORY_PATH: &str = "/api/Category";
const EMPLOYEE_PATH: &str = "/api/Employee";
const LOGIN_PATH: &str = "/api/Auth/LogIn";
const LOGOUT_PATH: &str = "/api/Auth/LogOut";
const CONFIRM_EMAIL_PATH: &str = "/api/Auth/ConfirmEmail";
const ADMIN_FILES_PATH: &str = "/api/Admin/files";

fn with_page(mut request: RequestDescriptor, page: &PageRequest) -> RequestDescriptor {
    request.query.extend(page.to_query());
    request
}

impl ApiClient {
    /// Execute and decode, treating a no-content response as an error for
    /// endpoints that must return a body.
    async fn fetch<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T, ApiError> {
        self.execute_json(&request).await?.ok_or_else(|| {
            ApiError::InvalidResponse(format!("empty response from {}", request.path))
        })
    }

    /// Execute a create/update/delete. Any 2xx counts as done unless the
    /// body explicitly says `"success": false`; the message is taken from
    /// the body when it carries one.
    async fn mutate(&self, request: RequestDescriptor) -> Result<Ack, ApiError> {
        let ack = match self.execute(&request).await? {
            ApiResponse::Empty => Ack {
                success: true,
                message: None,
            },
            ApiResponse::Text(text) => Ack {
                success: true,
                message: Some(text),
            },
            ApiResponse::Json(body) => Ack {
                success: body.get("success").and_then(Value::as_bool).unwrap_or(true),
                message: body.get("message").and_then(Value::as_str).map(str::to_string),
            },
        };
        debug!(path = %request.path, success = ack.success, "Mutation acknowledged");
        Ok(ack)
    }

    /// Execute a call whose outcome is the body's `success` flag
    /// (registration and email confirmation). No content reads as the
    /// "not found" acknowledgment.
    async fn submit(&self, request: RequestDescriptor) -> Result<Ack, ApiError> {
        let ack = match self.execute(&request).await? {
            ApiResponse::Text(text) => Ack {
                success: true,
                message: Some(text),
            },
            reply => reply.decode::<Ack>()?.unwrap_or_else(Ack::not_found),
        };
        debug!(path = %request.path, success = ack.success, "Submission acknowledged");
        Ok(ack)
    }

    // ===== Items =====

    pub async fn list_items(&self, page: &PageRequest) -> Result<Paged<Item>, ApiError> {
        self.fetch(with_page(RequestDescriptor::get(ITEM_PATH), page)).await
    }

    /// Fetch one item. `None` when the backend answers with no content.
    pub async fn get_item(&self, item_id: i64) -> Result<Option<Item>, ApiError> {
        self.execute_json(&RequestDescriptor::get(format!("{}/{}", ITEM_PATH, item_id)))
            .await
    }

    pub async fn create_item(&self, item: &NewItem) -> Result<Ack, ApiError> {
        self.mutate(RequestDescriptor::post(ITEM_PATH).multipart(item.to_form()))
            .await
    }

    pub async fn update_item(&self, item: &ItemUpdate) -> Result<Ack, ApiError> {
        self.mutate(RequestDescriptor::put(ITEM_PATH).multipart(item.to_form()))
            .await
    }

    pub async fn delete_item(&self, item_id: i64) -> Result<Ack, ApiError> {
        self.mutate(RequestDescriptor::delete(format!("{}/{}", ITEM_PATH, item_id)))
            .await
    }

    /// Resolve a stored attachment name to a download URL. The backend may
    /// answer with JSON or plain text, so the raw payload is returned.
    pub async fn file_url(&self, generated_file_name: &str) -> Result<ApiResponse, ApiError> {
        self.execute(&RequestDescriptor::get(file_url_path(generated_file_name)))
            .await
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<Ack, ApiError> {
        let request = RequestDescriptor::delete(ADMIN_FILES_PATH).json(&json!({ "fileId": file_id }))?;
        self.mutate(request).await
    }

    // ===== Categories =====

    pub async fn list_categories(&self, page: &PageRequest) -> Result<Paged<Category>, ApiError> {
        self.fetch(with_page(RequestDescriptor::get(CATEGORY_PATH), page)).await
    }

    pub async fn get_category(&self, category_id: i64) -> Result<Option<Category>, ApiError> {
        self.execute_json(&RequestDescriptor::get(format!("{}/{}", CATEGORY_PATH, category_id)))
            .await
    }

    pub async fn create_category(&self, category: &NewCategory) -> Result<Ack, ApiError> {
        self.mutate(RequestDescriptor::post(CATEGORY_PATH).json(category)?)
            .await
    }

    pub async fn update_category(&self, category: &CategoryUpdate) -> Result<Ack, ApiError> {
        let path = format!("{}/update", CATEGORY_PATH);
        self.mutate(RequestDescriptor::post(path).json(category)?).await
    }

    pub async fn delete_category(&self, category_id: i64) -> Result<Ack, ApiError> {
        self.mutate(RequestDescriptor::delete(format!("{}/{}", CATEGORY_PATH, category_id)))
            .await
    }

    // ===== Employees =====

    pub async fn list_employees(&self, page: &PageRequest) -> Result<Paged<Employee>, ApiError> {
        self.fetch(with_page(RequestDescriptor::get(EMPLOYEE_PATH), page)).await
    }

    pub async fn get_employee(&self, email: &str) -> Result<Option<Employee>, ApiError> {
        self.execute_json(&RequestDescriptor::get(employee_path(email)))
            .await
    }

    pub async fn delete_employee(&self, email: &str) -> Result<Ack, ApiError> {
        self.mutate(RequestDescriptor::delete(employee_path(email)))
            .await
    }

    pub async fn add_employee_role(&self, employee_id: &str, role_id: &str) -> Result<Ack, ApiError> {
        self.mutate(RequestDescriptor::post(role_path(employee_id, role_id)))
            .await
    }

    pub async fn remove_employee_role(&self, employee_id: &str, role_id: &str) -> Result<Ack, ApiError> {
        self.mutate(RequestDescriptor::delete(role_path(employee_id, role_id)))
            .await
    }

    // ===== Auth =====

    /// Anonymous: a 401 here means bad credentials, not an expired token.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<TokenResponse, ApiError> {
        let request = RequestDescriptor::post(LOGIN_PATH).json(credentials)?.without_refresh();
        Ok(self.execute_json(&request).await?.unwrap_or_default())
    }

    pub async fn logout(&self) -> Result<ApiResponse, ApiError> {
        self.execute(&RequestDescriptor::post(LOGOUT_PATH).without_refresh())
            .await
    }

    /// Start a registration. The backend emails a one-time code.
    pub async fn register(&self, registration: &Registration) -> Result<Ack, ApiError> {
        let request = RequestDescriptor::post(EMPLOYEE_PATH)
            .json(registration)?
            .without_refresh();
        self.submit(request).await
    }

    pub async fn confirm_email(&self, confirmation: &EmailConfirmation) -> Result<Ack, ApiError> {
        let request = RequestDescriptor::post(CONFIRM_EMAIL_PATH)
            .json(confirmation)?
            .without_refresh();
        self.submit(request).await
    }
}

/// Emails are percent-encoded so `@` survives routing.
fn employee_path(email: &str) -> String {
    format!("{}/{}", EMPLOYEE_PATH, urlencoding::encode(email))
}

fn file_url_path(generated_file_name: &str) -> String {
    format!("{}/fileUrl/{}", ITEM_PATH, urlencoding::encode(generated_file_name))
}

fn role_path(employee_id: &str, role_id: &str) -> String {
    format!(
        "{}/{}/roles/{}",
        EMPLOYEE_PATH,
        urlencoding::encode(employee_id),
        urlencoding::encode(role_id.trim())
    )
}
