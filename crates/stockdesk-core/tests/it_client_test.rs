//! Integration tests for request building, response mapping and endpoints

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use mockito::{Matcher, Server};
use serde_json::json;
use stockdesk_core::models::{Ack, CategoryUpdate, ItemAttachment, NewCategory, NewItem, Registration};
use stockdesk_core::{
    ApiClient, ApiError, ApiResponse, ClientOptions, CredentialStore, MemoryCredentialStore,
    PageRequest, RequestDescriptor,
};

fn store_with_token(token: &str) -> Arc<MemoryCredentialStore> {
    let store = Arc::new(MemoryCredentialStore::new());
    store.store_tokens(token, None).unwrap();
    store
}

fn jwt(payload: serde_json::Value) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256"}"#),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

#[tokio::test]
async fn bearer_token_is_attached() {
    //* Given
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/Category/3")
        .match_header("authorization", "Bearer T1")
        .match_header("accept", "application/json")
        .with_status(200)
        .with_header("content-type", "application/json; charset=utf-8")
        .with_body(r#"{"categoryId":3,"categoryName":"Hand Tools","description":null,"itemCount":4}"#)
        .expect(1)
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), store_with_token("T1")).unwrap();

    //* When
    let category = client.get_category(3).await.expect("request should succeed");

    //* Then
    mock.assert_async().await;
    let category = category.expect("category expected");
    assert_eq!(category.category_name, "Hand Tools");
    assert_eq!(category.item_count, Some(4));
}

#[tokio::test]
async fn anonymous_requests_carry_no_authorization() {
    //* Given
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/Auth/ConfirmEmail")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({"email": "a@b.com", "otp": "123456"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success":true}"#)
        .expect(1)
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), Arc::new(MemoryCredentialStore::new())).unwrap();

    //* When
    let ack = client
        .confirm_email(&stockdesk_core::models::EmailConfirmation {
            email: "a@b.com".to_string(),
            otp: "123456".to_string(),
        })
        .await
        .unwrap();

    //* Then
    mock.assert_async().await;
    assert!(ack.success);
}

#[tokio::test]
async fn caller_supplied_header_wins_over_attached_one() {
    //* Given
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/Item")
        .match_header("authorization", "Custom override")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"items":[]}"#)
        .expect(1)
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), store_with_token("T1")).unwrap();

    //* When
    let result = client
        .execute(&RequestDescriptor::get("/api/Item").header("Authorization", "Custom override"))
        .await;

    //* Then
    mock.assert_async().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn no_content_yields_empty_response() {
    //* Given
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/Item/99")
        .with_status(204)
        .create_async()
        .await;
    server
        .mock("DELETE", "/api/Item/99")
        .with_status(204)
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), store_with_token("T1")).unwrap();

    //* When
    let raw = client.execute(&RequestDescriptor::get("/api/Item/99")).await;
    let typed = client.get_item(99).await;
    let ack = client.delete_item(99).await;

    //* Then
    assert_eq!(raw, Ok(ApiResponse::Empty));
    assert_eq!(typed, Ok(None));
    assert_eq!(
        ack,
        Ok(Ack {
            success: true,
            message: None
        })
    );
}

#[tokio::test]
async fn delete_with_no_content_counts_as_done() {
    //* Given
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/api/Category/3")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), store_with_token("T1")).unwrap();

    //* When
    let ack = client.delete_category(3).await.expect("delete should succeed");

    //* Then
    mock.assert_async().await;
    assert!(ack.success);
    assert_eq!(ack.message_or("Category deleted"), "Category deleted");
}

#[tokio::test]
async fn create_returning_entity_counts_as_done() {
    //* Given
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/Category")
        .match_body(Matcher::Json(json!({"categoryName": "Paint", "description": ""})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"categoryId":9,"categoryName":"Paint","description":"","itemCount":0}"#)
        .expect(1)
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), store_with_token("T1")).unwrap();

    //* When
    let ack = client
        .create_category(&NewCategory {
            category_name: "Paint".to_string(),
            description: String::new(),
        })
        .await
        .expect("create should succeed");

    //* Then
    mock.assert_async().await;
    assert!(ack.success);
    assert_eq!(ack.message, None);
}

#[tokio::test]
async fn explicit_failure_flag_is_honoured() {
    //* Given
    let mut server = Server::new_async().await;
    server
        .mock("DELETE", "/api/Item/4")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success":false,"message":"Item is checked out"}"#)
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), store_with_token("T1")).unwrap();

    //* When
    let ack = client.delete_item(4).await.unwrap();

    //* Then
    assert!(!ack.success);
    assert_eq!(ack.message_or(""), "Item is checked out");
}

#[tokio::test]
async fn registration_without_body_reads_as_not_found() {
    //* Given
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/Employee")
        .with_status(204)
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), Arc::new(MemoryCredentialStore::new())).unwrap();

    //* When
    let ack = client
        .register(&Registration::new("Ann", "ann@example.com", "pw", "pw"))
        .await
        .unwrap();

    //* Then
    assert_eq!(ack, Ack::not_found());
}

#[tokio::test]
async fn non_json_body_is_returned_as_text() {
    //* Given
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/Item/fileUrl/abc%20def.png")
        .with_status(200)
        .with_header("content-type", "text/plain")
        .with_body("https://files.example.com/abc.png")
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), store_with_token("T1")).unwrap();

    //* When
    let response = client.file_url("abc def.png").await;

    //* Then
    assert_eq!(
        response,
        Ok(ApiResponse::Text("https://files.example.com/abc.png".to_string()))
    );
}

#[tokio::test]
async fn validation_errors_are_normalized() {
    //* Given
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/Category/update")
        .match_body(Matcher::Json(json!({
            "categoryId": 4,
            "categoryName": "",
            "description": ""
        })))
        .with_status(400)
        .with_header("content-type", "application/problem+json")
        .with_body(r#"{"title":"One or more validation errors occurred.","errors":{"CategoryName":["The CategoryName field is required."]}}"#)
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), store_with_token("T1")).unwrap();

    //* When
    let result = client
        .update_category(&CategoryUpdate {
            category_id: 4,
            ..Default::default()
        })
        .await;

    //* Then
    assert_eq!(
        result,
        Err(ApiError::RequestFailed {
            status: 400,
            message: "The CategoryName field is required.".to_string()
        })
    );
}

#[tokio::test]
async fn unstructured_error_falls_back_to_status_line() {
    //* Given
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/Employee")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("Service Unavailable")
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), store_with_token("T1")).unwrap();

    //* When
    let result = client.list_employees(&PageRequest::default()).await;

    //* Then
    let err = result.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.to_string(), "HTTP error! status: 503");
    assert!(!err.is_auth_failure());
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    //* Given
    let client = ApiClient::new("http://127.0.0.1:9", store_with_token("T1")).unwrap();

    //* When
    let result = client.execute(&RequestDescriptor::get("/api/Item")).await;

    //* Then
    assert!(matches!(result, Err(ApiError::Network(_))));
}

#[tokio::test]
async fn list_items_sends_paging_parameters() {
    //* Given
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/Item")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("pageIndex".into(), "2".into()),
            Matcher::UrlEncoded("pageSize".into(), "6".into()),
            Matcher::UrlEncoded("searchTerm".into(), "drill".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"items":[{"itemId":5,"itemName":"Cordless Drill","quantity":3,"originalQuantity":5}],
                "pageIndex":2,"pageSize":6,"totalPages":3,"totalCount":13,
                "hasPreviousPage":true,"hasNextPage":true}"#,
        )
        .expect(1)
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), store_with_token("T1")).unwrap();

    //* When
    let page = client
        .list_items(&PageRequest::page(2, 6).search("drill"))
        .await
        .expect("list should succeed");

    //* Then
    mock.assert_async().await;
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].item_name, "Cordless Drill");
    assert_eq!(page.total_count, 13);
    assert!(page.has_previous_page);
}

#[tokio::test]
async fn create_item_uploads_multipart_form() {
    //* Given
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/Item")
        .match_header("authorization", "Bearer T1")
        .match_header("content-type", Matcher::Regex("^multipart/form-data; boundary=".into()))
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="itemName"\r\n\r\nSaw"#.into()),
            Matcher::Regex(r#"name="categoryId"\r\n\r\n2"#.into()),
            Matcher::Regex(r#"name="file"; filename="saw.txt""#.into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success":true,"message":"Item created"}"#)
        .expect(1)
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), store_with_token("T1")).unwrap();

    //* When
    let ack = client
        .create_item(&NewItem {
            item_name: "Saw".to_string(),
            quantity: 1,
            original_quantity: 1,
            location: "Shed".to_string(),
            description: String::new(),
            category_id: 2,
            file: Some(ItemAttachment {
                file_name: "saw.txt".to_string(),
                content_type: Some("text/plain".to_string()),
                data: b"sharp".to_vec(),
            }),
        })
        .await
        .expect("create should succeed");

    //* Then
    mock.assert_async().await;
    assert!(ack.success);
    assert_eq!(ack.message_or(""), "Item created");
}

#[tokio::test]
async fn employee_email_is_percent_encoded() {
    //* Given
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/Employee/ann%40example.com")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"employeeId":"e-1","employeeName":"Ann","email":"ann@example.com","permissions":["Admin"]}"#)
        .expect(1)
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), store_with_token("T1")).unwrap();

    //* When
    let employee = client.get_employee("ann@example.com").await.unwrap();

    //* Then
    mock.assert_async().await;
    let employee = employee.expect("employee expected");
    assert_eq!(employee.permissions, vec!["Admin".to_string()]);
    assert_eq!(employee.display_name(), "Ann");
}

#[tokio::test]
async fn role_changes_hit_employee_role_routes() {
    //* Given
    let mut server = Server::new_async().await;
    let add = server
        .mock("POST", "/api/Employee/e-1/roles/Manager")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success":true}"#)
        .expect(1)
        .create_async()
        .await;
    let remove = server
        .mock("DELETE", "/api/Employee/e-1/roles/Manager")
        .with_status(403)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"Admins only"}"#)
        .expect(1)
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), store_with_token("T1")).unwrap();

    //* When
    let added = client.add_employee_role("e-1", "Manager").await;
    let removed = client.remove_employee_role("e-1", "Manager").await;

    //* Then
    add.assert_async().await;
    remove.assert_async().await;
    assert!(added.unwrap().success);
    assert_eq!(
        removed,
        Err(ApiError::RequestFailed {
            status: 403,
            message: "Admins only".to_string()
        })
    );
}

#[tokio::test]
async fn bypass_headers_follow_token_permissions() {
    //* Given
    let mut server = Server::new_async().await;
    let token = jwt(json!({"permission": ["Can Add", "Can Edit"]}));
    let mock = server
        .mock("GET", "/api/Item")
        .match_header("x-bypass-canadd", "true")
        .match_header("x-bypass-canedit", "true")
        .match_header("x-bypass-candelete", Matcher::Missing)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"items":[]}"#)
        .expect(1)
        .create_async()
        .await;
    let client = ApiClient::new(server.url(), store_with_token(&token)).unwrap();

    //* When
    let result = client.execute(&RequestDescriptor::get("/api/Item")).await;

    //* Then
    mock.assert_async().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn bypass_headers_can_be_disabled() {
    //* Given
    let mut server = Server::new_async().await;
    let token = jwt(json!({"permission": ["Can Delete"]}));
    let mock = server
        .mock("GET", "/api/Item")
        .match_header("x-bypass-candelete", Matcher::Missing)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"items":[]}"#)
        .expect(1)
        .create_async()
        .await;
    let options = ClientOptions {
        send_bypass_headers: false,
        ..ClientOptions::default()
    };
    let client = ApiClient::with_options(server.url(), store_with_token(&token), options).unwrap();

    //* When
    let result = client.execute(&RequestDescriptor::get("/api/Item")).await;

    //* Then
    mock.assert_async().await;
    assert!(result.is_ok());
}
