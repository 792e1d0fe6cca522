//! API integration tests against a running server

use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:8080/api/v1";

/// Sign up a fresh reader and return its email
async fn sign_up(client: &Client) -> String {
    let email = format!("reader-{}@example.com", Uuid::new_v4());
    let response = client
        .post(format!("{}/auth/sign-up", BASE_URL))
        .json(&json!({
            "name": "Test Reader",
            "email": email,
            "password": "secret-password"
        }))
        .send()
        .await
        .expect("Failed to send sign-up request");

    assert_eq!(response.status(), 201);
    email
}

/// Helper to get a token for a fresh reader
async fn get_auth_token(client: &Client) -> String {
    let email = sign_up(client).await;
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "email": email,
            "password": "secret-password"
        }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_sign_up_and_login() {
    let client = Client::new();
    let email = sign_up(&client).await;

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "email": email,
            "password": "secret-password"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["role"], "USER");
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
#[ignore]
async fn test_duplicate_email_is_rejected() {
    let client = Client::new();
    let email = sign_up(&client).await;

    let response = client
        .post(format!("{}/auth/sign-up", BASE_URL))
        .json(&json!({
            "name": "Someone Else",
            "email": email,
            "password": "another-password"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["message"], "Email already exists");
}

#[tokio::test]
#[ignore]
async fn test_login_wrong_password() {
    let client = Client::new();
    let email = sign_up(&client).await;

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "email": email,
            "password": "wrong-password"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore]
async fn test_login_unknown_email() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "email": format!("nobody-{}@example.com", Uuid::new_v4()),
            "password": "whatever"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 404);
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/books", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_list_books_with_pagination() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/books?page=1&limit=10&sort=-created_at", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["items"].is_array());
    assert!(body["items"].as_array().unwrap().len() <= 10);
    assert!(body["total"].is_number());
    assert_eq!(body["limit"], 10);
}

#[tokio::test]
#[ignore]
async fn test_invalid_sort_key_lists_valid_keys() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/books?sort=-isbn", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid sort key. Available sort keys: 'title'"));
}

#[tokio::test]
#[ignore]
async fn test_readers_cannot_create_books() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "title": "Unauthorized",
            "author": "Nobody",
            "genre": "None",
            "rating": 3,
            "total_copies": 1,
            "price": 100
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 403);
}

#[tokio::test]
#[ignore]
async fn test_borrow_due_date_too_soon() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let due_date = chrono::Utc::now() + chrono::Duration::hours(2);

    let response = client
        .post(format!("{}/borrows", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "book_ids": [Uuid::new_v4()],
            "due_date": due_date
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["message"], "Due date must be at least 1 day from now");
}

#[tokio::test]
#[ignore]
async fn test_readers_only_see_their_borrows() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/borrows?user_id={}", BASE_URL, Uuid::new_v4()))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["total"], 0);
}
