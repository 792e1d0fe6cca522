//! In-process router tests; every request here is answered before any query
//! reaches the database, so the pool is never connected.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

use library_server::{
    api,
    config::{AppConfig, AuthConfig, DatabaseConfig, LoggingConfig, ServerConfig},
    models::user::{Role, UserClaims},
    repository::Repository,
    services::Services,
    AppState,
};

const SECRET: &str = "router-test-secret";

fn test_router() -> Router {
    let config = AppConfig {
        server: ServerConfig::default(),
        database: DatabaseConfig::default(),
        auth: AuthConfig {
            jwt_secret: SECRET.to_string(),
            jwt_expiration_hours: 1,
        },
        logging: LoggingConfig::default(),
    };

    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database.url)
        .expect("Invalid database url");
    let services = Services::new(Repository::new(pool.clone()), config.auth.clone());

    api::create_router(AppState {
        config: Arc::new(config),
        services: Arc::new(services),
        pool,
    })
}

fn token(role: Role) -> String {
    let now = Utc::now().timestamp();
    UserClaims {
        sub: "reader@example.com".to_string(),
        user_id: Uuid::new_v4(),
        role,
        exp: now + 3600,
        iat: now,
    }
    .create_token(SECRET)
    .expect("Failed to sign token")
}

fn request(method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("Failed to build request")
}

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let response = test_router()
        .oneshot(request)
        .await
        .expect("Router failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_needs_no_database() {
    let (status, body) = send(request(Method::GET, "/api/v1/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_books_require_a_token() {
    let (status, body) = send(request(Method::GET, "/api/v1/books", None, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 2);
}

#[tokio::test]
async fn test_token_signed_with_another_secret_is_rejected() {
    let forged = UserClaims {
        sub: "reader@example.com".to_string(),
        user_id: Uuid::new_v4(),
        role: Role::Admin,
        exp: Utc::now().timestamp() + 3600,
        iat: Utc::now().timestamp(),
    }
    .create_token("another-secret")
    .unwrap();

    let (status, _) = send(request(Method::GET, "/api/v1/books", Some(&forged), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_sort_key_is_a_bad_request() {
    let reader = token(Role::User);
    let (status, body) = send(request(
        Method::GET,
        "/api/v1/books?sort=-isbn",
        Some(&reader),
        None,
    ))
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 6);
}

#[tokio::test]
async fn test_readers_cannot_add_books() {
    let reader = token(Role::User);
    let book = json!({
        "title": "Dune",
        "author": "Frank Herbert",
        "genre": "Science fiction",
        "rating": 5,
        "total_copies": 2,
        "price": 1200
    });

    let (status, body) = send(request(Method::POST, "/api/v1/books", Some(&reader), Some(book))).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 3);
}

#[tokio::test]
async fn test_borrow_due_tomorrow_minus_an_hour_is_rejected() {
    let reader = token(Role::User);
    let payload = json!({
        "book_ids": [Uuid::new_v4()],
        "due_date": Utc::now() + Duration::hours(23)
    });

    let (status, body) = send(request(Method::POST, "/api/v1/borrows", Some(&reader), Some(payload))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Due date must be at least 1 day from now");
}

#[tokio::test]
async fn test_borrow_of_six_books_is_rejected() {
    let reader = token(Role::User);
    let book_ids: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();
    let payload = json!({
        "book_ids": book_ids,
        "due_date": Utc::now() + Duration::days(7)
    });

    let (status, body) = send(request(Method::POST, "/api/v1/borrows", Some(&reader), Some(payload))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot borrow more than 5 books");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (status, body) = send(request(Method::GET, "/api-docs/openapi.json", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/borrows/return"].is_object());
}
