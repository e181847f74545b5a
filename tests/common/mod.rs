#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header::AUTHORIZATION},
};
use tokengate::{
    ServerConfig, create_app,
    db::Database,
    jwt::{TokenCodec, TokenLifetimes},
};

pub const TEST_SECRET: &[u8] = b"test-jwt-secret-that-is-long-enough";
pub const TEST_BCRYPT_COST: u32 = 4;

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub codec: TokenCodec,
}

/// Create a test app backed by an in-memory database with user `alice` (password
/// `correct`, roles `admin` and `user`).
pub async fn create_test_app() -> TestApp {
    create_test_app_with_lifetimes(TokenLifetimes::default()).await
}

pub async fn create_test_app_with_lifetimes(lifetimes: TokenLifetimes) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    db.users()
        .create_with_cost("alice", "correct", &roles(&["admin", "user"]), TEST_BCRYPT_COST)
        .await
        .expect("Failed to create test user");

    let config = ServerConfig {
        db: db.clone(),
        jwt_secret: TEST_SECRET.to_vec(),
        lifetimes,
    };
    TestApp {
        app: create_app(&config),
        db,
        codec: TokenCodec::with_lifetimes(TEST_SECRET, lifetimes),
    }
}

pub fn roles(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

pub fn login_request(username: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/login")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(Body::from(format!(
            "username={}&password={}",
            username, password
        )))
        .unwrap()
}

pub fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn refresh_request(uri: &str, refresh_token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Refresh-Token", format!("Bearer {}", refresh_token))
        .body(Body::empty())
        .unwrap()
}

/// Extract the token from a `Bearer <token>` response header.
pub fn bearer_header<B>(response: &Response<B>, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|s| s.to_string())
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> axum::body::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}
