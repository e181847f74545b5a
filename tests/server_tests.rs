//! Tests for serving the app over a real socket.

mod common;

use tokengate::{ServerConfig, db::Database, jwt::TokenLifetimes, run_server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn send(addr: std::net::SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_run_server_serves_api() {
    let db = Database::open(":memory:").await.unwrap();
    db.users()
        .create_with_cost("alice", "correct", &[], common::TEST_BCRYPT_COST)
        .await
        .unwrap();
    let config = ServerConfig {
        db,
        jwt_secret: common::TEST_SECRET.to_vec(),
        lifetimes: TokenLifetimes::default(),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(run_server(config, listener));

    let anonymous = send(
        addr,
        "GET /api/me HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(anonymous.starts_with("HTTP/1.1 401"), "{}", anonymous);

    let body = "username=alice&password=correct";
    let login = send(
        addr,
        &format!(
            "POST /api/login HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
             Content-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ),
    )
    .await;
    assert!(login.starts_with("HTTP/1.1 200"), "{}", login);
    assert!(login.to_ascii_lowercase().contains("refresh-token: bearer "));

    server.abort();
}
