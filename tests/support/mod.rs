//! In-process backend double for exercising the client over real HTTP.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::http::HeaderMap;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;

/// Binds a fresh loopback port, serves `app` in the background and returns
/// the base URL including the API prefix.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("serve test backend");
    });
    format!("http://{addr}/api/v1")
}

/// Signed JWT whose `exp` lies `offset_secs` away from now.
pub fn jwt(subject: &str, offset_secs: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + offset_secs;
    encode(
        &Header::default(),
        &json!({ "sub": subject, "exp": exp }),
        &EncodingKey::from_secret(b"test-backend"),
    )
    .expect("mint token")
}

pub fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

/// Shared call counter for asserting how often a route was hit.
#[derive(Default)]
pub struct Calls(AtomicUsize);

impl Calls {
    pub fn new() -> Arc<Self> {
        Arc::new(Calls::default())
    }

    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Backend-format timestamp `offset_secs` away from now.
pub fn stamp(offset_secs: i64) -> String {
    (chrono::Utc::now() + chrono::Duration::seconds(offset_secs))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
