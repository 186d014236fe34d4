mod common;

use common::*;
use redzone::{http_server::router, plugin::PluginSettings, store::MemoryStore};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

async fn start_http(store: MemoryStore) -> SocketAddr {
    let plugin = Arc::new(create_test_plugin(store, PluginSettings::default()).await);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(plugin)).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_health_endpoint() {
    let addr = start_http(example_store()).await;

    let response = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["zones"], 3);
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_ready_endpoint_follows_store() {
    let store = example_store();
    let addr = start_http(store.clone()).await;
    let url = format!("http://{}/ready", addr);

    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ready");

    store.set_available(false);
    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "unavailable");

    // health does not depend on the store
    let response = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}
