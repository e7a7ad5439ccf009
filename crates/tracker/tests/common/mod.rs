#![allow(dead_code)]

use axum::Router;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Query strings received by a fake upstream, in arrival order
pub type Recorded = Arc<Mutex<Vec<HashMap<String, String>>>>;

pub fn recorder() -> Recorded {
    Arc::new(Mutex::new(Vec::new()))
}

/// Record `params` and return the 1-based index of this request
pub fn record(recorded: &Recorded, params: HashMap<String, String>) -> usize {
    let mut requests = recorded.lock().unwrap();
    requests.push(params);
    requests.len()
}

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_upstream(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A base URL nothing is listening on
pub async fn refused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
