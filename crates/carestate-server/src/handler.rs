use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Json;
use carestate_store::{Bucket, Store};
use serde_json::{json, Value};

use crate::error::{ServerError, ServerResult};

fn summary(bucket: &Bucket) -> Value {
    let len = bucket.read(|v| match v {
        Value::Object(map) => map.len(),
        Value::Array(items) => items.len(),
        _ => 0,
    });
    json!({
        "name": bucket.name(),
        "kind": bucket.kind(),
        "len": len,
        "dirty": bucket.is_dirty(),
    })
}

/// Health check handler.
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Info handler.
pub async fn info_handler(State(store): State<Arc<Store>>) -> Json<Value> {
    Json(json!({
        "name": "carestate-server",
        "version": env!("CARGO_PKG_VERSION"),
        "durable": store.is_durable(),
        "backend": store.backend_description(),
        "quiet_period_ms": store.quiet_period().as_millis() as u64,
        "buckets": store.bucket_names().len(),
        "pending": store.pending(),
    }))
}

/// Every registered bucket, in registration order.
pub async fn list_buckets_handler(State(store): State<Arc<Store>>) -> Json<Value> {
    let buckets: Vec<Value> = store.buckets().iter().map(summary).collect();
    Json(json!({ "buckets": buckets }))
}

/// One bucket's summary and current in-memory value.
pub async fn get_bucket_handler(
    State(store): State<Arc<Store>>,
    Path(name): Path<String>,
) -> ServerResult<Json<Value>> {
    if !store.contains(&name) {
        return Err(ServerError::BucketNotFound(name));
    }
    let bucket = store.bucket(&name);
    let mut body = summary(&bucket);
    body["data"] = bucket.snapshot();
    Ok(Json(body))
}
