//! HTTP API handlers for mflow-ci

pub mod harvest;
pub mod health;
pub mod ingest;

pub use harvest::harvest_routes;
pub use health::health_routes;
pub use ingest::ingest_routes;

use serde::Serialize;
use serde_json::Value;

/// Uniform result envelope returned by the ingestion entry points.
///
/// code 0 = success, 400 = missing/invalid input, 500 = processing or
/// storage failure. HTTP status stays 200; the code is application-level.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub code: i64,
    pub msg: String,
    pub data: Option<Value>,
}

impl ResponseEnvelope {
    pub fn success(msg: impl Into<String>, data: Value) -> Self {
        Self {
            code: 0,
            msg: msg.into(),
            data: Some(data),
        }
    }

    pub fn error(code: i64, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}
