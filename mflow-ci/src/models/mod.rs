//! Data types for mflow-ci

pub mod snapshots;

pub use snapshots::*;

/// Open key/value map describing the query that produced a snapshot
/// (keyword, source URL, requested count). Callers pull the fields they
/// know about; unknown fields are preserved for logging.
pub type RequestContext = serde_json::Map<String, serde_json::Value>;

/// Fetch a string field from a request context.
pub fn context_str<'a>(req: &'a RequestContext, key: &str) -> Option<&'a str> {
    req.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}
