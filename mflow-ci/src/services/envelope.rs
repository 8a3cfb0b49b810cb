//! Response envelope decoder
//!
//! The workflow endpoint wraps its result in a JSON-string-inside-JSON
//! envelope: the outer `data` field is a string which itself parses into
//! `{ resp_code, resp_data }`. Decoding failures are logged with a raw
//! payload excerpt and collapse to `None`; callers treat `None` as
//! "no data, already logged", never as a fault to propagate.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::services::workflow_client::RawEnvelope;

/// Decoded inner envelope
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    pub resp_code: i64,
    pub resp_data: T,
}

/// Shorten a raw payload for diagnostics
pub(crate) fn excerpt(raw: &str) -> String {
    const MAX: usize = 200;
    if raw.len() <= MAX {
        raw.to_string()
    } else {
        let mut end = MAX;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &raw[..end])
    }
}

/// Decode the nested payload of a raw envelope into a typed response.
pub fn decode_envelope<T: DeserializeOwned>(envelope: &RawEnvelope) -> Option<Decoded<T>> {
    let raw = match envelope.data.as_str() {
        Some(raw) => raw,
        None => {
            tracing::error!(
                data = %envelope.data,
                "Envelope payload field is not a string"
            );
            return None;
        }
    };

    if raw.is_empty() {
        tracing::error!("Envelope payload field is empty");
        return None;
    }

    let inner: Value = match serde_json::from_str(raw) {
        Ok(inner) => inner,
        Err(e) => {
            tracing::error!(
                error = %e,
                payload = %excerpt(raw),
                "Envelope payload is not valid JSON"
            );
            return None;
        }
    };

    let resp_code = inner.get("resp_code").and_then(Value::as_i64).unwrap_or(0);

    let resp_data = match inner.get("resp_data") {
        Some(resp_data) => resp_data.clone(),
        None => {
            tracing::error!(
                payload = %excerpt(raw),
                "Envelope payload is missing the resp_data field"
            );
            return None;
        }
    };

    match serde_json::from_value::<T>(resp_data) {
        Ok(resp_data) => Some(Decoded {
            resp_code,
            resp_data,
        }),
        Err(e) => {
            tracing::error!(
                error = %e,
                payload = %excerpt(raw),
                "Envelope resp_data does not match the expected shape"
            );
            None
        }
    }
}
