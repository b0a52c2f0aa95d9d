//! Canonical JSON encoder.
//!
//! Every decoded JSON value that reaches the target goes through exactly one
//! [`JsonEncoder`]. The normalizer holds it as an injected strategy; the
//! process-wide default is [`SerdeJsonEncoder`].

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

/// Strategy for turning a decoded JSON value into JSON text.
pub trait JsonEncoder: Send + Sync + fmt::Debug {
    /// Encoder name, for logs.
    fn name(&self) -> &'static str;

    /// Encode `value` once. Errors carry a human-readable reason.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, String>;
}

/// Compact serde_json encoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerdeJsonEncoder;

impl JsonEncoder for SerdeJsonEncoder {
    fn name(&self) -> &'static str {
        "serde_json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, String> {
        serde_json::to_vec(value).map_err(|e| e.to_string())
    }
}

/// The process-wide canonical encoder.
pub fn canonical_encoder() -> Arc<dyn JsonEncoder> {
    static ENCODER: OnceLock<Arc<dyn JsonEncoder>> = OnceLock::new();
    ENCODER
        .get_or_init(|| Arc::new(SerdeJsonEncoder))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serde_encoder_is_compact() {
        let out = SerdeJsonEncoder
            .encode(&json!({"quote": "said \"hello\"", "n": [1, 2]}))
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains(": "));
        assert!(text.contains(r#""said \"hello\"""#));
    }

    #[test]
    fn test_serde_encoder_keeps_unicode_unescaped() {
        let out = SerdeJsonEncoder.encode(&json!("São Paulo 🏳️‍🌈")).unwrap();
        assert_eq!(out, "\"São Paulo 🏳️‍🌈\"".as_bytes());
    }

    #[test]
    fn test_canonical_encoder_is_shared() {
        let a = canonical_encoder();
        let b = canonical_encoder();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "serde_json");
    }
}
