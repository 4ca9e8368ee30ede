//! Operation results

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorEntry;

/// One result of an operation: `{"data": …, "errors": […]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    /// Field results keyed by response key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Errors raised while executing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorEntry>,
}

impl OperationResponse {
    /// A successful result for one root field
    pub fn field(key: impl Into<String>, value: Value) -> Self {
        let mut data = Map::new();
        data.insert(key.into(), value);

        Self {
            data: Some(Value::Object(data)),
            errors: Vec::new(),
        }
    }

    /// A result carrying only errors
    pub fn errors(errors: Vec<ErrorEntry>) -> Self {
        Self { data: None, errors }
    }

    /// A result carrying a single error
    pub fn error(entry: ErrorEntry) -> Self {
        Self::errors(vec![entry])
    }

    /// Neither data nor errors; such results are never written to a stream
    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_response_shape() {
        let response = OperationResponse::field("login", json!({"id": "usr_1"}));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"data": {"login": {"id": "usr_1"}}})
        );
        assert!(!response.is_empty());
    }

    #[test]
    fn test_error_response_shape() {
        let response = OperationResponse::error(ErrorEntry::new("user not found").at("sendMessage"));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"errors": [{"message": "user not found", "path": ["sendMessage"]}]})
        );
    }

    #[test]
    fn test_empty() {
        assert!(OperationResponse::default().is_empty());
    }
}
