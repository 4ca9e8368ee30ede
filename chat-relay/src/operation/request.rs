//! Operation request bodies

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// JSON body of an operation request
///
/// ```json
/// {"query": "subscription { messageAdded { id } }", "operationName": null, "variables": {}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    /// Operation document
    #[serde(default)]
    pub query: String,

    /// Which operation of the document to run
    #[serde(default)]
    pub operation_name: Option<String>,

    /// Variable values referenced by the document
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
}

impl OperationRequest {
    /// Build a request from a document alone
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Set one variable
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables
            .get_or_insert_with(Map::new)
            .insert(name.into(), value.into());
        self
    }

    /// Set the operation name
    #[must_use]
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Decode a request body
    ///
    /// The body must be JSON and carry a non-blank `query`.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let request: Self = serde_json::from_slice(body).map_err(|e| Error::BadRequest(e.to_string()))?;

        if request.query.trim().is_empty() {
            return Err(Error::BadRequest("empty GraphQL query".to_string()));
        }

        Ok(request)
    }

    /// Look up a variable value
    pub fn variable_value(&self, name: &str) -> Option<&Value> {
        self.variables.as_ref().and_then(|vars| vars.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_full_body() {
        let body = br#"{"query":"mutation Send($content: String!) { sendMessage(content: $content) { id } }","operationName":"Send","variables":{"content":"hi"}}"#;
        let request = OperationRequest::from_slice(body).unwrap();

        assert_eq!(request.operation_name.as_deref(), Some("Send"));
        assert_eq!(request.variable_value("content"), Some(&json!("hi")));
    }

    #[test]
    fn test_decode_minimal_body() {
        let request = OperationRequest::from_slice(br#"{"query":"{ messages { id } }"}"#).unwrap();
        assert!(request.operation_name.is_none());
        assert!(request.variable_value("anything").is_none());
    }

    #[test]
    fn test_blank_query_rejected() {
        for body in [&br#"{"query":"   "}"#[..], br#"{}"#, br#"{"variables":{}}"#] {
            match OperationRequest::from_slice(body) {
                Err(Error::BadRequest(msg)) => assert_eq!(msg, "empty GraphQL query"),
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(matches!(
            OperationRequest::from_slice(b"not json"),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            OperationRequest::from_slice(br#"{"query": 42}"#),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_builder() {
        let request = OperationRequest::new("mutation { login(nickname: $n) { id } }")
            .operation_name("Login")
            .variable("n", "alice");

        assert_eq!(request.variable_value("n"), Some(&json!("alice")));
        assert_eq!(request.operation_name.as_deref(), Some("Login"));
    }
}
