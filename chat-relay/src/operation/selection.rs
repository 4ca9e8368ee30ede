//! Resolved selections and result projection
//!
//! Executors resolve whole objects; the response carries only the fields
//! the operation selected, under their response keys.

use serde_json::{Map, Value};

/// Introspection field naming an object's type
pub const TYPENAME: &str = "__typename";

/// A field selection after fragments and directives have been applied
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    /// Key the value is reported under (alias or field name)
    pub response_key: String,
    /// Field read from the resolved object
    pub field: String,
    /// Object type the field resolves to; `None` for leaf fields
    pub object_type: Option<String>,
    /// Sub-selections of an object field
    pub selection: Vec<FieldSelection>,
}

impl FieldSelection {
    /// A leaf selection of `field` reported under `response_key`
    pub fn leaf(response_key: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            response_key: response_key.into(),
            field: field.into(),
            object_type: None,
            selection: Vec::new(),
        }
    }

    /// An object selection of `field` with its sub-selections
    pub fn object(
        response_key: impl Into<String>,
        field: impl Into<String>,
        object_type: impl Into<String>,
        selection: Vec<FieldSelection>,
    ) -> Self {
        Self {
            response_key: response_key.into(),
            field: field.into(),
            object_type: Some(object_type.into()),
            selection,
        }
    }
}

/// Narrow `value` to `selection`
///
/// Lists are projected element by element and `null` stays `null`. An empty
/// selection leaves the value untouched.
pub fn project(value: &Value, object_type: Option<&str>, selection: &[FieldSelection]) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| project(item, object_type, selection))
                .collect(),
        ),
        Value::Object(fields) if !selection.is_empty() => {
            let mut out = Map::new();
            for selected in selection {
                out.insert(selected.response_key.clone(), project_field(fields, object_type, selected));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn project_field(fields: &Map<String, Value>, object_type: Option<&str>, selected: &FieldSelection) -> Value {
    if selected.field == TYPENAME {
        return object_type.map_or(Value::Null, |name| Value::String(name.to_string()));
    }

    let value = fields.get(&selected.field).unwrap_or(&Value::Null);
    if selected.selection.is_empty() {
        value.clone()
    } else {
        project(value, selected.object_type.as_deref(), &selected.selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message() -> Value {
        json!({
            "id": "msg_1",
            "content": "hi",
            "createdAt": "2024-01-01T00:00:00Z",
            "user": {"id": "usr_1", "nickname": "alice"},
        })
    }

    #[test]
    fn test_projects_selected_fields_with_aliases() {
        let selection = vec![
            FieldSelection::leaf("id", "id"),
            FieldSelection::object(
                "author",
                "user",
                "User",
                vec![FieldSelection::leaf("name", "nickname")],
            ),
        ];

        assert_eq!(
            project(&message(), Some("Message"), &selection),
            json!({"id": "msg_1", "author": {"name": "alice"}})
        );
    }

    #[test]
    fn test_typename_at_each_level() {
        let selection = vec![
            FieldSelection::leaf(TYPENAME, TYPENAME),
            FieldSelection::object(
                "user",
                "user",
                "User",
                vec![FieldSelection::leaf("kind", TYPENAME)],
            ),
        ];

        assert_eq!(
            project(&message(), Some("Message"), &selection),
            json!({"__typename": "Message", "user": {"kind": "User"}})
        );
    }

    #[test]
    fn test_lists_and_nulls() {
        let selection = vec![FieldSelection::leaf("content", "content")];
        let list = json!([message(), null, message()]);

        assert_eq!(
            project(&list, Some("Message"), &selection),
            json!([{"content": "hi"}, null, {"content": "hi"}])
        );
    }

    #[test]
    fn test_empty_selection_keeps_value() {
        assert_eq!(project(&message(), Some("Message"), &[]), message());
        assert_eq!(project(&json!("Query"), None, &[]), json!("Query"));
    }
}
