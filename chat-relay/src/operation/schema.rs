//! Chat schema
//!
//! ```graphql
//! type Query        { messages: [Message!]! }
//! type Mutation     { login(nickname: String!): User!  sendMessage(content: String!): Message! }
//! type Subscription { messageAdded: Message! }
//!
//! type User    { id: ID!  nickname: String! }
//! type Message { id: ID!  user: User!  content: String!  createdAt: String! }
//! ```
//!
//! Root fields resolve to whole objects, which are then narrowed to the
//! operation's selection. Each operation selects exactly one root field.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use super::document::{is_included, Document, Field, InputValue, OperationKind, Selection};
use super::executor::{OperationContext, OperationExecutor, PreparedOperation};
use super::request::OperationRequest;
use super::response::OperationResponse;
use super::selection::{FieldSelection, TYPENAME};
use crate::chat::{Message, MessageService, UserService};
use crate::error::{Error, Result};
use crate::ids::SubscriberId;
use crate::pubsub::SubscriberChannel;

#[derive(Debug, Clone, Copy)]
enum FieldType {
    /// Leaf with its declared type
    Scalar(&'static str),
    /// Non-null object type
    Object(&'static str),
}

struct ObjectType {
    name: &'static str,
    fields: &'static [(&'static str, FieldType)],
}

impl ObjectType {
    fn field(&self, name: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, ty)| *ty)
    }
}

const OBJECT_TYPES: &[ObjectType] = &[
    ObjectType {
        name: "User",
        fields: &[
            ("id", FieldType::Scalar("ID!")),
            ("nickname", FieldType::Scalar("String!")),
        ],
    },
    ObjectType {
        name: "Message",
        fields: &[
            ("id", FieldType::Scalar("ID!")),
            ("user", FieldType::Object("User")),
            ("content", FieldType::Scalar("String!")),
            ("createdAt", FieldType::Scalar("String!")),
        ],
    },
];

fn object_type(name: &str) -> Option<&'static ObjectType> {
    OBJECT_TYPES.iter().find(|ty| ty.name == name)
}

struct FieldSpec {
    kind: OperationKind,
    name: &'static str,
    /// Required `String!` arguments
    arguments: &'static [&'static str],
    /// Object type of the result
    returns: &'static str,
    /// Declared result type, for messages
    type_name: &'static str,
}

const FIELDS: &[FieldSpec] = &[
    FieldSpec {
        kind: OperationKind::Query,
        name: "messages",
        arguments: &[],
        returns: "Message",
        type_name: "[Message!]!",
    },
    FieldSpec {
        kind: OperationKind::Mutation,
        name: "login",
        arguments: &["nickname"],
        returns: "User",
        type_name: "User!",
    },
    FieldSpec {
        kind: OperationKind::Mutation,
        name: "sendMessage",
        arguments: &["content"],
        returns: "Message",
        type_name: "Message!",
    },
    FieldSpec {
        kind: OperationKind::Subscription,
        name: "messageAdded",
        arguments: &[],
        returns: "Message",
        type_name: "Message!",
    },
];

/// Executor for the chat schema
#[derive(Clone)]
pub struct ChatExecutor {
    users: UserService,
    messages: MessageService,
}

impl ChatExecutor {
    /// Create an executor over the chat services
    pub fn new(users: UserService, messages: MessageService) -> Self {
        Self { users, messages }
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ValidationError(message.into())
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn check_string(input: &InputValue, value: Value) -> Result<Value> {
    match value {
        Value::String(_) => Ok(value),
        Value::Null => match input {
            InputValue::Variable(name) => Err(invalid(format!(
                "Variable \"${}\" of required type \"String!\" was not provided.",
                name
            ))),
            _ => Err(invalid("Expected value of type \"String!\", found null.")),
        },
        other => Err(invalid(format!(
            "String cannot represent a non string value: {}",
            other
        ))),
    }
}

fn leaf_with_selection(field: &str, type_name: &str) -> Error {
    invalid(format!(
        "Field \"{}\" must not have a selection since type \"{}\" has no subfields.",
        field, type_name
    ))
}

fn missing_selection(field: &str, type_name: &str) -> Error {
    invalid(format!(
        "Field \"{}\" of type \"{}\" must have a selection of subfields. Did you mean \"{} {{ ... }}\"?",
        field, type_name, field
    ))
}

/// Resolves a document's selections against the object types
struct SelectionResolver<'a> {
    document: &'a Document,
    variables: Option<&'a Map<String, Value>>,
}

impl SelectionResolver<'_> {
    fn resolve(&self, ty: &ObjectType, selections: &[Selection]) -> Result<Vec<FieldSelection>> {
        let mut out = Vec::new();
        self.collect(ty, selections, &mut out, &mut Vec::new())?;
        Ok(out)
    }

    fn collect(
        &self,
        ty: &ObjectType,
        selections: &[Selection],
        out: &mut Vec<FieldSelection>,
        spreads: &mut Vec<String>,
    ) -> Result<()> {
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    if is_included(&field.directives, self.variables) {
                        let selected = self.field(ty, field, spreads)?;
                        merge(out, selected)?;
                    }
                }
                Selection::InlineFragment {
                    type_condition,
                    directives,
                    selection_set,
                } => {
                    let applies = match type_condition {
                        Some(name) => name == ty.name,
                        None => true,
                    };
                    if applies && is_included(directives, self.variables) {
                        self.collect(ty, selection_set, out, spreads)?;
                    }
                }
                Selection::FragmentSpread { name, directives } => {
                    let fragment = self
                        .document
                        .fragment(name)
                        .ok_or_else(|| invalid(format!("Unknown fragment \"{}\".", name)))?;

                    if spreads.contains(name) {
                        return Err(invalid(format!(
                            "Cannot spread fragment \"{}\" within itself.",
                            name
                        )));
                    }

                    if fragment.type_condition == ty.name && is_included(directives, self.variables) {
                        spreads.push(name.clone());
                        self.collect(ty, &fragment.selection_set, out, spreads)?;
                        spreads.pop();
                    }
                }
            }
        }

        Ok(())
    }

    fn field(&self, ty: &ObjectType, field: &Field, spreads: &mut Vec<String>) -> Result<FieldSelection> {
        if let Some((unknown, _)) = field.arguments.first() {
            return Err(invalid(format!(
                "Unknown argument \"{}\" on field \"{}.{}\".",
                unknown, ty.name, field.name
            )));
        }

        if field.name == TYPENAME {
            if !field.selection_set.is_empty() {
                return Err(leaf_with_selection(TYPENAME, "String!"));
            }
            return Ok(FieldSelection::leaf(field.response_key(), TYPENAME));
        }

        match ty.field(&field.name) {
            None => Err(invalid(format!(
                "Cannot query field \"{}\" on type \"{}\".",
                field.name, ty.name
            ))),
            Some(FieldType::Scalar(type_name)) => {
                if !field.selection_set.is_empty() {
                    return Err(leaf_with_selection(&field.name, type_name));
                }
                Ok(FieldSelection::leaf(field.response_key(), &field.name))
            }
            Some(FieldType::Object(name)) => {
                if field.selection_set.is_empty() {
                    return Err(missing_selection(&field.name, &format!("{}!", name)));
                }
                let child = object_type(name)
                    .ok_or_else(|| Error::Internal(format!("object type {} is not defined", name)))?;

                let mut selection = Vec::new();
                self.collect(child, &field.selection_set, &mut selection, spreads)?;
                Ok(FieldSelection::object(field.response_key(), &field.name, name, selection))
            }
        }
    }
}

/// Add `selected` to `out`, folding it into an earlier selection with the same key
fn merge(out: &mut Vec<FieldSelection>, selected: FieldSelection) -> Result<()> {
    let Some(existing) = out
        .iter_mut()
        .find(|existing| existing.response_key == selected.response_key)
    else {
        out.push(selected);
        return Ok(());
    };

    if existing.field != selected.field {
        return Err(invalid(format!(
            "Fields \"{}\" conflict because \"{}\" and \"{}\" are different fields. Use different aliases on the fields to fetch both if this was intentional.",
            selected.response_key, existing.field, selected.field
        )));
    }

    for child in selected.selection {
        merge(&mut existing.selection, child)?;
    }
    Ok(())
}

#[async_trait]
impl OperationExecutor for ChatExecutor {
    type Event = Message;

    fn prepare(&self, request: &OperationRequest) -> Result<PreparedOperation> {
        let document = Document::parse(&request.query).map_err(|e| invalid(e.to_string()))?;
        let operation = document
            .select(request.operation_name.as_deref())
            .map_err(|e| invalid(e.to_string()))?;

        let root = operation.root_field().map_err(|e| invalid(e.to_string()))?;
        let root_type = operation.kind.root_type();
        let variables = request.variables.as_ref();

        if root.name == TYPENAME && operation.kind != OperationKind::Subscription {
            if !root.selection_set.is_empty() {
                return Err(leaf_with_selection(TYPENAME, "String!"));
            }
            return Ok(PreparedOperation {
                kind: operation.kind,
                name: operation.name.clone(),
                field: TYPENAME.to_string(),
                response_key: root.response_key().to_string(),
                arguments: Map::new(),
                object_type: None,
                selection: Vec::new(),
            });
        }

        let spec = FIELDS
            .iter()
            .find(|spec| spec.kind == operation.kind && spec.name == root.name)
            .ok_or_else(|| {
                invalid(format!(
                    "Cannot query field \"{}\" on type \"{}\".",
                    root.name, root_type
                ))
            })?;

        if let Some((unknown, _)) = root
            .arguments
            .iter()
            .find(|(name, _)| !spec.arguments.contains(&name.as_str()))
        {
            return Err(invalid(format!(
                "Unknown argument \"{}\" on field \"{}.{}\".",
                unknown, root_type, root.name
            )));
        }

        let mut arguments = Map::new();
        for &name in spec.arguments {
            let input = root.argument(name).ok_or_else(|| {
                invalid(format!(
                    "Field \"{}\" argument \"{}\" of type \"String!\" is required, but it was not provided.",
                    root.name, name
                ))
            })?;

            let value = check_string(input, input.resolve(variables))?;
            arguments.insert(name.to_string(), value);
        }

        if root.selection_set.is_empty() {
            return Err(missing_selection(&root.name, spec.type_name));
        }
        let returns = object_type(spec.returns)
            .ok_or_else(|| Error::Internal(format!("object type {} is not defined", spec.returns)))?;
        let selection = SelectionResolver {
            document: &document,
            variables,
        }
        .resolve(returns, &root.selection_set)?;

        Ok(PreparedOperation {
            kind: operation.kind,
            name: operation.name.clone(),
            field: root.name.clone(),
            response_key: root.response_key().to_string(),
            arguments,
            object_type: Some(spec.returns.to_string()),
            selection,
        })
    }

    async fn execute(&self, operation: &PreparedOperation, ctx: &OperationContext) -> OperationResponse {
        let result = match (operation.kind, operation.field.as_str()) {
            (OperationKind::Query | OperationKind::Mutation, TYPENAME) => {
                Ok(Value::String(operation.kind.root_type().to_string()))
            }
            (OperationKind::Query, "messages") => self
                .messages
                .messages()
                .await
                .and_then(|messages| to_value(&messages)),
            (OperationKind::Mutation, "login") => self
                .users
                .login(operation.str_argument("nickname"))
                .await
                .and_then(|user| to_value(&user)),
            (OperationKind::Mutation, "sendMessage") => match ctx.user_id.as_deref() {
                Some(user_id) => self
                    .messages
                    .send_message(user_id, operation.str_argument("content"))
                    .await
                    .and_then(|message| to_value(&message)),
                None => Err(Error::Unauthorized("not authenticated".to_string())),
            },
            (OperationKind::Subscription, _) => Err(Error::BadRequest(
                "subscriptions require Accept: text/event-stream".to_string(),
            )),
            (kind, field) => Err(invalid(format!(
                "Cannot query field \"{}\" on type \"{}\".",
                field,
                kind.root_type()
            ))),
        };

        match result {
            Ok(value) => OperationResponse::field(operation.response_key.clone(), operation.project(&value)),
            Err(e) => {
                tracing::debug!(field = %operation.field, error = %e, "Operation failed");
                OperationResponse::error(e.to_entry().at(operation.response_key.clone()))
            }
        }
    }

    fn subscribe(&self, operation: &PreparedOperation, id: SubscriberId) -> Result<SubscriberChannel<Message>> {
        if !operation.is_subscription() {
            return Err(Error::BadRequest(format!(
                "{} operations do not open a subscription",
                operation.kind
            )));
        }

        Ok(self.messages.subscribe(id))
    }

    fn unsubscribe(&self, id: &SubscriberId) {
        self.messages.unsubscribe(id)
    }

    fn resolve_event(&self, operation: &PreparedOperation, event: &Message) -> OperationResponse {
        match to_value(event) {
            Ok(value) => OperationResponse::field(operation.response_key.clone(), operation.project(&value)),
            Err(e) => OperationResponse::error(e.to_entry().at(operation.response_key.clone())),
        }
    }
}
