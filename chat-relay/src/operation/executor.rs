//! Executor abstraction used by both transports

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::document::OperationKind;
use super::request::OperationRequest;
use super::response::OperationResponse;
use super::selection::{self, FieldSelection};
use crate::error::Result;
use crate::ids::SubscriberId;
use crate::pubsub::SubscriberChannel;

/// Request-scoped data handed to resolvers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationContext {
    /// Caller's user id (`X-User-ID`), when supplied
    pub user_id: Option<String>,
}

impl OperationContext {
    /// Context for a caller identified by `user_id`
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }
}

/// A validated operation ready to execute
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedOperation {
    /// Operation type
    pub kind: OperationKind,
    /// Operation name, if the document named it
    pub name: Option<String>,
    /// Root field being resolved
    pub field: String,
    /// Key the result is reported under (alias or field name)
    pub response_key: String,
    /// Arguments with variables substituted
    pub arguments: Map<String, Value>,
    /// Object type the root field resolves to; `None` for leaf fields
    pub object_type: Option<String>,
    /// Selections applied to the root field's value
    pub selection: Vec<FieldSelection>,
}

impl PreparedOperation {
    /// Whether this operation opens a subscription
    pub fn is_subscription(&self) -> bool {
        self.kind == OperationKind::Subscription
    }

    /// A string argument, or `""` when absent
    pub fn str_argument(&self, name: &str) -> &str {
        self.arguments
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Narrow a resolved root value to the selected fields
    pub fn project(&self, value: &Value) -> Value {
        selection::project(value, self.object_type.as_deref(), &self.selection)
    }
}

/// Runs operations against a schema
///
/// `prepare` validates once per request. Queries and mutations then go
/// through `execute`; subscriptions open a channel with `subscribe` and turn
/// each delivered event into a result with `resolve_event`.
#[async_trait]
pub trait OperationExecutor: Send + Sync + 'static {
    /// Event type delivered to subscriptions
    type Event: Send + Sync + 'static;

    /// Parse and validate a request
    ///
    /// Failures are [`crate::error::Error::ValidationError`]s.
    fn prepare(&self, request: &OperationRequest) -> Result<PreparedOperation>;

    /// Run a query or mutation to a single result
    async fn execute(&self, operation: &PreparedOperation, ctx: &OperationContext) -> OperationResponse;

    /// Open the event channel backing a subscription operation
    fn subscribe(
        &self,
        operation: &PreparedOperation,
        id: SubscriberId,
    ) -> Result<SubscriberChannel<Self::Event>>;

    /// Close a channel opened by [`OperationExecutor::subscribe`]
    fn unsubscribe(&self, id: &SubscriberId);

    /// Turn one delivered event into a result
    fn resolve_event(&self, operation: &PreparedOperation, event: &Self::Event) -> OperationResponse;
}
