//! Operation requests, documents and execution

mod document;
mod executor;
mod request;
mod response;
mod schema;
mod selection;

pub use document::{
    is_included, Directive, Document, DocumentError, Field, FragmentDefinition, InputValue,
    OperationDefinition, OperationKind, Selection,
};
pub use executor::{OperationContext, OperationExecutor, PreparedOperation};
pub use request::OperationRequest;
pub use response::OperationResponse;
pub use schema::ChatExecutor;
pub use selection::{project, FieldSelection, TYPENAME};
