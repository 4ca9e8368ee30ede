//! HTTP routes
//!
//! `POST /graphql` serves both transports. Requests whose `Accept` header
//! names `text/event-stream` get a stream session; everything else runs once
//! and returns a single JSON body.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};

use crate::{
    error::{Error, Result},
    health,
    middleware::BearerAuth,
    operation::{OperationContext, OperationExecutor, OperationRequest, OperationResponse},
    sse::{self, Transport},
    state::AppState,
};

/// Path of the operation endpoint
pub const GRAPHQL_PATH: &str = "/graphql";

/// Build the application router with its state
///
/// Bearer authentication wraps every route; the middleware itself lets
/// `/health` and `/ready` through.
pub fn build(state: AppState) -> Router {
    let auth = BearerAuth::new(state.config().auth.token.clone());
    if auth.is_enabled() {
        tracing::info!("Bearer token authentication enabled");
    }

    Router::new()
        .route(GRAPHQL_PATH, post(graphql))
        .route("/health", get(health::health))
        .route("/ready", get(health::readiness))
        .layer(from_fn_with_state(auth, BearerAuth::middleware))
        .with_state(state)
}

async fn graphql(
    State(state): State<AppState>,
    Extension(ctx): Extension<OperationContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match Transport::negotiate(&headers) {
        Transport::EventStream => sse::respond(
            state.executor().clone(),
            &state.config().sse,
            state.shutdown().child_token(),
            body,
            ctx,
        ),
        Transport::Single => execute_single(&state, &body, &ctx).await.into_response(),
    }
}

async fn execute_single(
    state: &AppState,
    body: &[u8],
    ctx: &OperationContext,
) -> Result<Json<OperationResponse>> {
    let request = OperationRequest::from_slice(body)?;
    let operation = state.executor().prepare(&request)?;

    if operation.is_subscription() {
        return Err(Error::BadRequest(
            "subscriptions require Accept: text/event-stream".to_string(),
        ));
    }

    Ok(Json(state.executor().execute(&operation, ctx).await))
}
