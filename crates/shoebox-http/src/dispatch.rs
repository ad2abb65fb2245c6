//! S3 operation dispatch: the boundary between the HTTP layer and the store.
//!
//! The service resolves the operation and the caller's identity, then hands
//! the request to an [`S3Handler`]. After the response is built the handler
//! is told how the call went through [`S3Handler::observe`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use shoebox_model::S3Operation;
use shoebox_model::error::S3Error;

use crate::body::S3ResponseBody;
use crate::request::RequestBody;
use crate::router::RoutingContext;

/// Who sent the request, as established by signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// The request carried a signature that verified.
    Signed {
        /// Access key the signature was made with.
        access_key_id: String,
    },
    /// No signature was supplied.
    Anonymous,
    /// No signature was supplied, but the bypass query parameter was.
    Bypass,
}

impl Caller {
    /// Whether the caller proved knowledge of a secret.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Signed { .. })
    }
}

/// How a call ended, reported to [`S3Handler::observe`].
#[derive(Debug)]
pub struct CallSummary<'a> {
    /// The routed operation; `None` when the request could not be routed.
    pub operation: Option<S3Operation>,
    /// Routing details; `None` when the request could not be routed.
    pub ctx: Option<&'a RoutingContext>,
    /// Response status.
    pub status: http::StatusCode,
    /// The error answered, if any.
    pub error: Option<&'a S3Error>,
    /// Time spent handling the request.
    pub elapsed: Duration,
}

/// Future returned by [`S3Handler::handle_operation`].
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<http::Response<S3ResponseBody>, S3Error>> + Send>>;

/// Trait that the business logic provider must implement.
pub trait S3Handler: Send + Sync + 'static {
    /// Handle an S3 operation and produce an HTTP response.
    ///
    /// The implementor receives the identified operation, the raw request
    /// parts, the streamed body and the verified caller, and must decide
    /// whether the caller may access the resource.
    fn handle_operation(
        &self,
        op: S3Operation,
        parts: http::request::Parts,
        body: RequestBody,
        ctx: RoutingContext,
        caller: Caller,
    ) -> HandlerFuture;

    /// Called once per request after its response is known, including
    /// requests that failed to route. Health checks and CORS preflights are
    /// not reported.
    fn observe(&self, _call: &CallSummary<'_>) {}
}

/// Dispatch a routed S3 request to the handler.
pub async fn dispatch_operation<H: S3Handler>(
    handler: &H,
    parts: http::request::Parts,
    body: RequestBody,
    ctx: RoutingContext,
    caller: Caller,
) -> Result<http::Response<S3ResponseBody>, S3Error> {
    let op = ctx.operation;
    tracing::debug!(
        operation = %op,
        bucket = ?ctx.bucket,
        key = ?ctx.key,
        ?caller,
        "dispatching S3 operation"
    );
    handler.handle_operation(op, parts, body, ctx, caller).await
}

/// A handler that answers `NotImplemented` for every operation.
///
/// Useful for exercising routing and authentication in isolation.
#[derive(Debug, Clone, Default)]
pub struct NotImplementedHandler;

impl S3Handler for NotImplementedHandler {
    fn handle_operation(
        &self,
        op: S3Operation,
        _parts: http::request::Parts,
        _body: RequestBody,
        _ctx: RoutingContext,
        _caller: Caller,
    ) -> HandlerFuture {
        Box::pin(async move { Err(S3Error::not_implemented(op.as_str())) })
    }
}
