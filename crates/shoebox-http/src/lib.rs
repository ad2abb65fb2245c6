//! S3 HTTP routing, request bodies, response serialization and the hyper service.
//!
//! This crate is the protocol dispatcher of Shoebox. It handles:
//!
//! - **Routing** ([`router`]): strips the legacy URI prefix and maps method,
//!   path, query parameters and headers onto an [`S3Operation`]. Bucket
//!   sub-resources (`?acl`, `?cors`, `?lifecycle`, ...) are looked up in an
//!   explicit registry before the default bucket operations.
//!
//! - **Request bodies** ([`request`]): every request body is exposed as a
//!   stream of `Bytes` chunks; `aws-chunked` framing is decoded on the fly by
//!   [`codec`].
//!
//! - **Responses** ([`response`], [`body`]): XML documents, empty responses,
//!   object bodies streamed from disk and `<Error>` documents.
//!
//! - **Dispatch** ([`dispatch`]): the [`S3Handler`] trait the server binary
//!   implements on top of the store.
//!
//! - **Service** ([`service`]): [`S3HttpService`], a hyper `Service` tying
//!   routing, authentication and dispatch together.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> S3HttpService (hyper Service)
//!     -> Health check / CORS interception
//!     -> S3Router (legacy prefix + operation identification)
//!     -> Signature verification (legacy, v4, presigned)
//!     -> Streaming body (aws-chunked decoded)
//!     -> S3Handler::handle_operation
//!     -> Common response headers (x-amz-request-id, Server, CORS)
//!   <- HTTP Response
//! ```
//!
//! [`S3Operation`]: shoebox_model::S3Operation

// S3Error is returned by value on every request path; boxing it buys nothing here.
#![allow(clippy::result_large_err)]

pub mod body;
pub mod codec;
pub mod dispatch;
pub mod request;
pub mod response;
pub mod router;
pub mod service;

pub use body::S3ResponseBody;
pub use dispatch::{CallSummary, Caller, S3Handler};
pub use request::RequestBody;
pub use router::{RoutingContext, S3Router, SubResource};
pub use service::{S3HttpConfig, S3HttpService};
