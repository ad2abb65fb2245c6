//! The main S3 HTTP service implementing hyper's `Service` trait.
//!
//! [`S3HttpService`] ties together routing, authentication, dispatch, and response
//! serialization into a single hyper-compatible service. It handles:
//!
//! 1. Health check interception (`GET /_health`)
//! 2. CORS preflight requests (`OPTIONS`)
//! 3. S3 request routing via [`S3Router`]
//! 4. Signature verification (legacy, v4 and their presigned forms)
//! 5. Request body streaming with aws-chunked decoding
//! 6. Operation dispatch to the [`S3Handler`]
//! 7. Common response headers (`x-amz-request-id`, `Server`, CORS)
//! 8. Error response formatting

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::HeaderValue;
use hyper::body::Incoming;
use hyper::service::Service;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shoebox_auth::{AuthError, CredentialProvider, authenticate};
use shoebox_model::error::{S3Error, S3ErrorCode};

use crate::body::S3ResponseBody;
use crate::dispatch::{CallSummary, Caller, S3Handler, dispatch_operation};
use crate::request::body_stream;
use crate::response::error_to_response;
use crate::router::{RoutingContext, S3Router};

/// Value of the `Server` response header.
pub const SERVER_NAME: &str = "Shoebox";

/// Health probe path, also answered under the legacy prefix. Bucket names
/// never start with `_`, so no bucket listing is shadowed.
pub const HEALTH_PATH: &str = "/_health";

/// Configuration for the S3 HTTP service.
#[derive(Clone, Default)]
pub struct S3HttpConfig {
    /// Path prefix accepted in front of every S3 path, e.g. `/s3`.
    pub legacy_prefix: Option<String>,
    /// Credentials used to verify signatures. `None` disables verification
    /// and every caller is treated as unsigned.
    pub credential_provider: Option<Arc<dyn CredentialProvider>>,
}

impl std::fmt::Debug for S3HttpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3HttpConfig")
            .field("legacy_prefix", &self.legacy_prefix)
            .field(
                "credential_provider",
                &self.credential_provider.as_ref().map(|_| "..."),
            )
            .finish()
    }
}

/// The S3 HTTP service that implements hyper's `Service` trait.
///
/// # Type Parameters
///
/// - `H`: The business logic handler implementing [`S3Handler`].
#[derive(Debug)]
pub struct S3HttpService<H: S3Handler> {
    handler: Arc<H>,
    router: S3Router,
    config: Arc<S3HttpConfig>,
}

impl<H: S3Handler> S3HttpService<H> {
    /// Create a new S3 HTTP service with the given handler and configuration.
    #[must_use]
    pub fn new(handler: H, config: S3HttpConfig) -> Self {
        Self::from_shared(Arc::new(handler), config)
    }

    /// Create a new S3 HTTP service from an `Arc<H>` handler and configuration.
    #[must_use]
    pub fn from_shared(handler: Arc<H>, config: S3HttpConfig) -> Self {
        let router = S3Router::new(config.legacy_prefix.as_deref());
        Self {
            handler,
            router,
            config: Arc::new(config),
        }
    }

    /// The handler requests are dispatched to.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Process one request to completion.
    ///
    /// Accepts any body type so that tests can drive the service with
    /// in-memory bodies.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<S3ResponseBody>
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let request_id = Uuid::new_v4().simple().to_string().to_uppercase();
        let response = self.process_request(req, &request_id).await;
        add_common_headers(response, &request_id)
    }

    async fn process_request<B>(
        &self,
        req: http::Request<B>,
        request_id: &str,
    ) -> http::Response<S3ResponseBody>
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let started = Instant::now();
        let method = req.method().clone();
        let uri = req.uri().clone();
        debug!(%method, %uri, request_id, "processing S3 request");

        // 1. Health check interception.
        if is_health_check(&method, self.router.strip_prefix(uri.path())) {
            return health_check_response();
        }

        // 2. CORS preflight.
        if method == http::Method::OPTIONS {
            return cors_preflight_response();
        }

        // 3. Route the request.
        let ctx = match self.router.resolve(&req) {
            Ok(ctx) => ctx,
            Err(err) => {
                warn!(%method, %uri, error = %err, request_id, "failed to route S3 request");
                let response = error_to_response(&err, request_id);
                self.handler.observe(&CallSummary {
                    operation: None,
                    ctx: None,
                    status: response.status(),
                    error: Some(&err),
                    elapsed: started.elapsed(),
                });
                return response;
            }
        };

        info!(
            operation = %ctx.operation,
            bucket = ?ctx.bucket,
            key = ?ctx.key,
            request_id,
            "routed S3 request"
        );

        // 4. Authentication.
        let (parts, body) = req.into_parts();
        let result = match self.identify_caller(&parts, &ctx) {
            Ok(caller) => {
                // 5. Stream the body and dispatch.
                let body = body_stream(&parts.headers, body);
                dispatch_operation(self.handler.as_ref(), parts, body, ctx.clone(), caller).await
            }
            Err(err) => Err(err),
        };

        let (response, error) = match result {
            Ok(response) => (response, None),
            Err(mut err) => {
                if err.resource.is_none() {
                    err.resource = Some(ctx.resource());
                }
                if err.is_rejection() {
                    warn!(
                        code = %err.code,
                        resource = ?err.resource,
                        request_id,
                        "request rejected"
                    );
                } else {
                    debug!(error = %err, request_id, "S3 operation returned error");
                }
                (error_to_response(&err, request_id), Some(err))
            }
        };

        self.handler.observe(&CallSummary {
            operation: Some(ctx.operation),
            ctx: Some(&ctx),
            status: response.status(),
            error: error.as_ref(),
            elapsed: started.elapsed(),
        });
        response
    }

    /// Verify any signature the request carries.
    fn identify_caller(
        &self,
        parts: &http::request::Parts,
        ctx: &RoutingContext,
    ) -> Result<Caller, S3Error> {
        let unsigned = if ctx.bypass_requested() {
            Caller::Bypass
        } else {
            Caller::Anonymous
        };
        let Some(provider) = self.config.credential_provider.as_deref() else {
            return Ok(unsigned);
        };

        match authenticate(parts, provider, self.router.legacy_prefix()) {
            Ok(Some(result)) => Ok(Caller::Signed {
                access_key_id: result.access_key_id,
            }),
            Ok(None) => Ok(unsigned),
            Err(e) => Err(auth_error_to_s3(&e)),
        }
    }
}

impl<H: S3Handler> Clone for S3HttpService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            router: self.router.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<H: S3Handler> Service<http::Request<Incoming>> for S3HttpService<H> {
    type Response = http::Response<S3ResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

/// Map an authentication failure onto the wire error.
fn auth_error_to_s3(err: &AuthError) -> S3Error {
    if err.is_signature_mismatch() {
        S3Error::signature_does_not_match(
            "The request signature we calculated does not match the signature you provided.",
        )
    } else {
        S3Error::with_message(S3ErrorCode::AccessDenied, err.to_string())
    }
}

/// Check if the request is a health check probe.
fn is_health_check(method: &http::Method, path: &str) -> bool {
    *method == http::Method::GET && path == HEALTH_PATH
}

/// Produce a health check response.
fn health_check_response() -> http::Response<S3ResponseBody> {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
        .body(S3ResponseBody::from_string(
            r#"{"status":"running","service":"s3"}"#,
        ))
        .expect("static health response should be valid")
}

/// Produce a CORS preflight response.
fn cors_preflight_response() -> http::Response<S3ResponseBody> {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header(
            "Access-Control-Allow-Methods",
            "GET, PUT, POST, DELETE, HEAD, OPTIONS",
        )
        .header(
            "Access-Control-Allow-Headers",
            "*, Authorization, Content-Type, Content-MD5, x-amz-*",
        )
        .header("Access-Control-Max-Age", "86400")
        .body(S3ResponseBody::empty())
        .expect("static CORS response should be valid")
}

/// Add common response headers to every S3 response.
fn add_common_headers(
    mut response: http::Response<S3ResponseBody>,
    request_id: &str,
) -> http::Response<S3ResponseBody> {
    let headers = response.headers_mut();

    if let Ok(hv) = HeaderValue::from_str(request_id) {
        headers.insert("x-amz-request-id", hv.clone());
        headers.insert("x-amz-id-2", hv);
    }
    headers.insert("Server", HeaderValue::from_static(SERVER_NAME));
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Expose-Headers",
        HeaderValue::from_static("x-amz-request-id, x-amz-id-2, ETag, Content-Range"),
    );

    response
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http_body_util::{BodyExt, Full};
    use shoebox_auth::StaticCredentialProvider;
    use shoebox_auth::sigv4::sign_request;
    use shoebox_model::S3Operation;

    use super::*;
    use crate::dispatch::{HandlerFuture, NotImplementedHandler};
    use crate::request::{RequestBody, collect_body};
    use crate::response::empty_response;

    const ACCESS_KEY: &str = "AKIDEXAMPLE";
    const SECRET_KEY: &str = "secret";

    /// Echoes the request body and remembers every observed call.
    #[derive(Debug, Default)]
    struct RecordingHandler {
        calls: Mutex<Vec<(Option<S3Operation>, u16, Option<String>)>>,
        callers: Mutex<Vec<Caller>>,
    }

    impl S3Handler for RecordingHandler {
        fn handle_operation(
            &self,
            _op: S3Operation,
            _parts: http::request::Parts,
            body: RequestBody,
            _ctx: RoutingContext,
            caller: Caller,
        ) -> HandlerFuture {
            self.callers.lock().unwrap().push(caller);
            Box::pin(async move {
                let data = collect_body(body).await?;
                let mut resp = empty_response(http::StatusCode::OK);
                *resp.body_mut() = S3ResponseBody::from_bytes(data);
                Ok(resp)
            })
        }

        fn observe(&self, call: &CallSummary<'_>) {
            self.calls.lock().unwrap().push((
                call.operation,
                call.status.as_u16(),
                call.error.map(|e| e.code.as_str().to_owned()),
            ));
        }
    }

    fn service(with_credentials: bool) -> S3HttpService<RecordingHandler> {
        let credential_provider: Option<Arc<dyn CredentialProvider>> = with_credentials
            .then(|| Arc::new(StaticCredentialProvider::single(ACCESS_KEY, SECRET_KEY)) as _);
        S3HttpService::new(
            RecordingHandler::default(),
            S3HttpConfig {
                legacy_prefix: Some("/s3".to_owned()),
                credential_provider,
            },
        )
    }

    fn request(
        method: http::Method,
        uri: &str,
        body: &'static [u8],
    ) -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .header("host", "localhost:9444")
            .body(Full::new(Bytes::from_static(body)))
            .expect("valid request")
    }

    #[test]
    fn test_should_detect_health_check_paths() {
        assert!(is_health_check(&http::Method::GET, "/_health"));
        assert!(!is_health_check(&http::Method::GET, "/health"));
        assert!(!is_health_check(&http::Method::POST, "/_health"));
        assert!(!is_health_check(&http::Method::GET, "/mybucket"));
    }

    #[test]
    fn test_should_produce_cors_preflight_response() {
        let resp = cors_preflight_response();
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert!(resp.headers().contains_key("Access-Control-Allow-Origin"));
        assert!(resp.headers().contains_key("Access-Control-Allow-Methods"));
    }

    #[test]
    fn test_should_add_common_headers() {
        let resp = add_common_headers(empty_response(http::StatusCode::OK), "test-request-id");
        assert_eq!(
            resp.headers().get("x-amz-request-id").and_then(|v| v.to_str().ok()),
            Some("test-request-id"),
        );
        assert_eq!(
            resp.headers().get("Server").and_then(|v| v.to_str().ok()),
            Some(SERVER_NAME),
        );
    }

    #[test]
    fn test_should_debug_format_config_without_secrets() {
        let config = S3HttpConfig {
            legacy_prefix: Some("/s3".to_owned()),
            credential_provider: Some(Arc::new(StaticCredentialProvider::single("a", "b"))),
        };
        let debug_str = format!("{config:?}");
        assert!(debug_str.contains("/s3"));
        assert!(debug_str.contains("\"...\""));
    }

    #[tokio::test]
    async fn test_should_answer_health_check_under_prefix() {
        let svc = service(true);
        let resp = svc.handle(request(http::Method::GET, "/s3/_health", b"")).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert!(svc.handler().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_unroutable_request() {
        let svc = service(true);
        let resp = svc.handle(request(http::Method::POST, "/", b"")).await;
        assert_eq!(resp.status(), http::StatusCode::METHOD_NOT_ALLOWED);

        assert!(svc.handler().callers.lock().unwrap().is_empty());
        let calls = svc.handler().calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[(None, 405, Some("MethodNotAllowed".to_owned()))]
        );
    }

    #[tokio::test]
    async fn test_should_stream_body_to_handler_for_anonymous_caller() {
        let svc = service(true);
        let resp = svc.handle(request(http::Method::PUT, "/s3/b/k", b"hello")).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert!(resp.headers().contains_key("x-amz-request-id"));
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello");

        assert_eq!(svc.handler().callers.lock().unwrap()[0], Caller::Anonymous);
        let calls = svc.handler().calls.lock().unwrap();
        assert_eq!(calls[0], (Some(S3Operation::PutObject), 200, None));
    }

    #[tokio::test]
    async fn test_should_mark_bypass_caller() {
        let svc = service(true);
        svc.handle(request(http::Method::GET, "/b/k?noAuth", b"")).await;
        assert_eq!(svc.handler().callers.lock().unwrap()[0], Caller::Bypass);
    }

    #[tokio::test]
    async fn test_should_accept_v4_signed_request() {
        let svc = service(true);
        let mut req = request(http::Method::GET, "/b/k", b"");
        req.headers_mut()
            .insert("x-amz-date", "20240101T000000Z".parse().unwrap());
        req.headers_mut()
            .insert("x-amz-content-sha256", "UNSIGNED-PAYLOAD".parse().unwrap());
        let (mut parts, body) = req.into_parts();
        let auth = sign_request(&parts, ACCESS_KEY, SECRET_KEY, "us-east-1").unwrap();
        parts.headers.insert(http::header::AUTHORIZATION, auth.parse().unwrap());

        let resp = svc.handle(http::Request::from_parts(parts, body)).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert_eq!(
            svc.handler().callers.lock().unwrap()[0],
            Caller::Signed {
                access_key_id: ACCESS_KEY.to_owned()
            }
        );
    }

    #[tokio::test]
    async fn test_should_reject_wrong_signature_with_resource() {
        let svc = service(true);
        let mut req = request(http::Method::GET, "/b/k", b"");
        req.headers_mut()
            .insert("x-amz-date", "20240101T000000Z".parse().unwrap());
        req.headers_mut()
            .insert("x-amz-content-sha256", "UNSIGNED-PAYLOAD".parse().unwrap());
        let (mut parts, body) = req.into_parts();
        let auth = sign_request(&parts, ACCESS_KEY, "wrong-secret", "us-east-1").unwrap();
        parts.headers.insert(http::header::AUTHORIZATION, auth.parse().unwrap());

        let resp = svc.handle(http::Request::from_parts(parts, body)).await;
        assert_eq!(resp.status(), http::StatusCode::FORBIDDEN);
        let text = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(text.to_vec()).unwrap();
        assert!(text.contains("<Code>SignatureDoesNotMatch</Code>"));
        assert!(text.contains("<Resource>/b/k</Resource>"));

        assert!(svc.handler().callers.lock().unwrap().is_empty());
        let calls = svc.handler().calls.lock().unwrap();
        assert_eq!(
            calls[0],
            (
                Some(S3Operation::GetObject),
                403,
                Some("SignatureDoesNotMatch".to_owned())
            )
        );
    }

    #[tokio::test]
    async fn test_should_treat_everyone_as_unsigned_without_credentials() {
        let svc = S3HttpService::new(NotImplementedHandler, S3HttpConfig::default());
        let mut req = request(http::Method::GET, "/b/k", b"");
        req.headers_mut().insert(
            http::header::AUTHORIZATION,
            "AWS someone:c2lnbmF0dXJl".parse().unwrap(),
        );
        let resp = svc.handle(req).await;
        assert_eq!(resp.status(), http::StatusCode::NOT_IMPLEMENTED);
    }
}
