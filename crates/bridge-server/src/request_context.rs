use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use bridge_core::RequestContext;

/// Middleware that attaches a `RequestContext` to every request
///
/// The bearer credential is extracted here once; handlers decide whether
/// its absence is an error.
pub async fn request_context_middleware(mut request: Request, next: Next) -> Response {
    let context = RequestContext::from_headers(request.headers());
    request.extensions_mut().insert(context);

    next.run(request).await
}
