use http::StatusCode;

/// Trait for domain errors that can be converted to HTTP responses
///
/// The server layer renders these into outward error bodies, keeping
/// domain errors decoupled from axum.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `invalid_request_error`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;

    /// Optional machine-readable code refining the error type
    fn error_code(&self) -> Option<&str> {
        None
    }
}
