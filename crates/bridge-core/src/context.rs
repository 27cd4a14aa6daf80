use http::HeaderMap;
use http::header::AUTHORIZATION;
use secrecy::SecretString;

/// Runtime context for a single gateway request
///
/// Built by the server middleware and handed to every handler
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Caller-supplied backend credential, forwarded verbatim
    pub credential: Option<SecretString>,
}

impl RequestContext {
    /// Build a context from request headers, extracting the bearer credential
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            credential: bearer_token(headers),
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
///
/// The token itself is never inspected beyond being non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<SecretString> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then(|| SecretString::from(token.to_owned()))
}
