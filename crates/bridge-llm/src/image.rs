//! Resolve image references in chat content into inline bytes

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use crate::error::LlmError;
use crate::protocol::google::GoogleInlineData;

/// Largest remote image accepted for inlining
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Decoded image with its format tag (`png`, `jpeg`, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub format: String,
    pub bytes: Vec<u8>,
}

impl ImageData {
    pub fn mime_type(&self) -> String {
        format!("image/{}", self.format)
    }

    /// Backend inline-data part for this image
    pub fn into_inline(self) -> GoogleInlineData {
        GoogleInlineData {
            mime_type: self.mime_type(),
            data: STANDARD.encode(&self.bytes),
        }
    }
}

/// Turns `data:` URIs and `http(s)` URLs into [`ImageData`]
#[derive(Clone)]
pub struct ImageResolver {
    client: Client,
    timeout: Duration,
    max_bytes: usize,
}

impl ImageResolver {
    pub const fn new(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            max_bytes: MAX_IMAGE_BYTES,
        }
    }

    /// Override the remote image size limit
    pub const fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Resolve an image reference
    ///
    /// Remote fetches are bounded by the configured timeout and size limit,
    /// and are abandoned when the returned future is dropped.
    pub async fn resolve(&self, url: &str) -> Result<ImageData, LlmError> {
        if let Some(rest) = url.strip_prefix("data:") {
            return decode_data_uri(rest);
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            return self.fetch(url).await;
        }

        Err(LlmError::InvalidRequest(
            "image_url must be a data URI or an http(s) URL".to_owned(),
        ))
    }

    async fn fetch(&self, url: &str) -> Result<ImageData, LlmError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LlmError::InvalidRequest(format!("failed to fetch image: {e}")))?;

        if !response.status().is_success() {
            return Err(LlmError::InvalidRequest(format!(
                "failed to fetch image: server returned {}",
                response.status()
            )));
        }

        let format = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(image_format)
            .ok_or_else(|| LlmError::InvalidRequest("fetched resource is not an image".to_owned()))?;

        let too_large = || LlmError::InvalidRequest(format!("image exceeds {} bytes", self.max_bytes));

        if response.content_length().is_some_and(|length| length > self.max_bytes as u64) {
            return Err(too_large());
        }

        let mut bytes = Vec::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| LlmError::InvalidRequest(format!("failed to read image body: {e}")))?;
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        tracing::debug!(%format, size = bytes.len(), "fetched remote image");

        Ok(ImageData { format, bytes })
    }
}

/// Decode the part of a data URI after `data:`
fn decode_data_uri(rest: &str) -> Result<ImageData, LlmError> {
    let invalid = || LlmError::InvalidRequest("invalid image data URI".to_owned());

    let (header, payload) = rest.split_once(',').ok_or_else(invalid)?;
    let mime = header.strip_suffix(";base64").ok_or_else(invalid)?;
    let format = image_format(mime).ok_or_else(invalid)?;
    let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;

    Ok(ImageData { format, bytes })
}

/// `image/png; charset=...` -> `png`
fn image_format(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim();
    let format = essence.strip_prefix("image/")?;

    (!format.is_empty()).then(|| format.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::response::IntoResponse;
    use axum::routing::get;

    use super::*;

    fn png(size: usize) -> impl IntoResponse {
        ([(CONTENT_TYPE, "image/png")], vec![7_u8; size])
    }

    /// Local image host; `/chunked` sends 48 bytes without a Content-Length
    async fn image_host() -> String {
        let app = Router::new()
            .route("/small.png", get(|| async { png(8) }))
            .route("/large.png", get(|| async { png(64) }))
            .route(
                "/chunked.png",
                get(|| async {
                    let chunks = (0..3).map(|_| Ok::<_, std::convert::Infallible>(vec![7_u8; 16]));
                    ([(CONTENT_TYPE, "image/png")], Body::from_stream(futures_util::stream::iter(chunks)))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        format!("http://{address}")
    }

    #[tokio::test]
    async fn remote_image_within_limit_is_fetched() {
        let host = image_host().await;
        let resolver = ImageResolver::new(Client::new(), Duration::from_secs(5)).with_max_bytes(16);

        let image = resolver.resolve(&format!("{host}/small.png")).await.unwrap();
        assert_eq!(image.format, "png");
        assert_eq!(image.bytes.len(), 8);
    }

    #[tokio::test]
    async fn oversized_remote_image_is_rejected() {
        let host = image_host().await;
        let resolver = ImageResolver::new(Client::new(), Duration::from_secs(5)).with_max_bytes(16);

        for path in ["large.png", "chunked.png"] {
            let err = resolver.resolve(&format!("{host}/{path}")).await.unwrap_err();
            assert!(matches!(err, LlmError::InvalidRequest(ref m) if m.contains("exceeds 16 bytes")), "{path}");
        }
    }

    #[tokio::test]
    async fn data_uri_is_decoded() {
        let resolver = ImageResolver::new(Client::new(), Duration::from_secs(1));
        let image = resolver.resolve("data:image/png;base64,aGVsbG8=").await.unwrap();

        assert_eq!(image.format, "png");
        assert_eq!(image.bytes, b"hello");
        assert_eq!(image.into_inline().mime_type, "image/png");
    }

    #[tokio::test]
    async fn malformed_data_uri_is_rejected() {
        let resolver = ImageResolver::new(Client::new(), Duration::from_secs(1));

        for url in [
            "data:image/png,aGVsbG8=",
            "data:text/plain;base64,aGVsbG8=",
            "data:image/png;base64,@@@",
            "data:image/png;base64",
        ] {
            let err = resolver.resolve(url).await.unwrap_err();
            assert!(matches!(err, LlmError::InvalidRequest(_)), "{url}");
        }
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected() {
        let resolver = ImageResolver::new(Client::new(), Duration::from_secs(1));
        let err = resolver.resolve("ftp://example.com/cat.png").await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }

    #[test]
    fn format_from_content_type() {
        assert_eq!(image_format("image/JPEG; q=1").as_deref(), Some("jpeg"));
        assert_eq!(image_format("application/octet-stream"), None);
        assert_eq!(image_format("image/"), None);
    }
}
