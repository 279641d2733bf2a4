use crate::error::HttpError;
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use serde::de::DeserializeOwned;
use std::time::{Duration, SystemTime};

/// Decompressed, type-erased response body.
pub type ResponseBody = BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Bytes of an error body kept in [`HttpError::HttpStatus`].
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Parse `Retry-After` as delta-seconds or an HTTP-date.
///
/// Dates in the past yield `None`.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = httpdate::parse_http_date(value).ok()?;
    at.duration_since(SystemTime::now()).ok()
}

/// A response whose body has not been read yet.
///
/// Every body accessor enforces the client's `max_body_size` on
/// decompressed bytes.
#[derive(Debug)]
pub struct HttpResponse {
    pub(crate) inner: Response<ResponseBody>,
    pub(crate) max_body_size: usize,
}

impl HttpResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Header value as a string, if present and visible ASCII.
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Turn a non-2xx response into [`HttpError::HttpStatus`].
    ///
    /// # Errors
    /// Returns `HttpStatus` with a bounded body preview for non-success codes.
    pub async fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status().is_success() {
            return Ok(self);
        }
        Err(self.into_status_error().await)
    }

    /// Read the body regardless of status, keeping status and headers.
    ///
    /// # Errors
    /// Returns `BodyTooLarge` past the limit, `Transport` on read failures.
    pub async fn into_parts(self) -> Result<(StatusCode, HeaderMap, Bytes), HttpError> {
        let (parts, body) = self.inner.into_parts();
        let bytes = collect_limited(body, self.max_body_size).await?;
        Ok((parts.status, parts.headers, bytes))
    }

    /// Body of a successful response.
    ///
    /// # Errors
    /// Returns `HttpStatus` for non-2xx, `BodyTooLarge` past the limit.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        let limit = self.max_body_size;
        let response = self.error_for_status().await?;
        collect_limited(response.inner.into_body(), limit).await
    }

    /// Deserialize the body of a successful response.
    ///
    /// # Errors
    /// Same as [`bytes`](Self::bytes), plus `Json` for malformed payloads.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Body of a successful response as UTF-8 (lossy).
    ///
    /// # Errors
    /// Same as [`bytes`](Self::bytes).
    pub async fn text(self) -> Result<String, HttpError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn into_status_error(self) -> HttpError {
        let status = self.status();
        let retry_after = parse_retry_after(self.headers());
        let content_type = self
            .header_str(http::header::CONTENT_TYPE.as_str())
            .map(str::to_owned);

        let limit = self.max_body_size.min(ERROR_BODY_PREVIEW_LIMIT);
        let body_preview = match collect_limited(self.inner.into_body(), limit).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(HttpError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
            Err(e) => return e,
        };

        HttpError::HttpStatus {
            status,
            body_preview,
            content_type,
            retry_after,
        }
    }
}

async fn collect_limited(body: ResponseBody, limit: usize) -> Result<Bytes, HttpError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            let actual = collected.len() + chunk.len();
            if actual > limit {
                return Err(HttpError::BodyTooLarge { limit, actual });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}
