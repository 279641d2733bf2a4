use crate::builder::HttpClientBuilder;
use crate::config::TransportSecurity;
use crate::error::HttpError;
use crate::request::RequestBuilder;
use crate::response::{HttpResponse, ResponseBody};
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use tower::Service;
use tower::buffer::Buffer;

pub type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

pub type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// Cloneable HTTP client; clones share the connection pool and buffer worker.
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: BufferedService,
    pub(crate) max_body_size: usize,
    pub(crate) transport_security: TransportSecurity,
    pub(crate) default_headers: Arc<HeaderMap>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("max_body_size", &self.max_body_size)
            .field("transport_security", &self.transport_security)
            .field("default_headers", &self.default_headers.len())
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Client with default configuration.
    ///
    /// # Errors
    /// See [`HttpClientBuilder::build`].
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(self.clone(), method, url.to_owned())
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Hand a request to the buffer without waiting for queue space.
    pub(crate) async fn dispatch(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<HttpResponse, HttpError> {
        let mut service = self.service.clone();
        let ready = std::future::poll_fn(|cx| match service.poll_ready(cx) {
            Poll::Ready(result) => Poll::Ready(Some(result)),
            Poll::Pending => Poll::Ready(None),
        })
        .await;
        match ready {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(map_buffer_error(e)),
            None => return Err(HttpError::Overloaded),
        }

        let inner = service.call(request).await.map_err(map_buffer_error)?;
        Ok(HttpResponse {
            inner,
            max_body_size: self.max_body_size,
        })
    }
}

fn map_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(error = %err, "HTTP buffer worker closed");
            HttpError::ServiceClosed
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use httpmock::Method::{DELETE, GET, PATCH};
    use httpmock::MockServer;
    use serde_json::json;

    fn test_client() -> HttpClient {
        HttpClient::builder().allow_insecure_http().build().unwrap()
    }

    #[tokio::test]
    async fn test_get_json() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api/data/v9.2/contacts");
            then.status(200).json_body(json!({"value": [{"fullname": "Ada"}]}));
        });

        let url = server.url("/api/data/v9.2/contacts");
        let body: serde_json::Value = test_client()
            .get(&url)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        mock.assert();
        assert_eq!(body["value"][0]["fullname"], "Ada");
    }

    #[tokio::test]
    async fn test_non_success_is_not_a_send_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(DELETE).path("/contacts(1)");
            then.status(404).body("missing");
        });

        let resp = test_client()
            .delete(&server.url("/contacts(1)"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);

        let err = resp.error_for_status().await.unwrap_err();
        assert_eq!(err.status(), Some(http::StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_default_and_request_headers() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PATCH)
                .path("/contacts(1)")
                .header("odata-version", "4.0")
                .header("if-match", "*")
                .header("content-type", "application/json")
                .header("user-agent", "crm-test/1.0")
                .json_body(json!({"fullname": "Grace"}));
            then.status(204);
        });

        let client = HttpClient::builder()
            .allow_insecure_http()
            .user_agent("crm-test/1.0")
            .default_header("OData-Version", "4.0")
            .build()
            .unwrap();

        let resp = client
            .patch(&server.url("/contacts(1)"))
            .header("If-Match", "*")
            .json(&json!({"fullname": "Grace"}))
            .unwrap()
            .send()
            .await
            .unwrap();

        mock.assert();
        assert_eq!(resp.status(), http::StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_body_size_limit() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/large");
            then.status(200).body("x".repeat(4096));
        });

        let client = HttpClient::builder()
            .allow_insecure_http()
            .max_body_size(1024)
            .build()
            .unwrap();
        let result = client
            .get(&server.url("/large"))
            .send()
            .await
            .unwrap()
            .bytes()
            .await;

        assert!(matches!(
            result,
            Err(HttpError::BodyTooLarge { limit: 1024, .. })
        ));
    }

    #[tokio::test]
    async fn test_https_required_by_default() {
        let client = HttpClient::new().unwrap();
        let err = client.get("http://localhost/x").send().await.unwrap_err();
        assert!(matches!(err, HttpError::InvalidScheme { .. }));
    }
}
