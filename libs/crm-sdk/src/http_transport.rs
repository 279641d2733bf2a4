//! Default [`Transport`] over the Dataverse Web API.

use crate::config::ConnectionConfig;
use crate::error::{Error, TransportError};
use crate::transport::{RemoteRequest, RemoteResponse, Transport};
use async_trait::async_trait;
use crm_http::{HttpClient, HttpClientBuilder, HttpError};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Supplies the bearer token for each request.
///
/// Token acquisition and refresh live outside this crate; a plain
/// [`SecretString`] acts as a static token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<SecretString, TransportError>;
}

#[async_trait]
impl TokenSource for SecretString {
    async fn token(&self) -> Result<SecretString, TransportError> {
        Ok(self.clone())
    }
}

/// Sends [`RemoteRequest`]s to `{url}/api/data/{version}/`.
#[derive(Clone)]
pub struct HttpTransport {
    client: HttpClient,
    base: Url,
    token: Option<Arc<dyn TokenSource>>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Build the transport and its HTTP client.
    ///
    /// # Errors
    /// [`Error::Config`] for an unusable URL or client settings.
    pub fn new(config: &ConnectionConfig) -> Result<Self, Error> {
        config.validate().map_err(Error::Config)?;

        let mut builder = HttpClientBuilder::new()
            .timeout(config.timeout)
            .default_header("Accept", "application/json")
            .default_header("OData-MaxVersion", "4.0")
            .default_header("OData-Version", "4.0");
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if config.allow_insecure_http {
            builder = builder.allow_insecure_http();
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;

        let base = api_base(&config.url, &config.api_version)?;
        tracing::debug!(base = %base, "Web API transport configured");

        Ok(Self {
            client,
            base,
            token: config
                .token
                .clone()
                .map(|t| Arc::new(t) as Arc<dyn TokenSource>),
        })
    }

    /// Replace the bearer token supplier.
    #[must_use]
    pub fn with_token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token = Some(source);
        self
    }

    /// Web API root, e.g. `https://org.crm4.dynamics.com/api/data/v9.2`.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url_for(&self, request: &RemoteRequest) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::Transport("base URL cannot carry a path".into()))?
            .push(&request.path());
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }
}

fn api_base(url: &Url, api_version: &str) -> Result<Url, Error> {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.path_segments_mut()
        .map_err(|()| Error::Config(format!("'{url}' cannot be used as a base URL")))?
        .pop_if_empty()
        .extend(["api", "data", api_version.trim()]);
    Ok(base)
}

fn map_http_error(err: HttpError) -> TransportError {
    match err {
        HttpError::Timeout(after) => TransportError::Timeout(after),
        HttpError::HttpStatus {
            status,
            body_preview,
            ..
        } => TransportError::Status {
            status,
            message: body_preview,
        },
        HttpError::Json(e) => TransportError::Payload(e.to_string()),
        other => TransportError::Transport(Box::new(other)),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
        let url = self.url_for(&request)?;
        let mut builder = self.client.request(request.method.clone(), url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(source) = &self.token {
            let token = source.token().await?;
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body).map_err(map_http_error)?;
        }

        let response = builder.send().await.map_err(map_http_error)?;
        let (status, headers, body) = response.into_parts().await.map_err(map_http_error)?;
        tracing::trace!(
            method = %request.method,
            path = %url.path(),
            status = status.as_u16(),
            "Web API response"
        );
        Ok(RemoteResponse {
            status,
            headers,
            body,
        })
    }
}
