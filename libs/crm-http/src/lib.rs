//! # crm-http
//!
//! Buffered HTTP client used by the Dynamics Web API transport.
//!
//! The client is a tower stack over the hyper-util pooled client with
//! rustls. `send()` returns `Ok` for every HTTP status; callers inspect
//! the status or use [`HttpResponse::error_for_status`]. Response bodies
//! are read with a size cap applied after decompression.
//!
//! ```ignore
//! let client = crm_http::HttpClient::builder()
//!     .default_header("OData-Version", "4.0")
//!     .build()?;
//! let resp = client.get(url).bearer_auth(token).send().await?;
//! ```

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod builder;
mod client;
mod config;
mod error;
mod request;
mod response;
mod tls;

pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use config::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, HttpClientConfig, TlsRootConfig,
    TransportSecurity,
};
pub use error::{HttpError, InvalidUriKind};
pub use request::RequestBuilder;
pub use response::{ERROR_BODY_PREVIEW_LIMIT, HttpResponse, ResponseBody};
