//! Safety caps checked before a query is sent:
//! - Maximum page size
//! - Maximum number of ordering fields
//! - Maximum URL-encoded length of the rendered FetchXML

use crate::Error;
use serde::Deserialize;

/// Query limits, loadable from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct QueryLimits {
    /// Maximum rows per page (default: 5000, the service cap)
    pub max_page_size: u32,
    /// Maximum number of ordering fields (default: 5)
    pub max_order_fields: usize,
    /// Maximum length of the URL-encoded FetchXML, as sent in the request
    /// URL (default: 32768)
    pub max_query_length: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_page_size: 5000,
            max_order_fields: 5,
            max_query_length: 32_768,
        }
    }
}

impl QueryLimits {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_page_size(mut self, max: u32) -> Self {
        self.max_page_size = max;
        self
    }

    #[must_use]
    pub fn with_max_order_fields(mut self, max: usize) -> Self {
        self.max_order_fields = max;
        self
    }

    #[must_use]
    pub fn with_max_query_length(mut self, max: usize) -> Self {
        self.max_query_length = max;
        self
    }

    /// # Errors
    /// Returns `Error::InvalidArgument` if `size` exceeds `max_page_size`.
    pub fn validate_page_size(&self, size: u32) -> Result<(), Error> {
        if size > self.max_page_size {
            return Err(Error::InvalidArgument(format!(
                "page size {size} exceeds maximum of {}",
                self.max_page_size
            )));
        }
        Ok(())
    }

    /// # Errors
    /// Returns `Error::InvalidArgument` if `count` exceeds `max_order_fields`.
    pub fn validate_order_count(&self, count: usize) -> Result<(), Error> {
        if count > self.max_order_fields {
            return Err(Error::InvalidArgument(format!(
                "too many ordering fields (max: {})",
                self.max_order_fields
            )));
        }
        Ok(())
    }

    /// Check the query against the URL length it will occupy once encoded.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if the encoded query is too long.
    pub fn validate_query(&self, fetch_xml: &str) -> Result<(), Error> {
        let len = urlencoding::encode(fetch_xml).len();
        if len > self.max_query_length {
            return Err(Error::InvalidArgument(format!(
                "query of {len} encoded characters exceeds maximum length of {}",
                self.max_query_length
            )));
        }
        Ok(())
    }
}
