//! Read path: `QuerySpec -> FetchXML -> transport -> typed rows`.

use crate::context::Settings;
use crate::decode::{self, RowSet};
use crate::error::{Error, TransportError};
use crate::transport::{RemoteRequest, RemoteResponse, Transport};
use crm_query::fetchxml::{self, COUNT_ALIAS, FetchXml};
use crm_query::{EntityDescriptor, Page, PageInfo, Paging, QuerySpec};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

/// `Prefer` value that makes the service return paging annotations.
pub const PREFER_ANNOTATIONS: &str = "odata.include-annotations=\"Microsoft.Dynamics.CRM.*\"";

/// Executes queries and mutations for one entity type.
pub struct Engine<'a> {
    pub(crate) transport: &'a dyn Transport,
    pub(crate) descriptor: &'a EntityDescriptor,
    pub(crate) settings: &'a Settings,
}

impl<'a> Engine<'a> {
    #[must_use]
    pub fn new(
        transport: &'a dyn Transport,
        descriptor: &'a EntityDescriptor,
        settings: &'a Settings,
    ) -> Self {
        Self {
            transport,
            descriptor,
            settings,
        }
    }

    fn resource(&self) -> &'static str {
        self.descriptor.entity_set()
    }

    fn query_error(&self, source: TransportError) -> Error {
        warn!(resource = self.resource(), error = %source, "remote query failed");
        Error::RemoteQuery {
            resource: self.resource().to_owned(),
            source,
        }
    }

    /// Check limits and render the query as FetchXML.
    pub fn translate(&self, spec: &QuerySpec) -> Result<FetchXml, Error> {
        let limits = &self.settings.limits;
        if let Some(paging) = spec.paging {
            limits.validate_page_size(paging.size())?;
        }
        limits.validate_order_count(spec.order.len())?;

        let xml = fetchxml::translate(spec, self.descriptor)?;
        limits.validate_query(xml.as_str())?;
        Ok(xml)
    }

    async fn fetch(&self, spec: &QuerySpec) -> Result<RowSet, Error> {
        let xml = self.translate(spec)?;
        debug!(
            resource = self.resource(),
            conditions = spec.condition_count(),
            fetch_xml = xml.as_str(),
            "sending query"
        );

        let request = RemoteRequest::new(Method::GET, self.resource())
            .with_query("fetchXml", xml.into_string())
            .with_header("Prefer", PREFER_ANNOTATIONS);

        let set = self
            .send_read(request)
            .await
            .and_then(|body| decode::parse_row_set(&body))
            .map_err(|e| self.query_error(e))?;
        debug!(resource = self.resource(), rows = set.rows.len(), "query returned");
        Ok(set)
    }

    async fn send_read(&self, request: RemoteRequest) -> Result<serde_json::Value, TransportError> {
        self.transport
            .send(request)
            .await?
            .error_for_status()?
            .json_body()
    }

    fn decode_rows<T: DeserializeOwned>(&self, set: &RowSet) -> Result<Vec<T>, Error> {
        set.rows
            .iter()
            .map(|row| decode::decode_row(row, self.descriptor))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.query_error(e))
    }

    /// Read pages from `paging` on, following the paging cookie, until the
    /// service reports no more records.
    async fn scan<F>(
        &self,
        spec: &QuerySpec,
        mut paging: Paging,
        mut cookie: Option<String>,
        mut on_page: F,
    ) -> Result<(), Error>
    where
        F: FnMut(&RowSet) -> Result<(), Error>,
    {
        loop {
            let page = spec
                .clone()
                .with_paging(paging)
                .with_paging_cookie(cookie.take());
            let set = self.fetch(&page).await?;
            on_page(&set)?;
            if !set.more_records || set.rows.is_empty() {
                return Ok(());
            }
            debug!(
                resource = self.resource(),
                page = paging.number(),
                "more records; following paging cookie"
            );
            paging = paging.next();
            cookie = set.paging_cookie;
        }
    }

    /// Every row the query selects.
    ///
    /// Pages of `max_page_size` rows (or the query's own paging) are read
    /// until the service reports no more records.
    #[tracing::instrument(skip_all, fields(resource = self.resource()))]
    pub async fn list<T: DeserializeOwned>(&self, spec: &QuerySpec) -> Result<Vec<T>, Error> {
        let paging = spec
            .paging
            .unwrap_or_else(|| Paging::first(self.settings.limits.max_page_size));
        let mut items = Vec::new();
        self.scan(spec, paging, spec.paging_cookie.clone(), |set| {
            items.extend(self.decode_rows::<T>(set)?);
            Ok(())
        })
        .await?;
        Ok(items)
    }

    /// First row of page `{1, 1}`, or `None`.
    #[tracing::instrument(skip_all, fields(resource = self.resource()))]
    pub async fn first<T: DeserializeOwned>(&self, spec: QuerySpec) -> Result<Option<T>, Error> {
        let spec = spec.with_paging(Paging::first(1)).with_paging_cookie(None);
        let set = self.fetch(&spec).await?;
        set.rows
            .first()
            .map(|row| decode::decode_row(row, self.descriptor))
            .transpose()
            .map_err(|e| self.query_error(e))
    }

    /// Number of rows matching the query predicates.
    ///
    /// Uses an aggregate query. When the service refuses it for exceeding
    /// its aggregate record limit, the matching keys are paged through and
    /// counted instead.
    #[tracing::instrument(skip_all, fields(resource = self.resource()))]
    pub async fn count(&self, spec: &QuerySpec) -> Result<u64, Error> {
        match self.fetch(&spec.to_count()).await {
            Ok(set) => decode::decode_count(&set, COUNT_ALIAS).map_err(|e| self.query_error(e)),
            Err(err) if exceeds_aggregate_limit(&err) => {
                warn!(
                    resource = self.resource(),
                    "aggregate count over the service limit; counting by pages"
                );
                self.count_by_pages(spec).await
            }
            Err(err) => Err(err),
        }
    }

    async fn count_by_pages(&self, spec: &QuerySpec) -> Result<u64, Error> {
        let key = self.descriptor.key_field()?;
        let keys = spec
            .clone()
            .with_select(vec![key.name.to_owned()])
            .with_order(Vec::new());
        let mut total = 0_u64;
        let paging = Paging::first(self.settings.limits.max_page_size);
        self.scan(&keys, paging, None, |set| {
            total += set.rows.len() as u64;
            Ok(())
        })
        .await?;
        Ok(total)
    }

    /// One page with total-count metadata. The query paging and cookie
    /// select the page.
    pub async fn page<T: DeserializeOwned>(&self, spec: QuerySpec) -> Result<Page<T>, Error> {
        let paging = spec
            .paging
            .unwrap_or_else(|| Paging::first(self.settings.limits.max_page_size));
        let spec = spec.with_paging(paging).with_total_count(true);

        let set = self.fetch(&spec).await?;
        let items = self.decode_rows(&set)?;
        Ok(Page::new(
            items,
            PageInfo {
                page_number: paging.number(),
                page_size: paging.size(),
                total_count: set.total_count,
                has_more: set.more_records,
                paging_cookie: set.paging_cookie,
            },
        ))
    }

    /// Single entity by key. A remote 404 follows the not-found policy.
    #[tracing::instrument(skip_all, fields(resource = self.resource(), %id))]
    pub async fn find<T: DeserializeOwned>(&self, id: Uuid) -> Result<Option<T>, Error> {
        let select = self
            .descriptor
            .fields()
            .iter()
            .map(|f| f.payload_key().into_owned())
            .collect::<Vec<_>>()
            .join(",");
        let request = RemoteRequest::new(Method::GET, self.resource())
            .with_key(id)
            .with_query("$select", select);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| self.query_error(e))?;
        if response.status == StatusCode::NOT_FOUND {
            return self.not_found(id).map(|()| None);
        }

        let row = read_object(response).map_err(|e| self.query_error(e))?;
        decode::decode_row(&row, self.descriptor)
            .map(Some)
            .map_err(|e| self.query_error(e))
    }

    /// Apply the not-found policy: `Ok(())` when absence is tolerated.
    pub(crate) fn not_found(&self, id: Uuid) -> Result<(), Error> {
        debug!(resource = self.resource(), %id, "entity not found");
        if self.settings.throw_on_error {
            Err(Error::NotFound {
                resource: self.resource().to_owned(),
                id,
            })
        } else {
            Ok(())
        }
    }
}

/// Marker of the service error raised when an aggregate query covers more
/// rows than `AggregateQueryRecordLimit` (50 000 by default).
const AGGREGATE_LIMIT_MARKER: &str = "AggregateQueryRecordLimit";

fn exceeds_aggregate_limit(err: &Error) -> bool {
    matches!(
        err,
        Error::RemoteQuery {
            source: TransportError::Status { message, .. },
            ..
        } if message.contains(AGGREGATE_LIMIT_MARKER)
    )
}

fn read_object(
    response: RemoteResponse,
) -> Result<serde_json::Map<String, serde_json::Value>, TransportError> {
    match response.error_for_status()?.json_body()? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(TransportError::Payload("expected a JSON object".to_owned())),
    }
}
