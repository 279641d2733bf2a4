//! Web API payloads to typed entities.
//!
//! Rows arrive keyed by remote attribute names (lookups as `_x_value`);
//! they are re-keyed to logical field names before serde sees them. A field
//! missing from the payload decodes as `null`.

use crate::error::TransportError;
use crm_query::EntityDescriptor;
use crm_query::fetchxml::decode_paging_cookie;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;

pub const TOTAL_COUNT_ANNOTATION: &str = "@Microsoft.Dynamics.CRM.totalrecordcount";
pub const MORE_RECORDS_ANNOTATION: &str = "@Microsoft.Dynamics.CRM.morerecords";
pub const PAGING_COOKIE_ANNOTATION: &str = "@Microsoft.Dynamics.CRM.fetchxmlpagingcookie";

/// Rows of a FetchXML answer plus its paging annotations.
#[derive(Debug, Default)]
pub struct RowSet {
    pub rows: Vec<Map<String, Value>>,
    /// `None` when the service did not compute it (reported as `-1`).
    pub total_count: Option<u64>,
    pub more_records: bool,
    pub paging_cookie: Option<String>,
}

pub fn parse_row_set(body: &Value) -> Result<RowSet, TransportError> {
    let Some(rows) = body.get("value").and_then(Value::as_array) else {
        return Err(TransportError::Payload(
            "expected an object with a 'value' array".to_owned(),
        ));
    };

    let rows = rows
        .iter()
        .map(|row| match row {
            Value::Object(map) => Ok(map.clone()),
            _ => Err(TransportError::Payload("row is not an object".to_owned())),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RowSet {
        rows,
        total_count: body
            .get(TOTAL_COUNT_ANNOTATION)
            .and_then(Value::as_i64)
            .and_then(|n| u64::try_from(n).ok()),
        more_records: body
            .get(MORE_RECORDS_ANNOTATION)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        paging_cookie: body
            .get(PAGING_COOKIE_ANNOTATION)
            .and_then(Value::as_str)
            .and_then(decode_paging_cookie),
    })
}

/// Re-key one remote row to logical names and deserialize it.
pub fn decode_row<T: DeserializeOwned>(
    row: &Map<String, Value>,
    descriptor: &EntityDescriptor,
) -> Result<T, TransportError> {
    let logical: Map<String, Value> = descriptor
        .fields()
        .iter()
        .map(|field| {
            let value = row
                .get(field.payload_key().as_ref())
                .cloned()
                .unwrap_or(Value::Null);
            (field.name.to_owned(), value)
        })
        .collect();

    serde_json::from_value(Value::Object(logical)).map_err(|e| {
        TransportError::Payload(format!(
            "cannot decode '{}' row: {e}",
            descriptor.logical_name()
        ))
    })
}

/// Value of the aggregate alias in the first row; an empty answer counts 0.
pub fn decode_count(set: &RowSet, alias: &str) -> Result<u64, TransportError> {
    let Some(row) = set.rows.first() else {
        return Ok(0);
    };
    match row.get(alias) {
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
            TransportError::Payload(format!("count '{n}' is not a non-negative integer"))
        }),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| TransportError::Payload(format!("count '{s}' is not an integer"))),
        _ => Err(TransportError::Payload(format!(
            "aggregate '{alias}' missing from count response"
        ))),
    }
}

/// Id from an `OData-EntityId` header such as
/// `https://org.crm.dynamics.com/api/data/v9.2/contacts(7d5e...)`.
#[must_use]
pub fn entity_id_from_location(location: &str) -> Option<Uuid> {
    let (_, tail) = location.rsplit_once('(')?;
    let id = tail.strip_suffix(')')?;
    Uuid::parse_str(id).ok()
}
