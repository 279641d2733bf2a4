//! Write path: create, update and delete of single entities.

use crate::decode;
use crate::error::{Error, MutationOp, TransportError};
use crate::exec::Engine;
use crate::transport::{RemoteRequest, RemoteResponse};
use crm_query::{Entity, EntityDescriptor};
use http::{Method, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

pub const ENTITY_ID_HEADER: &str = "OData-EntityId";

/// Remote payload for `entity`, keyed by remote attribute names.
///
/// Read-only fields are never written. Lookups become
/// `{remote}@odata.bind: "/{target}({id})"` and are skipped when null. The
/// key is sent on create only when it is set.
///
/// # Errors
/// [`TransportError::Payload`] when the entity does not serialize to a
/// JSON object or a lookup does not hold a GUID.
pub fn encode_entity<T: Entity>(
    entity: &T,
    descriptor: &EntityDescriptor,
    op: MutationOp,
) -> Result<Map<String, Value>, TransportError> {
    let Value::Object(mut logical) = serde_json::to_value(entity)? else {
        return Err(TransportError::Payload(format!(
            "'{}' does not serialize to an object",
            descriptor.logical_name()
        )));
    };

    let mut payload = Map::new();
    for field in descriptor.fields() {
        if field.read_only {
            continue;
        }
        let value = logical.remove(field.name).unwrap_or(Value::Null);

        if field.name == descriptor.primary_key() {
            let assigned = value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .is_some_and(|id| !id.is_nil());
            if op == MutationOp::Create && assigned {
                payload.insert(field.remote.to_owned(), value);
            }
            continue;
        }

        match field.lookup_target {
            Some(_) if value.is_null() => {}
            Some(target) => {
                let Some(id) = value.as_str() else {
                    return Err(TransportError::Payload(format!(
                        "lookup '{}' must hold a GUID",
                        field.name
                    )));
                };
                payload.insert(
                    format!("{}@odata.bind", field.remote),
                    Value::String(format!("/{target}({id})")),
                );
            }
            None => {
                payload.insert(field.remote.to_owned(), value);
            }
        }
    }
    Ok(payload)
}

impl Engine<'_> {
    fn mutation_error(&self, op: MutationOp, source: TransportError) -> Error {
        tracing::warn!(
            resource = self.descriptor.entity_set(),
            %op,
            error = %source,
            "remote mutation failed"
        );
        Error::RemoteMutation {
            resource: self.descriptor.entity_set().to_owned(),
            op,
            source,
        }
    }

    fn require_key(&self, id: Uuid, op: MutationOp) -> Result<(), Error> {
        if id.is_nil() {
            return Err(Error::InvalidArgument(format!(
                "cannot {op} '{}' without a primary key",
                self.descriptor.logical_name()
            )));
        }
        Ok(())
    }

    /// Create `entity` and return the id the service assigned (or the one
    /// the entity already carried).
    #[tracing::instrument(skip_all, fields(resource = self.descriptor.entity_set()))]
    pub async fn create<T: Entity>(&self, entity: &T) -> Result<Uuid, Error> {
        let op = MutationOp::Create;
        let payload = encode_entity(entity, self.descriptor, op)
            .map_err(|e| self.mutation_error(op, e))?;

        let request = RemoteRequest::new(Method::POST, self.descriptor.entity_set())
            .with_body(Value::Object(payload));
        let response = self
            .transport
            .send(request)
            .await
            .and_then(RemoteResponse::error_for_status)
            .map_err(|e| self.mutation_error(op, e))?;

        let id = response
            .header(ENTITY_ID_HEADER)
            .and_then(decode::entity_id_from_location)
            .or_else(|| self.key_from_body(&response.body))
            .or_else(|| Some(entity.id()).filter(|id| !id.is_nil()))
            .ok_or_else(|| {
                self.mutation_error(
                    op,
                    TransportError::Payload("created entity id missing from response".to_owned()),
                )
            })?;

        info!(%id, "entity created");
        Ok(id)
    }

    fn key_from_body(&self, body: &[u8]) -> Option<Uuid> {
        let key = self.descriptor.key_field().ok()?;
        let value: Value = serde_json::from_slice(body).ok()?;
        value.get(key.remote)?.as_str()?.parse().ok()
    }

    /// Update writable fields of `entity`. `Ok(false)` when the entity is
    /// gone and absence is tolerated.
    #[tracing::instrument(skip_all, fields(resource = self.descriptor.entity_set()))]
    pub async fn update<T: Entity>(&self, entity: &T) -> Result<bool, Error> {
        let op = MutationOp::Update;
        let id = entity.id();
        self.require_key(id, op)?;

        let payload = encode_entity(entity, self.descriptor, op)
            .map_err(|e| self.mutation_error(op, e))?;
        let request = RemoteRequest::new(Method::PATCH, self.descriptor.entity_set())
            .with_key(id)
            .with_header("If-Match", "*")
            .with_body(Value::Object(payload));

        self.send_keyed(request, id, op).await
    }

    /// Delete by key. `Ok(false)` when the entity is gone and absence is
    /// tolerated.
    #[tracing::instrument(skip_all, fields(resource = self.descriptor.entity_set(), %id))]
    pub async fn delete(&self, id: Uuid) -> Result<bool, Error> {
        let op = MutationOp::Delete;
        self.require_key(id, op)?;

        let request =
            RemoteRequest::new(Method::DELETE, self.descriptor.entity_set()).with_key(id);
        self.send_keyed(request, id, op).await
    }

    async fn send_keyed(
        &self,
        request: RemoteRequest,
        id: Uuid,
        op: MutationOp,
    ) -> Result<bool, Error> {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| self.mutation_error(op, e))?;
        if response.status == StatusCode::NOT_FOUND {
            return self.not_found(id).map(|()| false);
        }
        response
            .error_for_status()
            .map_err(|e| self.mutation_error(op, e))?;
        debug!(%id, %op, "mutation applied");
        Ok(true)
    }
}
