//! Entity descriptors: the static mapping from a typed entity to its remote
//! entity set and attribute names.

use crate::Error;
use crate::schema::Schema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    Int,
    Decimal,
    Bool,
    Uuid,
    DateTimeUtc,
    Date,
    Time,
    /// Reference to another entity, carried as a GUID.
    Lookup,
}

impl FieldKind {
    /// Whether range predicates make sense for this kind.
    #[must_use]
    pub fn is_orderable(self) -> bool {
        matches!(
            self,
            FieldKind::String
                | FieldKind::Int
                | FieldKind::Decimal
                | FieldKind::DateTimeUtc
                | FieldKind::Date
                | FieldKind::Time
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::String => write!(f, "String"),
            FieldKind::Int => write!(f, "Int"),
            FieldKind::Decimal => write!(f, "Decimal"),
            FieldKind::Bool => write!(f, "Bool"),
            FieldKind::Uuid => write!(f, "Uuid"),
            FieldKind::DateTimeUtc => write!(f, "DateTimeUtc"),
            FieldKind::Date => write!(f, "Date"),
            FieldKind::Time => write!(f, "Time"),
            FieldKind::Lookup => write!(f, "Lookup"),
        }
    }
}

/// Mapping of one logical field to its remote attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Logical name, as produced by `Schema::field_name`.
    pub name: &'static str,
    /// Remote attribute logical name (e.g. `fullname`).
    pub remote: &'static str,
    pub kind: FieldKind,
    /// Entity set the lookup points to (e.g. `systemusers`).
    pub lookup_target: Option<&'static str>,
    /// Never written by create/update.
    pub read_only: bool,
    /// The remote attribute may be unset. Complement predicates then also
    /// match unset rows.
    pub nullable: bool,
}

impl FieldDescriptor {
    #[must_use]
    pub const fn new(name: &'static str, remote: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            remote,
            kind,
            lookup_target: None,
            read_only: false,
            nullable: false,
        }
    }

    /// Lookup field; a lookup may always be unset.
    #[must_use]
    pub const fn lookup(name: &'static str, remote: &'static str, target: &'static str) -> Self {
        Self {
            name,
            remote,
            kind: FieldKind::Lookup,
            lookup_target: Some(target),
            read_only: false,
            nullable: true,
        }
    }

    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark nullable when `nullable` is set; lookups stay nullable.
    #[must_use]
    pub const fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = self.nullable || nullable;
        self
    }

    /// Key under which the Web API returns this attribute in a row payload.
    ///
    /// Lookups come back as `_{attribute}_value`.
    #[must_use]
    pub fn payload_key(&self) -> Cow<'static, str> {
        if self.kind == FieldKind::Lookup {
            Cow::Owned(format!("_{}_value", self.remote))
        } else {
            Cow::Borrowed(self.remote)
        }
    }
}

/// Static description of a remote entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityDescriptor {
    logical_name: &'static str,
    entity_set: &'static str,
    primary_key: &'static str,
    fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    /// Build a descriptor. Invariants are checked by [`EntityDescriptor::validate`].
    #[must_use]
    pub fn new(
        logical_name: &'static str,
        entity_set: &'static str,
        primary_key: &'static str,
        fields: Vec<FieldDescriptor>,
    ) -> Self {
        Self {
            logical_name,
            entity_set,
            primary_key,
            fields,
        }
    }

    /// Entity logical name used by FetchXML (`contact`).
    #[must_use]
    pub fn logical_name(&self) -> &'static str {
        self.logical_name
    }

    /// Entity set name used in Web API URLs (`contacts`).
    #[must_use]
    pub fn entity_set(&self) -> &'static str {
        self.entity_set
    }

    /// Logical name of the primary-key field.
    #[must_use]
    pub fn primary_key(&self) -> &'static str {
        self.primary_key
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolve a logical field name.
    ///
    /// # Errors
    /// Returns `Error::UnknownField` if the field is not mapped.
    pub fn resolve(&self, name: &str) -> Result<&FieldDescriptor, Error> {
        self.field(name).ok_or_else(|| Error::UnknownField {
            entity: self.logical_name.to_owned(),
            field: name.to_owned(),
        })
    }

    /// Descriptor of the primary-key field.
    ///
    /// # Errors
    /// Returns `Error::UnknownField` if the key is not mapped.
    pub fn key_field(&self) -> Result<&FieldDescriptor, Error> {
        self.resolve(self.primary_key)
    }

    /// Check registration invariants: the key is mapped and is a GUID,
    /// logical and remote names are unique, lookups name their target.
    ///
    /// # Errors
    /// Returns `Error::InvalidDescriptor` describing the first violation.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |reason: String| Error::InvalidDescriptor {
            entity: self.logical_name.to_owned(),
            reason,
        };

        if self.logical_name.is_empty() || self.entity_set.is_empty() {
            return Err(invalid("logical name and entity set must not be empty".to_owned()));
        }

        let key = self
            .field(self.primary_key)
            .ok_or_else(|| invalid(format!("primary key '{}' is not mapped", self.primary_key)))?;
        if key.kind != FieldKind::Uuid {
            return Err(invalid(format!(
                "primary key '{}' must be a Uuid, found {}",
                key.name, key.kind
            )));
        }

        let mut names = HashSet::new();
        let mut remotes = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
            if !remotes.insert(field.remote) {
                return Err(invalid(format!("duplicate remote attribute '{}'", field.remote)));
            }
            if field.kind == FieldKind::Lookup && field.lookup_target.is_none() {
                return Err(invalid(format!("lookup '{}' has no target", field.name)));
            }
        }

        Ok(())
    }
}

/// A typed CRM entity: a plain record plus its static descriptor.
///
/// Implemented by `#[derive(CrmEntity)]`. Serde names must be the logical
/// field names; remote naming lives only in the descriptor.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    type Schema: Schema;

    fn descriptor() -> EntityDescriptor;

    /// Primary-key value; `Uuid::nil()` means "not assigned yet".
    fn id(&self) -> Uuid;
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn contact() -> EntityDescriptor {
        EntityDescriptor::new(
            "contact",
            "contacts",
            "id",
            vec![
                FieldDescriptor::new("id", "contactid", FieldKind::Uuid),
                FieldDescriptor::new("full_name", "fullname", FieldKind::String),
                FieldDescriptor::new("created_on", "createdon", FieldKind::DateTimeUtc)
                    .read_only(),
                FieldDescriptor::lookup("owner_id", "ownerid", "systemusers"),
            ],
        )
    }

    #[test]
    fn test_valid_descriptor() {
        let d = contact();
        assert!(d.validate().is_ok());
        assert_eq!(d.key_field().unwrap().remote, "contactid");
        assert!(d.field("created_on").unwrap().read_only);
    }

    #[test]
    fn test_nullability() {
        let d = contact();
        assert!(d.field("owner_id").unwrap().nullable);
        assert!(!d.field("full_name").unwrap().nullable);
        assert!(
            FieldDescriptor::new("age", "new_age", FieldKind::Int)
                .with_nullable(true)
                .nullable
        );
        assert!(
            FieldDescriptor::lookup("owner", "ownerid", "systemusers")
                .with_nullable(false)
                .nullable
        );
    }

    #[test]
    fn test_resolve_unknown_field() {
        let err = contact().resolve("nope").unwrap_err();
        assert_eq!(
            err,
            Error::UnknownField {
                entity: "contact".to_owned(),
                field: "nope".to_owned()
            }
        );
    }

    #[test]
    fn test_missing_primary_key_rejected() {
        let d = EntityDescriptor::new(
            "contact",
            "contacts",
            "id",
            vec![FieldDescriptor::new("name", "fullname", FieldKind::String)],
        );
        assert!(matches!(d.validate(), Err(Error::InvalidDescriptor { .. })));
    }

    #[test]
    fn test_non_uuid_primary_key_rejected() {
        let d = EntityDescriptor::new(
            "contact",
            "contacts",
            "id",
            vec![FieldDescriptor::new("id", "contactid", FieldKind::Int)],
        );
        assert!(matches!(d.validate(), Err(Error::InvalidDescriptor { .. })));
    }

    #[test]
    fn test_duplicate_remote_rejected() {
        let d = EntityDescriptor::new(
            "contact",
            "contacts",
            "id",
            vec![
                FieldDescriptor::new("id", "contactid", FieldKind::Uuid),
                FieldDescriptor::new("alias", "contactid", FieldKind::Uuid),
            ],
        );
        let Err(Error::InvalidDescriptor { reason, .. }) = d.validate() else {
            panic!("expected InvalidDescriptor");
        };
        assert!(reason.contains("contactid"));
    }

    #[test]
    fn test_lookup_payload_key() {
        let d = contact();
        assert_eq!(d.field("owner_id").unwrap().payload_key(), "_ownerid_value");
        assert_eq!(d.field("full_name").unwrap().payload_key(), "fullname");
    }

    #[test]
    fn test_orderable_kinds() {
        assert!(FieldKind::Int.is_orderable());
        assert!(FieldKind::DateTimeUtc.is_orderable());
        assert!(!FieldKind::Bool.is_orderable());
        assert!(!FieldKind::Uuid.is_orderable());
        assert!(!FieldKind::Lookup.is_orderable());
    }
}
