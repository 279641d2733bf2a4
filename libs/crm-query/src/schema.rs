//! Schema types for type-safe query building.
//!
//! - `Schema` trait: maps field enums to logical field names
//! - `FieldRef`: typed field token bound to a schema and a Rust value type
//! - `IntoQueryValue`: conversion of field values into query literals
//!
//! Logical names are what the caller sees; the entity descriptor maps them
//! to remote attribute names at translation time.

use crate::ast::Value;
use crate::descriptor::FieldKind;
use bigdecimal::BigDecimal;
use std::marker::PhantomData;

/// Schema trait defining field enums and their logical names.
///
/// Usually generated by `#[derive(CrmEntity)]`.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Copy, Clone, Eq, PartialEq)]
/// enum ContactField {
///     Id,
///     FullName,
/// }
///
/// struct ContactSchema;
///
/// impl Schema for ContactSchema {
///     type Field = ContactField;
///
///     fn field_name(field: Self::Field) -> &'static str {
///         match field {
///             ContactField::Id => "id",
///             ContactField::FullName => "full_name",
///         }
///     }
/// }
/// ```
pub trait Schema {
    /// The field enum type (must be Copy + Eq)
    type Field: Copy + Eq;

    /// Map a field enum to its logical name
    fn field_name(field: Self::Field) -> &'static str;
}

/// Type-safe field reference holding schema and Rust type information.
///
/// **NOTE:** equality and hashing are based solely on the schema field; `T`
/// only constrains which values predicates accept.
pub struct FieldRef<S: Schema, T> {
    field: S::Field,
    _phantom: PhantomData<(S, T)>,
}

impl<S: Schema, T> FieldRef<S, T> {
    /// Create a new typed field reference.
    ///
    /// ```rust,ignore
    /// const FULL_NAME: FieldRef<ContactSchema, String> = FieldRef::new(ContactField::FullName);
    /// ```
    #[must_use]
    pub const fn new(field: S::Field) -> Self {
        Self {
            field,
            _phantom: PhantomData,
        }
    }

    /// Logical field name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        S::field_name(self.field)
    }

    #[must_use]
    pub fn key(&self) -> S::Field {
        self.field
    }
}

impl<S: Schema, T> Clone for FieldRef<S, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: Schema, T> Copy for FieldRef<S, T> {}

impl<S: Schema, T> std::fmt::Debug for FieldRef<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRef")
            .field("field", &self.name())
            .finish()
    }
}

impl<S: Schema, T> PartialEq for FieldRef<S, T> {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field
    }
}

impl<S: Schema, T> Eq for FieldRef<S, T> {}

impl<S: Schema, T> std::hash::Hash for FieldRef<S, T>
where
    S::Field: std::hash::Hash,
{
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.field.hash(state);
    }
}

/// Extracts the logical name from a field reference.
///
/// Lets `order_by` and `select` accept fields of different value types.
pub trait AsFieldName {
    fn as_field_name(&self) -> &'static str;
}

impl<S: Schema, T> AsFieldName for FieldRef<S, T> {
    fn as_field_name(&self) -> &'static str {
        self.name()
    }
}

impl<T: AsFieldName + ?Sized> AsFieldName for &T {
    fn as_field_name(&self) -> &'static str {
        (*self).as_field_name()
    }
}

/// Types that can appear as field values in predicates.
pub trait IntoQueryValue {
    /// Semantic kind of a field holding this type.
    const KIND: FieldKind;

    /// Whether a field of this type may be unset.
    const NULLABLE: bool = false;

    /// Convert this value into a query literal.
    fn into_query_value(self) -> Value;
}

impl IntoQueryValue for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn into_query_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoQueryValue for uuid::Uuid {
    const KIND: FieldKind = FieldKind::Uuid;

    fn into_query_value(self) -> Value {
        Value::Uuid(self)
    }
}

impl IntoQueryValue for String {
    const KIND: FieldKind = FieldKind::String;

    fn into_query_value(self) -> Value {
        Value::String(self)
    }
}

impl IntoQueryValue for i16 {
    const KIND: FieldKind = FieldKind::Int;

    fn into_query_value(self) -> Value {
        Value::Number(self.into())
    }
}

impl IntoQueryValue for i32 {
    const KIND: FieldKind = FieldKind::Int;

    fn into_query_value(self) -> Value {
        Value::Number(self.into())
    }
}

impl IntoQueryValue for i64 {
    const KIND: FieldKind = FieldKind::Int;

    fn into_query_value(self) -> Value {
        Value::Number(self.into())
    }
}

impl IntoQueryValue for u32 {
    const KIND: FieldKind = FieldKind::Int;

    fn into_query_value(self) -> Value {
        Value::Number(self.into())
    }
}

impl IntoQueryValue for BigDecimal {
    const KIND: FieldKind = FieldKind::Decimal;

    fn into_query_value(self) -> Value {
        Value::Number(self)
    }
}

impl IntoQueryValue for chrono::DateTime<chrono::Utc> {
    const KIND: FieldKind = FieldKind::DateTimeUtc;

    fn into_query_value(self) -> Value {
        Value::DateTime(self)
    }
}

impl IntoQueryValue for chrono::NaiveDate {
    const KIND: FieldKind = FieldKind::Date;

    fn into_query_value(self) -> Value {
        Value::Date(self)
    }
}

impl IntoQueryValue for chrono::NaiveTime {
    const KIND: FieldKind = FieldKind::Time;

    fn into_query_value(self) -> Value {
        Value::Time(self)
    }
}

// Nullable columns keep the kind of their inner type.
impl<V: IntoQueryValue> IntoQueryValue for Option<V> {
    const KIND: FieldKind = V::KIND;
    const NULLABLE: bool = true;

    fn into_query_value(self) -> Value {
        self.map_or(Value::Null, IntoQueryValue::into_query_value)
    }
}
