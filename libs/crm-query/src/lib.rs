#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Typed query construction for Dynamics CRM entities.
//!
//! The crate is pure: it knows how to describe entities, accumulate typed
//! predicates and render a finished [`QuerySpec`] as FetchXML. Sending the
//! query and decoding the answer lives in `crm-sdk`.

pub mod builder;
pub mod condition;
pub mod descriptor;
pub mod fetchxml;
pub mod limits;
pub mod page;
pub mod query;
pub mod schema;

pub use builder::QueryBuilder;
pub use condition::{Condition, ConditionGroup, Conditions};
pub use descriptor::{Entity, EntityDescriptor, FieldDescriptor, FieldKind};
pub use fetchxml::FetchXml;
pub use limits::QueryLimits;
pub use page::{Page, PageInfo};
pub use query::{Paging, QueryKind, QuerySpec};
pub use schema::{AsFieldName, FieldRef, IntoQueryValue, Schema};

pub mod ast {
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
    use std::cmp::Ordering;
    use uuid::Uuid;

    /// Resolved predicate tree. Field names are remote attribute names.
    #[derive(Clone, Debug, PartialEq)]
    pub enum Expr {
        And(Vec<Expr>),
        Or(Vec<Expr>),
        Compare {
            field: String,
            op: CompareOperator,
            value: Value,
        },
        In {
            field: String,
            values: Vec<Value>,
        },
        NotIn {
            field: String,
            values: Vec<Value>,
        },
    }

    impl Expr {
        /// Combine two expressions with AND, flattening nested conjunctions.
        #[must_use]
        pub fn and(self, other: Expr) -> Expr {
            match (self, other) {
                (Expr::And(mut left), Expr::And(right)) => {
                    left.extend(right);
                    Expr::And(left)
                }
                (Expr::And(mut left), right) => {
                    left.push(right);
                    Expr::And(left)
                }
                (left, right) => Expr::And(vec![left, right]),
            }
        }

        /// Combine two expressions with OR.
        #[must_use]
        pub fn or(self, other: Expr) -> Expr {
            Expr::Or(vec![self, other])
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum CompareOperator {
        Eq,
        Ne,
        Gt,
        Ge,
        Lt,
        Le,
    }

    impl CompareOperator {
        /// FetchXML `operator` attribute value.
        #[must_use]
        pub fn as_fetch_operator(self) -> &'static str {
            match self {
                CompareOperator::Eq => "eq",
                CompareOperator::Ne => "ne",
                CompareOperator::Gt => "gt",
                CompareOperator::Ge => "ge",
                CompareOperator::Lt => "lt",
                CompareOperator::Le => "le",
            }
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    pub enum Value {
        Null,
        Bool(bool),
        Number(BigDecimal),
        Uuid(Uuid),
        DateTime(DateTime<Utc>),
        Date(NaiveDate),
        Time(NaiveTime),
        String(String),
    }

    impl Value {
        #[must_use]
        pub fn is_null(&self) -> bool {
            matches!(self, Value::Null)
        }

        /// Order two values of the same orderable kind.
        ///
        /// Returns `None` for mixed kinds and for kinds without a natural
        /// order (null, bool, uuid). Strings compare case-insensitively,
        /// matching the service collation.
        #[must_use]
        pub fn compare(&self, other: &Value) -> Option<Ordering> {
            match (self, other) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
                (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
                (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
                (Value::String(a), Value::String(b)) => Some(
                    a.chars()
                        .flat_map(char::to_lowercase)
                        .cmp(b.chars().flat_map(char::to_lowercase)),
                ),
                _ => None,
            }
        }
    }

    impl std::fmt::Display for Value {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Value::Null => write!(f, "null"),
                Value::Bool(_) => write!(f, "bool"),
                Value::Number(_) => write!(f, "number"),
                Value::Uuid(_) => write!(f, "uuid"),
                Value::DateTime(_) => write!(f, "datetime"),
                Value::Date(_) => write!(f, "date"),
                Value::Time(_) => write!(f, "time"),
                Value::String(_) => write!(f, "string"),
            }
        }
    }
}

// Ordering primitives
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SortDir {
    #[serde(rename = "asc")]
    Asc,
    #[serde(rename = "desc")]
    Desc,
}

impl SortDir {
    #[must_use]
    pub fn is_descending(self) -> bool {
        matches!(self, SortDir::Desc)
    }
}

/// One ordering key. `field` is the logical (schema) field name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderKey {
    pub field: String,
    pub dir: SortDir,
}

impl std::fmt::Display for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dir = match self.dir {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        };
        write!(f, "{} {dir}", self.field)
    }
}

/// Unified error type for query construction and translation.
///
/// Every variant is raised before anything is sent to the remote service:
/// builder-time violations surface from `filter_and`, the rest from
/// translation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed predicate or paging argument (empty set, inverted range, page 0).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Field is not part of the entity's field map.
    #[error("unknown field '{field}' on entity '{entity}'")]
    UnknownField { entity: String, field: String },

    /// Operation not valid for the field's semantic type.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Descriptor violates a registration invariant.
    #[error("invalid descriptor for entity '{entity}': {reason}")]
    InvalidDescriptor { entity: String, reason: String },
}
