//! Typed query builder
//!
//! `QueryBuilder<S>` accumulates predicate groups, ordering, projection and
//! paging for schema `S` and produces a [`QuerySpec`].
//!
//! # Example
//!
//! ```rust,ignore
//! use crm_query::{QueryBuilder, SortDir};
//!
//! let spec = QueryBuilder::<ContactSchema>::new()
//!     .filter_and(|c| {
//!         c.equal(contact::status(), 1)
//!             .between(contact::age(), 18, 65);
//!     })?
//!     .order_by(contact::full_name(), SortDir::Asc)
//!     .distinct(true)
//!     .build();
//! ```

use crate::condition::Conditions;
use crate::query::{Paging, QuerySpec};
use crate::schema::{AsFieldName, Schema};
use crate::{Error, OrderKey, SortDir};
use std::marker::PhantomData;

/// Consuming builder for [`QuerySpec`], bound to schema `S`.
#[must_use]
pub struct QueryBuilder<S: Schema> {
    spec: QuerySpec,
    _phantom: PhantomData<S>,
}

impl<S: Schema> Clone for QueryBuilder<S> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<S: Schema> std::fmt::Debug for QueryBuilder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("spec", &self.spec)
            .finish()
    }
}

impl<S: Schema> QueryBuilder<S> {
    pub fn new() -> Self {
        Self {
            spec: QuerySpec::new(),
            _phantom: PhantomData,
        }
    }

    /// Add one AND group built by `build`.
    ///
    /// Conditions inside the closure are ANDed in call order; repeated calls
    /// AND their groups together.
    ///
    /// # Errors
    /// Returns the first argument violation recorded inside the closure.
    pub fn filter_and<F>(mut self, build: F) -> Result<Self, Error>
    where
        F: FnOnce(&mut Conditions<S>),
    {
        let mut conditions = Conditions::new();
        build(&mut conditions);
        let group = conditions.finish()?;
        self.spec = self.spec.with_group(group);
        Ok(self)
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.spec.distinct = distinct;
        self
    }

    /// Add an ordering key. Can be called multiple times.
    pub fn order_by<F>(mut self, field: F, dir: SortDir) -> Self
    where
        F: AsFieldName,
    {
        self.spec.order.push(OrderKey {
            field: field.as_field_name().to_owned(),
            dir,
        });
        self
    }

    /// Restrict the projection. Replaces any previous selection.
    ///
    /// ```rust,ignore
    /// builder.select([contact::full_name(), contact::email()])
    /// ```
    pub fn select<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsFieldName,
    {
        let names = fields
            .into_iter()
            .map(|f| f.as_field_name().to_owned())
            .collect();
        self.spec.select = Some(names);
        self
    }

    /// Request one page.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if `number` or `size` is zero.
    pub fn page(mut self, number: u32, size: u32) -> Result<Self, Error> {
        self.spec.paging = Some(Paging::new(number, size)?);
        Ok(self)
    }

    /// Spec accumulated so far.
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn build(self) -> QuerySpec {
        self.spec
    }
}

impl<S: Schema> Default for QueryBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}
