//! Typed predicate accumulation.
//!
//! `Conditions<S>` is the surface handed to `filter_and` closures. Each
//! constructor records one [`Condition`]; the first invalid argument is
//! latched and reported by [`Conditions::finish`], so a chain never has to
//! be broken up by `?`.

use crate::Error;
use crate::ast::Value;
use crate::schema::{FieldRef, IntoQueryValue, Schema};
use std::cmp::Ordering;
use std::marker::PhantomData;

/// One filter test against a single logical field.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Equal {
        field: &'static str,
        value: Value,
    },
    In {
        field: &'static str,
        values: Vec<Value>,
    },
    NotIn {
        field: &'static str,
        values: Vec<Value>,
    },
    /// Inclusive on both bounds.
    Between {
        field: &'static str,
        low: Value,
        high: Value,
    },
    NotBetween {
        field: &'static str,
        low: Value,
        high: Value,
    },
}

impl Condition {
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Condition::Equal { field, .. }
            | Condition::In { field, .. }
            | Condition::NotIn { field, .. }
            | Condition::Between { field, .. }
            | Condition::NotBetween { field, .. } => field,
        }
    }
}

/// Ordered conjunction of conditions, in construction order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConditionGroup {
    conditions: Vec<Condition>,
}

impl ConditionGroup {
    #[must_use]
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.conditions.len()
    }
}

impl IntoIterator for ConditionGroup {
    type Item = Condition;
    type IntoIter = std::vec::IntoIter<Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.into_iter()
    }
}

/// Predicate builder bound to the fields of schema `S`.
///
/// ```rust,ignore
/// let group = {
///     let mut c = Conditions::<ContactSchema>::new();
///     c.equal(contact::status(), 1)
///         .in_values(contact::id(), [a, b]);
///     c.finish()?
/// };
/// ```
pub struct Conditions<S: Schema> {
    conditions: Vec<Condition>,
    error: Option<Error>,
    _schema: PhantomData<S>,
}

impl<S: Schema> Default for Conditions<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Schema> Conditions<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
            error: None,
            _schema: PhantomData,
        }
    }

    /// `field = value`. A null value matches rows where the field is unset.
    pub fn equal<T, V>(&mut self, field: FieldRef<S, T>, value: V) -> &mut Self
    where
        T: IntoQueryValue,
        V: Into<T>,
    {
        let value = value.into().into_query_value();
        self.push(Ok(Condition::Equal {
            field: field.name(),
            value,
        }))
    }

    /// Field equals one of `values`. The set must be non-empty.
    pub fn in_values<T, I, V>(&mut self, field: FieldRef<S, T>, values: I) -> &mut Self
    where
        T: IntoQueryValue,
        I: IntoIterator<Item = V>,
        V: Into<T>,
    {
        let name = field.name();
        let condition = collect_set::<T, _, _>(name, values)
            .map(|values| Condition::In { field: name, values });
        self.push(condition)
    }

    /// Field equals none of `values`. The set must be non-empty.
    pub fn not_in<T, I, V>(&mut self, field: FieldRef<S, T>, values: I) -> &mut Self
    where
        T: IntoQueryValue,
        I: IntoIterator<Item = V>,
        V: Into<T>,
    {
        let name = field.name();
        let condition = collect_set::<T, _, _>(name, values)
            .map(|values| Condition::NotIn { field: name, values });
        self.push(condition)
    }

    /// `low <= field <= high`. String bounds are ordered case-insensitively.
    pub fn between<T, V>(&mut self, field: FieldRef<S, T>, low: V, high: V) -> &mut Self
    where
        T: IntoQueryValue,
        V: Into<T>,
    {
        let name = field.name();
        let condition = check_range::<T>(name, low.into(), high.into())
            .map(|(low, high)| Condition::Between { field: name, low, high });
        self.push(condition)
    }

    /// `field < low OR field > high`.
    pub fn not_between<T, V>(&mut self, field: FieldRef<S, T>, low: V, high: V) -> &mut Self
    where
        T: IntoQueryValue,
        V: Into<T>,
    {
        let name = field.name();
        let condition = check_range::<T>(name, low.into(), high.into())
            .map(|(low, high)| Condition::NotBetween { field: name, low, high });
        self.push(condition)
    }

    /// Number of conditions recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Freeze the accumulated conditions.
    ///
    /// # Errors
    /// Returns the first violation recorded by any constructor.
    pub fn finish(self) -> Result<ConditionGroup, Error> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(ConditionGroup::new(self.conditions)),
        }
    }

    fn push(&mut self, condition: Result<Condition, Error>) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        match condition {
            Ok(c) => self.conditions.push(c),
            Err(e) => self.error = Some(e),
        }
        self
    }
}

fn collect_set<T, I, V>(field: &str, values: I) -> Result<Vec<Value>, Error>
where
    T: IntoQueryValue,
    I: IntoIterator<Item = V>,
    V: Into<T>,
{
    let values: Vec<Value> = values
        .into_iter()
        .map(|v| v.into().into_query_value())
        .collect();

    if values.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "value set for '{field}' must not be empty"
        )));
    }
    if values.iter().any(Value::is_null) {
        return Err(Error::InvalidArgument(format!(
            "value set for '{field}' must not contain null"
        )));
    }
    Ok(values)
}

fn check_range<T: IntoQueryValue>(field: &str, low: T, high: T) -> Result<(Value, Value), Error> {
    if !T::KIND.is_orderable() {
        return Err(Error::UnsupportedOperation(format!(
            "range predicate on '{field}' of non-orderable type {}",
            T::KIND
        )));
    }

    let low = low.into_query_value();
    let high = high.into_query_value();
    if low.is_null() || high.is_null() {
        return Err(Error::InvalidArgument(format!(
            "range bounds for '{field}' must not be null"
        )));
    }
    if low.compare(&high) == Some(Ordering::Greater) {
        return Err(Error::InvalidArgument(format!(
            "range for '{field}' has low bound greater than high bound"
        )));
    }
    Ok((low, high))
}
