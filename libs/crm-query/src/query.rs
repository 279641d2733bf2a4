use crate::Error;
use crate::OrderKey;
use crate::condition::ConditionGroup;

/// What a translated query returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueryKind {
    #[default]
    Rows,
    /// Single aggregate row with the number of matching records.
    Count,
}

/// 1-indexed page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Paging {
    number: u32,
    size: u32,
}

impl Paging {
    /// # Errors
    /// Returns `Error::InvalidArgument` if `number` or `size` is zero.
    pub fn new(number: u32, size: u32) -> Result<Self, Error> {
        if number == 0 {
            return Err(Error::InvalidArgument(
                "page number must be at least 1".to_owned(),
            ));
        }
        if size == 0 {
            return Err(Error::InvalidArgument(
                "page size must be at least 1".to_owned(),
            ));
        }
        Ok(Self { number, size })
    }

    #[must_use]
    pub fn first(size: u32) -> Self {
        Self {
            number: 1,
            size: size.max(1),
        }
    }

    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            number: self.number.saturating_add(1),
            size: self.size,
        }
    }
}

/// Finalized description of a read.
///
/// Field names in `order` and `select` are logical names; the translator
/// resolves them against the entity descriptor.
#[derive(Clone, Debug, Default, PartialEq)]
#[must_use]
pub struct QuerySpec {
    pub kind: QueryKind,
    /// ANDed together in order.
    pub groups: Vec<ConditionGroup>,
    pub distinct: bool,
    pub paging: Option<Paging>,
    pub order: Vec<OrderKey>,
    /// `None` projects every mapped field.
    pub select: Option<Vec<String>>,
    pub with_total_count: bool,
    /// Opaque cookie from the previous page, speeds up deep paging.
    pub paging_cookie: Option<String>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: ConditionGroup) -> Self {
        if !group.is_empty() {
            self.groups.push(group);
        }
        self
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = Some(paging);
        self
    }

    pub fn with_order(mut self, order: Vec<OrderKey>) -> Self {
        self.order = order;
        self
    }

    pub fn with_select(mut self, fields: Vec<String>) -> Self {
        self.select = Some(fields);
        self
    }

    pub fn with_total_count(mut self, enabled: bool) -> Self {
        self.with_total_count = enabled;
        self
    }

    pub fn with_paging_cookie(mut self, cookie: Option<String>) -> Self {
        self.paging_cookie = cookie;
        self
    }

    /// Count-only variant: predicates and distinct are kept, everything
    /// that shapes the row set is dropped.
    pub fn to_count(&self) -> Self {
        Self {
            kind: QueryKind::Count,
            groups: self.groups.clone(),
            distinct: self.distinct,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_filter(&self) -> bool {
        self.groups.iter().any(|g| !g.is_empty())
    }

    /// Total number of conditions across all groups.
    #[must_use]
    pub fn condition_count(&self) -> usize {
        self.groups.iter().map(ConditionGroup::len).sum()
    }
}
