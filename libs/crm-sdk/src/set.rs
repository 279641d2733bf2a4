use crate::context::Context;
use crate::error::Error;
use crate::exec::Engine;
use crate::pager::{ItemsPager, PagesPager};
use crm_query::{
    AsFieldName, Conditions, Entity, EntityDescriptor, Page, Paging, QueryBuilder, QuerySpec,
    SortDir,
};
use futures_core::Stream;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Queryable, writable view of one entity type.
///
/// Chain methods consume and return the set; terminal reads consume it too,
/// so the query they execute is a frozen snapshot.
pub struct EntitySet<T: Entity> {
    ctx: Context,
    descriptor: Arc<EntityDescriptor>,
    query: QueryBuilder<T::Schema>,
}

impl<T: Entity> Clone for EntitySet<T> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            descriptor: Arc::clone(&self.descriptor),
            query: self.query.clone(),
        }
    }
}

impl<T: Entity> fmt::Debug for EntitySet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySet")
            .field("entity", &self.descriptor.logical_name())
            .field("spec", self.query.spec())
            .finish_non_exhaustive()
    }
}

impl<T: Entity> EntitySet<T> {
    pub(crate) fn new(ctx: Context, descriptor: Arc<EntityDescriptor>) -> Self {
        Self {
            ctx,
            descriptor,
            query: QueryBuilder::new(),
        }
    }

    fn engine(&self) -> Engine<'_> {
        Engine::new(self.ctx.transport(), &self.descriptor, self.ctx.settings())
    }

    #[must_use]
    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    /// Spec accumulated so far.
    #[must_use]
    pub fn spec(&self) -> &QuerySpec {
        self.query.spec()
    }

    /// AND one group of conditions onto the query.
    ///
    /// # Errors
    /// The first invalid condition built inside `build`; nothing is sent.
    pub fn filter_and<F>(mut self, build: F) -> Result<Self, Error>
    where
        F: FnOnce(&mut Conditions<T::Schema>),
    {
        self.query = self.query.filter_and(build)?;
        Ok(self)
    }

    #[must_use]
    pub fn distinct(mut self, distinct: bool) -> Self {
        self.query = self.query.distinct(distinct);
        self
    }

    #[must_use]
    pub fn order_by<F: AsFieldName>(mut self, field: F, dir: SortDir) -> Self {
        self.query = self.query.order_by(field, dir);
        self
    }

    #[must_use]
    pub fn select<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsFieldName,
    {
        self.query = self.query.select(fields);
        self
    }

    /// First matching row, or `None`.
    ///
    /// # Errors
    /// Translation, limit and remote failures.
    pub async fn first_or_default(self) -> Result<Option<T>, Error> {
        let spec = self.query.spec().clone();
        self.engine().first(spec).await
    }

    /// Every row the query selects, read page by page.
    ///
    /// # Errors
    /// Translation, limit and remote failures.
    pub async fn to_list(self) -> Result<Vec<T>, Error> {
        self.engine().list(self.query.spec()).await
    }

    /// Number of matching rows.
    ///
    /// # Errors
    /// Translation, limit and remote failures.
    pub async fn count(self) -> Result<u64, Error> {
        self.engine().count(self.query.spec()).await
    }

    /// Page `number` (1-based) of `size` rows, with the total count when the
    /// service reports one.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for a zero page number or size, before
    /// anything is sent; otherwise as [`to_list`](Self::to_list).
    pub async fn to_paged_list(self, number: u32, size: u32) -> Result<Page<T>, Error> {
        let paging = Paging::new(number, size)?;
        let spec = self.query.spec().clone().with_paging(paging);
        self.engine().page(spec).await
    }

    /// Single entity by primary key, ignoring any filters on the set.
    ///
    /// # Errors
    /// [`Error::NotFound`] for a missing entity when `throw_on_error` is set;
    /// remote failures.
    pub async fn find(&self, id: Uuid) -> Result<Option<T>, Error> {
        self.engine().find(id).await
    }

    /// Stream of pages of `page_size` rows (at least 1), following the
    /// service's paging cookie.
    #[must_use]
    pub fn pages(self, page_size: u32) -> impl Stream<Item = Result<Page<T>, Error>> {
        let base = self.query.spec().clone();
        PagesPager::new(base, page_size, move |spec| {
            let set = self.clone();
            async move { set.engine().page(spec).await }
        })
    }

    /// Stream of rows across pages of `page_size`.
    #[must_use]
    pub fn items(self, page_size: u32) -> impl Stream<Item = Result<T, Error>> {
        let base = self.query.spec().clone();
        ItemsPager::new(base, page_size, move |spec| {
            let set = self.clone();
            async move { set.engine().page(spec).await }
        })
    }

    /// Create `entity`; returns its id.
    ///
    /// # Errors
    /// Remote failures, or a response that carries no id.
    pub async fn add(&self, entity: &T) -> Result<Uuid, Error> {
        self.engine().create(entity).await
    }

    /// Write `entity`'s fields. `Ok(false)` if it no longer exists and
    /// `throw_on_error` is off.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for a nil id, before anything is sent;
    /// [`Error::NotFound`]; remote failures.
    pub async fn update(&self, entity: &T) -> Result<bool, Error> {
        self.engine().update(entity).await
    }

    /// Delete `entity` by its id.
    ///
    /// # Errors
    /// As [`update`](Self::update).
    pub async fn delete(&self, entity: &T) -> Result<bool, Error> {
        self.delete_by_id(entity.id()).await
    }

    /// # Errors
    /// As [`update`](Self::update).
    pub async fn delete_by_id(&self, id: Uuid) -> Result<bool, Error> {
        self.engine().delete(id).await
    }
}
