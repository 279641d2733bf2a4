use crate::error::Error;
use crm_query::{Entity, EntityDescriptor};
use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

/// Descriptors of every entity type known to a context.
///
/// Filled once by [`ContextBuilder`](crate::ContextBuilder) and read-only
/// afterwards.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    entries: HashMap<TypeId, Arc<EntityDescriptor>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store `T`'s descriptor. Registering a type twice keeps
    /// the first descriptor.
    ///
    /// # Errors
    /// [`Error::InvalidDescriptor`] when the descriptor breaks an invariant
    /// or its entity set is already claimed by another type.
    pub fn register<T: Entity>(&mut self) -> Result<(), Error> {
        let type_id = TypeId::of::<T>();
        if self.entries.contains_key(&type_id) {
            return Ok(());
        }

        let descriptor = T::descriptor();
        descriptor.validate()?;
        if let Some(existing) = self
            .entries
            .values()
            .find(|d| d.entity_set() == descriptor.entity_set())
        {
            return Err(Error::InvalidDescriptor {
                entity: descriptor.logical_name().to_owned(),
                reason: format!(
                    "entity set '{}' is already registered for '{}'",
                    descriptor.entity_set(),
                    existing.logical_name()
                ),
            });
        }

        tracing::debug!(
            entity = descriptor.logical_name(),
            set = descriptor.entity_set(),
            fields = descriptor.fields().len(),
            "registered entity"
        );
        self.entries.insert(type_id, Arc::new(descriptor));
        Ok(())
    }

    /// Descriptor registered for `T`.
    ///
    /// # Errors
    /// [`Error::UnregisteredEntity`] when `T` was never registered.
    pub fn get<T: Entity>(&self) -> Result<Arc<EntityDescriptor>, Error> {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or(Error::UnregisteredEntity(type_name::<T>()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
