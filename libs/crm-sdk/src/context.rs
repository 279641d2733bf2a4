use crate::config::CrmConfig;
use crate::error::Error;
use crate::registry::Registry;
use crate::set::EntitySet;
use crate::transport::Transport;
use crm_query::{Entity, QueryLimits};
use std::fmt;
use std::sync::Arc;

/// Per-context execution settings shared by every entity set.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    /// Raise `NotFound` on a remote 404 instead of returning `None`/`false`.
    pub throw_on_error: bool,
    pub limits: QueryLimits,
}

struct Inner {
    registry: Registry,
    transport: Arc<dyn Transport>,
    settings: Settings,
}

/// Entry point: a registry of entity types bound to one transport.
///
/// Cheap to clone; every clone shares the same transport and registry.
///
/// ```rust,ignore
/// let ctx = Context::builder(config)
///     .entity::<Contact>()
///     .entity::<Account>()
///     .build()?;
///
/// let adults = ctx
///     .set::<Contact>()?
///     .filter_and(|c| { c.between(contact::age(), 18, 120); })?
///     .to_list()
///     .await?;
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    pub fn builder(config: CrmConfig) -> ContextBuilder {
        ContextBuilder::new(config)
    }

    /// Query and mutation entry point for `T`.
    ///
    /// # Errors
    /// [`Error::UnregisteredEntity`] when `T` was not registered on the
    /// builder.
    pub fn set<T: Entity>(&self) -> Result<EntitySet<T>, Error> {
        let descriptor = self.inner.registry.get::<T>()?;
        Ok(EntitySet::new(self.clone(), descriptor))
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("entities", &self.inner.registry.len())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

/// Registration hook for a [`Context`].
///
/// Registration errors are latched and reported by [`build`](Self::build).
#[must_use]
pub struct ContextBuilder {
    config: CrmConfig,
    transport: Option<Arc<dyn Transport>>,
    registry: Registry,
    error: Option<Error>,
}

impl ContextBuilder {
    pub fn new(config: CrmConfig) -> Self {
        Self {
            config,
            transport: None,
            registry: Registry::new(),
            error: None,
        }
    }

    /// Use `transport` instead of the default HTTP transport.
    pub fn transport(self, transport: impl Transport + 'static) -> Self {
        self.shared_transport(Arc::new(transport))
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Register entity type `T`.
    pub fn entity<T: Entity>(mut self) -> Self {
        if self.error.is_none()
            && let Err(e) = self.registry.register::<T>()
        {
            self.error = Some(e);
        }
        self
    }

    /// # Errors
    /// The first registration error, or [`Error::Config`] when no transport
    /// is available.
    pub fn build(self) -> Result<Context, Error> {
        if let Some(e) = self.error {
            return Err(e);
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(&self.config)?,
        };

        tracing::info!(
            url = %self.config.connection.url,
            entities = self.registry.len(),
            throw_on_error = self.config.throw_on_error,
            "CRM context ready"
        );

        Ok(Context {
            inner: Arc::new(Inner {
                registry: self.registry,
                transport,
                settings: Settings {
                    throw_on_error: self.config.throw_on_error,
                    limits: self.config.limits,
                },
            }),
        })
    }
}

#[cfg(feature = "http")]
fn default_transport(config: &CrmConfig) -> Result<Arc<dyn Transport>, Error> {
    let transport = crate::http_transport::HttpTransport::new(&config.connection)?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "http"))]
fn default_transport(_config: &CrmConfig) -> Result<Arc<dyn Transport>, Error> {
    Err(Error::Config(
        "no transport configured and the `http` feature is disabled".to_owned(),
    ))
}
