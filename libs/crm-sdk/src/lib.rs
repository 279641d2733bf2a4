#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Typed data access for Dynamics CRM (Dataverse) entities.
//!
//! A [`Context`] holds the registered entity descriptors and one
//! [`Transport`]. `ctx.set::<T>()` returns an [`EntitySet`] whose
//! `filter_and` chain builds a query that is translated to FetchXML when a
//! terminal call runs:
//!
//! ```rust,ignore
//! use crm_sdk::{Context, CrmConfig, CrmEntity};
//!
//! #[derive(CrmEntity, serde::Serialize, serde::Deserialize)]
//! #[crm(entity = "contact", set = "contacts")]
//! pub struct Contact {
//!     #[crm(key, name = "contactid")]
//!     pub id: uuid::Uuid,
//!     #[crm(name = "fullname")]
//!     pub full_name: Option<String>,
//! }
//!
//! let ctx = Context::builder(config).entity::<Contact>().build()?;
//! let page = ctx
//!     .set::<Contact>()?
//!     .filter_and(|c| { c.in_values(contact::id(), [a, b]); })?
//!     .to_paged_list(1, 50)
//!     .await?;
//! ```
//!
//! Generated code refers to `::crm_query`, so crates using the derive also
//! depend on `dcx-crm-query` directly.

mod config;
mod context;
mod decode;
mod error;
mod exec;
#[cfg(feature = "http")]
mod http_transport;
mod mutate;
mod pager;
mod registry;
mod set;
mod transport;

pub use config::{ConnectionConfig, CrmConfig, DEFAULT_API_VERSION, DEFAULT_TIMEOUT};
pub use context::{Context, ContextBuilder, Settings};
pub use error::{Error, MutationOp, TransportError};
pub use exec::PREFER_ANNOTATIONS;
#[cfg(feature = "http")]
pub use http_transport::{HttpTransport, TokenSource};
pub use mutate::{ENTITY_ID_HEADER, encode_entity};
pub use pager::{ItemsPager, PagesPager};
pub use registry::Registry;
pub use set::EntitySet;
pub use transport::{RemoteRequest, RemoteResponse, Transport};

pub use crm_query::{
    Entity, EntityDescriptor, FieldDescriptor, FieldKind, Page, PageInfo, QueryLimits, QuerySpec,
    SortDir,
};

#[cfg(feature = "derive")]
pub use crm_query_macros::CrmEntity;
