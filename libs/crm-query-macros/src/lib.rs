//! # crm-query-macros
//!
//! Derive macro that turns a plain record into a typed CRM entity:
//! - `CrmEntity`: generates the field enum, the `Schema` impl, typed field
//!   constructors and the `Entity` impl (descriptor + key accessor)
//!
//! Generated code references `crm-query` types only.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use proc_macro::TokenStream;
use proc_macro_error2::proc_macro_error;
use syn::{DeriveInput, parse_macro_input};

mod crm_entity;

/// Derive macro mapping a struct onto a remote CRM entity.
///
/// Struct attribute: `#[crm(entity = "contact", set = "contacts")]`. The
/// entity logical name defaults to the lowercased struct name.
///
/// Field attributes:
/// - `#[crm(key)]` marks the primary key (defaults to a field named `id`)
/// - `#[crm(name = "fullname")]` remote attribute name (defaults to the field name)
/// - `#[crm(lookup = "systemusers")]` GUID reference to another entity set
/// - `#[crm(read_only)]` never written by create/update
///
/// # Example
///
/// ```ignore
/// use crm_query_macros::CrmEntity;
///
/// #[derive(Serialize, Deserialize, CrmEntity)]
/// #[crm(entity = "contact", set = "contacts")]
/// pub struct Contact {
///     #[crm(key, name = "contactid")]
///     pub id: uuid::Uuid,
///     #[crm(name = "fullname")]
///     pub full_name: Option<String>,
///     #[crm(name = "ownerid", lookup = "systemusers")]
///     pub owner: Option<uuid::Uuid>,
/// }
/// ```
#[proc_macro_derive(CrmEntity, attributes(crm))]
#[proc_macro_error]
pub fn derive_crm_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    crm_entity::expand_derive_crm_entity(&input).into()
}
