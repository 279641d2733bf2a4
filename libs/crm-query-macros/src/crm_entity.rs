use heck::{ToSnakeCase, ToUpperCamelCase};
use proc_macro2::TokenStream;
use proc_macro_error2::{abort, emit_error};
use quote::quote;
use syn::ext::IdentExt;
use syn::spanned::Spanned;
use syn::{Attribute, Data, DeriveInput, Fields, Ident, LitStr, Type};

/// One mapped struct field.
struct EntityField {
    ident: Ident,
    ty: Type,
    /// Logical name (the Rust field name without `r#`).
    name: String,
    /// Remote attribute name.
    remote: String,
    key: bool,
    lookup: Option<String>,
    read_only: bool,
}

#[derive(Default)]
struct EntityAttrs {
    entity: Option<String>,
    set: Option<String>,
}

fn parse_entity_attrs(attrs: &[Attribute]) -> EntityAttrs {
    let mut out = EntityAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("crm") {
            continue;
        }
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("entity") {
                out.entity = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("set") {
                out.set = Some(meta.value()?.parse::<LitStr>()?.value());
            } else {
                emit_error!(meta.path.span(), "unknown #[crm] struct attribute");
            }
            Ok(())
        });
        if let Err(e) = result {
            emit_error!(attr.span(), "Failed to parse #[crm] attribute: {e}");
        }
    }

    out
}

fn parse_field(field: &syn::Field) -> EntityField {
    let Some(ident) = field.ident.as_ref() else {
        abort!(field, "CrmEntity requires named fields");
    };
    let name = ident.unraw().to_string();

    let mut remote = None;
    let mut key = false;
    let mut lookup = None;
    let mut read_only = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("crm") {
            continue;
        }
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("key") {
                key = true;
            } else if meta.path.is_ident("read_only") {
                read_only = true;
            } else if meta.path.is_ident("name") {
                remote = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("lookup") {
                lookup = Some(meta.value()?.parse::<LitStr>()?.value());
            } else {
                emit_error!(meta.path.span(), "unknown #[crm] field attribute");
            }
            Ok(())
        });
        if let Err(e) = result {
            emit_error!(attr.span(), "Failed to parse #[crm] attribute: {e}");
        }
    }

    EntityField {
        ident: ident.clone(),
        ty: field.ty.clone(),
        remote: remote.unwrap_or_else(|| name.clone()),
        name,
        key,
        lookup,
        read_only,
    }
}

pub fn expand_derive_crm_entity(input: &DeriveInput) -> TokenStream {
    let struct_name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => abort!(input, "CrmEntity only supports structs with named fields"),
        },
        _ => abort!(input, "CrmEntity can only be derived for structs"),
    };

    let attrs = parse_entity_attrs(&input.attrs);
    let entity_name = attrs
        .entity
        .unwrap_or_else(|| struct_name.to_string().to_lowercase());
    let Some(entity_set) = attrs.set else {
        abort!(
            input,
            "CrmEntity requires #[crm(set = \"...\")] naming the entity set"
        );
    };

    let fields: Vec<EntityField> = fields.iter().map(parse_field).collect();
    let key = select_key(input, &fields);

    let field_enum_name = Ident::new(&format!("{struct_name}Field"), struct_name.span());
    let schema_struct_name = Ident::new(&format!("{struct_name}Schema"), struct_name.span());
    let module_name = Ident::new(&struct_name.to_string().to_snake_case(), struct_name.span());

    let variants: Vec<Ident> = fields
        .iter()
        .map(|f| Ident::new(&f.name.to_upper_camel_case(), f.ident.span()))
        .collect();

    let field_name_arms = fields.iter().zip(&variants).map(|(f, variant)| {
        let name = &f.name;
        quote! { #field_enum_name::#variant => #name }
    });

    let constructor_fns = fields.iter().zip(&variants).map(|(f, variant)| {
        let fn_name = &f.ident;
        let ty = &f.ty;
        quote! {
            #[must_use]
            pub fn #fn_name() -> ::crm_query::schema::FieldRef<super::#schema_struct_name, #ty> {
                ::crm_query::schema::FieldRef::new(super::#field_enum_name::#variant)
            }
        }
    });

    let descriptors = fields.iter().map(field_descriptor);

    let key_ident = &key.ident;
    let key_ty = &key.ty;
    let key_name = &key.name;

    quote! {
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum #field_enum_name {
            #(#variants,)*
        }

        pub struct #schema_struct_name;

        impl ::crm_query::schema::Schema for #schema_struct_name {
            type Field = #field_enum_name;

            fn field_name(field: Self::Field) -> &'static str {
                match field {
                    #(#field_name_arms,)*
                }
            }
        }

        #[allow(unused_imports, clippy::wildcard_imports)]
        pub mod #module_name {
            use super::*;

            #(#constructor_fns)*
        }

        impl ::crm_query::descriptor::Entity for #struct_name {
            type Schema = #schema_struct_name;

            fn descriptor() -> ::crm_query::descriptor::EntityDescriptor {
                ::crm_query::descriptor::EntityDescriptor::new(
                    #entity_name,
                    #entity_set,
                    #key_name,
                    vec![#(#descriptors,)*],
                )
            }

            fn id(&self) -> #key_ty {
                self.#key_ident
            }
        }
    }
}

/// Explicit `#[crm(key)]`, otherwise a field named `id`.
fn select_key<'a>(input: &DeriveInput, fields: &'a [EntityField]) -> &'a EntityField {
    let explicit: Vec<&EntityField> = fields.iter().filter(|f| f.key).collect();
    match explicit.as_slice() {
        [key] => *key,
        [] => match fields.iter().find(|f| f.name == "id") {
            Some(key) => key,
            None => abort!(
                input,
                "CrmEntity needs a primary key: mark a field with #[crm(key)] or name it `id`"
            ),
        },
        [_, second, ..] => abort!(second.ident, "only one field may be marked #[crm(key)]"),
    }
}

fn field_descriptor(f: &EntityField) -> TokenStream {
    let name = &f.name;
    let remote = &f.remote;
    let ty = &f.ty;

    let base = match &f.lookup {
        Some(target) => quote! {
            ::crm_query::descriptor::FieldDescriptor::lookup(#name, #remote, #target)
        },
        None => quote! {
            ::crm_query::descriptor::FieldDescriptor::new(
                #name,
                #remote,
                <#ty as ::crm_query::schema::IntoQueryValue>::KIND,
            )
            .with_nullable(<#ty as ::crm_query::schema::IntoQueryValue>::NULLABLE)
        },
    };

    if f.read_only {
        quote! { #base.read_only() }
    } else {
        base
    }
}
