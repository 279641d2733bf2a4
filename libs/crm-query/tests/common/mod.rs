#![allow(dead_code)]

use crm_query::{EntityDescriptor, FieldDescriptor, FieldKind, FieldRef, Schema};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ContactField {
    Id,
    FullName,
    Age,
    Status,
    Born,
    Owner,
}

pub struct ContactSchema;

impl Schema for ContactSchema {
    type Field = ContactField;

    fn field_name(field: Self::Field) -> &'static str {
        match field {
            ContactField::Id => "id",
            ContactField::FullName => "full_name",
            ContactField::Age => "age",
            ContactField::Status => "status",
            ContactField::Born => "born",
            ContactField::Owner => "owner",
        }
    }
}

pub const ID: FieldRef<ContactSchema, uuid::Uuid> = FieldRef::new(ContactField::Id);
pub const FULL_NAME: FieldRef<ContactSchema, String> = FieldRef::new(ContactField::FullName);
pub const AGE: FieldRef<ContactSchema, i32> = FieldRef::new(ContactField::Age);
pub const STATUS: FieldRef<ContactSchema, i32> = FieldRef::new(ContactField::Status);
pub const BORN: FieldRef<ContactSchema, chrono::NaiveDate> = FieldRef::new(ContactField::Born);
pub const OWNER: FieldRef<ContactSchema, Option<uuid::Uuid>> =
    FieldRef::new(ContactField::Owner);

pub fn contact_descriptor() -> EntityDescriptor {
    EntityDescriptor::new(
        "contact",
        "contacts",
        "id",
        vec![
            FieldDescriptor::new("id", "contactid", FieldKind::Uuid),
            FieldDescriptor::new("full_name", "fullname", FieldKind::String),
            FieldDescriptor::new("age", "new_age", FieldKind::Int),
            FieldDescriptor::new("status", "statecode", FieldKind::Int),
            FieldDescriptor::new("born", "birthdate", FieldKind::Date),
            FieldDescriptor::lookup("owner", "ownerid", "systemusers"),
        ],
    )
}
