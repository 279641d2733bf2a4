#![allow(dead_code, clippy::unwrap_used)]

use async_trait::async_trait;
use crm_sdk::{
    Context, CrmConfig, CrmEntity, RemoteRequest, RemoteResponse, Transport, TransportError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, CrmEntity)]
#[crm(entity = "contact", set = "contacts")]
pub struct Contact {
    #[crm(key, name = "contactid")]
    pub id: Uuid,
    #[crm(name = "fullname")]
    pub full_name: Option<String>,
    #[crm(name = "new_age")]
    pub age: Option<i32>,
    #[crm(name = "parentcustomerid", lookup = "accounts")]
    pub company: Option<Uuid>,
    #[crm(name = "createdon", read_only)]
    pub created_on: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, CrmEntity)]
#[crm(entity = "systemuser", set = "systemusers")]
pub struct IdentityUser {
    #[crm(key, name = "systemuserid")]
    pub id: Uuid,
    #[crm(name = "domainname")]
    pub login: String,
}

/// Same entity set as [`Contact`], used to provoke a registry conflict.
#[derive(Clone, Debug, Serialize, Deserialize, CrmEntity)]
#[crm(entity = "contact", set = "contacts")]
pub struct ContactAlias {
    #[crm(key, name = "contactid")]
    pub id: Uuid,
}

impl Contact {
    pub fn new(full_name: &str, age: i32) -> Self {
        Self {
            id: Uuid::nil(),
            full_name: Some(full_name.to_owned()),
            age: Some(age),
            company: None,
            created_on: None,
        }
    }
}

/// Records every request and answers from a queue; an empty queue answers
/// `200 {"value": []}`.
#[derive(Clone, Default)]
pub struct MockTransport {
    requests: Arc<Mutex<Vec<RemoteRequest>>>,
    responses: Arc<Mutex<VecDeque<RemoteResponse>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, response: RemoteResponse) -> &Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn respond_json(&self, body: Value) -> &Self {
        self.respond(RemoteResponse::json(&body))
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> RemoteRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }

    /// FetchXML of the last request.
    pub fn last_fetch_xml(&self) -> String {
        self.last_request()
            .query_param("fetchXml")
            .unwrap()
            .to_owned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| RemoteResponse::json(&serde_json::json!({ "value": [] }))))
    }
}

pub fn config(throw_on_error: bool) -> CrmConfig {
    CrmConfig::new("https://org.crm4.dynamics.com/".parse().unwrap())
        .with_throw_on_error(throw_on_error)
}

pub fn context(transport: &MockTransport, throw_on_error: bool) -> Context {
    Context::builder(config(throw_on_error))
        .transport(transport.clone())
        .entity::<Contact>()
        .entity::<IdentityUser>()
        .build()
        .unwrap()
}

pub fn contact_row(id: Uuid, name: &str, age: i32) -> Value {
    serde_json::json!({
        "@odata.etag": "W/\"1001\"",
        "contactid": id,
        "fullname": name,
        "new_age": age,
        "_parentcustomerid_value": null,
        "createdon": "2024-03-01T09:30:00Z"
    })
}
