#![allow(clippy::unwrap_used)]

mod common;

use common::{
    Contact, ContactAlias, IdentityUser, MockTransport, config, contact, contact_row, context,
};
use crm_sdk::{Context, Error, PREFER_ANNOTATIONS, RemoteResponse, SortDir, TransportError};
use futures_util::TryStreamExt;
use http::{Method, StatusCode};
use serde_json::json;
use tracing_test::traced_test;
use uuid::Uuid;

const ADA: &str = "1c9a6c55-8a5b-4e0a-9d0f-3b7a1e2c4d5f";
const GRACE: &str = "7e2b4f10-6d3c-4a1b-8f9e-0c5d2a3b4e6f";

fn ada() -> Uuid {
    Uuid::parse_str(ADA).unwrap()
}

fn grace() -> Uuid {
    Uuid::parse_str(GRACE).unwrap()
}

#[tokio::test]
async fn first_or_default_returns_single_row() {
    let transport = MockTransport::new();
    transport.respond_json(json!({ "value": [contact_row(ada(), "Ada Lovelace", 36)] }));
    let ctx = context(&transport, true);

    let found = ctx
        .set::<Contact>()
        .unwrap()
        .filter_and(|c| {
            c.equal(contact::id(), ada());
        })
        .unwrap()
        .first_or_default()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.id, ada());
    assert_eq!(found.full_name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(found.age, Some(36));
    assert_eq!(found.company, None);

    let request = transport.last_request();
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.resource, "contacts");
    assert!(request.key.is_none());
    assert!(
        request
            .headers
            .contains(&("Prefer".to_owned(), PREFER_ANNOTATIONS.to_owned()))
    );
    let xml = transport.last_fetch_xml();
    assert!(xml.contains(r#"page="1" count="1""#), "{xml}");
    assert!(
        xml.contains(&format!(
            r#"<condition attribute="contactid" operator="eq" value="{ADA}"/>"#
        )),
        "{xml}"
    );
}

#[tokio::test]
async fn first_or_default_absent_is_none() {
    let transport = MockTransport::new();
    let ctx = context(&transport, true);

    let found = ctx
        .set::<Contact>()
        .unwrap()
        .filter_and(|c| {
            c.equal(contact::full_name(), Some("Nobody".to_owned()));
        })
        .unwrap()
        .first_or_default()
        .await
        .unwrap();

    assert!(found.is_none());
}

#[tokio::test]
async fn to_list_with_in_over_two_ids() {
    let transport = MockTransport::new();
    transport.respond_json(json!({
        "value": [
            contact_row(ada(), "Ada Lovelace", 36),
            contact_row(grace(), "Grace Hopper", 85)
        ]
    }));
    let ctx = context(&transport, true);

    let contacts = ctx
        .set::<Contact>()
        .unwrap()
        .filter_and(|c| {
            c.in_values(contact::id(), [ada(), grace()]);
        })
        .unwrap()
        .order_by(contact::full_name(), SortDir::Asc)
        .to_list()
        .await
        .unwrap();

    let ids: Vec<Uuid> = contacts.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![ada(), grace()]);

    let xml = transport.last_fetch_xml();
    assert!(
        xml.contains(&format!(
            r#"<condition attribute="contactid" operator="in"><value>{ADA}</value><value>{GRACE}</value></condition>"#
        )),
        "{xml}"
    );
    assert!(xml.contains(r#"<order attribute="fullname" descending="false"/>"#));
    assert!(xml.contains(r#"page="1" count="5000""#), "{xml}");
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
#[traced_test]
async fn to_list_reads_every_page() {
    let transport = MockTransport::new();
    transport
        .respond_json(json!({
            "value": [contact_row(ada(), "Ada Lovelace", 36)],
            "@Microsoft.Dynamics.CRM.morerecords": true,
            "@Microsoft.Dynamics.CRM.fetchxmlpagingcookie":
                "<cookie pagenumber=\"2\" pagingcookie=\"%253ccookie%2520page%253d%25221%2522%253e%253c%252fcookie%253e\" istracking=\"False\" />"
        }))
        .respond_json(json!({
            "value": [contact_row(grace(), "Grace Hopper", 85)],
            "@Microsoft.Dynamics.CRM.morerecords": false
        }));
    let ctx = context(&transport, true);

    let contacts = ctx.set::<Contact>().unwrap().to_list().await.unwrap();

    let ids: Vec<Uuid> = contacts.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![ada(), grace()]);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let first = requests[0].query_param("fetchXml").unwrap();
    assert!(!first.contains("paging-cookie"), "{first}");
    let second = requests[1].query_param("fetchXml").unwrap();
    assert!(second.contains(r#"page="2" count="5000""#), "{second}");
    assert!(second.contains("paging-cookie=\"&lt;cookie page="), "{second}");
    assert!(logs_contain("following paging cookie"));
}

#[tokio::test]
async fn to_list_stops_on_empty_page() {
    let transport = MockTransport::new();
    transport.respond_json(json!({
        "value": [contact_row(ada(), "Ada Lovelace", 36)],
        "@Microsoft.Dynamics.CRM.morerecords": true
    }));
    let ctx = context(&transport, true);

    let contacts = ctx.set::<Contact>().unwrap().to_list().await.unwrap();

    assert_eq!(contacts.len(), 1);
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let second = requests[1].query_param("fetchXml").unwrap();
    assert!(second.contains(r#"page="2" count="5000""#), "{second}");
}

#[tokio::test]
async fn count_uses_aggregate_query() {
    let transport = MockTransport::new();
    transport.respond_json(json!({ "value": [{ "count": 2 }] }));
    let ctx = context(&transport, true);

    let count = ctx
        .set::<Contact>()
        .unwrap()
        .filter_and(|c| {
            c.between(contact::age(), Some(30), Some(90));
        })
        .unwrap()
        .count()
        .await
        .unwrap();

    assert_eq!(count, 2);
    let xml = transport.last_fetch_xml();
    assert!(xml.contains(r#"aggregate="true""#), "{xml}");
    assert!(xml.contains(r#"alias="count" aggregate="count""#), "{xml}");
    assert!(xml.contains(r#"operator="ge" value="30""#), "{xml}");
}

#[tokio::test]
async fn count_over_aggregate_limit_counts_keys_by_page() {
    let transport = MockTransport::new();
    transport
        .respond(RemoteResponse::new(
            StatusCode::BAD_REQUEST,
            json!({ "error": {
                "code": "0x8004e023",
                "message": "AggregateQueryRecordLimit exceeded. Cannot perform this operation."
            } })
            .to_string(),
        ))
        .respond_json(json!({
            "value": [{ "contactid": ADA }, { "contactid": GRACE }],
            "@Microsoft.Dynamics.CRM.morerecords": true
        }))
        .respond_json(json!({
            "value": [{ "contactid": ADA }],
            "@Microsoft.Dynamics.CRM.morerecords": false
        }));
    let ctx = context(&transport, true);

    let count = ctx.set::<Contact>().unwrap().count().await.unwrap();

    assert_eq!(count, 3);
    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    let keys = requests[1].query_param("fetchXml").unwrap();
    assert!(!keys.contains("aggregate"), "{keys}");
    assert!(
        keys.contains(r#"<entity name="contact"><attribute name="contactid"/></entity>"#),
        "{keys}"
    );
}

#[tokio::test]
async fn count_reports_other_remote_failures() {
    let transport = MockTransport::new();
    transport.respond(RemoteResponse::new(
        StatusCode::BAD_REQUEST,
        json!({ "error": { "message": "bad attribute" } }).to_string(),
    ));
    let ctx = context(&transport, true);

    let err = ctx.set::<Contact>().unwrap().count().await.unwrap_err();

    assert!(matches!(err, Error::RemoteQuery { .. }));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn to_paged_list_returns_page_metadata() {
    let transport = MockTransport::new();
    transport.respond_json(json!({
        "value": [contact_row(ada(), "Ada Lovelace", 36)],
        "@Microsoft.Dynamics.CRM.totalrecordcount": 2,
        "@Microsoft.Dynamics.CRM.morerecords": true
    }));
    let ctx = context(&transport, true);

    let page = ctx
        .set::<Contact>()
        .unwrap()
        .to_paged_list(1, 1)
        .await
        .unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.page_info.page_number, 1);
    assert_eq!(page.page_info.page_size, 1);
    assert_eq!(page.page_info.total_count, Some(2));
    assert!(page.page_info.has_more);

    let xml = transport.last_fetch_xml();
    assert!(xml.contains(r#"returntotalrecordcount="true""#), "{xml}");
}

#[tokio::test]
async fn to_paged_list_rejects_zero_before_sending() {
    let transport = MockTransport::new();
    let ctx = context(&transport, true);

    let err = ctx.set::<Contact>().unwrap().to_paged_list(0, 1).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    let err = ctx.set::<Contact>().unwrap().to_paged_list(1, 0).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn invalid_condition_fails_synchronously() {
    let transport = MockTransport::new();
    let ctx = context(&transport, true);

    let err = ctx
        .set::<Contact>()
        .unwrap()
        .filter_and(|c| {
            c.in_values(contact::id(), Vec::<Uuid>::new());
        })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let err = ctx
        .set::<Contact>()
        .unwrap()
        .filter_and(|c| {
            c.between(contact::age(), Some(90), Some(30));
        })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn page_size_over_limit_is_rejected_before_sending() {
    let transport = MockTransport::new();
    let ctx = context(&transport, true);

    let err = ctx
        .set::<Contact>()
        .unwrap()
        .to_paged_list(1, 5001)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn items_stream_follows_paging_cookie() {
    let transport = MockTransport::new();
    transport
        .respond_json(json!({
            "value": [contact_row(ada(), "Ada Lovelace", 36)],
            "@Microsoft.Dynamics.CRM.morerecords": true,
            "@Microsoft.Dynamics.CRM.fetchxmlpagingcookie":
                "<cookie pagenumber=\"2\" pagingcookie=\"%253ccookie%2520page%253d%25221%2522%253e%253c%252fcookie%253e\" istracking=\"False\" />"
        }))
        .respond_json(json!({
            "value": [contact_row(grace(), "Grace Hopper", 85)],
            "@Microsoft.Dynamics.CRM.morerecords": false
        }));
    let ctx = context(&transport, true);

    let contacts: Vec<Contact> = ctx
        .set::<Contact>()
        .unwrap()
        .items(1)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(contacts.len(), 2);
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let second = requests[1].query_param("fetchXml").unwrap();
    assert!(second.contains(r#"page="2" count="1""#), "{second}");
    assert!(second.contains("paging-cookie=\"&lt;cookie page="), "{second}");
}

#[tokio::test]
async fn remote_failure_is_remote_query_error() {
    let transport = MockTransport::new();
    transport.respond(RemoteResponse::new(
        StatusCode::BAD_REQUEST,
        json!({ "error": { "code": "0x80041103", "message": "bad attribute" } }).to_string(),
    ));
    let ctx = context(&transport, true);

    let err = ctx.set::<Contact>().unwrap().to_list().await.unwrap_err();
    match err {
        Error::RemoteQuery { resource, source } => {
            assert_eq!(resource, "contacts");
            assert!(matches!(
                source,
                TransportError::Status { status, ref message }
                    if status == StatusCode::BAD_REQUEST && message == "bad attribute"
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn find_uses_select_and_respects_policy() {
    let transport = MockTransport::new();
    transport
        .respond_json(contact_row(ada(), "Ada Lovelace", 36))
        .respond(RemoteResponse::new(StatusCode::NOT_FOUND, ""));
    let ctx = context(&transport, false);
    let set = ctx.set::<Contact>().unwrap();

    let found = set.find(ada()).await.unwrap().unwrap();
    assert_eq!(found.full_name.as_deref(), Some("Ada Lovelace"));
    let request = transport.last_request();
    assert_eq!(request.key, Some(ada()));
    assert_eq!(
        request.query_param("$select"),
        Some("contactid,fullname,new_age,_parentcustomerid_value,createdon")
    );

    assert!(set.find(grace()).await.unwrap().is_none());
}

#[tokio::test]
async fn unregistered_entity_is_reported() {
    let transport = MockTransport::new();
    let ctx = Context::builder(config(true))
        .transport(transport)
        .entity::<Contact>()
        .build()
        .unwrap();

    assert!(matches!(
        ctx.set::<IdentityUser>(),
        Err(Error::UnregisteredEntity(_))
    ));
}

#[tokio::test]
async fn conflicting_entity_sets_fail_build() {
    let result = Context::builder(config(true))
        .transport(MockTransport::new())
        .entity::<Contact>()
        .entity::<ContactAlias>()
        .build();

    assert!(matches!(result, Err(Error::InvalidDescriptor { .. })));
}
