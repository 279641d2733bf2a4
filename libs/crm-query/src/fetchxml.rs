//! `QuerySpec` → FetchXML translator.
//!
//! Conditions are first lowered to [`Expr`] with remote attribute names,
//! then rendered. Rendering is deterministic: the same spec and descriptor
//! always produce byte-identical output.

use crate::Error;
use crate::ast::{CompareOperator, Expr, Value};
use crate::condition::Condition;
use crate::descriptor::{EntityDescriptor, FieldDescriptor, FieldKind};
use crate::query::{QueryKind, QuerySpec};
use chrono::SecondsFormat;
use std::fmt;

/// Alias of the aggregate column produced by count queries.
pub const COUNT_ALIAS: &str = "count";

/// A rendered FetchXML document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FetchXml(String);

impl FetchXml {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FetchXml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FetchXml {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Translate a query for `descriptor`'s entity.
///
/// # Errors
/// - `Error::UnknownField` if a predicate, ordering or projection names a
///   field the descriptor does not map
/// - `Error::UnsupportedOperation` for a range predicate on a non-orderable field
/// - `Error::InvalidArgument` if a literal does not match the field's kind
pub fn translate(spec: &QuerySpec, descriptor: &EntityDescriptor) -> Result<FetchXml, Error> {
    let filter = lower_filter(spec, descriptor)?;

    let mut w = Writer::default();
    w.start("fetch");
    w.attr("version", "1.0");
    w.attr("mapping", "logical");
    w.attr("distinct", bool_attr(spec.distinct));

    match spec.kind {
        QueryKind::Count => write_count_head(&mut w, descriptor)?,
        QueryKind::Rows => write_rows_head(&mut w, spec, descriptor)?,
    }

    if let Some(expr) = &filter {
        write_expr(&mut w, expr)?;
    }

    w.close("entity");
    w.close("fetch");
    Ok(FetchXml(w.finish()))
}

/// Lower every condition of `spec` into one conjunction over remote names.
///
/// Returns `None` when the query has no conditions.
///
/// # Errors
/// Same as [`translate`] for predicate-related failures.
pub fn lower_filter(
    spec: &QuerySpec,
    descriptor: &EntityDescriptor,
) -> Result<Option<Expr>, Error> {
    let mut parts = Vec::with_capacity(spec.condition_count());
    for group in &spec.groups {
        for condition in group.conditions() {
            parts.push(lower_condition(condition, descriptor)?);
        }
    }
    Ok((!parts.is_empty()).then_some(Expr::And(parts)))
}

/// Lower one condition.
///
/// `Between` becomes `ge low AND le high`; `NotBetween` becomes
/// `lt low OR gt high`, so both bounds belong to `Between`.
///
/// The service drops unset attributes from every comparison, so on a
/// nullable field `NotIn` and `NotBetween` also match `null`. `In` with
/// `NotIn` and `Between` with `NotBetween` then partition every row.
///
/// # Errors
/// Same as [`translate`] for predicate-related failures.
pub fn lower_condition(
    condition: &Condition,
    descriptor: &EntityDescriptor,
) -> Result<Expr, Error> {
    let field = descriptor.resolve(condition.field())?;
    let entity = descriptor.logical_name();
    let remote = field.remote;

    let compare = |op: CompareOperator, value: &Value| -> Result<Expr, Error> {
        check_kind(entity, field, value)?;
        Ok(Expr::Compare {
            field: remote.to_owned(),
            op,
            value: value.clone(),
        })
    };

    match condition {
        Condition::Equal { value, .. } => compare(CompareOperator::Eq, value),
        Condition::In { values, .. } => Ok(Expr::In {
            field: remote.to_owned(),
            values: checked_set(entity, field, values)?,
        }),
        Condition::NotIn { values, .. } => Ok(or_unset(
            field,
            vec![Expr::NotIn {
                field: remote.to_owned(),
                values: checked_set(entity, field, values)?,
            }],
        )),
        Condition::Between { low, high, .. } => {
            check_orderable(field)?;
            Ok(Expr::And(vec![
                compare(CompareOperator::Ge, low)?,
                compare(CompareOperator::Le, high)?,
            ]))
        }
        Condition::NotBetween { low, high, .. } => {
            check_orderable(field)?;
            Ok(or_unset(
                field,
                vec![
                    compare(CompareOperator::Lt, low)?,
                    compare(CompareOperator::Gt, high)?,
                ],
            ))
        }
    }
}

/// `Or(branches)`, plus an `is null` branch when `field` may be unset.
/// A single branch is returned as is.
fn or_unset(field: &FieldDescriptor, mut branches: Vec<Expr>) -> Expr {
    if field.nullable {
        branches.push(Expr::Compare {
            field: field.remote.to_owned(),
            op: CompareOperator::Eq,
            value: Value::Null,
        });
    }
    if branches.len() == 1 {
        branches.remove(0)
    } else {
        Expr::Or(branches)
    }
}

/// Extract the `pagingcookie` value from the
/// `@Microsoft.Dynamics.CRM.fetchxmlpagingcookie` annotation.
///
/// The service double URL-encodes the inner cookie.
#[must_use]
pub fn decode_paging_cookie(annotation: &str) -> Option<String> {
    const MARKER: &str = "pagingcookie=\"";

    let start = annotation.find(MARKER)? + MARKER.len();
    let rest = &annotation[start..];
    let end = rest.find('"')?;
    let once = urlencoding::decode(&rest[..end]).ok()?;
    let twice = urlencoding::decode(&once).ok()?;
    Some(twice.into_owned())
}

fn write_count_head(w: &mut Writer, descriptor: &EntityDescriptor) -> Result<(), Error> {
    let key = descriptor.key_field()?;

    w.attr("aggregate", "true");
    w.open_end();
    w.start("entity");
    w.attr("name", descriptor.logical_name());
    w.open_end();

    w.start("attribute");
    w.attr("name", key.remote);
    w.attr("alias", COUNT_ALIAS);
    w.attr("aggregate", "count");
    w.empty_end();
    Ok(())
}

fn write_rows_head(
    w: &mut Writer,
    spec: &QuerySpec,
    descriptor: &EntityDescriptor,
) -> Result<(), Error> {
    if let Some(paging) = spec.paging {
        w.attr("page", &paging.number().to_string());
        w.attr("count", &paging.size().to_string());
        if let Some(cookie) = &spec.paging_cookie {
            w.attr("paging-cookie", cookie);
        }
    }
    if spec.with_total_count {
        w.attr("returntotalrecordcount", "true");
    }
    w.open_end();

    w.start("entity");
    w.attr("name", descriptor.logical_name());
    w.open_end();

    for field in projection(spec, descriptor)? {
        w.start("attribute");
        w.attr("name", field.remote);
        w.empty_end();
    }

    for key in &spec.order {
        let field = descriptor.resolve(&key.field)?;
        w.start("order");
        w.attr("attribute", field.remote);
        w.attr("descending", bool_attr(key.dir.is_descending()));
        w.empty_end();
    }
    Ok(())
}

/// Selected fields, or every mapped field. The primary key always leads
/// a custom selection so rows stay identifiable.
fn projection<'a>(
    spec: &QuerySpec,
    descriptor: &'a EntityDescriptor,
) -> Result<Vec<&'a FieldDescriptor>, Error> {
    let Some(select) = &spec.select else {
        return Ok(descriptor.fields().iter().collect());
    };

    let key = descriptor.key_field()?;
    let mut fields = vec![key];
    for name in select {
        let field = descriptor.resolve(name)?;
        if !fields.iter().any(|f| f.name == field.name) {
            fields.push(field);
        }
    }
    Ok(fields)
}

fn write_expr(w: &mut Writer, expr: &Expr) -> Result<(), Error> {
    match expr {
        Expr::And(children) => write_group(w, "and", children),
        Expr::Or(children) => write_group(w, "or", children),
        Expr::Compare { field, op, value } => {
            w.start("condition");
            w.attr("attribute", field);
            if value.is_null() {
                let operator = match op {
                    CompareOperator::Eq => "null",
                    CompareOperator::Ne => "not-null",
                    other => {
                        return Err(Error::UnsupportedOperation(format!(
                            "operator '{}' with null on '{field}'",
                            other.as_fetch_operator()
                        )));
                    }
                };
                w.attr("operator", operator);
            } else {
                w.attr("operator", op.as_fetch_operator());
                w.attr("value", &literal(value));
            }
            w.empty_end();
            Ok(())
        }
        Expr::In { field, values } => {
            write_set(w, field, "in", values);
            Ok(())
        }
        Expr::NotIn { field, values } => {
            write_set(w, field, "not-in", values);
            Ok(())
        }
    }
}

fn write_group(w: &mut Writer, kind: &str, children: &[Expr]) -> Result<(), Error> {
    w.start("filter");
    w.attr("type", kind);
    w.open_end();
    for child in children {
        write_expr(w, child)?;
    }
    w.close("filter");
    Ok(())
}

fn write_set(w: &mut Writer, field: &str, operator: &str, values: &[Value]) {
    w.start("condition");
    w.attr("attribute", field);
    w.attr("operator", operator);
    w.open_end();
    for value in values {
        w.open("value");
        w.text(&literal(value));
        w.close("value");
    }
    w.close("condition");
}

fn checked_set(
    entity: &str,
    field: &FieldDescriptor,
    values: &[Value],
) -> Result<Vec<Value>, Error> {
    if values.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "value set for '{}' must not be empty",
            field.name
        )));
    }
    for value in values {
        if value.is_null() {
            return Err(Error::InvalidArgument(format!(
                "value set for '{}' must not contain null",
                field.name
            )));
        }
        check_kind(entity, field, value)?;
    }
    Ok(values.to_vec())
}

fn check_orderable(field: &FieldDescriptor) -> Result<(), Error> {
    if field.kind.is_orderable() {
        Ok(())
    } else {
        Err(Error::UnsupportedOperation(format!(
            "range predicate on '{}' of non-orderable type {}",
            field.name, field.kind
        )))
    }
}

fn check_kind(entity: &str, field: &FieldDescriptor, value: &Value) -> Result<(), Error> {
    let ok = matches!(
        (field.kind, value),
        (_, Value::Null)
            | (FieldKind::String, Value::String(_))
            | (FieldKind::Int | FieldKind::Decimal, Value::Number(_))
            | (FieldKind::Bool, Value::Bool(_))
            | (FieldKind::Uuid | FieldKind::Lookup, Value::Uuid(_))
            | (FieldKind::DateTimeUtc, Value::DateTime(_))
            | (FieldKind::Date, Value::Date(_))
            | (FieldKind::Time, Value::Time(_))
    );
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "type mismatch on '{entity}.{}': expected {}, got {value}",
            field.name, field.kind
        )))
    }
}

/// FetchXML literal for a non-null value (unescaped).
fn literal(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_owned(),
        Value::Bool(false) => "0".to_owned(),
        Value::Number(n) => n.to_string(),
        Value::Uuid(u) => u.hyphenated().to_string(),
        Value::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::Time(t) => t.format("%H:%M:%S").to_string(),
        Value::String(s) => s.clone(),
    }
}

fn bool_attr(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[derive(Default)]
struct Writer {
    out: String,
}

impl Writer {
    fn start(&mut self, tag: &str) {
        self.out.push('<');
        self.out.push_str(tag);
    }

    fn open(&mut self, tag: &str) {
        self.start(tag);
        self.open_end();
    }

    fn attr(&mut self, name: &str, value: &str) {
        self.out.push(' ');
        self.out.push_str(name);
        self.out.push_str("=\"");
        escape_into(&mut self.out, value);
        self.out.push('"');
    }

    fn open_end(&mut self) {
        self.out.push('>');
    }

    fn empty_end(&mut self) {
        self.out.push_str("/>");
    }

    fn text(&mut self, value: &str) {
        escape_into(&mut self.out, value);
    }

    fn close(&mut self, tag: &str) {
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
    }

    fn finish(self) -> String {
        self.out
    }
}

fn escape_into(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::condition::ConditionGroup;
    use crate::query::Paging;
    use crate::{OrderKey, SortDir};

    fn account() -> EntityDescriptor {
        EntityDescriptor::new(
            "account",
            "accounts",
            "id",
            vec![
                FieldDescriptor::new("id", "accountid", FieldKind::Uuid),
                FieldDescriptor::new("name", "name", FieldKind::String),
                FieldDescriptor::new("active", "isactive", FieldKind::Bool),
                FieldDescriptor::new("revenue", "revenue", FieldKind::Decimal),
            ],
        )
    }

    fn spec_with(conditions: Vec<Condition>) -> QuerySpec {
        QuerySpec::new().with_group(ConditionGroup::new(conditions))
    }

    #[test]
    fn escapes_attribute_and_text() {
        let mut out = String::new();
        escape_into(&mut out, r#"a<b>&"c"'"#);
        assert_eq!(out, "a&lt;b&gt;&amp;&quot;c&quot;&apos;");
    }

    #[test]
    fn literal_formats() {
        use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

        assert_eq!(literal(&Value::Bool(true)), "1");
        assert_eq!(literal(&Value::Bool(false)), "0");
        assert_eq!(
            literal(&Value::DateTime(
                Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 0).unwrap()
            )),
            "2024-03-09T07:05:00Z"
        );
        assert_eq!(
            literal(&Value::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap())),
            "2024-03-09"
        );
        assert_eq!(
            literal(&Value::Time(NaiveTime::from_hms_opt(23, 1, 2).unwrap())),
            "23:01:02"
        );
        let id = uuid::Uuid::parse_str("6F9619FF-8B86-D011-B42D-00C04FC964FF").unwrap();
        assert_eq!(
            literal(&Value::Uuid(id)),
            "6f9619ff-8b86-d011-b42d-00c04fc964ff"
        );
    }

    #[test]
    fn unknown_field_reported_at_translation() {
        let spec = spec_with(vec![Condition::Equal {
            field: "missing",
            value: Value::Bool(true),
        }]);
        let err = translate(&spec, &account()).unwrap_err();
        assert_eq!(
            err,
            Error::UnknownField {
                entity: "account".to_owned(),
                field: "missing".to_owned()
            }
        );
    }

    #[test]
    fn unknown_order_field_reported() {
        let spec = QuerySpec::new().with_order(vec![OrderKey {
            field: "nope".to_owned(),
            dir: SortDir::Asc,
        }]);
        assert!(matches!(
            translate(&spec, &account()),
            Err(Error::UnknownField { .. })
        ));
    }

    #[test]
    fn range_on_bool_field_unsupported() {
        let spec = spec_with(vec![Condition::Between {
            field: "active",
            low: Value::Bool(false),
            high: Value::Bool(true),
        }]);
        assert!(matches!(
            translate(&spec, &account()),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn mismatched_literal_rejected() {
        let spec = spec_with(vec![Condition::Equal {
            field: "name",
            value: Value::Number(1.into()),
        }]);
        assert!(matches!(
            translate(&spec, &account()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn equal_null_renders_null_operator() {
        let spec = spec_with(vec![Condition::Equal {
            field: "name",
            value: Value::Null,
        }]);
        let xml = translate(&spec, &account()).unwrap();
        assert!(
            xml.as_str()
                .contains(r#"<condition attribute="name" operator="null"/>"#)
        );
    }

    #[test]
    fn complements_on_nullable_field_include_unset_rows() {
        let descriptor = EntityDescriptor::new(
            "account",
            "accounts",
            "id",
            vec![
                FieldDescriptor::new("id", "accountid", FieldKind::Uuid),
                FieldDescriptor::new("revenue", "revenue", FieldKind::Decimal).nullable(),
                FieldDescriptor::lookup("owner", "ownerid", "systemusers"),
            ],
        );
        let owner = uuid::Uuid::from_u128(0x0a);
        let spec = spec_with(vec![
            Condition::NotIn {
                field: "owner",
                values: vec![Value::Uuid(owner)],
            },
            Condition::NotBetween {
                field: "revenue",
                low: Value::Number(10.into()),
                high: Value::Number(20.into()),
            },
        ]);

        let xml = translate(&spec, &descriptor).unwrap();
        assert!(xml.as_str().contains(concat!(
            r#"<filter type="or">"#,
            r#"<condition attribute="ownerid" operator="not-in">"#,
            r#"<value>00000000-0000-0000-0000-00000000000a</value></condition>"#,
            r#"<condition attribute="ownerid" operator="null"/>"#,
            r#"</filter>"#,
            r#"<filter type="or">"#,
            r#"<condition attribute="revenue" operator="lt" value="10"/>"#,
            r#"<condition attribute="revenue" operator="gt" value="20"/>"#,
            r#"<condition attribute="revenue" operator="null"/>"#,
            r#"</filter>"#,
        )));
    }

    #[test]
    fn not_in_on_required_field_stays_flat() {
        let spec = spec_with(vec![Condition::NotIn {
            field: "name",
            values: vec![Value::String("x".to_owned())],
        }]);
        let expr = lower_filter(&spec, &account()).unwrap().unwrap();
        assert!(matches!(
            expr,
            Expr::And(ref parts) if matches!(parts.as_slice(), [Expr::NotIn { .. }])
        ));
    }

    #[test]
    fn paging_cookie_only_with_paging() {
        let spec = QuerySpec::new().with_paging_cookie(Some("<cookie/>".to_owned()));
        let xml = translate(&spec, &account()).unwrap();
        assert!(!xml.as_str().contains("paging-cookie"));

        let spec = spec.with_paging(Paging::new(2, 50).unwrap());
        let xml = translate(&spec, &account()).unwrap();
        assert!(xml.as_str().contains(
            r#"page="2" count="50" paging-cookie="&lt;cookie/&gt;""#
        ));
    }

    #[test]
    fn custom_projection_leads_with_key() {
        let spec = QuerySpec::new().with_select(vec!["name".to_owned(), "id".to_owned()]);
        let xml = translate(&spec, &account()).unwrap();
        assert!(xml.as_str().contains(
            r#"<entity name="account"><attribute name="accountid"/><attribute name="name"/></entity>"#
        ));
    }

    #[test]
    fn no_conditions_no_filter() {
        let spec = QuerySpec::new();
        assert_eq!(lower_filter(&spec, &account()).unwrap(), None);
        assert!(!translate(&spec, &account()).unwrap().as_str().contains("<filter"));
    }

    #[test]
    fn decode_cookie_from_annotation() {
        let annotation = "<cookie pagenumber=\"2\" pagingcookie=\"%253ccookie%2520page%253d%25221%2522%253e%253caccountid%2520last%253d%2522%257b1%257d%2522%2520%252f%253e%253c%252fcookie%253e\" istracking=\"False\" />";
        assert_eq!(
            decode_paging_cookie(annotation).as_deref(),
            Some("<cookie page=\"1\"><accountid last=\"{1}\" /></cookie>")
        );
        assert_eq!(decode_paging_cookie("<cookie />"), None);
    }
}
