//! Policy loading and validation vectors.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use pgseclab_core::error::{ErrorKind, PgSecLabError, ValidationError};
use pgseclab_core::policy;

fn load(name: &str) -> String {
    fs::read_to_string(format!("tests/vectors/{name}")).unwrap()
}

fn validation_error(doc: &str) -> ValidationError {
    match policy::load_from_str(doc).expect_err("must fail") {
        PgSecLabError::Validation(v) => v,
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn loads_scenario_a() {
    let p = policy::load_from_str(&load("scenario_a.yaml")).unwrap();
    assert_eq!(p.metadata.system, "billing");
    assert!(p.tenants.enabled);
    assert_eq!(p.tenants.setting, "app.tenant_id");
    assert_eq!(p.tenants.column, "tenant_id");
    assert_eq!(p.roles.len(), 3);
    let customers = p.tables.get("public.customers").unwrap();
    assert!(customers.rls.enabled);
    assert_eq!(customers.masks[0].exposed_as, "email_masked");
}

#[test]
fn rejects_rls_without_select_policy_naming_the_table() {
    let err = validation_error(&load("orders_empty_select_policy.yaml"));
    assert_eq!(err.table.as_deref(), Some("orders"));
    assert_eq!(err.field, "rls.select_policy");
}

#[test]
fn whitespace_select_policy_counts_as_empty() {
    let err = validation_error(
        r#"
tables:
  orders:
    rls: { enabled: true, select_policy: "   " }
"#,
    );
    assert_eq!(err.table.as_deref(), Some("orders"));
}

#[test]
fn disabled_rls_may_omit_select_policy() {
    let p = policy::load_from_str("tables:\n  orders:\n    rls: { enabled: false }\n").unwrap();
    assert!(!p.tables.get("orders").unwrap().rls.enabled);
}

#[test]
fn each_empty_mask_field_is_named() {
    let cases = [
        (r#"{ column: "", expression: "'x'", exposed_as: y }"#, "masks[0].column"),
        (r#"{ column: email, expression: "", exposed_as: y }"#, "masks[0].expression"),
        (r#"{ column: email, expression: "'x'", exposed_as: "" }"#, "masks[0].exposed_as"),
    ];
    for (mask, field) in cases {
        let doc = format!("tables:\n  public.customers:\n    masks:\n      - {mask}\n");
        let err = validation_error(&doc);
        assert_eq!(err.table.as_deref(), Some("public.customers"), "mask={mask}");
        assert_eq!(err.field, field, "mask={mask}");
    }
}

#[test]
fn reports_first_violation_in_document_order() {
    let doc = r#"
tables:
  zeta:
    rls: { enabled: true, select_policy: "" }
  alpha:
    masks:
      - { column: "", expression: "'x'", exposed_as: y }
"#;
    let err = validation_error(doc);
    assert_eq!(err.table.as_deref(), Some("zeta"));
}

#[test]
fn rls_check_precedes_mask_checks_within_a_table() {
    let doc = r#"
tables:
  orders:
    rls: { enabled: true, select_policy: "" }
    masks:
      - { column: "", expression: "", exposed_as: "" }
"#;
    assert_eq!(validation_error(doc).field, "rls.select_policy");
}

#[test]
fn rejects_same_table_declared_twice() {
    let doc = r#"
tables:
  orders: {}
  public.orders: {}
"#;
    let err = validation_error(doc);
    assert_eq!(err.table.as_deref(), Some("public.orders"));
    assert_eq!(err.field, "name");
}

#[test]
fn rejects_duplicate_exposed_as() {
    let doc = r#"
tables:
  customers:
    masks:
      - { column: email, expression: "'***'", exposed_as: hidden }
      - { column: phone, expression: "'***'", exposed_as: hidden }
"#;
    assert_eq!(validation_error(doc).field, "masks[1].exposed_as");
}

#[test]
fn tenants_enabled_requires_setting() {
    let err = validation_error("tenants:\n  enabled: true\n");
    assert_eq!(err.table, None);
    assert_eq!(err.field, "tenants.setting");
}

#[test]
fn unknown_fields_are_rejected() {
    let err = policy::load_from_str(&load("unknown_field.yaml")).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("selcet_policy"), "{err}");
}

#[test]
fn duplicate_keys_are_rejected() {
    let doc = "roles:\n  app: {}\n  app: {}\n";
    assert_eq!(policy::load_from_str(doc).unwrap_err().kind(), ErrorKind::Validation);
}

#[test]
fn missing_file_is_a_config_error() {
    let err = policy::load_from_file("tests/vectors/does_not_exist.yaml").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.is_side_effect_free());
}

#[test]
fn empty_document_is_an_empty_policy() {
    let p = policy::load_from_str("metadata: { system: x, version: '1' }\n").unwrap();
    assert!(p.roles.is_empty());
    assert!(p.tables.is_empty());
}

#[test]
fn rejects_names_past_the_identifier_limit() {
    let table = "t".repeat(64);
    let err = validation_error(&format!("tables:\n  public.{table}: {{}}\n"));
    assert_eq!(err.table.as_deref(), Some(format!("public.{table}").as_str()));
    assert_eq!(err.field, "name");

    let err = validation_error(&format!("roles:\n  {}: {{}}\n", "r".repeat(64)));
    assert_eq!(err.field, "roles");

    let err = validation_error(&format!(
        "tables:\n  t:\n    masks: [{{ column: {}, expression: \"'x'\", exposed_as: e }}]\n",
        "c".repeat(64)
    ));
    assert_eq!(err.field, "masks[0]");

    // exactly 63 bytes is fine
    assert!(policy::load_from_str(&format!("tables:\n  {}: {{}}\n", "t".repeat(63))).is_ok());
}
