#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use pgseclab_core::error::ErrorKind;
use pgseclab_verify::config::{self, FixtureType};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
verify:
  tenants: 3
  rows_per_tenat: 5 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("rows_per_tenat"));
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.verify.tenants, 2);
    assert_eq!(cfg.verify.rows_per_tenant, 3);
    assert_eq!(cfg.verify.namespace_prefix, "pgseclab_verify");
    assert!(cfg.verify.reapply);
    assert_eq!(cfg.database.connect_timeout_ms, 5000);
}

#[test]
fn fixture_columns_parse_with_type_key() {
    let ok = r#"
version: 1
verify:
  fixture_columns:
    public.docs:
      - { name: owner, type: text }
      - { name: created, type: timestamp with time zone }
      - { name: rank, type: int }
"#;
    let cfg = config::load_from_str(ok).unwrap();
    let cols = &cfg.verify.fixture_columns["public.docs"];
    assert_eq!(cols[0].name, "owner");
    assert_eq!(cols[0].sql_type, FixtureType::Text);
    assert_eq!(cols[1].sql_type, FixtureType::Timestamptz);
    assert_eq!(cols[2].sql_type.as_sql(), "integer");
}

#[test]
fn rejects_out_of_range_values() {
    for bad in [
        "version: 2\n",
        "version: 1\nverify: { tenants: 1 }\n",
        "version: 1\nverify: { rows_per_tenant: 0 }\n",
        "version: 1\nverify: { namespace_prefix: 'Bad-Prefix' }\n",
        "version: 1\nverify: { namespace_prefix: '' }\n",
        "version: 1\nverify: { run_timeout_ms: 10 }\n",
        "version: 1\nverify: { namespace_attempts: 0 }\n",
        "version: 1\ndatabase: { connect_timeout_ms: 1 }\n",
        "version: 1\nverify: { fixture_columns: { t: [{ name: '', type: text }] } }\n",
        "version: 1\nverify: { fixture_columns: { t: [{ name: c, type: 'varchar(10)' }] } }\n",
        "version: 1\nverify: { fixture_columns: { t: [{ name: c, type: 'text; DROP TABLE x' }] } }\n",
    ] {
        let err = config::load_from_str(bad).expect_err(bad);
        assert_eq!(err.kind(), ErrorKind::Config, "{bad}");
    }
}

#[test]
fn missing_file_is_a_config_error() {
    let err = config::load_from_file("does/not/exist.yaml").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}
