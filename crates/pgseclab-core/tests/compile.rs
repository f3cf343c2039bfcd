//! Compiler ordering, determinism, quoting and retargeting.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use pgseclab_core::compiler::{compile, Stage, SELECT_POLICY_NAME};
use pgseclab_core::error::ErrorKind;
use pgseclab_core::policy::{self, Policy};
use pgseclab_core::sql::{RenderTarget, Statement};

fn load(name: &str) -> Policy {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    policy::load_from_str(&s).unwrap()
}

fn declared(p: &Policy) -> Vec<String> {
    compile(p)
        .unwrap()
        .render(&RenderTarget::Declared)
        .into_iter()
        .map(|s| s.sql)
        .collect()
}

#[test]
fn scenario_a_enables_rls_with_one_policy_and_masks_email() {
    let compiled = compile(&load("scenario_a.yaml")).unwrap();

    let rls: Vec<&Statement> = compiled.stage(Stage::RowSecurity).collect();
    let enables: Vec<_> = rls
        .iter()
        .filter(|s| matches!(s, Statement::EnableRowSecurity { .. }))
        .collect();
    let creates: Vec<_> = rls
        .iter()
        .filter(|s| matches!(s, Statement::CreateSelectPolicy { .. }))
        .collect();
    assert_eq!(enables.len(), 1, "only customers requests RLS");
    assert_eq!(creates.len(), 1);

    let sql = compiled.to_sql(&RenderTarget::Declared);
    assert!(sql.contains(r#"ALTER TABLE "public"."customers" ENABLE ROW LEVEL SECURITY;"#));
    assert!(sql.contains(&format!(
        r#"CREATE POLICY "{SELECT_POLICY_NAME}" ON "public"."customers" AS PERMISSIVE FOR SELECT USING ((tenant_id = current_setting('app.tenant_id')::uuid) AND ("tenant_id" = nullif(current_setting('app.tenant_id', true), '')::uuid));"#
    )));
    assert!(!sql.contains(r#"ALTER TABLE "public"."orders" ENABLE"#));

    let masking: Vec<&Statement> = compiled.stage(Stage::Masking).collect();
    assert!(masking.iter().any(|s| matches!(
        s,
        Statement::CreateMaskedView { masks, .. } if masks[0].exposed_as == "email_masked"
    )));
    assert!(sql.contains(r#"DROP VIEW IF EXISTS "public"."customers_masked";"#));

    let targets = compiled.tables();
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0].name.name, "customers");
    assert!(targets[0].row_security);
    assert_eq!(targets[0].masked_columns, ["email"]);
    assert!(!targets[1].row_security);
}

#[test]
fn stages_follow_the_pipeline_order() {
    let compiled = compile(&load("scenario_a.yaml")).unwrap();
    let order: Vec<Stage> = compiled.statements().iter().map(|s| s.stage).collect();
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(order, sorted);
    assert_eq!(order.first(), Some(&Stage::Roles));
    assert_eq!(order.last(), Some(&Stage::Masking));
}

#[test]
fn roles_are_defined_lexicographically() {
    let compiled = compile(&load("roles_only.yaml")).unwrap();
    let names: Vec<&str> = compiled
        .stage(Stage::Roles)
        .map(|s| match s {
            Statement::EnsureRole { name, .. } => name.declared(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(names, ["analyst", "hr_admin", "hr_team", "reporting"]);
}

#[test]
fn roles_only_policy_compiles_to_role_and_grant_statements() {
    let compiled = compile(&load("roles_only.yaml")).unwrap();
    assert_eq!(compiled.stage(Stage::RowSecurity).count(), 0);
    assert_eq!(compiled.stage(Stage::Masking).count(), 0);
    assert!(compiled.tables().is_empty());

    let sql = compiled.to_sql(&RenderTarget::Declared);
    assert!(sql.contains(r#"GRANT "hr_team" TO "analyst";"#));
    assert!(sql.contains(r#"GRANT "hr_team" TO "hr_admin";"#));
    assert!(sql.contains(r#"GRANT USAGE ON SCHEMA "hr" TO "hr_team";"#));
    assert!(sql.contains(r#"GRANT SELECT ON ALL TABLES IN SCHEMA "hr" TO "hr_team";"#));
    assert!(sql.contains(r#"ALTER ROLE "hr_admin" WITH LOGIN CREATEDB;"#));
}

#[test]
fn compile_is_deterministic() {
    let p = load("scenario_a.yaml");
    assert_eq!(declared(&p), declared(&p));
}

#[test]
fn table_order_does_not_depend_on_document_order() {
    let a = policy::load_from_str(
        "tables:\n  b: { rls: { enabled: true, select_policy: 'true' } }\n  a: { rls: { enabled: true, select_policy: 'true' } }\n",
    )
    .unwrap();
    let b = policy::load_from_str(
        "tables:\n  a: { rls: { enabled: true, select_policy: 'true' } }\n  b: { rls: { enabled: true, select_policy: 'true' } }\n",
    )
    .unwrap();
    assert_eq!(declared(&a), declared(&b));
}

#[test]
fn masked_select_moves_from_base_table_to_view() {
    let sql = compile(&load("scenario_a.yaml"))
        .unwrap()
        .to_sql(&RenderTarget::Declared);

    // app_rw keeps write access on the base table but not SELECT
    assert!(sql.contains(r#"GRANT INSERT, UPDATE ON TABLE "public"."customers" TO "app_rw";"#));
    assert!(sql.contains(r#"REVOKE SELECT ON TABLE "public"."customers" FROM "app_rw";"#));
    assert!(sql.contains(r#"GRANT SELECT ON TABLE "public"."customers_masked" TO "app_rw";"#));

    // schema-wide SELECT is narrowed for masked tables
    assert!(sql.contains(r#"GRANT SELECT ON ALL TABLES IN SCHEMA "public" TO "support";"#));
    assert!(sql.contains(r#"REVOKE SELECT ON TABLE "public"."customers" FROM "support";"#));
    assert!(sql.contains(r#"GRANT SELECT ON TABLE "public"."customers_masked" TO "support";"#));

    // unmasked table is granted directly
    assert!(sql.contains(r#"GRANT SELECT ON TABLE "public"."orders" TO "app_rw";"#));
}

#[test]
fn masked_view_carries_the_row_filter() {
    let compiled = compile(&load("scenario_a.yaml")).unwrap();
    let view = compiled
        .stage(Stage::Masking)
        .find(|s| matches!(s, Statement::CreateMaskedView { .. }))
        .unwrap();
    match view {
        Statement::CreateMaskedView { filter, .. } => assert!(filter.is_some()),
        _ => unreachable!(),
    }
}

#[test]
fn rls_without_tenants_uses_the_author_predicate_alone() {
    let p = policy::load_from_str(
        "tables:\n  docs:\n    rls: { enabled: true, select_policy: owner = current_user }\n",
    )
    .unwrap();
    let sql = compile(&p).unwrap().to_sql(&RenderTarget::Declared);
    assert!(sql.contains(r#"FOR SELECT USING ((owner = current_user));"#));
    assert!(!sql.contains("current_setting"));
}

#[test]
fn hostile_identifiers_are_quoted_not_interpolated() {
    let p = policy::load_from_str(
        r#"
roles:
  'evil"; DROP ROLE postgres; --':
    privileges:
      - object: 'public.t"x'
        actions: [SELECT]
"#,
    )
    .unwrap();
    let sql = compile(&p).unwrap().to_sql(&RenderTarget::Declared);
    assert!(sql.contains(r#"CREATE ROLE "evil""; DROP ROLE postgres; --";"#));
    assert!(sql.contains(r#"WHERE rolname = 'evil"; DROP ROLE postgres; --'"#));
    assert!(sql.contains(r#"ON TABLE "public"."t""x" TO "evil""; DROP ROLE postgres; --";"#));
}

#[test]
fn every_statement_is_creation_guarded() {
    let compiled = compile(&load("scenario_a.yaml")).unwrap();
    for s in compiled.render(&RenderTarget::Declared) {
        let sql = s.sql.as_str();
        if sql.starts_with("CREATE POLICY") {
            continue; // preceded by DROP POLICY IF EXISTS
        }
        assert!(
            sql.starts_with("DO ")
                || sql.starts_with("GRANT ")
                || sql.starts_with("REVOKE ")
                || sql.starts_with("DROP ")
                || sql.contains("ENABLE ROW LEVEL SECURITY"),
            "unguarded statement: {sql}"
        );
    }
    let rendered = compiled.render(&RenderTarget::Declared);
    for (i, s) in rendered.iter().enumerate() {
        if s.sql.starts_with("CREATE POLICY") {
            assert!(rendered[i - 1].sql.starts_with("DROP POLICY IF EXISTS"));
        }
    }
}

#[test]
fn namespace_target_rewrites_every_schema_reference() {
    let compiled = compile(&load("scenario_a.yaml")).unwrap();
    let sql = compiled.to_sql(&RenderTarget::Namespace("pgseclab_verify_abc".into()));
    assert!(!sql.contains(r#""public"."#));
    assert!(!sql.contains(r#"SCHEMA "public""#));
    assert!(sql.contains(r#"ALTER TABLE "pgseclab_verify_abc"."customers" ENABLE ROW LEVEL SECURITY;"#));
    // predicate text is left alone
    assert!(sql.contains("current_setting('app.tenant_id')::uuid"));
}

#[test]
fn namespace_target_scopes_every_role_reference() {
    let compiled = compile(&load("roles_only.yaml")).unwrap();
    let ns = RenderTarget::Namespace("pgseclab_verify_abc".into());
    let sql = compiled.to_sql(&ns);

    assert!(sql.contains("WHERE rolname = 'pgseclab_verify_abc_hr_admin'"));
    assert!(sql.contains(r#"GRANT "pgseclab_verify_abc_hr_team" TO "pgseclab_verify_abc_analyst";"#));
    assert!(sql.contains(
        r#"GRANT SELECT ON ALL TABLES IN SCHEMA "pgseclab_verify_abc" TO "pgseclab_verify_abc_hr_team";"#
    ));
    for role in compiled.roles() {
        assert!(!sql.contains(&format!("\"{role}\"")), "{role} rendered unscoped");
    }
    assert_eq!(
        compiled.rendered_roles(&ns),
        [
            "pgseclab_verify_abc_analyst",
            "pgseclab_verify_abc_hr_admin",
            "pgseclab_verify_abc_hr_team",
            "pgseclab_verify_abc_reporting",
        ]
    );
}

#[test]
fn schema_target_moves_tables_but_keeps_role_names() {
    let compiled = compile(&load("scenario_a.yaml")).unwrap();
    let sql = compiled.to_sql(&RenderTarget::Schema("staging".into()));
    assert!(sql.contains(r#"ALTER TABLE "staging"."customers" ENABLE ROW LEVEL SECURITY;"#));
    assert!(sql.contains(r#"GRANT USAGE ON SCHEMA "staging" TO "support";"#));
    assert_eq!(compiled.rendered_roles(&RenderTarget::Schema("staging".into())), compiled.roles());
}

#[test]
fn scoped_role_names_must_fit_the_identifier_limit() {
    let compiled = compile(&load("roles_only.yaml")).unwrap();
    // "reporting" is the longest role at 9 bytes
    assert!(compiled.ensure_role_scope(63 - 10).is_ok());
    let err = compiled.ensure_role_scope(63 - 9).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compilation);
    assert!(err.to_string().contains("reporting"));
}

#[test]
fn row_security_attaches_only_a_select_policy() {
    let sql = compile(&load("scenario_a.yaml"))
        .unwrap()
        .to_sql(&RenderTarget::Declared);
    assert_eq!(sql.matches("CREATE POLICY").count(), 1);
    assert!(sql.contains("FOR SELECT USING"));
    assert!(!sql.contains("FOR ALL"));
    assert!(!sql.contains("WITH CHECK"));
}

#[test]
fn overlong_masked_view_name_is_a_compilation_error() {
    let masked = |table: &str| {
        format!("tables:\n  {table}:\n    masks: [{{ column: email, expression: \"'x'\", exposed_as: e }}]\n")
    };

    // 56 + "_masked" is exactly 63 bytes
    let fits = policy::load_from_str(&masked(&"c".repeat(56))).unwrap();
    assert!(compile(&fits).is_ok());

    let long = policy::load_from_str(&masked(&"c".repeat(60))).unwrap();
    let err = compile(&long).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compilation);
    assert!(err.to_string().contains("exceeds 63 bytes"), "{err}");
}

#[test]
fn overlong_privilege_object_is_a_compilation_error() {
    let doc = format!(
        "roles:\n  r:\n    privileges:\n      - {{ object: public.{}, actions: [SELECT] }}\n",
        "t".repeat(64)
    );
    let err = compile(&policy::load_from_str(&doc).unwrap()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compilation);
}

#[test]
fn namespace_retargeting_detects_collisions() {
    let p = policy::load_from_str("tables:\n  a.orders: {}\n  b.orders: {}\n").unwrap();
    let err = compile(&p).unwrap().ensure_retargetable().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compilation);
    assert!(compile(&load("scenario_a.yaml")).unwrap().ensure_retargetable().is_ok());
}

#[test]
fn unresolved_member_is_a_compilation_error() {
    let err = compile(&load("unresolved_member.yaml")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compilation);
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn unknown_action_is_a_compilation_error() {
    let p = policy::load_from_str(
        "roles:\n  r:\n    privileges:\n      - { object: t, actions: [SELEKT] }\n",
    )
    .unwrap();
    assert_eq!(compile(&p).unwrap_err().kind(), ErrorKind::Compilation);
}

#[test]
fn privilege_only_tables_are_in_scope() {
    let p = policy::load_from_str(
        "roles:\n  r:\n    privileges:\n      - { object: audit.events, actions: [INSERT] }\n",
    )
    .unwrap();
    let compiled = compile(&p).unwrap();
    let t = &compiled.tables()[0];
    assert_eq!(t.name.to_string(), "audit.events");
    assert!(!t.declared);
    assert!(!t.row_security);
}

#[test]
fn masked_view_name_clash_is_a_compilation_error() {
    let p = policy::load_from_str(
        "tables:\n  customers:\n    masks: [{ column: email, expression: \"'x'\", exposed_as: e }]\n  customers_masked: {}\n",
    )
    .unwrap();
    assert_eq!(compile(&p).unwrap_err().kind(), ErrorKind::Compilation);
}
