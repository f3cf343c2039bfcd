#![allow(clippy::unwrap_used)]

use pgseclab::core::{compile, policy, RenderTarget};
use pgseclab::verify::{config, Harness};

#[test]
fn facade_exposes_compiler_and_harness() {
    let p = policy::load_from_str("roles:\n  reader: { login: true }\n").unwrap();
    let sql = compile(&p).unwrap().to_sql(&RenderTarget::Declared);
    assert!(sql.contains(r#"ALTER ROLE "reader" WITH LOGIN NOCREATEDB;"#));

    let cfg = config::load_from_str("version: 1\n").unwrap();
    let h = Harness::new(cfg.verify);
    assert!(h.metrics().render().contains("pgseclab_verify_runs_total"));
}
