//! Catalog assertions against the verification namespace.
//!
//! Fail-fast: the first table that does not satisfy an invariant ends the
//! check with an `Assertion` error naming the table and the invariant.

use pgseclab_core::compiler::CompiledPolicy;
use pgseclab_core::error::{Invariant, PgSecLabError, Result};

use crate::backend::VerifyBackend;
use crate::obs::VerifyMetrics;

fn check(
    metrics: &VerifyMetrics,
    table: &str,
    invariant: Invariant,
    holds: bool,
) -> Result<()> {
    let result = if holds { "pass" } else { "fail" };
    metrics
        .assertions
        .inc(&[("invariant", invariant.as_str()), ("result", result)]);
    if holds {
        Ok(())
    } else {
        tracing::warn!(table, invariant = %invariant, "catalog assertion failed");
        Err(PgSecLabError::Assertion {
            table: table.to_string(),
            invariant,
        })
    }
}

/// Check every in-scope table; returns the qualified names checked.
pub async fn assert_catalog<B: VerifyBackend>(
    backend: &mut B,
    namespace: &str,
    compiled: &CompiledPolicy,
    metrics: &VerifyMetrics,
) -> Result<Vec<String>> {
    let mut checked = Vec::new();
    for t in compiled.tables() {
        if !t.row_security && t.masked_view.is_none() {
            continue;
        }
        let qualified = t.name.to_string();
        let relname = t.name.name.as_str();

        if t.row_security {
            let flag = backend.row_security(namespace, relname).await?;
            check(metrics, &qualified, Invariant::TablePresent, flag.is_some())?;
            check(
                metrics,
                &qualified,
                Invariant::RowSecurityEnabled,
                flag == Some(true),
            )?;
            let policies = backend.policy_count(namespace, relname).await?;
            check(metrics, &qualified, Invariant::PolicyAttached, policies >= 1)?;
        }

        if let Some(view) = &t.masked_view {
            let present = backend.relation_exists(namespace, view).await?;
            check(metrics, &qualified, Invariant::MaskedViewPresent, present)?;
        }

        checked.push(qualified);
    }
    Ok(checked)
}
