//! pgseclab verification harness and instance analyzer.
//!
//! Proves a compiled policy against a live PostgreSQL instance without
//! touching the declared schemas or roles: every run works inside its own
//! throwaway namespace and removes it afterwards. [`analyze`] reports on an
//! instance with read-only catalog queries.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod analyze;
pub mod backend;
pub mod config;
pub mod harness;
pub mod obs;

use std::sync::Arc;

pub use tokio_util::sync::CancellationToken;

use pgseclab_core::error::Result;
use pgseclab_core::policy::Policy;

pub use analyze::{AnalysisReport, CatalogReader};
pub use backend::postgres::PgBackend;
pub use backend::VerifyBackend;
pub use config::{DatabaseSection, VerifyConfig};
pub use harness::{Harness, VerificationReport};
pub use obs::VerifyMetrics;

/// Connect, run one verification with random ids, close the session.
pub async fn verify_with_postgres(
    policy: &Policy,
    database_url: &str,
    cfg: &VerifyConfig,
    metrics: Arc<VerifyMetrics>,
    cancel: &CancellationToken,
) -> Result<VerificationReport> {
    // Pre-flight before connecting so bad policies never open a session.
    let compiled = pgseclab_core::compile(policy)?;
    compiled.ensure_retargetable()?;
    compiled.ensure_role_scope(harness::ids::namespace_len(&cfg.verify.namespace_prefix))?;

    let mut backend = PgBackend::connect(database_url, &cfg.database).await?;
    let harness = Harness::new(cfg.verify.clone()).with_metrics(metrics);
    let result = harness.verify(policy, &mut backend, cancel).await;
    if let Err(e) = backend.close().await {
        tracing::debug!(error = %e, "closing session failed");
    }
    result
}

/// Connect, analyze the instance, close the session.
pub async fn analyze_with_postgres(
    database_url: &str,
    db: &DatabaseSection,
) -> Result<AnalysisReport> {
    let mut backend = PgBackend::connect(database_url, db).await?;
    let result = analyze::analyze(&mut backend).await;
    if let Err(e) = backend.close().await {
        tracing::debug!(error = %e, "closing session failed");
    }
    result
}
