//! Verification harness.
//!
//! A run compiles the policy, creates a throwaway namespace, seeds
//! multi-tenant fixtures, applies the compiled statements retargeted at the
//! namespace, checks the catalog, and drops the namespace. Declared roles
//! are rendered as `<namespace>_<role>`, so a run never alters a role it did
//! not create, and teardown drops them with the namespace.
//!
//! Teardown is attempted on every path once a namespace may exist,
//! including cancellation and run timeouts, and is bounded by its own
//! timeout.
//!
//! Validation and compilation failures surface before any database call.

pub mod assert;
pub mod fixtures;
pub mod ids;
pub mod run;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use pgseclab_core::compiler::{compile, CompiledPolicy};
use pgseclab_core::error::{PgSecLabError, Result};
use pgseclab_core::policy::Policy;
use pgseclab_core::sql::RenderTarget;

use crate::backend::VerifyBackend;
use crate::config::HarnessSection;
use crate::obs::VerifyMetrics;

pub use fixtures::{FixtureRow, FixtureTable};
pub use ids::{RandomIds, RunIdGenerator, SequentialIds};
pub use run::{RunPhase, VerificationReport, VerificationRun};

pub struct Harness<G: RunIdGenerator = RandomIds> {
    cfg: HarnessSection,
    ids: G,
    metrics: Arc<VerifyMetrics>,
}

impl Harness<RandomIds> {
    pub fn new(cfg: HarnessSection) -> Self {
        Self::with_ids(cfg, RandomIds)
    }
}

impl<G: RunIdGenerator> Harness<G> {
    pub fn with_ids(cfg: HarnessSection, ids: G) -> Self {
        Self {
            cfg,
            ids,
            metrics: Arc::new(VerifyMetrics::default()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<VerifyMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<VerifyMetrics> {
        &self.metrics
    }

    /// Run one verification against `backend`.
    ///
    /// Concurrent calls are independent as long as each gets its own backend
    /// session: every run draws its own namespace and tenants.
    pub async fn verify<B: VerifyBackend>(
        &self,
        policy: &Policy,
        backend: &mut B,
        cancel: &CancellationToken,
    ) -> Result<VerificationReport> {
        // Pre-flight: nothing below touches the database until this passes.
        let compiled = compile(policy)?;
        compiled.ensure_retargetable()?;
        compiled.ensure_role_scope(ids::namespace_len(&self.cfg.namespace_prefix))?;
        let plan = fixtures::plan(&compiled, &policy.tenants.column, &self.cfg.fixture_columns)?;

        let tenants: Vec<Uuid> = (0..self.cfg.tenants).map(|_| self.ids.tenant_id()).collect();
        let mut run = VerificationRun::new(tenants);

        let span = tracing::info_span!(
            "verify",
            system = %policy.metadata.system,
            namespace = tracing::field::Empty
        );
        async {
            self.metrics.runs_active.inc(&[]);
            let result = self
                .supervise(&compiled, &plan, backend, &mut run, cancel)
                .await;
            self.metrics.runs_active.dec(&[]);

            let outcome = match &result {
                Ok(_) => "ok",
                Err(e) => e.kind().as_str(),
            };
            self.metrics.runs.inc(&[("outcome", outcome)]);
            match &result {
                Ok(report) => tracing::info!(
                    namespace = %report.namespace,
                    tables = report.tables_asserted.len(),
                    elapsed_ms = report.elapsed_ms,
                    "verification passed"
                ),
                Err(e) => tracing::warn!(error = %e, code = e.kind().as_str(), "verification failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Body under cancellation and run timeout, then unconditional teardown.
    async fn supervise<B: VerifyBackend>(
        &self,
        compiled: &CompiledPolicy,
        plan: &[FixtureTable],
        backend: &mut B,
        run: &mut VerificationRun,
        cancel: &CancellationToken,
    ) -> Result<VerificationReport> {
        let outcome = {
            let body = self.run_phases(compiled, plan, &mut *backend, &mut *run);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(PgSecLabError::Cancelled(
                    "verification cancelled".into(),
                )),
                res = tokio::time::timeout(self.cfg.run_timeout(), body) => match res {
                    Ok(r) => r,
                    Err(_) => Err(PgSecLabError::Cancelled(format!(
                        "run exceeded {} ms",
                        self.cfg.run_timeout_ms
                    ))),
                },
            }
        };

        if let Err(e) = &outcome {
            tracing::debug!(phase = %run.phase(), error = %e, "run failed");
            run.advance(RunPhase::Failed, &self.metrics);
        }

        let teardown = self.teardown(backend, run).await;
        match (outcome, teardown) {
            (Ok(mut report), Ok(())) => {
                report.elapsed_ms = run.elapsed().as_millis() as u64;
                Ok(report)
            }
            (Ok(_), Err(td)) => Err(td),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(td)) => {
                tracing::error!(error = %td, "teardown failed after run failure");
                Err(e)
            }
        }
    }

    async fn run_phases<B: VerifyBackend>(
        &self,
        compiled: &CompiledPolicy,
        plan: &[FixtureTable],
        backend: &mut B,
        run: &mut VerificationRun,
    ) -> Result<VerificationReport> {
        let namespace = self.acquire_namespace(backend, run).await?;

        let mut rows_seeded = 0;
        for table in plan {
            let rows = fixtures::rows(table, &run.tenants, self.cfg.rows_per_tenant);
            backend.seed_table(&namespace, table, &rows).await?;
            rows_seeded += rows.len();
        }
        tracing::info!(tables = plan.len(), rows = rows_seeded, "fixtures seeded");
        run.advance(RunPhase::Seeded, &self.metrics);

        let target = RenderTarget::Namespace(namespace.clone());
        let statements = compiled.render(&target);
        // Recorded before apply so a partially applied batch is cleaned up.
        run.roles = compiled.rendered_roles(&target);
        backend.apply(&statements).await?;
        if self.cfg.reapply {
            backend.apply(&statements).await.map_err(|e| match e {
                PgSecLabError::Apply { index, stage, reason } => PgSecLabError::Apply {
                    index,
                    stage,
                    reason: format!("on re-apply: {reason}"),
                },
                other => other,
            })?;
        }
        for s in &statements {
            self.metrics
                .statements_applied
                .inc(&[("stage", s.stage.as_str())]);
        }
        tracing::info!(statements = statements.len(), "policy applied");
        run.advance(RunPhase::Applied, &self.metrics);

        let tables_asserted =
            assert::assert_catalog(backend, &namespace, compiled, &self.metrics).await?;
        run.advance(RunPhase::Asserted, &self.metrics);

        Ok(VerificationReport {
            namespace,
            tenants: run.tenants.clone(),
            fixture_tables: plan.len(),
            rows_seeded,
            statements_applied: statements.len(),
            scoped_roles: run.roles.clone(),
            tables_asserted,
            elapsed_ms: 0,
        })
    }

    async fn acquire_namespace<B: VerifyBackend>(
        &self,
        backend: &mut B,
        run: &mut VerificationRun,
    ) -> Result<String> {
        for attempt in 1..=self.cfg.namespace_attempts {
            let ns = ids::namespace_name(&self.cfg.namespace_prefix, &self.ids.namespace_suffix());
            if backend.namespace_exists(&ns).await? {
                tracing::warn!(namespace = %ns, attempt, "namespace taken");
                continue;
            }
            // Recorded before the create call so an interrupted create is
            // still dropped.
            run.namespace = Some(ns.clone());
            if backend.create_namespace(&ns).await? {
                tracing::Span::current().record("namespace", ns.as_str());
                tracing::info!("namespace created");
                run.advance(RunPhase::Created, &self.metrics);
                return Ok(ns);
            }
            run.namespace = None;
            tracing::warn!(namespace = %ns, attempt, "namespace created concurrently");
        }
        Err(PgSecLabError::Internal(format!(
            "no free namespace after {} attempts",
            self.cfg.namespace_attempts
        )))
    }

    async fn teardown<B: VerifyBackend>(
        &self,
        backend: &mut B,
        run: &mut VerificationRun,
    ) -> Result<()> {
        let Some(ns) = run.namespace.clone() else {
            return Ok(());
        };

        let roles = run.roles.clone();
        let drop_all = async {
            let schema = backend.drop_namespace(&ns).await;
            let roles = if roles.is_empty() {
                Ok(())
            } else {
                backend.drop_roles(&roles).await
            };
            schema.and(roles)
        };
        let dropped = match tokio::time::timeout(self.cfg.teardown_timeout(), drop_all).await {
            Ok(r) => r,
            Err(_) => Err(PgSecLabError::Internal(format!(
                "drop timed out after {} ms",
                self.cfg.teardown_timeout_ms
            ))),
        };
        run.advance(RunPhase::TornDown, &self.metrics);

        match dropped {
            Ok(()) => {
                tracing::info!(namespace = %ns, roles = roles.len(), "namespace dropped");
                Ok(())
            }
            Err(e) => {
                self.metrics.teardown_failures.inc(&[]);
                tracing::error!(namespace = %ns, error = %e, "teardown failed");
                Err(PgSecLabError::Teardown {
                    namespace: ns,
                    reason: e.to_string(),
                })
            }
        }
    }
}
