//! Database seam for the verification harness.
//!
//! The harness only talks to the database through [`VerifyBackend`]; the
//! PostgreSQL implementation lives in [`postgres`]. One backend value is one
//! session, so concurrent runs each hold their own.

pub mod postgres;

use async_trait::async_trait;

use pgseclab_core::compiler::RenderedStatement;
use pgseclab_core::error::Result;

use crate::harness::fixtures::{FixtureRow, FixtureTable};

#[async_trait]
pub trait VerifyBackend: Send {
    async fn namespace_exists(&mut self, namespace: &str) -> Result<bool>;

    /// `Ok(false)` when the namespace already exists; nothing was created.
    async fn create_namespace(&mut self, namespace: &str) -> Result<bool>;

    async fn seed_table(
        &mut self,
        namespace: &str,
        table: &FixtureTable,
        rows: &[FixtureRow],
    ) -> Result<()>;

    /// Execute in order inside one transaction. The first failure aborts the
    /// batch with `Apply { index, stage, .. }`.
    async fn apply(&mut self, statements: &[RenderedStatement]) -> Result<()>;

    /// Row-security flag of a table; `None` when the table is absent.
    async fn row_security(&mut self, namespace: &str, table: &str) -> Result<Option<bool>>;

    async fn policy_count(&mut self, namespace: &str, table: &str) -> Result<i64>;

    async fn relation_exists(&mut self, namespace: &str, name: &str) -> Result<bool>;

    /// Drop the namespace and everything in it. Absent namespace is not an error.
    async fn drop_namespace(&mut self, namespace: &str) -> Result<()>;

    /// Drop run-scoped roles. Absent roles are skipped.
    async fn drop_roles(&mut self, roles: &[String]) -> Result<()>;
}
