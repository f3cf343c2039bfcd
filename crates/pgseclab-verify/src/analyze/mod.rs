//! Read-only instance analysis.
//!
//! Collects instance settings, roles (with their table grants) and tables
//! through [`CatalogReader`], then evaluates [`rules`] over the result.
//! Nothing here writes to the database.

pub mod rules;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use pgseclab_core::error::Result;

pub use rules::{Finding, Severity};

/// Settings read from `pg_settings`. Absent ones are left out of the report.
pub const INSTANCE_SETTINGS: [&str; 5] = [
    "ssl",
    "password_encryption",
    "log_connections",
    "log_disconnections",
    "log_statement",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstanceInfo {
    pub version: String,
    pub settings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleInfo {
    pub name: String,
    pub login: bool,
    pub superuser: bool,
    #[serde(rename = "bypassrls")]
    pub bypass_rls: bool,
    /// `PRIVILEGE ON schema.table`, sorted by object then privilege.
    pub grants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub rls_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub instance: InstanceInfo,
    pub roles: Vec<RoleInfo>,
    pub tables: Vec<TableInfo>,
    pub findings: Vec<Finding>,
}

impl AnalysisReport {
    /// Highest severity among the findings, if any.
    pub fn worst(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}

/// Read side of the catalog the analyzer needs.
#[async_trait]
pub trait CatalogReader: Send {
    async fn instance_info(&mut self, settings: &[&str]) -> Result<InstanceInfo>;

    /// Non-system roles sorted by name, grants left empty.
    async fn roles(&mut self) -> Result<Vec<RoleInfo>>;

    async fn role_grants(&mut self, role: &str) -> Result<Vec<String>>;

    /// Ordinary tables outside the system schemas, sorted by schema and name.
    async fn tables(&mut self) -> Result<Vec<TableInfo>>;
}

pub async fn analyze<R: CatalogReader>(reader: &mut R) -> Result<AnalysisReport> {
    let instance = reader.instance_info(&INSTANCE_SETTINGS).await?;

    let mut roles = reader.roles().await?;
    for role in &mut roles {
        role.grants = reader.role_grants(&role.name).await?;
    }

    let tables = reader.tables().await?;
    let findings = rules::evaluate(&instance, &roles, &tables);

    tracing::info!(
        roles = roles.len(),
        tables = tables.len(),
        findings = findings.len(),
        "analysis complete"
    );
    Ok(AnalysisReport {
        instance,
        roles,
        tables,
        findings,
    })
}
