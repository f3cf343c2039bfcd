//! Fixture tables and rows seeded into the verification namespace.
//!
//! Each table in the compiled policy's scope gets a stand-in with an `id`,
//! the tenant column, every masked column (as `text`), and any configured
//! extra columns. Rows are deterministic per (tenant, table, index) and
//! unique across tenants, so tenant isolation has something to isolate.

use std::collections::BTreeMap;

use uuid::Uuid;

use pgseclab_core::compiler::CompiledPolicy;
use pgseclab_core::error::{PgSecLabError, Result};
use pgseclab_core::policy::TableName;
use pgseclab_core::sql::quote_ident;

use crate::config::FixtureColumn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureTable {
    /// Unqualified; fixtures always live in the namespace.
    pub name: String,
    pub tenant_column: String,
    pub text_columns: Vec<String>,
    pub extra_columns: Vec<FixtureColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureRow {
    pub id: Uuid,
    pub tenant: Uuid,
    /// Aligned with `FixtureTable::text_columns`.
    pub values: Vec<String>,
}

impl FixtureTable {
    pub fn create_sql(&self, namespace: &str) -> String {
        let mut cols = vec![
            "\"id\" uuid PRIMARY KEY".to_string(),
            format!("{} uuid NOT NULL", quote_ident(&self.tenant_column)),
        ];
        cols.extend(self.text_columns.iter().map(|c| format!("{} text", quote_ident(c))));
        cols.extend(
            self.extra_columns
                .iter()
                .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type.as_sql())),
        );
        format!(
            "CREATE TABLE {}.{} ({});",
            quote_ident(namespace),
            quote_ident(&self.name),
            cols.join(", ")
        )
    }

    /// Parameterised insert: `$1` id, `$2` tenant, then one per text column.
    pub fn insert_sql(&self, namespace: &str) -> String {
        let mut cols = vec!["\"id\"".to_string(), quote_ident(&self.tenant_column)];
        cols.extend(self.text_columns.iter().map(|c| quote_ident(c)));
        let params = (1..=cols.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {}.{} ({}) VALUES ({})",
            quote_ident(namespace),
            quote_ident(&self.name),
            cols.join(", "),
            params
        )
    }
}

/// One fixture table per table in scope.
pub fn plan(
    compiled: &CompiledPolicy,
    tenant_column: &str,
    extra: &BTreeMap<String, Vec<FixtureColumn>>,
) -> Result<Vec<FixtureTable>> {
    let mut extra_by_table: BTreeMap<TableName, &Vec<FixtureColumn>> = BTreeMap::new();
    for (key, cols) in extra {
        let name = TableName::parse(key).map_err(|reason| {
            PgSecLabError::Config(format!("verify.fixture_columns.{key}: {reason}"))
        })?;
        extra_by_table.insert(name, cols);
    }

    let reserved = ["id", tenant_column];
    let mut out = Vec::with_capacity(compiled.tables().len());
    for t in compiled.tables() {
        let mut text_columns: Vec<String> = Vec::new();
        for c in &t.masked_columns {
            if !reserved.contains(&c.as_str()) && !text_columns.contains(c) {
                text_columns.push(c.clone());
            }
        }

        let mut extra_columns: Vec<FixtureColumn> = Vec::new();
        if let Some(cols) = extra_by_table.get(&t.name) {
            for c in cols.iter() {
                let taken = reserved.contains(&c.name.as_str())
                    || text_columns.contains(&c.name)
                    || extra_columns.iter().any(|e| e.name == c.name);
                if !taken {
                    extra_columns.push(c.clone());
                }
            }
        }

        out.push(FixtureTable {
            name: t.name.name.clone(),
            tenant_column: tenant_column.to_string(),
            text_columns,
            extra_columns,
        });
    }
    Ok(out)
}

/// `per_tenant` rows for every tenant.
pub fn rows(table: &FixtureTable, tenants: &[Uuid], per_tenant: usize) -> Vec<FixtureRow> {
    let mut out = Vec::with_capacity(tenants.len() * per_tenant);
    for (t, tenant) in tenants.iter().enumerate() {
        for i in 0..per_tenant {
            let id = Uuid::new_v5(tenant, format!("{}:{i}", table.name).as_bytes());
            let values = table
                .text_columns
                .iter()
                .map(|c| format!("{c}-t{t}-{i}@fixture.invalid"))
                .collect();
            out.push(FixtureRow {
                id,
                tenant: *tenant,
                values,
            });
        }
    }
    out
}
