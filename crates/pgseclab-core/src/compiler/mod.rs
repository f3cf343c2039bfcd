//! Policy compiler: validated `Policy` -> ordered DDL statements.
//!
//! The output is a fixed pipeline of stages (see [`Stage::PIPELINE`]):
//! roles, memberships, privileges, row security, masking. Later stages
//! reference objects created by earlier ones, so the order is part of the
//! contract, not an implementation detail. Compilation is pure: the same
//! policy always yields the same statements in the same order.
//!
//! Every statement is creation-guarded, so applying the output twice against
//! the same target does not fail.

pub mod resolve;
pub mod stages;

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write;

use crate::error::{PgSecLabError, Result};
use crate::policy::{Policy, TableName};
use crate::sql::{RenderTarget, RoleSlot, Statement, MAX_IDENT_LEN};

pub use resolve::MASKED_VIEW_SUFFIX;
pub use stages::SELECT_POLICY_NAME;

/// Generation stage, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Roles,
    Memberships,
    Privileges,
    RowSecurity,
    Masking,
}

impl Stage {
    pub const PIPELINE: [Stage; 5] = [
        Stage::Roles,
        Stage::Memberships,
        Stage::Privileges,
        Stage::RowSecurity,
        Stage::Masking,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Roles => "roles",
            Stage::Memberships => "memberships",
            Stage::Privileges => "privileges",
            Stage::RowSecurity => "row_security",
            Stage::Masking => "masking",
        }
    }

    fn generate(self, r: &resolve::ResolvedPolicy) -> Vec<Statement> {
        match self {
            Stage::Roles => stages::roles(r),
            Stage::Memberships => stages::memberships(r),
            Stage::Privileges => stages::privileges(r),
            Stage::RowSecurity => stages::row_security(r),
            Stage::Masking => stages::masking(r),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStatement {
    pub stage: Stage,
    pub statement: Statement,
}

/// One rendered statement, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedStatement {
    pub stage: Stage,
    pub sql: String,
}

/// What the compiled artifact does to one table. Used to plan fixtures and
/// catalog assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTarget {
    pub name: TableName,
    /// Declared under `tables` (false: only referenced by a privilege).
    pub declared: bool,
    pub row_security: bool,
    pub masked_columns: Vec<String>,
    pub masked_view: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    statements: Vec<CompiledStatement>,
    roles: Vec<String>,
    tables: Vec<TableTarget>,
}

impl CompiledPolicy {
    pub fn statements(&self) -> &[CompiledStatement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Statements of one stage, in order.
    pub fn stage(&self, stage: Stage) -> impl Iterator<Item = &Statement> {
        self.statements
            .iter()
            .filter(move |s| s.stage == stage)
            .map(|s| &s.statement)
    }

    /// Declared role names, sorted.
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Role names as `target` renders them, in [`Self::roles`] order.
    pub fn rendered_roles(&self, target: &RenderTarget) -> Vec<String> {
        self.roles
            .iter()
            .map(|r| RoleSlot::new(r.as_str()).resolve(target).into_owned())
            .collect()
    }

    /// Tables in scope (declared or referenced), sorted by qualified name.
    pub fn tables(&self) -> &[TableTarget] {
        &self.tables
    }

    pub fn row_security_tables(&self) -> impl Iterator<Item = &TableTarget> {
        self.tables.iter().filter(|t| t.row_security)
    }

    pub fn render(&self, target: &RenderTarget) -> Vec<RenderedStatement> {
        self.statements
            .iter()
            .map(|s| RenderedStatement {
                stage: s.stage,
                sql: s.statement.render(target),
            })
            .collect()
    }

    /// One SQL blob with a comment header per stage.
    pub fn to_sql(&self, target: &RenderTarget) -> String {
        let mut out = String::new();
        let mut current: Option<Stage> = None;
        for s in self.render(target) {
            if current != Some(s.stage) {
                if current.is_some() {
                    out.push('\n');
                }
                let _ = writeln!(out, "-- stage: {}", s.stage);
                current = Some(s.stage);
            }
            out.push_str(&s.sql);
            out.push('\n');
        }
        out
    }

    /// Fail if rendering every schema into one namespace would make two
    /// relations collide (same table name in two schemas).
    pub fn ensure_retargetable(&self) -> Result<()> {
        let mut seen: BTreeMap<&str, &TableName> = BTreeMap::new();
        for t in &self.tables {
            let names = std::iter::once(t.name.name.as_str()).chain(t.masked_view.as_deref());
            for n in names {
                if let Some(prev) = seen.insert(n, &t.name) {
                    return Err(PgSecLabError::Compilation(format!(
                        "{prev} and {} collide as {n:?} in a single namespace",
                        t.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Fail if a role scoped into a namespace of `namespace_len` bytes would
    /// exceed the identifier length limit.
    pub fn ensure_role_scope(&self, namespace_len: usize) -> Result<()> {
        let budget = MAX_IDENT_LEN.saturating_sub(namespace_len + 1);
        for r in &self.roles {
            if r.len() > budget {
                return Err(PgSecLabError::Compilation(format!(
                    "role {r} is too long to scope into a {namespace_len}-byte namespace \
                     (at most {budget} bytes; shorten the namespace prefix)"
                )));
            }
        }
        Ok(())
    }
}

/// Compile a validated policy.
pub fn compile(policy: &Policy) -> Result<CompiledPolicy> {
    let resolved = resolve::resolve(policy)?;

    let mut statements = Vec::new();
    for stage in Stage::PIPELINE {
        let generated = stage.generate(&resolved);
        tracing::debug!(stage = %stage, statements = generated.len(), "stage generated");
        statements.extend(
            generated
                .into_iter()
                .map(|statement| CompiledStatement { stage, statement }),
        );
    }

    let mut tables: Vec<TableTarget> = resolved
        .tables
        .iter()
        .map(|t| TableTarget {
            name: t.name.clone(),
            declared: true,
            row_security: t.row_filter.is_some(),
            masked_columns: t.masks.iter().map(|m| m.column.clone()).collect(),
            masked_view: t.masked_view(),
        })
        .chain(resolved.referenced.iter().map(|name| TableTarget {
            name: name.clone(),
            declared: false,
            row_security: false,
            masked_columns: Vec::new(),
            masked_view: None,
        }))
        .collect();
    tables.sort_by(|a, b| a.name.cmp(&b.name));

    let roles = resolved.roles.iter().map(|r| r.name.clone()).collect();

    Ok(CompiledPolicy {
        statements,
        roles,
        tables,
    })
}
