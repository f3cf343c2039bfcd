//! Resolve a validated policy into typed, sorted compile input.
//!
//! Everything that can fail at compile time fails here (unresolved role
//! members, unknown actions, malformed privilege objects, view name clashes
//! or overlong view names),
//! so the stage functions are infallible.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PgSecLabError, Result};
use crate::policy::{Policy, PrivilegeAction, PrivilegeObject, TableName};
use crate::sql::{MaskProjection, Predicate, TrustedFragment, MAX_IDENT_LEN};

/// Suffix of the view that carries masked projections.
pub const MASKED_VIEW_SUFFIX: &str = "_masked";

#[derive(Debug, Clone)]
pub struct ResolvedPolicy {
    /// Sorted by name.
    pub roles: Vec<ResolvedRole>,
    /// Tables declared under `tables`, sorted by qualified name.
    pub tables: Vec<ResolvedTable>,
    /// Tables referenced only through role privileges.
    pub referenced: BTreeSet<TableName>,
}

#[derive(Debug, Clone)]
pub struct ResolvedRole {
    pub name: String,
    pub login: bool,
    pub create_db: bool,
    pub members: Vec<String>,
    pub grants: Vec<ResolvedGrant>,
}

#[derive(Debug, Clone)]
pub struct ResolvedGrant {
    pub object: PrivilegeObject,
    /// Deduplicated and sorted; `ALL` stays as a single entry.
    pub actions: Vec<PrivilegeAction>,
}

impl ResolvedGrant {
    pub fn includes_select(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a, PrivilegeAction::Select | PrivilegeAction::All))
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedTable {
    pub name: TableName,
    pub row_filter: Option<Predicate>,
    pub masks: Vec<MaskProjection>,
}

impl ResolvedTable {
    pub fn masked_view(&self) -> Option<String> {
        if self.masks.is_empty() {
            None
        } else {
            Some(format!("{}{MASKED_VIEW_SUFFIX}", self.name.name))
        }
    }
}

impl ResolvedPolicy {
    pub fn table(&self, name: &TableName) -> Option<&ResolvedTable> {
        self.tables.iter().find(|t| &t.name == name)
    }

    pub fn masked_tables_in<'a>(&'a self, schema: &'a str) -> impl Iterator<Item = &'a ResolvedTable> {
        self.tables
            .iter()
            .filter(move |t| t.name.schema == schema && !t.masks.is_empty())
    }
}

pub fn resolve(policy: &Policy) -> Result<ResolvedPolicy> {
    let declared_roles: BTreeSet<&str> = policy.roles.keys().collect();

    let mut roles = Vec::with_capacity(policy.roles.len());
    let mut referenced = BTreeSet::new();

    for (name, role) in policy.roles.sorted() {
        for member in &role.members {
            if !declared_roles.contains(member.as_str()) {
                return Err(PgSecLabError::Compilation(format!(
                    "role {name}: member {member} is not a declared role"
                )));
            }
            if member == name {
                return Err(PgSecLabError::Compilation(format!(
                    "role {name}: a role cannot be a member of itself"
                )));
            }
        }

        let mut grants = Vec::with_capacity(role.privileges.len());
        for p in &role.privileges {
            let object = PrivilegeObject::parse(&p.object).map_err(|reason| {
                PgSecLabError::Compilation(format!("role {name}: privilege object: {reason}"))
            })?;
            if p.actions.is_empty() {
                return Err(PgSecLabError::Compilation(format!(
                    "role {name}: privilege on {} has no actions",
                    p.object
                )));
            }
            let mut actions = BTreeSet::new();
            for raw in &p.actions {
                let a = PrivilegeAction::parse(raw).ok_or_else(|| {
                    PgSecLabError::Compilation(format!("role {name}: unknown action {raw:?}"))
                })?;
                actions.insert(a);
            }
            let actions: Vec<PrivilegeAction> = if actions.contains(&PrivilegeAction::All) {
                vec![PrivilegeAction::All]
            } else {
                actions.into_iter().collect()
            };

            if let PrivilegeObject::Table(t) = &object {
                referenced.insert(t.clone());
            }
            grants.push(ResolvedGrant { object, actions });
        }

        roles.push(ResolvedRole {
            name: name.to_string(),
            login: role.login,
            create_db: role.can_create_db,
            members: role.members.clone(),
            grants,
        });
    }

    let mut tables = Vec::with_capacity(policy.tables.len());
    for (key, tp) in policy.tables.iter() {
        // validated already; a failure here means the caller skipped validation
        let name = TableName::parse(key)
            .map_err(|reason| PgSecLabError::Compilation(format!("table {key}: {reason}")))?;

        let row_filter = tp.rls.enabled.then(|| {
            let author = TrustedFragment::author_supplied(&tp.rls.select_policy);
            if policy.tenants.enabled {
                Predicate::TenantScoped {
                    author,
                    column: policy.tenants.column.clone(),
                    setting: policy.tenants.setting.clone(),
                }
            } else {
                Predicate::Author(author)
            }
        });

        let masks = tp
            .masks
            .iter()
            .map(|m| MaskProjection {
                column: m.column.clone(),
                expression: TrustedFragment::author_supplied(&m.expression),
                exposed_as: m.exposed_as.clone(),
            })
            .collect();

        tables.push(ResolvedTable {
            name,
            row_filter,
            masks,
        });
    }
    tables.sort_by(|a, b| a.name.cmp(&b.name));

    for t in &tables {
        referenced.remove(&t.name);
    }

    let resolved = ResolvedPolicy {
        roles,
        tables,
        referenced,
    };
    check_view_names(&resolved)?;
    Ok(resolved)
}

fn check_view_names(r: &ResolvedPolicy) -> Result<()> {
    let mut relations: BTreeMap<TableName, &str> = BTreeMap::new();
    for t in &r.tables {
        relations.insert(t.name.clone(), "table");
    }
    for t in &r.referenced {
        relations.insert(t.clone(), "table");
    }
    for t in &r.tables {
        if let Some(view) = t.masked_view() {
            if view.len() > MAX_IDENT_LEN {
                return Err(PgSecLabError::Compilation(format!(
                    "masked view name {view} for {} exceeds {MAX_IDENT_LEN} bytes",
                    t.name
                )));
            }
            let view_name = TableName::new(t.name.schema.clone(), view);
            if relations.insert(view_name.clone(), "view").is_some() {
                return Err(PgSecLabError::Compilation(format!(
                    "masked view {view_name} for {} clashes with another relation",
                    t.name
                )));
            }
        }
    }
    Ok(())
}
