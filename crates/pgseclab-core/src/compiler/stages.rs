//! Generation stages. Each stage only references objects that earlier
//! stages (or the target database) already provide.

use std::collections::BTreeMap;

use crate::policy::{PrivilegeAction, PrivilegeObject, TableName};
use crate::sql::{QualifiedName, RoleSlot, SchemaSlot, Statement};

use super::resolve::{ResolvedGrant, ResolvedPolicy, ResolvedRole};

/// Name of the select policy attached to every RLS table.
pub const SELECT_POLICY_NAME: &str = "pgseclab_select";

/// Role definitions, lexicographic by name.
pub fn roles(r: &ResolvedPolicy) -> Vec<Statement> {
    r.roles
        .iter()
        .map(|role| Statement::EnsureRole {
            name: RoleSlot::new(role.name.clone()),
            login: role.login,
            create_db: role.create_db,
        })
        .collect()
}

/// `GRANT role TO member`, roles lexicographic, members as declared.
pub fn memberships(r: &ResolvedPolicy) -> Vec<Statement> {
    let mut out = Vec::new();
    for role in &r.roles {
        for member in &role.members {
            out.push(Statement::GrantRole {
                role: RoleSlot::new(role.name.clone()),
                member: RoleSlot::new(member.clone()),
            });
        }
    }
    out
}

/// Schema usage and table grants. SELECT on a masked table is withheld from
/// the base table; [`masking`] grants it on the view instead.
pub fn privileges(r: &ResolvedPolicy) -> Vec<Statement> {
    let mut out = Vec::new();
    for role in &r.roles {
        let mut schemas: Vec<&str> = Vec::new();
        for g in &role.grants {
            let s = g.object.schema();
            if !schemas.contains(&s) {
                schemas.push(s);
            }
        }
        for s in schemas {
            out.push(Statement::GrantSchemaUsage {
                schema: SchemaSlot::new(s),
                grantee: RoleSlot::new(role.name.clone()),
            });
        }

        for g in &role.grants {
            grant_statements(r, role, g, &mut out);
        }
    }
    out
}

fn grant_statements(r: &ResolvedPolicy, role: &ResolvedRole, g: &ResolvedGrant, out: &mut Vec<Statement>) {
    match &g.object {
        PrivilegeObject::Table(t) => {
            let table = qualified(t);
            let masked = r.table(t).is_some_and(|rt| !rt.masks.is_empty());
            if masked && g.includes_select() {
                let rest = without_select(&g.actions);
                if !rest.is_empty() {
                    out.push(Statement::GrantTable {
                        actions: rest,
                        table: table.clone(),
                        grantee: RoleSlot::new(role.name.clone()),
                    });
                }
                out.push(Statement::RevokeTable {
                    actions: vec![PrivilegeAction::Select],
                    table,
                    grantee: RoleSlot::new(role.name.clone()),
                });
            } else {
                out.push(Statement::GrantTable {
                    actions: g.actions.clone(),
                    table,
                    grantee: RoleSlot::new(role.name.clone()),
                });
            }
        }
        PrivilegeObject::AllTablesIn(schema) => {
            out.push(Statement::GrantAllTablesIn {
                actions: g.actions.clone(),
                schema: SchemaSlot::new(schema.clone()),
                grantee: RoleSlot::new(role.name.clone()),
            });
            if g.includes_select() {
                for mt in r.masked_tables_in(schema) {
                    out.push(Statement::RevokeTable {
                        actions: vec![PrivilegeAction::Select],
                        table: qualified(&mt.name),
                        grantee: RoleSlot::new(role.name.clone()),
                    });
                }
            }
        }
    }
}

fn without_select(actions: &[PrivilegeAction]) -> Vec<PrivilegeAction> {
    if actions.contains(&PrivilegeAction::All) {
        return PrivilegeAction::CONCRETE
            .iter()
            .copied()
            .filter(|a| *a != PrivilegeAction::Select)
            .collect();
    }
    actions
        .iter()
        .copied()
        .filter(|a| *a != PrivilegeAction::Select)
        .collect()
}

/// Enable RLS, then (re)create the select policy, per RLS table.
///
/// Only a `FOR SELECT` policy is attached. With row security on and no
/// policy for the command, PostgreSQL denies INSERT, UPDATE and DELETE to
/// every non-owner role, even one granted those privileges.
pub fn row_security(r: &ResolvedPolicy) -> Vec<Statement> {
    let mut out = Vec::new();
    for t in &r.tables {
        let Some(predicate) = &t.row_filter else { continue };
        let table = qualified(&t.name);
        out.push(Statement::EnableRowSecurity {
            table: table.clone(),
        });
        out.push(Statement::DropPolicy {
            name: SELECT_POLICY_NAME.into(),
            table: table.clone(),
        });
        out.push(Statement::CreateSelectPolicy {
            name: SELECT_POLICY_NAME.into(),
            table,
            using: predicate.clone(),
        });
    }
    out
}

/// Drop-then-create the masked view per masked table and hand SELECT on it
/// to every role that asked for SELECT on the base table.
pub fn masking(r: &ResolvedPolicy) -> Vec<Statement> {
    let readers = view_readers(r);
    let mut out = Vec::new();
    for t in &r.tables {
        let Some(view_name) = t.masked_view() else { continue };
        let view = QualifiedName::new(t.name.schema.clone(), view_name);
        out.push(Statement::DropView { view: view.clone() });
        out.push(Statement::CreateMaskedView {
            view: view.clone(),
            table: qualified(&t.name),
            masks: t.masks.clone(),
            filter: t.row_filter.clone(),
        });
        for role in readers.get(&t.name).into_iter().flatten() {
            out.push(Statement::GrantTable {
                actions: vec![PrivilegeAction::Select],
                table: view.clone(),
                grantee: RoleSlot::new(*role),
            });
        }
    }
    out
}

fn view_readers(r: &ResolvedPolicy) -> BTreeMap<TableName, Vec<&str>> {
    let mut readers: BTreeMap<TableName, Vec<&str>> = BTreeMap::new();
    for role in &r.roles {
        for g in role.grants.iter().filter(|g| g.includes_select()) {
            let targets: Vec<&TableName> = match &g.object {
                PrivilegeObject::Table(t) => vec![t],
                PrivilegeObject::AllTablesIn(s) => r.masked_tables_in(s).map(|t| &t.name).collect(),
            };
            for t in targets {
                let entry = readers.entry(t.clone()).or_default();
                if !entry.contains(&role.name.as_str()) {
                    entry.push(role.name.as_str());
                }
            }
        }
    }
    readers
}

fn qualified(t: &TableName) -> QualifiedName {
    QualifiedName::new(t.schema.clone(), t.name.clone())
}
