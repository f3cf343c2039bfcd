//! Statement model.
//!
//! Statements keep identifiers, schema and role references, and
//! author-supplied SQL fragments apart until [`Statement::render`]. Schema
//! and role references are slots: the render target decides whether a slot
//! becomes the declared name or a run-scoped one, so retargeting never
//! touches rendered text.

use std::borrow::Cow;
use std::fmt::Write;

use crate::policy::PrivilegeAction;

use super::ident::{dollar_quote, quote_ident, quote_literal};

/// Where schema and role slots point when rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderTarget {
    /// Each object renders in its declared schema; roles keep their names.
    Declared,
    /// Every schema slot renders as this schema; roles keep their names.
    Schema(String),
    /// Throwaway verification namespace. Schema slots render as the
    /// namespace and every role as [`scoped_role_name`], so nothing outside
    /// the run is touched.
    Namespace(String),
}

/// Run-scoped name of a declared role: `<namespace>_<role>`.
pub fn scoped_role_name(namespace: &str, role: &str) -> String {
    format!("{namespace}_{role}")
}

/// Schema reference resolved at render time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSlot {
    declared: String,
}

impl SchemaSlot {
    pub fn new(declared: impl Into<String>) -> Self {
        Self {
            declared: declared.into(),
        }
    }

    pub fn declared(&self) -> &str {
        &self.declared
    }

    pub fn resolve<'a>(&'a self, target: &'a RenderTarget) -> &'a str {
        match target {
            RenderTarget::Declared => &self.declared,
            RenderTarget::Schema(s) | RenderTarget::Namespace(s) => s,
        }
    }

    pub fn render(&self, target: &RenderTarget) -> String {
        quote_ident(self.resolve(target))
    }
}

/// Role reference resolved at render time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSlot {
    declared: String,
}

impl RoleSlot {
    pub fn new(declared: impl Into<String>) -> Self {
        Self {
            declared: declared.into(),
        }
    }

    pub fn declared(&self) -> &str {
        &self.declared
    }

    pub fn resolve(&self, target: &RenderTarget) -> Cow<'_, str> {
        match target {
            RenderTarget::Namespace(ns) => Cow::Owned(scoped_role_name(ns, &self.declared)),
            RenderTarget::Declared | RenderTarget::Schema(_) => Cow::Borrowed(&self.declared),
        }
    }

    pub fn render(&self, target: &RenderTarget) -> String {
        quote_ident(&self.resolve(target))
    }
}

/// `schema.name` with the schema part held as a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub schema: SchemaSlot,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: SchemaSlot::new(schema),
            name: name.into(),
        }
    }

    pub fn render(&self, target: &RenderTarget) -> String {
        format!("{}.{}", self.schema.render(target), quote_ident(&self.name))
    }
}

/// Author-supplied SQL (a predicate or a masking expression).
///
/// TRUST BOUNDARY: the text is emitted verbatim. It is never parsed, quoted,
/// or checked; policy authors are trusted to supply a well-formed fragment
/// and a malformed one only surfaces when the statement is applied. Nothing
/// other than `rls.select_policy` and `masks[].expression` may be wrapped in
/// this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedFragment(String);

impl TrustedFragment {
    pub fn author_supplied(sql: &str) -> Self {
        Self(sql.trim().to_string())
    }

    pub fn as_sql(&self) -> &str {
        &self.0
    }
}

/// Row visibility predicate for a select policy.
///
/// The tenant check reads the session setting with `missing_ok`; an unset
/// or reset (empty) setting compares as NULL, so no rows match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Author predicate only.
    Author(TrustedFragment),
    /// Author predicate AND the session tenant check. Both must hold.
    TenantScoped {
        author: TrustedFragment,
        column: String,
        setting: String,
    },
}

impl Predicate {
    pub fn render(&self) -> String {
        match self {
            Predicate::Author(f) => format!("({})", f.as_sql()),
            Predicate::TenantScoped {
                author,
                column,
                setting,
            } => format!(
                "({}) AND ({} = nullif(current_setting({}, true), '')::uuid)",
                author.as_sql(),
                quote_ident(column),
                quote_literal(setting)
            ),
        }
    }
}

/// One masked column in a masked view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskProjection {
    pub column: String,
    pub expression: TrustedFragment,
    pub exposed_as: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Create the role if absent, then align its attributes.
    EnsureRole {
        name: RoleSlot,
        login: bool,
        create_db: bool,
    },
    GrantRole {
        role: RoleSlot,
        member: RoleSlot,
    },
    GrantSchemaUsage {
        schema: SchemaSlot,
        grantee: RoleSlot,
    },
    GrantTable {
        actions: Vec<PrivilegeAction>,
        table: QualifiedName,
        grantee: RoleSlot,
    },
    GrantAllTablesIn {
        actions: Vec<PrivilegeAction>,
        schema: SchemaSlot,
        grantee: RoleSlot,
    },
    RevokeTable {
        actions: Vec<PrivilegeAction>,
        table: QualifiedName,
        grantee: RoleSlot,
    },
    EnableRowSecurity {
        table: QualifiedName,
    },
    DropPolicy {
        name: String,
        table: QualifiedName,
    },
    CreateSelectPolicy {
        name: String,
        table: QualifiedName,
        using: Predicate,
    },
    DropView {
        view: QualifiedName,
    },
    /// View exposing every column of `table` except the masked ones, plus
    /// one projection per mask. Column discovery happens at apply time.
    CreateMaskedView {
        view: QualifiedName,
        table: QualifiedName,
        masks: Vec<MaskProjection>,
        filter: Option<Predicate>,
    },
}

impl Statement {
    /// Render as one terminated SQL statement.
    pub fn render(&self, target: &RenderTarget) -> String {
        match self {
            Statement::EnsureRole {
                name,
                login,
                create_db,
            } => {
                let name = name.resolve(target);
                let body = format!(
                    "BEGIN\n    IF NOT EXISTS (SELECT 1 FROM pg_catalog.pg_roles WHERE rolname = {lit}) THEN\n        CREATE ROLE {id};\n    END IF;\n    ALTER ROLE {id} WITH {login} {create_db};\nEND",
                    lit = quote_literal(&name),
                    id = quote_ident(&name),
                    login = if *login { "LOGIN" } else { "NOLOGIN" },
                    create_db = if *create_db { "CREATEDB" } else { "NOCREATEDB" },
                );
                format!("DO {};", dollar_quote(&body))
            }
            Statement::GrantRole { role, member } => {
                format!("GRANT {} TO {};", role.render(target), member.render(target))
            }
            Statement::GrantSchemaUsage { schema, grantee } => format!(
                "GRANT USAGE ON SCHEMA {} TO {};",
                schema.render(target),
                grantee.render(target)
            ),
            Statement::GrantTable {
                actions,
                table,
                grantee,
            } => format!(
                "GRANT {} ON TABLE {} TO {};",
                action_list(actions),
                table.render(target),
                grantee.render(target)
            ),
            Statement::GrantAllTablesIn {
                actions,
                schema,
                grantee,
            } => format!(
                "GRANT {} ON ALL TABLES IN SCHEMA {} TO {};",
                action_list(actions),
                schema.render(target),
                grantee.render(target)
            ),
            Statement::RevokeTable {
                actions,
                table,
                grantee,
            } => format!(
                "REVOKE {} ON TABLE {} FROM {};",
                action_list(actions),
                table.render(target),
                grantee.render(target)
            ),
            Statement::EnableRowSecurity { table } => format!(
                "ALTER TABLE {} ENABLE ROW LEVEL SECURITY;",
                table.render(target)
            ),
            Statement::DropPolicy { name, table } => format!(
                "DROP POLICY IF EXISTS {} ON {};",
                quote_ident(name),
                table.render(target)
            ),
            Statement::CreateSelectPolicy { name, table, using } => format!(
                "CREATE POLICY {} ON {} AS PERMISSIVE FOR SELECT USING ({});",
                quote_ident(name),
                table.render(target),
                using.render()
            ),
            Statement::DropView { view } => {
                format!("DROP VIEW IF EXISTS {};", view.render(target))
            }
            Statement::CreateMaskedView {
                view,
                table,
                masks,
                filter,
            } => render_masked_view(view, table, masks, filter.as_ref(), target),
        }
    }
}

fn action_list(actions: &[PrivilegeAction]) -> String {
    if actions.contains(&PrivilegeAction::All) {
        return "ALL PRIVILEGES".into();
    }
    actions
        .iter()
        .map(|a| a.keyword())
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_masked_view(
    view: &QualifiedName,
    table: &QualifiedName,
    masks: &[MaskProjection],
    filter: Option<&Predicate>,
    target: &RenderTarget,
) -> String {
    let table_sql = table.render(target);

    let hidden = masks
        .iter()
        .map(|m| quote_literal(&m.column))
        .collect::<Vec<_>>()
        .join(", ");

    let head = format!(
        "CREATE VIEW {} WITH (security_barrier) AS SELECT ",
        view.render(target)
    );

    let mut tail = masks
        .iter()
        .map(|m| format!("({}) AS {}", m.expression.as_sql(), quote_ident(&m.exposed_as)))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = write!(tail, " FROM {table_sql}");
    if let Some(p) = filter {
        let _ = write!(tail, " WHERE {}", p.render());
    }

    let body = format!(
        "DECLARE\n    visible text;\nBEGIN\n    SELECT string_agg(quote_ident(attname), ', ' ORDER BY attnum)\n      INTO visible\n      FROM pg_catalog.pg_attribute\n     WHERE attrelid = {regclass}::regclass\n       AND attnum > 0\n       AND NOT attisdropped\n       AND attname <> ALL (ARRAY[{hidden}]::name[]);\n    EXECUTE {head}\n        || coalesce(visible || ', ', '')\n        || {tail};\nEND",
        regclass = quote_literal(&table_sql),
        head = quote_literal(&head),
        tail = quote_literal(&tail),
    );
    format!("DO {};", dollar_quote(&body))
}
