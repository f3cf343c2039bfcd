//! Qualified names and privilege targets parsed out of policy strings.

use std::fmt;

use crate::sql::MAX_IDENT_LEN;

/// Schema used when a table key carries no schema part.
pub const DEFAULT_SCHEMA: &str = "public";

/// `schema.table`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parse `schema.table` or `table`. Returns a reason on failure.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let (schema, name) = match raw.split_once('.') {
            Some((s, n)) => (s, n),
            None => (DEFAULT_SCHEMA, raw),
        };
        if name.contains('.') {
            return Err(format!("expected schema.table, got {raw:?}"));
        }
        check_part(schema, "schema")?;
        check_part(name, "table")?;
        Ok(Self::new(schema, name))
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

fn check_part(part: &str, what: &str) -> std::result::Result<(), String> {
    if part.is_empty() {
        return Err(format!("{what} name is empty"));
    }
    if part.contains('\0') {
        return Err(format!("{what} name contains a NUL byte"));
    }
    if part.len() > MAX_IDENT_LEN {
        return Err(format!("{what} name {part:?} exceeds {MAX_IDENT_LEN} bytes"));
    }
    Ok(())
}

/// Target of a role privilege.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivilegeObject {
    Table(TableName),
    /// `schema.*`
    AllTablesIn(String),
}

impl PrivilegeObject {
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        if let Some(schema) = raw.strip_suffix(".*") {
            check_part(schema, "schema")?;
            if schema.contains('.') {
                return Err(format!("expected schema.*, got {raw:?}"));
            }
            return Ok(PrivilegeObject::AllTablesIn(schema.to_string()));
        }
        TableName::parse(raw).map(PrivilegeObject::Table)
    }

    pub fn schema(&self) -> &str {
        match self {
            PrivilegeObject::Table(t) => &t.schema,
            PrivilegeObject::AllTablesIn(s) => s,
        }
    }
}

/// Table privilege keyword. Closed set so it never needs quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrivilegeAction {
    Select,
    Insert,
    Update,
    Delete,
    Truncate,
    References,
    Trigger,
    All,
}

impl PrivilegeAction {
    pub fn parse(raw: &str) -> Option<Self> {
        let a = match raw.trim().to_ascii_uppercase().as_str() {
            "SELECT" => PrivilegeAction::Select,
            "INSERT" => PrivilegeAction::Insert,
            "UPDATE" => PrivilegeAction::Update,
            "DELETE" => PrivilegeAction::Delete,
            "TRUNCATE" => PrivilegeAction::Truncate,
            "REFERENCES" => PrivilegeAction::References,
            "TRIGGER" => PrivilegeAction::Trigger,
            "ALL" | "ALL PRIVILEGES" => PrivilegeAction::All,
            _ => return None,
        };
        Some(a)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            PrivilegeAction::Select => "SELECT",
            PrivilegeAction::Insert => "INSERT",
            PrivilegeAction::Update => "UPDATE",
            PrivilegeAction::Delete => "DELETE",
            PrivilegeAction::Truncate => "TRUNCATE",
            PrivilegeAction::References => "REFERENCES",
            PrivilegeAction::Trigger => "TRIGGER",
            PrivilegeAction::All => "ALL",
        }
    }

    /// Every concrete action `ALL` expands to.
    pub const CONCRETE: [PrivilegeAction; 7] = [
        PrivilegeAction::Select,
        PrivilegeAction::Insert,
        PrivilegeAction::Update,
        PrivilegeAction::Delete,
        PrivilegeAction::Truncate,
        PrivilegeAction::References,
        PrivilegeAction::Trigger,
    ];
}
