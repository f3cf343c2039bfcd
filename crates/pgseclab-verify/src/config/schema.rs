use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use pgseclab_core::error::{PgSecLabError, Result};

pub use pgseclab_core::sql::MAX_IDENT_LEN;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyConfig {
    pub version: u32,

    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub verify: HarnessSection,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            version: 1,
            database: DatabaseSection::default(),
            verify: HarnessSection::default(),
        }
    }
}

impl VerifyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PgSecLabError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.database.validate()?;
        self.verify.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSection {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            statement_timeout_ms: default_statement_timeout_ms(),
        }
    }
}

impl DatabaseSection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=120_000).contains(&self.connect_timeout_ms) {
            return Err(PgSecLabError::Config(
                "database.connect_timeout_ms must be between 100 and 120000".into(),
            ));
        }
        if !(100..=3_600_000).contains(&self.statement_timeout_ms) {
            return Err(PgSecLabError::Config(
                "database.statement_timeout_ms must be between 100 and 3600000".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_statement_timeout_ms() -> u64 {
    30000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessSection {
    /// Namespace names are `<prefix>_<suffix>`.
    #[serde(default = "default_namespace_prefix")]
    pub namespace_prefix: String,

    /// Synthetic tenant identities seeded per run.
    #[serde(default = "default_tenants")]
    pub tenants: usize,

    #[serde(default = "default_rows_per_tenant")]
    pub rows_per_tenant: usize,

    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,

    #[serde(default = "default_teardown_timeout_ms")]
    pub teardown_timeout_ms: u64,

    /// Fresh names drawn before giving up on a free namespace.
    #[serde(default = "default_namespace_attempts")]
    pub namespace_attempts: u32,

    /// Apply the compiled statements a second time and require success.
    #[serde(default = "default_true")]
    pub reapply: bool,

    /// Extra fixture columns per qualified table, for predicates that
    /// reference columns beyond id/tenant/masked ones.
    #[serde(default)]
    pub fixture_columns: BTreeMap<String, Vec<FixtureColumn>>,
}

impl Default for HarnessSection {
    fn default() -> Self {
        Self {
            namespace_prefix: default_namespace_prefix(),
            tenants: default_tenants(),
            rows_per_tenant: default_rows_per_tenant(),
            run_timeout_ms: default_run_timeout_ms(),
            teardown_timeout_ms: default_teardown_timeout_ms(),
            namespace_attempts: default_namespace_attempts(),
            reapply: true,
            fixture_columns: BTreeMap::new(),
        }
    }
}

impl HarnessSection {
    pub fn validate(&self) -> Result<()> {
        let p = &self.namespace_prefix;
        if p.is_empty() || p.len() > 30 {
            return Err(PgSecLabError::Config(
                "verify.namespace_prefix must be 1..=30 characters".into(),
            ));
        }
        if !p.starts_with(|c: char| c.is_ascii_lowercase())
            || !p
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(PgSecLabError::Config(
                "verify.namespace_prefix must match [a-z][a-z0-9_]*".into(),
            ));
        }
        if !(2..=16).contains(&self.tenants) {
            return Err(PgSecLabError::Config(
                "verify.tenants must be between 2 and 16".into(),
            ));
        }
        if !(1..=1000).contains(&self.rows_per_tenant) {
            return Err(PgSecLabError::Config(
                "verify.rows_per_tenant must be between 1 and 1000".into(),
            ));
        }
        if !(1000..=3_600_000).contains(&self.run_timeout_ms) {
            return Err(PgSecLabError::Config(
                "verify.run_timeout_ms must be between 1000 and 3600000".into(),
            ));
        }
        if !(100..=600_000).contains(&self.teardown_timeout_ms) {
            return Err(PgSecLabError::Config(
                "verify.teardown_timeout_ms must be between 100 and 600000".into(),
            ));
        }
        if !(1..=10).contains(&self.namespace_attempts) {
            return Err(PgSecLabError::Config(
                "verify.namespace_attempts must be between 1 and 10".into(),
            ));
        }
        for (table, cols) in &self.fixture_columns {
            for c in cols {
                if c.name.is_empty() {
                    return Err(PgSecLabError::Config(format!(
                        "verify.fixture_columns.{table}: name must not be empty"
                    )));
                }
                if c.name.len() > MAX_IDENT_LEN || c.name.contains('\0') {
                    return Err(PgSecLabError::Config(format!(
                        "verify.fixture_columns.{table}: invalid column name {:?}",
                        c.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }
}

fn default_namespace_prefix() -> String {
    "pgseclab_verify".into()
}
fn default_tenants() -> usize {
    2
}
fn default_rows_per_tenant() -> usize {
    3
}
fn default_run_timeout_ms() -> u64 {
    120000
}
fn default_teardown_timeout_ms() -> u64 {
    10000
}
fn default_namespace_attempts() -> u32 {
    3
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: FixtureType,
}

/// Column types a fixture column may take. Values are left NULL, so only
/// the type matters for predicates that reference the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureType {
    Text,
    Uuid,
    #[serde(alias = "int", alias = "int4")]
    Integer,
    #[serde(alias = "int8")]
    Bigint,
    Numeric,
    #[serde(alias = "bool")]
    Boolean,
    Date,
    #[serde(alias = "timestamp with time zone")]
    Timestamptz,
    Jsonb,
}

impl FixtureType {
    pub fn as_sql(self) -> &'static str {
        match self {
            FixtureType::Text => "text",
            FixtureType::Uuid => "uuid",
            FixtureType::Integer => "integer",
            FixtureType::Bigint => "bigint",
            FixtureType::Numeric => "numeric",
            FixtureType::Boolean => "boolean",
            FixtureType::Date => "date",
            FixtureType::Timestamptz => "timestamptz",
            FixtureType::Jsonb => "jsonb",
        }
    }
}
