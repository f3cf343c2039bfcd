use serde::Deserialize;

use super::map::PolicyMap;

/// Root policy document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub tenants: TenantConfig,

    /// role name -> role
    #[serde(default)]
    pub roles: PolicyMap<Role>,

    /// qualified table name (`schema.table` or `table`) -> table policy
    #[serde(default)]
    pub tables: PolicyMap<TablePolicy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub version: String,
}

/// Tenant binding: the session setting that carries the current tenant id.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub setting: String,

    /// Column compared against the setting (values are UUIDs).
    #[serde(default = "default_tenant_column")]
    pub column: String,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            setting: String::new(),
            column: default_tenant_column(),
        }
    }
}

fn default_tenant_column() -> String {
    "tenant_id".into()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Role {
    #[serde(default)]
    pub login: bool,

    #[serde(default)]
    pub can_create_db: bool,

    /// Roles that are granted membership in this role.
    #[serde(default)]
    pub members: Vec<String>,

    #[serde(default)]
    pub privileges: Vec<RolePrivilege>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolePrivilege {
    /// `schema.table`, `table`, or `schema.*`.
    pub object: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TablePolicy {
    #[serde(default)]
    pub rls: RlsConfig,

    #[serde(default)]
    pub masks: Vec<MaskRule>,
}

impl TablePolicy {
    pub fn has_masks(&self) -> bool {
        !self.masks.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RlsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// SQL boolean predicate, inserted verbatim.
    #[serde(default)]
    pub select_policy: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaskRule {
    #[serde(default)]
    pub column: String,

    /// SQL expression, inserted verbatim.
    #[serde(default)]
    pub expression: String,

    #[serde(default)]
    pub exposed_as: String,
}
