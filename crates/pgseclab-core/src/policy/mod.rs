//! Policy document loader (strict parsing + validation).
//!
//! A `Policy` returned from here has passed every invariant in
//! [`validate::validate`]; callers never see a partially valid document.

pub mod map;
pub mod model;
pub mod name;
pub mod validate;

use std::fs;
use std::path::Path;

use crate::error::{PgSecLabError, Result, ValidationError};

pub use map::PolicyMap;
pub use model::{MaskRule, Metadata, Policy, RlsConfig, Role, RolePrivilege, TablePolicy, TenantConfig};
pub use name::{PrivilegeAction, PrivilegeObject, TableName, DEFAULT_SCHEMA};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<Policy> {
    let path = path.as_ref();
    let s = fs::read_to_string(path).map_err(|e| {
        PgSecLabError::Config(format!("read policy file {} failed: {e}", path.display()))
    })?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<Policy> {
    let policy: Policy = serde_yaml::from_str(s)
        .map_err(|e| ValidationError::document("document", format!("invalid yaml: {e}")))?;
    validate::validate(&policy)?;
    tracing::debug!(
        system = %policy.metadata.system,
        roles = policy.roles.len(),
        tables = policy.tables.len(),
        "policy loaded"
    );
    Ok(policy)
}
