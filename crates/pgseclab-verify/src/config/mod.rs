//! Harness config loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use pgseclab_core::error::{PgSecLabError, Result};

pub use schema::{DatabaseSection, FixtureColumn, FixtureType, HarnessSection, VerifyConfig};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<VerifyConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)
        .map_err(|e| PgSecLabError::Config(format!("read config {} failed: {e}", path.display())))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<VerifyConfig> {
    let cfg: VerifyConfig = serde_yaml::from_str(s)
        .map_err(|e| PgSecLabError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
