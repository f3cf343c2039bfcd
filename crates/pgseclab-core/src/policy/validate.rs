//! Policy invariants, checked in document order. First violation wins.

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::sql::MAX_IDENT_LEN;

use super::model::Policy;
use super::name::TableName;

pub fn validate(p: &Policy) -> std::result::Result<(), ValidationError> {
    if p.tenants.enabled {
        if p.tenants.setting.trim().is_empty() {
            return Err(ValidationError::document(
                "tenants.setting",
                "tenants enabled but setting is empty",
            ));
        }
        if p.tenants.column.is_empty() {
            return Err(ValidationError::document(
                "tenants.column",
                "tenants enabled but column is empty",
            ));
        }
        if p.tenants.column.len() > MAX_IDENT_LEN {
            return Err(ValidationError::document(
                "tenants.column",
                format!("column name exceeds {MAX_IDENT_LEN} bytes"),
            ));
        }
    }

    for (name, _) in p.roles.iter() {
        if name.is_empty() || name.contains('\0') {
            return Err(ValidationError::document(
                "roles",
                format!("invalid role name {name:?}"),
            ));
        }
        if name.len() > MAX_IDENT_LEN {
            return Err(ValidationError::document(
                "roles",
                format!("role name {name:?} exceeds {MAX_IDENT_LEN} bytes"),
            ));
        }
    }

    let mut seen = HashSet::new();
    for (key, tp) in p.tables.iter() {
        let qualified = TableName::parse(key)
            .map_err(|reason| ValidationError::table(key, "name", reason))?;
        if !seen.insert(qualified.clone()) {
            return Err(ValidationError::table(
                key,
                "name",
                format!("{qualified} is declared more than once"),
            ));
        }

        if tp.rls.enabled && tp.rls.select_policy.trim().is_empty() {
            return Err(ValidationError::table(
                key,
                "rls.select_policy",
                "RLS enabled but select_policy is empty",
            ));
        }

        let mut exposed = HashSet::new();
        for (i, mask) in tp.masks.iter().enumerate() {
            if mask.column.is_empty() {
                return Err(ValidationError::table(
                    key,
                    format!("masks[{i}].column"),
                    "mask has empty column",
                ));
            }
            if mask.expression.trim().is_empty() {
                return Err(ValidationError::table(
                    key,
                    format!("masks[{i}].expression"),
                    format!("mask for column {} has empty expression", mask.column),
                ));
            }
            if mask.exposed_as.is_empty() {
                return Err(ValidationError::table(
                    key,
                    format!("masks[{i}].exposed_as"),
                    format!("mask for column {} has empty exposed_as", mask.column),
                ));
            }
            if mask.column.contains('\0') || mask.exposed_as.contains('\0') {
                return Err(ValidationError::table(
                    key,
                    format!("masks[{i}]"),
                    "column names must not contain NUL bytes",
                ));
            }
            if mask.column.len() > MAX_IDENT_LEN || mask.exposed_as.len() > MAX_IDENT_LEN {
                return Err(ValidationError::table(
                    key,
                    format!("masks[{i}]"),
                    format!("column names must not exceed {MAX_IDENT_LEN} bytes"),
                ));
            }
            if !exposed.insert(mask.exposed_as.as_str()) {
                return Err(ValidationError::table(
                    key,
                    format!("masks[{i}].exposed_as"),
                    format!("exposed_as {} is used twice", mask.exposed_as),
                ));
            }
        }
    }

    Ok(())
}
