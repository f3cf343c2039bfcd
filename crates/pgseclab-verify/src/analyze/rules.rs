//! Static findings over an analysis snapshot.

use serde::Serialize;

use super::{InstanceInfo, RoleInfo, TableInfo};

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
}

pub const NO_RLS: &str = "NO_RLS";
pub const SSL_DISABLED: &str = "SSL_DISABLED";
pub const SUPERUSER_LOGIN: &str = "SUPERUSER_LOGIN";
pub const BYPASS_RLS: &str = "BYPASS_RLS";

/// Tables first, then the instance, then roles, each in input order.
pub fn evaluate(instance: &InstanceInfo, roles: &[RoleInfo], tables: &[TableInfo]) -> Vec<Finding> {
    let mut out = Vec::new();

    for t in tables.iter().filter(|t| !t.rls_enabled) {
        out.push(Finding {
            severity: Severity::Warning,
            code: NO_RLS,
            message: format!("table {}.{} has row level security disabled", t.schema, t.name),
        });
    }

    if instance
        .settings
        .get("ssl")
        .is_some_and(|v| v.eq_ignore_ascii_case("off"))
    {
        out.push(Finding {
            severity: Severity::High,
            code: SSL_DISABLED,
            message: "SSL is disabled on this instance".into(),
        });
    }

    for r in roles {
        if r.superuser && r.login {
            out.push(Finding {
                severity: Severity::Critical,
                code: SUPERUSER_LOGIN,
                message: format!("role {} is a superuser that can log in", r.name),
            });
        }
        if r.bypass_rls {
            out.push(Finding {
                severity: Severity::Warning,
                code: BYPASS_RLS,
                message: format!("role {} bypasses row level security", r.name),
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str, login: bool, superuser: bool, bypass_rls: bool) -> RoleInfo {
        RoleInfo {
            name: name.into(),
            login,
            superuser,
            bypass_rls,
            grants: Vec::new(),
        }
    }

    fn table(name: &str, rls_enabled: bool) -> TableInfo {
        TableInfo {
            schema: "public".into(),
            name: name.into(),
            rls_enabled,
        }
    }

    fn codes(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.code).collect()
    }

    #[test]
    fn clean_snapshot_has_no_findings() {
        let mut instance = InstanceInfo::default();
        instance.settings.insert("ssl".into(), "on".into());
        let f = evaluate(
            &instance,
            &[role("app", true, false, false)],
            &[table("orders", true)],
        );
        assert!(f.is_empty());
    }

    #[test]
    fn every_rule_fires_in_order() {
        let mut instance = InstanceInfo::default();
        instance.settings.insert("ssl".into(), "OFF".into());
        let f = evaluate(
            &instance,
            &[
                role("admin", true, true, true),
                role("etl", false, false, true),
            ],
            &[table("orders", false), table("users", true)],
        );
        assert_eq!(
            codes(&f),
            [NO_RLS, SSL_DISABLED, SUPERUSER_LOGIN, BYPASS_RLS, BYPASS_RLS]
        );
        assert_eq!(f[0].message, "table public.orders has row level security disabled");
        assert_eq!(f[2].severity, Severity::Critical);
    }

    #[test]
    fn superuser_without_login_is_not_flagged() {
        let f = evaluate(&InstanceInfo::default(), &[role("postgres", false, true, false)], &[]);
        assert!(f.is_empty());
    }

    #[test]
    fn missing_ssl_setting_is_not_flagged() {
        assert!(evaluate(&InstanceInfo::default(), &[], &[]).is_empty());
    }

    #[test]
    fn severities_order_and_serialize_lowercase() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Warning);
        assert_eq!(serde_json::to_string(&Severity::High).unwrap_or_default(), "\"high\"");
    }
}
