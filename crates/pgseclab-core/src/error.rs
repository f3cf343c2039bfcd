//! Shared error type across pgseclab crates.

use std::fmt;

use thiserror::Error;

/// Stable error classes (used for exit codes and machine-readable output).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed policy document.
    Validation,
    /// Policy references something that cannot be resolved.
    Compilation,
    /// Database unreachable.
    Connection,
    /// A compiled statement failed to execute.
    Apply,
    /// Catalog state does not match the declared policy.
    Assertion,
    /// Harness/CLI configuration is invalid.
    Config,
    /// Run cancelled or timed out.
    Cancelled,
    /// Namespace could not be dropped after an otherwise successful run.
    Teardown,
    /// Internal error.
    Internal,
}

impl ErrorKind {
    /// String representation used in JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Compilation => "COMPILATION",
            ErrorKind::Connection => "CONNECTION",
            ErrorKind::Apply => "APPLY",
            ErrorKind::Assertion => "ASSERTION",
            ErrorKind::Config => "CONFIG",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Teardown => "TEARDOWN",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Internal => 1,
            ErrorKind::Validation => 2,
            ErrorKind::Compilation => 3,
            ErrorKind::Connection => 4,
            ErrorKind::Apply => 5,
            ErrorKind::Assertion => 6,
            ErrorKind::Config => 7,
            ErrorKind::Cancelled => 8,
            ErrorKind::Teardown => 9,
        }
    }
}

/// Catalog invariant checked by the verification harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invariant {
    /// The table is not present in the namespace at all.
    TablePresent,
    /// `relrowsecurity` is false.
    RowSecurityEnabled,
    /// No policy is attached to the table.
    PolicyAttached,
    /// The masked projection view is absent.
    MaskedViewPresent,
}

impl Invariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Invariant::TablePresent => "table_present",
            Invariant::RowSecurityEnabled => "row_security_enabled",
            Invariant::PolicyAttached => "policy_attached",
            Invariant::MaskedViewPresent => "masked_view_present",
        }
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy validation failure, naming the table (if any) and field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub table: Option<String>,
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn table(table: &str, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            table: Some(table.to_string()),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn document(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            table: None,
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(t) => write!(f, "table {t}: {}: {}", self.field, self.reason),
            None => write!(f, "{}: {}", self.field, self.reason),
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PgSecLabError>;

/// Unified error type used by core and verify.
#[derive(Debug, Error)]
pub enum PgSecLabError {
    #[error("validation failed: {0}")]
    Validation(ValidationError),
    #[error("compilation failed: {0}")]
    Compilation(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("apply failed at statement {index} ({stage}): {reason}")]
    Apply {
        index: usize,
        stage: &'static str,
        reason: String,
    },
    #[error("assertion failed on {table}: {invariant}")]
    Assertion { table: String, invariant: Invariant },
    #[error("invalid config: {0}")]
    Config(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("teardown of namespace {namespace} failed: {reason}")]
    Teardown { namespace: String, reason: String },
    #[error("internal: {0}")]
    Internal(String),
}

impl PgSecLabError {
    /// Map to a stable error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PgSecLabError::Validation(_) => ErrorKind::Validation,
            PgSecLabError::Compilation(_) => ErrorKind::Compilation,
            PgSecLabError::Connection(_) => ErrorKind::Connection,
            PgSecLabError::Apply { .. } => ErrorKind::Apply,
            PgSecLabError::Assertion { .. } => ErrorKind::Assertion,
            PgSecLabError::Config(_) => ErrorKind::Config,
            PgSecLabError::Cancelled(_) => ErrorKind::Cancelled,
            PgSecLabError::Teardown { .. } => ErrorKind::Teardown,
            PgSecLabError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True for errors that are raised before any database I/O.
    pub fn is_side_effect_free(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::Compilation | ErrorKind::Config
        )
    }
}

impl From<ValidationError> for PgSecLabError {
    fn from(e: ValidationError) -> Self {
        PgSecLabError::Validation(e)
    }
}
