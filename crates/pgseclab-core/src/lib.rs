//! pgseclab core: policy model, SQL statement model, compiler, and error types.
//!
//! This crate turns a declarative access-control policy into an ordered,
//! idempotent sequence of PostgreSQL DDL statements. It carries no runtime or
//! database dependencies so the compiler stays a pure function that can be
//! diffed, tested, and reused by the verification harness.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Every fallible path surfaces as `PgSecLabError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod compiler;
pub mod error;
pub mod policy;
pub mod sql;

/// Shared result type.
pub use error::{Result, PgSecLabError};

pub use compiler::{compile, CompiledPolicy, Stage};
pub use policy::Policy;
pub use sql::RenderTarget;
