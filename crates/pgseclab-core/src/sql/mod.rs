//! SQL rendering primitives.
//!
//! - `ident`: identifier/literal/dollar quoting.
//! - `statement`: typed DDL statements rendered against a schema/role target.

pub mod ident;
pub mod statement;

pub use ident::{dollar_quote, quote_ident, quote_literal, MAX_IDENT_LEN};
pub use statement::{
    scoped_role_name, MaskProjection, Predicate, QualifiedName, RenderTarget, RoleSlot, SchemaSlot,
    Statement, TrustedFragment,
};
