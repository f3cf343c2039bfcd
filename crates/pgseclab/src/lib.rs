//! Top-level facade crate for pgseclab.
//!
//! Re-exports the policy compiler and the verification harness so users can depend on a single crate.

pub mod core {
    pub use pgseclab_core::*;
}

pub mod verify {
    pub use pgseclab_verify::*;
}
