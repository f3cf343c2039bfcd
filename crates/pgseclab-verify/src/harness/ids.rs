//! Namespace and tenant identity generation.
//!
//! Generators are explicit values handed to the harness; nothing here is
//! process-global. `RandomIds` folds a v4 UUID into 64 random bits per
//! namespace, which keeps collisions between concurrent runs out of reach
//! (and a taken name is skipped anyway). `SequentialIds` is monotonic and
//! reproducible for tests.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::config::schema::MAX_IDENT_LEN;

/// Length of every namespace suffix.
pub const SUFFIX_LEN: usize = 16;

pub trait RunIdGenerator: Send + Sync {
    /// Lowercase hex suffix of exactly [`SUFFIX_LEN`] characters.
    fn namespace_suffix(&self) -> String;
    /// Identity of one synthetic tenant.
    fn tenant_id(&self) -> Uuid;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl RunIdGenerator for RandomIds {
    fn namespace_suffix(&self) -> String {
        let (hi, lo) = Uuid::new_v4().as_u64_pair();
        format!("{:016x}", hi ^ lo)
    }

    fn tenant_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Monotonic ids: `<seed:08x><n:08x>` suffixes, `from_u64_pair(seed, n)` tenants.
#[derive(Debug)]
pub struct SequentialIds {
    seed: u64,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            next: AtomicU64::new(1),
        }
    }

    fn bump(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl RunIdGenerator for SequentialIds {
    fn namespace_suffix(&self) -> String {
        format!("{:08x}{:08x}", self.seed as u32, self.bump() as u32)
    }

    fn tenant_id(&self) -> Uuid {
        Uuid::from_u64_pair(self.seed, self.bump())
    }
}

/// `<prefix>_<suffix>`, cut to the identifier length limit.
pub fn namespace_name(prefix: &str, suffix: &str) -> String {
    let mut name = format!("{prefix}_{suffix}");
    name.truncate(MAX_IDENT_LEN);
    name
}

/// Length of every namespace drawn for `prefix`.
pub fn namespace_len(prefix: &str) -> usize {
    (prefix.len() + 1 + SUFFIX_LEN).min(MAX_IDENT_LEN)
}
