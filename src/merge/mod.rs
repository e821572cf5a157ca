//! Union of per-file stores into the global registry.

mod link;

pub use link::{BaseLink, Linker, UnresolvedBase, UnresolvedReason};

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::config::DuplicatePolicy;
use crate::error::MergeError;
use crate::meta::{ClassRecord, EnumRecord, FileStore};

/// Every record of the project, keyed by qualified name.
#[derive(Debug, Clone, Default)]
pub struct GlobalRegistry {
    pub classes: BTreeMap<String, ClassRecord>,
    pub enums: BTreeMap<String, EnumRecord>,
    pub includes: BTreeSet<String>,
    /// Resolved base references per class key. Written by the linker.
    pub bases: BTreeMap<String, Vec<BaseLink>>,
    /// File each record was first merged from.
    pub origins: BTreeMap<String, String>,
}

impl GlobalRegistry {
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.enums.is_empty()
    }
}

/// Unions stores by key under a [`DuplicatePolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Merger {
    policy: DuplicatePolicy,
}

impl Merger {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self { policy }
    }

    /// Merge `stores` into a fresh registry.
    ///
    /// Stores are visited in filename order, so "first" under
    /// [`DuplicatePolicy::PreferFirst`] does not depend on input order.
    /// Identical records seen from several files collapse silently.
    pub fn merge<'a, I>(&self, stores: I) -> Result<GlobalRegistry, MergeError>
    where
        I: IntoIterator<Item = &'a FileStore>,
    {
        let mut stores: Vec<&FileStore> = stores.into_iter().collect();
        stores.sort_by(|a, b| a.filename.cmp(&b.filename));

        let mut registry = GlobalRegistry::default();
        for store in stores {
            self.merge_store(&mut registry, store)?;
        }

        debug!(
            classes = registry.classes.len(),
            enums = registry.enums.len(),
            includes = registry.includes.len(),
            "merged stores"
        );
        Ok(registry)
    }

    fn merge_store(
        &self,
        registry: &mut GlobalRegistry,
        store: &FileStore,
    ) -> Result<(), MergeError> {
        registry.includes.extend(store.includes.iter().cloned());

        for (key, record) in &store.classes {
            match registry.classes.get(key) {
                None => {
                    registry.classes.insert(key.clone(), record.clone());
                    registry.origins.insert(key.clone(), store.filename.clone());
                }
                Some(existing) if existing.same_shape(record) => {}
                Some(_) => self.conflict(registry, key, &store.filename)?,
            }
        }

        for (key, record) in &store.enums {
            match registry.enums.get(key) {
                None => {
                    registry.enums.insert(key.clone(), record.clone());
                    registry.origins.insert(key.clone(), store.filename.clone());
                }
                Some(existing) if existing == record => {}
                Some(_) => self.conflict(registry, key, &store.filename)?,
            }
        }
        Ok(())
    }

    fn conflict(
        &self,
        registry: &GlobalRegistry,
        key: &str,
        second: &str,
    ) -> Result<(), MergeError> {
        let first = registry.origins.get(key).cloned().unwrap_or_default();
        match self.policy {
            DuplicatePolicy::Error => Err(MergeError::Conflict {
                key: key.to_string(),
                first,
                second: second.to_string(),
            }),
            DuplicatePolicy::PreferFirst => {
                warn!(
                    key,
                    kept = %first,
                    dropped = %second,
                    "conflicting definitions, keeping first"
                );
                Ok(())
            }
        }
    }
}
