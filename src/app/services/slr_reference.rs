//! Sea-level-rise reference lookup
//!
//! Holds the published SLR rate for each reserve, keyed by exact reserve
//! name. A reserve without a reference is a per-reserve warning; duplicate
//! rows keep the first occurrence.

use crate::app::models::{RunWarning, SlrReference};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Read-only reference table shared by all site workers
#[derive(Debug, Clone, Default)]
pub struct SlrRegistry {
    references: HashMap<String, SlrReference>,
    duplicates: Vec<String>,
}

impl SlrRegistry {
    /// Build the registry, keeping the first row for each reserve
    pub fn new(references: Vec<SlrReference>) -> Self {
        let mut registry = Self::default();
        for reference in references {
            if registry.references.contains_key(&reference.reserve) {
                warn!(
                    "Duplicate sea-level-rise reference for reserve {}; keeping first row",
                    reference.reserve
                );
                registry.duplicates.push(reference.reserve.clone());
                continue;
            }
            registry
                .references
                .insert(reference.reserve.clone(), reference);
        }
        debug!("Loaded {} sea-level-rise references", registry.len());
        registry
    }

    /// Exact-match lookup by reserve name
    pub fn lookup(&self, reserve: &str) -> Option<&SlrReference> {
        self.references.get(reserve)
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Warnings for duplicate rows and for reserves with no reference
    pub fn warnings<'a, I>(&self, reserves: I) -> Vec<RunWarning>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut warnings: Vec<RunWarning> = self
            .duplicates
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|reserve| RunWarning::DuplicateSlrReference {
                reserve: reserve.clone(),
            })
            .collect();

        let missing: BTreeSet<&str> = reserves
            .into_iter()
            .filter(|reserve| self.lookup(reserve).is_none())
            .collect();
        for reserve in missing {
            warn!(
                "No sea-level-rise reference for reserve {}; SLR comparison skipped",
                reserve
            );
            warnings.push(RunWarning::MissingSlrReference {
                reserve: reserve.to_string(),
            });
        }
        warnings
    }
}
