//! Grouping of readings into sites and the metadata join

use crate::app::models::{Measurement, RunWarning, Site, SiteKey, SiteMetadata};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Sites built from the measurement table plus any join warnings
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    pub sites: Vec<Site>,
    pub warnings: Vec<RunWarning>,
}

impl SiteRegistry {
    /// Group readings by (reserve, set_id) and attach metadata by `unique_set_id`
    ///
    /// `metadata` is `None` when no metadata table was supplied; the ID
    /// comparison only runs when one was.
    pub fn build(measurements: Vec<Measurement>, metadata: Option<Vec<SiteMetadata>>) -> Self {
        let mut grouped: BTreeMap<SiteKey, Vec<Measurement>> = BTreeMap::new();
        for m in measurements {
            grouped.entry(m.site_key()).or_default().push(m);
        }

        let mut by_id: HashMap<String, SiteMetadata> = HashMap::new();
        for row in metadata.iter().flatten() {
            by_id
                .entry(row.unique_set_id.clone())
                .or_insert_with(|| row.clone());
        }

        let mut warnings = Vec::new();
        if metadata.is_some() {
            let data_ids: BTreeSet<&str> = grouped.keys().map(|k| k.set_id.as_str()).collect();
            let meta_ids: BTreeSet<&str> = by_id.keys().map(String::as_str).collect();
            let in_data_only: Vec<String> =
                data_ids.difference(&meta_ids).map(|s| s.to_string()).collect();
            let in_metadata_only: Vec<String> =
                meta_ids.difference(&data_ids).map(|s| s.to_string()).collect();
            if !in_data_only.is_empty() || !in_metadata_only.is_empty() {
                warn!(
                    "Site IDs differ between data and metadata: {} only in data, {} only in metadata",
                    in_data_only.len(),
                    in_metadata_only.len()
                );
                warnings.push(RunWarning::SiteIdMismatch {
                    in_data_only,
                    in_metadata_only,
                });
            }
        }

        let sites: Vec<Site> = grouped
            .into_iter()
            .map(|(key, measurements)| {
                let metadata = by_id.get(&key.set_id).cloned();
                Site {
                    key,
                    measurements,
                    metadata,
                }
            })
            .collect();

        debug!("Grouped readings into {} sites", sites.len());
        Self { sites, warnings }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
