//! Input table discovery
//!
//! Resolves the measurement, metadata and sea-level-rise tables from
//! explicit paths or, failing that, by glob pattern inside an input
//! directory. Several matches for one table pick the first alphabetically
//! and raise a warning.

use crate::app::models::RunWarning;
use crate::app::pipeline::InputPaths;
use crate::config::InputConfig;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Locate every input table named or implied by `config`
///
/// A missing measurement table is fatal; missing metadata or SLR tables are
/// left as `None` for the loader to report.
pub fn discover_inputs(config: &InputConfig) -> Result<(InputPaths, Vec<RunWarning>)> {
    let mut warnings = Vec::new();

    let data = resolve_table(
        "data",
        config.data_file.as_deref(),
        config.directory.as_deref(),
        &config.data_pattern,
        &mut warnings,
    )?
    .ok_or_else(|| match &config.directory {
        Some(dir) => Error::input_shape(format!(
            "no measurement table matching '{}' in {}",
            config.data_pattern,
            dir.display()
        )),
        None => Error::input_shape("no measurement table given; use --data or --input"),
    })?;

    let metadata = resolve_table(
        "metadata",
        config.metadata_file.as_deref(),
        config.directory.as_deref(),
        &config.metadata_pattern,
        &mut warnings,
    )?;
    let slr = resolve_table(
        "SLR",
        config.slr_file.as_deref(),
        config.directory.as_deref(),
        &config.slr_pattern,
        &mut warnings,
    )?;

    info!("Measurement table: {}", data.display());
    Ok((
        InputPaths {
            data,
            metadata,
            slr,
        },
        warnings,
    ))
}

fn resolve_table(
    table: &str,
    explicit: Option<&Path>,
    directory: Option<&Path>,
    pattern: &str,
    warnings: &mut Vec<RunWarning>,
) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(Error::input_shape(format!(
                "{} table not found: {}",
                table,
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    let Some(directory) = directory else {
        return Ok(None);
    };
    let candidates = find_candidates(directory, pattern)?;
    debug!(
        "{} candidate(s) for the {} table in {}",
        candidates.len(),
        table,
        directory.display()
    );

    if candidates.len() > 1 {
        let names: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
        let warning = RunWarning::MultipleCandidates {
            table: table.to_string(),
            chosen: names[0].clone(),
            candidates: names,
        };
        warn!("{}", warning);
        warnings.push(warning);
    }
    Ok(candidates.into_iter().next())
}

/// Files in `directory` matching `pattern`, sorted by path
///
/// Matching is case-insensitive so `GTM_SET_Data.csv` is found by `*set_data*.csv`.
pub fn find_candidates(directory: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Err(Error::input_shape(format!(
            "input directory does not exist: {}",
            directory.display()
        )));
    }

    let full_pattern = directory.join(pattern);
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..glob::MatchOptions::new()
    };
    let mut matches: Vec<PathBuf> = glob::glob_with(&full_pattern.to_string_lossy(), options)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping unreadable path: {}", e);
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();
    matches.sort();
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "reserve\n").unwrap();
        path
    }

    fn config_for(dir: &Path) -> InputConfig {
        InputConfig {
            directory: Some(dir.to_path_buf()),
            ..InputConfig::default()
        }
    }

    #[test]
    fn test_discovers_all_tables() {
        let dir = TempDir::new().unwrap();
        let data = touch(dir.path(), "GTM_set_data.csv");
        let metadata = touch(dir.path(), "set_metadata.csv");
        let slr = touch(dir.path(), "slr_rates.csv");

        let (paths, warnings) = discover_inputs(&config_for(dir.path())).unwrap();
        assert_eq!(paths.data, data);
        assert_eq!(paths.metadata, Some(metadata));
        assert_eq!(paths.slr, Some(slr));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_multiple_candidates_pick_first_alphabetically() {
        let dir = TempDir::new().unwrap();
        let first = touch(dir.path(), "a_set_data.csv");
        touch(dir.path(), "b_set_data.csv");

        let (paths, warnings) = discover_inputs(&config_for(dir.path())).unwrap();
        assert_eq!(paths.data, first);
        assert!(matches!(
            &warnings[..],
            [RunWarning::MultipleCandidates { table, candidates, .. }]
                if table == "data" && candidates.len() == 2
        ));
    }

    #[test]
    fn test_missing_optional_tables_are_none() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "set_data.csv");

        let (paths, _) = discover_inputs(&config_for(dir.path())).unwrap();
        assert!(paths.metadata.is_none());
        assert!(paths.slr.is_none());
    }

    #[test]
    fn test_missing_data_table_is_fatal() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "set_metadata.csv");

        let error = discover_inputs(&config_for(dir.path())).unwrap_err();
        assert!(matches!(error, Error::InputShape { .. }));
    }

    #[test]
    fn test_explicit_path_overrides_discovery() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "set_data.csv");
        let other = touch(dir.path(), "readings.csv");

        let config = InputConfig {
            data_file: Some(other.clone()),
            ..config_for(dir.path())
        };
        let (paths, _) = discover_inputs(&config).unwrap();
        assert_eq!(paths.data, other);
    }

    #[test]
    fn test_explicit_missing_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = InputConfig {
            data_file: Some(dir.path().join("absent.csv")),
            ..InputConfig::default()
        };
        assert!(discover_inputs(&config).is_err());
    }

    #[test]
    fn test_no_directory_and_no_path() {
        let error = discover_inputs(&InputConfig::default()).unwrap_err();
        assert!(error.to_string().contains("--data"));
    }
}
