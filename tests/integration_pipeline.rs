//! Integration tests for the full SET analysis run
//!
//! Builds small but realistic measurement, metadata and sea-level-rise
//! tables on disk, runs discovery, loading, QA/QC, eligibility, fitting and
//! report writing end to end, and checks the written tables.

use chrono::NaiveDate;
use polars::prelude::*;
use set_processor::app::models::{RunWarning, TrendDirection};
use set_processor::app::pipeline::{RunInputs, prepare_run, run_analysis, write_reports};
use set_processor::app::services::report::ReportWriter;
use set_processor::app::services::table_loader::read_table;
use set_processor::cli::input::discover_inputs;
use set_processor::config::Config;
use std::fmt::Write as _;
use std::path::Path;
use tempfile::TempDir;

const HEADER: &str =
    "reserve,set_id,arm_position,pin_number,year,month,day,pin_height,qaqc_code,arm_qaqc_code\n";

/// Readings for one SET: `arms` x `pins` pins read on each date with a
/// linear trend, fixed per-pin offsets and small deterministic jitter
struct SetFixture {
    reserve: &'static str,
    set_id: &'static str,
    arms: usize,
    pins: usize,
    dates: Vec<NaiveDate>,
    rate_mm_yr: f64,
    /// Pin code for (arm, pin, event) readings, when any
    code: fn(usize, usize, usize) -> Option<&'static str>,
}

impl SetFixture {
    fn rows(&self, out: &mut String) {
        let epoch = self.dates[0];
        for (event, date) in self.dates.iter().enumerate() {
            let years = (*date - epoch).num_days() as f64 / 365.25;
            for arm in 1..=self.arms {
                for pin in 1..=self.pins {
                    let offset = ((pin * 7 + arm * 3) % 5) as f64;
                    let jitter = (((pin * 31 + event * 17 + arm * 5) % 7) as f64 - 3.0) * 0.1;
                    let height = 150.0 + offset + self.rate_mm_yr * years + jitter;
                    let code = (self.code)(arm, pin, event).unwrap_or("");
                    writeln!(
                        out,
                        "{},{},{},{},{},{},{},{:.3},{},",
                        self.reserve,
                        self.set_id,
                        arm,
                        pin,
                        date.format("%Y"),
                        date.format("%-m"),
                        date.format("%-d"),
                        height,
                        code
                    )
                    .unwrap();
                }
            }
        }
    }
}

fn annual_dates(first_year: i32, events: usize) -> Vec<NaiveDate> {
    (0..events)
        .map(|i| NaiveDate::from_ymd_opt(first_year + i as i32, 1, 15).unwrap())
        .collect()
}

fn no_code(_: usize, _: usize, _: usize) -> Option<&'static str> {
    None
}

/// Arm 1 pin 1 is damaged on the third visit; one reading carries a combined code
fn damaged_pin(arm: usize, pin: usize, event: usize) -> Option<&'static str> {
    match (arm, pin, event) {
        (1, 1, 2) => Some("D1"),
        (2, 3, 4) => Some("D1 SV"),
        _ => None,
    }
}

/// Every reading flagged for removal
fn all_flagged(_: usize, _: usize, _: usize) -> Option<&'static str> {
    Some("X1")
}

/// GTM-1 rising at 4 mm/yr, GTM-2 with a one-year record, WQB-1 sinking at 2 mm/yr
fn write_fixture(dir: &Path) {
    let mut data = HEADER.to_string();
    SetFixture {
        reserve: "GTM",
        set_id: "GTM-1",
        arms: 2,
        pins: 3,
        dates: annual_dates(2012, 6),
        rate_mm_yr: 4.0,
        code: damaged_pin,
    }
    .rows(&mut data);
    SetFixture {
        reserve: "GTM",
        set_id: "GTM-2",
        arms: 2,
        pins: 3,
        dates: vec![
            NaiveDate::from_ymd_opt(2018, 1, 10).unwrap(),
            NaiveDate::from_ymd_opt(2018, 7, 10).unwrap(),
            NaiveDate::from_ymd_opt(2019, 1, 10).unwrap(),
        ],
        rate_mm_yr: 1.0,
        code: no_code,
    }
    .rows(&mut data);
    SetFixture {
        reserve: "WQB",
        set_id: "WQB-1",
        arms: 2,
        pins: 3,
        dates: annual_dates(2011, 7),
        rate_mm_yr: -2.0,
        code: no_code,
    }
    .rows(&mut data);
    std::fs::write(dir.join("nerr_set_data.csv"), data).unwrap();

    std::fs::write(
        dir.join("set_metadata.csv"),
        "Unique Set ID,Reserve,Latitude,Longitude,Numerical Order,User Friendly Set Name\n\
         GTM-1,GTM,29.94,-81.31,2,Pellicer Creek\n\
         GTM-2,GTM,29.70,-81.25,1,Moses Creek\n\
         WQB-1,WQB,41.57,-70.52,1,Sage Lot Pond\n\
         GTM-9,GTM,29.80,-81.29,3,Retired\n",
    )
    .unwrap();

    std::fs::write(
        dir.join("slr_rates.csv"),
        "reserve,slr_rate_mm_yr,ci_95_percent,nearest_station\n\
         GTM,3.0,0.3,Mayport\n",
    )
    .unwrap();
}

fn config_for(dir: &Path) -> Config {
    let mut config = Config::default()
        .with_excluded_codes(["D1"])
        .with_workers(2)
        .with_output_directory(dir.join("output"));
    config.input.directory = Some(dir.to_path_buf());
    config
}

fn load(config: &Config) -> RunInputs {
    let (paths, warnings) = discover_inputs(&config.input).unwrap();
    let mut inputs = RunInputs::load(&paths).unwrap();
    inputs.warnings.extend(warnings);
    inputs
}

/// String cells of a written table column, empty cells as `None`
fn cells(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .cast(&DataType::String)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.filter(|s| !s.is_empty()).map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_full_run_classifies_sites() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path());
    let config = config_for(dir.path());

    let output = run_analysis(load(&config), &config, false).await.unwrap();

    assert_eq!(output.n_sites, 3);
    assert_eq!(output.n_eligible(), 2);
    assert_eq!(output.n_ineligible(), 1);
    assert_eq!(output.n_fitted(), 2);

    let ids: Vec<&str> = output.summaries.iter().map(|s| s.set_id.as_str()).collect();
    assert_eq!(ids, vec!["GTM-1", "WQB-1"]);

    let gtm = &output.summaries[0];
    let rate = gtm.rate.unwrap();
    assert!((rate - 4.0).abs() < 0.5, "GTM-1 rate {}", rate);
    assert!(gtm.ci_low.unwrap() < rate && rate < gtm.ci_high.unwrap());
    assert_eq!(gtm.dir_0, Some(TrendDirection::IncSig));
    assert_eq!(gtm.slr_rate, Some(3.0));
    assert!(gtm.dir_slr.is_some());
    assert!((gtm.set_slr_ratio.unwrap() - rate / 3.0).abs() < 1e-9);
    assert_eq!(gtm.user_friendly_set_name.as_deref(), Some("Pellicer Creek"));

    let wqb = &output.summaries[1];
    assert!((wqb.rate.unwrap() + 2.0).abs() < 0.5);
    assert_eq!(wqb.dir_0, Some(TrendDirection::DecSig));
    assert_eq!(wqb.dir_slr, None);
    assert_eq!(wqb.slr_rate, None);
    assert_eq!(wqb.set_slr_ratio, None);
}

#[tokio::test]
async fn test_run_warnings() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path());
    let config = config_for(dir.path());

    let output = run_analysis(load(&config), &config, false).await.unwrap();

    assert!(output.warnings.contains(&RunWarning::MissingSlrReference {
        reserve: "WQB".to_string()
    }));
    assert!(output.warnings.iter().any(|w| matches!(
        w,
        RunWarning::SiteIdMismatch { in_data_only, in_metadata_only }
            if in_data_only.is_empty() && in_metadata_only == &vec!["GTM-9".to_string()]
    )));
    assert!(
        !output
            .warnings
            .iter()
            .any(|w| matches!(w, RunWarning::ModelFitFailed { .. }))
    );
}

#[tokio::test]
async fn test_qaqc_exact_code_matching() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path());
    let config = config_for(dir.path());

    let output = run_analysis(load(&config), &config, false).await.unwrap();

    assert_eq!(output.exclusions.len(), 1);
    let excluded = &output.exclusions[0];
    assert_eq!(excluded.matched_code, "D1");
    assert_eq!(excluded.measurement.set_id, "GTM-1");
    assert!(excluded.measurement.pin_height.is_some());

    let gtm = output.summaries[0].diagnostics.as_ref().unwrap();
    assert_eq!(gtm.n_observations, 6 * 6 - 1);
}

#[tokio::test]
async fn test_reports_written() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path());
    let config = config_for(dir.path());

    let output = run_analysis(load(&config), &config, false).await.unwrap();
    let writer = ReportWriter::new(&config.output);
    let written = write_reports(&output, &writer).unwrap();

    assert_eq!(written.len(), 4);
    assert!(written.iter().all(|p| p.exists()));

    let rates = read_table(&written[0], "rates").unwrap();
    assert_eq!(rates.height(), 2);
    assert_eq!(
        cells(&rates, "set_id"),
        vec![Some("GTM-1".to_string()), Some("WQB-1".to_string())]
    );
    assert_eq!(
        cells(&rates, "dir_0"),
        vec![Some("inc_sig".to_string()), Some("dec_sig".to_string())]
    );
    assert_eq!(cells(&rates, "dir_slr")[1], None);

    let change = read_table(&written[1], "cumulative change").unwrap();
    let change_sites = cells(&change, "set_id");
    assert!(change_sites.contains(&Some("GTM-2".to_string())));
    assert_eq!(change.height(), 6 + 3 + 7);

    let eligibility = read_table(&written[3], "eligibility").unwrap();
    assert_eq!(eligibility.height(), 3);
}

#[tokio::test]
async fn test_failed_site_keeps_its_row() {
    let dir = TempDir::new().unwrap();
    let mut data = HEADER.to_string();
    SetFixture {
        reserve: "GTM",
        set_id: "SITE-1",
        arms: 2,
        pins: 3,
        dates: annual_dates(2012, 6),
        rate_mm_yr: 3.0,
        code: no_code,
    }
    .rows(&mut data);
    SetFixture {
        reserve: "NIW",
        set_id: "SITE-1",
        arms: 2,
        pins: 3,
        dates: annual_dates(2012, 6),
        rate_mm_yr: 3.0,
        code: all_flagged,
    }
    .rows(&mut data);
    std::fs::write(dir.path().join("set_data.csv"), data).unwrap();

    let config = config_for(dir.path()).with_excluded_codes(["X1"]);
    let output = run_analysis(load(&config), &config, false).await.unwrap();

    assert_eq!(output.n_eligible(), 2);
    assert_eq!(output.summaries.len(), 2);
    assert_eq!(output.n_fitted(), 1);
    assert_eq!(output.exclusions.len(), 6 * 6);

    let good = &output.summaries[0];
    assert_eq!(good.reserve, "GTM");
    assert!(good.rate.is_some());
    assert_eq!(good.dir_0, Some(TrendDirection::IncSig));
    assert!(good.fit_failure.is_none());

    let bad = &output.summaries[1];
    assert_eq!(bad.reserve, "NIW");
    assert_eq!(bad.rate, None);
    assert_eq!(bad.dir_0, None);
    assert!(bad.fit_failure.as_deref().unwrap().contains("usable"));

    let failed: Vec<(&str, &str)> = output
        .failed()
        .map(|s| (s.reserve.as_str(), s.set_id.as_str()))
        .collect();
    assert_eq!(failed, vec![("NIW", "SITE-1")]);

    let no_readings: Vec<String> = output
        .warnings
        .iter()
        .filter_map(|w| match w {
            RunWarning::NoUsableReadings { site } => Some(site.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(no_readings, vec!["NIW/SITE-1".to_string()]);
}

#[test]
fn test_prepare_without_optional_tables() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path());
    std::fs::remove_file(dir.path().join("set_metadata.csv")).unwrap();
    std::fs::remove_file(dir.path().join("slr_rates.csv")).unwrap();
    let config = config_for(dir.path());

    let prepared = prepare_run(load(&config), &config).unwrap();

    assert_eq!(prepared.eligible.len(), 2);
    assert!(prepared.slr.is_empty());
    assert!(prepared.warnings.contains(&RunWarning::MissingTable {
        table: "SLR".to_string()
    }));
    assert!(
        !prepared
            .warnings
            .iter()
            .any(|w| matches!(w, RunWarning::SiteIdMismatch { .. }))
    );
}

#[test]
fn test_no_eligible_sites_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path());
    let mut config = config_for(dir.path());
    config.eligibility.min_years_sampled = 50.0;

    let prepared = prepare_run(load(&config), &config).unwrap();

    assert!(prepared.eligible.is_empty());
    assert_eq!(prepared.eligibility.len(), 3);
    assert!(prepared.warnings.contains(&RunWarning::NoEligibleSites));
}

#[test]
fn test_empty_measurement_table_is_fatal() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("set_data.csv"), HEADER).unwrap();
    let config = config_for(dir.path());

    let error = prepare_run(load(&config), &config).unwrap_err();
    assert!(matches!(error, set_processor::Error::InputShape { .. }));
}
