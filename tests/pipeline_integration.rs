//! End-to-end runs of the pipeline over a synthetic city.

mod common;

use std::collections::BTreeSet;

use solar_zones::error::PipelineError;
use solar_zones::features::{CityRollup, FeatureRecord, ZoneAnnualRecord};
use solar_zones::io::tables::{columns, names, read_table};
use solar_zones::pipeline::{Pipeline, Stage};
use solar_zones::pv::DailyEnergyRecord;
use solar_zones::qa::{QaStatus, ZoneQaSummary};
use solar_zones::weather::{ClearSkySource, MemoryCache};

use common::{DOWN_ZONE, SHORT_ZONE, SHORT_ZONE_DAYS, TruncatingSource, UnreachableZoneSource};

fn read<T: serde::de::DeserializeOwned>(dir: &std::path::Path, name: &str) -> Vec<T> {
    read_table(&dir.join(name), &[]).unwrap()
}

#[tokio::test]
async fn full_run_classifies_and_rolls_up_passing_zones() {
    let out = common::output_dir("full");
    let cfg = common::two_year_config(out.clone());
    let processed = cfg.output.processed_dir();
    let pipeline = Pipeline::new(
        cfg,
        common::square_boundary(4.0),
        TruncatingSource::default(),
        MemoryCache::new(),
    );

    let summary = pipeline.run(Stage::All).await.unwrap();
    assert_eq!(summary.zones, 4);
    assert_eq!(summary.weather_succeeded, 4);
    assert_eq!(summary.weather_skipped, 0);
    assert_eq!(summary.simulated, 4);
    assert_eq!(summary.qa_pass, 3);
    assert_eq!(summary.qa_fail, 0);
    assert_eq!(summary.qa_undetermined, 1);
    assert_eq!(summary.rollup_days, 730);

    let qa: Vec<ZoneQaSummary> = read_table(&processed.join(names::QA_SUMMARY), columns::QA_SUMMARY).unwrap();
    let short = qa.iter().find(|s| s.zone_id == SHORT_ZONE).unwrap();
    assert_eq!(short.status, QaStatus::Undetermined);
    assert_eq!(short.qa_pass_zone, None);
    assert_eq!(short.n_full_years, 0);

    let daily: Vec<DailyEnergyRecord> = read(&processed, names::DAILY_ENERGY);
    let short_days = daily.iter().filter(|r| r.zone_id == SHORT_ZONE).count();
    assert_eq!(short_days as i64, SHORT_ZONE_DAYS);

    let features: Vec<FeatureRecord> = read(&processed, names::FEATURES);
    let zones: BTreeSet<&str> = features.iter().map(|f| f.zone_id.as_str()).collect();
    assert_eq!(zones, BTreeSet::from(["T-0001", "T-0002", "T-0003"]));
    assert_eq!(features.len(), 3 * 730);

    let rollup: Vec<CityRollup> = read(&processed, names::CITY_ROLLUP);
    assert_eq!(rollup.len(), 730);
    assert!(rollup.iter().all(|r| r.n_zones == 3));
    assert!(rollup.iter().all(|r| r.min_kwh <= r.median_kwh && r.median_kwh <= r.max_kwh));

    let annual: Vec<ZoneAnnualRecord> = read(&processed, names::ZONE_ANNUAL);
    assert_eq!(annual.len(), 4);
    assert!(annual.iter().all(|a| a.region.is_some()));
    assert!(annual.iter().any(|a| a.score_0_100 == 100));
    assert!(annual.iter().any(|a| a.score_0_100 == 0));

    let _ = std::fs::remove_dir_all(&out);
}

#[tokio::test]
async fn zone_without_weather_is_skipped_and_left_out_of_rollup() {
    let out = common::output_dir("down-zone");
    let cfg = common::two_year_config(out.clone());
    let processed = cfg.output.processed_dir();
    let pipeline = Pipeline::new(
        cfg,
        common::square_boundary(4.0),
        UnreachableZoneSource::default(),
        MemoryCache::new(),
    );

    let summary = pipeline.run(Stage::All).await.unwrap();
    assert_eq!(summary.zones, 4);
    assert_eq!(summary.weather_succeeded, 3);
    assert_eq!(summary.weather_skipped, 1);
    assert_eq!(summary.simulated, 3);
    assert_eq!(summary.simulation_skipped, 1);
    assert_eq!(summary.qa_pass, 3);
    assert_eq!(summary.qa_fail + summary.qa_undetermined, 0);
    assert_eq!(summary.rollup_days, 730);

    let weather: Vec<solar_zones::io::tables::HourlyWeatherRecord> = read(&processed, names::WEATHER_HOURLY);
    assert!(weather.iter().all(|r| r.zone_id != DOWN_ZONE));

    let daily: Vec<DailyEnergyRecord> = read(&processed, names::DAILY_ENERGY);
    let simulated: BTreeSet<&str> = daily.iter().map(|r| r.zone_id.as_str()).collect();
    assert_eq!(simulated, BTreeSet::from(["T-0001", "T-0002", "T-0004"]));

    let features: Vec<FeatureRecord> = read(&processed, names::FEATURES);
    assert_eq!(features.len(), 3 * 730);
    assert!(features.iter().all(|f| f.zone_id != DOWN_ZONE));

    let rollup: Vec<CityRollup> = read(&processed, names::CITY_ROLLUP);
    assert_eq!(rollup.len(), 730);
    assert!(rollup.iter().all(|r| r.n_zones == 3));

    let annual: Vec<ZoneAnnualRecord> = read(&processed, names::ZONE_ANNUAL);
    assert!(annual.iter().all(|a| a.zone_id != DOWN_ZONE));

    let _ = std::fs::remove_dir_all(&out);
}

#[tokio::test]
async fn stages_rerun_from_persisted_tables() {
    let out = common::output_dir("rerun");
    let cfg = common::two_year_config(out.clone());
    let processed = cfg.output.processed_dir();
    let pipeline = Pipeline::new(
        cfg,
        common::square_boundary(4.0),
        TruncatingSource::default(),
        MemoryCache::new(),
    );

    assert_eq!(pipeline.run(Stage::Zones).await.unwrap().zones, 4);
    let weather = pipeline.run(Stage::Weather).await.unwrap();
    assert_eq!(weather.weather_succeeded, 4);
    let sim = pipeline.run(Stage::Simulate).await.unwrap();
    assert_eq!(sim.simulated, 4);
    let qa = pipeline.run(Stage::Qa).await.unwrap();
    assert_eq!((qa.qa_pass, qa.qa_undetermined), (3, 1));
    let features = pipeline.run(Stage::Features).await.unwrap();
    assert_eq!(features.rollup_days, 730);

    // without a QA summary every zone feeds the rollup
    std::fs::remove_file(processed.join(names::QA_SUMMARY)).unwrap();
    let fallback = pipeline.run(Stage::Features).await.unwrap();
    assert_eq!(fallback.feature_rows, 3 * 730 + SHORT_ZONE_DAYS as usize);
    let rollup: Vec<CityRollup> = read(&processed, names::CITY_ROLLUP);
    assert_eq!(rollup[0].n_zones, 4);
    assert_eq!(rollup[729].n_zones, 3);

    let _ = std::fs::remove_dir_all(&out);
}

#[tokio::test]
async fn cached_weather_is_reused() {
    let out = common::output_dir("cache");
    let cfg = common::two_year_config(out.clone());
    let cache = MemoryCache::new();
    let pipeline = Pipeline::new(cfg, common::square_boundary(4.0), ClearSkySource::default(), cache);

    pipeline.run(Stage::Zones).await.unwrap();
    pipeline.run(Stage::Weather).await.unwrap();
    let first: Vec<solar_zones::io::tables::HourlyWeatherRecord> =
        read(&pipeline.config().output.processed_dir(), names::WEATHER_HOURLY);
    pipeline.run(Stage::Weather).await.unwrap();
    let second: Vec<solar_zones::io::tables::HourlyWeatherRecord> =
        read(&pipeline.config().output.processed_dir(), names::WEATHER_HOURLY);
    assert_eq!(first, second);

    let _ = std::fs::remove_dir_all(&out);
}

#[tokio::test]
async fn stage_without_inputs_is_schema_error() {
    let cfg = common::two_year_config(common::output_dir("missing"));
    let pipeline = Pipeline::new(
        cfg,
        common::square_boundary(4.0),
        ClearSkySource::default(),
        MemoryCache::new(),
    );
    let err = pipeline.run(Stage::Qa).await.unwrap_err();
    assert!(matches!(err, PipelineError::Schema { .. }), "got {err}");
    let err = pipeline.run(Stage::Simulate).await.unwrap_err();
    assert!(matches!(err, PipelineError::Schema { .. }), "got {err}");
}

#[tokio::test]
async fn tiny_boundary_yields_no_zones() {
    let mut cfg = common::two_year_config(common::output_dir("tiny"));
    cfg.grid.min_cell_fraction = 0.5;
    let pipeline = Pipeline::new(
        cfg,
        common::square_boundary(0.5),
        ClearSkySource::default(),
        MemoryCache::new(),
    );
    let err = pipeline.run(Stage::Zones).await.unwrap_err();
    assert!(matches!(err, PipelineError::NoZones), "got {err}");
}
