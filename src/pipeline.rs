//! Stage orchestration.
//!
//! Each stage writes its table under `<output.dir>/processed/`. Running a
//! single stage loads its inputs from those tables, so any stage can be
//! re-run against persisted intermediates.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::features::{CityRollup, FeatureRecord, ZoneAnnualRecord, build_features, city_rollup, select_zones, zone_annual};
use crate::grid::{
    BoundarySource, GeoJsonFileSource, NominatimSource, Region, Zone, ZoneGridBuilder, resolve_boundary,
};
use crate::io::geojson::{read_zones, write_zones};
use crate::io::tables::{
    HourlyWeatherRecord, columns, group_weather, names, read_table, weather_rows, write_table,
};
use crate::pv::{DailyEnergyRecord, PvModel, simulate_zones};
use crate::qa::{self, QaReport, QaStatus, ZoneQaSummary, ZoneYearStat};
use crate::weather::{
    ClearSkySource, FetchError, FileCache, IngestSettings, PowerApiSource, WeatherCache, WeatherHour,
    WeatherRequest, WeatherSource, ingest_zones,
};

/// Which part of the pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Every stage in order.
    All,
    /// Boundary and zone grid.
    Zones,
    /// Weather ingestion and cleaning.
    Weather,
    /// PV simulation.
    Simulate,
    /// QA classification.
    Qa,
    /// Features, rollup and suitability table.
    Features,
}

impl Stage {
    /// Accepted names, in pipeline order.
    pub const NAMES: [&'static str; 6] = ["all", "zones", "weather", "simulate", "qa", "features"];
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "zones" => Ok(Self::Zones),
            "weather" => Ok(Self::Weather),
            "simulate" => Ok(Self::Simulate),
            "qa" => Ok(Self::Qa),
            "features" => Ok(Self::Features),
            other => Err(format!(
                "unknown stage \"{other}\" (expected one of: {})",
                Self::NAMES.join(", ")
            )),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::All => "all",
            Self::Zones => "zones",
            Self::Weather => "weather",
            Self::Simulate => "simulate",
            Self::Qa => "qa",
            Self::Features => "features",
        };
        f.write_str(s)
    }
}

/// Counts reported by a run; stages that did not run stay zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Zones produced or loaded.
    pub zones: usize,
    /// Zones with cleaned weather.
    pub weather_succeeded: usize,
    /// Zones skipped during ingestion.
    pub weather_skipped: usize,
    /// Zones simulated.
    pub simulated: usize,
    /// Zones skipped during simulation.
    pub simulation_skipped: usize,
    /// Daily energy rows.
    pub daily_rows: usize,
    /// Zones passing QA.
    pub qa_pass: usize,
    /// Zones failing QA.
    pub qa_fail: usize,
    /// Zones without a full year.
    pub qa_undetermined: usize,
    /// Feature rows.
    pub feature_rows: usize,
    /// Rollup dates.
    pub rollup_days: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "zones:        {}", self.zones)?;
        writeln!(
            f,
            "weather:      {} ok, {} skipped",
            self.weather_succeeded, self.weather_skipped
        )?;
        writeln!(
            f,
            "simulation:   {} ok, {} skipped ({} daily rows)",
            self.simulated, self.simulation_skipped, self.daily_rows
        )?;
        writeln!(
            f,
            "qa:           {} pass, {} fail, {} undetermined",
            self.qa_pass, self.qa_fail, self.qa_undetermined
        )?;
        write!(
            f,
            "features:     {} rows, rollup {} days",
            self.feature_rows, self.rollup_days
        )
    }
}

/// Outputs of the features stage.
#[derive(Debug, Clone, Default)]
pub struct FeatureOutputs {
    /// Per zone-day features.
    pub features: Vec<FeatureRecord>,
    /// Per date aggregates.
    pub rollup: Vec<CityRollup>,
    /// Per zone suitability.
    pub annual: Vec<ZoneAnnualRecord>,
}

/// Boundary backend chosen from configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredBoundary {
    /// Nominatim geocoder.
    Geocoder(NominatimSource),
    /// Local GeoJSON file.
    File(GeoJsonFileSource),
}

impl ConfiguredBoundary {
    /// The file source when `boundary.geojson` is set, else the geocoder.
    ///
    /// # Errors
    ///
    /// HTTP client construction failures.
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        match &cfg.boundary.geojson {
            Some(path) => Ok(Self::File(GeoJsonFileSource::new(path))),
            None => Ok(Self::Geocoder(NominatimSource::new(
                &cfg.boundary.geocoder_url,
                &cfg.boundary.user_agent,
            )?)),
        }
    }
}

impl BoundarySource for ConfiguredBoundary {
    async fn resolve(&self, place: &str) -> Result<geo::MultiPolygon<f64>> {
        match self {
            Self::Geocoder(s) => s.resolve(place).await,
            Self::File(s) => s.resolve(place).await,
        }
    }
}

/// Weather backend chosen from configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredWeather {
    /// NASA POWER.
    Power(PowerApiSource),
    /// Synthetic clear-sky series.
    Offline(ClearSkySource),
}

impl ConfiguredWeather {
    /// The offline generator when `offline`, else the POWER client.
    ///
    /// # Errors
    ///
    /// HTTP client construction failures.
    pub fn from_config(cfg: &PipelineConfig, offline: bool) -> Result<Self> {
        if offline {
            return Ok(Self::Offline(ClearSkySource::default()));
        }
        PowerApiSource::new(&cfg.weather.base_url, cfg.weather.timeout_secs)
            .map(Self::Power)
            .map_err(|e| PipelineError::Config(format!("weather client: {e}")))
    }
}

impl WeatherSource for ConfiguredWeather {
    async fn fetch(&self, request: &WeatherRequest) -> std::result::Result<Vec<WeatherHour>, FetchError> {
        match self {
            Self::Power(s) => s.fetch(request).await,
            Self::Offline(s) => s.fetch(request).await,
        }
    }
}

/// The batch pipeline over a boundary source, a weather source and a cache.
#[derive(Debug)]
pub struct Pipeline<B, W, C> {
    config: PipelineConfig,
    boundary: B,
    weather: W,
    cache: C,
}

impl Pipeline<ConfiguredBoundary, ConfiguredWeather, FileCache> {
    /// Builds the production pipeline from configuration.
    ///
    /// # Errors
    ///
    /// Source construction failures.
    pub fn from_config(config: PipelineConfig, offline: bool) -> Result<Self> {
        let boundary = ConfiguredBoundary::from_config(&config)?;
        let weather = ConfiguredWeather::from_config(&config, offline)?;
        let cache = FileCache::new(&config.output.weather_cache_dir());
        Ok(Self::new(config, boundary, weather, cache))
    }
}

impl<B, W, C> Pipeline<B, W, C>
where
    B: BoundarySource,
    W: WeatherSource,
    C: WeatherCache,
{
    /// Creates a pipeline.
    pub fn new(config: PipelineConfig, boundary: B, weather: W, cache: C) -> Self {
        Self {
            config,
            boundary,
            weather,
            cache,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn table(&self, name: &str) -> PathBuf {
        self.config.output.processed_dir().join(name)
    }

    /// Runs `stage`, loading earlier outputs from disk when it is not `All`.
    ///
    /// # Errors
    ///
    /// Fatal stage errors: unresolved boundary, zero zones, a stage with no
    /// successful zone, missing or malformed input tables, I/O failures.
    pub async fn run(&self, stage: Stage) -> Result<RunSummary> {
        info!(%stage, "pipeline started");
        let mut summary = RunSummary::default();
        match stage {
            Stage::All => {
                let zones = self.zones_stage(&mut summary).await?;
                let weather = self.weather_stage(&zones, &mut summary).await?;
                let daily = self.simulate_stage(&zones, &weather, &mut summary)?;
                let report = self.qa_stage(&daily, &mut summary)?;
                self.features_stage(daily, Some(&report), Some(&zones), &mut summary)?;
            }
            Stage::Zones => {
                self.zones_stage(&mut summary).await?;
            }
            Stage::Weather => {
                let zones = self.load_zones(&mut summary)?;
                self.weather_stage(&zones, &mut summary).await?;
            }
            Stage::Simulate => {
                let zones = self.load_zones(&mut summary)?;
                let rows: Vec<HourlyWeatherRecord> =
                    read_table(&self.table(names::WEATHER_HOURLY), columns::WEATHER_HOURLY)?;
                let weather = group_weather(rows);
                self.simulate_stage(&zones, &weather, &mut summary)?;
            }
            Stage::Qa => {
                let daily = self.load_daily()?;
                self.qa_stage(&daily, &mut summary)?;
            }
            Stage::Features => {
                let daily = self.load_daily()?;
                let report = self.load_qa()?;
                let zones = match read_zones(&self.table(names::ZONES)) {
                    Ok(z) => Some(z),
                    Err(e) => {
                        warn!(error = %e, "zones unavailable, suitability table has no regions");
                        None
                    }
                };
                self.features_stage(daily, report.as_ref(), zones.as_deref(), &mut summary)?;
            }
        }
        info!(%stage, "pipeline finished");
        Ok(summary)
    }

    /// Resolves the boundary, builds and persists zones.
    ///
    /// # Errors
    ///
    /// Unresolved boundary or zero zones.
    pub async fn zones_stage(&self, summary: &mut RunSummary) -> Result<Vec<Zone>> {
        let boundary = resolve_boundary(&self.boundary, &self.config.boundary.place).await?;
        let g = &self.config.grid;
        let grid = ZoneGridBuilder::new(g.cell_km, g.min_cell_fraction, &g.zone_prefix).build(&boundary)?;
        write_zones(&grid.zones, &self.table(names::ZONES))?;
        summary.zones = grid.zones.len();
        Ok(grid.zones)
    }

    /// Ingests and persists cleaned weather for `zones`.
    ///
    /// # Errors
    ///
    /// An empty date range, every zone failing, or write failures.
    pub async fn weather_stage(
        &self,
        zones: &[Zone],
        summary: &mut RunSummary,
    ) -> Result<BTreeMap<String, Vec<WeatherHour>>> {
        let settings = IngestSettings::from(&self.config.weather);
        if settings.end < settings.start {
            return Err(PipelineError::Config(format!(
                "weather range is empty ({} .. {})",
                settings.start, settings.end
            )));
        }
        let outcome = ingest_zones(zones, &self.weather, &self.cache, &settings).await;
        summary.weather_succeeded = outcome.succeeded.len();
        summary.weather_skipped = outcome.failed.len();
        if outcome.succeeded.is_empty() {
            return Err(PipelineError::NothingProcessed("weather"));
        }
        write_table(&weather_rows(&outcome.succeeded), &self.table(names::WEATHER_HOURLY))?;
        Ok(outcome
            .succeeded
            .into_iter()
            .map(|z| (z.zone_id, z.hours))
            .collect())
    }

    /// Simulates and persists daily energy.
    ///
    /// Zones without weather rows are reported as skipped.
    ///
    /// # Errors
    ///
    /// Every zone failing, or write failures.
    pub fn simulate_stage(
        &self,
        zones: &[Zone],
        weather: &BTreeMap<String, Vec<WeatherHour>>,
        summary: &mut RunSummary,
    ) -> Result<Vec<DailyEnergyRecord>> {
        let model = PvModel::from_config(&self.config.pv, self.config.weather.timezone);
        let inputs: Vec<(&Zone, &[WeatherHour])> = zones
            .iter()
            .map(|z| (z, weather.get(&z.id).map_or(&[][..], Vec::as_slice)))
            .collect();
        let outcome = simulate_zones(&model, &inputs);
        summary.simulated = outcome.succeeded.len();
        summary.simulation_skipped = outcome.failed.len();
        if outcome.succeeded.is_empty() {
            return Err(PipelineError::NothingProcessed("simulate"));
        }
        let daily: Vec<DailyEnergyRecord> = outcome.succeeded.into_iter().flatten().collect();
        summary.daily_rows = daily.len();
        write_table(&daily, &self.table(names::DAILY_ENERGY))?;
        info!(rows = daily.len(), "daily energy written");
        Ok(daily)
    }

    /// Classifies and persists QA detail and summary.
    ///
    /// # Errors
    ///
    /// Write failures.
    pub fn qa_stage(&self, daily: &[DailyEnergyRecord], summary: &mut RunSummary) -> Result<QaReport> {
        let report = qa::classify(daily, self.config.pv.system_kw_dc, &self.config.qa);
        let count = |st: QaStatus| report.summary.iter().filter(|s| s.status == st).count();
        summary.qa_pass = count(QaStatus::Pass);
        summary.qa_fail = count(QaStatus::Fail);
        summary.qa_undetermined = count(QaStatus::Undetermined);
        write_table(&report.detail, &self.table(names::QA_DETAIL))?;
        write_table(&report.summary, &self.table(names::QA_SUMMARY))?;
        Ok(report)
    }

    /// Builds and persists features, city rollup and the suitability table.
    ///
    /// `report` selects QA-passing zones; without it every zone is used.
    /// `zones` supplies region labels.
    ///
    /// # Errors
    ///
    /// Write failures.
    pub fn features_stage(
        &self,
        daily: Vec<DailyEnergyRecord>,
        report: Option<&QaReport>,
        zones: Option<&[Zone]>,
        summary: &mut RunSummary,
    ) -> Result<FeatureOutputs> {
        let rated_kw = self.config.pv.system_kw_dc;
        let detail: Vec<ZoneYearStat> = match report {
            Some(r) if !r.detail.is_empty() => r.detail.clone(),
            _ => qa::zone_year_stats(&daily, rated_kw, &self.config.qa),
        };
        let regions: BTreeMap<String, Region> = zones
            .unwrap_or_default()
            .iter()
            .map(|z| (z.id.clone(), z.region))
            .collect();

        let selected = select_zones(daily, report.map(|r| r.summary.as_slice()));
        let features = build_features(&selected);
        let rollup = city_rollup(&features);
        let annual = zone_annual(&detail, &regions, rated_kw);

        write_table(&features, &self.table(names::FEATURES))?;
        write_table(&rollup, &self.table(names::CITY_ROLLUP))?;
        write_table(&annual, &self.table(names::ZONE_ANNUAL))?;
        summary.feature_rows = features.len();
        summary.rollup_days = rollup.len();
        info!(
            feature_rows = features.len(),
            rollup_days = rollup.len(),
            zones_scored = annual.len(),
            "features written"
        );
        Ok(FeatureOutputs {
            features,
            rollup,
            annual,
        })
    }

    fn load_zones(&self, summary: &mut RunSummary) -> Result<Vec<Zone>> {
        let zones = read_zones(&self.table(names::ZONES))?;
        if zones.is_empty() {
            return Err(PipelineError::NoZones);
        }
        summary.zones = zones.len();
        Ok(zones)
    }

    fn load_daily(&self) -> Result<Vec<DailyEnergyRecord>> {
        read_table(&self.table(names::DAILY_ENERGY), columns::DAILY_ENERGY)
    }

    /// QA tables when the summary exists; a missing summary is not an error.
    fn load_qa(&self) -> Result<Option<QaReport>> {
        let summary_path = self.table(names::QA_SUMMARY);
        if !summary_path.exists() {
            return Ok(None);
        }
        let summary: Vec<ZoneQaSummary> = read_table(&summary_path, columns::QA_SUMMARY)?;
        let detail_path = self.table(names::QA_DETAIL);
        let detail: Vec<ZoneYearStat> = if detail_path.exists() {
            read_table(&detail_path, columns::QA_DETAIL)?
        } else {
            Vec::new()
        };
        Ok(Some(QaReport { detail, summary }))
    }
}
