//! Hourly weather sources: the NASA POWER point API and an offline
//! clear-sky generator.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// POWER parameter names, in [`WeatherHour`] field order.
pub const POWER_PARAMETERS: [&str; 3] = ["ALLSKY_SFC_SW_DWN", "T2M", "WS10M"];

/// POWER fill value for missing data.
pub const POWER_FILL_VALUE: f64 = -999.0;

/// One hour of weather at a zone centroid, in zone-local civil time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherHour {
    /// Local timestamp (start of the hour).
    pub ts: NaiveDateTime,
    /// Global horizontal irradiance over the hour (Wh/m²).
    pub ghi_whm2: Option<f64>,
    /// Air temperature at 2 m (°C).
    pub t2m_c: Option<f64>,
    /// Wind speed at 10 m (m/s).
    pub ws10_ms: Option<f64>,
}

/// What to fetch for one zone.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRequest {
    /// Zone the series belongs to.
    pub zone_id: String,
    /// Centroid latitude (deg).
    pub lat: f64,
    /// Centroid longitude (deg).
    pub lon: f64,
    /// First date (inclusive).
    pub start: NaiveDate,
    /// Last date (inclusive).
    pub end: NaiveDate,
    /// City time zone; timestamps are in its civil time.
    pub tz: Tz,
}

/// Transport-level failure for one fetch attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Connection, timeout or other transport failure.
    Network(String),
    /// Non-success HTTP status.
    Status(u16),
    /// Body was not the expected JSON shape.
    Decode(String),
    /// The service answered but returned no records.
    Empty,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Status(code) => write!(f, "http status {code}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::Empty => write!(f, "empty response"),
        }
    }
}

impl FetchError {
    /// Whether another attempt could succeed: transport failures, rate
    /// limiting and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::Decode(_) | Self::Empty => false,
        }
    }
}

impl std::error::Error for FetchError {}

/// Fetches an hourly series for a point and date range.
pub trait WeatherSource: Sync {
    /// One attempt; retries are the caller's concern.
    fn fetch(
        &self,
        request: &WeatherRequest,
    ) -> impl Future<Output = Result<Vec<WeatherHour>, FetchError>> + Send;
}

/// NASA POWER hourly point API client.
#[derive(Debug, Clone)]
pub struct PowerApiSource {
    client: reqwest::Client,
    base_url: String,
}

impl PowerApiSource {
    /// Creates a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }
}

impl WeatherSource for PowerApiSource {
    async fn fetch(&self, request: &WeatherRequest) -> Result<Vec<WeatherHour>, FetchError> {
        let params = [
            ("parameters", POWER_PARAMETERS.join(",")),
            ("community", "RE".to_string()),
            ("longitude", format!("{:.4}", request.lon)),
            ("latitude", format!("{:.4}", request.lat)),
            ("start", request.start.format("%Y%m%d").to_string()),
            ("end", request.end.format("%Y%m%d").to_string()),
            ("time-standard", "UTC".to_string()),
            ("format", "JSON".to_string()),
        ];
        debug!(zone = %request.zone_id, "requesting POWER series");
        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        parse_power_response(&body, request.tz)
    }
}

/// Parses a POWER hourly JSON body into local-time records.
///
/// Keys are `YYYYMMDDHH` in UTC and are converted to civil time in `tz`.
/// When a DST fall-back repeats a local hour, the later UTC hour wins. The
/// fill value becomes `None`.
///
/// # Errors
///
/// [`FetchError::Empty`] when the parameter block is missing or empty,
/// [`FetchError::Decode`] on malformed keys or values.
pub fn parse_power_response(
    body: &Value,
    tz: Tz,
) -> Result<Vec<WeatherHour>, FetchError> {
    let parameters = body
        .pointer("/properties/parameter")
        .and_then(Value::as_object)
        .filter(|p| !p.is_empty())
        .ok_or(FetchError::Empty)?;

    let mut by_ts: BTreeMap<NaiveDateTime, WeatherHour> = BTreeMap::new();
    for (col, name) in POWER_PARAMETERS.iter().enumerate() {
        let Some(values) = parameters.get(*name).and_then(Value::as_object) else {
            continue;
        };
        for (key, value) in values {
            let ts = tz.from_utc_datetime(&parse_power_key(key)?).naive_local();
            let v = value
                .as_f64()
                .ok_or_else(|| FetchError::Decode(format!("{name}[{key}] is not a number")))?;
            let v = (v > POWER_FILL_VALUE + 0.5).then_some(v);
            let hour = by_ts.entry(ts).or_insert(WeatherHour {
                ts,
                ghi_whm2: None,
                t2m_c: None,
                ws10_ms: None,
            });
            match col {
                0 => hour.ghi_whm2 = v,
                1 => hour.t2m_c = v,
                _ => hour.ws10_ms = v,
            }
        }
    }
    if by_ts.is_empty() {
        return Err(FetchError::Empty);
    }
    Ok(by_ts.into_values().collect())
}

fn parse_power_key(key: &str) -> Result<NaiveDateTime, FetchError> {
    let bad = || FetchError::Decode(format!("bad timestamp key \"{key}\""));
    if key.len() != 10 || !key.is_ascii() {
        return Err(bad());
    }
    let date = NaiveDate::parse_from_str(&key[..8], "%Y%m%d").map_err(|_| bad())?;
    let hour: u32 = key[8..].parse().map_err(|_| bad())?;
    date.and_hms_opt(hour, 0, 0).ok_or_else(bad)
}

/// Deterministic synthetic weather for offline runs.
///
/// Irradiance is a Haurwitz clear-sky curve scaled by a seeded daily cloud
/// factor; temperature and wind follow smooth diurnal cycles with small noise.
#[derive(Debug, Clone)]
pub struct ClearSkySource {
    seed: u64,
}

impl ClearSkySource {
    /// Mean daily cloud transmittance.
    pub const MEAN_CLOUD_FACTOR: f64 = 0.65;

    /// Creates a generator with a fixed seed.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Synthesizes the full hourly series for `request`.
    pub fn generate(&self, request: &WeatherRequest) -> Vec<WeatherHour> {
        let zone_seed = request
            .zone_id
            .bytes()
            .fold(self.seed, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
        let mut rng = StdRng::seed_from_u64(zone_seed);
        let mut hours = Vec::new();
        for date in request.start.iter_days().take_while(|d| *d <= request.end) {
            let cloud = Self::MEAN_CLOUD_FACTOR + 0.1 * (rng.random::<f64>() - 0.5);
            let wind_base = 2.0 + rng.random::<f64>();
            for h in 0..24 {
                let Some(ts) = date.and_hms_opt(h, 0, 0) else {
                    continue;
                };
                // local hours skipped by a DST transition do not exist
                let Some(utc) = request.tz.from_local_datetime(&ts).earliest() else {
                    continue;
                };
                // mid-hour sample approximates the hourly integral
                let cos_z = cos_zenith(request.lat, request.lon, utc.naive_utc(), 0.5);
                let ghi = if cos_z > 0.0 {
                    1098.0 * cos_z * (-0.059 / cos_z).exp() * cloud
                } else {
                    0.0
                };
                let diurnal = (2.0 * PI * (f64::from(ts.hour()) - 9.0) / 24.0).sin();
                let seasonal = (2.0 * PI * (f64::from(date.ordinal()) - 80.0) / 365.0).sin();
                hours.push(WeatherHour {
                    ts,
                    ghi_whm2: Some(ghi),
                    t2m_c: Some(24.0 + 5.0 * diurnal + 3.0 * seasonal),
                    ws10_ms: Some(wind_base + 0.8 * diurnal.max(0.0)),
                });
            }
        }
        hours
    }
}

impl Default for ClearSkySource {
    fn default() -> Self {
        Self::new(42)
    }
}

impl WeatherSource for ClearSkySource {
    async fn fetch(&self, request: &WeatherRequest) -> Result<Vec<WeatherHour>, FetchError> {
        let hours = self.generate(request);
        if hours.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(hours)
    }
}

/// Cosine of the solar zenith from Spencer declination and equation of time.
///
/// `frac_hour` shifts the sample within the UTC hour starting at `utc`.
fn cos_zenith(lat: f64, lon: f64, utc: NaiveDateTime, frac_hour: f64) -> f64 {
    let b = 2.0 * PI * (f64::from(utc.ordinal()) - 1.0) / 365.0;
    let decl = 0.006918 - 0.399912 * b.cos() + 0.070257 * b.sin() - 0.006758 * (2.0 * b).cos()
        + 0.000907 * (2.0 * b).sin()
        - 0.002697 * (3.0 * b).cos()
        + 0.00148 * (3.0 * b).sin();
    let eot_min = 229.18
        * (0.000075 + 0.001868 * b.cos()
            - 0.032077 * b.sin()
            - 0.014615 * (2.0 * b).cos()
            - 0.04089 * (2.0 * b).sin());
    let utc_h = f64::from(utc.hour()) + frac_hour;
    let solar_h = utc_h + (4.0 * lon + eot_min) / 60.0;
    let hour_angle = (15.0 * (solar_h - 12.0)).to_radians();
    let phi = lat.to_radians();
    phi.sin() * decl.sin() + phi.cos() * decl.cos() * hour_angle.cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(start: (i32, u32, u32), end: (i32, u32, u32)) -> WeatherRequest {
        WeatherRequest {
            zone_id: "TST-0001".to_string(),
            lat: 12.97,
            lon: 77.59,
            start: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap_or_default(),
            tz: chrono_tz::Asia::Kolkata,
        }
    }

    #[test]
    fn parses_power_body_to_local_time() {
        let body = json!({
            "properties": {"parameter": {
                "ALLSKY_SFC_SW_DWN": {"2023010100": 0.0, "2023010106": 512.5},
                "T2M": {"2023010100": 17.2, "2023010106": -999.0},
                "WS10M": {"2023010100": 1.5, "2023010106": 2.5}
            }}
        });
        let hours = parse_power_response(&body, chrono_tz::Asia::Kolkata);
        assert!(hours.is_ok(), "{hours:?}");
        let hours = hours.unwrap_or_default();
        assert_eq!(hours.len(), 2);
        let first = NaiveDate::from_ymd_opt(2023, 1, 1).and_then(|d| d.and_hms_opt(5, 30, 0));
        assert_eq!(Some(hours[0].ts), first);
        assert_eq!(hours[1].ghi_whm2, Some(512.5));
        assert_eq!(hours[1].t2m_c, None, "fill value must become missing");
        assert_eq!(hours[1].ws10_ms, Some(2.5));
    }

    #[test]
    fn dst_zone_keys_follow_civil_time() {
        // 2023-03-12: New York springs forward at 07:00 UTC
        let body = json!({
            "properties": {"parameter": {
                "T2M": {"2023031206": 1.0, "2023031207": 2.0, "2023070112": 25.0}
            }}
        });
        let hours = parse_power_response(&body, chrono_tz::America::New_York).unwrap();
        let local = |m, d, h| NaiveDate::from_ymd_opt(2023, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap();
        assert_eq!(hours[0].ts, local(3, 12, 1));
        assert_eq!(hours[1].ts, local(3, 12, 3));
        // summer keys are UTC-4, not the winter UTC-5
        assert_eq!(hours[2].ts, local(7, 1, 8));
    }

    #[test]
    fn clear_sky_skips_nonexistent_local_hour() {
        let req = WeatherRequest {
            zone_id: "NYC-0001".to_string(),
            lat: 40.71,
            lon: -74.0,
            start: NaiveDate::from_ymd_opt(2023, 3, 12).unwrap(),
            end: NaiveDate::from_ymd_opt(2023, 3, 12).unwrap(),
            tz: chrono_tz::America::New_York,
        };
        let hours = ClearSkySource::default().generate(&req);
        assert_eq!(hours.len(), 23);
        assert!(hours.iter().all(|h| h.ts.hour() != 2));
        // solar noon near 13:00 EDT, so 12:00 local beats 09:00 local
        let at = |h: u32| hours.iter().find(|x| x.ts.hour() == h).and_then(|x| x.ghi_whm2).unwrap();
        assert!(at(12) > at(9));
    }

    #[test]
    fn empty_parameter_block_is_empty_error() {
        let body = json!({"properties": {"parameter": {}}});
        assert_eq!(parse_power_response(&body, Tz::UTC), Err(FetchError::Empty));
        assert_eq!(parse_power_response(&json!({"messages": []}), Tz::UTC), Err(FetchError::Empty));
    }

    #[test]
    fn malformed_key_is_decode_error() {
        let body = json!({"properties": {"parameter": {"T2M": {"2023-01-01": 10.0}}}});
        assert!(matches!(parse_power_response(&body, Tz::UTC), Err(FetchError::Decode(_))));
    }

    #[test]
    fn clear_sky_is_deterministic_and_daylit_at_noon() {
        let src = ClearSkySource::new(7);
        let req = request((2023, 3, 1), (2023, 3, 2));
        let a = src.generate(&req);
        let b = src.generate(&req);
        assert_eq!(a, b);
        assert_eq!(a.len(), 48);
        let noon = a[12].ghi_whm2.unwrap_or(0.0);
        let midnight = a[0].ghi_whm2.unwrap_or(-1.0);
        assert!(noon > 500.0 && noon < 1000.0, "noon ghi {noon}");
        assert_eq!(midnight, 0.0);
    }

    #[test]
    fn clear_sky_daily_insolation_is_plausible() {
        let src = ClearSkySource::default();
        let hours = src.generate(&request((2023, 1, 1), (2023, 12, 31)));
        let total: f64 = hours.iter().filter_map(|h| h.ghi_whm2).sum();
        let per_day_kwh = total / 365.0 / 1000.0;
        assert!((3.5..6.5).contains(&per_day_kwh), "mean daily GHI {per_day_kwh} kWh/m²");
    }
}
