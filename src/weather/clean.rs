//! Gap filling and outlier clipping for raw hourly series.

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};

use super::source::WeatherHour;
use crate::config::WeatherConfig;
use crate::stats::quantile_nearest;

/// Cleaning parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleaningParams {
    /// Longest run of missing hours that is forward-filled.
    pub max_fill_hours: usize,
    /// Lower clipping quantile.
    pub lower_q: f64,
    /// Upper clipping quantile.
    pub upper_q: f64,
}

impl Default for CleaningParams {
    fn default() -> Self {
        Self {
            max_fill_hours: 3,
            lower_q: 0.01,
            upper_q: 0.99,
        }
    }
}

impl From<&WeatherConfig> for CleaningParams {
    fn from(w: &WeatherConfig) -> Self {
        Self {
            max_fill_hours: w.max_fill_hours,
            lower_q: w.winsor_lower,
            upper_q: w.winsor_upper,
        }
    }
}

/// Cleans a raw series.
///
/// Steps, in order: reindex to a strict hourly grid from the first to the
/// last timestamp, forward-fill short gaps, clamp irradiance at zero, then
/// clip each column to its nearest-rank quantiles. Applying it twice yields
/// the same series.
pub fn clean_series(raw: &[WeatherHour], params: &CleaningParams) -> Vec<WeatherHour> {
    let mut hours = reindex_hourly(raw);

    let mut ghi: Vec<Option<f64>> = hours.iter().map(|h| h.ghi_whm2).collect();
    let mut temp: Vec<Option<f64>> = hours.iter().map(|h| h.t2m_c).collect();
    let mut wind: Vec<Option<f64>> = hours.iter().map(|h| h.ws10_ms).collect();

    for col in [&mut ghi, &mut temp, &mut wind] {
        forward_fill_limited(col, params.max_fill_hours);
    }
    for v in ghi.iter_mut().flatten() {
        *v = v.max(0.0);
    }
    for col in [&mut ghi, &mut temp, &mut wind] {
        winsorize(col, params.lower_q, params.upper_q);
    }

    for (i, h) in hours.iter_mut().enumerate() {
        h.ghi_whm2 = ghi[i];
        h.t2m_c = temp[i];
        h.ws10_ms = wind[i];
    }
    hours
}

/// Strict hourly series between the first and last timestamps.
///
/// Missing hours become all-`None` rows; duplicate timestamps keep the last
/// record; records off the hourly grid of the first timestamp are dropped.
pub fn reindex_hourly(raw: &[WeatherHour]) -> Vec<WeatherHour> {
    let by_ts: HashMap<NaiveDateTime, WeatherHour> = raw.iter().map(|h| (h.ts, *h)).collect();
    let (Some(first), Some(last)) = (by_ts.keys().min().copied(), by_ts.keys().max().copied())
    else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut ts = first;
    while ts <= last {
        out.push(by_ts.get(&ts).copied().unwrap_or(WeatherHour {
            ts,
            ghi_whm2: None,
            t2m_c: None,
            ws10_ms: None,
        }));
        ts += Duration::hours(1);
    }
    out
}

/// Fills runs of `None` no longer than `limit` with the preceding value.
///
/// Longer runs, and runs with no preceding value, are left untouched.
pub fn forward_fill_limited(values: &mut [Option<f64>], limit: usize) {
    let mut i = 0;
    while i < values.len() {
        if values[i].is_some() {
            i += 1;
            continue;
        }
        let start = i;
        while i < values.len() && values[i].is_none() {
            i += 1;
        }
        let run = i - start;
        if run > limit || start == 0 {
            continue;
        }
        let fill = values[start - 1];
        for v in &mut values[start..i] {
            *v = fill;
        }
    }
}

/// Clips present values to the nearest-rank `lower`/`upper` quantiles.
pub fn winsorize(values: &mut [Option<f64>], lower: f64, upper: f64) {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let (Some(lo), Some(hi)) = (
        quantile_nearest(&present, lower),
        quantile_nearest(&present, upper),
    ) else {
        return;
    };
    for v in values.iter_mut().flatten() {
        *v = v.clamp(lo, hi);
    }
}
