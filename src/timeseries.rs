//! Historical aggregation for charting.
//!
//! Takes the flat rows returned by the datastore for one window, keeps the
//! valid values for the selected sensor, groups them into fixed-width local
//! time buckets and averages each bucket. A whole-window summary is computed
//! from the same valid values, independent of bucketing.
//!
//! The pipeline per call:
//! 1. correct the mislabeled timestamps to tower local time
//! 2. drop readings that are missing or of the wrong type
//! 3. bucket by hour (`day`), half-day (`week`) or calendar day (`month`)
//! 4. label each bucket
//! 5. fall back to raw subsampling when no bucket is populated
//! 6. compute summary statistics
//!
//! Every call is independent: no state is kept between calls and the output
//! depends only on the arguments, `now` included.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::localtime;
use crate::models::{SensorKey, SensorRecord, SensorValue};

// ---

/// Label of the synthetic point returned when there is nothing to chart.
pub const NO_DATA_LABEL: &str = "No Data";

/// Upper bound on points produced by fallback subsampling.
pub const MAX_FALLBACK_POINTS: usize = 10;

/// Lookback span and bucket granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    /// Last 24 hours, hourly buckets
    Day,
    /// Last 7 days, AM/PM buckets
    Week,
    /// Last 30 days, daily buckets
    Month,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 3] = [TimeWindow::Day, TimeWindow::Week, TimeWindow::Month];

    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
        }
    }

    pub fn bucket_width(self) -> Duration {
        match self {
            TimeWindow::Day => Duration::hours(1),
            TimeWindow::Week => Duration::hours(12),
            TimeWindow::Month => Duration::days(1),
        }
    }

    /// Number of buckets covering the window, the current one included.
    pub fn bucket_count(self) -> i32 {
        match self {
            TimeWindow::Day => 24,
            TimeWindow::Week => 14,
            TimeWindow::Month => 30,
        }
    }

    /// Start of the bucket containing `at`. Buckets are aligned to local midnight.
    pub fn bucket_start(self, at: NaiveDateTime) -> NaiveDateTime {
        // ---
        let midnight = at.date().and_time(NaiveTime::MIN);
        match self {
            TimeWindow::Day => midnight + Duration::hours(i64::from(at.hour())),
            TimeWindow::Week if at.hour() >= 12 => midnight + Duration::hours(12),
            TimeWindow::Week | TimeWindow::Month => midnight,
        }
    }

    /// First and last bucket starts of the window ending at local `now`.
    pub fn horizon(self, now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        let last = self.bucket_start(now);
        let first = last - self.bucket_width() * (self.bucket_count() - 1);
        (first, last)
    }

    /// Earliest local time that can land in a bucket.
    pub fn horizon_start(self, now: NaiveDateTime) -> NaiveDateTime {
        self.horizon(now).0
    }

    /// `14:00`, `Jan 15 AM` or `Jan 15` depending on the window.
    pub fn label(self, at: NaiveDateTime) -> String {
        match self {
            TimeWindow::Day => localtime::hour_label(at),
            TimeWindow::Week => localtime::date_label(at, true),
            TimeWindow::Month => localtime::date_label(at, false),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeWindow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        TimeWindow::ALL
            .into_iter()
            .find(|window| window.as_str() == s)
            .ok_or_else(|| Error::UnknownWindow {
                window: s.to_string(),
            })
    }
}

// ---

/// One chart point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedPoint {
    pub label: String,
    pub value: f64,
}

/// Whole-window summary over every valid reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStatistics {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
}

impl SeriesStatistics {
    fn empty() -> Self {
        Self {
            count: 0,
            average: 0.0,
            min: 0.0,
            max: 0.0,
            unit: "",
        }
    }

    fn from_samples(samples: &[Sample], key: SensorKey) -> Self {
        // ---
        if samples.is_empty() {
            return Self::empty();
        }

        let (sum, min, max) = samples.iter().fold(
            (0.0, f64::INFINITY, f64::NEG_INFINITY),
            |(sum, min, max), s| (sum + s.value, min.min(s.value), max.max(s.value)),
        );

        Self {
            count: samples.len(),
            average: sum / samples.len() as f64,
            min,
            max,
            unit: key.unit(),
        }
    }
}

/// Result of one aggregation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    /// Points in ascending time order
    pub points: Vec<AggregatedPoint>,
    pub statistics: SeriesStatistics,
    /// Set when the points are raw subsamples rather than bucket averages
    pub sampled: bool,
}

impl Aggregation {
    fn empty() -> Self {
        Self {
            points: vec![AggregatedPoint {
                label: NO_DATA_LABEL.to_string(),
                value: 0.0,
            }],
            statistics: SeriesStatistics::empty(),
            sampled: false,
        }
    }

    pub fn labels(&self) -> Vec<String> {
        self.points.iter().map(|p| p.label.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.statistics.count == 0
    }
}

// ---

/// Aggregate `records` for `key` over `window`, ending at local time `now`.
///
/// `now` is tower wall-clock time (see [`localtime::local_now`]). Rows
/// with an unparseable timestamp or an invalid value for `key` are skipped.
/// With nothing valid left the result is a single `No Data` point with zero
/// statistics.
pub fn aggregate(
    records: &[SensorRecord],
    key: SensorKey,
    window: TimeWindow,
    now: NaiveDateTime,
) -> Aggregation {
    // ---
    let samples = valid_samples(records, key);
    debug!(
        "Aggregating {} over {}: {} valid of {} records",
        key,
        window,
        samples.len(),
        records.len()
    );

    if samples.is_empty() {
        return Aggregation::empty();
    }

    let statistics = SeriesStatistics::from_samples(&samples, key);
    let buckets = bucketize(&samples, window, now);

    if buckets.is_empty() {
        debug!(
            "No {} bucket populated for {}, subsampling {} raw readings",
            window,
            key,
            samples.len()
        );
        return Aggregation {
            points: subsample(&samples, window),
            statistics,
            sampled: true,
        };
    }

    debug!("Populated {} {} buckets for {}", buckets.len(), window, key);
    let points = buckets
        .into_iter()
        .map(|(start, mean)| AggregatedPoint {
            label: window.label(start),
            value: mean.value(),
        })
        .collect();

    Aggregation {
        points,
        statistics,
        sampled: false,
    }
}

/// Valid reading with its corrected timestamp.
#[derive(Debug, Clone, Copy)]
struct Sample {
    at: NaiveDateTime,
    value: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: u32,
}

impl Mean {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn value(&self) -> f64 {
        self.sum / f64::from(self.count)
    }
}

fn valid_samples(records: &[SensorRecord], key: SensorKey) -> Vec<Sample> {
    // ---
    records
        .iter()
        .filter_map(|record| {
            let value = coerce(key, record.value(key)?)?;
            let at = record.local_time()?;
            Some(Sample { at, value })
        })
        .collect()
}

/// Chartable numeric value for `key`, or `None` if the reading is invalid.
///
/// Presence flags become `1`/`0`. EC must be positive since `0` is the
/// bridge's placeholder for "no probe reading". Non-finite numbers are
/// never valid.
fn coerce(key: SensorKey, value: SensorValue) -> Option<f64> {
    // ---
    match value {
        SensorValue::Flag(flag) if key.is_flag() => Some(if flag { 1.0 } else { 0.0 }),
        SensorValue::Flag(_) => None,
        SensorValue::Number(_) if key.is_flag() => None,
        SensorValue::Number(n) if !n.is_finite() => None,
        SensorValue::Number(n) if key == SensorKey::EcLevel && n <= 0.0 => None,
        SensorValue::Number(n) => Some(n),
    }
}

/// Group samples by bucket start, keeping only buckets inside the window.
fn bucketize(
    samples: &[Sample],
    window: TimeWindow,
    now: NaiveDateTime,
) -> BTreeMap<NaiveDateTime, Mean> {
    // ---
    let (first, last) = window.horizon(now);
    let mut buckets: BTreeMap<NaiveDateTime, Mean> = BTreeMap::new();

    for sample in samples {
        let start = window.bucket_start(sample.at);
        if start < first || start > last {
            continue;
        }
        buckets.entry(start).or_default().push(sample.value);
    }

    buckets
}

/// Every `ceil(n / 10)`-th sample, labelled by its own timestamp.
fn subsample(samples: &[Sample], window: TimeWindow) -> Vec<AggregatedPoint> {
    // ---
    let stride = samples.len().div_ceil(MAX_FALLBACK_POINTS).max(1);

    samples
        .iter()
        .step_by(stride)
        .map(|sample| AggregatedPoint {
            label: window.label(sample.at),
            value: sample.value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::NaiveDate;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    /// Datastore-style timestamp string for a local wall-clock time.
    fn stamp(at: NaiveDateTime) -> String {
        at.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
    }

    fn reading(at: NaiveDateTime, key: SensorKey, value: impl Into<SensorValue>) -> SensorRecord {
        SensorRecord::at(stamp(at)).with(key, value)
    }

    #[test]
    fn test_window_parsing() {
        // ---
        assert_eq!("day".parse::<TimeWindow>(), Ok(TimeWindow::Day));
        assert_eq!("week".parse::<TimeWindow>(), Ok(TimeWindow::Week));
        assert_eq!("month".parse::<TimeWindow>(), Ok(TimeWindow::Month));
        assert_eq!(
            "year".parse::<TimeWindow>(),
            Err(Error::UnknownWindow {
                window: "year".to_string()
            })
        );
    }

    #[test]
    fn test_horizons() {
        // ---
        let now = local(2024, 6, 15, 14, 30);

        assert_eq!(
            TimeWindow::Day.horizon(now),
            (local(2024, 6, 14, 15, 0), local(2024, 6, 15, 14, 0))
        );
        assert_eq!(
            TimeWindow::Week.horizon(now),
            (local(2024, 6, 9, 0, 0), local(2024, 6, 15, 12, 0))
        );
        assert_eq!(
            TimeWindow::Month.horizon(now),
            (local(2024, 5, 17, 0, 0), local(2024, 6, 15, 0, 0))
        );
    }

    #[test]
    fn test_empty_input_yields_no_data() {
        // ---
        let result = aggregate(&[], SensorKey::WaterTemp, TimeWindow::Day, local(2024, 6, 15, 12, 0));

        assert_eq!(result.labels(), vec![NO_DATA_LABEL.to_string()]);
        assert_eq!(result.values(), vec![0.0]);
        assert_eq!(result.statistics.count, 0);
        assert_eq!(result.statistics.unit, "");
        assert!(result.is_empty());
        assert!(!result.sampled);
    }

    #[test]
    fn test_all_invalid_yields_no_data() {
        // ---
        let now = local(2024, 6, 15, 12, 0);
        let records = vec![
            reading(now, SensorKey::PhLevel, 6.0),
            SensorRecord::at("not a timestamp").with(SensorKey::WaterTemp, 20.0),
        ];

        let result = aggregate(&records, SensorKey::WaterTemp, TimeWindow::Day, now);
        assert_eq!(result.labels(), vec![NO_DATA_LABEL.to_string()]);
        assert_eq!(result.statistics, SeriesStatistics::empty());
    }

    #[test]
    fn test_day_hourly_round_trip() {
        // ---
        let now = local(2024, 6, 15, 14, 30);
        let records: Vec<SensorRecord> = (0..24)
            .map(|i| reading(now - Duration::hours(i), SensorKey::WaterTemp, 10.0 + i as f64))
            .collect();

        let result = aggregate(&records, SensorKey::WaterTemp, TimeWindow::Day, now);

        assert!(!result.sampled);
        assert_eq!(result.points.len(), 24);
        // Oldest first: the reading 23 hours back carries 33.0
        let expected: Vec<f64> = (0..24).rev().map(|i| 10.0 + i as f64).collect();
        assert_eq!(result.values(), expected);
        assert_eq!(result.points[0].label, "15:00");
        assert_eq!(result.points[23].label, "14:00");
    }

    #[test]
    fn test_bucket_average() {
        // ---
        let now = local(2024, 6, 15, 14, 30);
        let records = vec![
            reading(local(2024, 6, 15, 9, 5), SensorKey::Humidity, 10.0),
            reading(local(2024, 6, 15, 9, 25), SensorKey::Humidity, 20.0),
            reading(local(2024, 6, 15, 9, 55), SensorKey::Humidity, 30.0),
        ];

        let result = aggregate(&records, SensorKey::Humidity, TimeWindow::Day, now);

        assert_eq!(result.points.len(), 1);
        assert_eq!(result.points[0].label, "09:00");
        assert_eq!(result.points[0].value, 20.0);
    }

    #[test]
    fn test_water_level_flags_are_averaged() {
        // ---
        let now = local(2024, 6, 15, 14, 30);
        let records = vec![
            reading(local(2024, 6, 15, 13, 0), SensorKey::WaterLevel, true),
            reading(local(2024, 6, 15, 13, 10), SensorKey::WaterLevel, false),
            reading(local(2024, 6, 15, 13, 20), SensorKey::WaterLevel, true),
        ];

        let result = aggregate(&records, SensorKey::WaterLevel, TimeWindow::Day, now);

        assert_eq!(result.points.len(), 1);
        assert!((result.points[0].value - 0.6667).abs() < 1e-3);
        assert_eq!(result.statistics.count, 3);
        assert_eq!(result.statistics.min, 0.0);
        assert_eq!(result.statistics.max, 1.0);
        assert_eq!(result.statistics.unit, "");
    }

    #[test]
    fn test_ec_zero_is_placeholder_only_for_ec() {
        // ---
        let now = local(2024, 6, 15, 14, 30);
        let records = vec![
            SensorRecord::at(stamp(local(2024, 6, 15, 10, 0)))
                .with(SensorKey::EcLevel, 0.0)
                .with(SensorKey::WaterTemp, 20.0),
            SensorRecord::at(stamp(local(2024, 6, 15, 11, 0)))
                .with(SensorKey::EcLevel, 1.6)
                .with(SensorKey::WaterTemp, 21.0),
        ];

        let ec = aggregate(&records, SensorKey::EcLevel, TimeWindow::Day, now);
        assert_eq!(ec.statistics.count, 1);
        assert_eq!(ec.statistics.min, 1.6);
        assert_eq!(ec.labels(), vec!["11:00".to_string()]);
        assert_eq!(ec.statistics.unit, "mS/cm");

        let temp = aggregate(&records, SensorKey::WaterTemp, TimeWindow::Day, now);
        assert_eq!(temp.statistics.count, 2);
        assert_eq!(temp.points.len(), 2);
    }

    #[test]
    fn test_zero_and_negative_accepted_for_other_sensors() {
        // ---
        let now = local(2024, 1, 10, 8, 0);
        let records = vec![
            reading(local(2024, 1, 10, 6, 0), SensorKey::EnvTemp, -4.0),
            reading(local(2024, 1, 10, 7, 0), SensorKey::EnvTemp, 0.0),
        ];

        let result = aggregate(&records, SensorKey::EnvTemp, TimeWindow::Day, now);
        assert_eq!(result.statistics.count, 2);
        assert_eq!(result.statistics.min, -4.0);
        assert_eq!(result.statistics.average, -2.0);
        assert_eq!(result.statistics.unit, "°C");
    }

    #[test]
    fn test_timestamp_is_not_shifted() {
        // ---
        let now = local(2024, 6, 15, 16, 0);
        let records = vec![SensorRecord::at("2024-06-15T14:30:00Z").with(SensorKey::PhLevel, 6.1)];

        let result = aggregate(&records, SensorKey::PhLevel, TimeWindow::Day, now);
        assert_eq!(result.labels(), vec!["14:00".to_string()]);

        // Same reading seen long after the window: fallback labels the raw time
        let later = aggregate(&records, SensorKey::PhLevel, TimeWindow::Day, local(2024, 7, 1, 0, 0));
        assert!(later.sampled);
        assert_eq!(later.labels(), vec!["14:30".to_string()]);
    }

    #[test]
    fn test_week_buckets_sort_chronologically() {
        // ---
        let now = local(2024, 1, 10, 20, 0);
        let records = vec![
            reading(local(2024, 1, 10, 6, 0), SensorKey::Co2Level, 900.0),
            reading(local(2024, 1, 9, 18, 0), SensorKey::Co2Level, 700.0),
            reading(local(2024, 1, 9, 23, 0), SensorKey::Co2Level, 800.0),
            reading(local(2024, 1, 10, 12, 0), SensorKey::Co2Level, 1000.0),
        ];

        let result = aggregate(&records, SensorKey::Co2Level, TimeWindow::Week, now);

        assert_eq!(
            result.labels(),
            vec!["Jan 9 PM", "Jan 10 AM", "Jan 10 PM"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
        assert_eq!(result.values(), vec![750.0, 900.0, 1000.0]);
    }

    #[test]
    fn test_month_daily_buckets() {
        // ---
        let now = local(2024, 2, 20, 9, 0);
        let records = vec![
            reading(local(2024, 1, 15, 10, 0), SensorKey::LightLevel, 100.0), // outside
            reading(local(2024, 1, 25, 8, 0), SensorKey::LightLevel, 200.0),
            reading(local(2024, 1, 25, 20, 0), SensorKey::LightLevel, 400.0),
            reading(local(2024, 2, 20, 8, 0), SensorKey::LightLevel, 50.0),
        ];

        let result = aggregate(&records, SensorKey::LightLevel, TimeWindow::Month, now);

        assert!(!result.sampled);
        assert_eq!(
            result.labels(),
            vec!["Jan 25".to_string(), "Feb 20".to_string()]
        );
        assert_eq!(result.values(), vec![300.0, 50.0]);

        // Statistics cover every valid reading, bucketed or not
        assert_eq!(result.statistics.count, 4);
        assert_eq!(result.statistics.min, 50.0);
        assert_eq!(result.statistics.max, 400.0);
        assert_eq!(result.statistics.average, 187.5);
        assert_eq!(result.statistics.unit, "lux");
    }

    #[test]
    fn test_future_readings_are_not_bucketed() {
        // ---
        let now = local(2024, 6, 15, 12, 0);
        let records = vec![
            reading(local(2024, 6, 15, 11, 0), SensorKey::WaterTemp, 20.0),
            reading(local(2024, 6, 15, 15, 0), SensorKey::WaterTemp, 30.0),
        ];

        let result = aggregate(&records, SensorKey::WaterTemp, TimeWindow::Day, now);
        assert_eq!(result.values(), vec![20.0]);
        assert_eq!(result.statistics.count, 2);
    }

    #[test]
    fn test_fallback_subsamples_raw_readings() {
        // ---
        let now = local(2024, 6, 15, 12, 0);
        let start = local(2024, 4, 1, 0, 0);
        let records: Vec<SensorRecord> = (0..37)
            .map(|i| reading(start + Duration::minutes(i * 7), SensorKey::WaterTemp, i as f64))
            .collect();

        let result = aggregate(&records, SensorKey::WaterTemp, TimeWindow::Month, now);

        assert!(result.sampled);
        assert!(result.points.len() <= MAX_FALLBACK_POINTS);
        assert_eq!(result.points.len(), 10);
        // stride = ceil(37 / 10) = 4, values are raw, never averaged
        let expected: Vec<f64> = (0..37).step_by(4).map(|i| i as f64).collect();
        assert_eq!(result.values(), expected);
        assert!(result.labels().iter().all(|l| l == "Apr 1"));
        assert_eq!(result.statistics.count, 37);
    }

    #[test]
    fn test_fallback_small_input_keeps_every_reading() {
        // ---
        let now = local(2024, 6, 15, 12, 0);
        let records = vec![
            reading(local(2023, 1, 1, 1, 0), SensorKey::EnvTemp, 1.0),
            reading(local(2023, 1, 1, 2, 0), SensorKey::EnvTemp, 2.0),
            reading(local(2023, 1, 1, 3, 0), SensorKey::EnvTemp, 3.0),
        ];

        let result = aggregate(&records, SensorKey::EnvTemp, TimeWindow::Week, now);
        assert!(result.sampled);
        assert_eq!(result.values(), vec![1.0, 2.0, 3.0]);
        assert_eq!(result.points[0].label, "Jan 1 AM");
    }

    #[test]
    fn test_non_finite_values_are_dropped() {
        // ---
        let now = local(2024, 6, 15, 12, 0);
        let records = vec![
            reading(local(2024, 6, 15, 11, 0), SensorKey::Humidity, f64::NAN),
            reading(local(2024, 6, 15, 11, 30), SensorKey::Humidity, 60.0),
        ];

        let result = aggregate(&records, SensorKey::Humidity, TimeWindow::Day, now);
        assert_eq!(result.statistics.count, 1);
        assert_eq!(result.values(), vec![60.0]);
    }

    #[test]
    fn test_aggregation_is_repeatable() {
        // ---
        let now = local(2024, 6, 15, 14, 30);
        let records: Vec<SensorRecord> = (0..200)
            .map(|i| {
                let at = now - Duration::minutes(i * 37);
                SensorRecord::at(stamp(at))
                    .with(SensorKey::PhLevel, 5.5 + (i % 13) as f64 * 0.1)
                    .with(SensorKey::WaterLevel, i % 3 != 0)
            })
            .collect();

        for window in TimeWindow::ALL {
            for key in [SensorKey::PhLevel, SensorKey::WaterLevel] {
                let first = aggregate(&records, key, window, now);
                let second = aggregate(&records, key, window, now);
                assert_eq!(first, second);
                let bits = |a: &Aggregation| a.values().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
                assert_eq!(bits(&first), bits(&second));
            }
        }
    }
}
