pub mod aqi;

pub use aqi::{Aqi, AqiBand, AqiCategory, AqiTable};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{HourlyRecord, Parameter, Pollutant, Source, WeatherField};
use crate::storage::HourlyStore;

const PM25: Parameter = Parameter::Pollutant(Pollutant::Pm25);
const TEMPERATURE: Parameter = Parameter::Weather(WeatherField::Temperature);

/// Upper bound on trailing windows, in days.
pub const MAX_WINDOW_DAYS: i64 = 365;

#[derive(Debug, Clone, Serialize)]
pub struct LatestReading {
    pub record: HourlyRecord,
    pub pm25_source: Option<Source>,
    pub aqi: Option<Aqi>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp_utc: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; `None` with fewer than two values.
    pub std_dev: Option<f64>,
}

impl ValueStats {
    fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let std_dev = (values.len() > 1).then(|| {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1.0)).sqrt()
        });

        Some(Self {
            mean,
            min,
            max,
            std_dev,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    /// Records with pm25 present.
    pub records: usize,
    pub first_hour: Option<DateTime<Utc>>,
    pub last_hour: Option<DateTime<Utc>>,
    pub pm25: Option<ValueStats>,
    pub aqi_distribution: Vec<(AqiCategory, usize)>,
}

impl Statistics {
    pub fn summary(&self) -> String {
        let range = match (self.first_hour, self.last_hour) {
            (Some(first), Some(last)) => format!("{} to {}", first, last),
            _ => "no data".to_string(),
        };
        let pm25 = match &self.pm25 {
            Some(stats) => format!(
                "mean {:.1}, min {:.1}, max {:.1}, std {}",
                stats.mean,
                stats.min,
                stats.max,
                stats
                    .std_dev
                    .map(|s| format!("{:.1}", s))
                    .unwrap_or_else(|| "n/a".to_string())
            ),
            None => "no measurements".to_string(),
        };
        let distribution = self
            .aqi_distribution
            .iter()
            .map(|(category, count)| format!("  {}: {}", category, count))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Records with PM2.5: {}\nRange: {}\nPM2.5 (µg/m³): {}\nAQI distribution:\n{}",
            self.records, range, pm25, distribution
        )
    }
}

/// Averages per hour-of-day or per month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PatternBucket {
    pub key: u32,
    pub avg_pm25: f64,
    pub avg_temperature: Option<f64>,
    pub count: usize,
}

#[derive(Default)]
struct PatternAccumulator {
    pm25_sum: f64,
    temp_sum: f64,
    temp_count: usize,
    count: usize,
}

/// Read-only views over the unified table.
pub struct QueryService {
    records: Vec<HourlyRecord>,
    aqi: AqiTable,
}

impl QueryService {
    /// `records` are sorted by hour then location before use.
    pub fn new(mut records: Vec<HourlyRecord>, aqi: AqiTable) -> Self {
        records.sort_by(|a, b| {
            a.timestamp_utc
                .cmp(&b.timestamp_utc)
                .then_with(|| a.location.cmp(&b.location))
        });
        Self { records, aqi }
    }

    pub fn from_store<S: HourlyStore>(store: &S, aqi: AqiTable) -> Result<Self> {
        Ok(Self::new(store.load_all()?, aqi))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent record with pm25 present and a completeness score of at least `min_completeness`.
    pub fn latest_complete(&self, min_completeness: f64) -> Option<LatestReading> {
        self.records
            .iter()
            .rev()
            .find(|r| r.pm25.is_present() && r.completeness_score >= min_completeness)
            .map(|record| LatestReading {
                pm25_source: record.pm25_source(),
                aqi: record.pm25.value.and_then(|v| self.aqi.compute(v)),
                record: record.clone(),
            })
    }

    /// Values of `parameter` over the trailing `days`, measured back from the
    /// last hour where the parameter is present.
    pub fn time_series(&self, parameter: Parameter, days: i64) -> Vec<SeriesPoint> {
        let Some(cutoff) = self.window_start(parameter, days) else {
            return Vec::new();
        };

        self.records
            .iter()
            .filter(|r| r.timestamp_utc >= cutoff)
            .filter_map(|r| {
                r.value(parameter).map(|value| SeriesPoint {
                    timestamp_utc: r.timestamp_utc,
                    value,
                })
            })
            .collect()
    }

    pub fn daily_aggregates(&self, parameter: Parameter, days: i64) -> Vec<DailyAggregate> {
        let mut by_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for point in self.time_series(parameter, days) {
            by_day
                .entry(point.timestamp_utc.date_naive())
                .or_default()
                .push(point.value);
        }

        by_day
            .into_iter()
            .filter_map(|(date, values)| {
                ValueStats::from_values(&values).map(|stats| DailyAggregate {
                    date,
                    avg: stats.mean,
                    min: stats.min,
                    max: stats.max,
                    count: values.len(),
                })
            })
            .collect()
    }

    pub fn statistics(&self) -> Statistics {
        let with_pm25: Vec<&HourlyRecord> =
            self.records.iter().filter(|r| r.pm25.is_present()).collect();
        let values: Vec<f64> = with_pm25.iter().filter_map(|r| r.pm25.value).collect();

        let mut distribution: BTreeMap<AqiCategory, usize> = BTreeMap::new();
        for value in &values {
            if let Some(category) = self.aqi.category(*value) {
                *distribution.entry(category).or_default() += 1;
            }
        }

        Statistics {
            records: with_pm25.len(),
            first_hour: with_pm25.first().map(|r| r.timestamp_utc),
            last_hour: with_pm25.last().map(|r| r.timestamp_utc),
            pm25: ValueStats::from_values(&values),
            aqi_distribution: distribution.into_iter().collect(),
        }
    }

    pub fn hourly_pattern(&self) -> Vec<PatternBucket> {
        self.pattern(|r| r.features.hour)
    }

    pub fn monthly_pattern(&self) -> Vec<PatternBucket> {
        self.pattern(|r| r.features.month)
    }

    fn pattern<F>(&self, key: F) -> Vec<PatternBucket>
    where
        F: Fn(&HourlyRecord) -> u32,
    {
        let mut buckets: BTreeMap<u32, PatternAccumulator> = BTreeMap::new();
        for record in &self.records {
            let Some(pm25) = record.value(PM25) else {
                continue;
            };
            let acc = buckets.entry(key(record)).or_default();
            acc.pm25_sum += pm25;
            acc.count += 1;
            if let Some(temp) = record.value(TEMPERATURE) {
                acc.temp_sum += temp;
                acc.temp_count += 1;
            }
        }

        buckets
            .into_iter()
            .map(|(key, acc)| PatternBucket {
                key,
                avg_pm25: acc.pm25_sum / acc.count as f64,
                avg_temperature: (acc.temp_count > 0)
                    .then(|| acc.temp_sum / acc.temp_count as f64),
                count: acc.count,
            })
            .collect()
    }

    fn window_start(&self, parameter: Parameter, days: i64) -> Option<DateTime<Utc>> {
        let last = self
            .records
            .iter()
            .rev()
            .find(|r| r.slot(parameter).is_present())?
            .timestamp_utc;
        Some(last - Duration::days(days.clamp(0, MAX_WINDOW_DAYS)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn record(day: u32, hour: u32, pm25: Option<f64>, temp: Option<f64>, score: f64) -> HourlyRecord {
        let ts = Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap();
        let mut record = HourlyRecord::new(ts, "Astana");
        if let Some(v) = pm25 {
            record.pm25 = crate::models::Slot::new(v, Source::GroundStation);
        }
        if let Some(v) = temp {
            record.temperature = crate::models::Slot::new(v, Source::WeatherArchive);
        }
        record.completeness_score = score;
        record
    }

    fn service() -> QueryService {
        QueryService::new(
            vec![
                record(3, 12, None, Some(-8.0), 0.2),
                record(1, 0, Some(10.0), Some(-10.0), 0.9),
                record(1, 1, Some(20.0), None, 0.3),
                record(2, 0, Some(40.0), Some(-12.0), 0.7),
            ],
            AqiTable::default(),
        )
    }

    #[test]
    fn test_latest_complete_respects_threshold() {
        let service = service();

        let latest = service.latest_complete(0.5).unwrap();
        assert_eq!(latest.record.features.day_of_month, 2);
        assert_eq!(latest.pm25_source, Some(Source::GroundStation));
        assert_eq!(
            latest.aqi.unwrap().category,
            AqiCategory::UnhealthyForSensitiveGroups
        );

        assert_eq!(
            service.latest_complete(0.8).unwrap().record.pm25.value,
            Some(10.0)
        );
        assert!(service.latest_complete(0.95).is_none());
    }

    #[test]
    fn test_time_series_window_anchored_on_parameter() {
        let service = service();

        // last pm25 is 2024-01-02 00:00, so a one-day window keeps day 1 00:00 onward
        let series = service.time_series(PM25, 1);
        let values: Vec<f64> = series.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![10.0, 20.0, 40.0]);

        // temperature extends to day 3
        let temps = service.time_series(TEMPERATURE, 1);
        assert_eq!(temps.len(), 1);
        assert_eq!(temps[0].value, -8.0);
    }

    #[test]
    fn test_daily_aggregates() {
        let daily = service().daily_aggregates(PM25, 30);
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(daily[0].avg, 15.0);
        assert_eq!(daily[0].min, 10.0);
        assert_eq!(daily[0].max, 20.0);
        assert_eq!(daily[0].count, 2);
        assert_eq!(daily[1].count, 1);
    }

    #[test]
    fn test_statistics() {
        let stats = service().statistics();
        assert_eq!(stats.records, 3);
        assert_eq!(
            stats.first_hour,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );

        let pm25 = stats.pm25.unwrap();
        assert!((pm25.mean - 70.0 / 3.0).abs() < 1e-9);
        assert_eq!(pm25.min, 10.0);
        assert_eq!(pm25.max, 40.0);
        assert!((pm25.std_dev.unwrap() - 15.275252316519467).abs() < 1e-9);

        assert_eq!(
            stats.aqi_distribution,
            vec![
                (AqiCategory::Good, 1),
                (AqiCategory::Moderate, 1),
                (AqiCategory::UnhealthyForSensitiveGroups, 1),
            ]
        );
        assert!(stats.summary().contains("Records with PM2.5: 3"));
    }

    #[test]
    fn test_patterns() {
        let service = service();

        let hourly = service.hourly_pattern();
        assert_eq!(hourly.len(), 2);
        assert_eq!(hourly[0].key, 0);
        assert_eq!(hourly[0].avg_pm25, 25.0);
        assert_eq!(hourly[0].avg_temperature, Some(-11.0));
        assert_eq!(hourly[1].avg_temperature, None);

        let monthly = service.monthly_pattern();
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].key, 1);
        assert_eq!(monthly[0].count, 3);
    }

    #[test]
    fn test_empty_service() {
        let service = QueryService::new(Vec::new(), AqiTable::default());
        assert!(service.is_empty());
        assert!(service.latest_complete(0.0).is_none());
        assert!(service.time_series(PM25, 7).is_empty());
        assert_eq!(service.statistics().pm25, None);
    }
}
