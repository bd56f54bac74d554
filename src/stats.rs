//! Aggregate and trend statistics over a window of measurements
//!
//! Everything here is a pure function of the slice it is handed; callers pick
//! the window (row-count via `Database::get_recent`, calendar via
//! [`filter_by_period`]).

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::models::Measurement;

/// Period used for the display moving average
pub const DEFAULT_MOVING_AVERAGE_PERIOD: usize = 7;

/// Distance from the target that counts as "reached"
pub const GOAL_TOLERANCE_KG: f64 = 0.5;

/// Direction of change between the oldest and latest value of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    /// Exact comparison: any difference at all is a direction
    pub fn between(oldest: f64, latest: f64) -> Self {
        if latest > oldest {
            Trend::Up
        } else if latest < oldest {
            Trend::Down
        } else {
            Trend::Flat
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Flat => "flat",
        };
        f.write_str(label)
    }
}

/// Body-fat figures, computed over records that have a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyFatSummary {
    pub avg: f64,
    pub max: f64,
    pub min: f64,
    /// Most recent non-absent value
    pub latest: f64,
    /// Number of records in the window that carried a value
    pub count: usize,
}

/// Summary statistics for a measurement window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub count: usize,
    pub weight_avg: f64,
    pub weight_max: f64,
    pub weight_min: f64,
    pub weight_latest: f64,
    pub weight_oldest: f64,
    /// `weight_latest - weight_oldest`
    pub weight_change: f64,
    pub trend: Trend,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub body_fat: Option<BodyFatSummary>,
}

/// One point of a moving-average series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovingAveragePoint {
    pub date: NaiveDate,
    pub weight: f64,
    pub weight_ma: f64,
    pub body_fat: Option<f64>,
    pub body_fat_ma: Option<f64>,
}

/// Suggested default values for the next entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedValues {
    pub weight: f64,
    pub body_fat: Option<f64>,
}

/// Progress toward the target weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalProgress {
    pub start_weight: f64,
    pub current_weight: f64,
    pub target_weight: f64,
    /// `current - target`; positive means weight still to lose
    pub remaining: f64,
    pub achieved: bool,
    /// Fraction of the start→target distance covered, clamped to [0, 1]
    pub progress: f64,
}

impl GoalProgress {
    pub fn compute(start_weight: f64, current_weight: f64, target_weight: f64) -> Self {
        let remaining = current_weight - target_weight;

        let progress = if start_weight == target_weight {
            1.0
        } else {
            ((start_weight - current_weight) / (start_weight - target_weight)).clamp(0.0, 1.0)
        };

        Self {
            start_weight,
            current_weight,
            target_weight,
            remaining,
            achieved: remaining.abs() <= GOAL_TOLERANCE_KG,
            progress,
        }
    }
}

/// Statistics calculator for measurement windows
pub struct StatsCalculator;

impl StatsCalculator {
    /// Summarize a window ordered oldest first.
    ///
    /// Returns `None` for an empty window.
    pub fn summarize(window: &[Measurement]) -> Option<StatsSummary> {
        let (oldest, latest) = (window.first()?, window.last()?);

        let weights: Vec<f64> = window.iter().map(|m| m.weight).collect();

        let body_fat = Self::summarize_body_fat(window);

        Some(StatsSummary {
            count: window.len(),
            weight_avg: weights.iter().mean(),
            weight_max: Statistics::max(weights.iter()),
            weight_min: Statistics::min(weights.iter()),
            weight_latest: latest.weight,
            weight_oldest: oldest.weight,
            weight_change: latest.weight - oldest.weight,
            trend: Trend::between(oldest.weight, latest.weight),
            first_date: oldest.date,
            last_date: latest.date,
            body_fat,
        })
    }

    fn summarize_body_fat(window: &[Measurement]) -> Option<BodyFatSummary> {
        let values: Vec<f64> = window.iter().filter_map(|m| m.body_fat).collect();
        let latest = *values.last()?;

        Some(BodyFatSummary {
            avg: values.iter().mean(),
            max: Statistics::max(values.iter()),
            min: Statistics::min(values.iter()),
            latest,
            count: values.len(),
        })
    }

    /// Trailing moving average over up to `period` consecutive records.
    ///
    /// The first points use whatever prefix exists, so the series has one
    /// entry per input record. Body fat averages only the values present in
    /// each window.
    pub fn moving_average(series: &[Measurement], period: usize) -> Vec<MovingAveragePoint> {
        let period = period.max(1);

        series
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let start = (i + 1).saturating_sub(period);
                let window = &series[start..=i];

                let weight_ma = window.iter().map(|w| w.weight).mean();
                let body_fats: Vec<f64> = window.iter().filter_map(|w| w.body_fat).collect();
                let body_fat_ma = if body_fats.is_empty() {
                    None
                } else {
                    Some(body_fats.iter().mean())
                };

                MovingAveragePoint {
                    date: m.date,
                    weight: m.weight,
                    weight_ma,
                    body_fat: m.body_fat,
                    body_fat_ma,
                }
            })
            .collect()
    }

    /// Mean of the window rounded to one decimal, as a suggested next value
    pub fn recommended_values(window: &[Measurement]) -> Option<RecommendedValues> {
        if window.is_empty() {
            return None;
        }

        let weight = round_one_decimal(window.iter().map(|m| m.weight).mean());
        let body_fats: Vec<f64> = window.iter().filter_map(|m| m.body_fat).collect();
        let body_fat = if body_fats.is_empty() {
            None
        } else {
            Some(round_one_decimal(body_fats.iter().mean()))
        };

        Some(RecommendedValues { weight, body_fat })
    }

    /// Goal progress using the oldest record of the last `period_days` as the start
    pub fn goal_progress(
        history: &[Measurement],
        target_weight: f64,
        period_days: u32,
    ) -> Option<GoalProgress> {
        let current = history.last()?;
        let start = filter_by_period(history, Some(period_days))
            .first()
            .copied()
            .unwrap_or(current);

        Some(GoalProgress::compute(start.weight, current.weight, target_weight))
    }
}

/// Keep the records dated within `days` calendar days of the latest record.
///
/// This is a date-range filter, unlike the row-count windows used for
/// statistics. `None` keeps everything.
pub fn filter_by_period(series: &[Measurement], days: Option<u32>) -> Vec<&Measurement> {
    let (Some(days), Some(latest)) = (days, series.last()) else {
        return series.iter().collect();
    };

    let span = u64::from(days.saturating_sub(1));
    let start = latest
        .date
        .checked_sub_days(Days::new(span))
        .unwrap_or(NaiveDate::MIN);

    series.iter().filter(|m| m.date >= start).collect()
}

/// Body-mass index for a weight in kg and a height in cm
pub fn bmi(weight_kg: f64, height_cm: f64) -> Option<f64> {
    if height_cm <= 0.0 {
        return None;
    }
    let height_m = height_cm / 100.0;
    Some(weight_kg / (height_m * height_m))
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn measurement(day: u32, weight: f64, body_fat: Option<f64>) -> Measurement {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Days::new(day as u64);
        Measurement {
            id: day as i64 + 1,
            date,
            weight,
            body_fat,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_summarize_empty_window() {
        assert!(StatsCalculator::summarize(&[]).is_none());
    }

    #[test]
    fn test_summarize_weights() {
        let window = vec![
            measurement(0, 72.0, None),
            measurement(1, 74.0, None),
            measurement(2, 70.0, None),
            measurement(3, 71.0, None),
        ];

        let stats = StatsCalculator::summarize(&window).unwrap();
        assert_eq!(stats.count, 4);
        assert!((stats.weight_avg - 71.75).abs() < 1e-9);
        assert_eq!(stats.weight_max, 74.0);
        assert_eq!(stats.weight_min, 70.0);
        assert_eq!(stats.weight_latest, 71.0);
        assert_eq!(stats.weight_oldest, 72.0);
        assert_eq!(stats.weight_change, -1.0);
        assert_eq!(stats.trend, Trend::Down);
        assert!(stats.body_fat.is_none());
    }

    #[test]
    fn test_trend_semantics() {
        assert_eq!(Trend::between(70.0, 70.0), Trend::Flat);
        assert_eq!(Trend::between(70.0, 70.1), Trend::Up);
        assert_eq!(Trend::between(70.0, 69.9), Trend::Down);

        let single = vec![measurement(0, 68.0, None)];
        let stats = StatsCalculator::summarize(&single).unwrap();
        assert_eq!(stats.trend, Trend::Flat);
        assert_eq!(stats.weight_change, 0.0);
    }

    #[test]
    fn test_body_fat_uses_present_values_only() {
        let window = vec![
            measurement(0, 72.0, Some(20.0)),
            measurement(1, 71.5, Some(22.0)),
            measurement(2, 71.0, None),
        ];

        let stats = StatsCalculator::summarize(&window).unwrap();
        let body_fat = stats.body_fat.unwrap();
        assert_eq!(body_fat.avg, 21.0);
        assert_eq!(body_fat.max, 22.0);
        assert_eq!(body_fat.min, 20.0);
        // Latest value comes from an older record than weight_latest
        assert_eq!(body_fat.latest, 22.0);
        assert_eq!(body_fat.count, 2);
        assert_eq!(stats.weight_latest, 71.0);
    }

    #[test]
    fn test_moving_average_prefix_and_window() {
        let series: Vec<_> = (0..10).map(|d| measurement(d, 70.0 + d as f64, None)).collect();
        let ma = StatsCalculator::moving_average(&series, 7);

        assert_eq!(ma.len(), 10);
        assert_eq!(ma[0].weight_ma, 70.0);
        assert_eq!(ma[1].weight_ma, 70.5);
        // Full window at index 6: mean of 70..=76
        assert!((ma[6].weight_ma - 73.0).abs() < 1e-9);
        // Index 9 covers 73..=79
        assert!((ma[9].weight_ma - 76.0).abs() < 1e-9);
        assert!(ma.windows(2).all(|w| w[1].weight_ma >= w[0].weight_ma));
    }

    #[test]
    fn test_moving_average_body_fat_gaps() {
        let series = vec![
            measurement(0, 70.0, None),
            measurement(1, 70.0, Some(20.0)),
            measurement(2, 70.0, None),
            measurement(3, 70.0, Some(22.0)),
        ];
        let ma = StatsCalculator::moving_average(&series, 7);

        assert_eq!(ma[0].body_fat_ma, None);
        assert_eq!(ma[1].body_fat_ma, Some(20.0));
        assert_eq!(ma[2].body_fat_ma, Some(20.0));
        assert_eq!(ma[3].body_fat_ma, Some(21.0));
    }

    #[test]
    fn test_filter_by_period() {
        let series: Vec<_> = (0..40).map(|d| measurement(d, 70.0, None)).collect();

        assert_eq!(filter_by_period(&series, Some(7)).len(), 7);
        assert_eq!(filter_by_period(&series, Some(30)).len(), 30);
        assert_eq!(filter_by_period(&series, None).len(), 40);
        assert!(filter_by_period(&[], Some(7)).is_empty());

        // Gaps in the series shrink the result, unlike a row-count window
        let sparse = vec![measurement(0, 70.0, None), measurement(20, 70.0, None)];
        assert_eq!(filter_by_period(&sparse, Some(7)).len(), 1);
    }

    #[test]
    fn test_recommended_values() {
        let window = vec![
            measurement(0, 70.04, Some(18.0)),
            measurement(1, 70.16, None),
        ];
        let rec = StatsCalculator::recommended_values(&window).unwrap();
        assert_eq!(rec.weight, 70.1);
        assert_eq!(rec.body_fat, Some(18.0));
        assert!(StatsCalculator::recommended_values(&[]).is_none());
    }

    #[test]
    fn test_goal_progress() {
        let progress = GoalProgress::compute(80.0, 75.0, 70.0);
        assert_eq!(progress.remaining, 5.0);
        assert!(!progress.achieved);
        assert!((progress.progress - 0.5).abs() < 1e-9);

        // Moving away from the target clamps to zero
        let progress = GoalProgress::compute(80.0, 82.0, 70.0);
        assert_eq!(progress.progress, 0.0);

        let progress = GoalProgress::compute(70.0, 70.3, 70.0);
        assert!(progress.achieved);
        assert_eq!(progress.progress, 1.0);
    }

    #[test]
    fn test_goal_progress_from_history() {
        let history: Vec<_> = (0..45).map(|d| measurement(d, 90.0 - d as f64 * 0.2, None)).collect();
        let progress = StatsCalculator::goal_progress(&history, 70.0, 30).unwrap();

        // Start is the oldest record of the last 30 days (day 15)
        assert!((progress.start_weight - 87.0).abs() < 1e-9);
        assert!((progress.current_weight - 81.2).abs() < 1e-9);
        assert!(StatsCalculator::goal_progress(&[], 70.0, 30).is_none());
    }

    #[test]
    fn test_bmi() {
        let value = bmi(72.25, 170.0).unwrap();
        assert!((value - 25.0).abs() < 1e-9);
        assert!(bmi(70.0, 0.0).is_none());
    }
}
