//! Flush-time statistics over a store snapshot.
//!
//! Pure: reads the store, never mutates it. Summary maps are `BTreeMap`s
//! so every consumer iterates buckets in a deterministic order.

use std::collections::BTreeMap;

use crate::metric::store::MetricStore;
use crate::metric::{Percentile, Tail};

/// Per-counter output: the accumulated value and its per-second rate.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterSummary {
    pub value: f64,
    pub rate: f64,
}

/// One percentile slice of a timer's sorted points.
#[derive(Debug, Clone)]
pub struct PercentileSummary {
    pub threshold: Percentile,
    /// Number of points in the slice.
    pub count: usize,
    /// The slice's boundary point: its maximum for an upper slice, its
    /// minimum for a lower one.
    pub boundary: f64,
    pub sum: f64,
    pub mean: f64,
}

/// Per-timer output. All fields stay zero when no points were observed.
#[derive(Debug, Clone, Default)]
pub struct TimerSummary {
    /// The observed points, sorted ascending.
    pub points: Vec<f64>,
    pub lower: f64,
    pub upper: f64,
    /// Sampling-adjusted observation count.
    pub count: f64,
    pub count_per_second: f64,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub percentiles: Vec<PercentileSummary>,
}

/// Everything one flush emits downstream.
#[derive(Debug, Clone, Default)]
pub struct FlushSummary {
    pub counters: BTreeMap<String, CounterSummary>,
    pub timers: BTreeMap<String, TimerSummary>,
    pub gauges: BTreeMap<String, f64>,
    pub sets: BTreeMap<String, usize>,
}

/// Computes the derived summary for one flush window.
///
/// The rate divisor is the whole number of seconds in the interval
/// (integer division), matching the downstream contract.
pub fn calculate(
    store: &MetricStore,
    flush_interval_ms: u64,
    percentiles: &[Percentile],
) -> FlushSummary {
    let seconds = (flush_interval_ms / 1000) as f64;

    let mut summary = FlushSummary::default();

    for (bucket, value) in &store.counters {
        summary.counters.insert(
            bucket.clone(),
            CounterSummary {
                value: *value,
                rate: *value / seconds,
            },
        );
    }

    for (bucket, points) in &store.timers {
        let count = store.timers_count.get(bucket).copied().unwrap_or(0.0);
        summary.timers.insert(
            bucket.clone(),
            summarize_timer(points, count, seconds, percentiles),
        );
    }

    for (bucket, value) in &store.gauges {
        summary.gauges.insert(bucket.clone(), *value);
    }

    for (bucket, members) in &store.sets {
        summary.sets.insert(bucket.clone(), members.len());
    }

    summary
}

fn summarize_timer(
    points: &[f64],
    count: f64,
    seconds: f64,
    percentiles: &[Percentile],
) -> TimerSummary {
    let mut points = points.to_vec();
    points.sort_unstable_by(f64::total_cmp);
    let n = points.len();

    if n == 0 {
        return TimerSummary {
            points,
            ..TimerSummary::default()
        };
    }

    let lower = points[0];
    let upper = points[n - 1];
    let count_per_second = count / seconds;

    // Cumulative sums double as the sum and as per-slice prefix sums.
    let mut cumulative = Vec::with_capacity(n);
    cumulative.push(points[0]);
    for i in 1..n {
        cumulative.push(points[i] + cumulative[i - 1]);
    }

    let sum = cumulative[n - 1];
    let mean = sum / n as f64;

    let mid = n / 2;
    let median = if n % 2 == 1 {
        points[mid]
    } else {
        (points[mid - 1] + points[mid]) / 2.0
    };

    let mut numerator = 0.0;
    for point in &points {
        let deviation = point - mean;
        numerator += deviation * deviation;
    }
    let std_dev = (numerator / n as f64).sqrt();

    let mut slices = Vec::new();
    if n > 1 {
        for threshold in percentiles {
            let k = ((threshold.magnitude() / 100.0) * n as f64 + 0.5).floor() as usize;
            if k == 0 {
                continue;
            }

            let (boundary, slice_sum) = match threshold.tail() {
                Tail::Upper => (points[k - 1], cumulative[k - 1]),
                Tail::Lower => {
                    // The cumulative sum before the first point is zero,
                    // which covers the k == n whole-sequence slice.
                    let below = if n > k { cumulative[n - k - 1] } else { 0.0 };
                    (points[n - k], cumulative[n - 1] - below)
                }
            };

            slices.push(PercentileSummary {
                threshold: threshold.clone(),
                count: k,
                boundary,
                sum: slice_sum,
                mean: slice_sum / k as f64,
            });
        }
    }

    TimerSummary {
        points,
        lower,
        upper,
        count,
        count_per_second,
        sum,
        mean,
        median,
        std_dev,
        percentiles: slices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketMapper;
    use crate::config::Config;
    use crate::metric::floats_equal;

    const FLUSH_INTERVAL: u64 = 10_000;

    fn empty_store() -> MetricStore {
        MetricStore::new(&BucketMapper::from_config(&Config::default()))
    }

    fn thresholds(signed: &[f64]) -> Vec<Percentile> {
        signed
            .iter()
            .map(|p| Percentile::from_signed(*p).expect("valid threshold"))
            .collect()
    }

    fn assert_float(actual: f64, expected: f64, what: &str) {
        assert!(
            floats_equal(actual, expected),
            "{what}: expected {expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn test_counter_rates() {
        let mut store = empty_store();
        store.counters.insert("a.a".to_string(), 2.0);
        store.counters.insert("a.b".to_string(), 2.71);
        store.counters.insert("c".to_string(), 0.25);

        let summary = calculate(&store, FLUSH_INTERVAL, &[]);

        let expect = [("a.a", 2.0, 0.2), ("a.b", 2.71, 0.271), ("c", 0.25, 0.025)];
        for (bucket, value, rate) in expect {
            let counter = &summary.counters[bucket];
            assert_float(counter.value, value, bucket);
            assert_float(counter.rate, rate, bucket);
        }
    }

    #[test]
    fn test_timer_statistics() {
        let mut store = empty_store();
        store
            .timers
            .insert("a.a".to_string(), vec![0.7, 0.5, 3.1]);
        store.timers_count.insert("a.a".to_string(), 6.0);

        let summary = calculate(&store, FLUSH_INTERVAL, &thresholds(&[90.0, -50.0]));
        let timer = &summary.timers["a.a"];

        assert_eq!(timer.points, vec![0.5, 0.7, 3.1]);
        assert_float(timer.lower, 0.5, "lower");
        assert_float(timer.upper, 3.1, "upper");
        assert_float(timer.count, 6.0, "count");
        assert_float(timer.count_per_second, 0.6, "count_per_second");
        assert_float(timer.sum, 4.3, "sum");
        assert_float(timer.mean, 1.4333333333333333, "mean");
        assert_float(timer.median, 0.7, "median");
        assert_float(timer.std_dev, 1.1813363431112902, "std_dev");

        assert_eq!(timer.percentiles.len(), 2);

        let upper_slice = &timer.percentiles[0];
        assert_eq!(upper_slice.threshold.label(), "90");
        assert_eq!(upper_slice.count, 3);
        assert_float(upper_slice.boundary, 3.1, "p90 boundary");
        assert_float(upper_slice.sum, 4.3, "p90 sum");
        assert_float(upper_slice.mean, 1.4333333333333333, "p90 mean");

        let lower_slice = &timer.percentiles[1];
        assert_eq!(lower_slice.threshold.label(), "top50");
        assert_eq!(lower_slice.count, 2);
        assert_float(lower_slice.boundary, 0.7, "top50 boundary");
        assert_float(lower_slice.sum, 3.8, "top50 sum");
        assert_float(lower_slice.mean, 1.9, "top50 mean");
    }

    #[test]
    fn test_timer_statistics_even_count() {
        let mut store = empty_store();
        store
            .timers
            .insert("a.b".to_string(), vec![1.0, 2.0, 1.0, 0.0]);
        store.timers_count.insert("a.b".to_string(), 12.0);

        let summary = calculate(&store, FLUSH_INTERVAL, &thresholds(&[90.0, -50.0]));
        let timer = &summary.timers["a.b"];

        assert_eq!(timer.points, vec![0.0, 1.0, 1.0, 2.0]);
        assert_float(timer.lower, 0.0, "lower");
        assert_float(timer.upper, 2.0, "upper");
        assert_float(timer.count_per_second, 1.2, "count_per_second");
        assert_float(timer.sum, 4.0, "sum");
        assert_float(timer.mean, 1.0, "mean");
        assert_float(timer.median, 1.0, "median");
        assert_float(timer.std_dev, 0.7071067811865476, "std_dev");

        let upper_slice = &timer.percentiles[0];
        assert_eq!(upper_slice.count, 4);
        assert_float(upper_slice.boundary, 2.0, "p90 boundary");
        assert_float(upper_slice.sum, 4.0, "p90 sum");
        assert_float(upper_slice.mean, 1.0, "p90 mean");

        let lower_slice = &timer.percentiles[1];
        assert_eq!(lower_slice.count, 2);
        assert_float(lower_slice.boundary, 1.0, "top50 boundary");
        assert_float(lower_slice.sum, 3.0, "top50 sum");
        assert_float(lower_slice.mean, 1.5, "top50 mean");
    }

    #[test]
    fn test_single_point_timer_has_no_percentiles() {
        let mut store = empty_store();
        store.timers.insert("d".to_string(), vec![1.75]);
        store.timers_count.insert("d".to_string(), 1.0);

        let summary = calculate(&store, FLUSH_INTERVAL, &thresholds(&[90.0, -50.0]));
        let timer = &summary.timers["d"];

        assert_float(timer.lower, 1.75, "lower");
        assert_float(timer.upper, 1.75, "upper");
        assert_float(timer.sum, 1.75, "sum");
        assert_float(timer.mean, 1.75, "mean");
        assert_float(timer.median, 1.75, "median");
        assert_float(timer.std_dev, 0.0, "std_dev");
        assert_float(timer.count_per_second, 0.1, "count_per_second");
        assert!(timer.percentiles.is_empty());
    }

    #[test]
    fn test_empty_timer_emits_empty_points_only() {
        let mut store = empty_store();
        store.timers.insert("c".to_string(), Vec::new());
        store.timers_count.insert("c".to_string(), 0.0);

        let summary = calculate(&store, FLUSH_INTERVAL, &thresholds(&[90.0, -50.0]));
        let timer = &summary.timers["c"];

        assert!(timer.points.is_empty());
        assert!(timer.percentiles.is_empty());
        assert_float(timer.lower, 0.0, "lower");
        assert_float(timer.upper, 0.0, "upper");
        assert_float(timer.count, 0.0, "count");
        assert_float(timer.sum, 0.0, "sum");
    }

    #[test]
    fn test_extremes_identities() {
        let points = vec![12.5, 3.25, 8.0, 0.125, 99.0, 42.0, 7.5];
        let mut store = empty_store();
        store.timers.insert("t".to_string(), points.clone());
        store.timers_count.insert("t".to_string(), 7.0);

        let summary = calculate(&store, FLUSH_INTERVAL, &[]);
        let timer = &summary.timers["t"];

        let min = points.iter().copied().fold(f64::INFINITY, f64::min);
        let max = points.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert_float(timer.lower, min, "lower is min");
        assert_float(timer.upper, max, "upper is max");

        let mut deviations = 0.0;
        for point in &timer.points {
            let deviation = point - timer.mean;
            deviations += deviation * deviation;
        }
        assert_float(
            timer.std_dev,
            (deviations / timer.points.len() as f64).sqrt(),
            "population std-dev identity",
        );
    }

    #[test]
    fn test_lower_slice_covering_all_points() {
        // |p| = 100 selects every point; the subtrahend under the slice
        // is the empty prefix.
        let mut store = empty_store();
        store.timers.insert("t".to_string(), vec![1.0, 2.0, 3.0]);
        store.timers_count.insert("t".to_string(), 3.0);

        let summary = calculate(&store, FLUSH_INTERVAL, &thresholds(&[-100.0]));
        let slice = &summary.timers["t"].percentiles[0];

        assert_eq!(slice.count, 3);
        assert_float(slice.boundary, 1.0, "boundary");
        assert_float(slice.sum, 6.0, "sum");
        assert_float(slice.mean, 2.0, "mean");
    }

    #[test]
    fn test_tiny_slice_is_skipped() {
        // k rounds to zero for p = 1 over two points, so the threshold
        // is absent from the output.
        let mut store = empty_store();
        store.timers.insert("t".to_string(), vec![1.0, 2.0]);
        store.timers_count.insert("t".to_string(), 2.0);

        let summary = calculate(&store, FLUSH_INTERVAL, &thresholds(&[1.0, 90.0]));
        let timer = &summary.timers["t"];

        assert_eq!(timer.percentiles.len(), 1);
        assert_eq!(timer.percentiles[0].threshold.label(), "90");
    }

    #[test]
    fn test_gauges_and_sets_pass_through() {
        let mut store = empty_store();
        store.gauges.insert("g".to_string(), -3.5);
        store
            .sets
            .insert("s".to_string(), ["a", "b", "c"].map(String::from).into());

        let summary = calculate(&store, FLUSH_INTERVAL, &[]);
        assert_float(summary.gauges["g"], -3.5, "gauge value");
        assert_eq!(summary.sets["s"], 3);
    }

    #[test]
    fn test_summary_iterates_in_bucket_order() {
        let mut store = empty_store();
        for bucket in ["zeta", "alpha", "mid"] {
            store.counters.insert(bucket.to_string(), 1.0);
        }

        let summary = calculate(&store, FLUSH_INTERVAL, &[]);
        let order: Vec<&str> = summary
            .counters
            .keys()
            .filter(|k| !k.starts_with("statsd."))
            .map(String::as_str)
            .collect();
        assert_eq!(order, vec!["alpha", "mid", "zeta"]);
    }
}
