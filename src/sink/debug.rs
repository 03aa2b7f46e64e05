//! Human-readable flush dumps for operators.

use tracing::info;

use crate::metric::calculate::{FlushSummary, TimerSummary};
use crate::metric::{format_float, Tail};

/// Logs every flush summary in a deterministic, per-family layout.
pub struct DebugEmitter;

impl DebugEmitter {
    pub fn name(&self) -> &str {
        "debug"
    }

    pub fn emit(&self, summary: &FlushSummary) {
        info!("flush summary\n{}", render(summary));
    }
}

/// Renders the summary with buckets ascending within each family.
pub fn render(summary: &FlushSummary) -> String {
    let mut out = String::from("Counters:\n");

    for (bucket, counter) in &summary.counters {
        out.push_str(&format!(
            "{bucket}: value: {}, rate: {}\n",
            format_float(counter.value),
            format_float(counter.rate)
        ));
    }

    out.push_str("Timers:\n");
    for (bucket, timer) in &summary.timers {
        out.push_str(&render_timer(bucket, timer));
        out.push('\n');
    }

    out.push_str("Gauges:\n");
    for (bucket, value) in &summary.gauges {
        out.push_str(&format!("{bucket}: {}\n", format_float(*value)));
    }

    out.push_str("Sets:\n");
    for (bucket, cardinality) in &summary.sets {
        out.push_str(&format!("{bucket}: {cardinality}\n"));
    }

    out
}

fn render_timer(bucket: &str, timer: &TimerSummary) -> String {
    let points: Vec<String> = timer.points.iter().map(|p| format_float(*p)).collect();

    let mut line = format!(
        "{bucket}: [{}], lower: {}, upper: {}, count: {}, count per second: {}, \
         sum: {}, mean: {}, median: {}, standard deviation: {}",
        points.join(", "),
        format_float(timer.lower),
        format_float(timer.upper),
        format_float(timer.count),
        format_float(timer.count_per_second),
        format_float(timer.sum),
        format_float(timer.mean),
        format_float(timer.median),
        format_float(timer.std_dev),
    );

    let slices: Vec<String> = timer
        .percentiles
        .iter()
        .map(|slice| {
            let boundary_name = match slice.threshold.tail() {
                Tail::Upper => "upper",
                Tail::Lower => "lower",
            };
            format!(
                "{}: count: {}, {boundary_name}: {}, sum: {}, mean: {}",
                slice.threshold.label(),
                slice.count,
                format_float(slice.boundary),
                format_float(slice.sum),
                format_float(slice.mean),
            )
        })
        .collect();

    line.push_str(&format!(", percentiles: [{}]", slices.join("; ")));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::calculate::{CounterSummary, PercentileSummary};
    use crate::metric::Percentile;

    #[test]
    fn test_render_is_sorted_and_deterministic() {
        let mut summary = FlushSummary::default();
        summary
            .counters
            .insert("zeta".to_string(), CounterSummary { value: 1.0, rate: 0.1 });
        summary
            .counters
            .insert("alpha".to_string(), CounterSummary { value: 2.0, rate: 0.2 });
        summary.gauges.insert("g".to_string(), 5.0);
        summary.sets.insert("s".to_string(), 2);

        let first = render(&summary);
        let second = render(&summary);
        assert_eq!(first, second);

        let alpha = first.find("alpha:").expect("alpha line");
        let zeta = first.find("zeta:").expect("zeta line");
        assert!(alpha < zeta);

        assert!(first.contains("alpha: value: 2, rate: 0.2\n"));
        assert!(first.contains("g: 5\n"));
        assert!(first.contains("s: 2\n"));
    }

    #[test]
    fn test_render_timer_with_percentiles() {
        let mut summary = FlushSummary::default();
        summary.timers.insert(
            "req".to_string(),
            TimerSummary {
                points: vec![0.5, 3.1],
                lower: 0.5,
                upper: 3.1,
                count: 2.0,
                count_per_second: 0.2,
                sum: 3.6,
                mean: 1.8,
                median: 1.8,
                std_dev: 1.3,
                percentiles: vec![PercentileSummary {
                    threshold: Percentile::from_signed(-50.0).unwrap(),
                    count: 1,
                    boundary: 3.1,
                    sum: 3.1,
                    mean: 3.1,
                }],
            },
        );

        let rendered = render(&summary);
        assert!(rendered.contains("req: [0.5, 3.1], lower: 0.5, upper: 3.1"));
        assert!(rendered.contains("percentiles: [top50: count: 1, lower: 3.1, sum: 3.1, mean: 3.1]"));
    }
}
