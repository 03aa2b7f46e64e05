//! Core metric types shared by the parser, the store and the emitters.

pub mod calculate;
pub mod store;

use std::cmp::Ordering;

use anyhow::{bail, Result};

/// The four StatsD metric families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Timer,
    Gauge,
    Set,
}

/// One parsed metric sample.
///
/// `value` is meaningless for Set samples; `set_member` is `Some` only for
/// them. `gauge_has_sign` records whether the raw gauge value carried an
/// explicit `+` or `-`; the sign stays on `value` either way.
#[derive(Debug, Clone)]
pub struct Sample {
    pub bucket: String,
    pub kind: MetricKind,
    pub value: f64,
    pub set_member: Option<String>,
    pub gauge_has_sign: bool,
    pub sampling: f64,
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.bucket == other.bucket
            && self.kind == other.kind
            && floats_equal(self.value, other.value)
            && self.set_member == other.set_member
            && self.gauge_has_sign == other.gauge_has_sign
            && floats_equal(self.sampling, other.sampling)
    }
}

impl Eq for Sample {}

/// Bit-level float equality under the IEEE-754 total order.
///
/// `-0.0 != 0.0` and `NaN == NaN` here, which is what sample and summary
/// comparisons in tests want.
pub fn floats_equal(a: f64, b: f64) -> bool {
    a.total_cmp(&b) == Ordering::Equal
}

/// Formats a float as its shortest round-trippable decimal, never in
/// scientific notation.
pub fn format_float(value: f64) -> String {
    format!("{value}")
}

/// Which tail of the sorted point sequence a percentile threshold selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tail {
    Upper,
    Lower,
}

/// A percentile threshold with the tail selector carried as data.
///
/// Built from the signed configuration value: positive selects the upper
/// slice, negative the lower one. Zero has no tail and is rejected at
/// construction, as are magnitudes outside (0, 100].
#[derive(Debug, Clone, PartialEq)]
pub struct Percentile {
    tail: Tail,
    magnitude: f64,
    label: String,
}

impl Percentile {
    /// Builds a percentile from its signed wire value.
    pub fn from_signed(value: f64) -> Result<Self> {
        if !value.is_finite() {
            bail!("percentile must be finite, got {}", format_float(value));
        }

        if value == 0.0 {
            bail!("percentile 0 selects no tail");
        }

        let magnitude = value.abs();
        if magnitude > 100.0 {
            bail!(
                "percentile magnitude must be at most 100, got {}",
                format_float(value)
            );
        }

        let tail = if value < 0.0 { Tail::Lower } else { Tail::Upper };

        Ok(Self {
            tail,
            magnitude,
            label: percentile_label(value),
        })
    }

    pub fn tail(&self) -> Tail {
        self.tail
    }

    /// The absolute percentile, in (0, 100].
    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    /// The wire label: `90`, `99_5`, `top50`.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Derives the wire label from the signed value: shortest decimal with
/// `.` replaced by `_` and `-` by `top`.
fn percentile_label(value: f64) -> String {
    format_float(value).replace('.', "_").replace('-', "top")
}
