//! StatsD wire-format parsing.
//!
//! Turns one received payload into typed [`Sample`]s plus one error per
//! malformed line. The parser is pure and never panics; every failure mode
//! maps to a [`ParseError`] variant.

use thiserror::Error;

use crate::metric::{MetricKind, Sample};

/// Errors produced while parsing a single metric line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("wrong metric format: {line:?}")]
    WrongFormat { line: String },

    #[error("empty bucket or value: {line:?}")]
    EmptyBucketOrValue { line: String },

    #[error("unknown metric type {kind:?}: {line:?}")]
    UnknownType { kind: String, line: String },

    #[error("bad numeric value {value:?}: {line:?}")]
    BadValue { value: String, line: String },

    #[error("bad sampling rate {sampling:?}: {line:?}")]
    BadSampling { sampling: String, line: String },
}

/// Parses a payload of newline-delimited metric lines.
///
/// Empty lines are skipped. Every non-empty line contributes exactly one
/// sample or exactly one error, so
/// `samples.len() + errors.len()` equals the number of non-empty lines.
pub fn parse(payload: &str) -> (Vec<Sample>, Vec<ParseError>) {
    let mut samples = Vec::new();
    let mut errors = Vec::new();

    for line in payload.split('\n') {
        if line.is_empty() {
            continue;
        }

        match parse_line(line) {
            Ok(sample) => samples.push(sample),
            Err(err) => errors.push(err),
        }
    }

    (samples, errors)
}

/// Parses one `bucket:value|type[|@sampling]` line.
///
/// The bucket is everything up to the last `:`, so bucket names may
/// themselves contain colons.
fn parse_line(line: &str) -> Result<Sample, ParseError> {
    let Some((bucket, rest)) = line.rsplit_once(':') else {
        return Err(ParseError::WrongFormat {
            line: line.to_string(),
        });
    };

    let mut fields = rest.split('|');
    let value_field = fields.next().unwrap_or("");
    let Some(kind_field) = fields.next() else {
        return Err(ParseError::WrongFormat {
            line: line.to_string(),
        });
    };
    let sampling_field = fields.next();
    if fields.next().is_some() {
        return Err(ParseError::WrongFormat {
            line: line.to_string(),
        });
    }

    if bucket.is_empty() || value_field.is_empty() {
        return Err(ParseError::EmptyBucketOrValue {
            line: line.to_string(),
        });
    }

    let kind = match kind_field {
        "c" => MetricKind::Counter,
        "ms" => MetricKind::Timer,
        "g" => MetricKind::Gauge,
        "s" => MetricKind::Set,
        _ => {
            return Err(ParseError::UnknownType {
                kind: kind_field.to_string(),
                line: line.to_string(),
            })
        }
    };

    if !is_plain_decimal(value_field) {
        return Err(ParseError::BadValue {
            value: value_field.to_string(),
            line: line.to_string(),
        });
    }

    let sampling = match sampling_field {
        Some(field) => parse_sampling(field, line)?,
        None => 1.0,
    };

    if kind == MetricKind::Set {
        return Ok(Sample {
            bucket: bucket.to_string(),
            kind,
            value: 0.0,
            set_member: Some(value_field.to_string()),
            gauge_has_sign: false,
            sampling,
        });
    }

    let value: f64 = value_field.parse().map_err(|_| ParseError::BadValue {
        value: value_field.to_string(),
        line: line.to_string(),
    })?;

    if !value.is_finite() {
        return Err(ParseError::BadValue {
            value: value_field.to_string(),
            line: line.to_string(),
        });
    }

    let gauge_has_sign =
        kind == MetricKind::Gauge && value_field.starts_with(['+', '-']);

    Ok(Sample {
        bucket: bucket.to_string(),
        kind,
        value,
        set_member: None,
        gauge_has_sign,
        sampling,
    })
}

/// Parses and validates the `@rate` suffix. The rate must be a finite
/// decimal in (0, 1]; anything else would corrupt the 1/rate multiplier.
fn parse_sampling(field: &str, line: &str) -> Result<f64, ParseError> {
    let bad = || ParseError::BadSampling {
        sampling: field.to_string(),
        line: line.to_string(),
    };

    let raw = field.strip_prefix('@').ok_or_else(|| ParseError::WrongFormat {
        line: line.to_string(),
    })?;

    if !is_plain_decimal(raw) {
        return Err(bad());
    }

    let sampling: f64 = raw.parse().map_err(|_| bad())?;
    if !sampling.is_finite() || sampling <= 0.0 || sampling > 1.0 {
        return Err(bad());
    }

    Ok(sampling)
}

/// Checks the `[+-]?digits[.digits]` value shape: an optional sign, at
/// least one integer digit, at most one dot, no exponent.
fn is_plain_decimal(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (digits, None),
    };

    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    match frac_part {
        Some(frac) => frac.bytes().all(|b| b.is_ascii_digit()),
        None => true,
    }
}
