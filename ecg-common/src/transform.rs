//! Transform Pipeline
//!
//! Maps raw observations to plotting-ready samples and drops every sample
//! whose second-of-minute was already seen earlier in the series.
//!
//! The filter is a stable single pass: later samples sharing a second with
//! an earlier one are dropped entirely (never merged or averaged), and
//! samples without a recognizable second always pass through.

use crate::RawObservation;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Seconds field of an extended ISO-8601 timestamp, with optional fraction
static SECOND_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"T.*:(\d{2})(\.\d+)?").expect("static regex"));

/// One sample of the transformed sequence
///
/// Serialized as `{"time": index, "value": value, "seconds": second}` for
/// both the bulk response and streaming frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformedSample {
    /// Position in the source series before dedup
    #[serde(rename = "time")]
    pub index: usize,

    pub value: f64,

    /// Second-of-minute, `None` when the timestamp did not match
    #[serde(rename = "seconds")]
    pub second: Option<u8>,
}

/// Extract the second-of-minute from a timestamp
///
/// Returns `None` when the timestamp has no `T..:SS` portion or the captured
/// value is not a valid second (0-59).
pub fn extract_second(timestamp: &str) -> Option<u8> {
    let caps = SECOND_PATTERN.captures(timestamp)?;
    let second: u8 = caps.get(1)?.as_str().parse().ok()?;
    (second <= 59).then_some(second)
}

/// Transform a raw series into the deduplicated sample sequence
pub fn transform(series: &[RawObservation]) -> Vec<TransformedSample> {
    let mut seen: HashSet<u8> = HashSet::new();

    series
        .iter()
        .enumerate()
        .map(|(index, obs)| TransformedSample {
            index,
            value: obs.value(),
            second: extract_second(&obs.effective_date_time),
        })
        .filter(|sample| match sample.second {
            Some(second) => seen.insert(second),
            None => true,
        })
        .collect()
}
