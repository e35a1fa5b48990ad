//! Heart-rate summary analysis
//!
//! Readings outside the physiologically plausible band are discarded before
//! averaging. The average is then bucketed into low / normal / high.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest plausible reading in beats per minute
pub const MIN_VALID_BPM: f64 = 30.0;
/// Highest plausible reading in beats per minute
pub const MAX_VALID_BPM: f64 = 200.0;

const LOW_THRESHOLD_BPM: f64 = 60.0;
const HIGH_THRESHOLD_BPM: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartRateStatus {
    Low,
    Normal,
    High,
}

impl fmt::Display for HeartRateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HeartRateStatus::Low => "low",
            HeartRateStatus::Normal => "normal",
            HeartRateStatus::High => "high",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateAnalysis {
    pub average_heart_rate: f64,
    pub status: HeartRateStatus,
    pub message: String,
}

/// Keep readings within `MIN_VALID_BPM..=MAX_VALID_BPM`
pub fn valid_heart_rates(readings: &[f64]) -> Vec<f64> {
    readings
        .iter()
        .copied()
        .filter(|bpm| (MIN_VALID_BPM..=MAX_VALID_BPM).contains(bpm))
        .collect()
}

/// Summarize readings that are already known to be valid
///
/// Returns `None` for an empty slice.
pub fn analyze_heart_rate(valid: &[f64]) -> Option<HeartRateAnalysis> {
    if valid.is_empty() {
        return None;
    }

    let average = valid.iter().sum::<f64>() / valid.len() as f64;
    let status = if average > HIGH_THRESHOLD_BPM {
        HeartRateStatus::High
    } else if average < LOW_THRESHOLD_BPM {
        HeartRateStatus::Low
    } else {
        HeartRateStatus::Normal
    };

    Some(HeartRateAnalysis {
        average_heart_rate: average,
        status,
        message: format!(
            "The average heart rate is {:.2}, which is considered {}.",
            average, status
        ),
    })
}
