//! Observation record schema
//!
//! The canonical artifact is a JSON array of FHIR `Observation` resources as
//! written by the external transformer. Only the fields the service reads are
//! modelled; everything else in the resource is ignored on parse.

use serde::{Deserialize, Serialize};

/// A fully loaded canonical series, in source order
pub type Series = Vec<RawObservation>;

/// One ingested sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    /// Resource id (sequence number in transformer output)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Resource status, normally "final"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Extended ISO-8601 timestamp, e.g. `2024-12-23T00:00:12.34Z`
    #[serde(rename = "effectiveDateTime")]
    pub effective_date_time: String,

    /// Measured quantity
    #[serde(rename = "valueQuantity")]
    pub value_quantity: ValueQuantity,
}

/// Numeric quantity carried by an observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueQuantity {
    pub value: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl RawObservation {
    /// Build a bare observation from a timestamp and value
    pub fn new(effective_date_time: impl Into<String>, value: f64) -> Self {
        Self {
            id: None,
            status: None,
            effective_date_time: effective_date_time.into(),
            value_quantity: ValueQuantity { value, unit: None },
        }
    }

    /// Numeric value of the observation
    pub fn value(&self) -> f64 {
        self.value_quantity.value
    }
}
