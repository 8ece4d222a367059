use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceId;

/// Comparison operator for state conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    /// Apply the operator to two JSON values. Ordering operators only
    /// apply to numbers; mismatched types evaluate to false.
    pub fn apply(&self, left: &serde_json::Value, right: &serde_json::Value) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Ne => left != right,
            Self::Gt | Self::Ge | Self::Lt | Self::Le => {
                let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
                    return false;
                };
                match self {
                    Self::Gt => l > r,
                    Self::Ge => l >= r,
                    Self::Lt => l < r,
                    Self::Le => l <= r,
                    _ => unreachable!(),
                }
            }
        }
    }
}

/// Sun event a window can be anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SunAnchor {
    Sunrise,
    Sunset,
}

/// Sunrise/sunset instants for the current day, supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SunTimes {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

impl SunTimes {
    pub fn anchor(&self, anchor: SunAnchor) -> DateTime<Utc> {
        match anchor {
            SunAnchor::Sunrise => self.sunrise,
            SunAnchor::Sunset => self.sunset,
        }
    }
}

/// A single boolean predicate. Conditions are always combined with AND
/// semantics by the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Compare a device state property against a literal value
    StateCompare {
        device_id: DeviceId,
        property: String,
        op: CompareOp,
        value: serde_json::Value,
    },

    /// Current house mode equals the given mode
    ModeIs { mode: String },

    /// Current house mode is one of the given modes
    ModeIn { modes: Vec<String> },

    /// Time-of-day window, optionally restricted to ISO weekdays
    /// (1 = Monday .. 7 = Sunday). `after > before` wraps overnight.
    TimeWindow {
        after: NaiveTime,
        before: NaiveTime,
        #[serde(skip_serializing_if = "Option::is_none")]
        days: Option<Vec<u32>>,
    },

    /// Window between two sun anchors, each shifted by minutes
    /// (negative = earlier).
    SunWindow {
        after: SunAnchor,
        #[serde(default)]
        after_offset_min: i64,
        before: SunAnchor,
        #[serde(default)]
        before_offset_min: i64,
    },
}
