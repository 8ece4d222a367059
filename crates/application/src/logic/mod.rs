//! Pure condition evaluation against a caller-supplied snapshot.

use std::sync::RwLock;

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use domain::condition::{Condition, SunTimes};
use domain::device::DeviceId;

/// Read-only view of current device state, supplied by the caller so the
/// evaluator stays free of IO.
pub trait StateView: Send + Sync {
    fn property(&self, device_id: &DeviceId, property: &str) -> Option<serde_json::Value>;
}

impl StateView for std::collections::HashMap<(DeviceId, String), serde_json::Value> {
    fn property(&self, device_id: &DeviceId, property: &str) -> Option<serde_json::Value> {
        self.get(&(device_id.clone(), property.to_string())).cloned()
    }
}

/// Supplies today's sunrise/sunset. `None` when no ephemeris is
/// configured; sun-window conditions then evaluate to false.
pub trait SunProvider: Send + Sync {
    fn today(&self) -> Option<SunTimes>;
}

/// Fixed sun times, for sites with a static table and for tests.
pub struct FixedSun(pub SunTimes);

impl SunProvider for FixedSun {
    fn today(&self) -> Option<SunTimes> {
        Some(self.0)
    }
}

/// No ephemeris configured; sun-window conditions never hold.
pub struct NoSun;

impl SunProvider for NoSun {
    fn today(&self) -> Option<SunTimes> {
        None
    }
}

/// Current house mode ("home", "away", "night", ...).
pub struct HouseMode {
    mode: RwLock<String>,
}

impl HouseMode {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            mode: RwLock::new(initial.into()),
        }
    }

    pub fn get(&self) -> String {
        self.mode.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Returns the previous mode.
    pub fn set(&self, mode: impl Into<String>) -> String {
        let mut guard = self.mode.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, mode.into())
    }
}

/// Everything a single evaluation needs, captured up front.
pub struct EvalContext<'a> {
    pub states: &'a dyn StateView,
    pub mode: &'a str,
    pub sun: Option<SunTimes>,
    /// UTC instant, compared against sun windows
    pub now: DateTime<Utc>,
    /// Site wall-clock, compared against time windows
    pub local: NaiveDateTime,
}

/// Short-circuit AND over the conditions. An empty list is true.
pub fn evaluate(conditions: &[Condition], ctx: &EvalContext) -> bool {
    conditions.iter().all(|c| evaluate_one(c, ctx))
}

fn evaluate_one(condition: &Condition, ctx: &EvalContext) -> bool {
    match condition {
        Condition::StateCompare {
            device_id,
            property,
            op,
            value,
        } => match ctx.states.property(device_id, property) {
            Some(current) => op.apply(&current, value),
            None => false,
        },

        Condition::ModeIs { mode } => ctx.mode == mode,
        Condition::ModeIn { modes } => modes.iter().any(|m| m == ctx.mode),

        Condition::TimeWindow { after, before, days } => {
            if let Some(days) = days {
                let today = ctx.local.weekday().number_from_monday();
                if !days.contains(&today) {
                    return false;
                }
            }
            let t = ctx.local.time();
            if after <= before {
                t >= *after && t < *before
            } else {
                // Overnight window, e.g. 22:00 -> 06:00
                t >= *after || t < *before
            }
        }

        Condition::SunWindow {
            after,
            after_offset_min,
            before,
            before_offset_min,
        } => {
            let Some(sun) = ctx.sun else {
                return false;
            };
            let start = sun.anchor(*after) + chrono::Duration::minutes(*after_offset_min);
            let end = sun.anchor(*before) + chrono::Duration::minutes(*before_offset_min);
            if start <= end {
                ctx.now >= start && ctx.now < end
            } else {
                ctx.now >= start || ctx.now < end
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use domain::condition::{CompareOp, SunAnchor};
    use serde_json::json;
    use std::collections::HashMap;

    fn ctx<'a>(
        states: &'a HashMap<(DeviceId, String), serde_json::Value>,
        mode: &'a str,
        local: NaiveDateTime,
    ) -> EvalContext<'a> {
        EvalContext {
            states,
            mode,
            sun: None,
            now: Utc::now(),
            local,
        }
    }

    fn local(h: u32, m: u32) -> NaiveDateTime {
        // 2026-08-26 is a Wednesday
        NaiveDate::from_ymd_opt(2026, 8, 26)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_empty_conditions_are_true() {
        let states = HashMap::new();
        assert!(evaluate(&[], &ctx(&states, "home", local(12, 0))));
    }

    #[test]
    fn test_state_compare_missing_property_is_false() {
        let states = HashMap::new();
        let c = Condition::StateCompare {
            device_id: DeviceId::new("sensor-1").unwrap(),
            property: "temperature".to_string(),
            op: CompareOp::Gt,
            value: json!(20),
        };
        assert!(!evaluate(std::slice::from_ref(&c), &ctx(&states, "home", local(12, 0))));
    }

    #[test]
    fn test_state_compare_numeric() {
        let mut states = HashMap::new();
        states.insert(
            (DeviceId::new("sensor-1").unwrap(), "temperature".to_string()),
            json!(23.5),
        );
        let c = Condition::StateCompare {
            device_id: DeviceId::new("sensor-1").unwrap(),
            property: "temperature".to_string(),
            op: CompareOp::Gt,
            value: json!(20),
        };
        assert!(evaluate(&[c], &ctx(&states, "home", local(12, 0))));
    }

    #[test]
    fn test_and_semantics_short_circuit() {
        let states = HashMap::new();
        let conditions = vec![
            Condition::ModeIs {
                mode: "away".to_string(),
            },
            Condition::ModeIs {
                mode: "home".to_string(),
            },
        ];
        assert!(!evaluate(&conditions, &ctx(&states, "home", local(12, 0))));
    }

    #[test]
    fn test_overnight_time_window() {
        let states = HashMap::new();
        let c = Condition::TimeWindow {
            after: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            before: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            days: None,
        };
        assert!(evaluate(&[c.clone()], &ctx(&states, "home", local(23, 30))));
        assert!(evaluate(&[c.clone()], &ctx(&states, "home", local(2, 0))));
        assert!(!evaluate(&[c], &ctx(&states, "home", local(12, 0))));
    }

    #[test]
    fn test_time_window_day_restriction() {
        let states = HashMap::new();
        let weekend_only = Condition::TimeWindow {
            after: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            before: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            days: Some(vec![6, 7]),
        };
        // Wednesday
        assert!(!evaluate(&[weekend_only], &ctx(&states, "home", local(12, 0))));
    }

    #[test]
    fn test_sun_window_without_ephemeris_is_false() {
        let states = HashMap::new();
        let c = Condition::SunWindow {
            after: SunAnchor::Sunset,
            after_offset_min: -30,
            before: SunAnchor::Sunrise,
            before_offset_min: 0,
        };
        assert!(!evaluate(&[c], &ctx(&states, "home", local(23, 0))));
    }

    #[test]
    fn test_sun_window_with_offsets() {
        let states = HashMap::new();
        let sunrise = Utc.with_ymd_and_hms(2026, 8, 26, 5, 0, 0).unwrap();
        let sunset = Utc.with_ymd_and_hms(2026, 8, 26, 19, 0, 0).unwrap();
        let c = Condition::SunWindow {
            after: SunAnchor::Sunrise,
            after_offset_min: 30,
            before: SunAnchor::Sunset,
            before_offset_min: -30,
        };
        let mut context = ctx(&states, "home", local(12, 0));
        context.sun = Some(SunTimes { sunrise, sunset });

        context.now = Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap();
        assert!(evaluate(std::slice::from_ref(&c), &context));

        // Before sunrise+30min
        context.now = Utc.with_ymd_and_hms(2026, 8, 26, 5, 10, 0).unwrap();
        assert!(!evaluate(&[c], &context));
    }
}
