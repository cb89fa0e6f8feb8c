//! Declarative parameter schemas shared by the built-in scenes.
//!
//! Out-of-range numbers are clamped to the nearest bound and reported as
//! [`SceneError::InvalidParam`]; values of the wrong type fall back to the
//! current value. Reports are advisory and never stop a scene from starting.

use serde_json::{json, Value};

use crate::error::SceneError;

/// Loosely typed parameter map as it arrives from a timeline or operator.
pub type Params = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy)]
pub enum ParamSpec {
    Number {
        name: &'static str,
        min: f64,
        max: f64,
        default: f64,
        integer: bool,
    },
    /// Strictly positive number; non-positive input resets to the default.
    Positive { name: &'static str, default: f64 },
    Choice {
        name: &'static str,
        options: &'static [&'static str],
        default: &'static str,
    },
    Color { name: &'static str, default: &'static str },
    Text { name: &'static str, default: &'static str },
    Flag { name: &'static str, default: bool },
    List {
        name: &'static str,
        min: f64,
        max: f64,
        max_len: usize,
        default: &'static [f64],
    },
}

impl ParamSpec {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Number { name, .. }
            | Self::Positive { name, .. }
            | Self::Choice { name, .. }
            | Self::Color { name, .. }
            | Self::Text { name, .. }
            | Self::Flag { name, .. }
            | Self::List { name, .. } => name,
        }
    }

    fn default_value(&self) -> Value {
        match *self {
            Self::Number { default, integer, .. } => number_value(default, integer),
            Self::Positive { default, .. } => json!(default),
            Self::Choice { default, .. } | Self::Color { default, .. } | Self::Text { default, .. } => {
                json!(default)
            }
            Self::Flag { default, .. } => json!(default),
            Self::List { default, .. } => json!(default),
        }
    }

    /// Validates `raw`. Returns the value to store (if any) and an optional
    /// report describing what was corrected.
    fn validate(&self, raw: &Value) -> (Option<Value>, Option<SceneError>) {
        let name = self.name();
        match *self {
            Self::Number {
                min,
                max,
                integer,
                ..
            } => match as_number(raw) {
                None => (None, Some(SceneError::invalid_param(name, "must be a number"))),
                Some(value) if value < min || value > max => {
                    let clamped = value.clamp(min, max);
                    (
                        Some(number_value(clamped, integer)),
                        Some(SceneError::invalid_param(name, format!("clamped to {clamped}"))),
                    )
                }
                Some(value) => (Some(number_value(value, integer)), None),
            },
            Self::Positive { default, .. } => match as_number(raw) {
                Some(value) if value > 0.0 => (Some(json!(value)), None),
                _ => (
                    Some(json!(default)),
                    Some(SceneError::invalid_param(name, "must be positive")),
                ),
            },
            Self::Choice { options, .. } => match raw.as_str() {
                Some(choice) if options.contains(&choice) => (Some(json!(choice)), None),
                _ => (
                    None,
                    Some(SceneError::invalid_param(
                        name,
                        format!("must be one of {}", options.join(", ")),
                    )),
                ),
            },
            Self::Color { .. } => match raw.as_str() {
                Some(color) if is_color(color) => (Some(json!(color)), None),
                _ => (None, Some(SceneError::invalid_param(name, "is not a color"))),
            },
            Self::Text { .. } => match raw {
                Value::String(_) => (Some(raw.clone()), None),
                Value::Number(n) => (Some(json!(n.to_string())), None),
                _ => (None, Some(SceneError::invalid_param(name, "must be text"))),
            },
            Self::Flag { .. } => match raw.as_bool() {
                Some(flag) => (Some(json!(flag)), None),
                None => (None, Some(SceneError::invalid_param(name, "must be true or false"))),
            },
            Self::List {
                min, max, max_len, ..
            } => match raw.as_array() {
                Some(items) => {
                    let values: Vec<f64> = items.iter().filter_map(as_number).collect();
                    let clamped: Vec<f64> =
                        values.iter().take(max_len).map(|v| v.clamp(min, max)).collect();
                    let report = (clamped.len() != items.len() || clamped != values)
                        .then(|| SceneError::invalid_param(name, "entries clamped or dropped"));
                    (Some(json!(clamped)), report)
                }
                None => (None, Some(SceneError::invalid_param(name, "must be a list"))),
            },
        }
    }
}

/// Ordered set of parameter specs for one scene type.
#[derive(Debug, Clone, Copy)]
pub struct ParamSchema(pub &'static [ParamSpec]);

impl ParamSchema {
    pub fn defaults(&self) -> Params {
        self.0
            .iter()
            .map(|spec| (spec.name().to_string(), spec.default_value()))
            .collect()
    }

    /// Merges `incoming` into `target`, returning every correction made.
    pub fn apply(&self, target: &mut Params, incoming: &Params) -> Vec<SceneError> {
        let mut reports = Vec::new();
        for (key, raw) in incoming {
            let Some(spec) = self.0.iter().find(|spec| spec.name() == key) else {
                reports.push(SceneError::invalid_param(key.as_str(), "is not recognised"));
                continue;
            };
            let (value, report) = spec.validate(raw);
            if let Some(value) = value {
                target.insert(key.clone(), value);
            }
            reports.extend(report);
        }
        reports
    }

    /// Builds a full parameter set from defaults plus `incoming`.
    pub fn resolve(&self, incoming: &Params) -> (Params, Vec<SceneError>) {
        let mut params = self.defaults();
        let reports = self.apply(&mut params, incoming);
        (params, reports)
    }
}

pub fn number(params: &Params, name: &str) -> f64 {
    params.get(name).and_then(Value::as_f64).unwrap_or_default()
}

pub fn text<'a>(params: &'a Params, name: &str) -> &'a str {
    params.get(name).and_then(Value::as_str).unwrap_or_default()
}

pub fn flag(params: &Params, name: &str) -> bool {
    params.get(name).and_then(Value::as_bool).unwrap_or_default()
}

fn as_number(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn number_value(value: f64, integer: bool) -> Value {
    if integer {
        json!(value.floor() as i64)
    } else {
        json!(value)
    }
}

fn is_color(raw: &str) -> bool {
    match raw.strip_prefix('#') {
        Some(hex) => matches!(hex.len(), 3 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => !raw.is_empty() && raw.chars().all(|c| c.is_ascii_alphabetic()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: ParamSchema = ParamSchema(&[
        ParamSpec::Number {
            name: "a",
            min: 1.0,
            max: 10.0,
            default: 3.0,
            integer: false,
        },
        ParamSpec::Number {
            name: "maxIter",
            min: 10.0,
            max: 500.0,
            default: 100.0,
            integer: true,
        },
        ParamSpec::Positive { name: "k", default: 4.0 },
        ParamSpec::Choice {
            name: "charset",
            options: &["pi", "e", "primes"],
            default: "pi",
        },
        ParamSpec::Color {
            name: "color",
            default: "#39FF14",
        },
        ParamSpec::List {
            name: "radii",
            min: 10.0,
            max: 200.0,
            max_len: 5,
            default: &[120.0, 45.0],
        },
    ]);

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn clamps_to_nearest_bound() {
        let (resolved, reports) = SCHEMA.resolve(&params(json!({ "a": 15, "maxIter": 5 })));
        assert_eq!(number(&resolved, "a"), 10.0);
        assert_eq!(resolved["maxIter"], json!(10));
        assert_eq!(reports.len(), 2);
        assert!(reports
            .iter()
            .all(|r| matches!(r, SceneError::InvalidParam { reason, .. } if reason.contains("clamped"))));
    }

    #[test]
    fn floors_integer_params() {
        let (resolved, reports) = SCHEMA.resolve(&params(json!({ "maxIter": 123.9 })));
        assert_eq!(resolved["maxIter"], json!(123));
        assert!(reports.is_empty());
    }

    #[test]
    fn wrong_types_keep_defaults() {
        let (resolved, reports) = SCHEMA.resolve(&params(
            json!({ "a": "fast", "charset": "hex", "color": "not a color", "k": -1 }),
        ));
        assert_eq!(number(&resolved, "a"), 3.0);
        assert_eq!(text(&resolved, "charset"), "pi");
        assert_eq!(text(&resolved, "color"), "#39FF14");
        assert_eq!(number(&resolved, "k"), 4.0);
        assert_eq!(reports.len(), 4);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let (resolved, reports) = SCHEMA.resolve(&params(json!({ "a": "2.5" })));
        assert_eq!(number(&resolved, "a"), 2.5);
        assert!(reports.is_empty());
    }

    #[test]
    fn lists_are_clamped_and_truncated() {
        let (resolved, reports) =
            SCHEMA.resolve(&params(json!({ "radii": [250, 5, 50, 60, 70, 80, 90] })));
        assert_eq!(resolved["radii"], json!([200.0, 10.0, 50.0, 60.0, 70.0]));
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn unknown_params_are_reported() {
        let mut target = SCHEMA.defaults();
        let reports = SCHEMA.apply(&mut target, &params(json!({ "glitter": 1 })));
        assert!(!target.contains_key("glitter"));
        assert_eq!(reports.len(), 1);
    }
}
