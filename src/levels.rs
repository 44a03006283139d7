//! Threshold levels and value checking
//!
//! Check parameters come in three historical shapes: no levels, a plain
//! `(warn, crit)` upper pair, or a table with optional `upper` and `lower`
//! pairs. [`get_levels_quadruple`] folds all of them into one
//! `(warn_hi, crit_hi, warn_lo, crit_lo)` tuple, which [`check_levels`] turns
//! into a service state, a summary text and a metric.

use serde::{Deserialize, Serialize};

/// `(warn_upper, crit_upper, warn_lower, crit_lower)`
pub type Levels = (Option<f64>, Option<f64>, Option<f64>, Option<f64>);

/// No levels at all
pub const NO_LEVELS: Levels = (None, None, None, None);

/// Threshold parameters as configured by the user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelsParam {
    /// Upper `(warn, crit)` pair
    Fixed((f64, f64)),
    /// Optional upper and lower pairs
    Bounds {
        #[serde(default)]
        upper: Option<(f64, f64)>,
        #[serde(default)]
        lower: Option<(f64, f64)>,
    },
}

/// Normalize any parameter shape into a levels quadruple
pub fn get_levels_quadruple(params: Option<&LevelsParam>) -> Levels {
    match params {
        None => NO_LEVELS,
        Some(LevelsParam::Fixed((warn, crit))) => (Some(*warn), Some(*crit), None, None),
        Some(LevelsParam::Bounds { upper, lower }) => {
            let (warn_hi, crit_hi) = upper.map_or((None, None), |(w, c)| (Some(w), Some(c)));
            let (warn_lo, crit_lo) = lower.map_or((None, None), |(w, c)| (Some(w), Some(c)));
            (warn_hi, crit_hi, warn_lo, crit_lo)
        }
    }
}

/// Monitoring state of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum State {
    Ok = 0,
    Warn = 1,
    Crit = 2,
    Unknown = 3,
}

impl State {
    /// Marker appended to texts in multi-line outputs
    pub fn marker(self) -> &'static str {
        match self {
            Self::Ok => "",
            Self::Warn => "(!)",
            Self::Crit => "(!!)",
            Self::Unknown => "(?)",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warn => write!(f, "WARN"),
            Self::Crit => write!(f, "CRIT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Performance data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    /// Upper `(warn, crit)`
    pub levels: (Option<f64>, Option<f64>),
    /// `(min, max)` if known
    pub boundaries: Option<(f64, f64)>,
}

/// Outcome of checking one value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub state: State,
    pub summary: String,
    pub metric: Option<Metric>,
}

/// Formats a value for the summary text
pub type Render = fn(f64) -> String;

/// Value renderers
pub mod render {
    /// Two decimals
    pub fn default(value: f64) -> String {
        format!("{:.2}", value)
    }

    /// Integral counters
    pub fn integer(value: f64) -> String {
        format!("{}", value.round() as i64)
    }

    pub fn percent(value: f64) -> String {
        format!("{:.2}%", value)
    }

    pub fn per_second(value: f64) -> String {
        format!("{:.2}/s", value)
    }
}

/// Presentation options of [`check_levels`]
#[derive(Debug, Clone, Copy)]
pub struct LevelsOptions<'a> {
    /// Prefix of the summary, e.g. `"Reads"`
    pub label: Option<&'a str>,
    /// Appended to the rendered value; a leading `/` is kept tight
    pub unit: &'a str,
    pub render: Render,
    pub boundaries: Option<(f64, f64)>,
}

impl Default for LevelsOptions<'_> {
    fn default() -> Self {
        Self {
            label: None,
            unit: "",
            render: render::default,
            boundaries: None,
        }
    }
}

/// Check `value` against upper and lower levels
///
/// Upper levels trigger at `>=`, lower levels below `<`. Critical levels are
/// tested before warning levels.
pub fn check_levels(
    value: f64,
    metric_name: Option<&str>,
    levels: Levels,
    options: LevelsOptions<'_>,
) -> CheckResult {
    let unit_info = if options.unit.starts_with('/') || options.unit.is_empty() {
        options.unit.to_string()
    } else {
        format!(" {}", options.unit)
    };
    let render = options.render;

    let mut summary = format!("{}{}", render(value), unit_info);
    if let Some(label) = options.label {
        summary = format!("{}: {}", label, summary);
    }

    let (warn_hi, crit_hi, warn_lo, crit_lo) = levels;
    let levels_text = |ty: &str, warn: Option<f64>, crit: Option<f64>| {
        let show = |v: Option<f64>| v.map_or_else(|| "-".to_string(), render);
        format!(
            " (warn/crit {} {}{}/{}{})",
            ty,
            show(warn),
            unit_info,
            show(crit),
            unit_info
        )
    };

    let (state, text) = if crit_hi.map_or(false, |crit| value >= crit) {
        (State::Crit, levels_text("at", warn_hi, crit_hi))
    } else if crit_lo.map_or(false, |crit| value < crit) {
        (State::Crit, levels_text("below", warn_lo, crit_lo))
    } else if warn_hi.map_or(false, |warn| value >= warn) {
        (State::Warn, levels_text("at", warn_hi, crit_hi))
    } else if warn_lo.map_or(false, |warn| value < warn) {
        (State::Warn, levels_text("below", warn_lo, crit_lo))
    } else {
        (State::Ok, String::new())
    };
    summary.push_str(&text);

    let metric = metric_name.map(|name| Metric {
        name: name.to_string(),
        value,
        levels: (warn_hi, crit_hi),
        boundaries: options.boundaries,
    });

    CheckResult {
        state,
        summary,
        metric,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_quadruple_none() {
        assert_eq!(get_levels_quadruple(None), (None, None, None, None));
    }

    #[test]
    fn test_levels_quadruple_pair() {
        let params = LevelsParam::Fixed((1.0, 2.0));
        assert_eq!(
            get_levels_quadruple(Some(&params)),
            (Some(1.0), Some(2.0), None, None)
        );
    }

    #[test]
    fn test_levels_quadruple_bounds() {
        let params = LevelsParam::Bounds {
            upper: Some((1.0, 2.0)),
            lower: Some((3.0, 4.0)),
        };
        assert_eq!(
            get_levels_quadruple(Some(&params)),
            (Some(1.0), Some(2.0), Some(3.0), Some(4.0))
        );

        let lower_only = LevelsParam::Bounds {
            upper: None,
            lower: Some((3.0, 4.0)),
        };
        assert_eq!(
            get_levels_quadruple(Some(&lower_only)),
            (None, None, Some(3.0), Some(4.0))
        );
    }

    #[test]
    fn test_levels_param_deserialize() {
        let fixed: LevelsParam = serde_json::from_str("[10.0, 20.0]").unwrap();
        assert_eq!(fixed, LevelsParam::Fixed((10.0, 20.0)));

        let bounds: LevelsParam = serde_json::from_str(r#"{"lower": [1.0, 0.5]}"#).unwrap();
        assert_eq!(
            bounds,
            LevelsParam::Bounds {
                upper: None,
                lower: Some((1.0, 0.5))
            }
        );
    }

    #[test]
    fn test_check_levels_no_levels() {
        let result = check_levels(42.0, Some("reads"), NO_LEVELS, LevelsOptions::default());
        assert_eq!(result.state, State::Ok);
        assert_eq!(result.summary, "42.00");
        let metric = result.metric.unwrap();
        assert_eq!(metric.name, "reads");
        assert_eq!(metric.levels, (None, None));
    }

    #[test]
    fn test_check_levels_upper() {
        let levels = (Some(10.0), Some(20.0), None, None);
        let options = LevelsOptions {
            label: Some("Reads"),
            unit: "/s",
            ..Default::default()
        };
        assert_eq!(check_levels(5.0, None, levels, options).state, State::Ok);
        assert_eq!(check_levels(10.0, None, levels, options).state, State::Warn);

        let crit = check_levels(25.0, None, levels, options);
        assert_eq!(crit.state, State::Crit);
        assert_eq!(crit.summary, "Reads: 25.00/s (warn/crit at 10.00/s/20.00/s)");
        assert!(crit.metric.is_none());
    }

    #[test]
    fn test_check_levels_lower() {
        let levels = (None, None, Some(5.0), Some(2.0));
        let options = LevelsOptions::default();
        assert_eq!(check_levels(5.0, None, levels, options).state, State::Ok);
        assert_eq!(check_levels(4.0, None, levels, options).state, State::Warn);
        let crit = check_levels(1.0, None, levels, options);
        assert_eq!(crit.state, State::Crit);
        assert!(crit.summary.contains("below"));
    }

    #[test]
    fn test_check_levels_unit_spacing() {
        let options = LevelsOptions {
            unit: "ms",
            render: render::integer,
            ..Default::default()
        };
        assert_eq!(check_levels(3.0, None, NO_LEVELS, options).summary, "3 ms");
    }

    #[test]
    fn test_state_marker() {
        assert_eq!(State::Warn.marker(), "(!)");
    }
}
