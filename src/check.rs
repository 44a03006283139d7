//! Counter derivation for WMI checks
//!
//! Helpers that read raw performance counters out of a [`WmiTable`] and turn
//! them into the value a check reports: the counter itself, its per-second
//! rate, or the ratio of a counter and its `_Base` column.
//!
//! Lookup failures (unknown row or column, empty cell) mean the item has no
//! data this cycle. The `check_*` helpers return `Ok(None)` for them; the
//! `wmi_calculate_*` functions leave that decision to the caller.
//!
//! # Examples
//!
//! ```
//! use wmilib::check::{check_wmi_raw_fraction, CheckSpec};
//! use wmilib::levels::State;
//! use wmilib::parser::parse_wmi_table;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let lines = vec![
//!     vec!["Name", "PercentTimeinGC", "PercentTimeinGC_Base"],
//!     vec!["app", "25", "100"],
//! ];
//! let section = parse_wmi_table(&lines, Some("Name"));
//! let spec = CheckSpec::percent("Time in GC").with_upper((10.0, 20.0));
//!
//! let result = check_wmi_raw_fraction(&section[""], "app", "PercentTimeinGC", &spec)?;
//! assert_eq!(result.map(|r| r.state), Some(State::Crit));
//! # Ok(())
//! # }
//! ```

use crate::counter::{scale_counter, unsigned_base};
use crate::error::{Result, WmiError};
use crate::levels::{
    check_levels, get_levels_quadruple, render, CheckResult, Levels, LevelsOptions, LevelsParam,
    Render, NO_LEVELS,
};
use crate::table::{RowRef, WmiTable};
use crate::value_store::{get_rate, ValueStore};

/// Per-row sample time column
pub const TIMESTAMP_COLUMN: &str = "Timestamp_PerfTime";
/// Per-row sample frequency column
pub const FREQUENCY_COLUMN: &str = "Frequency_PerfTime";

/// How a derived value is presented and judged
#[derive(Debug, Clone, Copy)]
pub struct CheckSpec<'a> {
    /// Summary prefix, omitted when empty
    pub label: &'a str,
    pub metric_name: Option<&'a str>,
    pub levels: Levels,
    pub render: Render,
    pub unit: &'a str,
}

impl<'a> CheckSpec<'a> {
    pub fn new(label: &'a str) -> Self {
        Self {
            label,
            metric_name: None,
            levels: NO_LEVELS,
            render: render::default,
            unit: "",
        }
    }

    /// Percentage of a raw fraction counter
    pub fn percent(label: &'a str) -> Self {
        Self {
            render: render::percent,
            ..Self::new(label)
        }
    }

    pub fn with_metric(mut self, metric_name: &'a str) -> Self {
        self.metric_name = Some(metric_name);
        self
    }

    pub fn with_levels(mut self, levels: Levels) -> Self {
        self.levels = levels;
        self
    }

    /// Upper `(warn, crit)` levels only
    pub fn with_upper(self, (warn, crit): (f64, f64)) -> Self {
        self.with_levels((Some(warn), Some(crit), None, None))
    }

    pub fn with_render(mut self, render: Render) -> Self {
        self.render = render;
        self
    }

    pub fn with_unit(mut self, unit: &'a str) -> Self {
        self.unit = unit;
        self
    }

    fn check(&self, value: f64, boundaries: Option<(f64, f64)>) -> CheckResult {
        let options = LevelsOptions {
            label: Some(self.label).filter(|label| !label.is_empty()),
            unit: self.unit,
            render: self.render,
            boundaries,
        };
        check_levels(value, self.metric_name, self.levels, options)
    }
}

/// Turn "no data this cycle" errors into `None`
fn skip_missing<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_missing_data() => {
            log::debug!("Skipping item: {}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Non-empty cell or [`WmiError::MissingCounter`]
fn require_cell<'t>(
    table: &'t WmiTable,
    row: RowRef<'_>,
    column: &str,
    raise_on_timeout: bool,
) -> Result<&'t str> {
    match table.get(row, column, raise_on_timeout)? {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(WmiError::MissingCounter {
            column: column.to_string(),
        }),
    }
}

fn parse_integer(column: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| WmiError::InvalidNumber {
            column: column.to_string(),
            value: value.to_string(),
        })
}

/// Counters may exceed i64 (unsigned 64 bit), so go through i128
fn parse_counter(column: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<i128>()
        .map(|v| v as f64)
        .map_err(|_| WmiError::InvalidNumber {
            column: column.to_string(),
            value: value.to_string(),
        })
}

/// Key under which the rate of `column` in `table` is remembered
fn rate_key(column: &str, table: &WmiTable) -> String {
    format!("{}_{}", column, table.name())
}

/// Sample time of `row` in seconds
///
/// Table-wide timestamp and frequency (from a `sampletime` line) take
/// precedence; otherwise the row's `Timestamp_PerfTime` and
/// `Frequency_PerfTime` cells are used. A missing or zero frequency counts
/// as 1.
pub fn get_wmi_time<'b>(
    table: &WmiTable,
    row: impl Into<RowRef<'b>>,
    raise_on_timeout: bool,
) -> Result<f64> {
    let row = row.into();

    let timestamp = match table.timestamp().filter(|&ts| ts != 0) {
        Some(ts) => ts as f64,
        None => {
            let cell = require_cell(table, row, TIMESTAMP_COLUMN, raise_on_timeout)?;
            parse_counter(TIMESTAMP_COLUMN, cell)?
        }
    };

    let frequency = match table.frequency().filter(|&freq| freq != 0) {
        Some(freq) => freq as f64,
        None => match table.get(row, FREQUENCY_COLUMN, raise_on_timeout)? {
            Some(cell) if !cell.trim().is_empty() => parse_counter(FREQUENCY_COLUMN, cell)?,
            _ => 0.0,
        },
    };
    let frequency = if frequency == 0.0 { 1.0 } else { frequency };

    Ok(timestamp / frequency)
}

/// Ratio of `column` and `column_Base`, multiplied by `factor`
///
/// A negative base is a 32 bit counter printed as signed and is read as
/// unsigned. A zero base yields `0.0`. Fails with
/// [`WmiError::MissingCounter`] when either cell is empty.
pub fn wmi_calculate_raw_average<'b>(
    table: &WmiTable,
    row: impl Into<RowRef<'b>>,
    column: &str,
    factor: f64,
) -> Result<f64> {
    let row = row.into();
    let base_column = format!("{}_Base", column);

    let measure = parse_counter(column, require_cell(table, row, column, false)?)?;
    let base = require_cell(table, row, &base_column, false)?;
    let base = unsigned_base(parse_integer(&base_column, base)?);
    if base == 0 {
        return Ok(0.0);
    }

    Ok(scale_counter(measure * factor, factor, base as f64))
}

/// Ratio of the per-second rates of `column` and `column_Base`
///
/// Both rates are taken at the row's sample time. Both counters are recorded
/// before any rate error is returned, so they initialize in the same cycle.
/// A zero base rate yields `0.0`.
pub fn wmi_calculate_raw_average_time<'b>(
    store: &mut dyn ValueStore,
    table: &WmiTable,
    row: impl Into<RowRef<'b>>,
    column: &str,
) -> Result<f64> {
    let row = row.into();
    let base_column = format!("{}_Base", column);

    let measure = parse_counter(column, require_cell(table, row, column, false)?)?;
    let base = parse_counter(&base_column, require_cell(table, row, &base_column, false)?)?;
    let sample_time = get_wmi_time(table, row, false)?;

    let key = rate_key(column, table);
    let measure_rate = get_rate(store, &key, sample_time, measure, false);
    let base_rate = get_rate(store, &format!("{}_Base", key), sample_time, base, false);
    let (measure_per_sec, base_per_sec) = (measure_rate?, base_rate?);

    if base_per_sec == 0.0 {
        return Ok(0.0);
    }
    Ok(measure_per_sec / base_per_sec)
}

/// Check the absolute value of a counter
///
/// Yields nothing when the table, row or cell is gone.
pub fn check_wmi_raw_counter<'b>(
    table: Option<&WmiTable>,
    row: impl Into<RowRef<'b>>,
    column: &str,
    spec: &CheckSpec<'_>,
) -> Result<Option<CheckResult>> {
    let Some(table) = table else {
        return Ok(None);
    };
    let row = row.into();

    let value = skip_missing(
        require_cell(table, row, column, false).and_then(|cell| parse_counter(column, cell)),
    )?;
    Ok(value.map(|value| spec.check(value, None)))
}

/// Check the per-second rate of a counter
///
/// Yields nothing when the table (discovered earlier, gone now), row or cell
/// is missing. The first call for a counter fails with the rate error of
/// [`get_rate`]; callers usually report that as "waiting for the next cycle".
pub fn check_wmi_raw_persec<'b>(
    store: &mut dyn ValueStore,
    table: Option<&WmiTable>,
    row: impl Into<RowRef<'b>>,
    column: &str,
    spec: &CheckSpec<'_>,
) -> Result<Option<CheckResult>> {
    let Some(table) = table else {
        return Ok(None);
    };
    let row = row.into();

    let value = skip_missing(
        require_cell(table, row, column, false).and_then(|cell| parse_counter(column, cell)),
    )?;
    let Some(value) = value else {
        return Ok(None);
    };

    let sample_time = get_wmi_time(table, row, false)?;
    let rate = get_rate(store, &rate_key(column, table), sample_time, value, false)?;
    Ok(Some(spec.check(rate, None)))
}

/// Check a raw average (factor 1) scaled by `perfscale`
pub fn check_wmi_raw_average<'b>(
    table: &WmiTable,
    row: impl Into<RowRef<'b>>,
    column: &str,
    spec: &CheckSpec<'_>,
    perfscale: f64,
) -> Result<Option<CheckResult>> {
    let average = skip_missing(wmi_calculate_raw_average(table, row, column, 1.0))?;
    Ok(average.map(|average| spec.check(average * perfscale, None)))
}

/// Check an average timer: rate ratio divided by the counter frequency
pub fn check_wmi_raw_average_timer<'b>(
    store: &mut dyn ValueStore,
    table: &WmiTable,
    row: impl Into<RowRef<'b>>,
    column: &str,
    spec: &CheckSpec<'_>,
) -> Result<Option<CheckResult>> {
    let row = row.into();
    let frequency = match table.frequency().filter(|&freq| freq != 0) {
        Some(freq) => Some(freq as f64),
        None => skip_missing(
            require_cell(table, row, FREQUENCY_COLUMN, false)
                .and_then(|cell| parse_counter(FREQUENCY_COLUMN, cell)),
        )?
        .filter(|&freq| freq != 0.0),
    };
    let Some(frequency) = frequency else {
        return Ok(None);
    };

    let average = skip_missing(wmi_calculate_raw_average_time(store, table, row, column))?;
    Ok(average.map(|average| spec.check(average / frequency, None)))
}

/// Check a raw fraction as a percentage
pub fn check_wmi_raw_fraction<'b>(
    table: &WmiTable,
    row: impl Into<RowRef<'b>>,
    column: &str,
    spec: &CheckSpec<'_>,
) -> Result<Option<CheckResult>> {
    let average = skip_missing(wmi_calculate_raw_average(table, row, column, 100.0))?;
    Ok(average.map(|average| spec.check(average, Some((0.0, 100.0)))))
}

/// Per-second rate check taking plain check parameters
///
/// `infoname` labels the summary, `perfvar` names the metric.
pub fn wmi_yield_raw_persec<'b>(
    store: &mut dyn ValueStore,
    table: Option<&WmiTable>,
    row: impl Into<RowRef<'b>>,
    column: &str,
    infoname: Option<&str>,
    perfvar: Option<&str>,
    levels: Option<&LevelsParam>,
) -> Result<Option<CheckResult>> {
    let spec = CheckSpec {
        label: infoname.unwrap_or_default(),
        metric_name: perfvar,
        levels: get_levels_quadruple(levels),
        render: render::per_second,
        unit: "",
    };
    check_wmi_raw_persec(store, table, row, column, &spec)
}
