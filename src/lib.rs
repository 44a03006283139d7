//! # wmi-perf
//!
//! WMI performance-counter tables for Windows monitoring checks.
//!
//! The Windows agent reports WMI classes as CSV-like sections. This library
//! parses them into keyed tables and derives the values checks report:
//!
//! - [`parser::parse_wmi_table`] builds a [`WmiSection`] (one [`WmiTable`]
//!   per `[subtable]`), honoring `sampletime` headers, `WMIStatus` columns and
//!   `WMItimeout` markers.
//! - [`counter::scale_counter`] corrects raw/base pairs for 32 bit wraps.
//! - [`check`] computes raw averages, per-second rates (through a
//!   [`ValueStore`] that survives between check cycles) and checks them
//!   against [`levels`].
//! - [`discovery`] proposes per-instance or total services.
//!
//! ## Quick Start
//!
//! ```
//! use wmilib::check::wmi_calculate_raw_average;
//! use wmilib::section::parse_agent_output;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let output = "<<<dotnet_clrmemory:sep(44)>>>\n\
//!               Name,PercentTimeinGC,PercentTimeinGC_Base\n\
//!               _Global_,108935240,-1\n";
//! let sections = parse_agent_output(output);
//! let tables = sections[0].to_wmi_section(Some("Name"));
//!
//! let percent = wmi_calculate_raw_average(&tables[""], "_Global_", "PercentTimeinGC", 100.0)?;
//! assert!((percent - 2.536).abs() < 0.001);
//! # Ok(())
//! # }
//! ```

pub mod check;
pub mod config;
pub mod counter;
pub mod discovery;
pub mod error;
pub mod levels;
pub mod parser;
pub mod section;
pub mod table;
pub mod value_store;

pub use check::{
    check_wmi_raw_average, check_wmi_raw_average_timer, check_wmi_raw_counter,
    check_wmi_raw_fraction, check_wmi_raw_persec, get_wmi_time, wmi_calculate_raw_average,
    wmi_calculate_raw_average_time, wmi_yield_raw_persec, CheckSpec,
};
pub use config::WmiConfig;
pub use counter::scale_counter;
pub use discovery::{
    discover_wmi_table_instances, discover_wmi_table_total, required_tables_missing,
    wmi_filter_global_only, Service,
};
pub use error::{Result, WmiError};
pub use levels::{check_levels, get_levels_quadruple, CheckResult, Levels, LevelsParam, State};
pub use parser::{parse_wmi_table, WmiSection};
pub use table::{ColumnRef, RowRef, WmiTable};
pub use value_store::{get_rate, FileValueStore, GetRateError, MemoryValueStore, ValueStore};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
