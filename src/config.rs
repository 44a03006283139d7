// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Configuration for reading WMI sections
//!
//! Controls how agent output is tokenized and keyed, where counter state is
//! persisted between runs, and which levels apply to which counter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{Result, WmiError};
use crate::levels::LevelsParam;
use crate::parser::DEFAULT_KEY;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Filter for the `log` facade
    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Section reading configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WmiConfig {
    /// Key column of the tables, `None` for position-only rows
    pub key_field: Option<String>,
    /// Field separator of raw sections that have no `sep(...)` header
    pub separator: Option<char>,
    /// Counter state file for per-second rates
    pub value_store: Option<PathBuf>,
    pub log_level: LogLevel,
    /// Levels per counter column
    pub levels: BTreeMap<String, LevelsParam>,
}

impl Default for WmiConfig {
    fn default() -> Self {
        Self {
            key_field: Some(DEFAULT_KEY.to_string()),
            separator: None,
            value_store: None,
            log_level: LogLevel::Info,
            levels: BTreeMap::new(),
        }
    }
}

impl WmiConfig {
    /// Load from TOML file
    pub fn from_toml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WmiError::Configuration(format!("Cannot read {}: {}", path, e)))?;
        Self::from_toml(&content)
    }

    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| WmiError::Configuration(format!("TOML parse error: {}", e)))
    }

    /// Levels configured for `column`, matched like table headers
    pub fn levels_for(&self, column: &str) -> Option<&LevelsParam> {
        let wanted = crate::table::normalize_header(column);
        self.levels
            .iter()
            .find(|(name, _)| crate::table::normalize_header(name) == wanted)
            .map(|(_, levels)| levels)
    }

    /// Generate sample config
    pub fn sample_toml() -> String {
        r#"# wmiperf configuration
key_field = "Name"
# separator = ","
# value_store = "/var/lib/wmiperf/counters.json"
log_level = "Info"

# Levels per counter column: an upper (warn, crit) pair,
# or a table with optional upper and lower pairs
[levels]
PercentTimeinGC = [10.0, 20.0]
DiskReadsPersec = { upper = [500.0, 1000.0] }
AvailableMBytes = { lower = [1024.0, 512.0] }
"#
        .into()
    }
}
