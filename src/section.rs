//! Agent output framing
//!
//! The Windows agent prints each WMI class as a section introduced by a
//! `<<<name>>>` header. Header options follow the name after colons, e.g.
//! `<<<dotnet_clrmemory:sep(44)>>>`; `sep(N)` gives the field separator as a
//! character code. Sections without `sep` are split on whitespace.

use crate::parser::{parse_wmi_table, WmiSection};

/// One raw agent section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection {
    pub name: String,
    pub separator: Option<char>,
    /// Tokenized lines
    pub lines: Vec<Vec<String>>,
}

impl RawSection {
    /// Parse the lines as WMI tables
    pub fn to_wmi_section(&self, key: Option<&str>) -> WmiSection {
        parse_wmi_table(&self.lines, key)
    }
}

/// Split one line on `separator`, or on whitespace when there is none
pub fn split_line(line: &str, separator: Option<char>) -> Vec<String> {
    match separator {
        Some(sep) => line.split(sep).map(str::to_string).collect(),
        None => line.split_whitespace().map(str::to_string).collect(),
    }
}

/// Split raw agent output into its sections
///
/// Lines before the first header are dropped. Empty lines are kept out of the
/// tokenized output.
pub fn parse_agent_output(text: &str) -> Vec<RawSection> {
    let mut sections: Vec<RawSection> = Vec::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some((name, separator)) = parse_header(line) {
            sections.push(RawSection {
                name,
                separator,
                lines: Vec::new(),
            });
            continue;
        }
        match sections.last_mut() {
            Some(section) if !line.trim().is_empty() => {
                section.lines.push(split_line(line, section.separator));
            }
            Some(_) => {}
            None => log::debug!("Ignoring line outside of any section: {:?}", line),
        }
    }
    sections
}

/// Name and separator of a `<<<name:opt(...)>>>` header line
fn parse_header(line: &str) -> Option<(String, Option<char>)> {
    let inner = line.strip_prefix("<<<")?.strip_suffix(">>>")?;
    let mut parts = inner.split(':');
    let name = parts.next()?.to_string();
    let mut separator = None;

    for option in parts {
        if let Some(code) = option.strip_prefix("sep(").and_then(|o| o.strip_suffix(')')) {
            match code.parse::<u32>().ok().and_then(char::from_u32) {
                Some(sep) => separator = Some(sep),
                None => log::warn!("Invalid separator in section header {:?}", line),
            }
        }
    }
    Some((name, separator))
}
