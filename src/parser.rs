//! WMI section parsing
//!
//! Turns the tokenized lines of one agent section into a [`WmiSection`]. The
//! accepted layouts are:
//!
//! ```text
//! sampletime,<timestamp>,<frequency>     optional, shared by all tables
//! [table_a]                              optional, starts a named table
//! Name,Counter,,WMIStatus                header (WMIStatus since newer agents)
//! foo,1,2,OK
//! [table_b]
//! WMItimeout                             older agents: table produced no data
//! ```
//!
//! Input without `[name]` lines is a single table named `""`.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::table::{WmiTable, STATUS_COLUMN};

/// Default key column of WMI classes
pub const DEFAULT_KEY: &str = "Name";

/// Tables of one section by sub-table name (`""` for single-table sections)
pub type WmiSection = BTreeMap<String, WmiTable>;

/// Parse tokenized section lines into tables
///
/// Parsing never fails: a malformed `sampletime` line or the end of input
/// ends the block and whatever was read so far is returned.
pub fn parse_wmi_table<L, S>(lines: &[L], key: Option<&str>) -> WmiSection
where
    L: AsRef<[S]>,
    S: AsRef<str>,
{
    let mut parsed = WmiSection::new();
    let mut lines = lines
        .iter()
        .map(|line| line.as_ref())
        .filter(|line| !line.is_empty());

    let mut line = match lines.next() {
        Some(line) => line,
        None => return parsed,
    };

    let (mut timestamp, mut frequency) = (None, None);
    if line[0].as_ref() == "sampletime" {
        match parse_sampletime(line) {
            Some((ts, freq)) => {
                timestamp = Some(ts);
                frequency = Some(freq);
            }
            None => {
                log::debug!("Malformed sampletime line, skipping section");
                return parsed;
            }
        }
        line = match lines.next() {
            Some(line) => line,
            None => return parsed,
        };
    }

    loop {
        let table_name = match subtable_name(line) {
            Some(name) => {
                line = match lines.next() {
                    Some(line) => line,
                    None => {
                        log::debug!("Table [{}] has no header", name);
                        return parsed;
                    }
                };
                name
            }
            None => String::new(),
        };

        let (missing_status, table) =
            prepare_table(&mut parsed, table_name, line, key, timestamp, frequency);

        loop {
            line = match lines.next() {
                Some(line) => line,
                None => {
                    log_table(table);
                    return parsed;
                }
            };
            if subtable_name(line).is_some() {
                break;
            }
            if missing_status {
                table.add_row(line.iter().map(|cell| cell.as_ref()).chain(["OK"]));
            } else {
                table.add_row(line.iter().map(|cell| cell.as_ref()));
            }
        }
        log_table(table);
    }
}

fn log_table(table: &WmiTable) {
    log::debug!(
        "Table [{}]: {} rows{}",
        table.name(),
        table.row_count(),
        if table.timed_out() { ", timed out" } else { "" }
    );
}

fn parse_sampletime<S: AsRef<str>>(line: &[S]) -> Option<(i64, i64)> {
    match line {
        [_, timestamp, frequency] => Some((
            timestamp.as_ref().trim().parse().ok()?,
            frequency.as_ref().trim().parse().ok()?,
        )),
        _ => None,
    }
}

/// Name of a `[name]` line, if this is one
fn subtable_name<S: AsRef<str>>(line: &[S]) -> Option<String> {
    match line {
        [token] => {
            let inner = token.as_ref().strip_prefix('[')?;
            let name = match inner.rfind(']') {
                Some(end) => &inner[..end],
                None => inner,
            };
            Some(name.to_string())
        }
        _ => None,
    }
}

/// Set up the table for one header line
///
/// Older agents print `WMItimeout` instead of a header when a table could not
/// be collected; such a table gets a single `Timeout` status row. Headers
/// without a `WMIStatus` column get one, and the returned flag tells the
/// caller to pad every data row with `OK`.
fn prepare_table<'p, S: AsRef<str>>(
    parsed: &'p mut WmiSection,
    table_name: String,
    line: &[S],
    key: Option<&str>,
    timestamp: Option<i64>,
    frequency: Option<i64>,
) -> (bool, &'p mut WmiTable) {
    let old_timed_out = line[0].as_ref().eq_ignore_ascii_case("wmitimeout");
    let (mut header, key): (Vec<String>, Option<&str>) = if old_timed_out {
        log::debug!("Table [{}] reported WMItimeout", table_name);
        (vec![STATUS_COLUMN.to_string()], None)
    } else {
        (line.iter().map(|cell| cell.as_ref().to_string()).collect(), key)
    };

    let missing_status = !header.iter().any(|column| column == STATUS_COLUMN);
    if missing_status {
        header.push(STATUS_COLUMN.to_string());
    }

    let table = match parsed.entry(table_name) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => {
            let name = entry.key().clone();
            let table = WmiTable::new(name.clone(), &header, key, timestamp, frequency)
                .unwrap_or_else(|e| {
                    log::debug!("{}, reading table [{}] without key", e, name);
                    WmiTable::unkeyed(name.clone(), &header, timestamp, frequency)
                });
            entry.insert(table)
        }
    };

    if old_timed_out {
        table.add_row(["Timeout"]);
    }
    (missing_status, table)
}
