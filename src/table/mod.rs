//! Performance counter tables
//!
//! A [`WmiTable`] holds one WMI class (or one `[subtable]` of an agent section)
//! as rows of optional string cells. Columns are addressed by a normalized
//! header name (spaces removed, lowercase) or by position; rows are addressed
//! by position or, when the table was built with a key field, by the value of
//! that column.
//!
//! Many WMI classes emit a summary line next to the per-instance lines. Its
//! key is spelled `_Total`, `__Total__`, `_Global` or left empty depending on
//! the class; all of them are stored under the aggregate key `None`.
//!
//! # Examples
//!
//! ```
//! use wmilib::table::{RowRef, WmiTable};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut table = WmiTable::new("", ["Name", "Disk Reads", "WMIStatus"], Some("Name"), None, None)?;
//! table.add_row(["C:", "12", "OK"]);
//! table.add_row(["_Total", "12", "OK"]);
//!
//! assert_eq!(table.get("C:", "diskreads", false)?, Some("12"));
//! assert_eq!(table.get(RowRef::TOTAL, "Disk Reads", false)?, Some("12"));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, WmiError};

/// Key spellings WMI uses for the summary line of a class
pub const TOTAL_NAMES: [&str; 4] = ["_Total", "", "__Total__", "_Global"];

/// Per-row collection status column appended by the agent
pub const STATUS_COLUMN: &str = "WMIStatus";

/// Normalize a header for lookup: drop spaces, lowercase
pub fn normalize_header(header: &str) -> String {
    header.replace(' ', "").to_lowercase()
}

/// Row address: position in the table or value of the key column
///
/// `Key(None)` is the aggregate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRef<'a> {
    Index(usize),
    Key(Option<&'a str>),
}

impl RowRef<'_> {
    /// The aggregate (`_Total`) row
    pub const TOTAL: RowRef<'static> = RowRef::Key(None);
}

impl From<usize> for RowRef<'_> {
    fn from(index: usize) -> Self {
        RowRef::Index(index)
    }
}

impl<'a> From<&'a str> for RowRef<'a> {
    fn from(key: &'a str) -> Self {
        RowRef::Key(Some(key))
    }
}

impl<'a> From<&'a String> for RowRef<'a> {
    fn from(key: &'a String) -> Self {
        RowRef::Key(Some(key.as_str()))
    }
}

impl<'a> From<Option<&'a str>> for RowRef<'a> {
    fn from(key: Option<&'a str>) -> Self {
        RowRef::Key(key)
    }
}

impl fmt::Display for RowRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "#{}", index),
            Self::Key(Some(key)) => write!(f, "{:?}", key),
            Self::Key(None) => write!(f, "<total>"),
        }
    }
}

/// Column address: position or header name (normalized on lookup)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRef<'a> {
    Index(usize),
    Name(&'a str),
}

impl From<usize> for ColumnRef<'_> {
    fn from(index: usize) -> Self {
        ColumnRef::Index(index)
    }
}

impl<'a> From<&'a str> for ColumnRef<'a> {
    fn from(name: &'a str) -> Self {
        ColumnRef::Name(name)
    }
}

impl<'a> From<&'a String> for ColumnRef<'a> {
    fn from(name: &'a String) -> Self {
        ColumnRef::Name(name.as_str())
    }
}

/// One table of performance counter rows
#[derive(Debug, Clone)]
pub struct WmiTable {
    name: String,
    /// Normalized headers in column order, without duplicates
    headers: Vec<String>,
    columns: HashMap<String, usize>,
    key_index: Option<usize>,
    /// Row positions by instance key (last write wins)
    row_lookup: HashMap<String, usize>,
    aggregate_row: Option<usize>,
    /// Keys in order of first appearance, `None` for the aggregate row
    row_labels: Vec<Option<String>>,
    rows: Vec<Vec<Option<String>>>,
    timestamp: Option<i64>,
    frequency: Option<i64>,
    timed_out: bool,
}

impl WmiTable {
    /// Create an empty table
    ///
    /// A blank header that follows a named one is taken as the base column of
    /// that counter and becomes `<previous>_Base`. Fails if `key_field` does
    /// not name a column.
    pub fn new<I, S>(
        name: impl Into<String>,
        headers: I,
        key_field: Option<&str>,
        timestamp: Option<i64>,
        frequency: Option<i64>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::unkeyed(name, headers, timestamp, frequency);
        if let Some(field) = key_field {
            match table.columns.get(&normalize_header(field)) {
                Some(&index) => table.key_index = Some(index),
                None => {
                    return Err(WmiError::KeyFieldNotFound {
                        field: field.to_string(),
                        valid: table.headers.join(", "),
                    })
                }
            }
        }
        Ok(table)
    }

    /// Create an empty table whose rows are only addressable by position
    pub fn unkeyed<I, S>(
        name: impl Into<String>,
        headers: I,
        timestamp: Option<i64>,
        frequency: Option<i64>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered = Vec::new();
        let mut columns = HashMap::new();
        let mut prev_header = String::new();

        for (index, header) in headers.into_iter().enumerate() {
            let header = header.as_ref();
            let header = if header.trim().is_empty() && !prev_header.is_empty() {
                normalize_header(&format!("{}_Base", prev_header))
            } else {
                normalize_header(header)
            };
            if columns.insert(header.clone(), index).is_none() {
                ordered.push(header.clone());
            }
            prev_header = header;
        }

        Self {
            name: name.into(),
            headers: ordered,
            columns,
            key_index: None,
            row_lookup: HashMap::new(),
            aggregate_row: None,
            row_labels: Vec::new(),
            rows: Vec::new(),
            timestamp,
            frequency,
            timed_out: false,
        }
    }

    /// Create a table and add `rows` to it
    pub fn with_rows<I, S, R, C>(
        name: impl Into<String>,
        headers: I,
        key_field: Option<&str>,
        timestamp: Option<i64>,
        frequency: Option<i64>,
        rows: R,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let mut table = Self::new(name, headers, key_field, timestamp, frequency)?;
        for row in rows {
            table.add_row(row);
        }
        Ok(table)
    }

    /// Append a row
    ///
    /// Rows may be shorter or longer than the header; missing cells read as
    /// `None`.
    pub fn add_row<I>(&mut self, row: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut row: Vec<Option<String>> = row
            .into_iter()
            .map(|cell| Some(cell.as_ref().to_string()))
            .collect();
        let position = self.rows.len();

        if let Some(key_index) = self.key_index {
            match row.get_mut(key_index) {
                Some(cell) => {
                    let key = cell.as_deref().unwrap_or_default().trim_matches('"').to_string();
                    if TOTAL_NAMES.contains(&key.as_str()) {
                        *cell = None;
                        if self.aggregate_row.replace(position).is_none() {
                            self.row_labels.push(None);
                        }
                    } else if self.row_lookup.insert(key.clone(), position).is_none() {
                        self.row_labels.push(Some(key));
                    }
                }
                None => log::debug!(
                    "Row {} of table {:?} has no key cell, not indexed",
                    position,
                    self.name
                ),
            }
        }

        if !self.timed_out && Self::reports_timeout(&row, self.columns.get("wmistatus").copied()) {
            self.timed_out = true;
        }
        self.rows.push(row);
    }

    /// Look at the status column, or at the last cell of rows too short to
    /// have one (seen with some Lync/Skype subsections)
    fn reports_timeout(row: &[Option<String>], status_index: Option<usize>) -> bool {
        let status = match status_index.and_then(|index| row.get(index)) {
            Some(cell) => cell.as_deref(),
            None => row.last().and_then(|cell| cell.as_deref()),
        };
        status.map_or(false, |status| status.eq_ignore_ascii_case("timeout"))
    }

    /// Read one cell
    ///
    /// Fails on unknown row keys and column names. A column past the end of a
    /// short row reads as `None`. With `raise_on_timeout`, a table the agent
    /// flagged as timed out fails with [`WmiError::Timeout`].
    pub fn get<'a, 'b>(
        &'a self,
        row: impl Into<RowRef<'b>>,
        column: impl Into<ColumnRef<'b>>,
        raise_on_timeout: bool,
    ) -> Result<Option<&'a str>> {
        if raise_on_timeout && self.timed_out {
            return Err(WmiError::Timeout {
                table: self.name.clone(),
            });
        }
        let row_index = self.row_index(row.into())?;
        let col_index = self.column_index(column.into())?;
        Ok(self.rows[row_index]
            .get(col_index)
            .and_then(|cell| cell.as_deref()))
    }

    fn row_index(&self, row: RowRef<'_>) -> Result<usize> {
        let found = match row {
            RowRef::Index(index) if index < self.rows.len() => Some(index),
            RowRef::Index(_) => None,
            RowRef::Key(Some(key)) => self.row_lookup.get(key).copied(),
            RowRef::Key(None) => self.aggregate_row,
        };
        found.ok_or_else(|| WmiError::RowNotFound {
            row: row.to_string(),
            valid: self
                .row_labels
                .iter()
                .map(|label| label.as_deref().unwrap_or("<total>"))
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    fn column_index(&self, column: ColumnRef<'_>) -> Result<usize> {
        match column {
            ColumnRef::Index(index) => Ok(index),
            ColumnRef::Name(name) => self
                .columns
                .get(&normalize_header(name))
                .copied()
                .ok_or_else(|| WmiError::ColumnNotFound {
                    column: name.to_string(),
                    valid: self.headers.join(", "),
                }),
        }
    }

    /// Whether `column` names a header of this table
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(&normalize_header(column))
    }

    /// Sub-table name, empty for single-table sections
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized headers in column order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// All row keys, `None` standing for the aggregate row
    pub fn row_labels(&self) -> &[Option<String>] {
        &self.row_labels
    }

    /// Whether the aggregate row is present
    pub fn has_total(&self) -> bool {
        self.aggregate_row.is_some()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    pub fn frequency(&self) -> Option<i64> {
        self.frequency
    }

    /// Whether any row reported a WMI timeout
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk_table() -> WmiTable {
        WmiTable::with_rows(
            "disk",
            ["Name", "Disk Reads", "AvgDiskQueueLength", "", "WMIStatus"],
            Some("Name"),
            None,
            None,
            vec![
                vec!["\"C:\"", "10", "5", "7", "OK"],
                vec!["D:", "20", "6", "8", "OK"],
                vec!["_Total", "30", "11", "15", "OK"],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Disk Reads Per Sec"), "diskreadspersec");
        let once = normalize_header(" Foo Bar ");
        assert_eq!(normalize_header(&once), once);
    }

    #[test]
    fn test_column_lookup_ignores_case_and_spaces() {
        let table = disk_table();
        for column in ["Disk Reads", "diskreads", "DISKREADS", "Disk  Reads", "Di skReads"] {
            assert_eq!(table.get("D:", column, false).unwrap(), Some("20"));
        }
    }

    #[test]
    fn test_blank_header_becomes_base() {
        let table = disk_table();
        assert!(table.has_column("AvgDiskQueueLength_Base"));
        assert_eq!(table.get("D:", "AvgDiskQueueLength_Base", false).unwrap(), Some("8"));
    }

    #[test]
    fn test_leading_blank_header_stays_blank() {
        let table = WmiTable::new("", ["", "", "Foo"], None, None, None).unwrap();
        assert_eq!(table.headers(), &["".to_string(), "foo".to_string()]);
    }

    #[test]
    fn test_key_quotes_stripped() {
        let table = disk_table();
        assert_eq!(table.get("C:", "Disk Reads", false).unwrap(), Some("10"));
    }

    #[test]
    fn test_total_names_map_to_aggregate() {
        for total in TOTAL_NAMES {
            let table = WmiTable::with_rows(
                "",
                ["Name", "Value"],
                Some("Name"),
                None,
                None,
                vec![vec![total, "1"], vec!["real", "2"]],
            )
            .unwrap();
            assert_eq!(table.row_labels(), &[None, Some("real".to_string())]);
            assert_eq!(table.get(RowRef::TOTAL, "Value", false).unwrap(), Some("1"));
            assert_eq!(table.get(RowRef::TOTAL, "Name", false).unwrap(), None);
        }
    }

    #[test]
    fn test_other_keys_preserved() {
        let table = WmiTable::with_rows(
            "",
            ["Name", "Value"],
            Some("Name"),
            None,
            None,
            vec![vec!["_Global_", "1"], vec!["_total", "2"]],
        )
        .unwrap();
        assert_eq!(
            table.row_labels(),
            &[Some("_Global_".to_string()), Some("_total".to_string())]
        );
        assert!(!table.has_total());
    }

    #[test]
    fn test_row_labels_and_count() {
        let table = disk_table();
        assert_eq!(table.row_count(), 3);
        assert_eq!(
            table.row_labels(),
            &[Some("C:".to_string()), Some("D:".to_string()), None]
        );
    }

    #[test]
    fn test_duplicate_key_last_write_wins() {
        let table = WmiTable::with_rows(
            "",
            ["Name", "Value"],
            Some("Name"),
            None,
            None,
            vec![vec!["a", "1"], vec!["a", "2"]],
        )
        .unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.row_labels().len(), 1);
        assert_eq!(table.get("a", "Value", false).unwrap(), Some("2"));
        assert_eq!(table.get(0usize, "Value", false).unwrap(), Some("1"));
    }

    #[test]
    fn test_unknown_key_field() {
        let err = WmiTable::new("", ["Name", "Value"], Some("instance"), None, None).unwrap_err();
        match err {
            WmiError::KeyFieldNotFound { field, valid } => {
                assert_eq!(field, "instance");
                assert_eq!(valid, "name, value");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_unknown_row_and_column() {
        let table = disk_table();
        assert!(matches!(
            table.get("E:", "Disk Reads", false),
            Err(WmiError::RowNotFound { .. })
        ));
        assert!(matches!(
            table.get(7usize, "Disk Reads", false),
            Err(WmiError::RowNotFound { .. })
        ));
        let err = table.get("C:", "Disk Writes", false).unwrap_err();
        assert!(err.to_string().contains("diskreads"));
    }

    #[test]
    fn test_index_addressing() {
        let table = disk_table();
        assert_eq!(table.get(1usize, 1usize, false).unwrap(), Some("20"));
        assert_eq!(table.get(1usize, 42usize, false).unwrap(), None);
    }

    #[test]
    fn test_unkeyed_table() {
        let table = WmiTable::with_rows(
            "",
            ["Value"],
            None,
            None,
            None,
            vec![vec!["1"], vec!["2"]],
        )
        .unwrap();
        assert!(table.row_labels().is_empty());
        assert_eq!(table.get(1usize, "Value", false).unwrap(), Some("2"));
    }

    #[test]
    fn test_timeout_via_status_column() {
        let mut table = disk_table();
        assert!(!table.timed_out());
        table.add_row(["E:", "0", "0", "0", "Timeout"]);
        assert!(table.timed_out());
        assert!(matches!(
            table.get("C:", "Disk Reads", true),
            Err(WmiError::Timeout { .. })
        ));
        assert_eq!(table.get("C:", "Disk Reads", false).unwrap(), Some("10"));
    }

    #[test]
    fn test_timeout_via_last_cell_of_short_row() {
        let mut table = disk_table();
        table.add_row(["F:", "TIMEOUT"]);
        assert!(table.timed_out());
    }

    #[test]
    fn test_short_row_reads_none() {
        let mut table = disk_table();
        table.add_row(["G:", "3"]);
        assert_eq!(table.get("G:", "AvgDiskQueueLength", false).unwrap(), None);
        assert!(!table.timed_out());
    }

    #[test]
    fn test_global_timing() {
        let table = WmiTable::new("x", ["Name"], None, Some(100), Some(10)).unwrap();
        assert_eq!(table.name(), "x");
        assert_eq!(table.timestamp(), Some(100));
        assert_eq!(table.frequency(), Some(10));
    }
}
