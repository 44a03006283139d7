//! Service discovery over WMI sections
//!
//! A check usually needs several tables of one section (e.g. the counters and
//! the matching `computer_system` table). Instances are discovered only if
//! they appear in every required table; the total service only if every
//! required table has an aggregate row.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::parser::WmiSection;
use crate::table::RowRef;

/// A service proposed by discovery; `item` is `None` for the total service
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Service {
    pub item: Option<String>,
}

/// Veto predicate, called with the section and the candidate row key
pub type DiscoveryFilter<'f> = &'f dyn Fn(&WmiSection, Option<&str>) -> bool;

/// Whether any of `required` is absent from `section`
pub fn required_tables_missing(section: &WmiSection, required: &[&str]) -> bool {
    required.iter().any(|name| !section.contains_key(*name))
}

fn required_names<'s>(section: &'s WmiSection, required: Option<&[&'s str]>) -> Vec<&'s str> {
    match required {
        Some(required) => required.to_vec(),
        None => section.keys().map(String::as_str).collect(),
    }
}

/// One service per instance present in all required tables
///
/// `required` defaults to every table of the section. The aggregate row is
/// never an instance. Items come out sorted.
pub fn discover_wmi_table_instances(
    section: &WmiSection,
    required: Option<&[&str]>,
    filter: Option<DiscoveryFilter<'_>>,
) -> Vec<Service> {
    if section.is_empty() {
        return Vec::new();
    }
    let required = required_names(section, required);
    if required_tables_missing(section, &required) {
        return Vec::new();
    }

    let mut instances: Option<BTreeSet<&str>> = None;
    for name in &required {
        let labels: BTreeSet<&str> = section[*name]
            .row_labels()
            .iter()
            .filter_map(|label| label.as_deref())
            .collect();
        instances = Some(match instances {
            Some(found) => found.intersection(&labels).copied().collect(),
            None => labels,
        });
    }

    instances
        .unwrap_or_default()
        .into_iter()
        .filter(|item| filter.map_or(true, |accept| accept(section, Some(item))))
        .map(|item| Service {
            item: Some(item.to_string()),
        })
        .collect()
}

/// A single total service if all required tables have an aggregate row
pub fn discover_wmi_table_total(
    section: &WmiSection,
    required: Option<&[&str]>,
    filter: Option<DiscoveryFilter<'_>>,
) -> Vec<Service> {
    if section.is_empty() {
        return Vec::new();
    }
    let required = required_names(section, required);
    let all_have_total = required
        .iter()
        .all(|name| section.get(*name).map_or(false, |table| table.has_total()));
    if !all_have_total {
        return Vec::new();
    }
    if !filter.map_or(true, |accept| accept(section, None)) {
        return Vec::new();
    }
    vec![Service { item: None }]
}

/// Filter accepting a row only if its `Name` is `_Global_` in every table
///
/// Used by .NET CLR checks, whose summary line is `_Global_` rather than one
/// of the usual total spellings.
pub fn wmi_filter_global_only(section: &WmiSection, row: Option<&str>) -> bool {
    section.values().all(|table| {
        matches!(
            table.get(RowRef::Key(row), "Name", false),
            Ok(Some("_Global_"))
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::WmiTable;

    fn table(name: &str, keys: &[&str]) -> WmiTable {
        WmiTable::with_rows(
            name,
            ["Name", "Value"],
            Some("Name"),
            None,
            None,
            keys.iter().map(|key| [*key, "1"]),
        )
        .unwrap()
    }

    fn section(tables: Vec<WmiTable>) -> WmiSection {
        tables
            .into_iter()
            .map(|table| (table.name().to_string(), table))
            .collect()
    }

    fn items(services: &[Service]) -> Vec<Option<&str>> {
        services.iter().map(|s| s.item.as_deref()).collect()
    }

    #[test]
    fn test_required_tables_missing() {
        let section = section(vec![table("A", &["x"])]);
        assert!(!required_tables_missing(&section, &["A"]));
        assert!(required_tables_missing(&section, &["A", "B"]));
    }

    #[test]
    fn test_instances_intersection() {
        let section = section(vec![
            table("A", &["x", "y", "_Total"]),
            table("B", &["y", "z", "_Total"]),
        ]);
        let found = discover_wmi_table_instances(&section, None, None);
        assert_eq!(items(&found), vec![Some("y")]);
    }

    #[test]
    fn test_instances_subset_of_tables() {
        let section = section(vec![table("A", &["x", "y"]), table("B", &["y"])]);
        let found = discover_wmi_table_instances(&section, Some(&["A"]), None);
        assert_eq!(items(&found), vec![Some("x"), Some("y")]);
    }

    #[test]
    fn test_instances_missing_required_table() {
        let section = section(vec![table("A", &["x"])]);
        assert!(discover_wmi_table_instances(&section, Some(&["A", "B"]), None).is_empty());
        assert!(discover_wmi_table_instances(&WmiSection::new(), None, None).is_empty());
    }

    #[test]
    fn test_instances_disjoint_tables() {
        let section = section(vec![
            table("A", &["x"]),
            table("B", &["y"]),
            table("C", &["x", "y"]),
        ]);
        assert!(discover_wmi_table_instances(&section, None, None).is_empty());
    }

    #[test]
    fn test_instances_filter() {
        let section = section(vec![table("A", &["x", "y"])]);
        let only_x = |_: &WmiSection, row: Option<&str>| row == Some("x");
        let found = discover_wmi_table_instances(&section, None, Some(&only_x));
        assert_eq!(items(&found), vec![Some("x")]);
    }

    #[test]
    fn test_total() {
        let with_total = section(vec![table("A", &["x", "_Total"]), table("B", &["__Total__"])]);
        assert_eq!(
            discover_wmi_table_total(&with_total, None, None),
            vec![Service { item: None }]
        );

        let partial = section(vec![table("A", &["x", "_Total"]), table("B", &["x"])]);
        assert!(discover_wmi_table_total(&partial, None, None).is_empty());
        assert_eq!(discover_wmi_table_total(&partial, Some(&["A"]), None).len(), 1);
        assert!(discover_wmi_table_total(&partial, Some(&["A", "C"]), None).is_empty());
    }

    #[test]
    fn test_total_filter_veto() {
        let section = section(vec![table("A", &["_Total"])]);
        let never = |_: &WmiSection, _: Option<&str>| false;
        assert!(discover_wmi_table_total(&section, None, Some(&never)).is_empty());
    }

    #[test]
    fn test_filter_global_only() {
        let section = section(vec![table("", &["_Global_", "w3wp"])]);
        assert!(wmi_filter_global_only(&section, Some("_Global_")));
        assert!(!wmi_filter_global_only(&section, Some("w3wp")));
        assert!(!wmi_filter_global_only(&section, Some("missing")));

        let found = discover_wmi_table_instances(&section, None, Some(&wmi_filter_global_only));
        assert_eq!(items(&found), vec![Some("_Global_")]);
    }
}
