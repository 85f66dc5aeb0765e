//! Admin table view over the stored CTA/Form arrays: filter, sort, paginate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::types::CategoryRef;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Text(String),
    Date(DateTime<Utc>),
    Flag(bool),
    Number(i64),
}

impl SortValue {
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_lowercase())
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Flag(a), Self::Flag(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// A denormalized row that can be ordered by one of its named fields.
pub trait TableRow {
    const SORT_FIELDS: &'static [&'static str];

    fn sort_value(&self, field: &str) -> Option<SortValue>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortDirection {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(()),
        }
    }
}

/// Raw query-string parameters of the table endpoints.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableQuery {
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub is_global: Option<String>,
    pub status: Option<String>,
    pub sort_field: Option<String>,
    pub sort_direction: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableFilter {
    pub search: Option<String>,
    pub kind: Option<String>,
    pub category: Option<CategoryRef>,
    pub tag: Option<Uuid>,
    pub is_global: Option<bool>,
    pub live: Option<bool>,
    pub sort_field: Option<&'static str>,
    pub direction: SortDirection,
    pub page: u32,
    pub page_size: u32,
}

fn parse_flag(name: &str, value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(format!("Invalid value for {name}: {value}")),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl TableQuery {
    /// Validate the raw parameters against the sortable fields of `R`.
    pub fn parse<R: TableRow>(&self) -> Result<TableFilter, String> {
        let sort_field = match non_empty(&self.sort_field) {
            Some(field) => Some(
                R::SORT_FIELDS
                    .iter()
                    .copied()
                    .find(|known| *known == field)
                    .ok_or_else(|| format!("Unknown sort field: {field}"))?,
            ),
            None => None,
        };

        let direction = match non_empty(&self.sort_direction) {
            Some(d) => d
                .parse()
                .map_err(|_| format!("Invalid sort direction: {d}"))?,
            None => SortDirection::default(),
        };

        let category = non_empty(&self.category)
            .map(str::parse::<CategoryRef>)
            .transpose()?;

        let tag = non_empty(&self.tag)
            .map(|t| Uuid::parse_str(t).map_err(|_| format!("Invalid tag id: {t}")))
            .transpose()?;

        let is_global = non_empty(&self.is_global)
            .map(|v| parse_flag("isGlobal", v))
            .transpose()?;

        let live = match non_empty(&self.status).map(str::to_lowercase).as_deref() {
            None | Some("all") => None,
            Some("active") | Some("enabled") => Some(true),
            Some("inactive") | Some("disabled") => Some(false),
            Some(other) => return Err(format!("Invalid status: {other}")),
        };

        let page = self.page.unwrap_or(1).max(1);
        let page_size = self
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        Ok(TableFilter {
            search: non_empty(&self.search).map(str::to_lowercase),
            kind: non_empty(&self.kind).map(str::to_string),
            category,
            tag,
            is_global,
            live,
            sort_field,
            direction,
            page,
            page_size,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TableStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub global: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePage<R> {
    pub rows: Vec<R>,
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub stats: TableStats,
}

/// Sort already-filtered rows and cut out the requested page. Rows must be
/// passed in stored order: the sort is stable, so ties keep that order.
pub fn sort_and_paginate<R: TableRow>(
    mut rows: Vec<R>,
    filter: &TableFilter,
    stats: TableStats,
) -> TablePage<R> {
    if let Some(field) = filter.sort_field {
        rows.sort_by(|a, b| {
            let ordering = match (a.sort_value(field), b.sort_value(field)) {
                (Some(a), Some(b)) => a.compare(&b),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            match filter.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }

    let total = rows.len();
    let page_size = filter.page_size as usize;
    let total_pages = total.div_ceil(page_size) as u32;
    let start = (filter.page as usize - 1).saturating_mul(page_size);

    let rows: Vec<R> = rows.into_iter().skip(start).take(page_size).collect();

    TablePage {
        rows,
        total,
        page: filter.page,
        page_size: filter.page_size,
        total_pages,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        name: &'static str,
        modified: DateTime<Utc>,
    }

    impl TableRow for Row {
        const SORT_FIELDS: &'static [&'static str] = &["name", "lastModified"];

        fn sort_value(&self, field: &str) -> Option<SortValue> {
            match field {
                "name" => Some(SortValue::text(self.name)),
                "lastModified" => Some(SortValue::Date(self.modified)),
                _ => None,
            }
        }
    }

    fn rows() -> Vec<Row> {
        let base = Utc::now();
        vec![
            Row { name: "beta", modified: base + chrono::Duration::seconds(30) },
            Row { name: "Alpha", modified: base },
            Row { name: "gamma", modified: base + chrono::Duration::seconds(10) },
            Row { name: "alpha", modified: base + chrono::Duration::seconds(30) },
        ]
    }

    fn query(pairs: &[(&str, &str)]) -> TableQuery {
        let mut q = TableQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "sortField" => q.sort_field = v,
                "sortDirection" => q.sort_direction = v,
                "status" => q.status = v,
                "category" => q.category = v,
                _ => unreachable!(),
            }
        }
        q
    }

    #[test]
    fn test_unknown_sort_field_rejected() {
        let err = query(&[("sortField", "popularity")]).parse::<Row>().unwrap_err();
        assert!(err.contains("popularity"));
    }

    #[test]
    fn test_sort_by_date_ascending() {
        let filter = query(&[("sortField", "lastModified"), ("sortDirection", "asc")])
            .parse::<Row>()
            .unwrap();
        let page = sort_and_paginate(rows(), &filter, TableStats::default());
        let stamps: Vec<_> = page.rows.iter().map(|r| r.modified).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        // "beta" and "alpha" tie on the timestamp and keep stored order.
        assert_eq!(page.rows[2].name, "beta");
        assert_eq!(page.rows[3].name, "alpha");
    }

    #[test]
    fn test_sort_by_name_is_case_insensitive_and_stable() {
        let filter = query(&[("sortField", "name"), ("sortDirection", "asc")])
            .parse::<Row>()
            .unwrap();
        let page = sort_and_paginate(rows(), &filter, TableStats::default());
        let names: Vec<_> = page.rows.iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Alpha", "alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_pagination_bounds() {
        let mut q = TableQuery::default();
        q.page = Some(2);
        q.page_size = Some(3);
        let filter = q.parse::<Row>().unwrap();
        let page = sort_and_paginate(rows(), &filter, TableStats::default());
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.rows.len(), 1);

        q.page = Some(9);
        let filter = q.parse::<Row>().unwrap();
        assert!(sort_and_paginate(rows(), &filter, TableStats::default()).rows.is_empty());

        q.page_size = Some(10_000);
        assert_eq!(q.parse::<Row>().unwrap().page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_filter_parsing() {
        let filter = query(&[("status", "inactive"), ("category", "global")])
            .parse::<Row>()
            .unwrap();
        assert_eq!(filter.live, Some(false));
        assert_eq!(filter.category, Some(CategoryRef::Global));
        assert_eq!(filter.direction, SortDirection::Desc);

        assert!(query(&[("status", "maybe")]).parse::<Row>().is_err());
        assert!(query(&[("category", "not-a-uuid")]).parse::<Row>().is_err());
    }
}
