//! Catalog records and pagination.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Default page number when the caller omits it.
pub const DEFAULT_PAGE: u32 = 1;

/// Default page size when the caller omits it.
pub const DEFAULT_PER_PAGE: u32 = 15;

/// Smallest accepted page size.
pub const MIN_PER_PAGE: u32 = 1;

/// Largest accepted page size.
pub const MAX_PER_PAGE: u32 = 50;

/// Which catalog a request targets. Each kind is backed by its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Movies,
    Series,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 2] = [CatalogKind::Movies, CatalogKind::Series];

    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::Movies => "movies",
            CatalogKind::Series => "series",
        }
    }

    /// Table holding this kind's rows. Never derived from user input.
    pub fn table_name(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CatalogKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movies" => Ok(CatalogKind::Movies),
            "series" => Ok(CatalogKind::Series),
            other => Err(ValidationError::InvalidValue {
                field: "kind".to_string(),
                reason: format!("unknown catalog '{}', expected movies or series", other),
            }),
        }
    }
}

/// A single catalog row. `id` is explicit; the remaining columns travel as
/// a JSON object and are flattened back into the record when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CatalogRecord {
    pub id: i64,
    #[serde(flatten)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub attributes: Map<String, Value>,
}

impl CatalogRecord {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// One page of catalog records, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
    pub items: Vec<CatalogRecord>,
}

/// Validated pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    /// Validate raw pagination input. `page` must be at least 1 and
    /// `per_page` must fall in `[MIN_PER_PAGE, MAX_PER_PAGE]`.
    pub fn new(page: i64, per_page: i64) -> Result<Self, ValidationError> {
        if page < 1 || page > i64::from(u32::MAX) {
            return Err(ValidationError::OutOfRange {
                field: "page".to_string(),
                min: 1,
                max: i64::from(u32::MAX),
                got: page,
            });
        }
        let per_page_u32 = validate_per_page(per_page)?;
        Ok(Self {
            page: page as u32,
            per_page: per_page_u32,
        })
    }

    /// Row offset of the first record on this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// Validate a page size on its own (used by total-page counts).
pub fn validate_per_page(per_page: i64) -> Result<u32, ValidationError> {
    if per_page < i64::from(MIN_PER_PAGE) || per_page > i64::from(MAX_PER_PAGE) {
        return Err(ValidationError::OutOfRange {
            field: "perPage".to_string(),
            min: i64::from(MIN_PER_PAGE),
            max: i64::from(MAX_PER_PAGE),
            got: per_page,
        });
    }
    Ok(per_page as u32)
}

/// Number of pages needed to show `row_count` rows, `per_page` at a time.
pub fn total_pages(row_count: u64, per_page: u32) -> u64 {
    let per_page = u64::from(per_page.max(1));
    row_count.div_ceil(per_page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_catalog_kind_parse() {
        assert_eq!("movies".parse::<CatalogKind>(), Ok(CatalogKind::Movies));
        assert_eq!("series".parse::<CatalogKind>(), Ok(CatalogKind::Series));
        assert!("books".parse::<CatalogKind>().is_err());
        assert!("Movies".parse::<CatalogKind>().is_err());
    }

    #[test]
    fn test_page_request_bounds() {
        assert!(PageRequest::new(0, 15).is_err());
        assert!(PageRequest::new(-3, 15).is_err());
        assert!(PageRequest::new(1, 0).is_err());
        assert!(PageRequest::new(1, 51).is_err());
        assert_eq!(
            PageRequest::new(3, 50),
            Ok(PageRequest {
                page: 3,
                per_page: 50
            })
        );
    }

    #[test]
    fn test_page_offset() {
        let req = PageRequest::new(3, 15).unwrap();
        assert_eq!(req.offset(), 30);
        assert_eq!(PageRequest::default().offset(), 0);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(total_pages(0, 15), 0);
        assert_eq!(total_pages(15, 15), 1);
        assert_eq!(total_pages(16, 15), 2);
        assert_eq!(total_pages(101, 50), 3);
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = CatalogRecord::new(7).with_attribute("title", "Alien");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"id": 7, "title": "Alien"}));

        let page = Page {
            page: 1,
            per_page: 15,
            items: vec![record],
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["perPage"], 15);
        assert_eq!(json["items"][0]["title"], "Alien");
    }

    proptest! {
        #[test]
        fn prop_total_pages_covers_every_row(rows in 0u64..10_000, per_page in 1u32..=50) {
            let pages = total_pages(rows, per_page);
            prop_assert!(pages * u64::from(per_page) >= rows);
            if pages > 0 {
                prop_assert!((pages - 1) * u64::from(per_page) < rows);
            }
        }
    }
}
