use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, Result};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Document model, one row of the `documents` table
#[derive(Debug, Clone, FromRow)]
pub struct Document {
    pub id: i64,
    pub title: String,
    /// Server-generated storage name
    pub filename: String,
    /// Client-supplied file name; NULL for rows written before it was tracked
    pub original_name: Option<String>,
    pub filepath: String,
    pub filesize: i64,
    pub mimetype: Option<String>,
    pub uploaded_at: String,
}

impl Document {
    /// Name presented to clients and used for downloads
    pub fn display_name(&self) -> &str {
        self.original_name.as_deref().unwrap_or(&self.filename)
    }
}

/// Values for a new row; id and upload time are assigned on insert
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub filename: String,
    pub original_name: String,
    pub filepath: String,
    pub filesize: i64,
    pub mimetype: Option<String>,
}

/// Document as returned by the listing endpoint. Never carries the storage path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: i64,
    pub title: String,
    pub filename: String,
    pub size: i64,
    pub mimetype: Option<String>,
    pub uploaded_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            filename: doc.display_name().to_string(),
            id: doc.id,
            title: doc.title,
            size: doc.filesize,
            mimetype: doc.mimetype,
            uploaded_at: doc.uploaded_at,
        }
    }
}

/// Summary of one stored file in an upload response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedDocument {
    pub id: i64,
    pub title: String,
    pub filename: String,
    pub size: i64,
    pub uploaded_at: String,
}

impl From<Document> for UploadedDocument {
    fn from(doc: Document) -> Self {
        Self {
            filename: doc.display_name().to_string(),
            id: doc.id,
            title: doc.title,
            size: doc.filesize,
            uploaded_at: doc.uploaded_at,
        }
    }
}

/// Upload response
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub documents: Vec<UploadedDocument>,
}

impl UploadResponse {
    pub fn new(documents: Vec<UploadedDocument>) -> Self {
        Self {
            message: format!("Successfully uploaded {} document(s)", documents.len()),
            documents,
        }
    }
}

/// Sort direction over upload time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// Raw listing query string. Fields stay strings so that bad numbers become
/// validation errors with our own error body.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
    #[serde(rename = "sortOrder")]
    pub sort_order: Option<String>,
    pub q: Option<String>,
}

/// Validated listing parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub page: i64,
    pub page_size: i64,
    pub sort_order: SortOrder,
    pub query: String,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_order: SortOrder::Desc,
            query: String::new(),
        }
    }
}

fn invalid_pagination() -> AppError {
    AppError::validation(
        "invalid_pagination",
        format!(
            "Page must be >= 1 and pageSize must be between 1 and {}",
            MAX_PAGE_SIZE
        ),
    )
}

fn parse_number(raw: Option<&str>, default: i64) -> Result<i64> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => s.parse().map_err(|_| invalid_pagination()),
    }
}

impl ListParams {
    pub fn parse(query: &ListQuery) -> Result<Self> {
        let page = parse_number(query.page.as_deref(), 1)?;
        let page_size = parse_number(query.page_size.as_deref(), DEFAULT_PAGE_SIZE)?;

        if page < 1 || !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(invalid_pagination());
        }

        let sort_order = match query.sort_order.as_deref().filter(|s| !s.is_empty()) {
            None => SortOrder::default(),
            Some(s) => SortOrder::from_str(s).ok_or_else(|| {
                AppError::validation(
                    "invalid_sort_order",
                    "sortOrder must be either \"asc\" or \"desc\"",
                )
            })?,
        };

        Ok(Self {
            page,
            page_size,
            sort_order,
            query: query.q.clone().unwrap_or_default(),
        })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

/// Pagination metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: i64, page_size: i64, total: i64) -> Self {
        let total_pages = if total <= 0 {
            0
        } else {
            (total + page_size - 1) / page_size
        };
        Self {
            page,
            page_size,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Listing response
#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentResponse>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<&str>, page_size: Option<&str>, sort: Option<&str>) -> ListQuery {
        ListQuery {
            page: page.map(String::from),
            page_size: page_size.map(String::from),
            sort_order: sort.map(String::from),
            q: None,
        }
    }

    #[test]
    fn test_defaults_when_absent() {
        let params = ListParams::parse(&ListQuery::default()).unwrap();
        assert_eq!(params, ListParams::default());
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let params = ListParams::parse(&query(Some(""), Some(" "), Some(""))).unwrap();
        assert_eq!(params.page, 1);
        assert_eq!(params.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(params.sort_order, SortOrder::Desc);
    }

    #[test]
    fn test_offset() {
        let params = ListParams::parse(&query(Some("3"), Some("25"), Some("asc"))).unwrap();
        assert_eq!(params.offset(), 50);
        assert_eq!(params.sort_order, SortOrder::Asc);
    }

    #[test]
    fn test_sort_order_is_case_insensitive() {
        let params = ListParams::parse(&query(None, None, Some("ASC"))).unwrap();
        assert_eq!(params.sort_order, SortOrder::Asc);
        assert_eq!(params.sort_order.as_sql(), "ASC");
    }

    #[test]
    fn test_rejects_invalid_pagination() {
        for (page, size) in [
            (Some("0"), None),
            (Some("-2"), None),
            (None, Some("0")),
            (None, Some("101")),
            (Some("abc"), None),
            (None, Some("1.5")),
        ] {
            let err = ListParams::parse(&query(page, size, None)).unwrap_err();
            assert_eq!(err.code(), "invalid_pagination", "page={:?} size={:?}", page, size);
        }
    }

    #[test]
    fn test_page_size_bounds_are_inclusive() {
        assert!(ListParams::parse(&query(None, Some("1"), None)).is_ok());
        assert!(ListParams::parse(&query(None, Some("100"), None)).is_ok());
    }

    #[test]
    fn test_rejects_unknown_sort_order() {
        let err = ListParams::parse(&query(None, None, Some("bogus"))).unwrap_err();
        assert_eq!(err.code(), "invalid_sort_order");
    }

    #[test]
    fn test_pagination_math() {
        let p = Pagination::new(1, 10, 25);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(!p.has_prev);

        let p = Pagination::new(3, 10, 25);
        assert!(!p.has_next);
        assert!(p.has_prev);

        let p = Pagination::new(2, 10, 20);
        assert_eq!(p.total_pages, 2);
        assert!(!p.has_next);
    }

    #[test]
    fn test_pagination_empty_result() {
        let p = Pagination::new(1, 10, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next);
        assert!(!p.has_prev);
    }

    #[test]
    fn test_response_hides_storage_details() {
        let doc = Document {
            id: 4,
            title: "Quarterly".into(),
            filename: "9b1c.pdf".into(),
            original_name: Some("q3.pdf".into()),
            filepath: "/srv/uploads/9b1c.pdf".into(),
            filesize: 12,
            mimetype: Some("application/pdf".into()),
            uploaded_at: "2024-05-01T10:00:00.000Z".into(),
        };
        let json = serde_json::to_value(DocumentResponse::from(doc)).unwrap();
        assert_eq!(json["filename"], "q3.pdf");
        assert_eq!(json["uploadedAt"], "2024-05-01T10:00:00.000Z");
        assert_eq!(json["size"], 12);
        assert!(json.get("filepath").is_none());
        assert!(!json.to_string().contains("/srv/uploads"));
    }

    #[test]
    fn test_legacy_row_falls_back_to_storage_name() {
        let doc = Document {
            id: 1,
            title: "t".into(),
            filename: "1700000000-report.pdf".into(),
            original_name: None,
            filepath: "uploads/1700000000-report.pdf".into(),
            filesize: 0,
            mimetype: None,
            uploaded_at: "2023-11-14 22:13:20".into(),
        };
        assert_eq!(doc.display_name(), "1700000000-report.pdf");
    }
}
