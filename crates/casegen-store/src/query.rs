//! Test query and paging types

use casegen_model::{CaseType, RequestId};
use serde::{Deserialize, Serialize};

/// Paged search over test rows
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestQuery {
    /// Case-insensitive substring over name, code, and tags
    pub search: Option<String>,
    /// Filter by test kind
    pub test_type: Option<CaseType>,
    /// Restrict to one request
    pub request_id: Option<RequestId>,
    /// Include rows marked duplicate (default false)
    pub include_duplicates: bool,
    /// 1-based page number
    pub page: usize,
    /// Rows per page
    pub page_size: usize,
}

impl TestQuery {
    /// Query with default paging (page 1, 50 rows)
    #[must_use]
    pub fn new() -> Self {
        Self {
            page: 1,
            page_size: 50,
            ..Self::default()
        }
    }

    /// With search term
    #[inline]
    #[must_use]
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// With test kind filter
    #[inline]
    #[must_use]
    pub fn test_type(mut self, kind: CaseType) -> Self {
        self.test_type = Some(kind);
        self
    }

    /// Restricted to one request
    #[inline]
    #[must_use]
    pub fn request(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    /// With page number and size
    #[inline]
    #[must_use]
    pub fn page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page.max(1);
        self.page_size = page_size.max(1);
        self
    }
}

/// One page of query results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Rows on this page
    pub items: Vec<T>,
    /// 1-based page number
    pub page: usize,
    /// Requested page size
    pub page_size: usize,
    /// Total matching rows across all pages
    pub total: usize,
}

impl<T> Page<T> {
    /// Slice `matches` into the requested page
    #[must_use]
    pub fn from_matches(matches: Vec<T>, page: usize, page_size: usize) -> Self {
        let total = matches.len();
        let page = page.max(1);
        let page_size = page_size.max(1);
        let start = (page - 1).saturating_mul(page_size);
        let items = if start >= total {
            Vec::new()
        } else {
            matches
                .into_iter()
                .skip(start)
                .take(page_size)
                .collect()
        };
        Self {
            items,
            page,
            page_size,
            total,
        }
    }
}
