use serde::{Deserialize, Serialize};

/// Page size used by the dashboard when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 6;

/// Paged list envelope returned by the list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub page_index: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub total_count: u64,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

impl<T> Default for Paged<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            page_index: 1,
            page_size: DEFAULT_PAGE_SIZE,
            total_pages: 1,
            total_count: 0,
            has_previous_page: false,
            has_next_page: false,
        }
    }
}

/// Acknowledgment returned by create/update/delete endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct Ack {
    pub success: bool,
    pub message: Option<String>,
}

impl Ack {
    /// Sentinel for a no-content response.
    pub fn not_found() -> Self {
        Self {
            success: false,
            message: Some("Not found".to_string()),
        }
    }

    pub fn message_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.message.as_deref().filter(|m| !m.is_empty()).unwrap_or(fallback)
    }
}

/// Paging and search parameters for list endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page_index: u32,
    pub page_size: u32,
    pub search_term: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_index: 1,
            page_size: DEFAULT_PAGE_SIZE,
            search_term: None,
        }
    }
}

impl PageRequest {
    pub fn page(page_index: u32, page_size: u32) -> Self {
        Self {
            page_index,
            page_size,
            search_term: None,
        }
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    /// Query pairs in the backend's parameter names. Zero values fall back
    /// to the defaults; blank search terms are omitted.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let page_index = if self.page_index == 0 { 1 } else { self.page_index };
        let page_size = if self.page_size == 0 { DEFAULT_PAGE_SIZE } else { self.page_size };

        let mut query = vec![
            ("pageIndex".to_string(), page_index.to_string()),
            ("pageSize".to_string(), page_size.to_string()),
        ];
        if let Some(term) = self.search_term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query.push(("searchTerm".to_string(), term.to_string()));
        }
        query
    }
}
