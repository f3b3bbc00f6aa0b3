use serde::{Deserialize, Serialize};

/// Page size used when a caller supplies none.
pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// Pagination window, 0-indexed `(limit, offset)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub order_by: String,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            order_by: String::new(),
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl ListParams {
    /// Window with `limit <= 0` coerced to [`DEFAULT_PAGE_SIZE`] and a
    /// negative `offset` coerced to zero.
    pub fn new(order_by: impl Into<String>, limit: i64, offset: i64) -> Self {
        Self {
            order_by: order_by.into(),
            limit: if limit <= 0 { DEFAULT_PAGE_SIZE } else { limit },
            offset: offset.max(0),
        }
    }

    /// Convert a 1-indexed `(page, page_size)` pair into a window.
    pub fn from_page(order_by: impl Into<String>, page: i64, page_size: i64) -> Self {
        let page = page.max(1);
        let size = if page_size <= 0 { DEFAULT_PAGE_SIZE } else { page_size };
        Self {
            order_by: order_by.into(),
            limit: size,
            offset: (page - 1).saturating_mul(size),
        }
    }

    /// The 1-indexed page this window starts on.
    pub fn page(&self) -> Page {
        let size = if self.limit <= 0 { DEFAULT_PAGE_SIZE } else { self.limit };
        Page {
            number: self.offset.max(0) / size + 1,
            size,
        }
    }
}

/// A 1-indexed page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: i64,
    pub size: i64,
}

impl Page {
    pub fn new(number: i64, size: i64) -> Self {
        Self { number, size }
    }

    pub fn offset(&self) -> i64 {
        (self.number.max(1) - 1).saturating_mul(self.size)
    }

    pub fn limit(&self) -> i64 {
        self.size
    }
}
