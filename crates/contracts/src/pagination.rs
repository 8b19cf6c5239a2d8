// Pagination envelope shared by every list-returning operation
//
// `total_pages` is always derived from `total` and `size`. It is emitted on
// the wire for clients but recomputed, not trusted, when a page is decoded.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page selection as sent by a caller. Missing values take service defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema, IntoParams))]
pub struct PageRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, alias = "limit", skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page: Some(page),
            size: Some(size),
        }
    }

    /// Clamp into a concrete window using the service's default size.
    pub fn resolve(&self, default_size: u32) -> PageWindow {
        let page = self.page.unwrap_or(DEFAULT_PAGE).max(1);
        let size = self
            .size
            .unwrap_or(default_size)
            .clamp(1, MAX_PAGE_SIZE);
        PageWindow { page, size }
    }
}

/// A resolved page: both values are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub size: u32,
}

impl PageWindow {
    /// Number of items to skip.
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.size as usize
    }

    pub fn limit(&self) -> usize {
        self.size as usize
    }
}

/// `ceil(total / size)`, zero when there is nothing to page.
pub fn total_pages(total: u64, size: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let size = u64::from(size.max(1));
    total.div_ceil(size).min(u64::from(u32::MAX)) as u32
}

/// Standard list result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase", from = "PageWire<T>")]
pub struct Page<T> {
    /// Items on this page, in collection order.
    pub data: Vec<T>,
    /// Size of the whole collection.
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, window: PageWindow) -> Self {
        Self {
            data,
            total,
            page: window.page,
            size: window.size,
            total_pages: total_pages(total, window.size),
        }
    }

    /// Slice an in-memory collection.
    ///
    /// A page past the end yields empty `data` with the real `total`.
    pub fn paginate(items: Vec<T>, window: PageWindow) -> Self {
        let total = items.len() as u64;
        let data = items
            .into_iter()
            .skip(window.offset())
            .take(window.limit())
            .collect();
        Self::new(data, total, window)
    }

    pub fn empty(window: PageWindow) -> Self {
        Self::new(Vec::new(), 0, window)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            size: self.size,
            total_pages: self.total_pages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// Decoding goes through this shape so a caller-supplied `totalPages` is ignored
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageWire<T> {
    data: Vec<T>,
    total: u64,
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_size", alias = "limit")]
    size: u32,
}

fn default_page() -> u32 {
    DEFAULT_PAGE
}

fn default_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl<T> From<PageWire<T>> for Page<T> {
    fn from(wire: PageWire<T>) -> Self {
        let window = PageWindow {
            page: wire.page.max(1),
            size: wire.size.max(1),
        };
        Page::new(wire.data, wire.total, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_collection_has_no_pages() {
        for (page, size) in [(1, 10), (7, 3), (1, 1)] {
            let window = PageRequest::new(page, size).resolve(DEFAULT_PAGE_SIZE);
            let result: Page<u32> = Page::paginate(vec![], window);
            assert_eq!(result.total, 0);
            assert_eq!(result.total_pages, 0);
        }
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let window = PageRequest::new(1, 10).resolve(DEFAULT_PAGE_SIZE);
        let result = Page::paginate((0..25).collect::<Vec<u32>>(), window);
        assert_eq!(result.total_pages, 3);
        assert_eq!(result.data.len(), 10);
    }

    #[test]
    fn test_page_past_end_is_empty_not_error() {
        let window = PageRequest::new(5, 10).resolve(DEFAULT_PAGE_SIZE);
        let result = Page::paginate((0..25).collect::<Vec<u32>>(), window);
        assert!(result.data.is_empty());
        assert_eq!(result.total, 25);
        assert_eq!(result.total_pages, 3);
        assert_eq!(result.page, 5);
    }

    #[test]
    fn test_last_partial_page() {
        let window = PageRequest::new(3, 10).resolve(DEFAULT_PAGE_SIZE);
        let result = Page::paginate((0..25).collect::<Vec<u32>>(), window);
        assert_eq!(result.data, vec![20, 21, 22, 23, 24]);
    }

    #[test]
    fn test_request_clamping() {
        let window = PageRequest::new(0, 0).resolve(DEFAULT_PAGE_SIZE);
        assert_eq!(window, PageWindow { page: 1, size: 1 });

        let window = PageRequest::default().resolve(25);
        assert_eq!(window, PageWindow { page: 1, size: 25 });

        let window = PageRequest::new(2, 10_000).resolve(DEFAULT_PAGE_SIZE);
        assert_eq!(window.size, MAX_PAGE_SIZE);
        assert_eq!(window.offset(), MAX_PAGE_SIZE as usize);
    }

    #[test]
    fn test_limit_alias() {
        let request: PageRequest = serde_json::from_value(json!({ "page": 2, "limit": 5 })).unwrap();
        assert_eq!(request, PageRequest::new(2, 5));
    }

    #[test]
    fn test_wire_shape() {
        let window = PageRequest::new(1, 10).resolve(DEFAULT_PAGE_SIZE);
        let page = Page::paginate(vec!["a", "b"], window);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(
            json,
            json!({ "data": ["a", "b"], "total": 2, "page": 1, "size": 10, "totalPages": 1 })
        );
    }

    #[test]
    fn test_serde_round_trip_keeps_derived_total_pages() {
        let window = PageRequest::new(2, 10).resolve(DEFAULT_PAGE_SIZE);
        let page = Page::paginate((0..25).collect::<Vec<u32>>(), window);

        let json = serde_json::to_string(&page).unwrap();
        let decoded: Page<u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, page);
    }

    #[test]
    fn test_caller_supplied_total_pages_is_recomputed() {
        let decoded: Page<u32> = serde_json::from_value(json!({
            "data": [], "total": 25, "page": 1, "size": 10, "totalPages": 99
        }))
        .unwrap();
        assert_eq!(decoded.total_pages, 3);
    }
}
