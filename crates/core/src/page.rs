//! Offset pagination shared by list endpoints.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 1000;

/// Validated `skip`/`limit` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    skip: u64,
    limit: u64,
}

impl PageRequest {
    /// Build a request from optional query parameters.
    ///
    /// `limit` must be within `1..=1000`; it defaults to 100.
    pub fn new(skip: Option<u64>, limit: Option<u64>) -> DomainResult<Self> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(DomainError::validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        Ok(Self {
            skip: skip.unwrap_or(0),
            limit,
        })
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// 1-based page number of the first item in this window.
    pub fn page(&self) -> u64 {
        self.skip / self.limit + 1
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// One window of a larger result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, req: PageRequest) -> Self {
        Self {
            items,
            total,
            page: req.page(),
            per_page: req.limit(),
            pages: total.div_ceil(req.limit()),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            pages: self.pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_apply_when_parameters_are_missing() {
        let req = PageRequest::new(None, None).unwrap();
        assert_eq!(req.skip(), 0);
        assert_eq!(req.limit(), 100);
        assert_eq!(req.page(), 1);
    }

    #[test]
    fn limit_out_of_range_is_rejected() {
        assert!(PageRequest::new(None, Some(0)).is_err());
        assert!(PageRequest::new(None, Some(1001)).is_err());
        assert!(PageRequest::new(None, Some(1000)).is_ok());
    }

    #[test]
    fn empty_result_has_zero_pages() {
        let page: Page<u8> = Page::new(vec![], 0, PageRequest::default());
        assert_eq!(page.pages, 0);
        assert_eq!(page.page, 1);
    }

    #[test]
    fn map_keeps_counters() {
        let req = PageRequest::new(Some(20), Some(10)).unwrap();
        let page = Page::new(vec![1, 2], 22, req).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!(page.page, 3);
        assert_eq!(page.pages, 3);
        assert_eq!(page.per_page, 10);
    }

    proptest! {
        #[test]
        fn page_arithmetic_matches_ceiling_division(
            skip in 0u64..100_000,
            limit in 1u64..=1000,
            total in 0u64..1_000_000,
        ) {
            let req = PageRequest::new(Some(skip), Some(limit)).unwrap();
            let page: Page<()> = Page::new(vec![], total, req);
            prop_assert_eq!(page.page, skip / limit + 1);
            prop_assert!(page.pages * limit >= total);
            prop_assert!(page.pages == 0 || (page.pages - 1) * limit < total);
        }
    }
}
