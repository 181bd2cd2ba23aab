//! Pagination types and utilities for consistent pagination across list endpoints

use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{PaginationInfo, ResponseMetadata};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Optional pagination parameters for list endpoints
///
/// Lists are unbounded unless a caller asks for a page; once either field is
/// present the defaults below fill the other one.
#[derive(Debug, Deserialize, IntoParams, Clone, Default, PartialEq, Eq)]
pub struct PaginationParams {
    #[param(example = 1, minimum = 1)]
    pub page: Option<u32>,

    #[param(example = 20, minimum = 1, maximum = 100)]
    pub page_size: Option<u32>,
}

impl PaginationParams {
    /// Whether the caller asked for a window at all
    pub fn is_requested(&self) -> bool {
        self.page.is_some() || self.page_size.is_some()
    }

    /// Get the page number (defaults to 1, minimum 1)
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Get the page size (defaults to 20, clamped between 1 and 100)
    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.page_size())
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size())
    }

    /// Calculate total pages given a total count
    pub fn total_pages(&self, total_count: u64) -> u32 {
        if total_count == 0 {
            return 1;
        }
        let pages = total_count.div_ceil(self.limit());
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// Create response metadata with pagination info
    pub fn to_metadata(&self, total_count: u64) -> ResponseMetadata {
        let total_pages = self.total_pages(total_count);

        ResponseMetadata {
            pagination: Some(PaginationInfo {
                page: self.page(),
                page_size: self.page_size(),
                total_pages,
                has_next: self.page() < total_pages,
                has_previous: self.page() > 1,
            }),
            total_count: Some(total_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pagination_defaults() {
        let params = PaginationParams::default();
        assert!(!params.is_requested());
        assert_eq!(params.page(), 1);
        assert_eq!(params.page_size(), 20);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_pagination_clamps() {
        let params = PaginationParams {
            page: Some(0),
            page_size: Some(500),
        };
        assert!(params.is_requested());
        assert_eq!(params.page(), 1);
        assert_eq!(params.page_size(), 100);
    }

    #[test]
    fn test_pagination_offset() {
        let params = PaginationParams {
            page: Some(3),
            page_size: Some(10),
        };
        assert_eq!(params.offset(), 20);
        assert_eq!(params.limit(), 10);
    }

    #[test]
    fn test_to_metadata() {
        let params = PaginationParams {
            page: Some(2),
            page_size: Some(10),
        };
        let metadata = params.to_metadata(25);
        let pagination = metadata.pagination.expect("pagination");
        assert_eq!(pagination.total_pages, 3);
        assert!(pagination.has_next);
        assert!(pagination.has_previous);
        assert_eq!(metadata.total_count, Some(25));

        assert_eq!(params.total_pages(0), 1);
    }

    proptest! {
        #[test]
        fn prop_pages_cover_every_record(
            page in proptest::option::of(0u32..1_000),
            page_size in proptest::option::of(0u32..1_000),
            total in 0u64..100_000,
        ) {
            let params = PaginationParams { page, page_size };
            let size = params.page_size();
            prop_assert!((1..=MAX_PAGE_SIZE).contains(&size));

            let pages = u64::from(params.total_pages(total));
            prop_assert!(pages * u64::from(size) >= total);
            prop_assert!(total == 0 || (pages - 1) * u64::from(size) < total);

            let info = params.to_metadata(total).pagination.expect("pagination");
            prop_assert_eq!(info.has_next, params.page() < info.total_pages);
        }
    }
}
