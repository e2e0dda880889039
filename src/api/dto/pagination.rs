//! Pagination-related DTOs for API requests and responses.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::repositories::Paginate;
use crate::services::{DEFAULT_PAGE_INDEX, DEFAULT_PAGE_SIZE};

/// Query parameters for pagination.
#[derive(Debug, Deserialize, IntoParams, Validate)]
pub struct PaginationParams {
    /// Page index (0-based)
    #[serde(default = "default_page_index")]
    #[param(minimum = 0, example = 0)]
    pub page_index: u32,

    /// Number of items per page (max 100)
    #[serde(default = "default_page_size")]
    #[validate(range(min = 0, max = 100, message = "Page size must be between 0 and 100"))]
    #[param(minimum = 0, maximum = 100, example = 5)]
    pub page_size: i32,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page_index: default_page_index(),
            page_size: default_page_size(),
        }
    }
}

fn default_page_index() -> u32 {
    DEFAULT_PAGE_INDEX
}

fn default_page_size() -> i32 {
    DEFAULT_PAGE_SIZE
}

/// One page of results with its metadata.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PagedResponse<T> {
    /// Page index (0-based)
    #[schema(example = 0)]
    pub index: u32,
    /// Requested page size
    #[schema(example = 5)]
    pub size: u32,
    /// Total number of matching items
    #[schema(example = 12)]
    pub count: u64,
    /// Total number of pages
    #[schema(example = 3)]
    pub pages: u64,
    pub has_previous: bool,
    pub has_next: bool,
    pub items: Vec<T>,
}

impl<T> PagedResponse<T> {
    /// Converts a repository page, mapping each item.
    pub fn from_page<E>(page: Paginate<E>, f: impl FnMut(E) -> T) -> Self {
        let page = page.map(f);
        Self {
            index: page.index(),
            size: page.size(),
            count: page.count(),
            pages: page.pages(),
            has_previous: page.has_previous(),
            has_next: page.has_next(),
            items: page.into_items(),
        }
    }
}
