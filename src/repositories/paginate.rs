//! Paginated query results.

use serde::Serialize;

/// One page of query results.
///
/// Built once per query and read-only afterwards. A negative page size is
/// coerced to zero; with a zero size there are no pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginate<T> {
    index: u32,
    size: u32,
    count: u64,
    pages: u64,
    has_previous: bool,
    has_next: bool,
    items: Vec<T>,
}

impl<T> Paginate<T> {
    pub fn new(items: Vec<T>, index: u32, size: i32, count: u64) -> Self {
        let size = u32::try_from(size).unwrap_or(0);
        let pages = Self::page_count(count, size);
        Self {
            index,
            size,
            count,
            pages,
            has_previous: index > 0,
            has_next: u64::from(index) + 1 < pages,
            items,
        }
    }

    /// `ceil(count / size)`, or zero for a zero page size.
    pub fn page_count(count: u64, size: u32) -> u64 {
        if size == 0 {
            0
        } else {
            count.div_ceil(u64::from(size))
        }
    }

    /// Offset of the first row of page `index`.
    pub fn offset(index: u32, size: u32) -> u64 {
        u64::from(index) * u64::from(size)
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn pages(&self) -> u64 {
        self.pages
    }

    pub fn has_previous(&self) -> bool {
        self.has_previous
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Convert the items while keeping the page metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginate<U> {
        Paginate {
            index: self.index,
            size: self.size,
            count: self.count,
            pages: self.pages,
            has_previous: self.has_previous,
            has_next: self.has_next,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}
