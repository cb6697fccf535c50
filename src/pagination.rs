use serde::Deserialize;

/// Fixed feed page size. Not user-configurable.
pub const POSTS_PER_PAGE: i64 = 10;

/// The `?page=` query parameter. Anything unparsable falls back to page 1.
#[derive(Deserialize, Debug, Default)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    pub fn number(&self) -> Option<i64> {
        self.page.as_deref().and_then(|p| p.trim().parse().ok())
    }
}

/// LIMIT/OFFSET window for one page of an ordered query, with the requested
/// page number clamped into the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    pub number: i64,
    pub total_pages: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Computes the window for a 1-based page request over `total_items` items.
/// Out-of-range requests degrade to the nearest valid page rather than
/// erroring; an empty result set still has one (empty) page.
pub fn page_bounds(total_items: i64, requested: Option<i64>) -> PageBounds {
    let total_pages = std::cmp::max(1, (total_items + POSTS_PER_PAGE - 1) / POSTS_PER_PAGE);
    let number = requested.unwrap_or(1).clamp(1, total_pages);
    PageBounds {
        number,
        total_pages,
        limit: POSTS_PER_PAGE,
        offset: (number - 1) * POSTS_PER_PAGE,
    }
}

/// One page of an ordered result set plus its position in the whole.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, bounds: PageBounds) -> Self {
        Self {
            items,
            number: bounds.number,
            total_pages: bounds.total_pages,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }

    pub fn previous_number(&self) -> i64 {
        self.number - 1
    }

    pub fn next_number(&self) -> i64 {
        self.number + 1
    }
}
