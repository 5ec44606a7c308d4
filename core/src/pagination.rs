use serde::Serialize;

/// Page metadata returned alongside every paginated read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page:        u32,
    pub page_size:   u32,
    pub total_items: u64,
    pub total_pages: u32,
    pub has_next:    bool,
    pub has_prev:    bool,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32, total_items: u64) -> Self {
        let total_pages = total_items.div_ceil(page_size.max(1) as u64) as u32;
        Self {
            page,
            page_size,
            total_items,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }

    /// Rows to skip before this page.
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }
}

/// Pages are 1-based; 0 reads as the first page.
pub fn clamp_page(page: u32) -> u32 {
    page.max(1)
}

/// 0 means "use the default"; anything above `max` is capped.
pub fn clamp_page_size(requested: u32, default: u32, max: u32) -> u32 {
    let size = if requested == 0 { default } else { requested };
    size.clamp(1, max.max(1))
}
