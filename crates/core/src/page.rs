use serde::{Deserialize, Serialize};

/// One page of a listing, with enough context to drive pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total matching rows across all pages.
    pub total: u64,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn empty(page: u32, page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page,
            page_size,
        }
    }
}
