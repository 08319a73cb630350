use crate::SearchParams;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListViewModel {
    pub search: SearchParams,
    pub pagination: PaginationView,
    pub loading: bool,
    pub polling: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationView {
    pub total: u64,
    pub current: u32,
    pub page_size: u32,
    pub page_size_options: Vec<u32>,
}

impl PaginationView {
    pub fn total_label(&self) -> String {
        format!("Total: {}", self.total)
    }

    /// Number of pages for the current page size; at least 1.
    pub fn page_count(&self) -> u64 {
        let size = u64::from(self.page_size.max(1));
        self.total.div_ceil(size).max(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRowView {
    pub key: String,
    pub title: String,
    pub percent: f64,
    pub size: u64,
}
