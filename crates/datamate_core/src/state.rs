use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::view_model::{ListViewModel, PaginationView};

pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const DEFAULT_PAGE_SIZE_OPTIONS: [u32; 3] = [12, 24, 48];

/// Single-select value meaning "no filter".
///
/// Not checked against the real option list, so an option literally named
/// `all` can never be selected.
pub const ALL_SENTINEL: &str = "all";

/// Outgoing list-query parameters. Later inserts win over earlier ones.
pub type QueryParams = BTreeMap<String, String>;

/// How a filter key is rendered into the outgoing query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// First value only; empty or [`ALL_SENTINEL`] omits the field.
    #[default]
    Single,
    /// All values joined with `,`; empty omits the field.
    Multi,
    /// `true` when the first value is `"true"`, omitted otherwise.
    Flag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub keyword: String,
    pub filter: BTreeMap<String, Vec<String>>,
    /// 1-based page index as shown to the user.
    pub current: u32,
    pub page_size: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            filter: BTreeMap::new(),
            current: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SearchParams {
    /// Build the outgoing query.
    ///
    /// `extra` is applied first so state-derived fields override it. The page
    /// sent is `current - page_offset`: an offset of 1 targets a 0-based
    /// backend, 0 a 1-based one.
    pub fn to_query(
        &self,
        extra: &QueryParams,
        page_offset: u32,
        kinds: &BTreeMap<String, FilterKind>,
    ) -> QueryParams {
        let mut query = extra.clone();

        if !self.keyword.is_empty() {
            query.insert("keyword".to_string(), self.keyword.clone());
        } else {
            query.remove("keyword");
        }

        for (key, values) in &self.filter {
            let kind = kinds.get(key).copied().unwrap_or_default();
            match render_filter(kind, values) {
                Some(value) => {
                    query.insert(key.clone(), value);
                }
                None => {
                    query.remove(key);
                }
            }
        }

        query.insert(
            "page".to_string(),
            self.current.saturating_sub(page_offset).to_string(),
        );
        query.insert("size".to_string(), self.page_size.to_string());
        query
    }
}

fn render_filter(kind: FilterKind, values: &[String]) -> Option<String> {
    match kind {
        FilterKind::Single => values
            .first()
            .filter(|value| !value.is_empty() && value.as_str() != ALL_SENTINEL)
            .cloned(),
        FilterKind::Multi => {
            let kept: Vec<&str> = values
                .iter()
                .map(String::as_str)
                .filter(|value| !value.is_empty())
                .collect();
            if kept.is_empty() {
                None
            } else {
                Some(kept.join(","))
            }
        }
        FilterKind::Flag => values
            .first()
            .filter(|value| value.as_str() == "true")
            .map(|_| "true".to_string()),
    }
}

/// Search, pagination and fetch status for one list view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchState {
    params: SearchParams,
    page_size_options: Vec<u32>,
    total: u64,
    loading: bool,
    polling: bool,
}

impl Default for SearchState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE_OPTIONS.to_vec())
    }
}

impl SearchState {
    /// Creates a state whose page size is the first allowed option.
    pub fn new(page_size_options: Vec<u32>) -> Self {
        let mut options: Vec<u32> = page_size_options.into_iter().filter(|&s| s > 0).collect();
        if options.is_empty() {
            options = DEFAULT_PAGE_SIZE_OPTIONS.to_vec();
        }
        let params = SearchParams {
            page_size: options[0],
            ..SearchParams::default()
        };
        Self {
            params,
            page_size_options: options,
            total: 0,
            loading: false,
            polling: false,
        }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn view(&self) -> ListViewModel {
        ListViewModel {
            search: self.params.clone(),
            pagination: PaginationView {
                total: self.total,
                current: self.params.current,
                page_size: self.params.page_size,
                page_size_options: self.page_size_options.clone(),
            },
            loading: self.loading,
            polling: self.polling,
        }
    }

    pub(crate) fn set_keyword(&mut self, keyword: String) {
        self.params.keyword = keyword;
        self.params.current = 1;
    }

    pub(crate) fn merge_filters(&mut self, filters: BTreeMap<String, Vec<String>>) {
        self.params.filter.extend(filters);
        self.params.current = 1;
    }

    pub(crate) fn set_page(&mut self, current: u32, page_size: Option<u32>) {
        self.params.current = current.max(1);
        if let Some(size) = page_size {
            if self.page_size_options.contains(&size) {
                self.params.page_size = size;
            }
        }
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub(crate) fn set_total(&mut self, total: u64) {
        self.total = total;
    }

    pub(crate) fn set_polling(&mut self, polling: bool) {
        self.polling = polling;
    }
}
