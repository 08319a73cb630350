use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User replaced the free-text keyword.
    KeywordChanged(String),
    /// User changed one or more filters; keys not present are left untouched.
    FiltersChanged(BTreeMap<String, Vec<String>>),
    /// Pagination control moved to another page and/or page size.
    PageChanged { current: u32, page_size: Option<u32> },
    /// A fetch cycle began. Background (polling) fetches keep the loading flag off.
    FetchStarted { background: bool },
    /// A fetch cycle completed.
    FetchSucceeded { total: u64 },
    /// A fetch cycle failed.
    FetchFailed { failure: FetchFailure },
    /// Polling was switched on or off.
    PollingChanged(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// The backend answered 401.
    Unauthorized,
    Other,
}
