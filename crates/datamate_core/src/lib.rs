//! DataMate core: pure list-search state machine, upload task bookkeeping and
//! view-model helpers. Nothing in here performs IO.
mod effect;
mod msg;
mod notice;
mod state;
mod update;
mod upload;
mod view_model;

pub use effect::{Effect, KEYWORD_DEBOUNCE};
pub use msg::{FetchFailure, Msg};
pub use notice::{Notice, NoticeLevel};
pub use state::{
    FilterKind, QueryParams, SearchParams, SearchState, ALL_SENTINEL, DEFAULT_PAGE_SIZE,
    DEFAULT_PAGE_SIZE_OPTIONS,
};
pub use update::update;
pub use upload::{
    progress_percent, DatasetRef, TaskDetail, TaskList, UploadTask, PERCENT_CAP,
    UNREGISTERED_REQ_ID,
};
pub use view_model::{ListViewModel, PaginationView, TaskRowView};
