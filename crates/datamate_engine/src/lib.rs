//! DataMate engine: HTTP clients, the polling list fetcher and the chunked uploader.
mod bus;
mod fetch;
mod http;
mod notice;
mod poller;
mod slice;
mod types;
mod upload_api;
mod uploader;

pub use bus::{BusEvent, EventBus};
pub use fetch::{ListQuery, PollTask, ReqwestListQuery};
pub use http::HttpSettings;
pub use notice::{ChannelNoticeSink, LogNoticeSink, NoticeSink};
pub use poller::{FetchMode, FetcherBuilder, FetcherSettings, PollingFetcher};
pub use slice::{
    checksum_hex, find_changed_file, read_chunk, slice_ranges, FileSlices, DEFAULT_CHUNK_SIZE,
};
pub use types::{ApiError, FailureKind, Page, UploadError};
pub use upload_api::{ChunkForm, ChunkProgress, PreUploadRequest, ReqwestUploadApi, UploadApi};
pub use uploader::{SliceUploader, UploaderSettings};
