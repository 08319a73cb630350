use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// User-facing notices raised by the list fetcher and the uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    LoginRequired,
    FetchFailed,
    FileModifiedOrDeleted,
    UploadFailed,
}

impl Notice {
    pub fn level(&self) -> NoticeLevel {
        match self {
            Notice::LoginRequired => NoticeLevel::Warning,
            Notice::FetchFailed | Notice::FileModifiedOrDeleted | Notice::UploadFailed => {
                NoticeLevel::Error
            }
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::LoginRequired => write!(f, "login required"),
            Notice::FetchFailed => write!(f, "failed to fetch data"),
            Notice::FileModifiedOrDeleted => {
                write!(f, "file was modified or deleted before upload")
            }
            Notice::UploadFailed => write!(f, "upload failed"),
        }
    }
}
