use std::sync::mpsc;

use client_logging::{client_error, client_warn};
use datamate_core::{Notice, NoticeLevel};

/// Receives user-visible notices.
pub trait NoticeSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log at their level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNoticeSink;

impl NoticeSink for LogNoticeSink {
    fn notify(&self, notice: Notice) {
        match notice.level() {
            NoticeLevel::Warning => client_warn!("{}", notice),
            NoticeLevel::Error => client_error!("{}", notice),
        }
    }
}

pub struct ChannelNoticeSink {
    tx: mpsc::Sender<Notice>,
}

impl ChannelNoticeSink {
    pub fn new(tx: mpsc::Sender<Notice>) -> Self {
        Self { tx }
    }
}

impl NoticeSink for ChannelNoticeSink {
    fn notify(&self, notice: Notice) {
        let _ = self.tx.send(notice);
    }
}
