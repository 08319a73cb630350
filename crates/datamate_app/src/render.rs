use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Local};
use client_logging::client_warn;
use datamate_core::{ListViewModel, Notice, NoticeLevel, TaskRowView};
use datamate_engine::{BusEvent, NoticeSink};
use serde::Deserialize;

/// Dataset as returned by the list endpoint. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasetRecord {
    pub id: String,
    pub name: String,
    pub dataset_type: Option<String>,
    pub status: Option<String>,
    pub file_count: u64,
    pub total_size: u64,
    pub updated_at: Option<String>,
}

/// One printable table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRow {
    pub key: String,
    pub name: String,
    pub kind: String,
    pub status: String,
    pub files: u64,
    pub size: String,
    pub updated_at: String,
}

pub fn dataset_row(record: DatasetRecord) -> DatasetRow {
    DatasetRow {
        key: record.id,
        name: record.name,
        kind: record.dataset_type.unwrap_or_else(|| "unknown".to_string()),
        status: record.status.unwrap_or_else(|| "-".to_string()),
        files: record.file_count,
        size: format_bytes(record.total_size),
        updated_at: record.updated_at.unwrap_or_else(|| "-".to_string()),
    }
}

/// Binary units, whole numbers without decimals, otherwise up to three.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if value.fract() == 0.0 {
        format!("{} {}", value, UNITS[unit])
    } else {
        let text = format!("{:.3}", value);
        let text = text.trim_end_matches('0').trim_end_matches('.');
        format!("{} {}", text, UNITS[unit])
    }
}

pub fn print_table(view: &ListViewModel, rows: &[DatasetRow]) {
    let pagination = &view.pagination;
    println!(
        "[{}] page {}/{} ({} per page), {}",
        Local::now().format("%H:%M:%S"),
        pagination.current,
        pagination.page_count(),
        pagination.page_size,
        pagination.total_label()
    );
    if rows.is_empty() {
        println!("  (no datasets)");
        return;
    }
    for row in rows {
        println!(
            "  {:<24} {:<32} {:<8} {:<10} {:>6} files {:>12}  {}",
            row.key, row.name, row.kind, row.status, row.files, row.size, row.updated_at
        );
    }
}

pub fn print_task_row(row: &TaskRowView) {
    println!("{}  {:>6.2}%  {}", row.title, row.percent, format_bytes(row.size));
}

pub fn describe_event(event: &BusEvent, at: DateTime<Local>) -> String {
    let time = at.format("%H:%M:%S");
    match event {
        BusEvent::DataChanged { event, prefix } => match prefix {
            Some(prefix) => format!("[{time}] {event} (prefix {prefix})"),
            None => format!("[{time}] {event}"),
        },
        BusEvent::TaskCenter { show: true } => format!("[{time}] task center opened"),
        BusEvent::TaskCenter { show: false } => format!("[{time}] task center closed"),
    }
}

/// Prints notices to stderr and mirrors them into the log.
#[derive(Debug, Default)]
pub struct ConsoleNoticeSink {
    failures: AtomicUsize,
}

impl ConsoleNoticeSink {
    /// Notices printed so far.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

impl NoticeSink for ConsoleNoticeSink {
    fn notify(&self, notice: Notice) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        client_warn!("Notice: {}", notice);
        match notice.level() {
            NoticeLevel::Warning => eprintln!("warning: {notice}"),
            NoticeLevel::Error => eprintln!("error: {notice}"),
        }
    }
}
