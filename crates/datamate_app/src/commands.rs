use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Local;
use client_logging::{client_debug, client_info};
use datamate_core::{DatasetRef, QueryParams, TaskDetail};
use datamate_engine::{
    BusEvent, EventBus, FetchMode, FileSlices, PollingFetcher, ReqwestListQuery, ReqwestUploadApi,
    SliceUploader,
};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};

use crate::config::ClientConfig;
use crate::render::{self, ConsoleNoticeSink, DatasetRecord};
use crate::{ListArgs, UploadArgs};

pub const DATASETS_PATH: &str = "/api/data-management/datasets";
/// Refresh event published when a dataset's files change.
pub const DATASET_UPDATE_EVENT: &str = "update:dataset";

const PROGRESS_EVERY: Duration = Duration::from_millis(500);

pub async fn list(config: &ClientConfig, args: ListArgs) -> anyhow::Result<()> {
    let filters = parse_filters(&args.filters)?;
    let notices = Arc::new(ConsoleNoticeSink::default());
    let query = ReqwestListQuery::<DatasetRecord>::new(config.http_settings(), DATASETS_PATH)
        .context("building list client")?;

    let mut builder = PollingFetcher::builder(query, render::dataset_row)
        .settings(config.fetcher_settings(false))
        .notices(notices.clone())
        .filters(filters)
        .page(args.page, args.page_size);
    if let Some(keyword) = args.keyword {
        builder = builder.keyword(keyword);
    }
    let fetcher = builder.build();
    let mut settled = fetcher.settled();

    fetcher.fetch_data(QueryParams::new(), FetchMode::Manual).await;
    settled.borrow_and_update();
    if notices.failures() > 0 {
        bail!("listing datasets failed");
    }
    render::print_table(&fetcher.view(), &fetcher.table_data());

    if !args.poll {
        return Ok(());
    }

    client_info!("Polling every {} ms", config.polling_interval_ms);
    fetcher.start_polling();
    let mut remaining = args.ticks;
    loop {
        tokio::select! {
            changed = settled.changed() => {
                if changed.is_err() {
                    break;
                }
                settled.borrow_and_update();
                render::print_table(&fetcher.view(), &fetcher.table_data());
                if let Some(left) = remaining.as_mut() {
                    *left = left.saturating_sub(1);
                    if *left == 0 {
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    fetcher.stop_polling();
    Ok(())
}

/// Parses repeated `key=value` flags. Repeating a key adds values to it.
pub fn parse_filters(raw: &[String]) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
    let mut filters: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in raw {
        let Some((key, value)) = item.split_once('=') else {
            bail!("filter {item:?} is not key=value");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("filter {item:?} has an empty key");
        }
        filters
            .entry(key.to_string())
            .or_default()
            .extend(value.split(',').map(|v| v.trim().to_string()));
    }
    Ok(filters)
}

pub async fn upload(config: &ClientConfig, args: UploadArgs) -> anyhow::Result<()> {
    let chunk_size = args.chunk_size.unwrap_or(config.chunk_size);
    let files = args
        .files
        .iter()
        .map(|path| slice_file(path, chunk_size))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let file_count = files.len();
    let api = ReqwestUploadApi::new(config.http_settings()).context("building upload client")?;
    let notices = Arc::new(ConsoleNoticeSink::default());
    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let uploader = SliceUploader::new(
        Arc::new(api),
        bus,
        notices.clone(),
        config.uploader_settings(),
    );

    let detail = TaskDetail {
        dataset: DatasetRef {
            name: args.name.unwrap_or_else(|| args.dataset_id.clone()),
            id: args.dataset_id,
        },
        update_event: Some(DATASET_UPDATE_EVENT.to_string()),
        has_archive: args.archive,
        prefix: args.prefix,
    };
    let task = uploader.create_task(&detail);
    client_info!("Uploading {} file(s) as {}", file_count, task.title);

    let mut running = {
        let uploader = uploader.clone();
        let task = task.clone();
        tokio::spawn(async move { uploader.handle_upload(&task, &files).await })
    };
    let mut progress = tokio::time::interval(PROGRESS_EVERY);
    let mut interrupted = false;
    loop {
        tokio::select! {
            joined = &mut running => {
                joined.context("upload task panicked")?;
                break;
            }
            _ = progress.tick() => {
                if let Some(current) = uploader.task(&task.key) {
                    render::print_task_row(&current.row());
                }
            }
            event = events.recv() => match event {
                Ok(event) => println!("{}", render::describe_event(&event, Local::now())),
                Err(RecvError::Lagged(skipped)) => client_debug!("Skipped {} bus events", skipped),
                Err(RecvError::Closed) => {}
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                eprintln!("cancelling after the current chunk");
                uploader.cancel_task(&task.key).await;
            }
        }
    }

    for event in drain_events(&mut events) {
        println!("{}", render::describe_event(&event, Local::now()));
    }

    if interrupted {
        bail!("upload cancelled");
    }
    if notices.failures() > 0 {
        bail!("upload failed");
    }
    println!("uploaded {file_count} file(s)");
    Ok(())
}

/// Events already queued on `events`, such as those published while the upload finished.
fn drain_events(events: &mut broadcast::Receiver<BusEvent>) -> Vec<BusEvent> {
    let mut drained = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => drained.push(event),
            Err(TryRecvError::Lagged(skipped)) => {
                client_debug!("Skipped {} bus events", skipped)
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => return drained,
        }
    }
}

fn slice_file(path: &Path, chunk_size: u64) -> anyhow::Result<FileSlices> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;
    FileSlices::from_path(path, name, chunk_size)
        .with_context(|| format!("reading {}", path.display()))
}
