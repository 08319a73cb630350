use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use client_logging::{client_debug, client_error, client_info, client_warn};
use datamate_core::{Notice, TaskDetail, TaskList, UploadTask};
use tokio_util::sync::CancellationToken;

use crate::bus::{BusEvent, EventBus};
use crate::notice::NoticeSink;
use crate::slice::{checksum_hex, find_changed_file, read_chunk, FileSlices};
use crate::upload_api::{ChunkForm, ChunkProgress, PreUploadRequest, UploadApi};
use crate::UploadError;

#[derive(Debug, Clone)]
pub struct UploaderSettings {
    /// Publish `TaskCenter` show/hide events around each upload.
    pub show_task_center: bool,
}

impl Default for UploaderSettings {
    fn default() -> Self {
        Self {
            show_task_center: true,
        }
    }
}

/// What cancelling a task has to undo.
struct CancelHandle {
    token: CancellationToken,
    req_id: Option<i64>,
    /// Distinguishes this task from earlier tasks created under the same key.
    generation: u64,
}

#[derive(Default)]
struct Registry {
    list: TaskList,
    handles: HashMap<String, CancelHandle>,
    next_generation: u64,
}

impl Registry {
    fn owns(&self, key: &str, generation: u64) -> bool {
        self.handles
            .get(key)
            .is_some_and(|handle| handle.generation == generation)
    }
}

struct UploaderInner {
    api: Arc<dyn UploadApi>,
    registry: Mutex<Registry>,
    bus: EventBus,
    notices: Arc<dyn NoticeSink>,
    settings: UploaderSettings,
}

impl UploaderInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Uploads batches of files chunk by chunk and tracks one task per target.
///
/// Chunks go out strictly in `(file, chunk)` order; progress is the share of
/// batch bytes sent and stays below 100 until the task is removed.
#[derive(Clone)]
pub struct SliceUploader {
    inner: Arc<UploaderInner>,
}

impl SliceUploader {
    pub fn new(
        api: Arc<dyn UploadApi>,
        bus: EventBus,
        notices: Arc<dyn NoticeSink>,
        settings: UploaderSettings,
    ) -> Self {
        Self {
            inner: Arc::new(UploaderInner {
                api,
                registry: Mutex::new(Registry::default()),
                bus,
                notices,
                settings,
            }),
        }
    }

    /// Registers a task at the front of the list. An older task with the same
    /// key is replaced and its upload stops before its next chunk.
    pub fn create_task(&self, detail: &TaskDetail) -> UploadTask {
        let mut registry = self.inner.registry();
        let task = registry.list.create(detail);
        let generation = registry.next_generation;
        registry.next_generation += 1;
        let previous = registry.handles.insert(
            task.key.clone(),
            CancelHandle {
                token: CancellationToken::new(),
                req_id: None,
                generation,
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        client_debug!("Created upload task key={}", task.key);
        task
    }

    pub fn tasks(&self) -> Vec<UploadTask> {
        self.inner.registry().list.tasks().to_vec()
    }

    pub fn task(&self, key: &str) -> Option<UploadTask> {
        self.inner.registry().list.get(key).cloned()
    }

    /// Removes a task. A task still registered and marked cancelled has its
    /// session discarded first.
    pub async fn remove_task(&self, task: &UploadTask) {
        self.remove(task, None).await;
    }

    /// With `owner` set, nothing happens unless that generation still holds the key.
    async fn remove(&self, task: &UploadTask, owner: Option<u64>) {
        let (was_registered, handle) = {
            let mut registry = self.inner.registry();
            if owner.is_some_and(|generation| !registry.owns(&task.key, generation)) {
                client_debug!("Upload key={} was replaced, leaving it in place", task.key);
                return;
            }
            let removed = registry.list.remove(&task.key);
            (removed.is_some(), registry.handles.remove(&task.key))
        };

        if task.is_cancel && was_registered {
            if let Some(handle) = handle {
                handle.token.cancel();
                if let Some(req_id) = handle.req_id {
                    self.discard_session(req_id).await;
                }
            }
        }

        if let Some(event) = &task.update_event {
            self.inner.bus.publish(BusEvent::DataChanged {
                event: event.clone(),
                prefix: task.prefix.clone(),
            });
        }
        if self.inner.settings.show_task_center {
            self.inner.bus.publish(BusEvent::TaskCenter { show: false });
        }
    }

    /// Marks a task cancelled and removes it.
    pub async fn cancel_task(&self, key: &str) {
        let task = self.inner.registry().list.mark_cancelled(key);
        match task {
            Some(task) => {
                client_info!("Cancelling upload key={}", key);
                self.remove_task(&task).await;
            }
            None => client_debug!("Cancel ignored, no upload task key={}", key),
        }
    }

    /// Uploads `files` for `task`. Failures become notices; nothing is returned.
    pub async fn handle_upload(&self, task: &UploadTask, files: &[FileSlices]) {
        let Some((token, generation)) = self.claim(&task.key) else {
            client_debug!("Upload ignored, no task key={}", task.key);
            return;
        };

        if let Some(changed) = find_changed_file(files).await {
            client_warn!(
                "Upload key={} aborted, {:?} was modified or deleted",
                task.key,
                changed.path
            );
            self.inner.notices.notify(Notice::FileModifiedOrDeleted);
            let mut current = self.current(task);
            current.is_cancel = false;
            self.remove(&current, Some(generation)).await;
            return;
        }

        let total_size: u64 = files.iter().map(|file| file.size).sum();
        let session = Session {
            token,
            generation,
            total_size,
        };
        if let Err(err) = self.upload_files(task, files, &session).await {
            let stopped = matches!(err, UploadError::Cancelled)
                || !self.inner.registry().owns(&task.key, generation);
            if stopped {
                client_info!("Upload key={} stopped: {}", task.key, err);
                return;
            }
            client_error!("Upload key={} failed: {}", task.key, err);
            self.inner.notices.notify(Notice::UploadFailed);
            let mut current = self.current(task);
            current.is_cancel = true;
            self.remove(&current, Some(generation)).await;
        }
    }

    async fn upload_files(
        &self,
        task: &UploadTask,
        files: &[FileSlices],
        session: &Session,
    ) -> Result<(), UploadError> {
        let total_size = session.total_size;
        let request = PreUploadRequest {
            total_file_num: files.len(),
            total_size,
            dataset_id: task.key.clone(),
            has_archive: task.has_archive,
            prefix: task.prefix.clone(),
        };
        let req_id = self
            .inner
            .api
            .pre_upload(&task.key, &request)
            .await
            .map_err(UploadError::Register)?;
        client_info!(
            "Upload session key={} req_id={} files={} bytes={}",
            task.key,
            req_id,
            files.len(),
            total_size
        );

        if !self.register_session(&task.key, req_id, session.generation) {
            // Removed or replaced while the session was being opened.
            self.discard_session(req_id).await;
            return Err(UploadError::Cancelled);
        }

        if self.inner.settings.show_task_center {
            self.inner.bus.publish(BusEvent::TaskCenter { show: true });
        }
        if let Some(event) = &task.update_event {
            self.inner.bus.publish(BusEvent::DataChanged {
                event: event.clone(),
                prefix: task.prefix.clone(),
            });
        }

        let mut loaded = 0u64;
        for (file_index, file) in files.iter().enumerate() {
            for (chunk_index, range) in file.slices.iter().enumerate() {
                if session.token.is_cancelled() {
                    self.discard_if_replaced(&task.key, session.generation, req_id)
                        .await;
                    return Err(UploadError::Cancelled);
                }
                self.upload_slice(
                    &task.key,
                    req_id,
                    file,
                    (file_index, chunk_index),
                    loaded,
                    session,
                )
                .await?;
                loaded += range.end - range.start;
            }
        }

        let finished = self.current(task);
        self.remove(
            &UploadTask {
                is_cancel: false,
                ..finished
            },
            Some(session.generation),
        )
        .await;
        client_info!("Upload key={} finished", task.key);
        Ok(())
    }

    async fn upload_slice(
        &self,
        key: &str,
        req_id: i64,
        file: &FileSlices,
        (file_index, chunk_index): (usize, usize),
        loaded: u64,
        session: &Session,
    ) -> Result<(), UploadError> {
        let range = file.slices[chunk_index].clone();
        let bytes = read_chunk(&file.path, range)
            .await
            .map_err(|source| UploadError::Read {
                path: file.path.clone(),
                source,
            })?;
        let form = ChunkForm {
            req_id,
            file_no: file_index + 1,
            chunk_no: chunk_index + 1,
            file_name: file.name.clone(),
            file_size: file.size,
            total_chunk_num: file.total_chunks(),
            check_sum_hex: checksum_hex(&bytes),
            bytes: Bytes::from(bytes),
        };
        let (file_no, chunk_no) = (form.file_no, form.chunk_no);
        let progress = Arc::new(TaskProgress {
            inner: Arc::clone(&self.inner),
            key: key.to_string(),
            generation: session.generation,
            base: loaded,
            total: session.total_size,
        });

        self.inner
            .api
            .upload_chunk(key, form, progress)
            .await
            .map_err(|source| UploadError::Chunk {
                file_no,
                chunk_no,
                source,
            })
    }

    /// Cancel token and generation of the task currently holding `key`.
    fn claim(&self, key: &str) -> Option<(CancellationToken, u64)> {
        let registry = self.inner.registry();
        registry
            .handles
            .get(key)
            .map(|handle| (handle.token.clone(), handle.generation))
    }

    /// Stores the session id. False when `generation` no longer holds the key.
    fn register_session(&self, key: &str, req_id: i64, generation: u64) -> bool {
        let mut registry = self.inner.registry();
        if !registry.owns(key, generation) {
            return false;
        }
        if registry.list.set_registered(key, req_id).is_none() {
            return false;
        }
        if let Some(handle) = registry.handles.get_mut(key) {
            handle.req_id = Some(req_id);
        }
        true
    }

    /// A removed task had its session discarded by `remove`; a replaced one
    /// has nobody else to do it.
    async fn discard_if_replaced(&self, key: &str, generation: u64, req_id: i64) {
        let replaced = self
            .inner
            .registry()
            .handles
            .get(key)
            .is_some_and(|handle| handle.generation != generation);
        if replaced {
            self.discard_session(req_id).await;
        }
    }

    async fn discard_session(&self, req_id: i64) {
        if let Err(err) = self.inner.api.cancel_upload(req_id).await {
            client_warn!("cancel-upload for req_id={} failed: {}", req_id, err);
        }
    }

    /// Latest registered copy of `task`, or `task` itself once removed.
    fn current(&self, task: &UploadTask) -> UploadTask {
        self.task(&task.key).unwrap_or_else(|| task.clone())
    }
}

/// One upload run: its cancel token, task generation and batch size.
struct Session {
    token: CancellationToken,
    generation: u64,
    total_size: u64,
}

struct TaskProgress {
    inner: Arc<UploaderInner>,
    key: String,
    generation: u64,
    base: u64,
    total: u64,
}

impl ChunkProgress for TaskProgress {
    fn on_progress(&self, loaded: u64) {
        let mut registry = self.inner.registry();
        if registry.owns(&self.key, self.generation) {
            registry
                .list
                .apply_progress(&self.key, self.base + loaded, self.total);
        }
    }
}
