use crate::view_model::TaskRowView;

/// Highest percent shown while a task is still registered.
pub const PERCENT_CAP: f64 = 99.99;

/// `req_id` of a task whose upload session is not registered yet.
pub const UNREGISTERED_REQ_ID: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRef {
    pub id: String,
    pub name: String,
}

/// What a caller hands over when it starts an upload batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDetail {
    pub dataset: DatasetRef,
    /// Event published on the bus when the task goes away.
    pub update_event: Option<String>,
    pub has_archive: bool,
    /// Target directory inside the dataset.
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadTask {
    pub key: String,
    pub title: String,
    pub percent: f64,
    pub req_id: i64,
    /// Bytes uploaded so far across the whole batch.
    pub size: u64,
    pub is_cancel: bool,
    pub update_event: Option<String>,
    pub has_archive: bool,
    pub prefix: Option<String>,
}

impl UploadTask {
    pub fn from_detail(detail: &TaskDetail) -> Self {
        Self {
            key: detail.dataset.id.clone(),
            title: format!("Upload dataset: {}", detail.dataset.name),
            percent: 0.0,
            req_id: UNREGISTERED_REQ_ID,
            size: 0,
            is_cancel: false,
            update_event: detail.update_event.clone(),
            has_archive: detail.has_archive,
            prefix: detail.prefix.clone(),
        }
    }

    pub fn row(&self) -> TaskRowView {
        TaskRowView {
            key: self.key.clone(),
            title: self.title.clone(),
            percent: self.percent,
            size: self.size,
        }
    }
}

/// Batch progress in percent, rounded to two decimals and held below 100.
pub fn progress_percent(loaded: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = loaded as f64 / total as f64 * 100.0;
    let rounded = (raw * 100.0).round() / 100.0;
    if rounded >= 100.0 {
        PERCENT_CAP
    } else {
        rounded
    }
}

/// Upload tasks, most recent first, at most one per key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskList {
    tasks: Vec<UploadTask>,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task for `detail` at the front, replacing one with the same key.
    pub fn create(&mut self, detail: &TaskDetail) -> UploadTask {
        let task = UploadTask::from_detail(detail);
        self.tasks.retain(|item| item.key != task.key);
        self.tasks.insert(0, task.clone());
        task
    }

    pub fn get(&self, key: &str) -> Option<&UploadTask> {
        self.tasks.iter().find(|item| item.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Records the server session id once pre-upload succeeded.
    pub fn set_registered(&mut self, key: &str, req_id: i64) -> Option<UploadTask> {
        let task = self.get_mut(key)?;
        task.req_id = req_id;
        task.is_cancel = false;
        Some(task.clone())
    }

    /// Applies a transport progress event. `loaded` never moves backwards.
    pub fn apply_progress(&mut self, key: &str, loaded: u64, total: u64) -> Option<UploadTask> {
        let task = self.get_mut(key)?;
        task.size = task.size.max(loaded);
        task.percent = progress_percent(task.size, total);
        Some(task.clone())
    }

    pub fn mark_cancelled(&mut self, key: &str) -> Option<UploadTask> {
        let task = self.get_mut(key)?;
        task.is_cancel = true;
        Some(task.clone())
    }

    pub fn remove(&mut self, key: &str) -> Option<UploadTask> {
        let index = self.tasks.iter().position(|item| item.key == key)?;
        Some(self.tasks.remove(index))
    }

    pub fn rows(&self) -> Vec<TaskRowView> {
        self.tasks.iter().map(UploadTask::row).collect()
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut UploadTask> {
        self.tasks.iter_mut().find(|item| item.key == key)
    }
}
