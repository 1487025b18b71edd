//! Per-run progress tracking.
//!
//! Each indexing run gets its own [`ProgressHandle`]; status is looked up by
//! [`TaskId`] so concurrent runs never share state.
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatus {
    pub id: TaskId,
    pub state: TaskState,
    /// 0..=100, never decreases.
    pub progress: u8,
    pub message: String,
    pub files_processed: usize,
    pub chunks_created: usize,
    pub errors: usize,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

type TaskMap = HashMap<TaskId, TaskStatus>;

fn lock(tasks: &Mutex<TaskMap>) -> MutexGuard<'_, TaskMap> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Finished tasks kept for status lookups before the oldest are evicted.
pub const DEFAULT_FINISHED_RETENTION: usize = 64;

#[derive(Debug, Clone)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<TaskMap>>,
    next_id: Arc<AtomicU64>,
    keep_finished: usize,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_FINISHED_RETENTION)
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that keeps at most `keep_finished` terminal tasks.
    /// Running and pending tasks are never evicted.
    pub fn with_retention(keep_finished: usize) -> Self {
        Self {
            tasks: Arc::default(),
            next_id: Arc::default(),
            keep_finished,
        }
    }

    /// Register a pending task, evicting the oldest finished tasks beyond
    /// the retention limit.
    pub fn create(&self, message: impl Into<String>) -> ProgressHandle {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let status = TaskStatus {
            id,
            state: TaskState::Pending,
            progress: 0,
            message: message.into(),
            files_processed: 0,
            chunks_created: 0,
            errors: 0,
            started_at: Utc::now(),
            finished_at: None,
        };
        let mut tasks = lock(&self.tasks);
        prune_finished(&mut tasks, self.keep_finished);
        tasks.insert(id, status);
        drop(tasks);
        ProgressHandle {
            id,
            tasks: Arc::clone(&self.tasks),
        }
    }

    pub fn get(&self, id: TaskId) -> Option<TaskStatus> {
        lock(&self.tasks).get(&id).cloned()
    }

    /// All known tasks, oldest first.
    pub fn list(&self) -> Vec<TaskStatus> {
        let mut all: Vec<TaskStatus> = lock(&self.tasks).values().cloned().collect();
        all.sort_by_key(|s| s.id);
        all
    }
}

fn prune_finished(tasks: &mut TaskMap, keep: usize) {
    let mut finished: Vec<(DateTime<Utc>, TaskId)> = tasks
        .values()
        .filter_map(|s| s.finished_at.map(|at| (at, s.id)))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort_unstable();
    let excess = finished.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        tasks.remove(&id);
    }
}

/// Write side of one task's status. Once the task reaches a terminal state
/// further updates are ignored.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    id: TaskId,
    tasks: Arc<Mutex<TaskMap>>,
}

impl ProgressHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn status(&self) -> Option<TaskStatus> {
        lock(&self.tasks).get(&self.id).cloned()
    }

    pub fn start(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| {
            s.state = TaskState::Processing;
            s.message = message;
        });
    }

    pub fn set_progress(&self, percent: u8, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| {
            s.progress = s.progress.max(percent.min(100));
            s.message = message;
        });
    }

    pub fn record_counts(&self, files_processed: usize, chunks_created: usize, errors: usize) {
        self.update(|s| {
            s.files_processed = files_processed;
            s.chunks_created = chunks_created;
            s.errors = errors;
        });
    }

    pub fn complete(&self, message: impl Into<String>) {
        self.finish(TaskState::Completed, Some(100), message.into());
    }

    pub fn fail(&self, message: impl Into<String>) {
        self.finish(TaskState::Failed, None, message.into());
    }

    pub fn cancel(&self, message: impl Into<String>) {
        self.finish(TaskState::Cancelled, None, message.into());
    }

    fn finish(&self, state: TaskState, progress: Option<u8>, message: String) {
        self.update(|s| {
            s.state = state;
            if let Some(p) = progress {
                s.progress = p;
            }
            s.message = message;
            s.finished_at = Some(Utc::now());
        });
    }

    fn update(&self, f: impl FnOnce(&mut TaskStatus)) {
        let mut tasks = lock(&self.tasks);
        if let Some(status) = tasks.get_mut(&self.id) {
            if !status.state.is_terminal() {
                f(status);
            }
        }
    }
}
