//! Upload Coordinator - concurrent batch uploads with aggregate progress

use super::transport::supports_thumbnail;
use super::validation::validate_batch;
use super::{
    CandidateFile, FileProgress, ProgressCallback, StoredObject, Submission, ThumbnailGenerator,
    Transport, UploadConfig, UploadFile, UploadOptions, UploadStatus, UploadTask,
};
use crate::clock::SharedClock;
use crate::errors::{should_report, user_facing_message, ErrorReporter, StorageError};
use crate::notifications::{
    NotificationId, NotificationKind, NotificationManager, NotificationOptions, NotificationUpdate,
};
use crate::retry::{RetryDriver, RetryError};

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Invoked with the stored descriptors once a batch settles
pub type CompletionCallback = Arc<dyn Fn(&[StoredObject]) + Send + Sync>;

/// Terminal classification of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Empty,
    AllSucceeded,
    PartialSuccess,
    AllFailed,
}

impl BatchOutcome {
    pub fn from_counts(success: usize, failed: usize) -> Self {
        match (success, failed) {
            (0, 0) => BatchOutcome::Empty,
            (_, 0) => BatchOutcome::AllSucceeded,
            (0, _) => BatchOutcome::AllFailed,
            _ => BatchOutcome::PartialSuccess,
        }
    }
}

/// Aggregate progress of a running batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: Uuid,

    /// Tick that caused this update, if any
    pub file: Option<FileProgress>,

    /// Mean of per-file percentages
    pub overall: u8,

    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// One file that did not make it
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFailure {
    pub file_id: String,
    pub file_name: String,

    /// Classified cause; `None` when the upload was cancelled
    pub error: Option<StorageError>,

    pub attempts: u32,

    /// User-facing message
    pub message: String,
}

/// Final report of a batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub success_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
    pub stored: Vec<StoredObject>,
    pub failures: Vec<UploadFailure>,
    pub outcome: BatchOutcome,
}

impl BatchReport {
    fn new(batch_id: Uuid, total_count: usize, stored: Vec<StoredObject>, failures: Vec<UploadFailure>) -> Self {
        Self {
            batch_id,
            success_count: stored.len(),
            failed_count: failures.len(),
            total_count,
            outcome: BatchOutcome::from_counts(stored.len(), failures.len()),
            stored,
            failures,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.outcome == BatchOutcome::PartialSuccess
    }
}

/// Task table entry; keeps the accepted file for explicit retries
struct Tracked {
    task: UploadTask,
    file: UploadFile,
}

type TaskTable = Arc<Mutex<Vec<Tracked>>>;

/// Per-batch progress plumbing shared by every file's callback
#[derive(Clone)]
struct BatchTracker {
    batch_id: Uuid,
    file_ids: Arc<[String]>,
    tasks: TaskTable,
    progress_tx: Option<mpsc::UnboundedSender<BatchProgress>>,
    notifier: Option<NotificationManager>,
    notice: Option<NotificationId>,
    label: Arc<str>,
}

impl BatchTracker {
    /// Apply a transport tick; ticks for settled files are dropped
    fn record(&self, tick: FileProgress) {
        {
            let mut tasks = self.tasks.lock();
            let Some(tracked) = tasks.iter_mut().find(|t| t.task.file_id == tick.file_id) else {
                return;
            };
            if tracked.task.status.is_terminal() {
                return;
            }
            tracked.task.progress = tick.progress.min(100);
            tracked.task.status = UploadStatus::Uploading;
        }

        tracing::debug!(file = %tick.file_name, progress = tick.progress, "Upload progress");
        self.emit(Some(tick));
    }

    fn set_status(&self, file_id: &str, status: UploadStatus, error_message: Option<String>) {
        {
            let mut tasks = self.tasks.lock();
            if let Some(tracked) = tasks.iter_mut().find(|t| t.task.file_id == file_id) {
                tracked.task.status = status;
                tracked.task.error_message = error_message;
                if status == UploadStatus::Completed {
                    tracked.task.progress = 100;
                }
            }
        }
        self.emit(None);
    }

    fn snapshot(&self, file: Option<FileProgress>) -> BatchProgress {
        let tasks = self.tasks.lock();
        let batch: Vec<&UploadTask> = self
            .file_ids
            .iter()
            .filter_map(|id| tasks.iter().find(|t| &t.task.file_id == id).map(|t| &t.task))
            .collect();

        let total = self.file_ids.len();
        let sum: usize = batch.iter().map(|t| t.progress as usize).sum();

        BatchProgress {
            batch_id: self.batch_id,
            file,
            overall: if total == 0 { 0 } else { (sum / total) as u8 },
            completed: batch.iter().filter(|t| t.status == UploadStatus::Completed).count(),
            failed: batch.iter().filter(|t| t.status == UploadStatus::Error).count(),
            total,
        }
    }

    fn emit(&self, file: Option<FileProgress>) {
        let progress = self.snapshot(file);

        if let (Some(notifier), Some(id)) = (&self.notifier, self.notice) {
            notifier.update_progress(id, &self.label, progress.overall);
        }
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(progress);
        }
    }
}

/// Validates batches and drives their uploads concurrently.
///
/// Each file moves `pending -> uploading -> completed | error`; settled files
/// stay settled until cleared or explicitly retried.
pub struct UploadCoordinator {
    config: UploadConfig,
    transport: Arc<dyn Transport>,
    thumbnailer: Option<Arc<dyn ThumbnailGenerator>>,
    retry: Arc<RetryDriver>,

    /// Set by `with_retry_driver`; later builders leave the driver alone
    shared_retry: bool,
    notifier: Option<NotificationManager>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    options: UploadOptions,
    tasks: TaskTable,
    progress_tx: Option<mpsc::UnboundedSender<BatchProgress>>,
    on_complete: Option<CompletionCallback>,
}

impl UploadCoordinator {
    /// Create a coordinator uploading through `transport`
    pub fn new(config: UploadConfig, transport: Arc<dyn Transport>) -> Self {
        let retry = Arc::new(RetryDriver::new(config.retry.clone()));

        Self {
            config,
            transport,
            thumbnailer: None,
            retry,
            shared_retry: false,
            notifier: None,
            reporter: None,
            options: UploadOptions::default(),
            tasks: Arc::new(Mutex::new(Vec::new())),
            progress_tx: None,
            on_complete: None,
        }
    }

    /// Set thumbnail generator
    pub fn with_thumbnailer(mut self, thumbnailer: Arc<dyn ThumbnailGenerator>) -> Self {
        self.thumbnailer = Some(thumbnailer);
        self
    }

    /// Use `clock` for retry backoff. Ignored once a shared driver is set.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.rebuild_retry(clock);
        self
    }

    /// Surface batch state and retry notices as notifications.
    /// A shared driver keeps its own notifier.
    pub fn with_notifier(mut self, notifier: NotificationManager) -> Self {
        self.notifier = Some(notifier);
        let clock = self.retry.clock().clone();
        self.rebuild_retry(clock);
        self
    }

    /// Share an existing retry driver (its config, clock and attempt counters)
    pub fn with_retry_driver(mut self, retry: Arc<RetryDriver>) -> Self {
        self.retry = retry;
        self.shared_retry = true;
        self
    }

    pub fn retry_driver(&self) -> &Arc<RetryDriver> {
        &self.retry
    }

    /// Forward reportable upload failures
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Set transport options
    pub fn with_upload_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    /// Set batch progress channel
    pub fn with_progress_channel(mut self, tx: mpsc::UnboundedSender<BatchProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Set completion callback
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[StoredObject]) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    fn rebuild_retry(&mut self, clock: SharedClock) {
        if self.shared_retry {
            return;
        }
        let mut retry = RetryDriver::new(self.config.retry.clone()).with_clock(clock);
        if let Some(notifier) = &self.notifier {
            retry = retry.with_notifier(notifier.clone());
        }
        self.retry = Arc::new(retry);
    }

    /// Validate candidates; accepted files enter `pending`
    pub fn submit(&self, files: Vec<CandidateFile>) -> Submission {
        let submission = validate_batch(files, &self.config);

        {
            let mut tasks = self.tasks.lock();
            for file in &submission.accepted {
                tasks.push(Tracked {
                    task: UploadTask::pending(file),
                    file: file.clone(),
                });
            }
        }

        for rejected in &submission.rejected {
            tracing::info!(file = rejected.file_name(), "Rejected file: {}", rejected);
        }

        if let Some(notifier) = &self.notifier {
            match submission.rejected.as_slice() {
                [] => {}
                [single] => {
                    notifier.warning(single.to_string());
                }
                many => {
                    notifier.warning(format!("{} files could not be added (too large or unsupported type)", many.len()));
                }
            }
        }

        tracing::info!(
            accepted = submission.accepted.len(),
            rejected = submission.rejected.len(),
            "Batch submitted"
        );
        submission
    }

    /// Upload `files` concurrently and wait for every attempt to settle.
    ///
    /// Files already uploading elsewhere are skipped. A cancelled upload ends
    /// in `error` and counts as failed.
    pub async fn start_upload(&self, files: Vec<UploadFile>, cancel: &CancellationToken) -> BatchReport {
        let batch_id = Uuid::new_v4();
        let files = self.claim(files);
        let total = files.len();

        if total == 0 {
            return BatchReport::new(batch_id, 0, vec![], vec![]);
        }

        let label: Arc<str> = if total == 1 {
            format!("Uploading {}", files[0].name).into()
        } else {
            format!("Uploading {} files", total).into()
        };

        let tracker = BatchTracker {
            batch_id,
            file_ids: files.iter().map(|f| f.file_id.clone()).collect(),
            tasks: self.tasks.clone(),
            progress_tx: self.progress_tx.clone(),
            notifier: self.notifier.clone(),
            notice: self.notifier.as_ref().map(|n| n.show_progress(&label, Some(0))),
            label,
        };

        tracing::info!(%batch_id, total, "Starting upload batch");

        let results = join_all(files.iter().map(|file| self.upload_one(file, &tracker, cancel))).await;

        let mut stored = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(object) => stored.push(object),
                Err(failure) => failures.push(failure),
            }
        }

        let report = BatchReport::new(batch_id, total, stored, failures);
        tracing::info!(
            %batch_id,
            success = report.success_count,
            failed = report.failed_count,
            total = report.total_count,
            outcome = ?report.outcome,
            "Upload batch settled"
        );

        self.announce(&tracker, &report, cancel.is_cancelled());
        if let Some(callback) = &self.on_complete {
            callback(&report.stored);
        }

        report
    }

    /// Validate and upload in one step
    pub async fn submit_and_upload(
        &self,
        files: Vec<CandidateFile>,
        cancel: &CancellationToken,
    ) -> (Submission, BatchReport) {
        let submission = self.submit(files);
        let report = self.start_upload(submission.accepted.clone(), cancel).await;
        (submission, report)
    }

    /// Re-upload every file that ended in `error`
    pub async fn retry_failed(&self, cancel: &CancellationToken) -> BatchReport {
        let failed: Vec<UploadFile> = self
            .tasks
            .lock()
            .iter()
            .filter(|t| t.task.status == UploadStatus::Error)
            .map(|t| t.file.clone())
            .collect();

        self.start_upload(failed, cancel).await
    }

    /// Snapshot of every tracked task
    pub fn tasks(&self) -> Vec<UploadTask> {
        self.tasks.lock().iter().map(|t| t.task.clone()).collect()
    }

    pub fn task(&self, file_id: &str) -> Option<UploadTask> {
        self.tasks
            .lock()
            .iter()
            .find(|t| t.task.file_id == file_id)
            .map(|t| t.task.clone())
    }

    /// Mean progress over all tracked tasks
    pub fn overall_progress(&self) -> u8 {
        let tasks = self.tasks.lock();
        if tasks.is_empty() {
            return 0;
        }
        let sum: usize = tasks.iter().map(|t| t.task.progress as usize).sum();
        (sum / tasks.len()) as u8
    }

    /// Drop completed and failed tasks; returns how many were removed
    pub fn clear_finished(&self) -> usize {
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|t| !t.task.status.is_terminal());
        before - tasks.len()
    }

    /// Register files for this batch and mark them `uploading` under one
    /// lock, so a concurrent batch cannot claim the same file
    fn claim(&self, files: Vec<UploadFile>) -> Vec<UploadFile> {
        let mut tasks = self.tasks.lock();
        let mut claimed: Vec<UploadFile> = Vec::with_capacity(files.len());

        for file in files {
            if claimed.iter().any(|f| f.file_id == file.file_id) {
                continue;
            }
            match tasks.iter_mut().find(|t| t.task.file_id == file.file_id) {
                Some(tracked) if tracked.task.status == UploadStatus::Uploading => {
                    tracing::warn!(file = %file.name, "Upload already in flight; skipping");
                    continue;
                }
                Some(tracked) => {
                    tracked.task = UploadTask::pending(&file);
                    tracked.task.status = UploadStatus::Uploading;
                    tracked.file = file.clone();
                }
                None => {
                    let mut task = UploadTask::pending(&file);
                    task.status = UploadStatus::Uploading;
                    tasks.push(Tracked {
                        task,
                        file: file.clone(),
                    });
                }
            }
            claimed.push(file);
        }

        claimed
    }

    async fn upload_one(
        &self,
        file: &UploadFile,
        tracker: &BatchTracker,
        cancel: &CancellationToken,
    ) -> Result<StoredObject, UploadFailure> {
        tracker.set_status(&file.file_id, UploadStatus::Uploading, None);

        let on_progress: ProgressCallback = {
            let tracker = tracker.clone();
            Arc::new(move |tick: FileProgress| tracker.record(tick))
        };

        let operation_id = format!("upload:{}", file.file_id);
        let result = self
            .retry
            .run(&operation_id, cancel, || {
                let transport = self.transport.clone();
                let file = file.clone();
                let options = self.options.clone();
                let on_progress = on_progress.clone();
                async move { transport.upload(&file, &options, on_progress).await }
            })
            .await;

        match result {
            Ok(mut object) => {
                if let Some(url) = self.thumbnail(file).await {
                    object.thumbnail_url = Some(url);
                }
                tracker.set_status(&file.file_id, UploadStatus::Completed, None);
                tracing::info!(file = %file.name, "Upload completed");
                Ok(object)
            }
            Err(RetryError::Cancelled) => {
                let message = "Upload cancelled".to_string();
                tracker.set_status(&file.file_id, UploadStatus::Error, Some(message.clone()));
                Err(UploadFailure {
                    file_id: file.file_id.clone(),
                    file_name: file.name.clone(),
                    error: None,
                    attempts: 0,
                    message,
                })
            }
            Err(RetryError::Failed { error, attempts }) => {
                let error = error
                    .with_detail("file_name", file.name.as_str())
                    .with_detail("file_id", file.file_id.as_str());
                let message = format!(
                    "Upload failed after {} attempt{}: {}",
                    attempts,
                    if attempts == 1 { "" } else { "s" },
                    user_facing_message(&error)
                );

                tracing::warn!(file = %file.name, kind = %error.kind, attempts, "Upload failed: {}", error.message);
                if let Some(reporter) = &self.reporter {
                    if should_report(&error) {
                        reporter.report(&error);
                    }
                }

                tracker.set_status(&file.file_id, UploadStatus::Error, Some(message.clone()));
                Err(UploadFailure {
                    file_id: file.file_id.clone(),
                    file_name: file.name.clone(),
                    error: Some(error),
                    attempts,
                    message,
                })
            }
        }
    }

    /// Best-effort thumbnail; failures never fail the upload
    async fn thumbnail(&self, file: &UploadFile) -> Option<String> {
        let thumbnailer = self.thumbnailer.as_ref()?;
        if !self.config.generate_thumbnails || !supports_thumbnail(&file.mime_type) {
            return None;
        }

        match thumbnailer.generate_thumbnail(file, &self.config.thumbnail).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(file = %file.name, "Thumbnail generation failed: {}", e);
                None
            }
        }
    }

    /// Turn the progress notice into the batch outcome. If the notice is
    /// gone (evicted by the capacity cap), the outcome is shown afresh.
    fn announce(&self, tracker: &BatchTracker, report: &BatchReport, cancelled: bool) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        let config = notifier.config();
        let noun = |n: usize| if n == 1 { "file" } else { "files" };
        let (kind, duration, label) = match report.outcome {
            _ if cancelled => (
                NotificationKind::Error,
                Duration::from_millis(config.progress_error_duration_ms),
                "Upload cancelled".to_string(),
            ),
            BatchOutcome::AllSucceeded => (
                NotificationKind::Success,
                Duration::from_millis(config.progress_success_duration_ms),
                format!("Uploaded {} {}", report.success_count, noun(report.success_count)),
            ),
            BatchOutcome::PartialSuccess => (
                NotificationKind::Warning,
                config.duration_for(NotificationKind::Warning),
                format!(
                    "Uploaded {} of {} files; {} failed",
                    report.success_count, report.total_count, report.failed_count
                ),
            ),
            BatchOutcome::AllFailed => (
                NotificationKind::Error,
                Duration::from_millis(config.progress_error_duration_ms),
                match report.failures.as_slice() {
                    [single] => single.message.clone(),
                    _ => format!("{} uploads failed", report.failed_count),
                },
            ),
            BatchOutcome::Empty => {
                if let Some(id) = tracker.notice {
                    notifier.dismiss(id);
                }
                return;
            }
        };

        let updated = tracker.notice.is_some_and(|id| {
            notifier.update(
                id,
                label.clone(),
                NotificationUpdate::default()
                    .kind(kind)
                    .duration(duration)
                    .dismissible(true),
            )
        });
        if !updated {
            tracing::debug!(batch_id = %report.batch_id, "Progress notice gone; showing outcome separately");
            notifier.show(label, NotificationOptions::new(kind).with_duration(duration));
        }
    }
}
