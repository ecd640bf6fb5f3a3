// src/pipeline/upload.rs

//! Media upload worker pool.
//!
//! One producer walks the temp directory and feeds relative paths into a
//! bounded queue; N workers upload each file to `subfolder + path` and
//! remove the local copy on success. The producer ends the queue with one
//! `Done` marker per worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::error::{AppError, Result};
use crate::storage::ObjectStore;
use crate::utils::log;

/// Upload pool settings.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub source_dir: PathBuf,

    /// Key prefix, e.g. `images/`
    pub subfolder: String,
    pub workers: usize,

    /// Deadline for a single object upload
    pub timeout: Duration,
}

/// Summary of an upload run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Files enumerated by the producer
    pub queued: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

enum Job {
    File(String),
    Done,
}

/// Upload every file under the source directory.
pub async fn run_upload_pool(
    store: Arc<dyn ObjectStore>,
    options: &UploadOptions,
    cancel: CancellationToken,
) -> Result<UploadReport> {
    let workers = options.workers.max(1);
    let (tx, rx) = mpsc::channel::<Job>(1);
    let rx = Arc::new(Mutex::new(rx));

    let producer = {
        let source_dir = options.source_dir.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || produce(&source_dir, workers, &tx, &cancel))
    };

    let handles: Vec<_> = (0..workers)
        .map(|id| {
            let worker = Worker {
                id,
                store: Arc::clone(&store),
                source_dir: options.source_dir.clone(),
                subfolder: options.subfolder.clone(),
                timeout: options.timeout,
                cancel: cancel.clone(),
            };
            tokio::spawn(worker.run(Arc::clone(&rx)))
        })
        .collect();
    drop(rx);

    let mut report = UploadReport::default();
    for handle in handles {
        let (uploaded, failed) = handle.await?;
        report.uploaded += uploaded;
        report.failed += failed;
    }

    report.queued = producer.await??;
    report.cancelled = cancel.is_cancelled();
    Ok(report)
}

/// Walk the source directory, then send one `Done` per worker.
fn produce(
    source_dir: &Path,
    workers: usize,
    tx: &Sender<Job>,
    cancel: &CancellationToken,
) -> Result<usize> {
    let walked = walk(source_dir, tx, cancel);

    for _ in 0..workers {
        if tx.blocking_send(Job::Done).is_err() {
            break;
        }
    }
    walked
}

fn walk(source_dir: &Path, tx: &Sender<Job>, cancel: &CancellationToken) -> Result<usize> {
    let mut queued = 0;
    for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
        if cancel.is_cancelled() {
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(error) if error.depth() == 0 => return Err(error.into()),
            Err(error) => {
                log::warn(&format!("Skipping unreadable entry: {}", error));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = relative_key(source_dir, entry.path())?;
        if tx.blocking_send(Job::File(relative)).is_err() {
            break;
        }
        queued += 1;
    }
    Ok(queued)
}

/// Forward-slash key of `path` relative to `root`.
fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|e| AppError::object_store(format!("{}: {}", path.display(), e)))?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

struct Worker {
    id: usize,
    store: Arc<dyn ObjectStore>,
    source_dir: PathBuf,
    subfolder: String,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Worker {
    /// Drain the queue until a `Done` marker, a closed queue or cancellation.
    async fn run(self, rx: Arc<Mutex<Receiver<Job>>>) -> (usize, usize) {
        let (mut uploaded, mut failed) = (0, 0);

        loop {
            let job = tokio::select! {
                _ = self.cancel.cancelled() => break,
                job = async { rx.lock().await.recv().await } => job,
            };

            let relative = match job {
                Some(Job::File(relative)) => relative,
                Some(Job::Done) | None => break,
            };

            match self.upload(&relative).await {
                Ok(locator) => {
                    uploaded += 1;
                    log::debug(&format!("[worker {}] {} -> {}", self.id, relative, locator));
                }
                Err(AppError::Cancelled) => break,
                Err(error) => {
                    failed += 1;
                    log::warn(&format!(
                        "[worker {}] upload of {} failed, kept locally: {}",
                        self.id, relative, error
                    ));
                }
            }
        }

        (uploaded, failed)
    }

    async fn upload(&self, relative: &str) -> Result<String> {
        let path = self.source_dir.join(relative);
        let bytes = tokio::fs::read(&path).await?;
        let key = format!("{}{}", self.subfolder, relative);

        let locator = tokio::select! {
            _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
            result = tokio::time::timeout(self.timeout, self.store.put_object(&key, bytes)) => {
                result.map_err(|_| AppError::Timeout(format!("upload of {key}")))??
            }
        };

        tokio::fs::remove_file(&path).await?;
        Ok(locator)
    }
}
