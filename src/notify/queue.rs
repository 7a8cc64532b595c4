use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::Display;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{NotificationError, NotificationPayload, NotificationTransport};

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Retrying,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    pub id: JobId,
    pub payload: NotificationPayload,
    pub attempts: u32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    /// Delivery attempts before a job is marked failed
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Pause between two deliveries
    pub pacing: Duration,
    /// Upper bound for one delivery attempt
    pub send_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            pacing: Duration::from_millis(100),
            send_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Jobs waiting for a first or repeated delivery attempt
    pub queue_size: usize,
    pub processing: bool,
    pub pending: usize,
    pub retrying: usize,
    pub completed: u64,
    pub failed: usize,
}

#[derive(Default)]
struct Shared {
    jobs: Mutex<HashMap<JobId, NotificationJob>>,
    completed: AtomicU64,
    draining: AtomicBool,
}

impl Shared {
    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, NotificationJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process FIFO with a single background drainer.
///
/// Jobs are handed to the worker task over a channel; a failed job is
/// re-sent to the tail of the channel after `retry_delay` until
/// `max_retries` attempts were made. Completed jobs leave the table and are
/// only counted; failed jobs stay until [`NotificationQueue::clear_failed`].
#[derive(Clone)]
pub struct NotificationQueue {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<JobId>,
    shutdown: Arc<Notify>,
    worker: Arc<Mutex<Option<JoinHandle<usize>>>>,
}

impl NotificationQueue {
    /// Spawns the worker on the current tokio runtime.
    pub fn start(transport: Arc<dyn NotificationTransport>, settings: QueueSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let shutdown = Arc::new(Notify::new());

        let worker = Worker {
            shared: shared.clone(),
            transport,
            settings,
            tx: tx.clone(),
            rx,
            shutdown: shutdown.clone(),
        };
        let handle = tokio::spawn(worker.run());

        Self {
            shared,
            tx,
            shutdown,
            worker: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Adds a job and returns without waiting for delivery.
    pub fn enqueue(&self, payload: NotificationPayload) -> Result<JobId, NotificationError> {
        let job = NotificationJob {
            id: Uuid::new_v4(),
            payload,
            attempts: 0,
            status: JobStatus::Pending,
            created_at: Utc::now(),
        };
        let id = job.id;
        let to = job.payload.to.clone();

        self.shared.jobs().insert(id, job);

        if self.tx.send(id).is_err() {
            self.shared.jobs().remove(&id);
            return Err(NotificationError::QueueClosed);
        }

        debug!(job_id = %id, %to, "Notification queued");
        Ok(id)
    }

    pub fn status(&self) -> QueueStatus {
        let jobs = self.shared.jobs();
        let count = |status: JobStatus| jobs.values().filter(|j| j.status == status).count();
        let pending = count(JobStatus::Pending);
        let retrying = count(JobStatus::Retrying);

        QueueStatus {
            queue_size: pending + retrying,
            processing: self.shared.draining.load(Ordering::SeqCst),
            pending,
            retrying,
            completed: self.shared.completed.load(Ordering::SeqCst),
            failed: count(JobStatus::Failed),
        }
    }

    /// Drops permanently failed jobs; returns how many were removed.
    pub fn clear_failed(&self) -> usize {
        let mut jobs = self.shared.jobs();
        let before = jobs.len();
        jobs.retain(|_, job| job.status != JobStatus::Failed);
        let removed = before - jobs.len();
        info!(removed, "Cleared failed notification jobs");
        removed
    }

    #[cfg(test)]
    pub fn job(&self, id: JobId) -> Option<NotificationJob> {
        self.shared.jobs().get(&id).cloned()
    }

    /// Stops the worker and waits for it to exit. Jobs not yet delivered are
    /// logged, not sent; returns how many were dropped.
    pub async fn shutdown(&self) -> usize {
        self.shutdown.notify_one();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return 0;
        };

        match handle.await {
            Ok(abandoned) => abandoned,
            Err(e) => {
                error!(error = %e, "Notification worker did not stop cleanly");
                0
            }
        }
    }
}

struct Worker {
    shared: Arc<Shared>,
    transport: Arc<dyn NotificationTransport>,
    settings: QueueSettings,
    tx: mpsc::UnboundedSender<JobId>,
    rx: mpsc::UnboundedReceiver<JobId>,
    shutdown: Arc<Notify>,
}

impl Worker {
    async fn run(mut self) -> usize {
        info!("Notification worker started");

        loop {
            let id = tokio::select! {
                _ = self.shutdown.notified() => break,
                next = self.rx.recv() => match next {
                    Some(id) => id,
                    None => break,
                },
            };

            self.shared.draining.store(true, Ordering::SeqCst);
            self.deliver(id).await;

            tokio::time::sleep(self.settings.pacing).await;

            if self.rx.is_empty() {
                self.shared.draining.store(false, Ordering::SeqCst);
            }
        }

        self.shared.draining.store(false, Ordering::SeqCst);
        let abandoned = self.report_abandoned();
        info!(abandoned, "Notification worker stopped");
        abandoned
    }

    async fn deliver(&self, id: JobId) {
        let payload = match self.shared.jobs().get(&id) {
            Some(job) if matches!(job.status, JobStatus::Pending | JobStatus::Retrying) => {
                job.payload.clone()
            }
            _ => return,
        };

        let timeout = self.settings.send_timeout;
        let result = tokio::time::timeout(timeout, self.transport.send(&payload))
            .await
            .unwrap_or(Err(NotificationError::TimedOut(timeout)));

        let mut jobs = self.shared.jobs();
        match result {
            Ok(()) => {
                jobs.remove(&id);
                self.shared.completed.fetch_add(1, Ordering::SeqCst);
                info!(job_id = %id, to = %payload.to, "Notification sent");
            }
            Err(e) => {
                let Some(job) = jobs.get_mut(&id) else {
                    return;
                };
                job.attempts += 1;

                if job.attempts < self.settings.max_retries {
                    job.status = JobStatus::Retrying;
                    warn!(
                        job_id = %id,
                        attempt = job.attempts,
                        max = self.settings.max_retries,
                        error = %e,
                        "Notification failed, retrying"
                    );
                    self.schedule_retry(id);
                } else {
                    job.status = JobStatus::Failed;
                    error!(
                        job_id = %id,
                        attempts = job.attempts,
                        error = %e,
                        "Notification permanently failed"
                    );
                }
            }
        }
    }

    fn schedule_retry(&self, id: JobId) {
        let tx = self.tx.clone();
        let delay = self.settings.retry_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // worker gone: the job was already reported as abandoned
            let _ = tx.send(id);
        });
    }

    fn report_abandoned(&self) -> usize {
        let jobs = self.shared.jobs();
        let mut abandoned = 0;
        for job in jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Retrying))
        {
            abandoned += 1;
            warn!(
                job_id = %job.id,
                to = %job.payload.to,
                status = %job.status,
                attempts = job.attempts,
                "Undelivered notification dropped at shutdown"
            );
        }
        abandoned
    }
}
