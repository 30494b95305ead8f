//! Result poller: watches an optimization job row until it reaches a
//! terminal status.
//!
//! Each poll runs as its own task with a single `CancellationToken`. Dropping
//! the `PollHandle` (view teardown) cancels the task and any pending sleep;
//! a retry is a fresh task with fresh counters, never a continuation.

pub mod normalize;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::PollSettings;
use crate::db::JobStore;
use crate::models::job::{JobStatus, OptimizationResult};
use crate::session::Session;

pub use normalize::normalize;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("no job id given")]
    NotFound,

    #[error("no signed-in user")]
    Unauthenticated,

    #[error("job query failed: {0}")]
    QueryError(String),

    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("job not finished after {attempts} attempts")]
    Timeout { attempts: u32 },
}

/// Progress of one poll, published through a `watch` channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    Waiting { attempt: u32, max_attempts: u32 },
    Ready(Box<OptimizationResult>),
    Failed(PollError),
    Cancelled,
}

impl PollStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollStatus::Waiting { .. })
    }
}

/// Owner of a running poll. Dropping it cancels the poll.
pub struct PollHandle {
    cancel: CancellationToken,
    status: watch::Receiver<PollStatus>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    fn finished(status: PollStatus) -> Self {
        let (_, rx) = watch::channel(status);
        Self {
            cancel: CancellationToken::new(),
            status: rx,
            task: None,
        }
    }

    pub fn status(&self) -> PollStatus {
        self.status.borrow().clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn subscribe(&self) -> watch::Receiver<PollStatus> {
        self.status.clone()
    }

    /// Resolves once the poll reached a terminal status.
    #[cfg(test)]
    pub async fn wait(&mut self) -> PollStatus {
        loop {
            {
                let status = self.status.borrow_and_update();
                if status.is_terminal() {
                    return status.clone();
                }
            }
            if self.status.changed().await.is_err() {
                return self.status.borrow().clone();
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[derive(Clone)]
pub struct ResultPoller {
    store: Arc<dyn JobStore>,
    settings: PollSettings,
}

impl ResultPoller {
    pub fn new(store: Arc<dyn JobStore>, settings: PollSettings) -> Self {
        Self { store, settings }
    }

    /// Starts watching `job_id` for the session's user.
    pub fn start(&self, job_id: Option<&str>, session: &Session) -> PollHandle {
        let Some(job_id) = job_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return PollHandle::finished(PollStatus::Failed(PollError::NotFound));
        };
        let Some(user_id) = session.user_id() else {
            return PollHandle::finished(PollStatus::Failed(PollError::Unauthenticated));
        };

        let (tx, rx) = watch::channel(PollStatus::Waiting {
            attempt: 0,
            max_attempts: self.settings.max_attempts,
        });
        let cancel = CancellationToken::new();

        let store = Arc::clone(&self.store);
        let settings = self.settings;
        let job_id = job_id.to_string();
        let user_id = user_id.to_string();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => None,
                result = poll_until_terminal(store.as_ref(), settings, &job_id, &user_id, &tx) => Some(result),
            };

            let status = match outcome {
                None => {
                    debug!(job_id, "Polling cancelled");
                    PollStatus::Cancelled
                }
                Some(Ok(result)) => PollStatus::Ready(Box::new(result)),
                Some(Err(e)) => {
                    warn!(job_id, "Polling ended: {e}");
                    PollStatus::Failed(e)
                }
            };
            tx.send_replace(status);
        });

        PollHandle {
            cancel,
            status: rx,
            task: Some(task),
        }
    }
}

/// Fetches the job until it completes, fails, or `max_attempts` fetches
/// passed without a terminal status. A missing row counts as not yet visible.
#[instrument(skip(store, settings, progress))]
pub async fn poll_until_terminal(
    store: &dyn JobStore,
    settings: PollSettings,
    job_id: &str,
    user_id: &str,
    progress: &watch::Sender<PollStatus>,
) -> Result<OptimizationResult, PollError> {
    for attempt in 1..=settings.max_attempts {
        progress.send_replace(PollStatus::Waiting {
            attempt,
            max_attempts: settings.max_attempts,
        });

        match store.fetch_job(job_id, user_id).await {
            Err(e) => return Err(PollError::QueryError(e.to_string())),
            Ok(None) => debug!(attempt, "Job row not visible yet"),
            Ok(Some(row)) => match JobStatus::parse(&row.status) {
                Some(JobStatus::Completed) => {
                    info!(attempt, "Job completed");
                    return Ok(normalize(&row));
                }
                Some(JobStatus::Error) => {
                    return Err(PollError::JobFailed(row.error_message.unwrap_or_else(
                        || "The optimization backend reported an error".to_string(),
                    )));
                }
                Some(JobStatus::Pending) | Some(JobStatus::Processing) => {
                    debug!(attempt, status = %row.status, "Job still running");
                }
                None => warn!(attempt, status = %row.status, "Unknown job status, still waiting"),
            },
        }

        if attempt < settings.max_attempts {
            tokio::time::sleep(settings.interval).await;
        }
    }

    Err(PollError::Timeout {
        attempts: settings.max_attempts,
    })
}

/// How long a finished poll stays readable before its view is dropped.
pub const FINISHED_RETENTION: Duration = Duration::from_secs(60);

type ViewKey = (String, String);

struct OpenView {
    id: u64,
    handle: PollHandle,
}

/// The result views currently open, one poll per (user, job). A view whose
/// poll finished is evicted after `FINISHED_RETENTION`, whether or not the
/// client ever closed it.
pub struct ResultWatchers {
    poller: ResultPoller,
    views: Arc<Mutex<HashMap<ViewKey, OpenView>>>,
    next_id: AtomicU64,
    retention: Duration,
}

impl ResultWatchers {
    pub fn new(poller: ResultPoller) -> Self {
        Self {
            poller,
            views: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            retention: FINISHED_RETENTION,
        }
    }

    fn key(job_id: Option<&str>, session: &Session) -> Option<ViewKey> {
        Some((session.user_id()?.to_string(), job_id?.trim().to_string()))
            .filter(|(_, job)| !job.is_empty())
    }

    fn track(&self, key: ViewKey, handle: PollHandle) -> OpenView {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.evict_when_finished(key, id, handle.subscribe());
        OpenView { id, handle }
    }

    /// Drops the view once its poll is terminal and the retention passed,
    /// unless a retry replaced it in the meantime.
    fn evict_when_finished(&self, key: ViewKey, id: u64, mut status: watch::Receiver<PollStatus>) {
        let views = Arc::downgrade(&self.views);
        let retention = self.retention;

        tokio::spawn(async move {
            loop {
                if status.borrow_and_update().is_terminal() {
                    break;
                }
                if status.changed().await.is_err() {
                    break;
                }
            }
            tokio::time::sleep(retention).await;

            let Some(shared) = views.upgrade() else {
                return;
            };
            let mut views = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if views.get(&key).is_some_and(|view| view.id == id) {
                views.remove(&key);
                debug!(user_id = %key.0, job_id = %key.1, "Evicted finished results view");
            }
        });
    }

    /// Opens the view for a job, starting a poll if none is running, and
    /// returns its current status.
    pub fn open(&self, job_id: Option<&str>, session: &Session) -> PollStatus {
        let Some(key) = Self::key(job_id, session) else {
            return self.poller.start(job_id, session).status();
        };
        let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(view) = views.get(&key) {
            return view.handle.status();
        }
        let view = self.track(key.clone(), self.poller.start(job_id, session));
        let status = view.handle.status();
        views.insert(key, view);
        status
    }

    /// Cancels the current poll for the job and starts over from attempt one.
    pub fn retry(&self, job_id: Option<&str>, session: &Session) -> PollStatus {
        let Some(key) = Self::key(job_id, session) else {
            return self.poller.start(job_id, session).status();
        };
        let view = self.track(key.clone(), self.poller.start(job_id, session));
        let status = view.handle.status();
        let previous = self
            .views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, view);
        if let Some(previous) = previous {
            debug!(finished = previous.handle.status().is_terminal(), "Replacing poll");
        }
        status
    }

    /// Tears the view down; the poll is cancelled.
    pub fn close(&self, job_id: Option<&str>, session: &Session) -> bool {
        let Some(key) = Self::key(job_id, session) else {
            return false;
        };
        let removed = self
            .views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        match removed {
            Some(view) => {
                view.handle.cancel();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn open_views(&self) -> usize {
        self.views.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
