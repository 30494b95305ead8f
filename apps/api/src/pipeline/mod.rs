//! Resume pipeline: sequences upload → enhancement → render for one user
//! and gates what the dashboard may do at each step.
//!
//! All mutation goes through `Pipeline` methods. State lives behind a short
//! mutex that is never held across an await, so the in-flight guards reject
//! overlapping calls instead of queueing them.
//!
//! An enhancement requested while the upload is still running is recorded as
//! a queued intent and replayed exactly once when the upload lands.

pub mod notify;
pub mod state;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::api_client::JobApi;
use crate::errors::AppError;
use crate::models::resume::{ResumeFile, ResumeRecord};
use crate::session::Session;

pub use notify::{Notification, NotificationLog};
pub use state::PipelineState;

/// What a successful enhancement call returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enhancement {
    pub job_id: String,
    pub enhanced_resume_id: String,
    pub job_description: String,
    pub analysis: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnhanceOutcome {
    /// The optimize call succeeded and the pipeline is `Enhanced`.
    Started(Enhancement),
    /// The upload is still running; the request will be replayed once it lands.
    Queued,
}

/// Read-only view of a pipeline for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub state: PipelineState,
    pub filename: Option<String>,
    pub resume_id: Option<String>,
    pub parsed_resume: Option<Value>,
    pub enhancement: Option<Enhancement>,
    pub enhancement_queued: bool,
    pub busy: bool,
    pub can_enhance: bool,
    pub has_preview: bool,
}

#[derive(Debug, Default)]
struct Inner {
    state: PipelineState,
    filename: Option<String>,
    resume: Option<ResumeRecord>,
    enhancement: Option<Enhancement>,
    queued_intent: Option<String>,
    /// Bumped on every new upload and on reset; late results carrying an
    /// older generation are discarded.
    generation: u64,
}

enum Gate {
    Dispatch { resume_id: String, generation: u64 },
    Queue { first_request: bool },
}

#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Mutex<Inner>>,
    api: Arc<dyn JobApi>,
    notifications: Arc<NotificationLog>,
    render_delay: Duration,
}

impl Pipeline {
    pub fn new(api: Arc<dyn JobApi>, render_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            api,
            notifications: Arc::new(NotificationLog::default()),
            render_delay,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Emits the one notification every failure owes the user.
    pub fn fail(&self, err: AppError) -> AppError {
        warn!("Pipeline operation failed: {err}");
        self.notifications.error(err.user_message());
        err
    }

    pub fn state(&self) -> PipelineState {
        self.lock().state
    }

    pub fn notifications(&self) -> &NotificationLog {
        &self.notifications
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        let inner = self.lock();
        PipelineSnapshot {
            state: inner.state,
            filename: inner.filename.clone(),
            resume_id: inner.resume.as_ref().map(|r| r.id.clone()),
            parsed_resume: inner.resume.as_ref().map(|r| r.parsed_content.clone()),
            enhancement: inner.enhancement.clone(),
            enhancement_queued: inner.queued_intent.is_some(),
            busy: inner.state.is_in_flight(),
            can_enhance: inner.state.accepts_job_description(),
            has_preview: inner.state.has_preview(),
        }
    }

    /// Returns the pipeline to `NotUploaded`, dropping any queued intent.
    /// Results of calls still in flight are discarded when they arrive.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let generation = inner.generation + 1;
        *inner = Inner {
            generation,
            ..Inner::default()
        };
        info!("Pipeline reset (generation {generation})");
    }

    /// Uploads a resume. The pipeline ends in `Uploaded` on success and in
    /// `NotUploaded` on failure, with exactly one notification per failure.
    pub async fn upload_resume(
        &self,
        session: &Session,
        file: ResumeFile,
    ) -> Result<ResumeRecord, AppError> {
        let user_id = session.require_user().map_err(|e| self.fail(e))?;
        file.validate().map_err(|e| self.fail(e))?;

        let generation = self.begin_upload(&file.filename).map_err(|e| self.fail(e))?;
        info!(user_id, filename = %file.filename, "Uploading resume");

        let response = match self.api.upload(user_id, &file).await {
            Ok(response) => response,
            Err(e) => {
                let mut inner = self.lock();
                if inner.generation == generation {
                    inner.state = PipelineState::NotUploaded;
                    inner.filename = None;
                    inner.queued_intent = None;
                }
                drop(inner);
                return Err(self.fail(e.into()));
            }
        };

        let record = ResumeRecord {
            id: response.resume_id,
            user_id: user_id.to_string(),
            filename: file.filename.clone(),
            parsed_content: response.parsed_resume,
        };

        // A queued intent is claimed under the same lock that lands the
        // upload, so no direct enhance can slip in before the replay.
        let intent = {
            let mut inner = self.lock();
            if inner.generation != generation {
                drop(inner);
                return Err(self.fail(AppError::Conflict(
                    "The upload was cancelled before it finished".to_string(),
                )));
            }
            inner.resume = Some(record.clone());
            let intent = inner.queued_intent.take();
            inner.state = if intent.is_some() {
                PipelineState::Enhancing
            } else {
                PipelineState::Uploaded
            };
            intent
        };

        info!(user_id, resume_id = %record.id, "Resume uploaded");
        self.notifications
            .success(format!("{} uploaded", record.filename));

        if let Some(job_description) = intent {
            info!(resume_id = %record.id, "Replaying queued enhancement");
            // Failures of the replay are notified by dispatch_enhancement.
            let _ = self
                .dispatch_enhancement(user_id, &record.id, &job_description, generation)
                .await;
        }

        Ok(record)
    }

    fn begin_upload(&self, filename: &str) -> Result<u64, AppError> {
        let mut inner = self.lock();
        match inner.state {
            PipelineState::Uploading => Err(AppError::Conflict(
                "An upload is already in progress".to_string(),
            )),
            PipelineState::Enhancing => Err(AppError::Conflict(
                "Wait for the current enhancement to finish before uploading".to_string(),
            )),
            _ => {
                let generation = inner.generation + 1;
                *inner = Inner {
                    state: PipelineState::Uploading,
                    filename: Some(filename.to_string()),
                    generation,
                    ..Inner::default()
                };
                Ok(generation)
            }
        }
    }

    /// Starts an enhancement of the uploaded resume against a job description.
    ///
    /// Rejected without any network call when the description is blank, no
    /// resume is uploaded, an enhancement is already running, or the resume is
    /// already enhanced. While the upload is running the request is queued.
    pub async fn enhance_resume(
        &self,
        session: &Session,
        job_description: &str,
    ) -> Result<EnhanceOutcome, AppError> {
        let job_description = job_description.trim();
        if job_description.is_empty() {
            return Err(self.fail(AppError::Validation(
                "Please enter a job description".to_string(),
            )));
        }
        let user_id = session.require_user().map_err(|e| self.fail(e))?;

        let (resume_id, generation) = match self
            .gate_enhancement(job_description)
            .map_err(|e| self.fail(e))?
        {
            Gate::Dispatch {
                resume_id,
                generation,
            } => (resume_id, generation),
            Gate::Queue { first_request } => {
                if first_request {
                    self.notifications
                        .info("Enhancement will start as soon as the upload finishes");
                }
                return Ok(EnhanceOutcome::Queued);
            }
        };

        self.dispatch_enhancement(user_id, &resume_id, job_description, generation)
            .await
            .map(EnhanceOutcome::Started)
    }

    /// Runs the optimize call for a pipeline already moved to `Enhancing`.
    async fn dispatch_enhancement(
        &self,
        user_id: &str,
        resume_id: &str,
        job_description: &str,
        generation: u64,
    ) -> Result<Enhancement, AppError> {
        info!(user_id, resume_id = %resume_id, "Requesting enhancement");

        let response = match self
            .api
            .optimize(user_id, resume_id, job_description)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let mut inner = self.lock();
                if inner.generation == generation && inner.state == PipelineState::Enhancing {
                    inner.state = PipelineState::Uploaded;
                }
                drop(inner);
                return Err(self.fail(e.into()));
            }
        };

        let enhancement = Enhancement {
            job_id: response.job_id,
            enhanced_resume_id: response.enhanced_resume_id,
            job_description: job_description.to_string(),
            analysis: response.analysis,
        };

        {
            let mut inner = self.lock();
            if inner.generation != generation {
                drop(inner);
                return Err(self.fail(AppError::Conflict(
                    "The resume changed while it was being enhanced".to_string(),
                )));
            }
            inner.state = PipelineState::Enhanced;
            inner.enhancement = Some(enhancement.clone());
        }

        info!(
            resume_id = %resume_id,
            job_id = %enhancement.job_id,
            enhanced_resume_id = %enhancement.enhanced_resume_id,
            "Resume enhanced"
        );
        self.notifications.success("Resume enhanced");
        self.schedule_render(generation);

        Ok(enhancement)
    }

    fn gate_enhancement(&self, job_description: &str) -> Result<Gate, AppError> {
        let mut inner = self.lock();
        match inner.state {
            PipelineState::NotUploaded => Err(AppError::Validation(
                "Upload a resume before enhancing it".to_string(),
            )),
            PipelineState::Uploading => {
                let first_request = inner.queued_intent.is_none();
                inner.queued_intent = Some(job_description.to_string());
                Ok(Gate::Queue { first_request })
            }
            PipelineState::Uploaded => {
                let resume_id = inner
                    .resume
                    .as_ref()
                    .map(|r| r.id.clone())
                    .ok_or_else(|| {
                        AppError::Validation("Upload a resume before enhancing it".to_string())
                    })?;
                inner.state = PipelineState::Enhancing;
                Ok(Gate::Dispatch {
                    resume_id,
                    generation: inner.generation,
                })
            }
            PipelineState::Enhancing => Err(AppError::Conflict(
                "Processing is already in progress".to_string(),
            )),
            state => {
                debug_assert!(state.is_enhanced());
                Err(AppError::Conflict(
                    "This resume has already been enhanced. Upload it again to start over."
                        .to_string(),
                ))
            }
        }
    }

    /// Moves `Enhanced` to `Rendered` after the fixed render delay. There is
    /// no server confirmation; a reset or re-upload in the meantime wins.
    fn schedule_render(&self, generation: u64) {
        let inner = Arc::clone(&self.inner);
        let delay = self.render_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.generation != generation || inner.state != PipelineState::Enhanced {
                return;
            }
            inner.state = PipelineState::Rendered;
            info!(
                job_id = inner.enhancement.as_ref().map(|e| e.job_id.as_str()),
                "Enhanced resume ready for preview"
            );
        });
    }
}

/// One pipeline per signed-in user, created on first use.
pub struct PipelineRegistry {
    pipelines: Mutex<HashMap<String, Pipeline>>,
    api: Arc<dyn JobApi>,
    render_delay: Duration,
}

impl PipelineRegistry {
    pub fn new(api: Arc<dyn JobApi>, render_delay: Duration) -> Self {
        Self {
            pipelines: Mutex::new(HashMap::new()),
            api,
            render_delay,
        }
    }

    pub fn for_session(&self, session: &Session) -> Result<Pipeline, AppError> {
        let user_id = session.require_user()?;
        let mut pipelines = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(pipelines
            .entry(user_id.to_string())
            .or_insert_with(|| Pipeline::new(Arc::clone(&self.api), self.render_delay))
            .clone())
    }
}
