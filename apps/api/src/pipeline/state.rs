use serde::Serialize;

/// Where a resume is in its upload → enhance → render journey.
/// Declaration order is progress order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    NotUploaded,
    Uploading,
    Uploaded,
    Enhancing,
    Enhanced,
    Rendering,
    Rendered,
}

impl PipelineState {
    /// A network call for this pipeline is outstanding.
    pub fn is_in_flight(self) -> bool {
        matches!(self, PipelineState::Uploading | PipelineState::Enhancing)
    }

    /// Enhancement has already produced a job for the current resume.
    pub fn is_enhanced(self) -> bool {
        self >= PipelineState::Enhanced
    }

    /// UI gate: the job description form is usable.
    pub fn accepts_job_description(self) -> bool {
        matches!(self, PipelineState::Uploading | PipelineState::Uploaded)
    }

    /// UI gate: the comparison and preview widgets have something to show.
    pub fn has_preview(self) -> bool {
        self == PipelineState::Rendered
    }
}
