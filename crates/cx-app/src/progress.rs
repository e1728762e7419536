//! Progress reporting for service-level runs.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    LoadingModel,
    CheckingCache,
    LoadingCachedResult,
    Compiling,
    Running,
    Saving,
    Completed,
}

impl RunStage {
    pub fn label(self) -> &'static str {
        match self {
            RunStage::LoadingModel => "loading model",
            RunStage::CheckingCache => "checking archive",
            RunStage::LoadingCachedResult => "loading archived run",
            RunStage::Compiling => "compiling",
            RunStage::Running => "running",
            RunStage::Saving => "saving",
            RunStage::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunProgressEvent {
    pub stage: RunStage,
    pub elapsed_wall_s: f64,
    /// Fraction of the simulated interval covered, while running.
    pub fraction: Option<f64>,
    pub message: Option<String>,
}

impl RunProgressEvent {
    pub fn stage(stage: RunStage, elapsed_wall_s: f64, message: impl Into<String>) -> Self {
        Self {
            stage,
            elapsed_wall_s,
            fraction: None,
            message: Some(message.into()),
        }
    }

    pub fn running(elapsed_wall_s: f64, fraction: f64) -> Self {
        Self {
            stage: RunStage::Running,
            elapsed_wall_s,
            fraction: Some(fraction),
            message: None,
        }
    }
}
