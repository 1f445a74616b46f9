//! Deploy push state machine.
//!
//! `Idle → Uploading* → Building* → (Succeeded | Failed)`. Events that
//! would move backwards, counters that decrease, and anything after a
//! terminal event are protocol violations.

use edgedeploy_protocol::{Deployment, ProgressEvent};

use crate::error::DeployError;

/// Where a push currently is.
#[derive(Debug, Clone, PartialEq)]
pub enum PushState {
    Idle,
    Uploading {
        current_bytes: u64,
        total_bytes: u64,
    },
    Building {
        seen: u64,
        total: u64,
        upload_complete: bool,
    },
    Succeeded,
    Failed,
}

/// What a consumer should report after applying an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Upload progress, for display only.
    Uploading { percent: f64 },
    /// Build progress, for display only.
    Building { percent: f64 },
    /// The remote has every file.
    UploadComplete,
    /// Terminal success.
    Done(Deployment),
}

/// Validating consumer of a single push's progress events.
#[derive(Debug, Clone)]
pub struct PushProgress {
    state: PushState,
}

impl Default for PushProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl PushProgress {
    pub fn new() -> Self {
        Self {
            state: PushState::Idle,
        }
    }

    pub fn state(&self) -> &PushState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, PushState::Succeeded | PushState::Failed)
    }

    /// Advances the state machine by one event.
    ///
    /// An `error` event moves to `Failed` and is returned as
    /// [`DeployError::Stream`].
    pub fn apply(&mut self, event: ProgressEvent) -> Result<Step, DeployError> {
        if self.is_terminal() {
            return Err(DeployError::ProtocolViolation(format!(
                "{} event after the stream terminated",
                event.kind()
            )));
        }

        match event {
            ProgressEvent::StaticFile {
                current_bytes,
                total_bytes,
            } => {
                match self.state {
                    PushState::Idle => {}
                    PushState::Uploading {
                        current_bytes: previous,
                        ..
                    } if current_bytes >= previous => {}
                    PushState::Uploading {
                        current_bytes: previous,
                        ..
                    } => {
                        return self.violation(format!(
                            "upload progress went backwards ({previous} -> {current_bytes})"
                        ));
                    }
                    _ => return self.violation("staticFile event after the build started".into()),
                }
                self.state = PushState::Uploading {
                    current_bytes,
                    total_bytes,
                };
                Ok(Step::Uploading {
                    percent: percent(current_bytes, total_bytes),
                })
            }

            ProgressEvent::Load { seen, total } => {
                let upload_complete = match self.state {
                    PushState::Building {
                        seen: previous,
                        upload_complete,
                        ..
                    } => {
                        if seen < previous {
                            return self.violation(format!(
                                "build progress went backwards ({previous} -> {seen})"
                            ));
                        }
                        upload_complete
                    }
                    _ => false,
                };
                self.state = PushState::Building {
                    seen,
                    total,
                    upload_complete,
                };
                Ok(Step::Building {
                    percent: percent(seen, total),
                })
            }

            ProgressEvent::UploadComplete => {
                let (seen, total) = match self.state {
                    PushState::Building {
                        upload_complete: true,
                        ..
                    } => return self.violation("uploadComplete received twice".into()),
                    PushState::Building { seen, total, .. } => (seen, total),
                    _ => (0, 0),
                };
                self.state = PushState::Building {
                    seen,
                    total,
                    upload_complete: true,
                };
                Ok(Step::UploadComplete)
            }

            ProgressEvent::Success(deployment) => {
                if deployment.domain_mappings.is_empty() {
                    return self.violation(format!(
                        "deployment {} succeeded without domain mappings",
                        deployment.id
                    ));
                }
                self.state = PushState::Succeeded;
                Ok(Step::Done(deployment))
            }

            ProgressEvent::Error { ctx } => {
                self.state = PushState::Failed;
                Err(DeployError::Stream { ctx })
            }
        }
    }

    fn violation(&mut self, message: String) -> Result<Step, DeployError> {
        self.state = PushState::Failed;
        Err(DeployError::ProtocolViolation(message))
    }
}

/// `current / total` as a percentage; an empty total counts as done.
pub fn percent(current: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (current as f64 / total as f64 * 100.0).min(100.0)
}
