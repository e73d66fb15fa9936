//! Ordered multi-step flows whose steps only move forward.

use crate::error::WorkflowError;
use crate::lifecycle::Lifecycle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Active,
    Completed,
    Skipped,
    Error,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

impl Lifecycle for StepStatus {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Error)
    }

    fn allows(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active | Self::Skipped | Self::Error)
                | (Self::Active, Self::Completed | Self::Skipped | Self::Error)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub step_id: String,
    pub label: String,
    pub status: StepStatus,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct StepTracker {
    steps: Vec<StepState>,
}

impl StepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[StepState] {
        &self.steps
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn push(&mut self, step_id: impl Into<String>, label: impl Into<String>) -> Result<(), WorkflowError> {
        let step_id = step_id.into();
        if self.steps.iter().any(|step| step.step_id == step_id) {
            return Err(WorkflowError::DuplicateStep(step_id));
        }
        self.steps.push(StepState {
            step_id,
            label: label.into(),
            status: StepStatus::Pending,
            result: None,
            error: None,
        });
        Ok(())
    }

    fn transition(&mut self, step_id: &str, next: StepStatus) -> Result<&mut StepState, WorkflowError> {
        let step = self
            .steps
            .iter_mut()
            .find(|step| step.step_id == step_id)
            .ok_or_else(|| WorkflowError::UnknownStep(step_id.to_string()))?;
        let from = step.status;
        if !StepStatus::advance(&mut step.status, next) {
            return Err(WorkflowError::InvalidTransition {
                step_id: step_id.to_string(),
                from: from.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        Ok(step)
    }

    pub fn activate(&mut self, step_id: &str) -> Result<(), WorkflowError> {
        self.transition(step_id, StepStatus::Active).map(|_| ())
    }

    pub fn complete(&mut self, step_id: &str, result: Option<String>) -> Result<(), WorkflowError> {
        let step = self.transition(step_id, StepStatus::Completed)?;
        step.result = result;
        Ok(())
    }

    pub fn fail(&mut self, step_id: &str, error: impl Into<String>) -> Result<(), WorkflowError> {
        let step = self.transition(step_id, StepStatus::Error)?;
        step.error = Some(error.into());
        Ok(())
    }

    /// Skips every step that has not reached a terminal status.
    pub fn skip_unfinished(&mut self) -> usize {
        let mut skipped = 0;
        for step in &mut self.steps {
            if StepStatus::advance(&mut step.status, StepStatus::Skipped) {
                skipped += 1;
            }
        }
        skipped
    }

    /// The first step that is not terminal yet.
    pub fn current(&self) -> Option<&StepState> {
        self.steps.iter().find(|step| !step.status.is_terminal())
    }
}
