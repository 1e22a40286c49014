//! Per-step execution state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::entities::StepId;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::route::{DependencyGate, RouteStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Queued,
    InProgress,
    OnHold,
    Completed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }

    /// Work on the step has begun at some point.
    pub fn has_started(self) -> bool {
        matches!(
            self,
            StepStatus::InProgress | StepStatus::OnHold | StepStatus::Completed
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Queued => "queued",
            StepStatus::InProgress => "in_progress",
            StepStatus::OnHold => "on_hold",
            StepStatus::Completed => "completed",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepAction {
    Enqueue,
    Start,
    Pause,
    Resume,
    Finish,
    Skip,
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepAction::Enqueue => "enqueue",
            StepAction::Start => "start",
            StepAction::Pause => "pause",
            StepAction::Resume => "resume",
            StepAction::Finish => "finish",
            StepAction::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// Target state of `action` from `current`, ignoring dependency gating.
pub fn next_status(current: StepStatus, action: StepAction) -> Option<StepStatus> {
    use StepAction::*;
    use StepStatus::*;
    match (current, action) {
        (Pending, Enqueue) => Some(Queued),
        (Pending | Queued, Start) => Some(InProgress),
        (InProgress, Pause) => Some(OnHold),
        (OnHold, Resume) => Some(InProgress),
        (InProgress, Finish) => Some(Completed),
        (s, Skip) if !s.is_terminal() => Some(Skipped),
        _ => None,
    }
}

/// Whether a dependency in `dependency` state lets a step with `gate` start.
///
/// A skipped dependency no longer blocks anything.
pub fn gate_satisfied(gate: DependencyGate, dependency: StepStatus) -> bool {
    if dependency == StepStatus::Skipped {
        return true;
    }
    match gate {
        DependencyGate::Completed => dependency == StepStatus::Completed,
        DependencyGate::InProgress => dependency.has_started(),
    }
}

/// Apply `action` to step `id`, returning the updated chain.
#[instrument(level = "debug", skip(steps))]
pub fn transition(
    steps: &[RouteStep],
    id: &StepId,
    action: StepAction,
    at: DateTime<Utc>,
) -> DomainResult<Vec<RouteStep>> {
    let pos = steps
        .iter()
        .position(|s| &s.id == id)
        .ok_or_else(|| DomainError::step_not_found(id))?;
    let step = &steps[pos];

    let target = next_status(step.status, action).ok_or_else(|| DomainError::InvalidTransition {
        step: id.clone(),
        status: step.status,
        action,
    })?;

    if action == StepAction::Start {
        if let Some(dep_id) = &step.depends_on_step_id {
            let dependency = steps
                .iter()
                .find(|s| &s.id == dep_id)
                .ok_or_else(|| DomainError::step_not_found(dep_id))?;
            if !gate_satisfied(step.gate(), dependency.status) {
                return Err(DomainError::DependencyNotSatisfied {
                    step: id.clone(),
                    dependency: dep_id.clone(),
                    status: dependency.status,
                });
            }
        }
    }

    debug!("step {}: {} -> {}", id, step.status, target);
    let mut next = steps.to_vec();
    let step = &mut next[pos];
    step.status = target;
    match target {
        StepStatus::InProgress if step.started_at.is_none() => step.started_at = Some(at),
        StepStatus::Completed => step.completed_at = Some(at),
        _ => {}
    }
    Ok(next)
}
