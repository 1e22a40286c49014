//! Manufacturing route sequence engine.
//!
//! A route is a chain of steps ordered by `step_number`. After every
//! structural operation the numbers are dense (`1..=N`) and no step points at
//! a dependency outside the chain.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::entities::{Change, RouteBatch, RouteId, RouteMeta, StepId, StepPayload};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::execution::{self, StepAction, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    #[default]
    Standard,
    QualityCheck,
    Rework,
}

/// When a step may start relative to the step it depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyGate {
    #[default]
    Completed,
    InProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    All,
    Sample,
    FirstArticle,
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepType::Standard => "standard",
            StepType::QualityCheck => "quality_check",
            StepType::Rework => "rework",
        })
    }
}

impl fmt::Display for DependencyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DependencyGate::Completed => "completed",
            DependencyGate::InProgress => "in_progress",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStep {
    pub id: StepId,
    pub step_number: u32,
    pub name: String,
    #[serde(default)]
    pub step_type: StepType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_cell_ref: Option<String>,
    #[serde(default)]
    pub setup_time_minutes: f64,
    #[serde(default)]
    pub cycle_time_minutes: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on_step_id: Option<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_start_when_dependency: Option<DependencyGate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_mode: Option<SamplingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_ref: Option<String>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RouteStep {
    /// Effective gating policy; unset means `completed`.
    pub fn gate(&self) -> DependencyGate {
        self.can_start_when_dependency.unwrap_or_default()
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name", "must not be empty"));
        }
        for (field, value) in [
            ("setupTimeMinutes", self.setup_time_minutes),
            ("cycleTimeMinutes", self.cycle_time_minutes),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DomainError::validation(
                    field,
                    format!("must be a non-negative number, got {}", value),
                ));
            }
        }
        if self.step_type == StepType::QualityCheck
            && self.sampling_mode == Some(SamplingMode::Sample)
            && !matches!(self.sampling_size, Some(n) if n > 0)
        {
            return Err(DomainError::validation(
                "samplingSize",
                "required and greater than 0 for sampled quality checks",
            ));
        }
        Ok(())
    }

    // sampling fields only mean something on quality checks
    fn normalize_quality_fields(&mut self) {
        if self.step_type != StepType::QualityCheck {
            self.sampling_mode = None;
            self.sampling_size = None;
        } else if self.sampling_mode != Some(SamplingMode::Sample) {
            self.sampling_size = None;
        }
    }

    fn to_payload(&self) -> StepPayload {
        StepPayload {
            id: Some(self.id.clone()),
            step_number: self.step_number,
            name: self.name.clone(),
            step_type: self.step_type,
            work_cell_id: self.work_cell_ref.clone(),
            setup_time_minutes: self.setup_time_minutes,
            cycle_time_minutes: self.cycle_time_minutes,
            depends_on_step_id: self.depends_on_step_id.clone(),
            can_start_when_dependency: self.gate(),
            quality_check_mode: self.sampling_mode,
            sampling_size: self.sampling_size,
            form_id: self.form_ref.clone(),
            is_new: self.id.is_provisional(),
        }
    }
}

/// Input for `add_step`.
#[derive(Debug, Clone, Default)]
pub struct NewStep {
    pub name: String,
    pub step_type: StepType,
    pub work_cell_ref: Option<String>,
    pub setup_time_minutes: f64,
    pub cycle_time_minutes: f64,
    pub can_start_when_dependency: Option<DependencyGate>,
    pub sampling_mode: Option<SamplingMode>,
    pub sampling_size: Option<u32>,
    pub form_ref: Option<String>,
}

impl NewStep {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Partial edit of a step; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct StepPatch {
    pub name: Option<String>,
    pub step_type: Option<StepType>,
    pub work_cell_ref: Option<Option<String>>,
    pub setup_time_minutes: Option<f64>,
    pub cycle_time_minutes: Option<f64>,
    pub can_start_when_dependency: Option<DependencyGate>,
    pub sampling_mode: Option<Option<SamplingMode>>,
    pub sampling_size: Option<Option<u32>>,
    pub form_ref: Option<Option<String>>,
}

/// Load steps in `step_number` order without repairing them.
///
/// Broken chains stay broken here so `validate_for_save` can report them.
pub fn from_records(records: impl IntoIterator<Item = RouteStep>) -> Vec<RouteStep> {
    records
        .into_iter()
        .sorted_by_key(|s| s.step_number)
        .collect()
}

/// Append a step after the current last one and make it depend on it.
#[instrument(level = "debug", skip(steps, draft))]
pub fn add_step(steps: &[RouteStep], draft: NewStep) -> DomainResult<Vec<RouteStep>> {
    let last = steps.iter().max_by_key(|s| s.step_number);
    let mut step = RouteStep {
        id: StepId::provisional(),
        step_number: last.map(|s| s.step_number + 1).unwrap_or(1),
        name: draft.name,
        step_type: draft.step_type,
        work_cell_ref: draft.work_cell_ref,
        setup_time_minutes: draft.setup_time_minutes,
        cycle_time_minutes: draft.cycle_time_minutes,
        depends_on_step_id: last.map(|s| s.id.clone()),
        can_start_when_dependency: draft.can_start_when_dependency,
        sampling_mode: draft.sampling_mode,
        sampling_size: draft.sampling_size,
        form_ref: draft.form_ref,
        status: StepStatus::Pending,
        started_at: None,
        completed_at: None,
    };
    step.validate()?;
    step.normalize_quality_fields();

    let mut next = steps.to_vec();
    next.push(step);
    Ok(next)
}

/// Move `dragged` to `target_index` and rebuild the whole chain from array order.
///
/// Positions past the end are clamped to the last slot. A step that already
/// carries a gating policy keeps it; others get `completed`.
#[instrument(level = "debug", skip(steps))]
pub fn reorder(steps: &[RouteStep], dragged: &StepId, target_index: usize) -> DomainResult<Vec<RouteStep>> {
    let from = steps
        .iter()
        .position(|s| &s.id == dragged)
        .ok_or_else(|| DomainError::step_not_found(dragged))?;

    let mut next = steps.to_vec();
    let step = next.remove(from);
    let to = target_index.min(next.len());
    next.insert(to, step);
    debug!("step {} moved from position {} to {}", dragged, from, to);

    let mut previous: Option<StepId> = None;
    for (position, step) in next.iter_mut().enumerate() {
        step.step_number = position as u32 + 1;
        step.depends_on_step_id = previous.take();
        step.can_start_when_dependency = Some(step.can_start_when_dependency.unwrap_or_default());
        previous = Some(step.id.clone());
    }
    Ok(next)
}

/// Remove step `id`, relink its dependents to its predecessor and renumber.
#[instrument(level = "debug", skip(steps))]
pub fn delete_step(steps: &[RouteStep], id: &StepId) -> DomainResult<Vec<RouteStep>> {
    let pos = steps
        .iter()
        .position(|s| &s.id == id)
        .ok_or_else(|| DomainError::step_not_found(id))?;

    let mut next = steps.to_vec();
    next.remove(pos);
    // without a predecessor the new first step takes over as the anchor
    let predecessor = match pos {
        0 => next.first_mut().map(|first| {
            first.depends_on_step_id = None;
            first.id.clone()
        }),
        _ => Some(next[pos - 1].id.clone()),
    };

    for step in next.iter_mut() {
        if step.depends_on_step_id.as_ref() == Some(id) {
            debug!("relinking {} to {:?}", step.id, predecessor);
            step.depends_on_step_id = predecessor.clone();
        }
    }
    renumber(&mut next);
    Ok(next)
}

/// Apply a field edit to step `id`.
#[instrument(level = "debug", skip(steps, patch))]
pub fn update_step(steps: &[RouteStep], id: &StepId, patch: StepPatch) -> DomainResult<Vec<RouteStep>> {
    let pos = steps
        .iter()
        .position(|s| &s.id == id)
        .ok_or_else(|| DomainError::step_not_found(id))?;

    let mut step = steps[pos].clone();
    if let Some(name) = patch.name {
        step.name = name;
    }
    if let Some(step_type) = patch.step_type {
        step.step_type = step_type;
    }
    if let Some(work_cell) = patch.work_cell_ref {
        step.work_cell_ref = work_cell;
    }
    if let Some(setup) = patch.setup_time_minutes {
        step.setup_time_minutes = setup;
    }
    if let Some(cycle) = patch.cycle_time_minutes {
        step.cycle_time_minutes = cycle;
    }
    if let Some(gate) = patch.can_start_when_dependency {
        step.can_start_when_dependency = Some(gate);
    }
    if let Some(mode) = patch.sampling_mode {
        step.sampling_mode = mode;
    }
    if let Some(size) = patch.sampling_size {
        step.sampling_size = size;
    }
    if let Some(form) = patch.form_ref {
        step.form_ref = form;
    }
    step.validate()?;
    step.normalize_quality_fields();

    let mut next = steps.to_vec();
    next[pos] = step;
    Ok(next)
}

/// Check the chain right before it is sent to the store.
///
/// Reports, by name, every step that has no dependency although it is not
/// first, points at a step outside the route or at itself, has a dependency
/// while first, or sits at the wrong number.
pub fn validate_for_save(steps: &[RouteStep]) -> DomainResult<()> {
    let ids: HashSet<&StepId> = steps.iter().map(|s| &s.id).collect();
    let mut offending = Vec::new();

    for (position, step) in steps.iter().sorted_by_key(|s| s.step_number).enumerate() {
        let expected = position as u32 + 1;
        let broken = match &step.depends_on_step_id {
            None => step.step_number > 1,
            Some(dep) => step.step_number == 1 || dep == &step.id || !ids.contains(dep),
        };
        if broken || step.step_number != expected {
            offending.push(step.name.clone());
        }
    }

    if offending.is_empty() {
        Ok(())
    } else {
        warn!("chain not saveable: {:?}", offending);
        Err(DomainError::DependencyIntegrity { steps: offending })
    }
}

/// Total minutes to run `quantity` units through every step.
pub fn lead_time(steps: &[RouteStep], quantity: u32) -> f64 {
    steps
        .iter()
        .map(|s| s.setup_time_minutes + s.cycle_time_minutes * f64::from(quantity))
        .sum()
}

fn renumber(steps: &mut [RouteStep]) {
    for (position, step) in steps.iter_mut().enumerate() {
        step.step_number = position as u32 + 1;
    }
}

/// Route as loaded from and saved to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    pub id: RouteId,
    pub name: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<RouteStep>,
}

/// Editing snapshot of one route.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: RouteId,
    pub meta: RouteMeta,
    pub steps: Vec<RouteStep>,
    /// Persisted steps deleted since the last successful save
    pub deleted_step_ids: Vec<StepId>,
}

/// Store call required to persist a route mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteEffect {
    BatchSave(RouteBatch),
    StatusChange {
        step_id: StepId,
        status: StepStatus,
        at: DateTime<Utc>,
    },
}

impl From<RouteRecord> for Route {
    fn from(record: RouteRecord) -> Self {
        Self {
            id: record.id,
            meta: RouteMeta {
                name: record.name,
                revision: record.revision,
                description: record.description,
            },
            steps: from_records(record.steps),
            deleted_step_ids: Vec::new(),
        }
    }
}

impl Route {
    pub fn new(id: RouteId, meta: RouteMeta) -> Self {
        Self {
            id,
            meta,
            steps: Vec::new(),
            deleted_step_ids: Vec::new(),
        }
    }

    pub fn step(&self, id: &StepId) -> Option<&RouteStep> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Validated batch-save body; fails before anything is sent.
    pub fn batch(&self) -> DomainResult<RouteBatch> {
        validate_for_save(&self.steps)?;
        Ok(RouteBatch {
            route_meta: self.meta.clone(),
            deleted_step_ids: self.deleted_step_ids.clone(),
            steps: self.steps.iter().map(RouteStep::to_payload).collect(),
        })
    }

    fn with_steps(&self, steps: Vec<RouteStep>) -> DomainResult<Change<Route, RouteEffect>> {
        let next = Route {
            steps,
            ..self.clone()
        };
        let batch = next.batch()?;
        Ok(Change::new(next, RouteEffect::BatchSave(batch)))
    }

    pub fn save(&self) -> DomainResult<Change<Route, RouteEffect>> {
        self.with_steps(self.steps.clone())
    }

    pub fn add_step(&self, draft: NewStep) -> DomainResult<Change<Route, RouteEffect>> {
        self.with_steps(add_step(&self.steps, draft)?)
    }

    pub fn reorder(&self, dragged: &StepId, target_index: usize) -> DomainResult<Change<Route, RouteEffect>> {
        self.with_steps(reorder(&self.steps, dragged, target_index)?)
    }

    pub fn update_step(&self, id: &StepId, patch: StepPatch) -> DomainResult<Change<Route, RouteEffect>> {
        self.with_steps(update_step(&self.steps, id, patch)?)
    }

    pub fn delete_step(&self, id: &StepId) -> DomainResult<Change<Route, RouteEffect>> {
        let steps = delete_step(&self.steps, id)?;
        let mut deleted_step_ids = self.deleted_step_ids.clone();
        if !id.is_provisional() {
            deleted_step_ids.push(id.clone());
        }
        let next = Route {
            steps,
            deleted_step_ids,
            ..self.clone()
        };
        let batch = next.batch()?;
        Ok(Change::new(next, RouteEffect::BatchSave(batch)))
    }

    pub fn transition(
        &self,
        id: &StepId,
        action: StepAction,
        at: DateTime<Utc>,
    ) -> DomainResult<Change<Route, RouteEffect>> {
        let steps = execution::transition(&self.steps, id, action, at)?;
        let status = steps
            .iter()
            .find(|s| &s.id == id)
            .map(|s| s.status)
            .ok_or_else(|| DomainError::step_not_found(id))?;
        let next = Route {
            steps,
            ..self.clone()
        };
        Ok(Change::new(
            next,
            RouteEffect::StatusChange {
                step_id: id.clone(),
                status,
                at,
            },
        ))
    }

    /// Steps in `step_number` order, each with the name of its dependency.
    pub fn chain(&self) -> Vec<(&RouteStep, Option<&str>)> {
        let by_id: HashMap<&StepId, &RouteStep> = self.steps.iter().map(|s| (&s.id, s)).collect();
        self.steps
            .iter()
            .sorted_by_key(|s| s.step_number)
            .map(|s| {
                let dep = s
                    .depends_on_step_id
                    .as_ref()
                    .and_then(|d| by_id.get(d))
                    .map(|d| d.name.as_str());
                (s, dep)
            })
            .collect()
    }
}
