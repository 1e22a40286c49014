//! Domain entities: identifiers, change envelopes and the external payload shapes

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

const PROVISIONAL_PREFIX: &str = "new-";

/// Normalized identifier for BOM items, route steps and routes.
///
/// The external store may hand out numeric or textual ids; both are kept as
/// their string form so that trees and chains compare ids uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Id(String);

pub type NodeId = Id;
pub type StepId = Id;
pub type RouteId = Id;

impl Id {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Client-side id for an entity that the store has not assigned an id to yet.
    pub fn provisional() -> Self {
        Self(format!("{}{}", PROVISIONAL_PREFIX, uuid::Uuid::new_v4()))
    }

    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Str(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(n) => Id(n.to_string()),
            RawId::Str(s) => Id(s),
        })
    }
}

/// Result of a pure mutation: the new snapshot plus the side effect the
/// persistence layer has to perform. `effect == None` means nothing changed
/// that the store needs to hear about.
#[derive(Debug, Clone)]
pub struct Change<S, E> {
    pub state: S,
    pub effect: Option<E>,
}

impl<S, E> Change<S, E> {
    pub fn new(state: S, effect: E) -> Self {
        Self {
            state,
            effect: Some(effect),
        }
    }

    pub fn unchanged(state: S) -> Self {
        Self {
            state,
            effect: None,
        }
    }
}

/// Payload for `addBomItem` / `updateBomItem`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BomItemPayload {
    pub item_ref: String,
    pub quantity: f64,
    pub unit_of_measure: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_designators: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Route header carried with every batch save.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMeta {
    pub name: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One step as sent to `batchSaveRoute`.
///
/// New steps carry their provisional id with `is_new = true`; the store
/// assigns the real id and rewrites dependencies that point at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPayload {
    pub id: Option<StepId>,
    pub step_number: u32,
    pub name: String,
    pub step_type: crate::domain::route::StepType,
    pub work_cell_id: Option<String>,
    pub setup_time_minutes: f64,
    pub cycle_time_minutes: f64,
    pub depends_on_step_id: Option<StepId>,
    pub can_start_when_dependency: crate::domain::route::DependencyGate,
    pub quality_check_mode: Option<crate::domain::route::SamplingMode>,
    pub sampling_size: Option<u32>,
    pub form_id: Option<String>,
    pub is_new: bool,
}

/// Body of `batchSaveRoute(routeId, batch)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteBatch {
    pub route_meta: RouteMeta,
    pub deleted_step_ids: Vec<StepId>,
    pub steps: Vec<StepPayload>,
}
