//! Test support: logging setup and fixtures shared by unit and integration tests.

use std::env;
use std::sync::{Mutex, Once};

use tracing::{debug, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::domain::{BomRecord, NodeId, RouteStep, StepId, StepStatus, StepType};
use crate::infrastructure::traits::{Notifier, NotifyKind};

static TEST_SETUP: Once = Once::new();

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "bomroute=debug");
        }
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_test_writer()
            .with_filter(env_filter),
    );

    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

/// Notifier that remembers every message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(NotifyKind, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(NotifyKind, String)> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(kind, _)| *kind == NotifyKind::Error)
            .map(|(_, msg)| msg)
            .collect()
    }

    pub fn successes(&self) -> usize {
        self.messages()
            .iter()
            .filter(|(kind, _)| *kind == NotifyKind::Success)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NotifyKind, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((kind, message.to_string()));
    }
}

/// BOM record with quantity 1 ea and item ref `P-<id>`.
pub fn bom_record(id: &str, parent: Option<&str>) -> BomRecord {
    BomRecord {
        id: NodeId::from(id),
        parent_id: parent.map(NodeId::from),
        item_ref: format!("P-{}", id),
        quantity: 1.0,
        unit_of_measure: "ea".into(),
        reference_designators: None,
        notes: None,
    }
}

/// Pending standard step named `Step <number>`.
pub fn route_step(id: &str, number: u32, depends_on: Option<&str>) -> RouteStep {
    RouteStep {
        id: StepId::from(id),
        step_number: number,
        name: format!("Step {}", number),
        step_type: StepType::Standard,
        work_cell_ref: None,
        setup_time_minutes: 0.0,
        cycle_time_minutes: 0.0,
        depends_on_step_id: depends_on.map(StepId::from),
        can_start_when_dependency: None,
        sampling_mode: None,
        sampling_size: None,
        form_ref: None,
        status: StepStatus::Pending,
        started_at: None,
        completed_at: None,
    }
}

/// Steps `1..=n` with ids "1".."n", each depending on the previous one.
pub fn linear_chain(n: u32) -> Vec<RouteStep> {
    (1..=n)
        .map(|i| {
            let dep = (i > 1).then(|| (i - 1).to_string());
            route_step(&i.to_string(), i, dep.as_deref())
        })
        .collect()
}
