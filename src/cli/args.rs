//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::domain::{DependencyGate, SamplingMode, StepAction, StepType};

/// Edit bills of materials and manufacturing routes without breaking their structure
#[derive(Parser, Debug)]
#[command(name = "bomroute")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-d info, -dd debug, -ddd trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub debug: u8,

    /// Store file (overrides store_path from config)
    #[arg(long, global = true, env = "BOMROUTE_STORE", value_hint = ValueHint::FilePath)]
    pub store: Option<PathBuf>,

    /// Project directory holding .bomroute.toml (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Edit the bill of materials
    Bom {
        #[command(subcommand)]
        command: BomCommands,
    },

    /// Edit and execute manufacturing routes
    Route {
        #[command(subcommand)]
        command: RouteCommands,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum BomCommands {
    /// Show the BOM as a tree
    Tree,

    /// List items flat, parents before children
    List,

    /// Show extended quantities per level
    Explode,

    /// Add an item
    Add {
        /// Item reference (part number)
        item_ref: String,
        /// Quantity per parent
        quantity: f64,
        /// Parent item id (default: top level)
        #[arg(short, long)]
        parent: Option<String>,
        /// Unit of measure (default from config)
        #[arg(short, long)]
        uom: Option<String>,
        /// Reference designators, e.g. "R1,R2"
        #[arg(long)]
        designators: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Move an item under another one
    Move {
        /// Item to move
        item: String,
        /// New parent (omit for top level)
        #[arg(short, long)]
        to: Option<String>,
    },

    /// Change fields of an item
    Update {
        item: String,
        #[arg(short, long)]
        quantity: Option<f64>,
        #[arg(short, long)]
        uom: Option<String>,
        /// New designators; empty string clears them
        #[arg(long)]
        designators: Option<String>,
        /// New notes; empty string clears them
        #[arg(long)]
        notes: Option<String>,
    },

    /// Delete an item and everything below it
    Remove {
        item: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Route and step selection shared by the execution commands.
#[derive(Args, Debug)]
pub struct StepRef {
    /// Route id
    pub route: String,
    /// Step id
    pub step: String,
}

#[derive(Subcommand, Debug)]
pub enum RouteCommands {
    /// List routes
    List,

    /// Show the step chain of a route
    Show { route: String },

    /// Create an empty route
    Init {
        route: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "A")]
        revision: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Append a step
    Add {
        route: String,
        /// Step name
        name: String,
        #[arg(long = "type", value_enum, default_value_t = StepTypeArg::Standard)]
        step_type: StepTypeArg,
        #[arg(long)]
        work_cell: Option<String>,
        /// Setup minutes
        #[arg(long, default_value_t = 0.0)]
        setup: f64,
        /// Cycle minutes per unit
        #[arg(long, default_value_t = 0.0)]
        cycle: f64,
        /// When the step may start (default from config)
        #[arg(long, value_enum)]
        gate: Option<GateArg>,
        #[arg(long, value_enum)]
        sampling_mode: Option<SamplingArg>,
        #[arg(long)]
        sampling_size: Option<u32>,
        /// Inspection form reference
        #[arg(long)]
        form: Option<String>,
    },

    /// Change fields of a step
    Update {
        route: String,
        step: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "type", value_enum)]
        step_type: Option<StepTypeArg>,
        #[arg(long)]
        work_cell: Option<String>,
        #[arg(long)]
        setup: Option<f64>,
        #[arg(long)]
        cycle: Option<f64>,
        #[arg(long, value_enum)]
        gate: Option<GateArg>,
        #[arg(long, value_enum)]
        sampling_mode: Option<SamplingArg>,
        #[arg(long)]
        sampling_size: Option<u32>,
        #[arg(long)]
        form: Option<String>,
    },

    /// Move a step to another position and relink the chain
    Reorder {
        route: String,
        step: String,
        /// Target position, 1-based
        position: usize,
    },

    /// Delete a step and relink its dependents
    Delete { route: String, step: String },

    /// Check the chain without saving
    Validate { route: String },

    /// Save the chain as is
    Save { route: String },

    /// Put a pending step in the queue
    Queue(StepRef),

    /// Start work on a step
    Start(StepRef),

    /// Put a running step on hold
    Pause(StepRef),

    /// Continue a step on hold
    Resume(StepRef),

    /// Complete a running step
    Finish(StepRef),

    /// Skip a step
    Skip(StepRef),

    /// Total minutes for a lot
    LeadTime {
        route: String,
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },

    /// Print a route as TOML
    Export { route: String },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Create config template
    Init {
        /// Create global config
        #[arg(short, long)]
        global: bool,
    },

    /// Show config paths
    Path,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepTypeArg {
    Standard,
    QualityCheck,
    Rework,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateArg {
    Completed,
    InProgress,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingArg {
    All,
    Sample,
    FirstArticle,
}

impl From<StepTypeArg> for StepType {
    fn from(arg: StepTypeArg) -> Self {
        match arg {
            StepTypeArg::Standard => StepType::Standard,
            StepTypeArg::QualityCheck => StepType::QualityCheck,
            StepTypeArg::Rework => StepType::Rework,
        }
    }
}

impl From<GateArg> for DependencyGate {
    fn from(arg: GateArg) -> Self {
        match arg {
            GateArg::Completed => DependencyGate::Completed,
            GateArg::InProgress => DependencyGate::InProgress,
        }
    }
}

impl From<SamplingArg> for SamplingMode {
    fn from(arg: SamplingArg) -> Self {
        match arg {
            SamplingArg::All => SamplingMode::All,
            SamplingArg::Sample => SamplingMode::Sample,
            SamplingArg::FirstArticle => SamplingMode::FirstArticle,
        }
    }
}

impl RouteCommands {
    /// Execution action and target step, for the state machine commands.
    pub fn step_action(&self) -> Option<(StepAction, &StepRef)> {
        match self {
            RouteCommands::Queue(r) => Some((StepAction::Enqueue, r)),
            RouteCommands::Start(r) => Some((StepAction::Start, r)),
            RouteCommands::Pause(r) => Some((StepAction::Pause, r)),
            RouteCommands::Resume(r) => Some((StepAction::Resume, r)),
            RouteCommands::Finish(r) => Some((StepAction::Finish, r)),
            RouteCommands::Skip(r) => Some((StepAction::Skip, r)),
            _ => None,
        }
    }
}
