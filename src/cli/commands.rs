//! Command dispatch

use std::io::{self, BufRead};
use std::path::PathBuf;

use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::application::services::{BomEditor, RouteEditor};
use crate::application::ApplicationError;
use crate::cli::args::{BomCommands, Cli, Commands, ConfigCommands, RouteCommands};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{self, Settings};
use crate::domain::bom;
use crate::domain::{
    BomItem, BomItemPatch, NewStep, NodeId, RouteId, RouteMeta, StepId, StepPatch, TreeNodeConvert,
};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Ok(());
    };
    match command {
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Config { command } => config_command(cli, command),
        Commands::Bom { command } => bom_command(&container(cli)?, command),
        Commands::Route { command } => route_command(&container(cli)?, command),
    }
}

fn project_dir(cli: &Cli) -> CliResult<PathBuf> {
    match &cli.project_dir {
        Some(dir) => Ok(dir.clone()),
        None => std::env::current_dir().map_err(|e| InfraError::io("resolving current directory", e).into()),
    }
}

fn container(cli: &Cli) -> CliResult<ServiceContainer> {
    let dir = project_dir(cli)?;
    let mut settings = Settings::load(Some(&dir))?;
    if let Some(store) = &cli.store {
        settings.store_path = config::expand_path(store);
    }
    debug!("store: {}", settings.store_path.display());
    Ok(ServiceContainer::new(settings))
}

fn optional_text(value: &Option<String>) -> Option<Option<String>> {
    value
        .as_ref()
        .map(|v| if v.trim().is_empty() { None } else { Some(v.clone()) })
}

#[instrument(skip(container))]
fn bom_command(container: &ServiceContainer, command: &BomCommands) -> CliResult<()> {
    let mut editor = container.bom_editor()?;
    if !editor.load_report().is_clean() {
        let report = editor.load_report();
        output::warning(&format!(
            "BOM repaired on load: {} orphan(s), {} cycle break(s), {} duplicate(s)",
            report.orphans.len(),
            report.cycle_breaks.len(),
            report.duplicates.len()
        ));
    }

    match command {
        BomCommands::Tree => {
            output::info(&editor.tree().to_tree_string());
        }
        BomCommands::List => {
            for record in editor.flatten() {
                let parent = record
                    .parent_id
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".into());
                output::info(&format!(
                    "{}\t{}\t{}\t{} {}",
                    record.id, parent, record.item_ref, record.quantity, record.unit_of_measure
                ));
            }
        }
        BomCommands::Explode => {
            for line in bom::explode(editor.tree()) {
                output::exploded_line(&line);
            }
        }
        BomCommands::Add {
            item_ref,
            quantity,
            parent,
            uom,
            designators,
            notes,
        } => {
            let item = BomItem {
                item_ref: item_ref.clone(),
                quantity: *quantity,
                unit_of_measure: uom
                    .clone()
                    .unwrap_or_else(|| container.settings.default_uom.clone()),
                reference_designators: designators.clone(),
                notes: notes.clone(),
            };
            let parent = parent.as_deref().map(NodeId::from);
            let id = editor.add_item(parent.as_ref(), item)?;
            output::action("Added", &format!("{} as item {}", item_ref, id));
        }
        BomCommands::Move { item, to } => {
            let target = to.as_deref().map(NodeId::from);
            if !editor.move_item(&NodeId::from(item.as_str()), target.as_ref())? {
                output::info("Nothing to do");
            }
        }
        BomCommands::Update {
            item,
            quantity,
            uom,
            designators,
            notes,
        } => {
            let patch = BomItemPatch {
                quantity: *quantity,
                unit_of_measure: uom.clone(),
                reference_designators: optional_text(designators),
                notes: optional_text(notes),
            };
            if !editor.update_item(&NodeId::from(item.as_str()), patch)? {
                output::info("Nothing to do");
            }
        }
        BomCommands::Remove { item, yes } => remove_item(&mut editor, item, *yes)?,
    }
    Ok(())
}

fn remove_item(editor: &mut BomEditor, item: &str, yes: bool) -> CliResult<()> {
    let id = NodeId::from(item);
    // dry run on the current snapshot to show the cascade
    let preview = bom::remove_item(editor.tree(), &id)?;
    let doomed = preview
        .effect
        .as_ref()
        .map(|e| e.removed_ids().to_vec())
        .unwrap_or_default();

    if !yes {
        output::header(&format!("Deleting {} removes {} item(s):", id, doomed.len()));
        for removed in &doomed {
            if let Some(node) = editor.tree().get(removed) {
                output::detail(&format!("[{}] {}", removed, node.data.item_ref));
            }
        }
        output::prompt("Proceed? [y/N]");
        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .map_err(|e| InfraError::io("reading confirmation", e))?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            output::info("Aborted");
            return Ok(());
        }
    }

    let removed = editor.remove_item(&id)?;
    output::action("Removed", &format!("{} item(s)", removed.len()));
    Ok(())
}

#[instrument(skip(container))]
fn route_command(container: &ServiceContainer, command: &RouteCommands) -> CliResult<()> {
    match command {
        RouteCommands::List => {
            let routes = container
                .route_store
                .list_routes()
                .map_err(ApplicationError::from)?;
            if routes.is_empty() {
                output::info("No routes");
            }
            for route in routes {
                output::info(&format!(
                    "{}\t{} rev {}\t{} step(s)",
                    route.id,
                    route.name,
                    route.revision,
                    route.steps.len()
                ));
            }
        }
        RouteCommands::Show { route } => {
            let editor = container.route_editor(&RouteId::from(route.as_str()))?;
            show_route(&editor);
        }
        RouteCommands::Init {
            route,
            name,
            revision,
            description,
        } => {
            let meta = RouteMeta {
                name: name.clone(),
                revision: revision.clone(),
                description: description.clone(),
            };
            container.create_route(RouteId::from(route.as_str()), meta)?;
            output::action("Created", &format!("route {}", route));
        }
        RouteCommands::Add {
            route,
            name,
            step_type,
            work_cell,
            setup,
            cycle,
            gate,
            sampling_mode,
            sampling_size,
            form,
        } => {
            let mut editor = container.route_editor(&RouteId::from(route.as_str()))?;
            let draft = NewStep {
                name: name.clone(),
                step_type: (*step_type).into(),
                work_cell_ref: work_cell.clone(),
                setup_time_minutes: *setup,
                cycle_time_minutes: *cycle,
                can_start_when_dependency: Some(
                    gate.map(Into::into)
                        .unwrap_or(container.settings.default_gate),
                ),
                sampling_mode: sampling_mode.map(Into::into),
                sampling_size: *sampling_size,
                form_ref: form.clone(),
            };
            let id = editor.add_step(draft)?;
            output::action("Added", &format!("step {} ({})", id, name));
        }
        RouteCommands::Update {
            route,
            step,
            name,
            step_type,
            work_cell,
            setup,
            cycle,
            gate,
            sampling_mode,
            sampling_size,
            form,
        } => {
            let mut editor = container.route_editor(&RouteId::from(route.as_str()))?;
            let patch = StepPatch {
                name: name.clone(),
                step_type: step_type.map(Into::into),
                work_cell_ref: optional_text(work_cell),
                setup_time_minutes: *setup,
                cycle_time_minutes: *cycle,
                can_start_when_dependency: gate.map(Into::into),
                sampling_mode: sampling_mode.map(|m| Some(m.into())),
                sampling_size: sampling_size.map(Some),
                form_ref: optional_text(form),
            };
            editor.update_step(&StepId::from(step.as_str()), patch)?;
        }
        RouteCommands::Reorder {
            route,
            step,
            position,
        } => {
            if *position == 0 {
                return Err(CliError::InvalidArgs("position is 1-based".into()));
            }
            let mut editor = container.route_editor(&RouteId::from(route.as_str()))?;
            editor.reorder(&StepId::from(step.as_str()), position - 1)?;
            show_route(&editor);
        }
        RouteCommands::Delete { route, step } => {
            let mut editor = container.route_editor(&RouteId::from(route.as_str()))?;
            editor.delete_step(&StepId::from(step.as_str()))?;
            show_route(&editor);
        }
        RouteCommands::Validate { route } => {
            let editor = container.route_editor(&RouteId::from(route.as_str()))?;
            editor.validate()?;
            output::success(&format!("route {} is consistent", route));
        }
        RouteCommands::Save { route } => {
            let mut editor = container.route_editor(&RouteId::from(route.as_str()))?;
            editor.save()?;
        }
        RouteCommands::LeadTime { route, quantity } => {
            let editor = container.route_editor(&RouteId::from(route.as_str()))?;
            output::info(&format!(
                "{:.1} min for {} unit(s)",
                editor.lead_time(*quantity),
                quantity
            ));
        }
        RouteCommands::Export { route } => {
            let editor = container.route_editor(&RouteId::from(route.as_str()))?;
            let text = toml::to_string_pretty(&editor.export()).map_err(|e| InfraError::Format {
                path: PathBuf::from(route),
                message: e.to_string(),
            })?;
            output::info(&text);
        }
        RouteCommands::Queue(_)
        | RouteCommands::Start(_)
        | RouteCommands::Pause(_)
        | RouteCommands::Resume(_)
        | RouteCommands::Finish(_)
        | RouteCommands::Skip(_) => {
            if let Some((action, step)) = command.step_action() {
                let mut editor = container.route_editor(&RouteId::from(step.route.as_str()))?;
                editor.transition(&StepId::from(step.step.as_str()), action)?;
            }
        }
    }
    Ok(())
}

fn show_route(editor: &RouteEditor) {
    let route = editor.route();
    output::header(&format!(
        "{} ({} rev {})",
        route.id, route.meta.name, route.meta.revision
    ));
    if route.steps.is_empty() {
        output::detail("no steps");
    }
    for (step, dependency) in route.chain() {
        output::step_line(step, dependency);
    }
}

fn config_command(cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    let dir = project_dir(cli)?;
    match command {
        ConfigCommands::Show => {
            let settings = Settings::load(Some(&dir))?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Init { global } => {
            let path = if *global {
                config::global_config_path()
                    .ok_or_else(|| CliError::Usage("cannot determine config directory".into()))?
            } else {
                config::local_config_path(&dir)
            };
            if path.exists() {
                return Err(CliError::Usage(format!("{} already exists", path.display())));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| InfraError::io(format!("creating {}", parent.display()), e))?;
            }
            std::fs::write(&path, Settings::template())
                .map_err(|e| InfraError::io(format!("writing {}", path.display()), e))?;
            output::action("Created", &path.display());
        }
        ConfigCommands::Path => {
            let mark = |p: &std::path::Path| if p.exists() { "" } else { " (missing)" };
            match config::global_config_path() {
                Some(p) => output::info(&format!("global: {}{}", p.display(), mark(&p))),
                None => output::info("global: <unavailable>"),
            }
            let local = config::local_config_path(&dir);
            output::info(&format!("local:  {}{}", local.display(), mark(&local)));
        }
    }
    Ok(())
}
