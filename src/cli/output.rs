//! Terminal output for BOM trees, step chains and command feedback
//!
//! Colors are dropped automatically when NO_COLOR is set or stdout is not a tty.

use std::fmt::Display;

use colored::{ColoredString, Colorize};

use crate::domain::{ExplodedLine, RouteStep, StepStatus};

/// `error:` prefix in red, to stderr
pub fn error(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

/// `Warning:` prefix in yellow, to stderr
pub fn warning(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "Warning".yellow(), msg);
}

pub fn success(msg: &(impl Display + ?Sized)) {
    println!("{} {}", "✓".green(), msg);
}

/// Completed action with a green label, e.g. `Added: step 7`
pub fn action(label: &str, msg: &(impl Display + ?Sized)) {
    println!("{}: {}", label.green(), msg);
}

pub fn header(msg: &(impl Display + ?Sized)) {
    println!("{}", msg.to_string().cyan().bold());
}

pub fn detail(msg: &(impl Display + ?Sized)) {
    println!("  {}", msg);
}

/// Plain data output, no color
pub fn info(msg: &(impl Display + ?Sized)) {
    println!("{}", msg);
}

/// Question on stdout without a newline
pub fn prompt(msg: &(impl Display + ?Sized)) {
    use std::io::Write;
    print!("{} ", msg.to_string().cyan());
    std::io::stdout().flush().ok();
}

/// Step status colored by phase.
pub fn status(status: StepStatus) -> ColoredString {
    let s = status.to_string();
    match status {
        StepStatus::Pending => s.normal(),
        StepStatus::Queued => s.blue(),
        StepStatus::InProgress => s.yellow().bold(),
        StepStatus::OnHold => s.magenta(),
        StepStatus::Completed => s.green(),
        StepStatus::Skipped => s.dimmed(),
    }
}

/// One line of a route chain: number, id, name, type, dependency, status.
pub fn step_line(step: &RouteStep, dependency: Option<&str>) {
    let after = match dependency {
        Some(dep) => format!("after {} ({})", dep.bold(), step.gate()),
        None => "first".dimmed().to_string(),
    };
    detail(&format!(
        "{:>3}. [{}] {} <{}> {} {}",
        step.step_number,
        step.id,
        step.name,
        step.step_type,
        after,
        status(step.status)
    ));
}

/// One indented line of an exploded BOM.
pub fn exploded_line(line: &ExplodedLine) {
    info(&format!(
        "{}{} [{}] x{} = {} {}",
        "  ".repeat(line.level),
        line.item_ref,
        line.id.to_string().dimmed(),
        line.quantity,
        line.extended_quantity,
        line.unit_of_measure
    ));
}
