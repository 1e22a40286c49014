use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use bomroute::cli::commands::execute_command;
use bomroute::cli::output;
use bomroute::cli::Cli;

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.debug);

    if let Err(e) = execute_command(&cli) {
        output::error(&e);
        std::process::exit(e.exit_code());
    }
}

/// Stderr subscriber; `-d` raises the level one step per flag.
fn setup_logging(verbosity: u8) {
    let level = [LevelFilter::WARN, LevelFilter::INFO, LevelFilter::DEBUG, LevelFilter::TRACE]
        [usize::from(verbosity.min(3))];
    if verbosity > 3 {
        eprintln!("bomroute: -d given {} times, using trace", verbosity);
    }

    // RUST_LOG narrows further, e.g. RUST_LOG=bomroute::application=debug
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(level).with_filter(env_filter))
        .init();

    tracing::debug!(%level, "logging initialized");
}
