use std::io::IsTerminal;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use vmprov::cli::{Cli, Command};
use vmprov::config::{self, Settings};
use vmprov::invoker::ScriptProvisioner;
use vmprov::logging::{DeferredLogFile, LogFileHandle};
use vmprov::manifest;
use vmprov::progress::OutputMode;
use vmprov::prompt::{InquirePrompter, LinePrompter, Prompter};
use vmprov::session::{ReplaySummary, Session};

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let terminal_filter = if cli.verbose {
        EnvFilter::new("vmprov=debug")
    } else {
        EnvFilter::from_default_env()
            .add_directive("vmprov=info".parse().expect("valid log directive"))
    };

    let terminal_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(terminal_filter);

    // File layer: always captures vmprov=debug, discards until the logs dir is known
    let (file_writer, file_handle) = DeferredLogFile::new();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_filter(EnvFilter::new("vmprov=debug"));

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(file_layer)
        .init();

    let command = cli.command();
    let settings = config::resolve_settings(cli.config.as_deref(), cli.overrides())?;

    if command == Command::List {
        return list(&settings);
    }

    start_file_logging(&file_handle, &settings);

    let output = if std::io::stdout().is_terminal() {
        OutputMode::Normal
    } else {
        OutputMode::Plain
    };
    let provisioner =
        ScriptProvisioner::new(settings.script_path.clone(), settings.interpreter.clone());
    let session = Session::new(&settings, &provisioner, output);

    let summary = if command == Command::Replay {
        session.replay()?
    } else {
        let mut prompter: Box<dyn Prompter> = if std::io::stdin().is_terminal() {
            Box::new(InquirePrompter)
        } else {
            Box::new(LinePrompter::new(std::io::stdin().lock(), std::io::stdout()))
        };
        session.run(prompter.as_mut())?.replay
    };

    print_summary(&summary);
    Ok(())
}

fn start_file_logging(handle: &LogFileHandle, settings: &Settings) {
    match handle.open(&settings.logs_dir) {
        Ok(path) => tracing::debug!(path = %path.display(), "logging to file"),
        Err(e) => tracing::warn!(
            dir = %settings.logs_dir.display(),
            "cannot open log file, logging to console only: {e}"
        ),
    }
}

fn list(settings: &Settings) -> miette::Result<()> {
    let manifest = manifest::load(&settings.manifest_path)?;

    if manifest.vms.is_empty() {
        println!(
            "No machines recorded in {}.",
            settings.manifest_path.display()
        );
        return Ok(());
    }

    for vm in &manifest.vms {
        let state = vm.provisioned_at.as_deref().unwrap_or("pending");
        println!(
            "{}\tcpu={} memory={} disk={}\t{state}",
            vm.name, vm.cpu, vm.memory, vm.disk
        );
    }
    Ok(())
}

fn print_summary(summary: &ReplaySummary) {
    let attempted = summary.results.len();
    let failed: Vec<&str> = summary.failed().collect();

    if attempted == 0 && summary.skipped == 0 {
        println!("No machines to provision.");
        return;
    }

    println!(
        "Provisioned {} of {attempted} machine(s).",
        attempted - failed.len()
    );
    if summary.skipped > 0 {
        println!("Skipped {} already provisioned.", summary.skipped);
    }
    if !failed.is_empty() {
        eprintln!("Failed: {}", failed.join(", "));
    }
}
