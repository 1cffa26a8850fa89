use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Overrides, ProvisionMode};
use crate::manifest::CorruptPolicy;

#[derive(Parser, Debug)]
#[command(
    name = "vmprov",
    version,
    about = "Record VM specs in a manifest and run a provisioning script for each"
)]
pub struct Cli {
    /// Path to config file (default: ~/.config/vmprov/vmprov.toml, if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Manifest file to read and append to
    #[arg(long, global = true)]
    pub manifest: Option<PathBuf>,

    /// Provisioning script run once per machine
    #[arg(long, global = true)]
    pub script: Option<PathBuf>,

    /// Program used to run the script; pass "" to execute it directly
    #[arg(long, global = true)]
    pub interpreter: Option<String>,

    /// Directory for provisioning.log
    #[arg(long, global = true)]
    pub logs_dir: Option<PathBuf>,

    /// What to do when the manifest is not valid JSON
    #[arg(long, value_enum, global = true)]
    pub on_corrupt: Option<CorruptPolicy>,

    /// Which manifest entries to provision
    #[arg(long, value_enum, global = true)]
    pub mode: Option<ProvisionMode>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ask for new machines, save them, then provision from the manifest (default)
    Run,

    /// Provision from the manifest without asking for new machines
    Replay,

    /// Show the machines recorded in the manifest
    List,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            manifest: self.manifest.clone(),
            script: self.script.clone(),
            interpreter: self.interpreter.clone(),
            logs_dir: self.logs_dir.clone(),
            on_corrupt: self.on_corrupt,
            mode: self.mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["vmprov"]).unwrap();
        assert_eq!(cli.command(), Command::Run);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "vmprov",
            "replay",
            "--manifest",
            "/tmp/m.json",
            "--mode",
            "pending",
            "--on-corrupt",
            "abort",
        ])
        .unwrap();

        assert_eq!(cli.command(), Command::Replay);
        let overrides = cli.overrides();
        assert_eq!(overrides.manifest, Some(PathBuf::from("/tmp/m.json")));
        assert_eq!(overrides.mode, Some(ProvisionMode::Pending));
        assert_eq!(overrides.on_corrupt, Some(CorruptPolicy::Abort));
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(Cli::try_parse_from(["vmprov", "--on-corrupt", "shred"]).is_err());
    }

    #[test]
    fn empty_interpreter_is_accepted() {
        let cli = Cli::try_parse_from(["vmprov", "--interpreter", ""]).unwrap();
        assert_eq!(cli.interpreter.as_deref(), Some(""));
    }
}
