//! Session controller: collect → persist → replay.
//!
//! Holds no state of its own beyond the resolved [`Settings`]; the manifest
//! on disk is the only thing that survives between runs.

use console::style;

use crate::config::{ProvisionMode, Settings};
use crate::error::ProvisionError;
use crate::invoker::{InvocationStatus, Provisioner};
use crate::manifest::{self, AppendOutcome, MachineRecord};
use crate::progress::{OutputMode, StepProgress};
use crate::prompt::Prompter;
use crate::util;
use crate::validate::{RawSpec, validate_spec};

const SEPARATOR: &str = "--------------------------------------------------";

/// What happened during the replay half of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    /// Every attempted machine, in manifest order, with how it ended.
    pub results: Vec<(String, InvocationStatus)>,
    /// Entries passed over because they were already provisioned.
    pub skipped: usize,
    /// Entries newly stamped with `provisioned_at`.
    pub stamped: usize,
}

impl ReplaySummary {
    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|(_, status)| !status.is_success())
            .map(|(name, _)| name.as_str())
    }
}

/// Outcome of a full interactive session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    pub recorded: Vec<MachineRecord>,
    pub replay: ReplaySummary,
}

pub struct Session<'a> {
    settings: &'a Settings,
    provisioner: &'a dyn Provisioner,
    output: OutputMode,
}

impl<'a> Session<'a> {
    pub fn new(settings: &'a Settings, provisioner: &'a dyn Provisioner, output: OutputMode) -> Self {
        Self {
            settings,
            provisioner,
            output,
        }
    }

    /// Collect machines from the operator, save them, then provision from
    /// the manifest.
    ///
    /// A failed save is logged and replay still runs against whatever the
    /// manifest holds.
    pub fn run(&self, prompter: &mut dyn Prompter) -> Result<SessionReport, ProvisionError> {
        let recorded = collect_machines(prompter)?;

        match manifest::append(&self.settings.manifest_path, &recorded, self.settings.on_corrupt) {
            Ok(AppendOutcome::Skipped) => tracing::debug!("no new machines to save"),
            Ok(outcome) => tracing::debug!(?outcome, "saved machines"),
            Err(e) => tracing::error!("failed to save machines: {e}"),
        }

        let replay = match self.replay() {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!("skipping provisioning: {e}");
                ReplaySummary::default()
            }
        };

        Ok(SessionReport { recorded, replay })
    }

    /// Provision manifest entries, honoring the configured mode.
    pub fn replay(&self) -> Result<ReplaySummary, ProvisionError> {
        let path = &self.settings.manifest_path;
        let entries = manifest::configure_vms_from_file(path)?;
        let mut progress = StepProgress::new(entries.len(), self.output);
        let mut summary = ReplaySummary::default();

        for entry in entries {
            if self.settings.mode == ProvisionMode::Pending && entry.is_provisioned() {
                tracing::debug!(vm = %entry.name, "already provisioned, skipping");
                progress.skip(&format!("{} already provisioned", entry.name));
                summary.skipped += 1;
                continue;
            }

            let status = progress.run(&format!("Provisioning {}", entry.name), |step| {
                let result = self.provisioner.invoke(&entry.name);
                if result.status.is_success() {
                    step.set_done_label(format!("Provisioned {}", entry.name));
                } else {
                    step.fail(format!("{}: {}", entry.name, result.status));
                }
                result.status
            });
            summary.results.push((entry.name, status));
        }

        if self.settings.mode == ProvisionMode::Pending {
            let succeeded: Vec<String> = summary
                .results
                .iter()
                .filter(|(_, status)| status.is_success())
                .map(|(name, _)| name.clone())
                .collect();
            match manifest::mark_provisioned(path, &succeeded, &util::utc_timestamp()) {
                Ok(stamped) => summary.stamped = stamped,
                Err(e) => tracing::error!("failed to record provisioned machines: {e}"),
            }
        }

        Ok(summary)
    }
}

/// Ask for machines until the operator declines or input ends.
pub fn collect_machines(prompter: &mut dyn Prompter) -> Result<Vec<MachineRecord>, ProvisionError> {
    let mut records = Vec::new();
    let mut question = "Would you like to create a new virtual machine?";

    while prompter.confirm(question)? == Some(true) {
        question = "Would you like to create another virtual machine?";

        let Some(spec) = read_spec(prompter)? else {
            break;
        };
        prompter.say(SEPARATOR);

        match validate_spec(&spec) {
            Ok(record) => {
                tracing::info!(
                    vm = %record.name,
                    cpu = record.cpu,
                    memory = record.memory,
                    disk = record.disk,
                    "virtual machine created"
                );
                records.push(record);
            }
            Err(errors) => {
                for error in &errors {
                    tracing::warn!(
                        field = error.field,
                        "validation error for field '{}': {}",
                        error.field,
                        error.message
                    );
                    prompter.say(&format!("  {}", style(error).red()));
                }
            }
        }
    }

    Ok(records)
}

/// `None` if input ends partway through a machine.
fn read_spec(prompter: &mut dyn Prompter) -> Result<Option<RawSpec>, ProvisionError> {
    let Some(name) = prompter.text("Enter the nickname of the VM:")? else {
        return Ok(None);
    };
    let Some(cpu) = prompter.text("Enter the number of CPUs:")? else {
        return Ok(None);
    };
    let Some(memory) = prompter.text("Enter the amount of memory:")? else {
        return Ok(None);
    };
    let Some(disk) = prompter.text("Enter the size of the disk:")? else {
        return Ok(None);
    };
    Ok(Some(RawSpec {
        name,
        cpu,
        memory,
        disk,
    }))
}
