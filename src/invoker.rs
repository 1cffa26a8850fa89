use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::util::flatten_lines;

/// How a single provisioning run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationStatus {
    /// The script exited with status 0.
    Succeeded,
    /// The script ran but exited non-zero (`code` is `None` if killed by a signal).
    Failed { code: Option<i32> },
    /// The process could not be started at all.
    LaunchFailed { message: String },
}

impl InvocationStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationStatus::Succeeded)
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationStatus::Succeeded => write!(f, "ok"),
            InvocationStatus::Failed { code: Some(code) } => write!(f, "exited with {code}"),
            InvocationStatus::Failed { code: None } => write!(f, "terminated by signal"),
            InvocationStatus::LaunchFailed { message } => write!(f, "failed to launch: {message}"),
        }
    }
}

/// Captured output of one provisioning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub status: InvocationStatus,
}

/// Provisions one machine by name. Implementations never fail outright;
/// problems are reported through [`ExecutionResult::status`].
pub trait Provisioner {
    fn invoke(&self, machine_name: &str) -> ExecutionResult;
}

/// Runs an external script as `[interpreter] <script> <machine_name>`.
#[derive(Debug, Clone)]
pub struct ScriptProvisioner {
    pub script: PathBuf,
    pub interpreter: Option<String>,
}

impl ScriptProvisioner {
    pub fn new(script: PathBuf, interpreter: Option<String>) -> Self {
        Self { script, interpreter }
    }

    fn command(&self, machine_name: &str) -> Command {
        let mut cmd = match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&self.script);
                cmd
            }
            None => Command::new(&self.script),
        };
        cmd.arg(machine_name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn script_name(&self) -> String {
        self.script
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.script.display().to_string())
    }
}

impl Provisioner for ScriptProvisioner {
    fn invoke(&self, machine_name: &str) -> ExecutionResult {
        let script = self.script_name();
        tracing::info!(vm = machine_name, script = %self.script.display(), "running provisioning script");

        let output = match self.command(machine_name).output() {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(vm = machine_name, "something went wrong while running {script}: {e}");
                return ExecutionResult {
                    stdout: String::new(),
                    stderr: String::new(),
                    status: InvocationStatus::LaunchFailed {
                        message: e.to_string(),
                    },
                };
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !stdout.trim().is_empty() {
            tracing::info!(vm = machine_name, "{script} output: {}", flatten_lines(&stdout));
        }
        if !stderr.trim().is_empty() {
            tracing::warn!(vm = machine_name, "{script} errors: {}", stderr.trim());
        }

        let status = if output.status.success() {
            InvocationStatus::Succeeded
        } else {
            let status = InvocationStatus::Failed {
                code: output.status.code(),
            };
            tracing::warn!(vm = machine_name, "{script} {status}");
            status
        };

        ExecutionResult {
            stdout,
            stderr,
            status,
        }
    }
}
