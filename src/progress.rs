use std::cell::RefCell;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Controls how step output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Spinner while a step runs, checkmark or cross when it ends.
    Normal,
    /// No ANSI, plain println output for piped/non-TTY stdout.
    Plain,
}

/// Numbered steps (`[2/5] Provisioning web-1`), one per machine.
pub struct StepProgress {
    total_steps: usize,
    current_step: usize,
    mode: OutputMode,
}

/// Handle passed into the step closure to adjust how the step finishes.
pub struct Step {
    state: RefCell<StepState>,
}

#[derive(Default)]
struct StepState {
    done_label: Option<String>,
    failed: bool,
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn done_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] \u{2713} {msg:.green}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn failed_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] \u{2717} {msg:.red}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl StepProgress {
    pub fn new(total_steps: usize, mode: OutputMode) -> Self {
        Self {
            total_steps,
            current_step: 0,
            mode,
        }
    }

    fn next_prefix(&mut self) -> String {
        self.current_step += 1;
        format!("{}/{}", self.current_step, self.total_steps)
    }

    /// Run `f` as the next numbered step.
    pub fn run<F, T>(&mut self, label: &str, f: F) -> T
    where
        F: FnOnce(&Step) -> T,
    {
        let prefix = self.next_prefix();

        let bar = match self.mode {
            OutputMode::Plain => {
                println!("[{prefix}] {label}");
                None
            }
            OutputMode::Normal => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(spinner_style());
                bar.set_prefix(prefix.clone());
                bar.set_message(label.to_string());
                bar.enable_steady_tick(Duration::from_millis(80));
                Some(bar)
            }
        };

        let step = Step {
            state: RefCell::new(StepState::default()),
        };
        let result = f(&step);

        let state = step.state.into_inner();
        let done_label = state.done_label.unwrap_or_else(|| label.to_string());
        let mark = if state.failed { '\u{2717}' } else { '\u{2713}' };

        match bar {
            None => println!("[{prefix}] {mark} {done_label}"),
            Some(bar) => {
                bar.set_style(if state.failed { failed_style() } else { done_style() });
                bar.finish_with_message(done_label);
            }
        }

        result
    }

    /// Instant completion for an already provisioned machine.
    pub fn skip(&mut self, label: &str) {
        let prefix = self.next_prefix();

        if self.mode == OutputMode::Plain {
            println!("[{prefix}] - {label}");
            return;
        }

        let bar = ProgressBar::new_spinner();
        bar.set_style(done_style());
        bar.set_prefix(prefix);
        bar.finish_with_message(label.to_string());
    }
}

impl Step {
    /// Override the label shown when the step ends.
    pub fn set_done_label(&self, label: impl Into<String>) {
        self.state.borrow_mut().done_label = Some(label.into());
    }

    /// End the step with a cross instead of a checkmark.
    pub fn fail(&self, label: impl Into<String>) {
        let mut state = self.state.borrow_mut();
        state.failed = true;
        state.done_label = Some(label.into());
    }
}
