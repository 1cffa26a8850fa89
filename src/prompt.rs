//! Operator input sources.
//!
//! `None` from either method means the operator is done (end of input, or
//! Ctrl+C / Esc on a terminal); the session stops collecting and moves on.

use std::io::{BufRead, Write};

use inquire::{Confirm, Text};

use crate::error::ProvisionError;

pub trait Prompter {
    /// Ask a yes/no question.
    fn confirm(&mut self, question: &str) -> Result<Option<bool>, ProvisionError>;

    /// Ask for a free-form answer.
    fn text(&mut self, label: &str) -> Result<Option<String>, ProvisionError>;

    /// Show a line to the operator.
    fn say(&mut self, line: &str);
}

// ── interactive terminal ─────────────────────────────────

/// Terminal prompts via `inquire`.
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn confirm(&mut self, question: &str) -> Result<Option<bool>, ProvisionError> {
        answered(Confirm::new(question).with_default(false).prompt())
    }

    fn text(&mut self, label: &str) -> Result<Option<String>, ProvisionError> {
        answered(Text::new(label).prompt())
    }

    fn say(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Cancellation becomes `Ok(None)`; anything else is a prompt error.
fn answered<T>(result: Result<T, inquire::InquireError>) -> Result<Option<T>, ProvisionError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(
            inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted,
        ) => Ok(None),
        Err(other) => Err(ProvisionError::Prompt {
            message: other.to_string(),
        }),
    }
}

// ── line-oriented (pipes, tests) ─────────────────────────

/// Plain `label: answer` prompts over any reader/writer pair.
pub struct LinePrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Give back the writer, e.g. to inspect what was shown.
    pub fn into_output(self) -> W {
        self.output
    }

    fn read_answer(&mut self, prompt: &str) -> Result<Option<String>, ProvisionError> {
        write!(self.output, "{prompt}")
            .and_then(|_| self.output.flush())
            .map_err(prompt_io)?;

        let mut line = String::new();
        let read = self.input.read_line(&mut line).map_err(prompt_io)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn confirm(&mut self, question: &str) -> Result<Option<bool>, ProvisionError> {
        let answer = self.read_answer(&format!("{question} (y/n): "))?;
        Ok(answer.map(|a| matches!(a.trim().to_ascii_lowercase().as_str(), "y" | "yes")))
    }

    fn text(&mut self, label: &str) -> Result<Option<String>, ProvisionError> {
        self.read_answer(&format!("{label} "))
    }

    fn say(&mut self, line: &str) {
        let _ = writeln!(self.output, "{line}");
    }
}

fn prompt_io(e: std::io::Error) -> ProvisionError {
    ProvisionError::Prompt {
        message: e.to_string(),
    }
}
