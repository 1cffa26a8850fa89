//! Turns raw operator input into a [`MachineRecord`].
//!
//! Every field is checked so the operator sees all problems with one entry at
//! once. Nothing here panics on bad input.

use std::fmt;

use crate::manifest::MachineRecord;

/// Raw, unvalidated answers collected from the operator.
#[derive(Debug, Clone, Default)]
pub struct RawSpec {
    pub name: String,
    pub cpu: String,
    pub memory: String,
    pub disk: String,
}

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a raw tuple into a record, or return every field error found.
pub fn validate(
    name: &str,
    cpu: &str,
    memory: &str,
    disk: &str,
) -> Result<MachineRecord, Vec<FieldError>> {
    let mut errors = Vec::new();

    let name = normalize_name(name);
    if name.is_empty() {
        errors.push(FieldError {
            field: "name",
            message: "name must not be empty".into(),
        });
    }

    let cpu = coerce("cpu", cpu, &mut errors);
    let memory = coerce("memory", memory, &mut errors);
    let disk = coerce("disk", disk, &mut errors);

    match (cpu, memory, disk) {
        (Some(cpu), Some(memory), Some(disk)) if errors.is_empty() => Ok(MachineRecord {
            name,
            cpu,
            memory,
            disk,
            provisioned_at: None,
        }),
        _ => Err(errors),
    }
}

/// Convenience wrapper over [`validate`] for a collected [`RawSpec`].
pub fn validate_spec(spec: &RawSpec) -> Result<MachineRecord, Vec<FieldError>> {
    validate(&spec.name, &spec.cpu, &spec.memory, &spec.disk)
}

/// Trim, then turn every whitespace character into a hyphen.
/// `"web server 1"` → `"web-server-1"`
pub fn normalize_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect()
}

fn coerce(field: &'static str, raw: &str, errors: &mut Vec<FieldError>) -> Option<f64> {
    let fail = |message: &str| FieldError {
        field,
        message: message.into(),
    };

    let value: f64 = match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            errors.push(fail("value is not a valid number"));
            return None;
        }
    };

    if !value.is_finite() {
        errors.push(fail("value must be a finite number"));
        return None;
    }
    if value < 0.0 {
        errors.push(fail("value must not be negative"));
        return None;
    }

    // "-0" parses to negative zero
    Some(value + 0.0)
}
