use serde_json::Value;
use std::io;
use std::path::Path;
use std::process::Command;
use tracing::{debug, error};

/// Runs an external BIDS validator and reduces its report to a verdict.
///
/// The validator is invoked as `<command> --json <dir>`. Any output on stderr
/// is a failure. Otherwise the dataset is valid when the report carries an
/// empty `errors` list, or when no issue is tagged with `error` severity.
/// A validator that cannot be started yields an invalid verdict.
#[derive(Debug, Clone)]
pub struct BidsValidator {
    command: String,
}

impl BidsValidator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn validate(&self, dir: &Path) -> bool {
        debug!("Running '{} --json {}'", self.command, dir.display());

        let output = match Command::new(&self.command).arg("--json").arg(dir).output() {
            Ok(output) => output,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                error!("{} not found. Install it first.", self.command);
                return false;
            }
            Err(err) => {
                error!("Failed to run {}: {}", self.command, err);
                return false;
            }
        };

        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Validation errors: {}", stderr.trim());
            return false;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        report_is_valid(&stdout)
    }
}

/// Inspect a validator report (normally JSON) for error-severity issues.
pub fn report_is_valid(report: &str) -> bool {
    match serde_json::from_str::<Value>(report.trim()) {
        Ok(json) => has_empty_errors(&json) || !has_error_severity(&json),
        Err(_) => {
            let compact: String = report.chars().filter(|c| !c.is_whitespace()).collect();
            compact.contains("\"errors\":[]") || !compact.contains("\"severity\":\"error\"")
        }
    }
}

fn has_empty_errors(json: &Value) -> bool {
    any_object(json, |obj| {
        obj.get("errors")
            .and_then(Value::as_array)
            .is_some_and(|errors| errors.is_empty())
    })
}

fn has_error_severity(json: &Value) -> bool {
    any_object(json, |obj| {
        obj.get("severity")
            .and_then(Value::as_str)
            .is_some_and(|severity| severity.eq_ignore_ascii_case("error"))
    })
}

fn any_object<F>(root: &Value, predicate: F) -> bool
where
    F: Fn(&serde_json::Map<String, Value>) -> bool,
{
    let mut stack = vec![root];
    while let Some(value) = stack.pop() {
        match value {
            Value::Object(obj) => {
                if predicate(obj) {
                    return true;
                }
                stack.extend(obj.values());
            }
            Value::Array(values) => stack.extend(values.iter()),
            _ => {}
        }
    }
    false
}
