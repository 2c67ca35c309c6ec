use crate::actions::ActionContext;
use crate::error::ActionError;
use crate::notes::{Detection, Note};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Hard ceiling on external program runtime.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Only these environment variables reach the child.
const ENV_PASSTHROUGH: [&str; 3] = ["PATH", "TEMP", "TMP"];

/// Log preview of captured output is truncated to this many bytes.
const OUTPUT_PREVIEW_LIMIT: usize = 200;

/// Runs an operator-configured external program with note fields as
/// `--name=value` arguments.
///
/// Failures are never retried: a script with a logic error will not succeed
/// on a second attempt and may duplicate its side effects.
#[derive(Clone)]
pub struct CommandAction {
    /// Absolute path of the program.
    pub command: String,
    /// Recognized note parameter names to pass along.
    pub parameters: Vec<String>,
}

impl CommandAction {
    pub async fn execute(
        &self,
        _ctx: &ActionContext,
        detection: &Detection,
    ) -> Result<(), ActionError> {
        info!(command = %self.command, params = ?self.parameters, "executing command");

        let command_path = validate_command_path(&self.command)?;
        let args = build_safe_arguments(&self.parameters, &detection.note)?;
        debug!(command = %command_path, ?args, "spawning external program");

        let mut cmd = tokio::process::Command::new(&command_path);
        cmd.args(&args)
            .env_clear()
            .kill_on_drop(true)
            .stdin(std::process::Stdio::null());
        for key in ENV_PASSTHROUGH {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }

        let started = std::time::Instant::now();
        let output = tokio::time::timeout(COMMAND_TIMEOUT, cmd.output())
            .await
            .map_err(|_| ActionError::Timeout {
                component: "command",
                operation: "execute",
            })?
            .map_err(|e| ActionError::CommandExecution {
                command: self.command.clone(),
                exit_code: -1,
                output: e.to_string(),
            })?;
        let elapsed = started.elapsed();

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        let preview = preview(&combined);

        if !output.status.success() {
            return Err(ActionError::CommandExecution {
                command: self.command.clone(),
                exit_code: output.status.code().unwrap_or(-1),
                output: preview,
            });
        }

        info!(
            command = %self.command,
            output_bytes = combined.len(),
            duration_ms = elapsed.as_millis() as u64,
            output_preview = %preview,
            "command executed successfully"
        );
        Ok(())
    }
}

fn preview(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    if text.len() > OUTPUT_PREVIEW_LIMIT {
        let mut end = OUTPUT_PREVIEW_LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &text[..end])
    } else {
        text.into_owned()
    }
}

/// Reject anything that is not an absolute path to an existing executable.
pub(crate) fn validate_command_path(command: &str) -> Result<String, ActionError> {
    if command.is_empty() {
        return Err(ActionError::Validation {
            component: "command",
            operation: "validate_command_path",
            message: "empty command path".to_string(),
        });
    }

    let path = Path::new(command);
    if !path.is_absolute() {
        return Err(ActionError::Validation {
            component: "command",
            operation: "validate_command_path",
            message: format!("command must use absolute path: {command}"),
        });
    }

    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ActionError::NotFound {
            component: "command",
            operation: "validate_command_path",
            message: command.to_string(),
        },
        std::io::ErrorKind::PermissionDenied => ActionError::Permission {
            component: "command",
            operation: "validate_command_path",
            message: command.to_string(),
        },
        _ => ActionError::Validation {
            component: "command",
            operation: "validate_command_path",
            message: format!("{command}: {e}"),
        },
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ActionError::Validation {
                component: "command",
                operation: "validate_command_path",
                message: format!("command is not executable: {command}"),
            });
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    Ok(command.to_string())
}

/// Recognized parameter names and their note-field extractors. Unknown
/// names fail validation instead of silently producing empty arguments.
pub(crate) fn note_parameter(note: &Note, name: &str) -> Option<String> {
    match name {
        "common_name" => Some(note.common_name.clone()),
        "scientific_name" => Some(note.scientific_name.clone()),
        "species_code" => Some(note.species_code.clone()),
        // Normalized to a percentage for script consumption.
        "confidence" => Some(format!("{:.0}", note.confidence * 100.0)),
        "source" => Some(note.source.clone()),
        "source_node" => Some(note.source_node.clone()),
        "date" => Some(note.date.clone()),
        "time" => Some(note.time.clone()),
        "latitude" => Some(note.latitude.to_string()),
        "longitude" => Some(note.longitude.to_string()),
        "threshold" => Some(note.threshold.to_string()),
        "sensitivity" => Some(note.sensitivity.to_string()),
        "clip_name" => Some(note.clip_name.clone()),
        _ => None,
    }
}

fn is_valid_param_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Build `--name=value` arguments, sorted by name for deterministic
/// invocation, with control characters stripped and risky values quoted.
pub(crate) fn build_safe_arguments(
    parameters: &[String],
    note: &Note,
) -> Result<Vec<String>, ActionError> {
    let mut names: Vec<&String> = parameters.iter().collect();
    names.sort();

    let mut args = Vec::with_capacity(names.len());
    for name in names {
        if !is_valid_param_name(name) {
            return Err(ActionError::Validation {
                component: "command",
                operation: "build_arguments",
                message: format!("invalid parameter name: {name:?}"),
            });
        }
        let value = note_parameter(note, name).ok_or_else(|| ActionError::Validation {
            component: "command",
            operation: "build_arguments",
            message: format!("unrecognized parameter: {name}"),
        })?;

        let mut value: String = value.chars().filter(|c| !c.is_control()).collect();
        if value.contains(|c: char| c.is_whitespace() || matches!(c, '@' | '"' | '\'')) {
            value = format!("{value:?}");
        }
        args.push(format!("--{name}={value}"));
    }
    Ok(args)
}
