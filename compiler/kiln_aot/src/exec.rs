//! Synchronous execution of native tools.
//!
//! Commands are built token by token as [`Command`] values and never pass
//! through a shell, so arguments need no quoting.

use std::process::{Command, Output};

use tracing::debug;

use crate::error::PipelineError;

/// Render a command for logs and error messages.
pub fn display_command(cmd: &Command) -> String {
    let mut rendered = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        let arg = arg.to_string_lossy();
        rendered.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            rendered.push('\'');
            rendered.push_str(&arg);
            rendered.push('\'');
        } else {
            rendered.push_str(&arg);
        }
    }
    rendered
}

/// Run `cmd` to completion.
///
/// # Errors
///
/// Returns [`PipelineError::Execution`] if the process cannot be spawned or
/// exits unsuccessfully. There is no retry: the same inputs fail the same way.
pub fn run(cmd: &mut Command) -> Result<Output, PipelineError> {
    let rendered = display_command(cmd);
    debug!(command = %rendered, "running");

    let output = cmd.output().map_err(|e| PipelineError::Execution {
        command: rendered.clone(),
        exit_code: None,
        stderr: e.to_string(),
    })?;

    if output.status.success() {
        return Ok(output);
    }

    Err(PipelineError::Execution {
        command: rendered,
        exit_code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `cmd` and return its trimmed standard output.
pub fn run_capture(cmd: &mut Command) -> Result<String, PipelineError> {
    let output = run(cmd)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
