//! Error type shared by every pipeline stage.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while compiling, linking, bundling or privatizing.
///
/// Every variant is fatal to the run. The only degraded path (rpath and
/// privatization on Windows) logs a warning instead of producing one of these.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid recipe or command line, reported before any side effect.
    #[error("{0}")]
    Configuration(String),

    /// No usable native compiler was found.
    #[error("toolchain not found: tried {}", .candidates.join(", "))]
    ToolchainNotFound { candidates: Vec<String> },

    /// A spawned native process failed or could not be spawned.
    #[error("compilation failed: {command}{}{}", fmt_exit_code(.exit_code.as_ref()), fmt_stderr(.stderr))]
    Execution {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Rewriting a bundled runtime library failed.
    #[error("privatization of '{}' failed: {message}", .path.display())]
    Privatization { path: PathBuf, message: String },

    /// The pre-built runtime distribution could not be located.
    #[error("runtime distribution not found; searched: {}", fmt_paths(.searched))]
    RuntimeNotFound { searched: Vec<PathBuf> },

    /// Filesystem failure on a specific path.
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Shorthand for [`PipelineError::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn fmt_exit_code(code: Option<&i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {code})"),
        None => String::new(),
    }
}

fn fmt_stderr(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!("\n\n{}", stderr.trim_end())
    }
}

fn fmt_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(nothing)".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
