//! Native toolchain discovery.
//!
//! Resolution order:
//!
//! 1. `KILN_CC`: an explicit compiler command line, used verbatim
//! 2. Windows: the toolchain bundled with the runtime, with its `bin`
//!    directory prepended to `PATH`
//! 3. Elsewhere: the first known compiler driver found on `PATH`

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::PipelineError;
use crate::platform::PlatformFamily;
use crate::runtime::RuntimeDist;

/// Environment variable holding an explicit compiler command line.
pub const CC_ENV: &str = "KILN_CC";

/// C++-capable drivers, in preference order.
pub const CPP_COMPILERS: [&str; 2] = ["g++", "clang++"];

/// C drivers, in preference order.
pub const C_COMPILERS: [&str; 2] = ["gcc", "clang"];

/// A resolved compiler driver invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments that precede everything the pipeline adds.
    pub args: Vec<String>,
    /// Environment overrides for the spawned process.
    pub env: Vec<(String, OsString)>,
}

impl Toolchain {
    /// A toolchain running `program` with no extra arguments or environment.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Start a command for this toolchain.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Finds the compiler driver used for linking and auxiliary sources.
#[derive(Debug, Clone)]
pub struct ToolchainLocator {
    platform: PlatformFamily,
    override_cmd: Option<String>,
    search_path: Option<OsString>,
    bundled_dir: PathBuf,
}

impl ToolchainLocator {
    /// A locator that searches the process `PATH` and ignores `KILN_CC`.
    pub fn new(platform: PlatformFamily, runtime: &RuntimeDist) -> Self {
        Self {
            platform,
            override_cmd: None,
            search_path: std::env::var_os("PATH"),
            bundled_dir: runtime.bundled_toolchain_dir(),
        }
    }

    /// A locator configured from the process environment.
    pub fn from_env(platform: PlatformFamily, runtime: &RuntimeDist) -> Self {
        let override_cmd = std::env::var(CC_ENV).ok();
        Self::new(platform, runtime).with_override(override_cmd)
    }

    /// Set (or clear) the explicit compiler command line.
    #[must_use]
    pub fn with_override(mut self, cmd: Option<String>) -> Self {
        self.override_cmd = cmd;
        self
    }

    /// Replace the `PATH` value used for searching.
    #[must_use]
    pub fn with_search_path(mut self, path: Option<OsString>) -> Self {
        self.search_path = path;
        self
    }

    /// Resolve the compiler driver.
    ///
    /// With `want_cpp`, only C++-capable drivers qualify: a plain C driver is
    /// never substituted silently.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Configuration`] for an unparsable `KILN_CC`
    /// - [`PipelineError::ToolchainNotFound`] naming every candidate tried
    pub fn locate(&self, want_cpp: bool) -> Result<Toolchain, PipelineError> {
        if let Some(ref line) = self.override_cmd {
            let mut words = split_command_line(line)?;
            if words.is_empty() {
                return Err(PipelineError::config(format!("{CC_ENV} is set but empty")));
            }
            let program = words.remove(0);
            debug!(%program, args = ?words, "using compiler from {CC_ENV}");
            return Ok(Toolchain {
                program: PathBuf::from(program),
                args: words,
                env: Vec::new(),
            });
        }

        match self.platform {
            PlatformFamily::Windows => self.locate_bundled(want_cpp),
            PlatformFamily::Elf | PlatformFamily::Darwin => self.locate_on_path(want_cpp),
        }
    }

    fn locate_bundled(&self, want_cpp: bool) -> Result<Toolchain, PipelineError> {
        let name = if want_cpp { "g++" } else { "gcc" };
        let program = self.bundled_dir.join(self.platform.exe_name(name));
        if !program.is_file() {
            return Err(PipelineError::ToolchainNotFound {
                candidates: vec![program.display().to_string()],
            });
        }

        let mut dirs = vec![self.bundled_dir.clone()];
        if let Some(ref existing) = self.search_path {
            dirs.extend(std::env::split_paths(existing));
        }
        let path = std::env::join_paths(dirs).map_err(|e| {
            PipelineError::config(format!(
                "cannot add '{}' to PATH: {e}",
                self.bundled_dir.display()
            ))
        })?;

        debug!(program = %program.display(), "using bundled toolchain");
        Ok(Toolchain {
            program,
            args: Vec::new(),
            env: vec![("PATH".to_string(), path)],
        })
    }

    fn locate_on_path(&self, want_cpp: bool) -> Result<Toolchain, PipelineError> {
        let candidates: &[&str] = if want_cpp {
            &CPP_COMPILERS
        } else {
            &C_COMPILERS
        };

        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        for name in candidates {
            if let Some(found) = self.find_program(name, &cwd) {
                debug!(compiler = %found.display(), "found compiler on PATH");
                return Ok(Toolchain::new(found));
            }
        }

        Err(PipelineError::ToolchainNotFound {
            candidates: candidates.iter().map(ToString::to_string).collect(),
        })
    }

    fn find_program(&self, name: &str, cwd: &Path) -> Option<PathBuf> {
        let paths = self.search_path.as_ref()?;
        which::which_in(name, Some(paths), cwd).ok()
    }
}

/// Split a command line on shell-word boundaries.
///
/// Supports single quotes (literal), double quotes (with `\"`, `\\` and `\$`
/// escapes) and backslash escapes outside quotes. Nothing is expanded.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] on unterminated quotes or a
/// trailing backslash.
pub fn split_command_line(line: &str) -> Result<Vec<String>, PipelineError> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Normal,
        Single,
        Double,
    }

    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut state = State::Normal;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                '\'' => {
                    state = State::Single;
                    in_word = true;
                }
                '"' => {
                    state = State::Double;
                    in_word = true;
                }
                '\\' => {
                    let escaped = chars.next().ok_or_else(|| {
                        PipelineError::config(format!("trailing backslash in command line: {line}"))
                    })?;
                    current.push(escaped);
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
            State::Single => match c {
                '\'' => state = State::Normal,
                c => current.push(c),
            },
            State::Double => match c {
                '"' => state = State::Normal,
                '\\' => match chars.next() {
                    Some(escaped @ ('"' | '\\' | '$' | '`')) => current.push(escaped),
                    Some(other) => {
                        current.push('\\');
                        current.push(other);
                    }
                    None => break,
                },
                c => current.push(c),
            },
        }
    }

    if state != State::Normal {
        return Err(PipelineError::config(format!(
            "unterminated quote in command line: {line}"
        )));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
