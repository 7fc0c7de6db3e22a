//! Mach-O back-end, driven by `otool` and `install_name_tool`.
//!
//! Rewriting load commands invalidates code signatures, so modified files are
//! re-signed ad hoc when `codesign` is available.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::rewrite_failed;
use crate::error::PipelineError;
use crate::exec;

pub(super) struct InstallNameTool {
    otool: PathBuf,
    install_name_tool: PathBuf,
    codesign: Option<PathBuf>,
}

impl InstallNameTool {
    pub(super) fn new(otool: PathBuf, install_name_tool: PathBuf, codesign: Option<PathBuf>) -> Self {
        Self {
            otool,
            install_name_tool,
            codesign,
        }
    }

    /// Install name of `lib` (`LC_ID_DYLIB`), if present.
    pub(super) fn install_name(&self, lib: &Path) -> Option<String> {
        let mut cmd = Command::new(&self.otool);
        cmd.arg("-D").arg(lib);
        match exec::run_capture(&mut cmd) {
            Ok(out) => parse_install_name(&out),
            Err(e) => {
                debug!(lib = %lib.display(), error = %e, "no install name");
                None
            }
        }
    }

    pub(super) fn set_identity(&self, lib: &Path, new_name: &str) -> Result<(), PipelineError> {
        let mut cmd = Command::new(&self.install_name_tool);
        cmd.arg("-id").arg(format!("@rpath/{new_name}")).arg(lib);
        exec::run(&mut cmd).map_err(|e| rewrite_failed(lib, &e))?;
        Ok(())
    }

    /// Point every load command of `binary` at the renamed libraries.
    pub(super) fn change_references(
        &self,
        binary: &Path,
        renames: &[(String, String)],
    ) -> Result<(), PipelineError> {
        if renames.is_empty() {
            return Ok(());
        }
        let mut cmd = Command::new(&self.install_name_tool);
        for (old, new) in renames {
            cmd.arg("-change").arg(old).arg(format!("@rpath/{new}"));
        }
        cmd.arg(binary);
        exec::run(&mut cmd).map_err(|e| rewrite_failed(binary, &e))?;
        Ok(())
    }

    /// Ad-hoc re-sign `binary`; skipped without `codesign`.
    pub(super) fn resign(&self, binary: &Path) -> Result<(), PipelineError> {
        let Some(ref codesign) = self.codesign else {
            return Ok(());
        };
        let mut cmd = Command::new(codesign);
        cmd.arg("-f").arg("-s").arg("-").arg(binary);
        exec::run(&mut cmd).map_err(|e| rewrite_failed(binary, &e))?;
        Ok(())
    }
}

/// `otool -D` prints the file name, then the install name on its own line.
fn parse_install_name(output: &str) -> Option<String> {
    output
        .lines()
        .skip(1)
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
