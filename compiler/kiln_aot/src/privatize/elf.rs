//! ELF back-end, driven by `patchelf`.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::rewrite_failed;
use crate::error::PipelineError;
use crate::exec;

/// Search path of a renamed library in the bundle's library directory.
const LIB_DIR_RPATH: &str = "$ORIGIN:$ORIGIN/kiln";

/// Search path of a renamed library in the private directory.
const PRIVATE_DIR_RPATH: &str = "$ORIGIN:$ORIGIN/..";

pub(super) struct PatchElf {
    program: PathBuf,
}

impl PatchElf {
    pub(super) fn new(program: PathBuf) -> Self {
        Self { program }
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    /// `DT_SONAME` of `lib`, if present.
    pub(super) fn soname(&self, lib: &Path) -> Option<String> {
        let mut cmd = self.command();
        cmd.arg("--print-soname").arg(lib);
        match exec::run_capture(&mut cmd) {
            Ok(soname) if !soname.is_empty() => Some(soname),
            Ok(_) => None,
            Err(e) => {
                debug!(lib = %lib.display(), error = %e, "no soname");
                None
            }
        }
    }

    pub(super) fn set_identity(
        &self,
        lib: &Path,
        new_name: &str,
        private: bool,
    ) -> Result<(), PipelineError> {
        let rpath = if private {
            PRIVATE_DIR_RPATH
        } else {
            LIB_DIR_RPATH
        };
        let mut cmd = self.command();
        cmd.arg("--set-soname")
            .arg(new_name)
            .arg("--set-rpath")
            .arg(rpath)
            .arg(lib);
        exec::run(&mut cmd).map_err(|e| rewrite_failed(lib, &e))?;
        Ok(())
    }

    /// Point every `DT_NEEDED` entry of `binary` at the renamed libraries.
    pub(super) fn replace_needed(
        &self,
        binary: &Path,
        renames: &[(String, String)],
    ) -> Result<(), PipelineError> {
        if renames.is_empty() {
            return Ok(());
        }
        let mut cmd = self.command();
        for (old, new) in renames {
            cmd.arg("--replace-needed").arg(old).arg(new);
        }
        cmd.arg(binary);
        exec::run(&mut cmd).map_err(|e| rewrite_failed(binary, &e))?;
        Ok(())
    }
}
