//! Link driver for compiled images.
//!
//! Links the front-end's archive into an executable, shared library or
//! system image through the platform's C compiler driver.
//!
//! # Command Layout
//!
//! ```text
//! <cc> [toolchain args] [recipe cflags] [runtime cflags/ldflags] [rpath flags]
//!      [extra link flags] -o <outname> [-shared]
//!      <enter whole-archive> <image> [extra objects] <leave whole-archive>
//!      -lkilnrt -lkilnrt-internal
//! ```
//!
//! The whole-archive bracket forces every symbol of the program's own code
//! into the artifact. It never covers the runtime libraries: they are already
//! linked and re-including their unused members bloats or breaks the output.
//!
//! # Usage
//!
//! ```ignore
//! use kiln_aot::{Linker, PlatformFamily, RuntimeDist};
//!
//! let runtime = RuntimeDist::global()?;
//! let linker = Linker::new(PlatformFamily::host(), runtime);
//! linker.link(&mut recipe.link)?;
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::PipelineError;
use crate::exec;
use crate::platform::PlatformFamily;
use crate::recipe::{LinkRecipe, OutputKind};
use crate::rpath::resolve_rpath;
use crate::runtime::RuntimeDist;
use crate::toolchain::{Toolchain, ToolchainLocator};

/// Validate `outname` against the extension `kind` requires, filling it in
/// when absent.
///
/// Shared libraries and system images must carry the platform's shared-library
/// extension; on Windows, executables must carry `.exe`. An absent extension
/// is appended, a matching one is kept, and anything else is rejected rather
/// than silently renamed.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] on an extension mismatch.
pub fn normalize_output_path(
    platform: PlatformFamily,
    kind: OutputKind,
    outname: &Path,
) -> Result<PathBuf, PipelineError> {
    let required = if kind.is_shared() {
        platform.shared_lib_ext()
    } else if kind == OutputKind::Executable {
        match platform.exe_ext() {
            Some(ext) => ext,
            None => return Ok(outname.to_path_buf()),
        }
    } else {
        return Ok(outname.to_path_buf());
    };

    match outname.extension() {
        None => {
            let mut name = outname.as_os_str().to_owned();
            name.push(".");
            name.push(required);
            Ok(PathBuf::from(name))
        }
        Some(ext) if ext == required => Ok(outname.to_path_buf()),
        Some(ext) => Err(PipelineError::config(format!(
            "output '{}' has extension '.{}', but a {kind} on {platform} must use '.{required}'",
            outname.display(),
            ext.to_string_lossy()
        ))),
    }
}

/// Links compiled images against the runtime distribution.
pub struct Linker<'rt> {
    platform: PlatformFamily,
    runtime: &'rt RuntimeDist,
    toolchain: Option<Toolchain>,
}

impl<'rt> Linker<'rt> {
    /// Create a linker for `platform` that locates its toolchain from the environment.
    pub fn new(platform: PlatformFamily, runtime: &'rt RuntimeDist) -> Self {
        Self {
            platform,
            runtime,
            toolchain: None,
        }
    }

    /// Use `toolchain` instead of locating one.
    #[must_use]
    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    /// Link the recipe's image into `recipe.outname`.
    ///
    /// `outname` gains the mandatory extension when it had none.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Configuration`] for archive kinds or a bad extension
    /// - [`PipelineError::ToolchainNotFound`] when no compiler driver exists
    /// - [`PipelineError::Execution`] when the driver fails
    pub fn link(&self, recipe: &mut LinkRecipe) -> Result<(), PipelineError> {
        let mut cmd = self.link_command(recipe)?;

        if let Some(dir) = recipe.outname.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
        }

        info!(output = %recipe.outname.display(), "linking");
        let start = Instant::now();
        exec::run(&mut cmd)?;
        let elapsed = start.elapsed();

        if recipe.image.verbose {
            let size = fs::metadata(&recipe.outname)
                .map_err(|e| PipelineError::io(&recipe.outname, e))?
                .len();
            eprintln!("  Linking took {:.2}s", elapsed.as_secs_f64());
            eprintln!(
                "  Artifact {} is {}",
                recipe.outname.display(),
                format_size(size)
            );
        }
        Ok(())
    }

    /// Build the link command without running it.
    ///
    /// Performs every validation `link` does and normalizes `outname`, but
    /// touches neither the filesystem nor any process.
    pub fn link_command(&self, recipe: &mut LinkRecipe) -> Result<Command, PipelineError> {
        let kind = recipe.image.output_type;
        if kind.is_archive() {
            return Err(PipelineError::config(format!(
                "{} output ({kind}) cannot be linked. Use compile step directly instead of link step.",
                kind.flag()
            )));
        }

        recipe.outname = normalize_output_path(self.platform, kind, &recipe.outname)?;

        let relative_libdir = recipe.relative_libdir(self.platform).to_string();
        let rpath_flags = resolve_rpath(self.platform, &relative_libdir);
        let runtime_libs = self.runtime.link_libraries();

        let toolchain = match self.toolchain {
            Some(ref tc) => tc.clone(),
            None => ToolchainLocator::from_env(self.platform, self.runtime).locate(false)?,
        };

        let mut cmd = toolchain.command();
        cmd.args(&recipe.image.cflags);
        cmd.args(self.runtime.compile_flags());
        cmd.args(self.runtime.link_search_flags());
        cmd.args(&rpath_flags);
        cmd.args(&recipe.extra_link_flags);
        cmd.arg("-o").arg(&recipe.outname);
        if kind != OutputKind::Executable {
            cmd.arg("-shared");
        }

        let (enter, leave) = self.platform.whole_archive_flags();
        cmd.arg(enter);
        cmd.arg(&recipe.image.img_path);
        cmd.args(&recipe.image.extra_objects);
        cmd.arg(leave);
        cmd.args(&runtime_libs);

        debug!(command = %exec::display_command(&cmd), "link command");
        Ok(cmd)
    }
}

/// Human-readable byte count (`1.50 MiB`).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    #[allow(clippy::cast_precision_loss, reason = "display only")]
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
