//! The image-compile step.
//!
//! Runs the runtime's front-end to turn the program into an object or
//! bitcode archive, then compiles any auxiliary C/C++ sources into objects
//! that the linker folds into the whole-archive bracket.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use tracing::info;

use crate::error::PipelineError;
use crate::exec;
use crate::platform::PlatformFamily;
use crate::recipe::{ImageRecipe, OutputKind};
use crate::runtime::RuntimeDist;
use crate::toolchain::{Toolchain, ToolchainLocator};

/// Environment variable overriding the front-end executable.
pub const FRONTEND_ENV: &str = "KILN_FRONTEND";

/// Source extensions compiled in C++ mode.
const CPP_EXTENSIONS: [&str; 4] = ["cc", "cpp", "cxx", "c++"];

/// Drives the front-end and the auxiliary source compiles.
pub struct ImageCompiler<'rt> {
    platform: PlatformFamily,
    runtime: &'rt RuntimeDist,
    frontend: PathBuf,
    c_toolchain: Option<Toolchain>,
    cpp_toolchain: Option<Toolchain>,
}

impl<'rt> ImageCompiler<'rt> {
    /// An image compiler using the runtime's front-end (or `KILN_FRONTEND`).
    pub fn new(platform: PlatformFamily, runtime: &'rt RuntimeDist) -> Self {
        let frontend = std::env::var_os(FRONTEND_ENV)
            .map_or_else(|| runtime.frontend(), PathBuf::from);
        Self {
            platform,
            runtime,
            frontend,
            c_toolchain: None,
            cpp_toolchain: None,
        }
    }

    /// Use `frontend` instead of the runtime's front-end.
    #[must_use]
    pub fn with_frontend(mut self, frontend: impl Into<PathBuf>) -> Self {
        self.frontend = frontend.into();
        self
    }

    /// Use `toolchain` for both C and C++ auxiliary sources.
    #[must_use]
    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.c_toolchain = Some(toolchain.clone());
        self.cpp_toolchain = Some(toolchain);
        self
    }

    /// Produce `recipe.img_path`, then compile auxiliary sources.
    ///
    /// Each auxiliary source becomes `<img_dir>/<index>-<stem>.o` and is
    /// appended to `recipe.extra_objects`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] if an archive output carries
    /// auxiliary sources, [`PipelineError::Execution`] if the front-end or a
    /// compiler fails, and [`PipelineError::ToolchainNotFound`] if auxiliary
    /// sources need a compiler that cannot be found.
    pub fn compile(&self, recipe: &mut ImageRecipe) -> Result<(), PipelineError> {
        // Archive outputs are never linked, so their image dir is the user's.
        if recipe.output_type.is_archive() && !recipe.c_sources.is_empty() {
            return Err(PipelineError::config(format!(
                "{} output cannot include auxiliary sources",
                recipe.output_type.flag()
            )));
        }

        if let Some(dir) = recipe.img_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
        }

        info!(input = %recipe.file.display(), image = %recipe.img_path.display(), "compiling image");
        let start = Instant::now();
        exec::run(&mut self.image_command(recipe))?;
        if recipe.verbose {
            eprintln!("  Compiling image took {:.2}s", start.elapsed().as_secs_f64());
        }

        let sources = recipe.c_sources.clone();
        for (index, source) in sources.iter().enumerate() {
            let object = object_path(&recipe.img_path, index, source);
            let mut cmd = self.source_command(recipe, source, &object)?;
            exec::run(&mut cmd)?;
            recipe.extra_objects.push(object);
        }
        Ok(())
    }

    /// The front-end invocation for `recipe`.
    pub fn image_command(&self, recipe: &ImageRecipe) -> Command {
        let mut cmd = Command::new(&self.frontend);
        if let Some(ref project) = recipe.project {
            cmd.arg(format!("--project={}", project.display()));
        }
        if let Some(ref cpu) = recipe.cpu_target {
            cmd.arg(format!("--cpu-target={cpu}"));
        }
        if let Some(ref mode) = recipe.trim_mode {
            cmd.arg(format!("--trim={mode}"));
        }
        if recipe.use_loaded_runtime {
            cmd.arg("--use-loaded-image");
        }
        let archive_flag = match recipe.output_type {
            OutputKind::BitcodeArchive => "--output-bc",
            _ => "--output-o",
        };
        cmd.arg(archive_flag).arg(&recipe.img_path);
        cmd.args(&recipe.extra_args);
        cmd.arg(&recipe.file);
        cmd.arg("--output-type").arg(recipe.output_type.frontend_name());
        if recipe.add_ccallables {
            cmd.arg("--compile-ccallable");
        }
        if recipe.verbose {
            cmd.arg("--verbose");
        }
        cmd
    }

    /// The compiler invocation turning `source` into `object`.
    pub fn source_command(
        &self,
        recipe: &ImageRecipe,
        source: &Path,
        object: &Path,
    ) -> Result<Command, PipelineError> {
        let want_cpp = is_cpp_source(source);
        let preset = if want_cpp {
            &self.cpp_toolchain
        } else {
            &self.c_toolchain
        };
        let toolchain = match preset {
            Some(tc) => tc.clone(),
            None => ToolchainLocator::from_env(self.platform, self.runtime).locate(want_cpp)?,
        };

        let mut cmd = toolchain.command();
        cmd.arg("-c");
        cmd.args(self.runtime.compile_flags());
        cmd.args(&recipe.cflags);
        cmd.arg(source);
        cmd.arg("-o").arg(object);
        Ok(cmd)
    }
}

/// `<image dir>/<index>-<source stem>.o`.
///
/// The index keeps sources sharing a stem (`a/util.c`, `b/util.c`) apart.
fn object_path(img_path: &Path, index: usize, source: &Path) -> PathBuf {
    let mut name = OsString::from(format!("{index}-"));
    name.push(source.file_stem().unwrap_or_else(|| OsStr::new("source")));
    name.push(".o");
    match img_path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

fn is_cpp_source(source: &Path) -> bool {
    source
        .extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| CPP_EXTENSIONS.contains(&ext))
}
