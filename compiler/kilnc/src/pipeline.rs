//! Sequential pipeline driver.
//!
//! ```text
//! RecipeBuilder ─▶ image compile ─▶ link ─▶ bundle ─▶ privatize
//! ```
//!
//! Archive outputs stop after the image compile. Any error aborts the run;
//! there is no partial success.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Instant;

use kiln_aot::{
    privatize_tag, BundleLayout, Bundler, ImageCompiler, Linker, PipelineError, PlatformFamily,
    Privatizer, RecipeBuilder, Rename, RuntimeDist, Toolchain,
};
use tracing::info;

use crate::args::BuildRequest;

/// What a pipeline run produced.
#[derive(Debug)]
pub struct PipelineOutput {
    /// The linked artifact, or the archive for archive outputs.
    pub artifact: PathBuf,
    /// The bundle, when one was requested.
    pub bundle: Option<BundleLayout>,
    /// Libraries renamed by privatization.
    pub renames: Vec<Rename>,
}

/// Run `request` on the host against the detected runtime distribution.
pub fn run(request: BuildRequest) -> Result<PipelineOutput, PipelineError> {
    let runtime = RuntimeDist::global()?;
    Pipeline::new(PlatformFamily::host(), runtime).run(request.builder)
}

/// The stages, wired to one platform and runtime.
pub struct Pipeline<'rt> {
    platform: PlatformFamily,
    runtime: &'rt RuntimeDist,
    frontend: Option<PathBuf>,
    toolchain: Option<Toolchain>,
    tool_path: Option<OsString>,
    scratch_root: Option<PathBuf>,
}

impl<'rt> Pipeline<'rt> {
    pub fn new(platform: PlatformFamily, runtime: &'rt RuntimeDist) -> Self {
        Self {
            platform,
            runtime,
            frontend: None,
            toolchain: None,
            tool_path: None,
            scratch_root: None,
        }
    }

    /// Use `frontend` instead of the runtime's front-end.
    #[must_use]
    pub fn with_frontend(mut self, frontend: impl Into<PathBuf>) -> Self {
        self.frontend = Some(frontend.into());
        self
    }

    /// Use `toolchain` for compiling and linking instead of locating one.
    #[must_use]
    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    /// Search `path` for the privatization tools instead of `PATH`.
    #[must_use]
    pub fn with_tool_path(mut self, path: OsString) -> Self {
        self.tool_path = Some(path);
        self
    }

    /// Create scratch directories under `dir` instead of the system temp dir.
    #[must_use]
    pub fn with_scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(dir.into());
        self
    }

    /// Validate `builder` and run every stage it calls for.
    ///
    /// The intermediate image lives in a scratch directory removed on return.
    /// Nothing touches the filesystem until `builder` has validated.
    pub fn run(&self, builder: RecipeBuilder) -> Result<PipelineOutput, PipelineError> {
        let mut recipe = builder.build(self.platform)?;
        let _scratch = if recipe.link.image.output_type.is_archive() {
            None
        } else {
            let root = self.scratch_root.clone().unwrap_or_else(std::env::temp_dir);
            let dir = tempfile::Builder::new()
                .prefix("kiln-")
                .tempdir_in(&root)
                .map_err(|e| PipelineError::io(root, e))?;
            recipe.link.image.set_work_dir(dir.path());
            Some(dir)
        };
        let verbose = recipe.link.image.verbose;
        let start = Instant::now();

        let mut compiler = ImageCompiler::new(self.platform, self.runtime);
        if let Some(ref frontend) = self.frontend {
            compiler = compiler.with_frontend(frontend);
        }
        if let Some(ref toolchain) = self.toolchain {
            compiler = compiler.with_toolchain(toolchain.clone());
        }
        compiler.compile(&mut recipe.link.image)?;

        if recipe.link.image.output_type.is_archive() {
            info!(archive = %recipe.link.outname.display(), "archive written");
            return Ok(PipelineOutput {
                artifact: recipe.link.outname,
                bundle: None,
                renames: Vec::new(),
            });
        }

        let mut linker = Linker::new(self.platform, self.runtime);
        if let Some(ref toolchain) = self.toolchain {
            linker = linker.with_toolchain(toolchain.clone());
        }
        linker.link(&mut recipe.link)?;

        let bundle = Bundler::new(self.platform, self.runtime).bundle(&recipe)?;

        let mut renames = Vec::new();
        if let Some(ref layout) = bundle {
            if recipe.privatize {
                let mut privatizer = Privatizer::new(self.platform, self.runtime);
                if let Some(ref path) = self.tool_path {
                    privatizer = privatizer.with_search_path(Some(path.clone()));
                }
                renames = privatizer.privatize(layout, &privatize_tag(&layout.artifact))?;
            }
            if verbose {
                eprintln!("  Bundle written to {}", layout.root.display());
            }
        }

        if verbose {
            eprintln!("  Total build took {:.2}s", start.elapsed().as_secs_f64());
        }

        Ok(PipelineOutput {
            artifact: recipe.link.outname,
            bundle,
            renames,
        })
    }
}
