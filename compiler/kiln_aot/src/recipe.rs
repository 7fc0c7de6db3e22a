//! Build recipes: what each pipeline stage is asked to do.
//!
//! Recipes nest by ownership: a [`BundleRecipe`] owns its [`LinkRecipe`],
//! which owns its [`ImageRecipe`]. They are produced once by
//! [`RecipeBuilder::build`], which performs every validation up front so no
//! stage starts with a partially valid recipe.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::PipelineError;
use crate::linker::normalize_output_path;
use crate::platform::PlatformFamily;
use crate::rpath::default_relative_libdir;

/// Kind of product the pipeline builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Relocatable object archive (`--output-o`).
    ObjectArchive,
    /// Bitcode archive (`--output-bc`).
    BitcodeArchive,
    /// Standalone executable (`--output-exe`).
    Executable,
    /// Shared library (`--output-lib`).
    SharedLibrary,
    /// Precompiled runtime image, linked as a shared library (`--output-sysimage`).
    SystemImage,
}

impl OutputKind {
    /// All kinds, in CLI listing order.
    pub const ALL: [Self; 5] = [
        Self::Executable,
        Self::SharedLibrary,
        Self::SystemImage,
        Self::ObjectArchive,
        Self::BitcodeArchive,
    ];

    /// Parse a CLI output flag (`--output-exe`, ...).
    pub fn from_flag(flag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.flag() == flag)
    }

    /// The CLI flag selecting this kind.
    #[must_use]
    pub const fn flag(self) -> &'static str {
        match self {
            Self::ObjectArchive => "--output-o",
            Self::BitcodeArchive => "--output-bc",
            Self::Executable => "--output-exe",
            Self::SharedLibrary => "--output-lib",
            Self::SystemImage => "--output-sysimage",
        }
    }

    /// Name passed to the image compiler front-end.
    #[must_use]
    pub const fn frontend_name(self) -> &'static str {
        match self {
            Self::ObjectArchive => "o",
            Self::BitcodeArchive => "bc",
            Self::Executable => "exe",
            Self::SharedLibrary => "lib",
            Self::SystemImage => "sysimage",
        }
    }

    /// Object and bitcode archives are final after the compile step.
    #[must_use]
    pub const fn is_archive(self) -> bool {
        matches!(self, Self::ObjectArchive | Self::BitcodeArchive)
    }

    /// Kinds linked with `-shared` and named with the shared-library extension.
    #[must_use]
    pub const fn is_shared(self) -> bool {
        matches!(self, Self::SharedLibrary | Self::SystemImage)
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ObjectArchive => "object archive",
            Self::BitcodeArchive => "bitcode archive",
            Self::Executable => "executable",
            Self::SharedLibrary => "shared library",
            Self::SystemImage => "system image",
        };
        f.write_str(name)
    }
}

/// How the compiled image is produced by the front-end.
///
/// The many flags are independent settings forwarded to the front-end, not
/// states of one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ImageRecipe {
    /// Target CPU (`--cpu-target`).
    pub cpu_target: Option<String>,
    /// Product kind; fixed once chosen.
    pub output_type: OutputKind,
    /// Trim mode (`--trim[=mode]`).
    pub trim_mode: Option<String>,
    /// Generate exports for callable entry points (`--compile-ccallable`).
    pub add_ccallables: bool,
    /// Program entry file.
    pub file: PathBuf,
    /// Extra arguments for the front-end (`--experimental`, ...).
    pub extra_args: Vec<String>,
    /// Project root (`--project`).
    pub project: Option<PathBuf>,
    /// Where the compiled archive is written.
    pub img_path: PathBuf,
    /// Report timing and sizes.
    pub verbose: bool,
    /// Let the front-end reuse the already loaded runtime image.
    pub use_loaded_runtime: bool,
    /// Auxiliary native sources folded into the image.
    pub c_sources: Vec<PathBuf>,
    /// Flags for auxiliary sources and the link driver.
    pub cflags: Vec<String>,
    /// Extra objects placed inside the whole-archive bracket.
    pub extra_objects: Vec<PathBuf>,
}

impl ImageRecipe {
    /// Move the intermediate image into `dir`, keeping its file name.
    ///
    /// Archive outputs are the user's product and stay where they are.
    pub fn set_work_dir(&mut self, dir: &Path) {
        if self.output_type.is_archive() {
            return;
        }
        if let Some(name) = self.img_path.file_name() {
            self.img_path = dir.join(name);
        }
    }
}

/// How the compiled image is linked into the final artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecipe {
    pub image: ImageRecipe,
    /// Artifact path. The linker may append the mandatory extension.
    pub outname: PathBuf,
    /// Library directory relative to the artifact; platform default when unset.
    pub rpath: Option<String>,
    /// Extra flags passed to the link driver.
    pub extra_link_flags: Vec<String>,
}

impl LinkRecipe {
    /// Relative library directory, filled in with the platform default on first use.
    pub fn relative_libdir(&mut self, platform: PlatformFamily) -> &str {
        self.rpath
            .get_or_insert_with(|| default_relative_libdir(platform))
    }
}

/// How the linked artifact is laid out for distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRecipe {
    pub link: LinkRecipe,
    /// Bundle root; `None` when bundling was not requested.
    pub output_dir: Option<PathBuf>,
    /// Library directory name inside the bundle.
    pub libdir: String,
    /// Privatize the bundled runtime.
    pub privatize: bool,
    /// Extra files or directories copied into the library directory.
    pub assets: Vec<PathBuf>,
}

impl BundleRecipe {
    /// Whether a bundle was requested.
    pub fn is_requested(&self) -> bool {
        self.output_dir.is_some()
    }
}

/// Collects build settings, then validates them in one step.
///
/// Setters never fail except where a setting may only be given once;
/// [`RecipeBuilder::build`] reports everything else.
#[derive(Debug, Default, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct RecipeBuilder {
    output: Option<(OutputKind, String)>,
    input: Option<PathBuf>,
    cpu_target: Option<String>,
    trim_mode: Option<String>,
    add_ccallables: bool,
    extra_args: Vec<String>,
    project: Option<PathBuf>,
    verbose: bool,
    use_loaded_runtime: bool,
    c_sources: Vec<PathBuf>,
    cflags: Vec<String>,
    extra_objects: Vec<PathBuf>,
    link_flags: Vec<String>,
    rpath: Option<String>,
    bundle: Option<Option<PathBuf>>,
    libdir: Option<String>,
    privatize: bool,
    assets: Vec<PathBuf>,
    work_dir: Option<PathBuf>,
}

impl RecipeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose the output kind and name.
    ///
    /// # Errors
    ///
    /// Fails if an output kind was already chosen.
    pub fn output(&mut self, kind: OutputKind, name: impl Into<String>) -> Result<&mut Self, PipelineError> {
        if let Some((previous, _)) = self.output {
            return Err(PipelineError::config(format!(
                "multiple output types given ({} and {}); choose exactly one",
                previous.flag(),
                kind.flag()
            )));
        }
        self.output = Some((kind, name.into()));
        Ok(self)
    }

    /// Set the program entry file.
    ///
    /// # Errors
    ///
    /// Fails if an input was already given.
    pub fn input(&mut self, file: impl Into<PathBuf>) -> Result<&mut Self, PipelineError> {
        let file = file.into();
        if let Some(ref previous) = self.input {
            return Err(PipelineError::config(format!(
                "unexpected argument '{}': input file already given as '{}'",
                file.display(),
                previous.display()
            )));
        }
        self.input = Some(file);
        Ok(self)
    }

    pub fn cpu_target(&mut self, cpu: impl Into<String>) -> &mut Self {
        self.cpu_target = Some(cpu.into());
        self
    }

    pub fn trim(&mut self, mode: impl Into<String>) -> &mut Self {
        self.trim_mode = Some(mode.into());
        self
    }

    pub fn compile_ccallable(&mut self, enable: bool) -> &mut Self {
        self.add_ccallables = enable;
        self
    }

    /// Forward an argument to the image compiler front-end.
    pub fn frontend_arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.extra_args.push(arg.into());
        self
    }

    pub fn project(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.project = Some(path.into());
        self
    }

    pub fn verbose(&mut self, enable: bool) -> &mut Self {
        self.verbose = enable;
        self
    }

    pub fn use_loaded_runtime(&mut self, enable: bool) -> &mut Self {
        self.use_loaded_runtime = enable;
        self
    }

    pub fn c_source(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.c_sources.push(path.into());
        self
    }

    pub fn cflag(&mut self, flag: impl Into<String>) -> &mut Self {
        self.cflags.push(flag.into());
        self
    }

    pub fn extra_object(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.extra_objects.push(path.into());
        self
    }

    pub fn link_flag(&mut self, flag: impl Into<String>) -> &mut Self {
        self.link_flags.push(flag.into());
        self
    }

    /// Override the artifact's relative library directory.
    pub fn rpath(&mut self, relative_libdir: impl Into<String>) -> &mut Self {
        self.rpath = Some(relative_libdir.into());
        self
    }

    /// Request a bundle, optionally into an explicit directory.
    pub fn bundle(&mut self, dir: Option<PathBuf>) -> &mut Self {
        self.bundle = Some(dir);
        self
    }

    /// Override the bundle's library directory name.
    pub fn libdir(&mut self, name: impl Into<String>) -> &mut Self {
        self.libdir = Some(name.into());
        self
    }

    pub fn privatize(&mut self, enable: bool) -> &mut Self {
        self.privatize = enable;
        self
    }

    pub fn asset(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.assets.push(path.into());
        self
    }

    /// Scratch directory for the intermediate image (default: system temp dir).
    pub fn work_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Validate the collected settings and produce the recipe chain.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] for a missing output or input,
    /// a path given to `--output-exe`, `--privatize` without `--bundle`,
    /// auxiliary sources or objects on an archive output, or an output
    /// extension the chosen kind does not allow.
    pub fn build(self, platform: PlatformFamily) -> Result<BundleRecipe, PipelineError> {
        let Some((kind, name)) = self.output else {
            let flags: Vec<_> = OutputKind::ALL.iter().map(|k| k.flag()).collect();
            return Err(PipelineError::config(format!(
                "no output given; use one of {}",
                flags.join(", ")
            )));
        };
        let Some(file) = self.input else {
            return Err(PipelineError::config("missing input file"));
        };

        if kind == OutputKind::Executable {
            check_bare_name(&name)?;
        } else if name.is_empty() {
            return Err(PipelineError::config(format!(
                "{} expects a non-empty name",
                kind.flag()
            )));
        }

        let outname = normalize_output_path(platform, kind, Path::new(&name))?;

        if self.privatize && self.bundle.is_none() {
            return Err(PipelineError::config("--privatize requires --bundle"));
        }

        if kind.is_archive() && !(self.c_sources.is_empty() && self.extra_objects.is_empty()) {
            return Err(PipelineError::config(format!(
                "{} output is final after the compile step; --c-source and --object need a linked output",
                kind.flag()
            )));
        }

        let img_path = if kind.is_archive() {
            outname.clone()
        } else {
            let stem = file
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|s| !s.is_empty())
                .unwrap_or("image");
            self.work_dir
                .unwrap_or_else(std::env::temp_dir)
                .join(format!("{stem}.a"))
        };

        let libdir = self
            .libdir
            .unwrap_or_else(|| platform.default_bundle_libdir().to_string());

        let output_dir = self.bundle.map(|dir| {
            dir.unwrap_or_else(|| match outname.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            })
        });

        // A bundle puts the artifact in bin/, so its search path must point
        // from there to the bundle's library directory.
        let rpath = match (self.rpath, &output_dir) {
            (Some(rpath), _) => Some(rpath),
            (None, Some(_)) => Some(bundle_relative_libdir(&libdir)),
            (None, None) => None,
        };

        let image = ImageRecipe {
            cpu_target: self.cpu_target,
            output_type: kind,
            trim_mode: self.trim_mode,
            add_ccallables: self.add_ccallables,
            file,
            extra_args: self.extra_args,
            project: self.project,
            img_path,
            verbose: self.verbose,
            use_loaded_runtime: self.use_loaded_runtime,
            c_sources: self.c_sources,
            cflags: self.cflags,
            extra_objects: self.extra_objects,
        };

        Ok(BundleRecipe {
            link: LinkRecipe {
                image,
                outname,
                rpath,
                extra_link_flags: self.link_flags,
            },
            output_dir,
            libdir,
            privatize: self.privatize,
            assets: self.assets,
        })
    }
}

/// `--output-exe` takes a file name only; placement is the bundle's job.
fn check_bare_name(name: &str) -> Result<(), PipelineError> {
    let mut components = Path::new(name).components();
    let bare = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
        && !name.contains(['/', '\\']);
    if bare {
        Ok(())
    } else {
        Err(PipelineError::config(format!(
            "--output-exe expects a name, no path: '{name}'"
        )))
    }
}

/// Library directory as seen from the bundle's `bin` directory.
fn bundle_relative_libdir(libdir: &str) -> String {
    if libdir == "bin" {
        String::new()
    } else {
        format!("../{libdir}")
    }
}
