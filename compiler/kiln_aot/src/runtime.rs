//! Pre-built Kiln runtime distribution.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   bin/kiln-frontend        image compiler front-end (and DLLs on Windows)
//!   include/                 runtime headers
//!   lib/libkilnrt.*          public runtime libraries (import libs on Windows)
//!   lib/kiln/                runtime-private libraries
//!   libexec/mingw64/bin/     bundled toolchain (Windows only)
//! ```
//!
//! # Discovery
//!
//! Walks up from the current executable, like rustc's sysroot discovery:
//!
//! 1. **Override**: `KILN_RUNTIME_DIR`
//! 2. **Installed layout**: `<exe>/..` (`/usr/local/bin/kiln` → `/usr/local`)
//! 3. **Flat layout**: `<exe_dir>` itself
//!
//! The result is resolved once per process through [`RuntimeDist::global`].

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::debug;

use crate::error::PipelineError;
use crate::platform::PlatformFamily;
use crate::rpath::PRIVATE_LIBDIR;

/// Environment variable overriding runtime discovery.
pub const RUNTIME_DIR_ENV: &str = "KILN_RUNTIME_DIR";

/// Runtime core libraries, in link order.
const CORE_LIBRARIES: [&str; 2] = ["kilnrt", "kilnrt-internal"];

/// Debug-build counterparts of [`CORE_LIBRARIES`].
const CORE_LIBRARIES_DEBUG: [&str; 2] = ["kilnrt-debug", "kilnrt-internal-debug"];

static GLOBAL: OnceLock<RuntimeDist> = OnceLock::new();

/// A runtime distribution rooted at one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDist {
    root: PathBuf,
    platform: PlatformFamily,
    debug_build: bool,
}

impl RuntimeDist {
    /// Describe the distribution at `root`, detecting whether it is a debug build.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, platform: PlatformFamily) -> Self {
        let root = root.into();
        let lib_dir = root.join("lib");
        let debug_build = !has_core_library(&lib_dir, CORE_LIBRARIES[0])
            && has_core_library(&lib_dir, CORE_LIBRARIES_DEBUG[0]);
        Self {
            root,
            platform,
            debug_build,
        }
    }

    /// Force the debug-build flag.
    #[must_use]
    pub fn with_debug_build(mut self, debug_build: bool) -> Self {
        self.debug_build = debug_build;
        self
    }

    /// The host's runtime distribution, detected on first use.
    pub fn global() -> Result<&'static Self, PipelineError> {
        if let Some(dist) = GLOBAL.get() {
            return Ok(dist);
        }
        let dist = Self::detect(PlatformFamily::host())?;
        Ok(GLOBAL.get_or_init(|| dist))
    }

    /// Locate the runtime distribution for `platform`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::RuntimeNotFound`] listing every directory tried.
    pub fn detect(platform: PlatformFamily) -> Result<Self, PipelineError> {
        let mut searched = Vec::new();

        if let Some(dir) = std::env::var_os(RUNTIME_DIR_ENV) {
            let root = PathBuf::from(dir);
            if Self::looks_like_root(&root, platform) {
                return Ok(Self::new(root, platform));
            }
            searched.push(root);
        }

        if let Ok(exe_path) = std::env::current_exe() {
            let exe_path = exe_path.canonicalize().unwrap_or(exe_path);
            if let Some(exe_dir) = exe_path.parent() {
                // bin/kiln -> <root>
                if let Some(root) = exe_dir.parent() {
                    if Self::looks_like_root(root, platform) {
                        return Ok(Self::new(root, platform));
                    }
                    searched.push(root.to_path_buf());
                }
                if Self::looks_like_root(exe_dir, platform) {
                    return Ok(Self::new(exe_dir, platform));
                }
                searched.push(exe_dir.to_path_buf());
            }
        }

        Err(PipelineError::RuntimeNotFound { searched })
    }

    fn looks_like_root(root: &Path, platform: PlatformFamily) -> bool {
        let found = has_core_library(&root.join("lib"), CORE_LIBRARIES[0])
            || has_core_library(&root.join("lib"), CORE_LIBRARIES_DEBUG[0])
            || has_core_library(&root.join(platform.runtime_shlib_dir()), CORE_LIBRARIES[0]);
        debug!(root = %root.display(), found, "probing runtime root");
        found
    }

    /// Root directory of the distribution.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Platform family the distribution was built for.
    pub fn platform(&self) -> PlatformFamily {
        self.platform
    }

    /// Whether this is a debug build of the runtime.
    pub fn is_debug_build(&self) -> bool {
        self.debug_build
    }

    /// Directory holding executables.
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Directory holding the runtime headers.
    pub fn include_dir(&self) -> PathBuf {
        self.root.join("include")
    }

    /// Directory the linker searches for the runtime libraries.
    pub fn link_lib_dir(&self) -> PathBuf {
        self.root.join("lib")
    }

    /// Directory holding runtime-private libraries.
    pub fn private_lib_dir(&self) -> PathBuf {
        self.link_lib_dir().join(PRIVATE_LIBDIR)
    }

    /// Directory holding the shared libraries the loader resolves.
    pub fn shlib_dir(&self) -> PathBuf {
        self.root.join(self.platform.runtime_shlib_dir())
    }

    /// Path to the image compiler front-end.
    pub fn frontend(&self) -> PathBuf {
        self.bin_dir().join(self.platform.exe_name("kiln-frontend"))
    }

    /// Bin directory of the toolchain shipped with the runtime.
    ///
    /// Only meaningful on Windows, where no system toolchain is assumed.
    pub fn bundled_toolchain_dir(&self) -> PathBuf {
        let flavor = if cfg!(target_pointer_width = "64") {
            "mingw64"
        } else {
            "mingw32"
        };
        self.root.join("libexec").join(flavor).join("bin")
    }

    /// Core library names (without `lib` prefix), in link order.
    pub fn core_libraries(&self) -> &'static [&'static str] {
        if self.debug_build {
            &CORE_LIBRARIES_DEBUG
        } else {
            &CORE_LIBRARIES
        }
    }

    /// `-l` flags for the runtime core libraries.
    pub fn link_libraries(&self) -> Vec<String> {
        self.core_libraries()
            .iter()
            .map(|name| format!("-l{name}"))
            .collect()
    }

    /// Compiler flags needed to build against the runtime.
    ///
    /// Framework linking and rpath injection are never emitted here: the
    /// linker computes search paths itself from the recipe.
    pub fn compile_flags(&self) -> Vec<String> {
        let mut flags = vec![format!("-I{}", self.include_dir().display())];
        if self.platform.needs_pic() {
            flags.push("-fPIC".to_string());
        }
        flags
    }

    /// Library search flags for the runtime's public and private directories.
    pub fn link_search_flags(&self) -> Vec<String> {
        vec![
            format!("-L{}", self.link_lib_dir().display()),
            format!("-L{}", self.private_lib_dir().display()),
        ]
    }

    /// Shared libraries in `dir` that belong in a bundle.
    ///
    /// Returns an empty list when `dir` does not exist.
    pub fn shared_libraries_in(&self, dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PipelineError::io(dir, e)),
        };

        let mut libs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
            let path = entry.path();
            let is_lib = path
                .file_name()
                .and_then(OsStr::to_str)
                .is_some_and(|name| self.platform.is_shared_lib_name(name));
            // Directories named like libraries (rare, but seen with frameworks) are skipped.
            if is_lib && !path.is_dir() {
                libs.push(path);
            }
        }
        libs.sort();
        Ok(libs)
    }
}

/// Whether `dir` holds any file for core library `name` (`lib<name>.*`).
fn has_core_library(dir: &Path, name: &str) -> bool {
    let prefix = format!("lib{name}.");
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.filter_map(Result::ok).any(|entry| {
        entry
            .file_name()
            .to_str()
            .is_some_and(|file| file.starts_with(&prefix))
    })
}
