//! Platform families and the decisions that differ between them.
//!
//! Every operation in the pipeline has up to three divergent branches
//! (ELF, Mach-O, Windows). Those branches live here as methods on
//! [`PlatformFamily`] instead of being scattered `cfg!` checks, so each family
//! can be exercised from tests on any host.

use std::fmt;

/// Platform family the artifact is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformFamily {
    /// Linux and the BSDs: `.so`, `$ORIGIN`, `patchelf`.
    Elf,
    /// macOS: `.dylib`, `@loader_path`, `install_name_tool`.
    Darwin,
    /// Windows: `.dll`/`.exe`, no loader-relative search paths.
    Windows,
}

impl PlatformFamily {
    /// The family of the running host.
    #[must_use]
    pub const fn host() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Elf
        }
    }

    /// Shared-library extension, without the leading dot.
    #[must_use]
    pub const fn shared_lib_ext(self) -> &'static str {
        match self {
            Self::Elf => "so",
            Self::Darwin => "dylib",
            Self::Windows => "dll",
        }
    }

    /// Mandatory executable extension, if the family has one.
    #[must_use]
    pub const fn exe_ext(self) -> Option<&'static str> {
        match self {
            Self::Windows => Some("exe"),
            Self::Elf | Self::Darwin => None,
        }
    }

    /// Loader token that expands to the directory of the loading image.
    #[must_use]
    pub const fn rpath_token(self) -> Option<&'static str> {
        match self {
            Self::Elf => Some("$ORIGIN"),
            Self::Darwin => Some("@loader_path"),
            Self::Windows => None,
        }
    }

    /// Linker flags entering and leaving whole-archive mode.
    ///
    /// ld64 ignores `-noall_load`, so on Darwin the bracket never closes and
    /// `-all_load` covers every static archive after it. The runtime libraries
    /// that follow are dylibs, which `-all_load` does not touch.
    #[must_use]
    pub const fn whole_archive_flags(self) -> (&'static str, &'static str) {
        match self {
            Self::Darwin => ("-Wl,-all_load", "-Wl,-noall_load"),
            Self::Elf | Self::Windows => ("-Wl,--whole-archive", "-Wl,--no-whole-archive"),
        }
    }

    /// Default name of the bundle's library directory.
    ///
    /// Windows resolves DLLs next to the executable, so binaries and libraries
    /// share one flat `bin` directory there.
    #[must_use]
    pub const fn default_bundle_libdir(self) -> &'static str {
        match self {
            Self::Windows => "bin",
            Self::Elf | Self::Darwin => "lib",
        }
    }

    /// Runtime directory holding the shared libraries the loader needs.
    #[must_use]
    pub const fn runtime_shlib_dir(self) -> &'static str {
        match self {
            Self::Windows => "bin",
            Self::Elf | Self::Darwin => "lib",
        }
    }

    /// Whether code must be built position-independent explicitly.
    #[must_use]
    pub const fn needs_pic(self) -> bool {
        !matches!(self, Self::Windows)
    }

    /// Whether `file_name` looks like a shared library of this family.
    ///
    /// ELF libraries carry version suffixes after the extension
    /// (`libkilnrt.so.1.2`), so any `.so` component counts.
    #[must_use]
    pub fn is_shared_lib_name(self, file_name: &str) -> bool {
        match self {
            Self::Elf => file_name.ends_with(".so") || file_name.contains(".so."),
            Self::Darwin => file_name.ends_with(".dylib"),
            Self::Windows => {
                let lower = file_name.to_ascii_lowercase();
                lower.ends_with(".dll")
            }
        }
    }

    /// Append the family's executable suffix to a program name.
    #[must_use]
    pub fn exe_name(self, name: &str) -> String {
        match self.exe_ext() {
            Some(ext) => format!("{name}.{ext}"),
            None => name.to_string(),
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Elf => "elf",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        };
        f.write_str(name)
    }
}
