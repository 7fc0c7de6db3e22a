//! Runtime privatization for bundles.
//!
//! A bundle that ships its own runtime must never bind to a system-wide copy
//! of that runtime, nor be picked up by another program that loads one. The
//! privatizer gives every bundled core library a bundle-specific name and
//! rewrites each binary in the bundle to reference the new names.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                Privatizer                   │
//! │  - plans renames (pure, idempotent)         │
//! │  - moves files, drops stale symlinks        │
//! └──────────────────────┬─────────────────────┘
//!                 ┌──────┴──────┐
//!                 ▼             ▼
//!         ┌─────────────┐ ┌─────────────────┐
//!         │  PatchElf   │ │ InstallNameTool │
//!         │  (ELF)      │ │ (Mach-O)        │
//!         └─────────────┘ └─────────────────┘
//! ```
//!
//! Windows has no loader-level identity to rewrite; privatizing there warns
//! and succeeds without changes.

mod elf;
mod macho;

use elf::PatchElf;
use macho::InstallNameTool;

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::bundle::BundleLayout;
use crate::error::PipelineError;
use crate::platform::PlatformFamily;
use crate::runtime::RuntimeDist;

/// Bundle-specific tag derived from the artifact's file stem.
///
/// Characters other than ASCII alphanumerics, `-` and `_` become `_`.
pub fn privatize_tag(artifact: &Path) -> String {
    let stem = artifact
        .file_stem()
        .map(OsStr::to_string_lossy)
        .unwrap_or_default();
    let tag: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if tag.is_empty() {
        "bundle".to_string()
    } else {
        tag
    }
}

/// One planned library rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub from: PathBuf,
    pub to: PathBuf,
    /// Symlinks pointing at the old name; removed after the rename.
    pub stale_links: Vec<PathBuf>,
}

impl Rename {
    /// File name after the rename.
    pub fn new_name(&self) -> String {
        file_name_of(&self.to)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Plan the renames for `libraries` inside `dirs`.
///
/// Regular files named `lib<stem>.<rest>` become `lib<stem>-<tag>.<rest>`.
/// Files already carrying a tag do not match, so a privatized bundle plans
/// nothing.
///
/// # Errors
///
/// Returns [`PipelineError::Privatization`] if a new name would replace
/// another core library, before anything is renamed.
pub fn plan_renames(
    dirs: &[&Path],
    libraries: &[&str],
    tag: &str,
) -> Result<Vec<Rename>, PipelineError> {
    let mut plan = Vec::new();
    for dir in dirs {
        let mut names = match fs::read_dir(dir) {
            Ok(entries) => entries
                .map(|entry| entry.map(|e| e.file_name()))
                .collect::<Result<Vec<OsString>, io::Error>>()
                .map_err(|e| PipelineError::io(*dir, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(PipelineError::io(*dir, e)),
        };
        names.sort();

        for stem in libraries {
            let prefix = format!("lib{stem}.");
            let mut files = Vec::new();
            let mut links = Vec::new();
            for name in names.iter().filter_map(|n| n.to_str()) {
                let Some(rest) = name.strip_prefix(&prefix) else {
                    continue;
                };
                let path = dir.join(name);
                let meta = fs::symlink_metadata(&path).map_err(|e| PipelineError::io(&path, e))?;
                if meta.file_type().is_symlink() {
                    links.push(path);
                } else if meta.is_file() {
                    files.push((path, dir.join(format!("lib{stem}-{tag}.{rest}"))));
                }
            }

            for (i, (from, to)) in files.into_iter().enumerate() {
                let stale_links = if i == 0 {
                    std::mem::take(&mut links)
                } else {
                    Vec::new()
                };
                plan.push(Rename {
                    from,
                    to,
                    stale_links,
                });
            }
        }
    }
    check_collisions(&plan, libraries)?;
    Ok(plan)
}

/// Refuse a plan whose new name is itself a core library name.
///
/// A tag equal to the suffix of another core library (`internal` turns
/// `libkilnrt.so` into `libkilnrt-internal.so`) would otherwise overwrite
/// that library. Files left by an earlier privatization with the same tag
/// are replaced.
fn check_collisions(plan: &[Rename], libraries: &[&str]) -> Result<(), PipelineError> {
    for rename in plan {
        let new_name = rename.new_name();
        let taken = libraries
            .iter()
            .any(|stem| new_name.starts_with(&format!("lib{stem}.")));
        if taken {
            return Err(PipelineError::Privatization {
                path: rename.to.clone(),
                message: format!(
                    "privatized name of '{}' collides with another runtime library; \
                     rename the artifact",
                    file_name_of(&rename.from)
                ),
            });
        }
    }
    Ok(())
}

/// Platform tool that rewrites library identities and references.
enum Rewriter {
    Elf(PatchElf),
    MachO(InstallNameTool),
}

impl Rewriter {
    /// Current identity of `lib` (soname or install name), if it has one.
    fn identity(&self, lib: &Path) -> Option<String> {
        match self {
            Self::Elf(t) => t.soname(lib),
            Self::MachO(t) => t.install_name(lib),
        }
    }

    fn set_identity(&self, lib: &Path, new_name: &str, private: bool) -> Result<(), PipelineError> {
        match self {
            Self::Elf(t) => t.set_identity(lib, new_name, private),
            Self::MachO(t) => t.set_identity(lib, new_name),
        }
    }

    fn replace_references(
        &self,
        binary: &Path,
        renames: &[(String, String)],
    ) -> Result<(), PipelineError> {
        match self {
            Self::Elf(t) => t.replace_needed(binary, renames),
            Self::MachO(t) => t.change_references(binary, renames),
        }
    }

    fn finish(&self, binary: &Path) -> Result<(), PipelineError> {
        match self {
            Self::Elf(_) => Ok(()),
            Self::MachO(t) => t.resign(binary),
        }
    }
}

/// Rewrites a bundle so its runtime cannot collide with another copy.
pub struct Privatizer {
    platform: PlatformFamily,
    libraries: &'static [&'static str],
    search_path: Option<OsString>,
}

impl Privatizer {
    pub fn new(platform: PlatformFamily, runtime: &RuntimeDist) -> Self {
        Self {
            platform,
            libraries: runtime.core_libraries(),
            search_path: std::env::var_os("PATH"),
        }
    }

    /// Replace the `PATH` value used to find the platform tools.
    #[must_use]
    pub fn with_search_path(mut self, path: Option<OsString>) -> Self {
        self.search_path = path;
        self
    }

    /// Privatize the runtime inside `layout` using `tag`.
    ///
    /// Returns the renames performed; empty when the bundle was already
    /// privatized or the platform has nothing to rewrite.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Privatization`] if a required tool is missing
    /// or a rewrite fails.
    pub fn privatize(&self, layout: &BundleLayout, tag: &str) -> Result<Vec<Rename>, PipelineError> {
        if self.platform == PlatformFamily::Windows {
            warn!("privatization is not supported on windows; bundle left unchanged");
            return Ok(Vec::new());
        }

        let plan = plan_renames(
            &[layout.lib_dir.as_path(), layout.private_dir.as_path()],
            self.libraries,
            tag,
        )?;
        if plan.is_empty() {
            info!(bundle = %layout.root.display(), "runtime already privatized");
            return Ok(plan);
        }

        let rewriter = self.rewriter(layout)?;
        let mut pairs = Vec::with_capacity(plan.len());
        for rename in &plan {
            let old_name = rewriter
                .identity(&rename.from)
                .unwrap_or_else(|| file_name_of(&rename.from));
            let new_name = rename.new_name();

            fs::rename(&rename.from, &rename.to).map_err(|e| PipelineError::io(&rename.from, e))?;
            for link in &rename.stale_links {
                match fs::remove_file(link) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(PipelineError::io(link, e)),
                }
            }

            let private = rename.to.parent() == Some(layout.private_dir.as_path());
            rewriter.set_identity(&rename.to, &new_name, private)?;
            debug!(%old_name, %new_name, "renamed runtime library");
            pairs.push((old_name, new_name));
        }

        for binary in self.bundle_binaries(layout)? {
            rewriter.replace_references(&binary, &pairs)?;
            rewriter.finish(&binary)?;
        }

        info!(renamed = plan.len(), %tag, "privatized bundled runtime");
        Ok(plan)
    }

    fn rewriter(&self, layout: &BundleLayout) -> Result<Rewriter, PipelineError> {
        match self.platform {
            PlatformFamily::Elf => {
                let patchelf = self.require_tool("patchelf", layout)?;
                Ok(Rewriter::Elf(PatchElf::new(patchelf)))
            }
            PlatformFamily::Darwin => {
                let otool = self.require_tool("otool", layout)?;
                let install_name_tool = self.require_tool("install_name_tool", layout)?;
                let codesign = self.find_tool("codesign");
                Ok(Rewriter::MachO(InstallNameTool::new(otool, install_name_tool, codesign)))
            }
            PlatformFamily::Windows => Err(PipelineError::Privatization {
                path: layout.root.clone(),
                message: "no library rewriter for windows".to_string(),
            }),
        }
    }

    fn find_tool(&self, name: &str) -> Option<PathBuf> {
        let paths = self.search_path.as_ref()?;
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        which::which_in(name, Some(paths), cwd).ok()
    }

    fn require_tool(&self, name: &str, layout: &BundleLayout) -> Result<PathBuf, PipelineError> {
        self.find_tool(name).ok_or_else(|| PipelineError::Privatization {
            path: layout.root.clone(),
            message: format!("required tool '{name}' not found on PATH"),
        })
    }

    /// The artifact plus every shared library in the bundle.
    fn bundle_binaries(&self, layout: &BundleLayout) -> Result<Vec<PathBuf>, PipelineError> {
        let mut binaries = vec![layout.artifact.clone()];
        for dir in [&layout.lib_dir, &layout.private_dir] {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(PipelineError::io(dir, e)),
            };
            let mut libs = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
                let path = entry.path();
                let is_lib = path
                    .file_name()
                    .and_then(OsStr::to_str)
                    .is_some_and(|n| self.platform.is_shared_lib_name(n));
                let is_file = fs::symlink_metadata(&path).is_ok_and(|m| m.is_file());
                if is_lib && is_file && path != layout.artifact {
                    libs.push(path);
                }
            }
            libs.sort();
            binaries.extend(libs);
        }
        Ok(binaries)
    }
}

/// Wrap a tool failure as a privatization error on `path`.
fn rewrite_failed(path: &Path, err: &PipelineError) -> PipelineError {
    PipelineError::Privatization {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
