//! Bundling: lay out a linked artifact with the runtime it needs.
//!
//! # Layout
//!
//! ```text
//! <out>/
//!   bin/<artifact>
//!   <libdir>/              runtime shared libraries and assets
//!   <libdir>/kiln/         runtime-private libraries
//! ```
//!
//! On Windows `<libdir>` defaults to `bin`, giving one flat directory.
//!
//! Files whose bytes already match are never rewritten, so repeated builds
//! leave the bundle untouched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::PipelineError;
use crate::platform::PlatformFamily;
use crate::recipe::BundleRecipe;
use crate::rpath::PRIVATE_LIBDIR;
use crate::runtime::RuntimeDist;

/// Directories of a populated bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    pub root: PathBuf,
    pub bin_dir: PathBuf,
    pub lib_dir: PathBuf,
    pub private_dir: PathBuf,
    /// The artifact's path inside `bin_dir`.
    pub artifact: PathBuf,
}

impl BundleLayout {
    /// Layout rooted at `root` for an artifact named `artifact_name`.
    pub fn new(root: impl Into<PathBuf>, libdir: &str, artifact_name: &Path) -> Self {
        let root = root.into();
        let bin_dir = root.join("bin");
        let lib_dir = root.join(libdir);
        let private_dir = lib_dir.join(PRIVATE_LIBDIR);
        let artifact = bin_dir.join(artifact_name);
        Self {
            root,
            bin_dir,
            lib_dir,
            private_dir,
            artifact,
        }
    }
}

/// Copies an artifact and its runtime into a bundle directory.
pub struct Bundler<'rt> {
    platform: PlatformFamily,
    runtime: &'rt RuntimeDist,
}

impl<'rt> Bundler<'rt> {
    pub fn new(platform: PlatformFamily, runtime: &'rt RuntimeDist) -> Self {
        Self { platform, runtime }
    }

    /// Populate the recipe's bundle directory.
    ///
    /// Returns `Ok(None)` when no bundle was requested.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] for any failed read, copy or directory
    /// creation, and [`PipelineError::Configuration`] if the artifact path has
    /// no file name.
    pub fn bundle(&self, recipe: &BundleRecipe) -> Result<Option<BundleLayout>, PipelineError> {
        let Some(ref root) = recipe.output_dir else {
            return Ok(None);
        };

        let artifact = &recipe.link.outname;
        let Some(artifact_name) = artifact.file_name() else {
            return Err(PipelineError::config(format!(
                "cannot bundle '{}': not a file",
                artifact.display()
            )));
        };

        let layout = BundleLayout::new(root, &recipe.libdir, Path::new(artifact_name));
        info!(bundle = %layout.root.display(), "bundling");

        for dir in [&layout.bin_dir, &layout.lib_dir, &layout.private_dir] {
            fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
        }

        copy_if_changed(artifact, &layout.artifact)?;

        let copied = self.copy_libraries(&self.runtime.shlib_dir(), &layout.lib_dir)?
            + self.copy_libraries(&self.runtime.private_lib_dir(), &layout.private_dir)?;
        debug!(copied, platform = %self.platform, "runtime libraries bundled");

        for asset in &recipe.assets {
            copy_asset(asset, &layout.lib_dir)?;
        }

        Ok(Some(layout))
    }

    /// Copy every shared library in `from` into `to`; returns how many changed.
    fn copy_libraries(&self, from: &Path, to: &Path) -> Result<usize, PipelineError> {
        let mut changed = 0;
        for lib in self.runtime.shared_libraries_in(from)? {
            let Some(name) = lib.file_name() else {
                continue;
            };
            if copy_entry(&lib, &to.join(name))? {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

/// Copy `src` to `dst` unless `dst` already holds the same bytes.
///
/// Copying a file onto itself is a no-op. Returns whether `dst` was written.
pub fn copy_if_changed(src: &Path, dst: &Path) -> Result<bool, PipelineError> {
    if is_same_file(src, dst) {
        return Ok(false);
    }

    let new_bytes = fs::read(src).map_err(|e| PipelineError::io(src, e))?;
    match fs::read(dst) {
        Ok(old_bytes) if old_bytes == new_bytes => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(PipelineError::io(dst, e)),
    }

    // A stale symlink at the destination would redirect the write.
    if fs::symlink_metadata(dst).is_ok_and(|m| m.file_type().is_symlink()) {
        fs::remove_file(dst).map_err(|e| PipelineError::io(dst, e))?;
    }

    fs::copy(src, dst).map_err(|e| PipelineError::io(dst, e))?;
    debug!(from = %src.display(), to = %dst.display(), "copied");
    Ok(true)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Copy a runtime library, recreating symlinks as symlinks where possible.
fn copy_entry(src: &Path, dst: &Path) -> Result<bool, PipelineError> {
    let meta = fs::symlink_metadata(src).map_err(|e| PipelineError::io(src, e))?;
    if meta.file_type().is_symlink() {
        return copy_symlink(src, dst);
    }
    copy_if_changed(src, dst)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<bool, PipelineError> {
    let target = fs::read_link(src).map_err(|e| PipelineError::io(src, e))?;
    match fs::symlink_metadata(dst) {
        Ok(meta) if meta.file_type().is_symlink() => {
            if fs::read_link(dst).is_ok_and(|existing| existing == target) {
                return Ok(false);
            }
            fs::remove_file(dst).map_err(|e| PipelineError::io(dst, e))?;
        }
        Ok(meta) if meta.is_dir() => {
            return Err(PipelineError::io(
                dst,
                io::Error::new(io::ErrorKind::AlreadyExists, "a directory is in the way"),
            ));
        }
        Ok(_) => fs::remove_file(dst).map_err(|e| PipelineError::io(dst, e))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(PipelineError::io(dst, e)),
    }
    std::os::unix::fs::symlink(&target, dst).map_err(|e| PipelineError::io(dst, e))?;
    Ok(true)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<bool, PipelineError> {
    copy_if_changed(src, dst)
}

/// Copy a file or directory tree into `lib_dir`, keeping its own name.
fn copy_asset(asset: &Path, lib_dir: &Path) -> Result<(), PipelineError> {
    let Some(name) = asset.file_name() else {
        return Err(PipelineError::config(format!(
            "asset '{}' has no file name",
            asset.display()
        )));
    };
    let dest_root = lib_dir.join(name);

    for entry in WalkDir::new(asset) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(asset).to_path_buf();
            PipelineError::io(path, io::Error::from(e))
        })?;
        let rel = entry.path().strip_prefix(asset).unwrap_or(Path::new(""));
        let dest = if rel.as_os_str().is_empty() {
            dest_root.clone()
        } else {
            dest_root.join(rel)
        };

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(|e| PipelineError::io(&dest, e))?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
            }
            copy_if_changed(entry.path(), &dest)?;
        }
    }
    Ok(())
}
