//! Kiln AOT pipeline: turn a compiled image into a redistributable artifact.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ ImageRecipe  │───▶│  LinkRecipe  │───▶│ BundleRecipe │───▶│  Privatize   │
//! │ (front-end)  │    │  (cc driver) │    │ (copy tree)  │    │ (rewrite rt) │
//! └──────────────┘    └──────────────┘    └──────────────┘    └──────────────┘
//! ```
//!
//! Each recipe owns the one before it. The stages run strictly in order and
//! every platform-dependent decision goes through [`PlatformFamily`].
//!
//! # Key Components
//!
//! - [`RecipeBuilder`]: collects CLI flags, validates once, yields a [`BundleRecipe`]
//! - [`ImageCompiler`]: runs the runtime's front-end and compiles auxiliary C sources
//! - [`Linker`]: assembles and runs the native link command
//! - [`Bundler`]: lays out `bin/` and the library directory for distribution
//! - [`Privatizer`]: renames the bundled runtime so it cannot collide with a system copy

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod bundle;
pub mod error;
pub mod exec;
pub mod image;
pub mod linker;
pub mod platform;
pub mod privatize;
pub mod recipe;
pub mod rpath;
pub mod runtime;
pub mod toolchain;

pub use bundle::{copy_if_changed, BundleLayout, Bundler};
pub use error::PipelineError;
pub use image::ImageCompiler;
pub use linker::{normalize_output_path, Linker};
pub use platform::PlatformFamily;
pub use privatize::{privatize_tag, Privatizer, Rename};
pub use recipe::{BundleRecipe, ImageRecipe, LinkRecipe, OutputKind, RecipeBuilder};
pub use rpath::{default_relative_libdir, resolve_rpath, PRIVATE_LIBDIR};
pub use runtime::RuntimeDist;
pub use toolchain::{split_command_line, Toolchain, ToolchainLocator};
