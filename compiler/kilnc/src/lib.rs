//! Kiln build driver.
//!
//! Parses the command line into a [`kiln_aot::RecipeBuilder`] and runs the
//! pipeline stages in order: image compile, link, bundle, privatize.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod args;
pub mod pipeline;

pub use args::{parse_args, BuildRequest, CliAction, USAGE};
pub use pipeline::{run, Pipeline, PipelineOutput};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins when set; otherwise warnings only, or stage progress with
/// `verbose`.
pub fn init_tracing(verbose: bool) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let default = if verbose { "info" } else { "warn" };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .init();
    });
}
