//! Command-line parsing.
//!
//! Hand-rolled: every option maps onto one [`RecipeBuilder`] setter, and the
//! builder performs all cross-option validation.

use std::path::PathBuf;

use kiln_aot::{OutputKind, PipelineError, RecipeBuilder};

/// Usage text printed for `-h`/`--help` and for an empty command line.
pub const USAGE: &str = "\
Usage: kiln [options] <input>

Output (exactly one):
  --output-exe <name>       Standalone executable (name only, no path)
  --output-lib <name>       Shared library
  --output-sysimage <name>  Precompiled runtime image
  --output-o <name>         Object archive (compile step only)
  --output-bc <name>        Bitcode archive (compile step only)

Compilation:
  --project[=<path>]        Project root (default: .)
  --trim[=<mode>]           Trim unreachable code (default mode: safe)
  --compile-ccallable       Export callable entry points
  --experimental            Enable experimental front-end features
  --cpu-target=<cpu>        Target CPU
  --use-loaded-runtime      Reuse the loaded runtime image
  --c-source <file>         Compile and link an auxiliary C/C++ source
  --cflag <flag>            Extra flag for auxiliary sources and linking
  --object <file>           Extra object linked with the image

Linking and bundling:
  --link-flag <flag>        Extra native linker flag
  --bundle [<dir>]          Copy the artifact and its runtime into <dir>
  --privatize               Rename the bundled runtime (requires --bundle)
  --asset <path>            File or directory bundled with the libraries

General:
  --verbose                 Report timing and artifact sizes
  -h, --help                Show this help

Environment:
  KILN_CC                   Compiler command line (skips toolchain search)
  KILN_RUNTIME_DIR          Runtime distribution root
  KILN_FRONTEND             Front-end executable
  RUST_LOG                  Log filter
";

/// What the command line asks for.
#[derive(Debug)]
pub enum CliAction {
    /// Print usage and exit successfully.
    Help,
    /// Run the pipeline.
    Build(Box<BuildRequest>),
}

/// A parsed build invocation.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub builder: RecipeBuilder,
    pub verbose: bool,
}

/// Parse the arguments after the program name.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] for unknown options, missing
/// option values, repeated outputs or extra positional arguments.
pub fn parse_args(args: &[String]) -> Result<CliAction, PipelineError> {
    if args.is_empty() {
        return Ok(CliAction::Help);
    }

    let mut builder = RecipeBuilder::new();
    let mut verbose = false;
    let mut i = 0;

    while i < args.len() {
        let arg = args[i].as_str();
        if arg == "-h" || arg == "--help" {
            return Ok(CliAction::Help);
        }

        if !arg.starts_with('-') {
            builder.input(arg)?;
            i += 1;
            continue;
        }

        let (name, inline) = match arg.split_once('=') {
            Some((name, value)) if name.starts_with("--") => (name, Some(value)),
            _ => (arg, None),
        };

        // Pulls the option's value from `--name=value` or the next argument.
        let mut value = || -> Result<String, PipelineError> {
            if let Some(v) = inline {
                return Ok(v.to_string());
            }
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| PipelineError::config(format!("option '{name}' requires a value")))
        };

        if inline.is_some() && is_switch(name) {
            return Err(PipelineError::config(format!(
                "option '{name}' does not take a value"
            )));
        }

        if let Some(kind) = OutputKind::from_flag(name) {
            let out = value()?;
            builder.output(kind, out)?;
        } else {
            match name {
                "--cpu-target" => {
                    builder.cpu_target(value()?);
                }
                "--c-source" => {
                    builder.c_source(value()?);
                }
                "--cflag" => {
                    builder.cflag(value()?);
                }
                "--object" => {
                    builder.extra_object(value()?);
                }
                "--link-flag" => {
                    builder.link_flag(value()?);
                }
                "--asset" => {
                    builder.asset(value()?);
                }
                "--trim" => {
                    builder.trim(inline.unwrap_or("safe"));
                }
                "--project" => {
                    builder.project(inline.unwrap_or("."));
                }
                "--bundle" => {
                    let dir = match inline {
                        Some(dir) => Some(PathBuf::from(dir)),
                        None => bundle_dir_operand(args, i).map(PathBuf::from),
                    };
                    if dir.is_some() && inline.is_none() {
                        i += 1;
                    }
                    builder.bundle(dir);
                }
                "--compile-ccallable" => {
                    builder.compile_ccallable(true);
                }
                "--experimental" => {
                    builder.frontend_arg("--experimental");
                }
                "--privatize" => {
                    builder.privatize(true);
                }
                "--use-loaded-runtime" => {
                    builder.use_loaded_runtime(true);
                }
                "--verbose" => {
                    verbose = true;
                    builder.verbose(true);
                }
                _ => {
                    return Err(PipelineError::config(format!("unknown option '{arg}'")));
                }
            }
        }
        i += 1;
    }

    Ok(CliAction::Build(Box::new(BuildRequest { builder, verbose })))
}

/// Options that never take a value.
fn is_switch(name: &str) -> bool {
    matches!(
        name,
        "--compile-ccallable" | "--experimental" | "--privatize" | "--use-loaded-runtime" | "--verbose"
    )
}

/// The directory operand of a bare `--bundle` at `index`, if any.
///
/// The following argument is taken unless it looks like an option or is the
/// final argument, which is always the input.
fn bundle_dir_operand(args: &[String], index: usize) -> Option<&str> {
    let next = args.get(index + 1)?;
    if next.starts_with('-') || index + 1 == args.len() - 1 {
        return None;
    }
    Some(next)
}
