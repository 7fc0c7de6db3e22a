use std::path::PathBuf;

use kiln_aot::{OutputKind, PipelineError, PlatformFamily};
use kilnc::{parse_args, BuildRequest, CliAction, USAGE};
use pretty_assertions::assert_eq;

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

fn build(args: &[&str]) -> BuildRequest {
    match parse_args(&argv(args)).unwrap() {
        CliAction::Build(request) => *request,
        CliAction::Help => panic!("expected a build for {args:?}"),
    }
}

fn config_error(args: &[&str]) -> String {
    let err = match parse_args(&argv(args)) {
        Ok(CliAction::Build(request)) => request.builder.build(PlatformFamily::Elf).unwrap_err(),
        Ok(CliAction::Help) => panic!("expected an error for {args:?}"),
        Err(e) => e,
    };
    match err {
        PipelineError::Configuration(msg) => msg,
        other => panic!("expected a configuration error, got {other}"),
    }
}

#[test]
fn test_no_args_is_help() {
    assert!(matches!(parse_args(&[]).unwrap(), CliAction::Help));
}

#[test]
fn test_help_flags() {
    for flag in ["-h", "--help"] {
        let action = parse_args(&argv(&["--output-exe", "app", flag, "main.kl"])).unwrap();
        assert!(matches!(action, CliAction::Help));
    }
    assert!(USAGE.starts_with("Usage: kiln [options] <input>"));
}

#[test]
fn test_output_exe() {
    let request = build(&["--output-exe", "app", "main.kl"]);
    assert!(!request.verbose);
    let recipe = request.builder.build(PlatformFamily::Elf).unwrap();
    assert_eq!(recipe.link.image.output_type, OutputKind::Executable);
    assert_eq!(recipe.link.outname, PathBuf::from("app"));
    assert_eq!(recipe.link.image.file, PathBuf::from("main.kl"));
    assert_eq!(recipe.output_dir, None);
}

#[test]
fn test_output_exe_rejects_paths() {
    let msg = config_error(&["--output-exe", "sub/dir/app", "main.kl"]);
    assert!(msg.contains("expects a name, no path"), "{msg}");
}

#[test]
fn test_inline_values() {
    let recipe = build(&[
        "--output-lib=libfoo",
        "--cpu-target=native",
        "--trim=unsafe-warn",
        "--project=proj",
        "main.kl",
    ])
    .builder
    .build(PlatformFamily::Elf)
    .unwrap();
    assert_eq!(recipe.link.outname, PathBuf::from("libfoo.so"));
    assert_eq!(recipe.link.image.cpu_target.as_deref(), Some("native"));
    assert_eq!(recipe.link.image.trim_mode.as_deref(), Some("unsafe-warn"));
    assert_eq!(recipe.link.image.project, Some(PathBuf::from("proj")));
}

#[test]
fn test_optional_value_defaults() {
    let recipe = build(&["--output-lib", "libfoo", "--trim", "--project", "main.kl"])
        .builder
        .build(PlatformFamily::Elf)
        .unwrap();
    assert_eq!(recipe.link.image.trim_mode.as_deref(), Some("safe"));
    assert_eq!(recipe.link.image.project, Some(PathBuf::from(".")));
}

#[test]
fn test_switches() {
    let request = build(&[
        "--output-sysimage",
        "sys",
        "--compile-ccallable",
        "--experimental",
        "--use-loaded-runtime",
        "--verbose",
        "main.kl",
    ]);
    assert!(request.verbose);
    let image = request.builder.build(PlatformFamily::Darwin).unwrap().link.image;
    assert!(image.add_ccallables);
    assert!(image.use_loaded_runtime);
    assert!(image.verbose);
    assert_eq!(image.extra_args, vec!["--experimental".to_string()]);
}

#[test]
fn test_repeatable_options() {
    let recipe = build(&[
        "--output-lib",
        "libfoo",
        "--c-source",
        "a.c",
        "--c-source",
        "b.cpp",
        "--cflag",
        "-O2",
        "--object",
        "x.o",
        "--link-flag",
        "-Wl,--as-needed",
        "--bundle",
        "dist",
        "--asset",
        "share",
        "main.kl",
    ])
    .builder
    .build(PlatformFamily::Elf)
    .unwrap();
    let image = &recipe.link.image;
    assert_eq!(image.c_sources, vec![PathBuf::from("a.c"), PathBuf::from("b.cpp")]);
    assert_eq!(image.cflags, vec!["-O2".to_string()]);
    assert_eq!(image.extra_objects, vec![PathBuf::from("x.o")]);
    assert_eq!(recipe.link.extra_link_flags, vec!["-Wl,--as-needed".to_string()]);
    assert_eq!(recipe.assets, vec![PathBuf::from("share")]);
}

#[test]
fn test_bundle_takes_directory() {
    let recipe = build(&["--output-exe", "app", "--bundle", "dist", "main.kl"])
        .builder
        .build(PlatformFamily::Elf)
        .unwrap();
    assert_eq!(recipe.output_dir, Some(PathBuf::from("dist")));
    assert_eq!(recipe.link.rpath.as_deref(), Some("../lib"));
}

#[test]
fn test_bundle_leaves_input_alone() {
    let recipe = build(&["--output-exe", "app", "--bundle", "main.kl"])
        .builder
        .build(PlatformFamily::Elf)
        .unwrap();
    assert_eq!(recipe.output_dir, Some(PathBuf::from(".")));
    assert_eq!(recipe.link.image.file, PathBuf::from("main.kl"));
}

#[test]
fn test_bundle_before_option() {
    let recipe = build(&["--bundle", "--privatize", "--output-exe", "app", "main.kl"])
        .builder
        .build(PlatformFamily::Elf)
        .unwrap();
    assert_eq!(recipe.output_dir, Some(PathBuf::from(".")));
    assert!(recipe.privatize);
}

#[test]
fn test_bundle_inline_directory() {
    let recipe = build(&["--output-exe", "app", "--bundle=out/dist", "main.kl"])
        .builder
        .build(PlatformFamily::Windows)
        .unwrap();
    assert_eq!(recipe.output_dir, Some(PathBuf::from("out/dist")));
    assert_eq!(recipe.libdir, "bin");
    assert_eq!(recipe.link.outname, PathBuf::from("app.exe"));
}

#[test]
fn test_privatize_requires_bundle() {
    let msg = config_error(&["--output-exe", "app", "--privatize", "main.kl"]);
    assert_eq!(msg, "--privatize requires --bundle");
}

#[test]
fn test_multiple_outputs_rejected() {
    let msg = config_error(&["--output-exe", "app", "--output-lib", "libfoo", "main.kl"]);
    assert!(msg.contains("multiple output types"), "{msg}");
}

#[test]
fn test_missing_output() {
    let msg = config_error(&["main.kl"]);
    assert!(msg.starts_with("no output given"), "{msg}");
}

#[test]
fn test_missing_input() {
    let msg = config_error(&["--output-exe", "app"]);
    assert_eq!(msg, "missing input file");
}

#[test]
fn test_extra_positional() {
    let msg = config_error(&["--output-exe", "app", "main.kl", "other.kl"]);
    assert!(msg.contains("unexpected argument 'other.kl'"), "{msg}");
}

#[test]
fn test_unknown_option() {
    let msg = config_error(&["--output-exe", "app", "--frobnicate", "main.kl"]);
    assert_eq!(msg, "unknown option '--frobnicate'");
}

#[test]
fn test_missing_value() {
    let msg = config_error(&["main.kl", "--output-lib"]);
    assert_eq!(msg, "option '--output-lib' requires a value");
}

#[test]
fn test_switch_with_value() {
    let msg = config_error(&["--output-exe", "app", "--verbose=yes", "main.kl"]);
    assert_eq!(msg, "option '--verbose' does not take a value");
}
