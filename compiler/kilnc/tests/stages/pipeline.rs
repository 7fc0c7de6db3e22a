//! End-to-end runs with fake front-end, compiler and `patchelf` scripts.

use std::fs;

use kiln_aot::{PipelineError, PlatformFamily, RecipeBuilder, Toolchain};
use kilnc::{parse_args, CliAction, Pipeline};
use pretty_assertions::assert_eq;

use crate::common::{argv, fake_runtime, fake_tool, script};

fn builder(args: &[&str]) -> RecipeBuilder {
    match parse_args(&argv(args)).unwrap() {
        CliAction::Build(request) => request.builder,
        CliAction::Help => panic!("expected a build"),
    }
}

#[test]
fn test_archive_output_stops_after_compile() {
    let tmp = tempfile::tempdir().unwrap();
    let rt = fake_runtime(&tmp.path().join("rt"));
    let log = tmp.path().join("calls.log");
    let frontend = fake_tool(&tmp.path().join("tools/kiln-frontend"), &log);
    let cc = fake_tool(&tmp.path().join("tools/cc"), &log);

    let archive = tmp.path().join("out/main.o.a");
    fs::create_dir_all(archive.parent().unwrap()).unwrap();
    let out = Pipeline::new(PlatformFamily::Elf, &rt)
        .with_frontend(frontend)
        .with_toolchain(Toolchain::new(cc))
        .run(builder(&["--output-o", archive.to_str().unwrap(), "main.kl"]))
        .unwrap();

    assert_eq!(out.artifact, archive);
    assert!(archive.is_file());
    assert!(out.bundle.is_none());
    let calls = fs::read_to_string(&log).unwrap();
    assert_eq!(calls.lines().count(), 1);
    assert!(calls.starts_with("kiln-frontend --output-o"));
}

#[test]
fn test_shared_library_with_bundle() {
    let tmp = tempfile::tempdir().unwrap();
    let rt = fake_runtime(&tmp.path().join("rt"));
    let log = tmp.path().join("calls.log");
    let frontend = fake_tool(&tmp.path().join("tools/kiln-frontend"), &log);
    let cc = fake_tool(&tmp.path().join("tools/cc"), &log);

    let lib = tmp.path().join("build/libfoo");
    let dist = tmp.path().join("dist");
    let out = Pipeline::new(PlatformFamily::Elf, &rt)
        .with_frontend(frontend)
        .with_toolchain(Toolchain::new(cc))
        .run(builder(&[
            "--output-lib",
            lib.to_str().unwrap(),
            "--c-source",
            "glue.c",
            "--bundle",
            dist.to_str().unwrap(),
            "main.kl",
        ]))
        .unwrap();

    assert_eq!(out.artifact, tmp.path().join("build/libfoo.so"));
    let layout = out.bundle.unwrap();
    assert_eq!(layout.artifact, dist.join("bin/libfoo.so"));
    assert_eq!(fs::read_to_string(&layout.artifact).unwrap(), "built");
    assert!(dist.join("lib/libkilnrt.so").is_file());
    assert!(dist.join("lib/kiln/libgmp.so.10").is_file());
    assert!(out.renames.is_empty());

    let calls = fs::read_to_string(&log).unwrap();
    let calls: Vec<&str> = calls.lines().collect();
    assert_eq!(calls.len(), 3);
    assert!(calls[0].starts_with("kiln-frontend "));
    assert!(calls[1].starts_with("cc -c "));
    assert!(calls[1].contains("glue.c"));
    assert!(calls[2].contains("-Wl,-rpath,$ORIGIN/../lib"));
    assert!(calls[2].contains("-shared"));
}

#[test]
fn test_privatized_bundle() {
    let tmp = tempfile::tempdir().unwrap();
    let rt = fake_runtime(&tmp.path().join("rt"));
    let log = tmp.path().join("calls.log");
    let frontend = fake_tool(&tmp.path().join("tools/kiln-frontend"), &log);
    let cc = fake_tool(&tmp.path().join("tools/cc"), &log);
    let bin = tmp.path().join("bin");
    script(&bin.join("patchelf"), "exit 0\n");

    let dist = tmp.path().join("dist");
    let lib = tmp.path().join("libfoo.so");
    let out = Pipeline::new(PlatformFamily::Elf, &rt)
        .with_frontend(frontend)
        .with_toolchain(Toolchain::new(cc))
        .with_tool_path(bin.into_os_string())
        .run(builder(&[
            "--output-lib",
            lib.to_str().unwrap(),
            "--bundle",
            dist.to_str().unwrap(),
            "--privatize",
            "main.kl",
        ]))
        .unwrap();

    assert_eq!(out.renames.len(), 2);
    assert!(dist.join("lib/libkilnrt-libfoo.so").is_file());
    assert!(dist.join("lib/libkilnrt-internal-libfoo.so").is_file());
    assert!(!dist.join("lib/libkilnrt.so").exists());
}

#[test]
fn test_frontend_failure_aborts() {
    let tmp = tempfile::tempdir().unwrap();
    let rt = fake_runtime(&tmp.path().join("rt"));
    let frontend = script(
        &tmp.path().join("tools/kiln-frontend"),
        "echo 'main.kl:3: undefined name' >&2\nexit 2\n",
    );
    let lib = tmp.path().join("libfoo");

    let err = Pipeline::new(PlatformFamily::Elf, &rt)
        .with_frontend(frontend)
        .with_toolchain(Toolchain::new("cc"))
        .run(builder(&["--output-lib", lib.to_str().unwrap(), "main.kl"]))
        .unwrap_err();
    match err {
        PipelineError::Execution {
            exit_code, stderr, ..
        } => {
            assert_eq!(exit_code, Some(2));
            assert!(stderr.contains("undefined name"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!tmp.path().join("libfoo.so").exists());
}

#[test]
fn test_configuration_error_before_any_stage() {
    let tmp = tempfile::tempdir().unwrap();
    let rt = fake_runtime(&tmp.path().join("rt"));
    let err = Pipeline::new(PlatformFamily::Elf, &rt)
        .with_frontend(tmp.path().join("missing-frontend"))
        .run(builder(&["--output-exe", "app", "--privatize", "main.kl"]))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
}

#[test]
fn test_configuration_error_leaves_no_scratch_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let rt = fake_runtime(&tmp.path().join("rt"));
    let scratch = tmp.path().join("scratch");
    fs::create_dir_all(&scratch).unwrap();

    let err = Pipeline::new(PlatformFamily::Elf, &rt)
        .with_scratch_root(&scratch)
        .run(builder(&["--output-lib", "libfoo.dylib", "main.kl"]))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
}

#[test]
fn test_scratch_dir_removed_after_link() {
    let tmp = tempfile::tempdir().unwrap();
    let rt = fake_runtime(&tmp.path().join("rt"));
    let log = tmp.path().join("calls.log");
    let frontend = fake_tool(&tmp.path().join("tools/kiln-frontend"), &log);
    let cc = fake_tool(&tmp.path().join("tools/cc"), &log);
    let scratch = tmp.path().join("scratch");
    fs::create_dir_all(&scratch).unwrap();

    let lib = tmp.path().join("build/libfoo");
    let out = Pipeline::new(PlatformFamily::Elf, &rt)
        .with_frontend(frontend)
        .with_toolchain(Toolchain::new(cc))
        .with_scratch_root(&scratch)
        .run(builder(&["--output-lib", lib.to_str().unwrap(), "main.kl"]))
        .unwrap();

    assert!(out.artifact.is_file());
    let calls = fs::read_to_string(&log).unwrap();
    assert!(calls.contains(scratch.to_str().unwrap()));
    assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
}

#[test]
fn test_archive_output_with_aux_source_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let rt = fake_runtime(&tmp.path().join("rt"));
    let log = tmp.path().join("calls.log");
    let frontend = fake_tool(&tmp.path().join("tools/kiln-frontend"), &log);
    let cc = fake_tool(&tmp.path().join("tools/cc"), &log);

    let archive = tmp.path().join("main.o");
    let err = Pipeline::new(PlatformFamily::Elf, &rt)
        .with_frontend(frontend)
        .with_toolchain(Toolchain::new(cc))
        .run(builder(&[
            "--output-o",
            archive.to_str().unwrap(),
            "--c-source",
            "main.c",
            "main.kl",
        ]))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert!(!archive.exists());
    assert!(!log.exists());
}
