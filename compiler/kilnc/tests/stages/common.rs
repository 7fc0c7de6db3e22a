//! Shared fixtures: fake runtime trees and tool scripts.

use std::fs;
use std::path::{Path, PathBuf};

use kiln_aot::{PlatformFamily, RuntimeDist};

/// Argument vector from string literals.
pub fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

/// A minimal ELF runtime distribution under `root`.
pub fn fake_runtime(root: &Path) -> RuntimeDist {
    let lib = root.join("lib");
    fs::create_dir_all(lib.join("kiln")).unwrap();
    fs::create_dir_all(root.join("include")).unwrap();
    fs::write(lib.join("libkilnrt.so"), "kilnrt").unwrap();
    fs::write(lib.join("libkilnrt-internal.so"), "internal").unwrap();
    fs::write(lib.join("kiln/libgmp.so.10"), "gmp").unwrap();
    RuntimeDist::new(root, PlatformFamily::Elf)
}

/// Write an executable shell script.
pub fn script(path: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
    path.to_path_buf()
}

/// A tool that writes a file after `-o`, `--output-o` or `--output-bc` and
/// appends its arguments to `log`.
pub fn fake_tool(path: &Path, log: &Path) -> PathBuf {
    script(
        path,
        &format!(
            r#"echo "$(basename "$0") $@" >> '{}'
prev=""
for arg in "$@"; do
    case "$prev" in
        -o|--output-o|--output-bc) printf 'built' > "$arg" ;;
    esac
    prev="$arg"
done
"#,
            log.display()
        ),
    )
}
