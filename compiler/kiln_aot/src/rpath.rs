//! Loader-relative runtime search paths.
//!
//! The artifact finds the runtime through two rpath entries: the public
//! library directory and its `kiln` subdirectory, where runtime-private
//! libraries live one level deeper.

use tracing::warn;

use crate::platform::PlatformFamily;

/// Subdirectory of the library directory holding runtime-private libraries.
pub const PRIVATE_LIBDIR: &str = "kiln";

/// Library directory relative to the artifact when none was requested.
#[must_use]
pub fn default_relative_libdir(platform: PlatformFamily) -> String {
    match platform {
        PlatformFamily::Windows => String::new(),
        PlatformFamily::Elf | PlatformFamily::Darwin => "../lib".to_string(),
    }
}

/// Linker flags embedding the runtime search paths for `relative_libdir`.
///
/// Always two flags on ELF and Mach-O, differing only by the trailing
/// [`PRIVATE_LIBDIR`]. Windows has no loader-relative search path and gets an
/// empty list plus a warning.
#[must_use]
pub fn resolve_rpath(platform: PlatformFamily, relative_libdir: &str) -> Vec<String> {
    let Some(token) = platform.rpath_token() else {
        warn!(%platform, "runtime search paths are not supported; the artifact must find its libraries on its own");
        return Vec::new();
    };

    let dir = relative_libdir.trim_end_matches('/');
    let base = if dir.is_empty() {
        token.to_string()
    } else {
        format!("{token}/{dir}")
    };

    vec![
        format!("-Wl,-rpath,{base}"),
        format!("-Wl,-rpath,{base}/{PRIVATE_LIBDIR}"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_relative_libdir() {
        assert_eq!(default_relative_libdir(PlatformFamily::Elf), "../lib");
        assert_eq!(default_relative_libdir(PlatformFamily::Darwin), "../lib");
        assert_eq!(default_relative_libdir(PlatformFamily::Windows), "");
    }

    #[test]
    fn test_resolve_rpath_elf() {
        assert_eq!(
            resolve_rpath(PlatformFamily::Elf, "../lib"),
            vec!["-Wl,-rpath,$ORIGIN/../lib", "-Wl,-rpath,$ORIGIN/../lib/kiln"]
        );
    }

    #[test]
    fn test_resolve_rpath_darwin() {
        assert_eq!(
            resolve_rpath(PlatformFamily::Darwin, "../lib"),
            vec![
                "-Wl,-rpath,@loader_path/../lib",
                "-Wl,-rpath,@loader_path/../lib/kiln"
            ]
        );
    }

    #[test]
    fn test_resolve_rpath_empty_dir() {
        assert_eq!(
            resolve_rpath(PlatformFamily::Elf, ""),
            vec!["-Wl,-rpath,$ORIGIN", "-Wl,-rpath,$ORIGIN/kiln"]
        );
    }

    #[test]
    fn test_resolve_rpath_trailing_slash() {
        assert_eq!(
            resolve_rpath(PlatformFamily::Elf, "../vendor/"),
            resolve_rpath(PlatformFamily::Elf, "../vendor")
        );
    }

    #[test]
    fn test_resolve_rpath_windows_is_empty() {
        assert!(resolve_rpath(PlatformFamily::Windows, "../lib").is_empty());
        assert!(resolve_rpath(PlatformFamily::Windows, "").is_empty());
    }

    #[test]
    fn test_resolve_rpath_is_deterministic() {
        for platform in [PlatformFamily::Elf, PlatformFamily::Darwin] {
            let first = resolve_rpath(platform, "../runtime");
            let second = resolve_rpath(platform, "../runtime");
            assert_eq!(first, second);
            assert_eq!(first.len(), 2);
            assert_eq!(format!("{}/{PRIVATE_LIBDIR}", first[0]), first[1]);
        }
    }
}
