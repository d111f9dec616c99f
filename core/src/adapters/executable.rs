//! Locating CLI tools on disk.

use std::path::{Path, PathBuf};

/// Default paths to search for kubectl.
pub const KUBECTL_PATHS: &[&str] = &[
    "/opt/homebrew/bin/kubectl", // Apple Silicon
    "/usr/local/bin/kubectl",    // Intel Mac / Homebrew
    "/usr/bin/kubectl",          // System
];

/// Default paths to search for a container CLI.
pub const CONTAINER_CLI_PATHS: &[&str] = &[
    "/opt/homebrew/bin/docker",
    "/usr/local/bin/docker",
    "/usr/bin/docker",
    "/opt/homebrew/bin/podman",
    "/usr/bin/podman",
];

/// Finds the first existing path in `paths`.
pub fn find_executable(paths: &[&str]) -> Option<PathBuf> {
    paths.iter().map(PathBuf::from).find(|p| p.exists())
}

/// Searches each `PATH` entry for `name`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_file(candidate))
}

/// Resolution order: explicit override, well-known paths, then `PATH`
/// for each of `names`.
pub fn locate(explicit: Option<&Path>, known: &[&str], names: &[&str]) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    find_executable(known).or_else(|| names.iter().find_map(|name| find_in_path(name)))
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_executable() {
        // Test with a path that should exist on most systems
        let result = find_executable(&["/nonexistent/path", "/bin/sh"]);
        assert_eq!(result, Some(PathBuf::from("/bin/sh")));

        // Test with a path that shouldn't exist
        let result = find_executable(&["/nonexistent/path"]);
        assert!(result.is_none());
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = PathBuf::from("/custom/kubectl");
        assert_eq!(
            locate(Some(&explicit), KUBECTL_PATHS, &["kubectl"]),
            Some(explicit)
        );
    }

    #[test]
    fn test_unknown_tool_is_not_found() {
        assert!(locate(None, &[], &["definitely-not-a-real-tool-1f3a"]).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_in_path_locates_sh() {
        assert!(find_in_path("sh").is_some());
    }
}
