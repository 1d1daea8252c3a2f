//! Resolution of report file paths to project resources.

use std::path::{Path, PathBuf};

/// Maps a path string found in a report to a stable project file key.
/// `None` means the file is unknown to the project; the caller counts it and
/// skips the block, it is not an error.
pub trait ResourceResolver {
    fn resolve(&self, path: &str) -> Option<String>;
}

/// Resolves report paths against a project base directory. Relative paths are
/// joined to the base directory and the file must exist on disk; the key is
/// the canonical absolute path, so the same file reported under different
/// spellings merges into one aggregate.
#[derive(Debug, Clone)]
pub struct ProjectResolver {
    base_dir: PathBuf,
}

impl ProjectResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        ProjectResolver {
            base_dir: base_dir.into(),
        }
    }
}

impl ResourceResolver for ProjectResolver {
    fn resolve(&self, path: &str) -> Option<String> {
        let candidate = Path::new(path);
        let full = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base_dir.join(candidate)
        };
        let canonical = std::fs::canonicalize(full).ok()?;
        canonical
            .is_file()
            .then(|| canonical.to_string_lossy().into_owned())
    }
}

/// Accepts every path unchanged. Used when reports are validated without a
/// project to resolve against (`covx check`).
#[derive(Debug, Clone, Copy)]
pub struct AcceptAllResolver;

impl ResourceResolver for AcceptAllResolver {
    fn resolve(&self, path: &str) -> Option<String> {
        Some(path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_resolves_relative_paths_against_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "").unwrap();

        let resolver = ProjectResolver::new(dir.path());
        let key = resolver.resolve("src/lib.rs").expect("file should resolve");
        assert!(key.ends_with("lib.rs"));
        assert!(Path::new(&key).is_absolute());
    }

    #[test]
    fn test_relative_and_absolute_spellings_share_a_key() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.c"), "").unwrap();

        let resolver = ProjectResolver::new(dir.path());
        let relative = resolver.resolve("main.c").unwrap();
        let absolute = resolver
            .resolve(&dir.path().join("main.c").to_string_lossy())
            .unwrap();
        assert_eq!(relative, absolute);
    }

    #[test]
    fn test_missing_file_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ProjectResolver::new(dir.path());
        assert_eq!(resolver.resolve("no/such/file.c"), None);
    }

    #[test]
    fn test_directory_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        let resolver = ProjectResolver::new(dir.path());
        assert_eq!(resolver.resolve("src"), None);
    }

    #[test]
    fn test_accept_all_resolver() {
        assert_eq!(
            AcceptAllResolver.resolve("whatever/path.c"),
            Some("whatever/path.c".to_string())
        );
    }
}
