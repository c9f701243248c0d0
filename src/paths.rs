//! Output-root path handling

use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};

/// Join a manifest-relative path under `root`.
///
/// The join is lexical: `.` components are dropped; absolute paths, `..`
/// and NUL bytes are rejected so a manifest entry can never write outside
/// the output root.
pub fn join_under_root(root: &Path, rel: &Path) -> Result<PathBuf> {
    use Component::{CurDir, Normal, ParentDir, Prefix, RootDir};

    if rel.to_string_lossy().contains('\0') {
        bail!("path contains NUL byte");
    }

    let mut joined = root.to_path_buf();
    let mut depth = 0usize;
    for component in rel.components() {
        match component {
            CurDir => {}
            Normal(s) => {
                #[cfg(windows)]
                if s.to_string_lossy().contains(':') {
                    bail!("path component contains colon: {:?}", s);
                }
                joined.push(s);
                depth += 1;
            }
            ParentDir | RootDir | Prefix(_) => {
                bail!("path {:?} contains disallowed component {:?}", rel, component);
            }
        }
    }
    if depth == 0 {
        bail!("path {:?} names no file under the output root", rel);
    }
    Ok(joined)
}

/// Create `path` and its parents if missing.
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.is_dir() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("creating directory {}", path.display()))?;
    }
    Ok(())
}

/// Temporary files are created owner-only; mirrored and harvested output
/// should be readable like any other file.
pub fn make_world_readable(file: &std::fs::File) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o644))
            .context("setting permissions")?;
    }
    #[cfg(not(unix))]
    let _ = file;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn joins_relative_paths() {
        let root = Path::new("/data/out");
        assert_eq!(
            join_under_root(root, Path::new("10/a.tif")).unwrap(),
            PathBuf::from("/data/out/10/a.tif")
        );
        assert_eq!(
            join_under_root(root, Path::new("./001A_05090_131313/./metadata/x")).unwrap(),
            PathBuf::from("/data/out/001A_05090_131313/metadata/x")
        );
    }

    #[test]
    fn rejects_escaping_paths() {
        let root = Path::new("out");
        assert!(join_under_root(root, Path::new("../etc/passwd")).is_err());
        assert!(join_under_root(root, Path::new("a/../../b")).is_err());
        assert!(join_under_root(root, Path::new("/etc/passwd")).is_err());
        assert!(join_under_root(root, Path::new("file\0.tif")).is_err());
        assert!(join_under_root(root, Path::new(".")).is_err());
    }

    #[test]
    fn relative_root_is_kept_as_given() {
        assert_eq!(
            join_under_root(Path::new("."), Path::new("10/a.tif")).unwrap(),
            PathBuf::from("./10/a.tif")
        );
    }

    #[test]
    fn ensure_dir_exists_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("a/b/c");
        ensure_dir_exists(&dir).unwrap();
        ensure_dir_exists(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn ensure_dir_exists_fails_over_a_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("f");
        std::fs::write(&file, b"x").unwrap();
        assert!(ensure_dir_exists(&file.join("sub")).is_err());
    }
}
