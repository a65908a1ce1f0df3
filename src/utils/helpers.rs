/// Filesystem and formatting helpers for the backup worker

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Format bytes to human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Check whether a directory has no entries.
///
/// A path that does not exist or cannot be read counts as empty, so callers
/// can skip it without a separate existence check.
pub async fn dir_is_empty<P: AsRef<Path>>(path: P) -> bool {
    match tokio::fs::read_dir(path.as_ref()).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None) | Err(_)),
        Err(_) => true,
    }
}

/// Create a directory and all of its parents
pub async fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create directory {}", path.display()))
}

/// Create the parent directory of a file path
pub async fn ensure_parent_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    match path.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent).await,
        _ => Ok(()),
    }
}

/// Copy a file, returning the number of bytes copied
pub async fn copy_file<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q) -> Result<u64> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    tokio::fs::copy(src, dst)
        .await
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))
}

/// Strip exactly one trailing `/` from a source directory path
pub fn strip_trailing_separator(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// Append `.zip` to a directory path without touching its extension
pub fn zip_path_for(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_owned();
    name.push(".zip");
    PathBuf::from(name)
}

/// Volume names may contain path separators; archive names must not
pub fn sanitize_volume_name(name: &str) -> String {
    name.replace('/', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
    }

    #[test]
    fn test_strip_trailing_separator() {
        assert_eq!(strip_trailing_separator("/backup/app/"), "/backup/app");
        assert_eq!(strip_trailing_separator("/backup/app"), "/backup/app");
        assert_eq!(strip_trailing_separator("/backup/app//"), "/backup/app/");
        assert_eq!(strip_trailing_separator("/"), "/");
    }

    #[test]
    fn test_zip_path_for() {
        assert_eq!(
            zip_path_for(Path::new("/backup/g1_v1.0")),
            PathBuf::from("/backup/g1_v1.0.zip")
        );
    }

    #[test]
    fn test_sanitize_volume_name() {
        assert_eq!(sanitize_volume_name("/data/mysql"), "datamysql");
        assert_eq!(sanitize_volume_name("logs"), "logs");
    }

    #[tokio::test]
    async fn test_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(dir_is_empty(dir.path()).await);
        assert!(dir_is_empty(dir.path().join("missing")).await);

        std::fs::write(dir.path().join("file"), b"x").unwrap();
        assert!(!dir_is_empty(dir.path()).await);
    }

    #[tokio::test]
    async fn test_copy_file() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.tgz");
        std::fs::write(&src, b"slug-bytes").unwrap();

        let dst = dir.path().join("nested/b.tgz");
        ensure_parent_dir(&dst).await.unwrap();
        assert_eq!(copy_file(&src, &dst).await.unwrap(), 10);
        assert_eq!(std::fs::read(&dst).unwrap().len(), 10);
        assert!(copy_file(dir.path().join("missing"), &dst).await.is_err());
    }
}
