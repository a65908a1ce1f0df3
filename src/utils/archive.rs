/// Zip archives of backup directories

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Compress `src` into a zip file at `dst` and return the archive size.
///
/// Entries are stored relative to `src`. The parent of `dst` is created when
/// missing. Runs on the blocking pool so the caller's task is not stalled by
/// compression.
pub async fn zip_dir<P: Into<PathBuf>, Q: Into<PathBuf>>(src: P, dst: Q) -> Result<u64> {
    let (src, dst) = (src.into(), dst.into());
    tokio::task::spawn_blocking(move || zip_dir_blocking(&src, &dst))
        .await
        .context("Zip task was aborted")?
}

fn zip_dir_blocking(src: &Path, dst: &Path) -> Result<u64> {
    if !src.is_dir() {
        bail!("{} is not a directory", src.display());
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let file = File::create(dst)
        .with_context(|| format!("Failed to create archive {}", dst.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
        let path = entry.path();
        if path == dst {
            continue;
        }
        let name = entry_name(path.strip_prefix(src)?);

        if entry.file_type().is_dir() {
            writer
                .add_directory(format!("{}/", name), options)
                .with_context(|| format!("Failed to add directory {}", name))?;
        } else if path.is_file() {
            // Symlinks to files are stored by content
            let len = fs::metadata(path)
                .with_context(|| format!("Failed to stat {}", path.display()))?
                .len();
            writer
                .start_file(name.clone(), options.large_file(len >= u32::MAX as u64))
                .with_context(|| format!("Failed to add file {}", name))?;
            let mut input = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            io::copy(&mut input, &mut writer)
                .with_context(|| format!("Failed to compress {}", path.display()))?;
        } else {
            tracing::debug!(path = %path.display(), "skipping non-regular entry");
        }
    }

    writer
        .finish()
        .with_context(|| format!("Failed to finish archive {}", dst.display()))?;

    let size = fs::metadata(dst)
        .with_context(|| format!("Failed to stat archive {}", dst.display()))?
        .len();
    Ok(size)
}

/// Zip entry names always use `/`, whatever the host separator
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_zip_dir_keeps_relative_layout() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("g1_v1");
        fs::create_dir_all(src.join("app_s1")).unwrap();
        fs::write(src.join("region_apps_metadata.json"), b"[]").unwrap();
        fs::write(src.join("app_s1/slug_20240101.tgz"), vec![7u8; 4096]).unwrap();

        let dst = dir.path().join("g1_v1.zip");
        let size = zip_dir(&src, &dst).await.unwrap();
        assert!(size > 0);
        assert_eq!(size, fs::metadata(&dst).unwrap().len());

        let archive = zip::ZipArchive::new(File::open(&dst).unwrap()).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(
            names,
            vec!["app_s1/", "app_s1/slug_20240101.tgz", "region_apps_metadata.json"]
        );
    }

    #[tokio::test]
    async fn test_zip_dir_creates_parent_of_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("volume");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("db.sqlite"), b"rows").unwrap();

        let dst = dir.path().join("backup/data_s1/data.zip");
        zip_dir(&src, &dst).await.unwrap();
        assert!(dst.exists());
    }

    #[tokio::test]
    async fn test_zip_dir_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let result = zip_dir(dir.path().join("missing"), dir.path().join("out.zip")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_zip_dir_skips_archive_inside_source() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("volume");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.txt"), b"a").unwrap();

        let dst = src.join("self.zip");
        zip_dir(&src, &dst).await.unwrap();

        let archive = zip::ZipArchive::new(File::open(&dst).unwrap()).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert_eq!(names, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_zip_dir_handles_files_over_4gib() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("g1_v1");
        fs::create_dir_all(src.join("app_s1")).unwrap();
        let tar = File::create(src.join("app_s1/image_b1.tar")).unwrap();
        // Sparse: takes no disk space but reports the full length
        tar.set_len(u32::MAX as u64 + 100 * 1024 * 1024).unwrap();
        drop(tar);

        let dst = dir.path().join("g1_v1.zip");
        zip_dir(&src, &dst).await.unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&dst).unwrap()).unwrap();
        let entry = archive.by_name("app_s1/image_b1.tar").unwrap();
        assert_eq!(entry.size(), u32::MAX as u64 + 100 * 1024 * 1024);
    }
}
