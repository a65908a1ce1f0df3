/// Persisted backup status records
///
/// The API creates a record when a backup is requested; the worker updates
/// its status, location, location kind and size when the run ends.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub backup_id: String,
    pub status: String,
    /// Archive location, local path or remote object path
    pub source_dir: String,
    /// Location kind of `source_dir`
    pub source_type: String,
    pub backup_size: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BackupRecord {
    pub fn new(backup_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            backup_id: backup_id.into(),
            status: status.into(),
            source_dir: String::new(),
            source_type: String::new(),
            backup_size: 0,
            updated_at: None,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackupStatusStore: Send + Sync {
    async fn get(&self, backup_id: &str) -> Result<BackupRecord>;
    async fn update(&self, record: &BackupRecord) -> Result<()>;
}

/// Status store keeping one JSON file per backup
#[derive(Debug, Clone)]
pub struct FileStatusStore {
    dir: PathBuf,
}

impl FileStatusStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, backup_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", backup_id))
    }

    /// Create a pending record unless one already exists
    pub async fn ensure(&self, backup_id: &str) -> Result<BackupRecord> {
        match self.get(backup_id).await {
            Ok(record) => Ok(record),
            Err(_) => {
                let record = BackupRecord::new(backup_id, "starting");
                self.update(&record).await?;
                Ok(record)
            }
        }
    }
}

#[async_trait]
impl BackupStatusStore for FileStatusStore {
    async fn get(&self, backup_id: &str) -> Result<BackupRecord> {
        let path = self.record_path(backup_id);
        let contents = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Backup record {} not found", backup_id))?;
        serde_json::from_slice(&contents)
            .with_context(|| format!("Failed to parse backup record {}", path.display()))
    }

    async fn update(&self, record: &BackupRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create status directory {}", self.dir.display()))?;

        let mut record = record.clone();
        record.updated_at = Some(Utc::now());
        let contents = serde_json::to_vec_pretty(&record)?;

        // Write then rename so readers never see a partial record
        let path = self.record_path(&record.backup_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Status store held in memory
    #[derive(Debug, Default)]
    pub struct MemoryStatusStore {
        records: Mutex<HashMap<String, BackupRecord>>,
    }

    impl MemoryStatusStore {
        pub fn with_record(backup_id: &str) -> Self {
            let store = Self::default();
            store
                .records
                .lock()
                .unwrap()
                .insert(backup_id.to_string(), BackupRecord::new(backup_id, "starting"));
            store
        }

        pub fn record(&self, backup_id: &str) -> Option<BackupRecord> {
            self.records.lock().unwrap().get(backup_id).cloned()
        }
    }

    #[async_trait]
    impl BackupStatusStore for MemoryStatusStore {
        async fn get(&self, backup_id: &str) -> Result<BackupRecord> {
            self.record(backup_id)
                .with_context(|| format!("Backup record {} not found", backup_id))
        }

        async fn update(&self, record: &BackupRecord) -> Result<()> {
            self.records
                .lock()
                .unwrap()
                .insert(record.backup_id.clone(), record.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStatusStore::new(dir.path().join("status"));

        assert!(store.get("b1").await.is_err());

        let mut record = store.ensure("b1").await.unwrap();
        assert_eq!(record.status, "starting");

        record.status = "success".into();
        record.source_dir = "/backup/g1_v1.zip".into();
        record.backup_size = 42;
        store.update(&record).await.unwrap();

        let loaded = store.get("b1").await.unwrap();
        assert_eq!(loaded.status, "success");
        assert_eq!(loaded.backup_size, 42);
        assert!(loaded.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_ensure_keeps_existing_record() {
        let dir = TempDir::new().unwrap();
        let store = FileStatusStore::new(dir.path());

        let mut record = BackupRecord::new("b2", "success");
        record.backup_size = 7;
        store.update(&record).await.unwrap();

        let ensured = store.ensure("b2").await.unwrap();
        assert_eq!(ensured.status, "success");
        assert_eq!(ensured.backup_size, 7);
    }
}
