use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::EtlResult;
use crate::store::checkpoint::{CheckpointStore, CopyCheckpoints, TableCheckpoint};
use crate::types::{LogPosition, TableKey};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CheckpointFile {
    position: LogPosition,
    tables: BTreeMap<String, TableCheckpoint>,
}

impl From<&CheckpointFile> for CopyCheckpoints {
    fn from(file: &CheckpointFile) -> Self {
        CopyCheckpoints {
            position: file.position,
            tables: file
                .tables
                .iter()
                .map(|(name, checkpoint)| (name.clone(), checkpoint.clone()))
                .collect(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    contents: CheckpointFile,
}

/// A [`CheckpointStore`] persisting checkpoints as a JSON file.
///
/// Every write replaces the whole file through a synced temporary file and a rename, followed by
/// a sync of the parent directory. A crash leaves either the previous or the new checkpoints on
/// disk. The in-memory checkpoints only change once the new file is durable.
#[derive(Debug, Clone)]
pub struct FileStore {
    inner: Arc<Mutex<Inner>>,
}

impl FileStore {
    /// Opens the checkpoint file at `path`, starting empty if it doesn't exist.
    pub async fn open(path: impl AsRef<Path>) -> EtlResult<Self> {
        let path = path.as_ref().to_path_buf();

        let contents = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => CheckpointFile::default(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner { path, contents })),
        })
    }

    /// Applies `update` to a copy of the checkpoints and keeps the copy once it is on disk.
    async fn update(&self, update: impl FnOnce(&mut CheckpointFile)) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;

        let mut next = inner.contents.clone();
        update(&mut next);
        Self::persist(&inner.path, &next).await?;
        inner.contents = next;

        Ok(())
    }

    async fn persist(path: &Path, contents: &CheckpointFile) -> EtlResult<()> {
        let bytes = serde_json::to_vec_pretty(contents)?;

        let mut tmp_path = path.to_path_buf().into_os_string();
        tmp_path.push(".tmp");

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, path).await?;
        Self::sync_parent(path).await?;

        debug!(path = %path.display(), "checkpoints persisted");

        Ok(())
    }

    /// Makes the rename durable.
    #[cfg(unix)]
    async fn sync_parent(path: &Path) -> EtlResult<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        tokio::fs::File::open(parent).await?.sync_all().await?;

        Ok(())
    }

    #[cfg(not(unix))]
    async fn sync_parent(_path: &Path) -> EtlResult<()> {
        Ok(())
    }
}

impl CheckpointStore for FileStore {
    async fn load_checkpoints(&self) -> EtlResult<CopyCheckpoints> {
        let inner = self.inner.lock().await;

        Ok((&inner.contents).into())
    }

    async fn store_checkpoint(
        &self,
        table_name: &str,
        last_key: TableKey,
        position: LogPosition,
    ) -> EtlResult<()> {
        self.update(|contents| {
            contents.position = position;
            contents
                .tables
                .entry(table_name.to_string())
                .or_default()
                .last_key = Some(last_key);
        })
        .await
    }

    async fn mark_table_complete(&self, table_name: &str, position: LogPosition) -> EtlResult<()> {
        self.update(|contents| {
            contents.position = position;
            contents
                .tables
                .entry(table_name.to_string())
                .or_default()
                .complete = true;
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{Cell, ColumnType, Field, KeyColumn};

    fn id_key(id: i64) -> TableKey {
        TableKey::new(vec![KeyColumn {
            field: Field::new("id", ColumnType::Int64),
            ordinal: 0,
            value: Cell::I64(id),
        }])
    }

    #[tokio::test]
    async fn checkpoints_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");

        let store = FileStore::open(&path).await.unwrap();
        assert_eq!(
            store.load_checkpoints().await.unwrap(),
            CopyCheckpoints::default()
        );

        store
            .store_checkpoint("orders", id_key(1000), LogPosition::new(42))
            .await
            .unwrap();
        store
            .mark_table_complete("accounts", LogPosition::new(43))
            .await
            .unwrap();

        let reopened = FileStore::open(&path).await.unwrap();
        let checkpoints = reopened.load_checkpoints().await.unwrap();
        assert_eq!(checkpoints.position, LogPosition::new(43));
        assert_eq!(
            checkpoints.tables["orders"],
            TableCheckpoint {
                last_key: Some(id_key(1000)),
                complete: false,
            }
        );
        assert!(checkpoints.tables["accounts"].complete);
        assert!(!dir.path().join("checkpoints.json.tmp").exists());
    }

    #[tokio::test]
    async fn failed_write_keeps_the_previous_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints_dir = dir.path().join("checkpoints");
        std::fs::create_dir(&checkpoints_dir).unwrap();
        let path = checkpoints_dir.join("checkpoints.json");

        let store = FileStore::open(&path).await.unwrap();
        store
            .mark_table_complete("accounts", LogPosition::new(7))
            .await
            .unwrap();

        std::fs::remove_dir_all(&checkpoints_dir).unwrap();
        assert!(
            store
                .store_checkpoint("orders", id_key(1000), LogPosition::new(42))
                .await
                .is_err()
        );

        let checkpoints = store.load_checkpoints().await.unwrap();
        assert_eq!(checkpoints.position, LogPosition::new(7));
        assert!(checkpoints.tables["accounts"].complete);
        assert!(!checkpoints.tables.contains_key("orders"));
    }

    #[tokio::test]
    async fn corrupted_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = FileStore::open(&path).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeserializationError);
    }
}
