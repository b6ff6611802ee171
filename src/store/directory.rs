//! One JSON file per document, named by the url-encoded id.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{DocumentSink, DocumentSource, DurabilityLevel, StoreError};

const EXTENSION: &str = ".json";

#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(format!("{}{}", urlencoding::encode(id), EXTENSION)))
    }

    /// All ids currently on disk, sorted by raw bytes. The full listing is
    /// held in memory before the first id is yielded, so memory grows with
    /// the number of documents in the directory.
    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(EXTENSION) else {
                continue;
            };
            match urlencoding::decode(stem) {
                Ok(id) => ids.push(id.into_owned()),
                Err(_) => log::warn!("Skipping undecodable file name in {}", self.root.display()),
            }
        }
        ids.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        Ok(ids)
    }
}

#[async_trait]
impl DocumentSource for DirectoryStore {
    fn scan_ids(&self, after: Option<String>) -> BoxStream<'_, Result<String, StoreError>> {
        async_stream::try_stream! {
            let ids = self.list_ids().await?;
            for id in ids {
                if after.as_ref().is_some_and(|a| id.as_bytes() <= a.as_bytes()) {
                    continue;
                }
                yield id;
            }
        }
        .boxed()
    }

    async fn get(&self, id: &str) -> Result<Bytes, StoreError> {
        let path = self.document_path(id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DocumentSink for DirectoryStore {
    async fn upsert(&self, id: &str, document: Bytes, durability: DurabilityLevel) -> Result<(), StoreError> {
        let path = self.document_path(id)?;
        fs::create_dir_all(&self.root).await?;

        if durability == DurabilityLevel::None {
            fs::write(&path, &document).await?;
            return Ok(());
        }

        let tmp_path = self.root.join(format!(".{}.tmp", Uuid::new_v4()));
        let result = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(&document).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp_path, &path).await
        }
        .await;
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        if durability == DurabilityLevel::PersistToMajority {
            let root = self.root.clone();
            tokio::task::spawn_blocking(move || crate::ops::checkpoint::sync_dir(&root))
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        Ok(())
    }
}
