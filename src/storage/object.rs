// src/storage/object.rs

//! Local directory object store.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::ObjectStore;

/// Mirrors object keys into a local directory.
#[derive(Debug, Clone)]
pub struct DirObjectStore {
    root_dir: PathBuf,
}

impl DirObjectStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(AppError::object_store(format!("invalid object key '{key}'")));
        }
        Ok(self.root_dir.join(relative))
    }
}

/// `a.jpg` -> `a.jpg.part`, keeping same-stem keys apart.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

#[async_trait]
impl ObjectStore for DirObjectStore {
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = partial_path(&path);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;

        log::debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_object_writes_nested_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirObjectStore::new(dir.path());

        let locator = store
            .put_object("images/m_pic.jpg", b"bytes".to_vec())
            .await
            .unwrap();

        let stored = dir.path().join("images/m_pic.jpg");
        assert_eq!(locator, stored.display().to_string());
        assert_eq!(std::fs::read(stored).unwrap(), b"bytes");
    }

    #[test]
    fn partial_paths_keep_the_extension() {
        assert_eq!(
            partial_path(Path::new("images/a.jpg")),
            PathBuf::from("images/a.jpg.part")
        );
        assert_ne!(
            partial_path(Path::new("images/a.jpg")),
            partial_path(Path::new("images/a.png"))
        );
    }

    #[tokio::test]
    async fn same_stem_keys_upload_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirObjectStore::new(dir.path());

        let (jpg, png) = tokio::join!(
            store.put_object("images/a.jpg", vec![1u8; 64 * 1024]),
            store.put_object("images/a.png", vec![2u8; 64 * 1024]),
        );
        jpg.unwrap();
        png.unwrap();

        assert!(std::fs::read(dir.path().join("images/a.jpg")).unwrap().iter().all(|b| *b == 1));
        assert!(std::fs::read(dir.path().join("images/a.png")).unwrap().iter().all(|b| *b == 2));
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirObjectStore::new(dir.path());
        assert!(store.put_object("../x", Vec::new()).await.is_err());
        assert!(store.put_object("/abs", Vec::new()).await.is_err());
    }
}
