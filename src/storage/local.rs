// src/storage/local.rs

//! Local filesystem document store.
//!
//! Each collection is a directory holding one JSON document per record.
//! Documents are cached in memory and written through atomically on every
//! mutation.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── channels/{code}.json
//! ├── headlines/{hash}.json
//! └── readers/{id}.json
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{Channel, Headline, Reader};
use crate::storage::{ChannelFilter, DocumentStore, HeadlineQuery, ReaderFilter, ScheduleUpdate};

const CHANNELS: &str = "channels";
const HEADLINES: &str = "headlines";
const READERS: &str = "readers";

#[derive(Debug, Default)]
struct Collections {
    channels: HashMap<String, Channel>,
    headlines: HashMap<String, Headline>,
    readers: HashMap<String, Reader>,
}

/// Local filesystem storage backend.
pub struct LocalStore {
    root_dir: PathBuf,
    state: RwLock<Collections>,
}

impl LocalStore {
    /// Open (or create) a store rooted at the given directory.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        for collection in [CHANNELS, HEADLINES, READERS] {
            tokio::fs::create_dir_all(root_dir.join(collection)).await?;
        }

        let channels: Vec<Channel> = read_collection(&root_dir.join(CHANNELS)).await?;
        let headlines: Vec<Headline> = read_collection(&root_dir.join(HEADLINES)).await?;
        let readers: Vec<Reader> = read_collection(&root_dir.join(READERS)).await?;

        log::debug!(
            "Opened store at {}: {} channels, {} headlines, {} readers",
            root_dir.display(),
            channels.len(),
            headlines.len(),
            readers.len()
        );

        let state = Collections {
            channels: channels.into_iter().map(|c| (c.code.clone(), c)).collect(),
            headlines: headlines.into_iter().map(|h| (h.hash.clone(), h)).collect(),
            readers: readers.into_iter().map(|r| (r.id.clone(), r)).collect(),
        };

        Ok(Self {
            root_dir,
            state: RwLock::new(state),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Create or replace a channel document.
    pub async fn put_channel(&self, channel: Channel) -> Result<()> {
        let mut state = self.state.write().await;
        self.write_json(CHANNELS, &channel.code, &channel).await?;
        state.channels.insert(channel.code.clone(), channel);
        Ok(())
    }

    /// Create or replace a reader document.
    pub async fn put_reader(&self, reader: Reader) -> Result<()> {
        let mut state = self.state.write().await;
        self.write_json(READERS, &reader.id, &reader).await?;
        state.readers.insert(reader.id.clone(), reader);
        Ok(())
    }

    pub async fn headline_count(&self) -> usize {
        self.state.read().await.headlines.len()
    }

    /// `(channels, headlines, readers)` document counts.
    pub async fn collection_counts(&self) -> (usize, usize, usize) {
        let state = self.state.read().await;
        (
            state.channels.len(),
            state.headlines.len(),
            state.readers.len(),
        )
    }

    /// Get the document path for a collection key.
    fn path(&self, collection: &str, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(AppError::store(format!("invalid document key '{key}'")));
        }
        Ok(self.root_dir.join(collection).join(format!("{key}.json")))
    }

    /// Write JSON atomically (write to temp, then rename).
    async fn write_json<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        key: &str,
        value: &T,
    ) -> Result<()> {
        let path = self.path(collection, key)?;
        let bytes = serde_json::to_vec_pretty(value)?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Read every `*.json` document in a collection directory.
async fn read_collection<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut documents = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            let bytes = tokio::fs::read(&path).await?;
            let document = serde_json::from_slice(&bytes).map_err(|e| {
                AppError::store(format!("corrupt document {}: {}", path.display(), e))
            })?;
            documents.push(document);
        }
    }
    Ok(documents)
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn find_channels(&self, filter: &ChannelFilter) -> Result<Vec<Channel>> {
        let state = self.state.read().await;
        let mut channels: Vec<Channel> = state
            .channels
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        channels.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(channels)
    }

    async fn channel_names(&self) -> Result<HashMap<String, String>> {
        let state = self.state.read().await;
        Ok(state
            .channels
            .values()
            .map(|c| (c.code.clone(), c.name.clone()))
            .collect())
    }

    async fn mark_channel_processed(
        &self,
        code: &str,
        at: DateTime<Utc>,
        import_count: usize,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let Some(existing) = state.channels.get(code) else {
            log::warn!("Channel {} not found, bookkeeping skipped", code);
            return Ok(());
        };

        let mut updated = existing.clone();
        updated.last_processed = Some(at);
        updated.last_import_count = import_count;
        self.write_json(CHANNELS, code, &updated).await?;
        state.channels.insert(code.to_string(), updated);
        Ok(())
    }

    async fn find_headline(&self, hash: &str) -> Result<Option<Headline>> {
        Ok(self.state.read().await.headlines.get(hash).cloned())
    }

    async fn upsert_headline(&self, headline: &Headline) -> Result<()> {
        let mut state = self.state.write().await;
        self.write_json(HEADLINES, &headline.hash, headline).await?;
        state
            .headlines
            .insert(headline.hash.clone(), headline.clone());
        Ok(())
    }

    async fn find_headlines(&self, query: &HeadlineQuery) -> Result<Vec<Headline>> {
        let state = self.state.read().await;
        Ok(query.apply(state.headlines.values()))
    }

    async fn find_readers(&self, filter: &ReaderFilter) -> Result<Vec<Reader>> {
        let state = self.state.read().await;
        let mut readers: Vec<Reader> = state
            .readers
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        readers.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(readers)
    }

    async fn update_reader_schedule(&self, id: &str, update: ScheduleUpdate) -> Result<()> {
        let mut state = self.state.write().await;
        let existing = state
            .readers
            .get(id)
            .ok_or_else(|| AppError::store(format!("reader {id} not found")))?;

        let mut updated = existing.clone();
        if let Some(at) = update.delivered_at {
            updated.delivered_at = Some(at);
        }
        updated.next_send = update.next_send;
        self.write_json(READERS, id, &updated).await?;
        state.readers.insert(id.to_string(), updated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::{HarvestedItem, Section};

    fn channel(code: &str) -> Channel {
        Channel {
            code: code.to_string(),
            name: format!("{code} news"),
            enabled: true,
            last_processed: None,
            last_import_count: 0,
            sections: vec![Section::adhoc("https://x.example", "a")],
        }
    }

    fn reader(id: &str, email: &str) -> Reader {
        serde_json::from_value(serde_json::json!({"id": id, "email": email})).unwrap()
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        {
            let store = LocalStore::open(dir.path()).await.unwrap();
            store.put_channel(channel("bbc")).await.unwrap();
            store.mark_channel_processed("bbc", now, 5).await.unwrap();

            let item = HarvestedItem {
                title: "Hello".into(),
                link: "https://x.example/a".into(),
                channel: "bbc".into(),
                section: "latest".into(),
                position: 1,
            };
            store
                .upsert_headline(&Headline::from_harvest("abc".into(), &item, now))
                .await
                .unwrap();
        }

        let store = LocalStore::open(dir.path()).await.unwrap();
        let channels = store
            .find_channels(&ChannelFilter::Explicit {
                channels: vec!["bbc".into()],
                sections: vec![],
            })
            .await
            .unwrap();
        assert_eq!(channels[0].last_import_count, 5);
        assert_eq!(channels[0].last_processed, Some(now));
        assert!(store.find_headline("abc").await.unwrap().is_some());
        assert_eq!(store.channel_names().await.unwrap()["bbc"], "bbc news");
    }

    #[tokio::test]
    async fn schedule_update_keeps_delivered_at_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).await.unwrap();
        store.put_reader(reader("r1", "ada@example.com")).await.unwrap();

        let now = Utc::now();
        let next = now + Duration::days(1);
        store
            .update_reader_schedule(
                "r1",
                ScheduleUpdate {
                    delivered_at: Some(now),
                    next_send: Some(next),
                },
            )
            .await
            .unwrap();
        store
            .update_reader_schedule(
                "r1",
                ScheduleUpdate {
                    delivered_at: None,
                    next_send: None,
                },
            )
            .await
            .unwrap();

        let readers = store.find_readers(&ReaderFilter::All).await.unwrap();
        assert_eq!(readers[0].delivered_at, Some(now));
        assert_eq!(readers[0].next_send, None);
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).await.unwrap();
        assert!(store.put_reader(reader("../evil", "x@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn unknown_reader_update_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).await.unwrap();
        let update = ScheduleUpdate {
            delivered_at: None,
            next_send: None,
        };
        assert!(store.update_reader_schedule("ghost", update).await.is_err());
    }
}
