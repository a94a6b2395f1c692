//! Durable storage for uploaded photos and videos.

use std::path::PathBuf;

use anyhow::bail;
use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    fn extension(self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Video => "mp4",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, kind: MediaKind) -> anyhow::Result<StoredMedia>;
    /// Removing an asset that is already gone succeeds.
    async fn delete(&self, id: &str) -> anyhow::Result<()>;
    /// Recovers the asset id from a URL this store handed out.
    fn id_of(&self, url: &str) -> Option<String>;
}

/// Keeps media as files in one directory served under `base_url`.
pub struct DiskMediaStore {
    dir: PathBuf,
    base_url: String,
}

impl DiskMediaStore {
    pub async fn new(dir: impl Into<PathBuf>, base_url: &str) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        info!("media directory {}", dir.display());

        Ok(Self {
            dir,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }
}

fn valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        && !id.starts_with('.')
}

#[async_trait]
impl MediaStore for DiskMediaStore {
    async fn upload(&self, bytes: Vec<u8>, kind: MediaKind) -> anyhow::Result<StoredMedia> {
        if bytes.is_empty() {
            bail!("refusing to store an empty upload");
        }
        let id = format!("{}.{}", Uuid::now_v7().simple(), kind.extension());
        tokio::fs::write(self.dir.join(&id), &bytes).await?;
        debug!(id, size = bytes.len(), "stored media");

        Ok(StoredMedia {
            url: format!("{}/{id}", self.base_url),
            id,
        })
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        if !valid_id(id) {
            bail!("invalid media id {id:?}");
        }
        match tokio::fs::remove_file(self.dir.join(id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn id_of(&self, url: &str) -> Option<String> {
        let id = url.strip_prefix(&self.base_url)?.strip_prefix('/')?;
        valid_id(id).then(|| id.to_owned())
    }
}
