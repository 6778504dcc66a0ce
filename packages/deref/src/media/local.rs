//! Local-disk media manager: `<media_dir>/<record id>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{FutureExt, StreamExt};
use shadowfed::{MediaKind, ShadowEmoji, ShadowMediaAttachment};
use tokio::io::AsyncWriteExt;

use super::{DataFn, MediaError, MediaManager, Processing};

/// Size and type of a stored file.
struct Stored {
    path: PathBuf,
    size: u64,
    content_type: Option<String>,
}

pub struct LocalMediaManager {
    dir: PathBuf,
    max_bytes: u64,
}

impl LocalMediaManager {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Open the remote stream and drain it into `path`, enforcing `max_bytes`.
async fn store(data: DataFn, path: PathBuf, max_bytes: u64) -> Result<Stored, MediaError> {
    let mut remote = data().await?;
    if remote.size.is_some_and(|s| s > max_bytes) {
        return Err(MediaError::TooLarge { limit: max_bytes });
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(&path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = remote.stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e.into());
            }
        };
        written += chunk.len() as u64;
        if written > max_bytes {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(MediaError::TooLarge { limit: max_bytes });
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    tracing::debug!("media: stored {written} bytes at {}", path.display());
    Ok(Stored {
        path,
        size: written,
        content_type: remote.content_type,
    })
}

#[async_trait]
impl MediaManager for LocalMediaManager {
    async fn process_media(
        &self,
        data: DataFn,
        mut media: ShadowMediaAttachment,
    ) -> Result<Processing<ShadowMediaAttachment>, MediaError> {
        let path = self.dir.join(&media.id);
        let max = self.max_bytes;
        let id = media.id.clone();
        let fut = async move {
            let stored = store(data, path, max).await?;
            if media.content_type.is_none() {
                media.content_type = stored.content_type;
            }
            if let Some(ct) = &media.content_type {
                media.kind = MediaKind::from_content_type(ct);
            }
            media.file_path = Some(stored.path.to_string_lossy().into_owned());
            media.file_size = stored.size;
            media.cached = true;
            media.updated_at = Utc::now();
            Ok(media)
        }
        .boxed();
        Ok(Processing::new(id, fut))
    }

    async fn process_emoji(
        &self,
        data: DataFn,
        mut emoji: ShadowEmoji,
    ) -> Result<Processing<ShadowEmoji>, MediaError> {
        let path = self.dir.join("emoji").join(&emoji.id);
        let max = self.max_bytes;
        let id = emoji.id.clone();
        let fut = async move {
            let stored = store(data, path, max).await?;
            if emoji.content_type.is_none() {
                emoji.content_type = stored.content_type;
            }
            emoji.file_path = Some(stored.path.to_string_lossy().into_owned());
            emoji.file_size = stored.size;
            emoji.cached = true;
            emoji.updated_at = Utc::now();
            Ok(emoji)
        }
        .boxed();
        Ok(Processing::new(id, fut))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{RemoteMedia, TransportError};
    use bytes::Bytes;

    fn data_fn(chunks: Vec<&'static [u8]>, size: Option<u64>) -> DataFn {
        Box::new(move || {
            async move {
                let stream = futures_util::stream::iter(
                    chunks
                        .into_iter()
                        .map(|c| Ok::<_, TransportError>(Bytes::from_static(c))),
                )
                .boxed();
                Ok(RemoteMedia {
                    stream,
                    size,
                    content_type: Some("image/png".into()),
                })
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn stores_and_marks_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LocalMediaManager::new(dir.path(), 1024);
        let media = ShadowMediaAttachment::new("acc", "https://a.example/m.png");
        let id = media.id.clone();
        let done = mgr
            .process_media(data_fn(vec![b"abc", b"def"], Some(6)), media)
            .await
            .unwrap()
            .load()
            .await
            .unwrap();
        assert!(done.cached);
        assert_eq!(done.file_size, 6);
        assert_eq!(done.kind, MediaKind::Image);
        let bytes = tokio::fs::read(dir.path().join(&id)).await.unwrap();
        assert_eq!(bytes, b"abcdef");
    }

    #[tokio::test]
    async fn declared_size_over_cap_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LocalMediaManager::new(dir.path(), 4);
        let media = ShadowMediaAttachment::new("acc", "https://a.example/m.png");
        let err = mgr
            .process_media(data_fn(vec![b"abcdef"], Some(6)), media)
            .await
            .unwrap()
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::TooLarge { limit: 4 }));
    }

    #[tokio::test]
    async fn undeclared_oversize_stream_is_cut_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LocalMediaManager::new(dir.path(), 4);
        let emoji = ShadowEmoji::new("blob", "a.example", "https://a.example/e/1", "https://a.example/b.png");
        let id = emoji.id.clone();
        let err = mgr
            .process_emoji(data_fn(vec![b"abc", b"def"], None), emoji)
            .await
            .unwrap()
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::TooLarge { .. }));
        assert!(!dir.path().join("emoji").join(id).exists());
    }
}
