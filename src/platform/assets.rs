//! Named file storage for image and document replies

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("invalid asset key: {0:?}")]
    InvalidKey(String),
    #[error("read asset {key}: {source}")]
    Io {
        key: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub bytes: Vec<u8>,
    pub mime: String,
}

#[async_trait]
pub trait Assets: Send + Sync {
    async fn load(&self, key: &str) -> Result<Asset, AssetError>;
}

/// Assets read from a directory; keys are relative paths inside it
#[derive(Debug, Clone)]
pub struct FsAssets {
    root: PathBuf,
}

impl FsAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, AssetError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(AssetError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Assets for FsAssets {
    async fn load(&self, key: &str) -> Result<Asset, AssetError> {
        let path = self.resolve(key)?;
        let bytes = tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                AssetError::NotFound(key.to_string())
            } else {
                AssetError::Io {
                    key: key.to_string(),
                    source,
                }
            }
        })?;
        let mime = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string();
        tracing::debug!(key, size = bytes.len(), mime = %mime, "Loaded asset");
        Ok(Asset { bytes, mime })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_with_mime() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("img")).unwrap();
        std::fs::write(dir.path().join("img/cat.png"), b"png").unwrap();

        let assets = FsAssets::new(dir.path());
        let asset = assets.load("img/cat.png").await.unwrap();
        assert_eq!(asset.bytes, b"png");
        assert_eq!(asset.mime, "image/png");
    }

    #[tokio::test]
    async fn test_missing_and_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let assets = FsAssets::new(dir.path());
        assert!(matches!(
            assets.load("nope.txt").await,
            Err(AssetError::NotFound(_))
        ));
        assert!(matches!(
            assets.load("../etc/passwd").await,
            Err(AssetError::InvalidKey(_))
        ));
        assert!(matches!(
            assets.load("/etc/passwd").await,
            Err(AssetError::InvalidKey(_))
        ));
    }
}
