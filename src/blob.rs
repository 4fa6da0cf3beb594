// Blob store for post images and profile photos, kept on local disk and
// served back under `/blobs/`.
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("URL does not belong to this blob store: {0}")]
    ForeignUrl(String),
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    base_url: Url,
}

impl BlobStore {
    /// `public_url` is the server's externally visible base URL.
    pub fn new(root: impl Into<PathBuf>, public_url: &str) -> Result<Self, BlobError> {
        let mut base = public_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?.join("blobs/")?;
        Ok(Self {
            root: root.into(),
            base_url,
        })
    }

    /// Store `data` at `path` (e.g. `posts/<id>.jpg`), replacing any
    /// previous blob, and return its download URL.
    pub async fn upload(&self, path: &str, data: Bytes) -> Result<String, BlobError> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, &data).await?;
        tracing::debug!(path, size = data.len(), "Stored blob");
        self.download_url(path)
    }

    pub fn download_url(&self, path: &str) -> Result<String, BlobError> {
        self.resolve(path)?;
        Ok(self.base_url.join(path)?.to_string())
    }

    pub async fn read(&self, path: &str) -> Result<Option<Bytes>, BlobError> {
        let file = self.resolve(path)?;
        match tokio::fs::read(&file).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the blob a download URL points at. A blob that is already gone
    /// is not an error.
    pub async fn delete_by_url(&self, url: &str) -> Result<(), BlobError> {
        let path = self.path_from_url(url)?;
        let file = self.resolve(&path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path, "Blob already deleted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path_from_url(&self, url: &str) -> Result<String, BlobError> {
        let parsed = Url::parse(url)?;
        parsed
            .as_str()
            .strip_prefix(self.base_url.as_str())
            .map(str::to_string)
            .ok_or_else(|| BlobError::ForeignUrl(url.to_string()))
    }

    // Paths are relative and may not climb out of the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        let valid = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(tmp: &tempfile::TempDir) -> BlobStore {
        BlobStore::new(tmp.path(), "http://localhost:3000").unwrap()
    }

    #[tokio::test]
    async fn upload_returns_download_url_and_read_finds_it() {
        let tmp = tempfile::tempdir().unwrap();
        let blobs = store(&tmp);

        let url = blobs
            .upload("posts/p1.jpg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:3000/blobs/posts/p1.jpg");

        let data = blobs.read("posts/p1.jpg").await.unwrap().unwrap();
        assert_eq!(&data[..], b"jpeg");
    }

    #[tokio::test]
    async fn delete_by_url_removes_blob_and_tolerates_repeat() {
        let tmp = tempfile::tempdir().unwrap();
        let blobs = store(&tmp);
        let url = blobs
            .upload("profilePictures/u1.jpg", Bytes::from_static(b"x"))
            .await
            .unwrap();

        blobs.delete_by_url(&url).await.unwrap();
        assert!(blobs.read("profilePictures/u1.jpg").await.unwrap().is_none());
        blobs.delete_by_url(&url).await.unwrap();
    }

    #[tokio::test]
    async fn foreign_urls_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let blobs = store(&tmp);
        let err = blobs
            .delete_by_url("https://elsewhere.example.com/blobs/posts/p1.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::ForeignUrl(_)));
    }

    #[test]
    fn traversal_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let blobs = store(&tmp);
        assert!(matches!(
            blobs.download_url("../etc/passwd"),
            Err(BlobError::InvalidPath(_))
        ));
        assert!(matches!(
            blobs.download_url("/abs"),
            Err(BlobError::InvalidPath(_))
        ));
        assert!(matches!(blobs.download_url(""), Err(BlobError::InvalidPath(_))));
    }

    #[test]
    fn base_url_with_path_prefix_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(tmp.path(), "https://example.com/api/").unwrap();
        assert_eq!(
            blobs.download_url("posts/a.jpg").unwrap(),
            "https://example.com/api/blobs/posts/a.jpg"
        );
        assert_eq!(
            blobs
                .path_from_url("https://example.com/api/blobs/posts/a.jpg")
                .unwrap(),
            "posts/a.jpg"
        );
    }
}
