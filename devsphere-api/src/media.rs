use devsphere_common::model::{
    media::{MediaKind, file_extension},
    post::StoredMedia,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;

/// Folder inside the store that all uploads land in.
const UPLOAD_FOLDER: &str = "devsphere";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Could not create media directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),
    #[error("Could not write media object {0}: {1}")]
    Write(PathBuf, std::io::Error),
}

/// Object storage on the local file system, published under a public URL prefix.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct MediaStore {
    root: PathBuf,
    public_url: String,
}

impl MediaStore {
    pub fn new(root: PathBuf, public_url: &str) -> Self {
        Self {
            root,
            public_url: public_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn prepare(&self) -> Result<(), MediaError> {
        let folder = self.root.join(UPLOAD_FOLDER);
        fs::create_dir_all(&folder)
            .await
            .map_err(|err| MediaError::CreateDir(folder, err))
    }

    /// Stores `bytes` under a fresh random key, keeping the extension of `file_name`.
    pub async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<StoredMedia, MediaError> {
        let kind = MediaKind::classify(file_name);

        let key = format!("{:016x}", rand::random::<u64>());
        let object_name = match file_extension(file_name) {
            Some(extension) if extension.chars().all(|c| c.is_ascii_alphanumeric()) => {
                format!("{key}.{extension}")
            }
            _ => key,
        };

        self.prepare().await?;
        let path = self.root.join(UPLOAD_FOLDER).join(&object_name);
        fs::write(&path, bytes)
            .await
            .map_err(|err| MediaError::Write(path, err))?;

        let url = format!("{}/{UPLOAD_FOLDER}/{object_name}", self.public_url);
        info!(%url, %kind, size = bytes.len(), "Stored media");

        Ok(StoredMedia { url, kind })
    }
}
