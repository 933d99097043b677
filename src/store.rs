//! JSON file persistence for the unit cache image and the registration state.
//!
//! Each store owns one file that is always rewritten in full. Writes go to a
//! temporary file in the same directory and are renamed over the target, so a
//! crash never leaves a half-written image behind.

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("IO error on {path}: {message}")]
    Io { path: String, message: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: impl std::fmt::Display) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }

    pub async fn load<T: DeserializeOwned>(&self) -> StoreResult<T> {
        let contents = match fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.display().to_string()));
            }
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_slice(&contents).map_err(|e| {
            StoreError::Deserialization(format!(
                "Failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Loads the stored value; a missing or unreadable file yields the default.
    pub async fn load_or_default<T: DeserializeOwned + Default>(&self) -> T {
        match self.load().await {
            Ok(value) => value,
            Err(StoreError::NotFound(path)) => {
                warn!("{} not found; will create on next save.", path);
                T::default()
            }
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", self.path.display(), e);
                T::default()
            }
        }
    }

    pub async fn save<T: Serialize>(&self, value: &T) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(value).map_err(|e| {
            StoreError::Serialization(format!("Failed to serialize data: {}", e))
        })?;
        self.write_atomically(&json).await
    }

    async fn write_atomically(&self, data: &[u8]) -> StoreResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| self.io_error(format!("Failed to create directory: {}", e)))?;

        let temp_file = NamedTempFile::new_in(&dir)
            .map_err(|e| self.io_error(format!("Failed to create temporary file: {}", e)))?;

        let mut file = fs::File::create(temp_file.path())
            .await
            .map_err(|e| self.io_error(format!("Failed to open temporary file: {}", e)))?;
        file.write_all(data)
            .await
            .map_err(|e| self.io_error(format!("Failed to write file: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| self.io_error(format!("Failed to flush file: {}", e)))?;
        drop(file);

        temp_file
            .persist(&self.path)
            .map_err(|e| self.io_error(format!("Failed to rename file: {}", e)))?;

        Ok(())
    }
}
