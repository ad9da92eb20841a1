//! Local file inventory and chunked storage access.
//!
//! `contained_files` maps a file name to the version believed to be stored
//! under `storage_path`. Entries are created on first successful local write
//! or first successful chunked pull, and are never deleted; versions only
//! move forward.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::model::FileInfo;

/// Errors local to a single storage operation.
#[derive(Debug)]
pub enum Error {
    /// The named file has no on-disk copy.
    NotFound,
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound,
            kind => Error::Io(kind),
        }
    }
}

/// This replica's local file inventory plus the directory it is backed by.
pub struct Storage {
    storage_path: PathBuf,
    contained_files: Mutex<HashMap<String, u64>>,
}

impl Storage {
    /// Opens (creating if necessary) `storage_path` with an empty inventory.
    ///
    /// Per the spec's resolution of the inventory-persistence open question,
    /// the inventory is never rebuilt by scanning `storage_path` on startup:
    /// a restarted replica rejoins as if it held no data, even though the
    /// bytes on disk persist.
    pub async fn open(storage_path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let storage_path = storage_path.into();
        fs::create_dir_all(&storage_path).await?;
        Ok(Self { storage_path, contained_files: Mutex::new(HashMap::new()) })
    }

    pub fn root(&self) -> &Path {
        &self.storage_path
    }

    pub fn local_path(&self, name: &str) -> PathBuf {
        self.storage_path.join(name)
    }

    /// Returns the stored version, or `0` if `name` is unknown locally.
    pub async fn get_version(&self, name: &str) -> u64 {
        self.contained_files.lock().await.get(name).copied().unwrap_or(0)
    }

    /// Sets the inventory entry for `name` to `version` if it is absent or
    /// strictly newer than what is stored; otherwise leaves it unchanged.
    pub async fn update_file_metadata(&self, name: &str, version: u64) {
        let mut files = self.contained_files.lock().await;
        match files.get_mut(name) {
            Some(current) if *current < version => *current = version,
            Some(_) => {}
            None => {
                files.insert(name.to_string(), version);
            }
        }
    }

    /// Snapshot copy of the inventory.
    pub async fn get_all_files(&self) -> Vec<FileInfo> {
        self.contained_files
            .lock()
            .await
            .iter()
            .map(|(name, version)| FileInfo { name: name.clone(), version: *version })
            .collect()
    }

    /// Byte count of `storage_path/name`.
    pub async fn get_file_size(&self, name: &str) -> Result<u64, Error> {
        let metadata = fs::metadata(self.local_path(name)).await?;
        Ok(metadata.len())
    }

    /// Reads up to `size` bytes of `name` starting at `offset`. Returns an
    /// empty vector if `offset` is at or past EOF; returns a short read at
    /// EOF rather than an error.
    pub async fn request_data(&self, name: &str, offset: u64, size: u32) -> Result<Vec<u8>, Error> {
        let mut file = File::open(self.local_path(name)).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; size as usize];
        let mut read = 0usize;
        loop {
            let n = file.read(&mut buf[read..]).await?;
            if n == 0 {
                break;
            }
            read += n;
            if read == buf.len() {
                break;
            }
        }
        buf.truncate(read);
        Ok(buf)
    }

    /// Copies `external_path` (readable on this replica) into
    /// `storage_path/name` as an ordinary filesystem copy, used by
    /// [`crate::replica::Replica::write_file`]. Does not touch the
    /// inventory; callers call [`Storage::update_file_metadata`] themselves.
    pub async fn store_local(&self, name: &str, external_path: impl AsRef<Path>) -> std::io::Result<()> {
        fs::copy(external_path, self.local_path(name)).await?;
        Ok(())
    }

    /// Opens `storage_path/name` for writing from scratch, truncating any
    /// existing content. Used by [`crate::transfer::copy_file`] to begin a
    /// chunked pull.
    pub(crate) async fn create_for_write(&self, name: &str) -> std::io::Result<File> {
        OpenOptions::new().write(true).create(true).truncate(true).open(self.local_path(name)).await
    }

    pub(crate) async fn append_chunk(&self, file: &mut File, chunk: &[u8]) -> std::io::Result<()> {
        file.write_all(chunk).await
    }
}
