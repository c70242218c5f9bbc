//! Tar archive storage provider.
//!
//! The archive is loaded into memory when opened and rewritten after every
//! mutation. A mutation becomes visible only once its archive is on disk.
//! Suited to small caches that travel as a single file.

use async_trait::async_trait;
use stash_core::{Error, Result, StorageProvider};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// On-disk format, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarZstd,
}

impl ArchiveFormat {
    pub fn from_path(path: &Path) -> Self {
        let name = path.to_string_lossy();
        if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            ArchiveFormat::TarZstd
        } else {
            ArchiveFormat::Tar
        }
    }
}

pub struct ArchiveProvider {
    path: PathBuf,
    format: ArchiveFormat,
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl ArchiveProvider {
    /// Open an archive, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = ArchiveFormat::from_path(&path);
        let files = if path.exists() {
            let file = std::fs::File::open(&path)
                .map_err(|e| Error::storage("open", path.display().to_string(), e))?;
            read_archive(file, format)
                .map_err(|e| Error::storage("open", path.display().to_string(), e))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            format,
            files: RwLock::new(files),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole archive next to the target, then swap it in.
    async fn persist(&self, files: &BTreeMap<String, Vec<u8>>, path: &str) -> Result<()> {
        let bytes =
            write_archive(files, self.format).map_err(|e| Error::storage("archive", path, e))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage("archive", path, e))?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| Error::storage("archive", path, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::storage("archive", path, e))
    }
}

fn read_archive(reader: impl Read, format: ArchiveFormat) -> std::io::Result<BTreeMap<String, Vec<u8>>> {
    match format {
        ArchiveFormat::Tar => read_entries(tar::Archive::new(reader)),
        ArchiveFormat::TarZstd => {
            let decoder = zstd::stream::read::Decoder::new(reader)?;
            read_entries(tar::Archive::new(decoder))
        }
    }
}

fn read_entries<R: Read>(mut archive: tar::Archive<R>) -> std::io::Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.to_string_lossy().into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        files.insert(name, data);
    }
    Ok(files)
}

fn write_archive(files: &BTreeMap<String, Vec<u8>>, format: ArchiveFormat) -> std::io::Result<Vec<u8>> {
    match format {
        ArchiveFormat::Tar => write_entries(Vec::new(), files),
        ArchiveFormat::TarZstd => {
            let encoder = zstd::stream::write::Encoder::new(Vec::new(), 3)?;
            write_entries(encoder, files)?.finish()
        }
    }
}

fn write_entries<W: Write>(writer: W, files: &BTreeMap<String, Vec<u8>>) -> std::io::Result<W> {
    let mut builder = tar::Builder::new(writer);
    let mtime = chrono::Utc::now().timestamp().max(0) as u64;
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        builder.append_data(&mut header, name, data.as_slice())?;
    }
    builder.into_inner()
}

#[async_trait]
impl StorageProvider for ArchiveProvider {
    fn name(&self) -> &str {
        "archive"
    }

    async fn save(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let mut files = self.files.write().await;
        let mut next = files.clone();
        next.insert(path.to_string(), bytes.to_vec());
        self.persist(&next, path).await?;
        *files = next;
        Ok(())
    }

    async fn save_if_absent(&self, path: &str, bytes: &[u8]) -> Result<bool> {
        let mut files = self.files.write().await;
        if files.contains_key(path) {
            return Ok(false);
        }
        let mut next = files.clone();
        next.insert(path.to_string(), bytes.to_vec());
        self.persist(&next, path).await?;
        *files = next;
        Ok(true)
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.files.read().await.get(path).cloned())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.read().await.contains_key(path))
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let mut files = self.files.write().await;
        if !files.contains_key(path) {
            return Ok(false);
        }
        let mut next = files.clone();
        next.remove(path);
        self.persist(&next, path).await?;
        *files = next;
        Ok(true)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .files
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
