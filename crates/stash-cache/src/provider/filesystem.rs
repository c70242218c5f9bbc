//! Local disk storage provider.

use async_trait::async_trait;
use stash_core::{Error, Result, StorageProvider};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Files under a root directory, one file per logical path.
pub struct FilesystemProvider {
    root_dir: PathBuf,
}

impl FilesystemProvider {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn file_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::storage("resolve", path, "path escapes storage root"));
        }
        Ok(self.root_dir.join(relative))
    }

    async fn ensure_parent(&self, path: &str, file_path: &Path) -> Result<()> {
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage("create dir", path, e))?;
        }
        Ok(())
    }

    /// Walk `dir` recursively, collecting root-relative `/`-joined file paths.
    async fn walk(&self, dir: PathBuf, out: &mut Vec<String>) -> Result<()> {
        let mut pending = vec![dir];
        while let Some(dir) = pending.pop() {
            let mut read_dir = match tokio::fs::read_dir(&dir).await {
                Ok(read_dir) => read_dir,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::storage("list", dir.display().to_string(), e)),
            };

            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| Error::storage("list", dir.display().to_string(), e))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| Error::storage("list", entry.path().display().to_string(), e))?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if let Ok(relative) = entry.path().strip_prefix(&self.root_dir) {
                    let logical: Vec<String> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    out.push(logical.join("/"));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for FilesystemProvider {
    fn name(&self) -> &str {
        "local_disk"
    }

    async fn save(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let file_path = self.file_path(path)?;
        self.ensure_parent(path, &file_path).await?;
        tokio::fs::write(&file_path, bytes)
            .await
            .map_err(|e| Error::storage("save", path, e))
    }

    async fn save_if_absent(&self, path: &str, bytes: &[u8]) -> Result<bool> {
        let file_path = self.file_path(path)?;
        self.ensure_parent(path, &file_path).await?;

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(Error::storage("create", path, e)),
        };
        file.write_all(bytes)
            .await
            .map_err(|e| Error::storage("save", path, e))?;
        file.flush()
            .await
            .map_err(|e| Error::storage("save", path, e))?;
        Ok(true)
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let file_path = self.file_path(path)?;
        match tokio::fs::read(&file_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage("read", path, e)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let file_path = self.file_path(path)?;
        match tokio::fs::metadata(&file_path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::storage("exists", path, e)),
        }
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let file_path = self.file_path(path)?;
        match tokio::fs::remove_file(&file_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::storage("delete", path, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Only walk the deepest directory the prefix pins down.
        let start = match prefix.rfind('/') {
            Some(idx) => self.file_path(&prefix[..idx])?,
            None => self.root_dir.clone(),
        };

        let mut paths = vec![];
        self.walk(start, &mut paths).await?;
        paths.retain(|p| p.starts_with(prefix));
        paths.sort();
        Ok(paths)
    }
}

impl Default for FilesystemProvider {
    fn default() -> Self {
        Self::new(PathBuf::from("/tmp/stash"))
    }
}
