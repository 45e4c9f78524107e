//! Local filesystem driver
//!
//! Lookups are as case-sensitive as the underlying filesystem. The
//! case-insensitive lookup contract of the public API is not emulated here;
//! deployments that need it should run on a case-insensitive volume.

use crate::{path, ByteStream, Capabilities, Driver, DriverError, Entry, Result, Visitor};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{instrument, warn};

/// Read chunk size for object streams
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// A driver storing entries as plain files below a root directory
#[derive(Clone, Debug)]
pub struct LocalFsDriver {
    root: PathBuf,
}

impl LocalFsDriver {
    /// Open (and create if needed) a store rooted at `root`
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a storage path onto the filesystem. `normalize` drops `..`
    /// segments, so the result always stays below the root.
    fn resolve(&self, path: &str) -> PathBuf {
        let normalized = path::normalize(path);
        let relative = normalized.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    async fn entry_at(&self, display: &str, location: &Path) -> Result<Entry> {
        let meta = fs::metadata(location)
            .await
            .map_err(|e| not_found_or(e, display))?;
        Ok(to_entry(display, &meta))
    }

    async fn ensure_parent(&self, location: &Path) -> Result<()> {
        if let Some(parent) = location.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn ensure_empty_dir(&self, display: &str, location: &Path) -> Result<()> {
        let meta = fs::metadata(location)
            .await
            .map_err(|e| not_found_or(e, display))?;
        if !meta.is_dir() {
            return Err(DriverError::NotADirectory(display.to_string()));
        }
        let mut children = fs::read_dir(location).await?;
        if children.next_entry().await?.is_some() {
            return Err(DriverError::DirectoryNotEmpty(display.to_string()));
        }
        Ok(())
    }
}

fn not_found_or(err: std::io::Error, display: &str) -> DriverError {
    if err.kind() == std::io::ErrorKind::NotFound {
        DriverError::NotFound(display.to_string())
    } else {
        DriverError::Io(err)
    }
}

fn to_entry(display: &str, meta: &std::fs::Metadata) -> Entry {
    let modified: DateTime<Utc> = meta
        .modified()
        .map(DateTime::from)
        .unwrap_or_else(|_| Utc::now());
    if meta.is_dir() {
        // Directory mtimes change with every child write; creation time is
        // the stable choice where the platform reports it.
        let created = meta.created().map(DateTime::from).unwrap_or(modified);
        Entry::folder(display, created)
    } else {
        Entry::file(display, meta.len(), modified)
    }
}

#[async_trait]
impl Driver for LocalFsDriver {
    fn name(&self) -> &'static str {
        "local"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            delete_directory: true,
            directory_metadata: true,
            copy: true,
            rename: true,
            ..Capabilities::default()
        }
    }

    async fn get_object_metadata(&self, path: &str) -> Result<Entry> {
        let display = path::normalize(path);
        self.entry_at(&display, &self.resolve(path)).await
    }

    async fn get_object(&self, path: &str) -> Result<ByteStream> {
        let location = self.resolve(path);
        let file = fs::File::open(&location)
            .await
            .map_err(|e| not_found_or(e, path))?;
        if file.metadata().await?.is_dir() {
            return Err(DriverError::InvalidPath(format!("{path} is a folder")));
        }
        let stream = futures::stream::try_unfold(file, |mut file| async move {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            let n = file.read(&mut buf).await?;
            if n == 0 {
                return Ok::<_, DriverError>(None);
            }
            buf.truncate(n);
            Ok(Some((Bytes::from(buf), file)))
        });
        Ok(stream.boxed())
    }

    #[instrument(skip(self, body))]
    async fn put_object(&self, path: &str, mut body: ByteStream) -> Result<()> {
        let location = self.resolve(path);
        if fs::metadata(&location).await.is_ok_and(|m| m.is_dir()) {
            return Err(DriverError::AlreadyExists(path.to_string()));
        }
        self.ensure_parent(&location).await?;
        let mut file = fs::File::create(&location).await?;
        while let Some(chunk) = body.try_next().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn delete_object(&self, path: &str) -> Result<()> {
        let location = self.resolve(path);
        let meta = fs::metadata(&location)
            .await
            .map_err(|e| not_found_or(e, path))?;
        if meta.is_dir() {
            self.ensure_empty_dir(path, &location).await?;
            fs::remove_dir(&location).await?;
        } else {
            fs::remove_file(&location).await?;
        }
        Ok(())
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        let location = self.resolve(path);
        if fs::metadata(&location).await.is_ok_and(|m| !m.is_dir()) {
            return Err(DriverError::AlreadyExists(path.to_string()));
        }
        fs::create_dir_all(&location).await?;
        Ok(())
    }

    async fn traverse_directory(
        &self,
        path: &str,
        recursive: bool,
        visitor: &mut Visitor<'_>,
    ) -> Result<()> {
        let display_root = path::normalize(path);
        let location = self.resolve(path);
        let meta = fs::metadata(&location)
            .await
            .map_err(|e| not_found_or(e, &display_root))?;
        if !meta.is_dir() {
            return Err(DriverError::NotADirectory(display_root));
        }

        // Depth-first, parents before children, siblings by name
        let mut pending: Vec<(String, PathBuf, Entry)> = Vec::new();
        let mut to_expand = Some((display_root, location));
        loop {
            if let Some((dir_display, dir_location)) = to_expand.take() {
                let mut children = Vec::new();
                let mut read_dir = fs::read_dir(&dir_location).await?;
                while let Some(child) = read_dir.next_entry().await? {
                    let Some(name) = child.file_name().to_str().map(str::to_string) else {
                        warn!(path = ?child.path(), "Skipping non UTF-8 file name");
                        continue;
                    };
                    let display = path::join(&dir_display, &name);
                    let meta = child.metadata().await?;
                    children.push((display.clone(), child.path(), to_entry(&display, &meta)));
                }
                children.sort_by(|a, b| b.0.cmp(&a.0));
                pending.extend(children);
            }

            let Some((display, location, entry)) = pending.pop() else {
                break;
            };
            let is_dir = entry.is_folder();
            if let ControlFlow::Break(()) = visitor(entry) {
                break;
            }
            if recursive && is_dir {
                to_expand = Some((display, location));
            }
        }
        Ok(())
    }

    async fn delete_directory(&self, path: &str) -> Result<()> {
        let location = self.resolve(path);
        self.ensure_empty_dir(path, &location).await?;
        fs::remove_dir(&location).await?;
        Ok(())
    }

    async fn get_directory_metadata(&self, path: &str) -> Result<Entry> {
        let display = path::normalize(path);
        let entry = self.entry_at(&display, &self.resolve(path)).await?;
        if !entry.is_folder() {
            return Err(DriverError::NotADirectory(display));
        }
        Ok(entry)
    }

    async fn copy_object(&self, from: &str, to: &str) -> Result<()> {
        let target = self.resolve(to);
        self.ensure_parent(&target).await?;
        fs::copy(self.resolve(from), &target)
            .await
            .map_err(|e| not_found_or(e, from))?;
        Ok(())
    }

    async fn move_object(&self, from: &str, to: &str) -> Result<()> {
        let target = self.resolve(to);
        self.ensure_parent(&target).await?;
        fs::rename(self.resolve(from), &target)
            .await
            .map_err(|e| not_found_or(e, from))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bytes_stream, collect_bytes};

    async fn driver() -> (tempfile::TempDir, LocalFsDriver) {
        let dir = tempfile::tempdir().unwrap();
        let driver = LocalFsDriver::new(dir.path()).await.unwrap();
        (dir, driver)
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let (_dir, driver) = driver().await;
        driver
            .put_object("/a/b/file.txt", bytes_stream(Bytes::from_static(b"content")))
            .await
            .unwrap();

        let entry = driver.get_object_metadata("/a/b/file.txt").await.unwrap();
        assert!(entry.is_file());
        assert_eq!(entry.size, 7);
        assert_eq!(entry.name, "file.txt");

        let data = collect_bytes(driver.get_object("/a/b/file.txt").await.unwrap())
            .await
            .unwrap();
        assert_eq!(data.as_ref(), b"content");
    }

    #[tokio::test]
    async fn test_large_object_streams_in_chunks() {
        let (_dir, driver) = driver().await;
        let payload = Bytes::from(vec![7u8; READ_CHUNK_SIZE * 2 + 10]);
        driver
            .put_object("/big.bin", bytes_stream(payload.clone()))
            .await
            .unwrap();
        let chunks: Vec<Bytes> = driver
            .get_object("/big.bin")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(chunks.len() >= 3);
        assert_eq!(chunks.concat(), payload.to_vec());
    }

    #[tokio::test]
    async fn test_escape_is_contained() {
        let (dir, driver) = driver().await;
        driver
            .put_object("/../../escape.txt", bytes_stream(Bytes::from_static(b"x")))
            .await
            .unwrap();
        assert!(dir.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_traverse_depth_first() {
        let (_dir, driver) = driver().await;
        for p in ["/r/b.txt", "/r/a/x.txt", "/r/c/y.txt"] {
            driver
                .put_object(p, bytes_stream(Bytes::from_static(b"1")))
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        driver
            .traverse_directory("/r", true, &mut |e: Entry| {
                seen.push(e.path_display);
                ControlFlow::Continue(())
            })
            .await
            .unwrap();
        assert_eq!(seen, vec!["/r/a", "/r/a/x.txt", "/r/b.txt", "/r/c", "/r/c/y.txt"]);

        let mut shallow = Vec::new();
        driver
            .traverse_directory("/r", false, &mut |e: Entry| {
                shallow.push(e.path_display);
                ControlFlow::Continue(())
            })
            .await
            .unwrap();
        assert_eq!(shallow, vec!["/r/a", "/r/b.txt", "/r/c"]);
    }

    #[tokio::test]
    async fn test_delete_directory_requires_empty() {
        let (_dir, driver) = driver().await;
        driver.create_directory("/d/e").await.unwrap();
        assert!(matches!(
            driver.delete_directory("/d").await,
            Err(DriverError::DirectoryNotEmpty(_))
        ));
        driver.delete_directory("/d/e").await.unwrap();
        driver.delete_directory("/d").await.unwrap();
        assert!(driver.get_object_metadata("/d").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_move_and_copy() {
        let (_dir, driver) = driver().await;
        driver
            .put_object("/src.txt", bytes_stream(Bytes::from_static(b"abc")))
            .await
            .unwrap();
        driver.copy_object("/src.txt", "/copies/one.txt").await.unwrap();
        driver.move_object("/src.txt", "/moved/two.txt").await.unwrap();

        assert!(driver.get_object_metadata("/src.txt").await.is_err());
        assert_eq!(driver.get_object_metadata("/copies/one.txt").await.unwrap().size, 3);
        assert_eq!(driver.get_object_metadata("/moved/two.txt").await.unwrap().size, 3);
    }
}
