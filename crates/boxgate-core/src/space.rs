//! Per-user storage operations
//!
//! [`StorageManager`] owns the bridge, the bulk engine and the job and
//! session registries. [`UserSpace`] is a manager opened for one caller:
//! it accepts and returns user-relative paths only.

use crate::cursor::{long_poll, Cursor, LongPollConfig, LongPollResult};
use crate::engine::{Action, BulkEngine, EngineConfig, Operation, ValidatedOperation, WriteMode};
use crate::jobs::{JobRegistry, JobStatus, UploadSessions};
use crate::resolver::UserScope;
use crate::{Bridge, BridgeConfig, CoreError, Result};
use boxgate_driver::{path, ByteStream, Driver, DriverError, Entry, ListPage};
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Page size when the caller does not ask for one
pub const DEFAULT_LIST_LIMIT: usize = 2000;

/// Everything configurable about the storage layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    pub bridge: BridgeConfig,
    pub engine: EngineConfig,
    /// Item ceiling for single (non-batch) folder operations
    pub max_interactive_items: usize,
    pub long_poll: LongPollConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            engine: EngineConfig::default(),
            max_interactive_items: 10_000,
            long_poll: LongPollConfig::default(),
        }
    }
}

/// Result of a folder listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListFolderResult {
    pub entries: Vec<Entry>,
    pub cursor: String,
    pub has_more: bool,
}

/// Shared storage state; cheap to clone
#[derive(Clone, Debug)]
pub struct StorageManager {
    engine: BulkEngine,
    jobs: Arc<JobRegistry>,
    sessions: Arc<UploadSessions>,
    config: Arc<StorageConfig>,
}

impl StorageManager {
    pub fn new(driver: Arc<dyn Driver>, config: StorageConfig) -> Self {
        let bridge = Bridge::new(driver, config.bridge.clone());
        let engine = BulkEngine::new(bridge, config.engine);
        Self {
            engine,
            jobs: Arc::new(JobRegistry::new()),
            sessions: Arc::new(UploadSessions::new()),
            config: Arc::new(config),
        }
    }

    pub fn bridge(&self) -> &Bridge {
        self.engine.bridge()
    }

    pub fn engine(&self) -> &BulkEngine {
        &self.engine
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    /// Open the namespace of one caller, creating its root folder if needed
    pub async fn open(&self, scope: UserScope) -> Result<UserSpace> {
        self.bridge().create_directory(scope.root()).await?;
        Ok(UserSpace {
            manager: self.clone(),
            scope,
        })
    }

    /// Forget finished jobs and abandoned upload sessions older than `max_age`
    pub async fn cleanup_expired(&self, max_age: chrono::Duration) {
        self.jobs.cleanup_expired(max_age);
        for session_id in self.sessions.expire(max_age) {
            warn!(%session_id, "Upload session expired");
            self.bridge().abort_multipart_upload(&session_id).await;
        }
    }
}

/// Storage operations of one caller
#[derive(Clone, Debug)]
pub struct UserSpace {
    manager: StorageManager,
    scope: UserScope,
}

impl UserSpace {
    pub fn scope(&self) -> &UserScope {
        &self.scope
    }

    fn bridge(&self) -> &Bridge {
        self.manager.bridge()
    }

    fn engine(&self) -> &BulkEngine {
        &self.manager.engine
    }

    /// Global path of something that may be modified; the scope root may not
    fn source_path(&self, user_path: &str) -> Result<String> {
        let global = self.scope.to_global(user_path)?;
        if global == self.scope.root() {
            return Err(CoreError::MalformedPath(
                "the root folder cannot be modified".into(),
            ));
        }
        Ok(global)
    }

    fn page(&self, cursor: Cursor, page: ListPage) -> ListFolderResult {
        let cursor = Cursor {
            last_item: page.cursor_item,
            ..cursor
        };
        ListFolderResult {
            entries: page
                .entries
                .into_iter()
                .map(|e| self.scope.to_user_entry(e))
                .collect(),
            cursor: cursor.encode(),
            has_more: page.has_more,
        }
    }

    /// Decode a cursor and make sure it points into this scope
    fn own_cursor(&self, token: &str) -> Result<Cursor> {
        let cursor = Cursor::decode(token)?;
        if self.scope.to_user_path(&cursor.path).is_none() {
            return Err(CoreError::MalformedCursor("cursor belongs to another namespace".into()));
        }
        Ok(cursor)
    }

    #[instrument(skip(self), fields(owner = self.scope.owner_key()))]
    pub async fn list_folder(
        &self,
        path: &str,
        recursive: bool,
        limit: Option<usize>,
    ) -> Result<ListFolderResult> {
        let global = self.scope.to_global(path)?;
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
        let page = self
            .bridge()
            .list_folder_using_cursor(&global, recursive, limit, None)
            .await?;
        Ok(self.page(Cursor::new(global, recursive, limit, None), page))
    }

    #[instrument(skip(self, token), fields(owner = self.scope.owner_key()))]
    pub async fn list_folder_continue(&self, token: &str) -> Result<ListFolderResult> {
        let cursor = self.own_cursor(token)?;
        let page = self
            .bridge()
            .list_folder_using_cursor(
                &cursor.path,
                cursor.recursive,
                cursor.limit,
                cursor.last_item.as_ref(),
            )
            .await?;
        Ok(self.page(cursor, page))
    }

    /// Cursor positioned after everything currently in the folder
    pub async fn get_latest_cursor(&self, path: &str, recursive: bool, limit: Option<usize>) -> Result<String> {
        let global = self.scope.to_global(path)?;
        let latest = self.bridge().get_latest_cursor_item(&global, recursive).await?;
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
        Ok(Cursor::new(global, recursive, limit, latest).encode())
    }

    /// Wait until the folder behind `token` changes or `timeout` passes
    pub async fn list_folder_longpoll(&self, token: &str, timeout: Option<Duration>) -> Result<LongPollResult> {
        let cursor = self.own_cursor(token)?;
        let config = &self.manager.config.long_poll;
        long_poll(
            self.bridge(),
            &cursor.path,
            &cursor,
            timeout.unwrap_or(config.default_timeout),
            config.poll_interval,
        )
        .await
    }

    pub async fn get_metadata(&self, path: &str) -> Result<Entry> {
        let global = self.source_path(path)?;
        let entry = self.bridge().get_metadata(&global).await?;
        Ok(self.scope.to_user_entry(entry))
    }

    #[instrument(skip(self), fields(owner = self.scope.owner_key()))]
    pub async fn create_folder(&self, path: &str, autorename: bool) -> Result<Entry> {
        let global = self.source_path(path)?;
        let destination = match self.bridge().get_metadata(&global).await {
            Ok(_) if autorename => self.engine().find_available_name(&global, false).await?,
            Ok(_) => return Err(CoreError::Conflict(global)),
            Err(e) if e.is_not_found() => global,
            Err(e) => return Err(e),
        };
        self.bridge().create_directory(&destination).await?;
        let entry = self
            .bridge()
            .get_object_metadata_with_retry(&destination, true)
            .await?
            .unwrap_or_else(|| Entry::folder(destination.as_str(), Utc::now()));
        Ok(self.scope.to_user_entry(entry))
    }

    /// Delete a file or folder tree; returns the deleted entry
    pub async fn delete(&self, path: &str) -> Result<Entry> {
        let operation = Operation::Delete {
            path: self.source_path(path)?,
        };
        self.run_interactive(operation).await
    }

    pub async fn copy_entry(&self, from: &str, to: &str, mode: WriteMode) -> Result<Entry> {
        let operation = Operation::Copy {
            from: self.source_path(from)?,
            to: self.scope.to_global(to)?,
            mode,
        };
        self.run_interactive(operation).await
    }

    pub async fn move_entry(&self, from: &str, to: &str, mode: WriteMode) -> Result<Entry> {
        let operation = Operation::Move {
            from: self.source_path(from)?,
            to: self.scope.to_global(to)?,
            mode,
        };
        self.run_interactive(operation).await
    }

    async fn run_interactive(&self, operation: Operation) -> Result<Entry> {
        let limit = self.manager.config.max_interactive_items;
        let entry = self.engine().run(&operation, Some(limit)).await?;
        Ok(self.scope.to_user_entry(entry))
    }

    /// Write a whole file in one request
    #[instrument(skip(self, body), fields(owner = self.scope.owner_key()))]
    pub async fn upload(&self, path: &str, mode: WriteMode, body: ByteStream) -> Result<Entry> {
        let validated = self.validate_upload(path, mode).await?;
        let destination = upload_destination(&validated)?;

        let (body, written) = counted(body);
        self.bridge().put_object(&destination, body).await?;

        let size = written.load(Ordering::Relaxed);
        info!(path = %destination, size, "Upload stored");
        let entry = self
            .bridge()
            .get_object_metadata_with_retry(&destination, false)
            .await?
            .unwrap_or_else(|| Entry::file(destination.as_str(), size, Utc::now()));
        Ok(self.scope.to_user_entry(entry))
    }

    /// Metadata and content of a file
    pub async fn download(&self, path: &str) -> Result<(Entry, ByteStream)> {
        let global = self.source_path(path)?;
        let entry = self.bridge().get_metadata(&global).await?;
        if entry.is_folder() {
            return Err(DriverError::InvalidPath(format!("{path} is a folder")).into());
        }
        let body = self.bridge().get_object(&global).await?;
        Ok((self.scope.to_user_entry(entry), body))
    }

    async fn validate_upload(&self, path: &str, mode: WriteMode) -> Result<ValidatedOperation> {
        let operation = Operation::Upload {
            to: self.source_path(path)?,
            mode,
        };
        self.engine().validate_operation(&operation, None).await
    }

    /// Open an upload session, optionally with its first chunk
    pub async fn upload_session_start(&self, first_chunk: Option<ByteStream>) -> Result<String> {
        let session_id = self.bridge().start_multipart_upload().await?;
        self.manager
            .sessions
            .open(&session_id, self.scope.owner_key());
        if let Some(chunk) = first_chunk {
            self.append_chunk(&session_id, 0, chunk).await?;
        }
        Ok(session_id)
    }

    pub async fn upload_session_append(&self, session_id: &str, offset: u64, body: ByteStream) -> Result<()> {
        self.manager
            .sessions
            .check(session_id, self.scope.owner_key())?;
        self.append_chunk(session_id, offset, body).await
    }

    async fn append_chunk(&self, session_id: &str, offset: u64, body: ByteStream) -> Result<()> {
        let (body, written) = counted(body);
        self.bridge().multipart_upload(session_id, offset, body).await?;
        let end = offset.saturating_add(written.load(Ordering::Relaxed));
        self.manager.sessions.extend(session_id, end);
        Ok(())
    }

    /// Commit an upload session to `path`, optionally appending a last chunk
    /// at `offset` first
    #[instrument(skip(self, last_chunk), fields(owner = self.scope.owner_key()))]
    pub async fn upload_session_finish(
        &self,
        session_id: &str,
        offset: u64,
        last_chunk: Option<ByteStream>,
        path: &str,
        mode: WriteMode,
    ) -> Result<Entry> {
        self.manager
            .sessions
            .check(session_id, self.scope.owner_key())?;
        if let Some(chunk) = last_chunk {
            self.append_chunk(session_id, offset, chunk).await?;
        }
        let validated = self.validate_upload(path, mode).await?;
        let destination = upload_destination(&validated)?;
        self.bridge()
            .finish_multipart_upload(session_id, &destination)
            .await?;
        let size = self.manager.sessions.close(session_id).unwrap_or_default();

        let entry = self
            .bridge()
            .get_object_metadata_with_retry(&destination, false)
            .await?
            .unwrap_or_else(|| Entry::file(destination.as_str(), size, Utc::now()));
        Ok(self.scope.to_user_entry(entry))
    }

    /// Validate every operation, then run them one after another in the
    /// background. Returns the id of the job to poll.
    ///
    /// If any operation fails validation nothing runs and no job is left.
    #[instrument(skip(self, operations), fields(owner = self.scope.owner_key(), count = operations.len()))]
    pub async fn launch_batch(&self, operations: Vec<Operation>) -> Result<String> {
        let operations = operations
            .into_iter()
            .map(|operation| self.globalize(operation))
            .collect::<Result<Vec<_>>>()?;
        let validated = self.engine().validate_batch(&operations).await?;

        let jobs = self.manager.jobs.clone();
        let job_id = jobs.create(self.scope.owner_key());
        let engine = self.engine().clone();
        let scope = self.scope.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            let status = match execute_all(&engine, &validated).await {
                Ok(entries) => JobStatus::Complete {
                    entries: entries.into_iter().map(|e| scope.to_user_entry(e)).collect(),
                },
                Err(e) => {
                    warn!(job_id = %id, error = %e, "Batch job failed");
                    JobStatus::Failed {
                        summary: e.to_string(),
                        kind: e.kind(),
                    }
                }
            };
            jobs.set(&id, status);
        });
        Ok(job_id)
    }

    pub fn check_job(&self, job_id: &str) -> Result<JobStatus> {
        self.manager.jobs.status(self.scope.owner_key(), job_id)
    }

    fn globalize(&self, operation: Operation) -> Result<Operation> {
        Ok(match operation {
            Operation::Delete { path } => Operation::Delete {
                path: self.source_path(&path)?,
            },
            Operation::Copy { from, to, mode } => Operation::Copy {
                from: self.source_path(&from)?,
                to: self.scope.to_global(&to)?,
                mode,
            },
            Operation::Move { from, to, mode } => Operation::Move {
                from: self.source_path(&from)?,
                to: self.scope.to_global(&to)?,
                mode,
            },
            Operation::Upload { .. } => {
                return Err(CoreError::Internal("uploads cannot be batched".into()))
            }
        })
    }
}

async fn execute_all(engine: &BulkEngine, validated: &[ValidatedOperation]) -> Result<Vec<Entry>> {
    let mut entries = Vec::with_capacity(validated.len());
    let mut deleted: Vec<&str> = Vec::new();
    for operation in validated {
        let Some(source) = operation.source.as_ref() else {
            continue;
        };
        if operation.action == Action::Delete {
            let covered = deleted.iter().any(|gone| {
                source.path_lower == *gone || path::is_strict_descendant(&source.path_lower, gone)
            });
            deleted.push(&source.path_lower);
            if covered {
                // Already removed along with an earlier entry of this batch
                entries.push(source.clone());
                continue;
            }
        }
        engine.do_operation(operation).await?;
        entries.push(engine.result_metadata(operation).await?);
    }
    Ok(entries)
}

/// Count the bytes passing through `body`
fn counted(body: ByteStream) -> (ByteStream, Arc<AtomicU64>) {
    let written = Arc::new(AtomicU64::new(0));
    let counter = written.clone();
    let body = body
        .inspect_ok(move |chunk| {
            counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        })
        .boxed();
    (body, written)
}

fn upload_destination(validated: &ValidatedOperation) -> Result<String> {
    validated
        .destination
        .clone()
        .ok_or_else(|| CoreError::Internal("upload without destination".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use boxgate_driver::{bytes_stream, collect_bytes, MemoryDriver};
    use bytes::Bytes;

    async fn space(driver: &MemoryDriver) -> UserSpace {
        let manager = StorageManager::new(Arc::new(driver.clone()), StorageConfig::default());
        manager
            .open(UserScope::new("acc", Some("app".into())).unwrap())
            .await
            .unwrap()
    }

    fn body(data: &'static str) -> ByteStream {
        bytes_stream(Bytes::from_static(data.as_bytes()))
    }

    async fn wait_for_job(space: &UserSpace, id: &str) -> JobStatus {
        for _ in 0..200 {
            let status = space.check_job(id).unwrap();
            if status != JobStatus::InProgress {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish");
    }

    #[tokio::test]
    async fn test_upload_list_and_download() {
        let driver = MemoryDriver::new();
        let space = space(&driver).await;

        let entry = space.upload("/Docs/a.txt", WriteMode::Add, body("hello")).await.unwrap();
        assert_eq!(entry.path_display, "/Docs/a.txt");
        assert_eq!(entry.size, 5);
        assert!(driver.contains("/acc/app/Docs/a.txt"));

        let listing = space.list_folder("", true, None).await.unwrap();
        let paths: Vec<_> = listing.entries.iter().map(|e| e.path_display.as_str()).collect();
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(&"/Docs"));
        assert!(paths.contains(&"/Docs/a.txt"));

        let (meta, stream) = space.download("/docs/A.TXT").await.unwrap();
        assert_eq!(meta.name, "a.txt");
        assert_eq!(collect_bytes(stream).await.unwrap().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_upload_add_conflict() {
        let driver = MemoryDriver::new();
        let space = space(&driver).await;
        space.upload("/a.txt", WriteMode::Add, body("1")).await.unwrap();
        let again = space.upload("/a.txt", WriteMode::Add, body("2")).await;
        assert_eq!(again.unwrap_err().kind(), ErrorKind::Conflict);

        let renamed = space.upload("/a.txt", WriteMode::Rename, body("2")).await.unwrap();
        assert_eq!(renamed.path_display, "/a (1).txt");
    }

    #[tokio::test]
    async fn test_continue_and_latest_cursor() {
        let driver = MemoryDriver::new();
        let space = space(&driver).await;
        for n in 0..5 {
            space
                .upload(&format!("/f{n}"), WriteMode::Add, body("x"))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let first = space.list_folder("", false, Some(2)).await.unwrap();
        assert!(first.has_more);
        let mut all = first.entries.clone();
        let mut cursor = first.cursor;
        loop {
            let next = space.list_folder_continue(&cursor).await.unwrap();
            all.extend(next.entries);
            cursor = next.cursor;
            if !next.has_more {
                break;
            }
        }
        assert_eq!(all.len(), 5);

        let latest = space.get_latest_cursor("", false, None).await.unwrap();
        let nothing = space.list_folder_continue(&latest).await.unwrap();
        assert!(nothing.entries.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_cursor_is_rejected() {
        let driver = MemoryDriver::new();
        let mine = space(&driver).await;
        let manager = StorageManager::new(Arc::new(driver.clone()), StorageConfig::default());
        let other = manager
            .open(UserScope::new("other", None).unwrap())
            .await
            .unwrap();

        let cursor = other.list_folder("", false, None).await.unwrap().cursor;
        assert!(matches!(
            mine.list_folder_continue(&cursor).await,
            Err(CoreError::MalformedCursor(_))
        ));
    }

    #[tokio::test]
    async fn test_create_folder_autorename() {
        let driver = MemoryDriver::new();
        let space = space(&driver).await;
        let first = space.create_folder("/Photos", false).await.unwrap();
        assert_eq!(first.path_display, "/Photos");
        assert!(space.create_folder("/photos", false).await.is_err());
        let second = space.create_folder("/Photos", true).await.unwrap();
        assert_eq!(second.path_display, "/Photos (1)");
    }

    #[tokio::test]
    async fn test_root_cannot_be_deleted() {
        let driver = MemoryDriver::new();
        let space = space(&driver).await;
        assert!(matches!(space.delete("").await, Err(CoreError::MalformedPath(_))));
        assert!(matches!(space.delete("/").await, Err(CoreError::MalformedPath(_))));
    }

    #[tokio::test]
    async fn test_interactive_ceiling() {
        let driver = MemoryDriver::new();
        let manager = StorageManager::new(
            Arc::new(driver.clone()),
            StorageConfig {
                max_interactive_items: 2,
                ..StorageConfig::default()
            },
        );
        let space = manager.open(UserScope::new("acc", None).unwrap()).await.unwrap();
        for n in 0..3 {
            space.upload(&format!("/d/{n}"), WriteMode::Add, body("x")).await.unwrap();
        }
        let result = space.delete("/d").await;
        assert!(matches!(result, Err(CoreError::TooManyFiles { limit: 2 })));

        // Batches are not bound by the interactive ceiling
        let job = space
            .launch_batch(vec![Operation::Delete { path: "/d".into() }])
            .await
            .unwrap();
        assert!(matches!(wait_for_job(&space, &job).await, JobStatus::Complete { .. }));
        assert!(!driver.contains("/acc/d"));
    }

    #[tokio::test]
    async fn test_batch_move() {
        let driver = MemoryDriver::new();
        let space = space(&driver).await;
        space.upload("/a.txt", WriteMode::Add, body("a")).await.unwrap();
        space.upload("/b.txt", WriteMode::Add, body("b")).await.unwrap();

        let job = space
            .launch_batch(vec![
                Operation::Move {
                    from: "/a.txt".into(),
                    to: "/out/a.txt".into(),
                    mode: WriteMode::Add,
                },
                Operation::Move {
                    from: "/b.txt".into(),
                    to: "/out/b.txt".into(),
                    mode: WriteMode::Add,
                },
            ])
            .await
            .unwrap();
        let JobStatus::Complete { entries } = wait_for_job(&space, &job).await else {
            panic!("batch failed");
        };
        let paths: Vec<_> = entries.iter().map(|e| e.path_display.as_str()).collect();
        assert_eq!(paths, vec!["/out/a.txt", "/out/b.txt"]);
    }

    #[tokio::test]
    async fn test_batch_validation_is_all_or_nothing() {
        let driver = MemoryDriver::new();
        let space = space(&driver).await;
        space.upload("/a.txt", WriteMode::Add, body("a")).await.unwrap();
        driver.clear_journal();

        let result = space
            .launch_batch(vec![
                Operation::Delete { path: "/a.txt".into() },
                Operation::Delete { path: "/missing".into() },
            ])
            .await;
        assert!(matches!(result, Err(CoreError::SourceNotFound(_))));
        assert!(driver.journal().is_empty());
        assert!(space.manager.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_upload_session_round_trip() {
        let driver = MemoryDriver::new();
        let space = space(&driver).await;

        let session = space.upload_session_start(Some(body("hello "))).await.unwrap();
        space
            .upload_session_append(&session, 6, body("big "))
            .await
            .unwrap();
        let entry = space
            .upload_session_finish(&session, 10, Some(body("world")), "/big.txt", WriteMode::Add)
            .await
            .unwrap();
        assert_eq!(entry.path_display, "/big.txt");
        assert_eq!(driver.read("/acc/app/big.txt").unwrap().as_ref(), b"hello big world");

        // Finished sessions are closed
        assert!(matches!(
            space.upload_session_append(&session, 15, body("!")).await,
            Err(CoreError::UploadSessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_rejects_shared_destination() {
        let driver = MemoryDriver::new();
        let space = space(&driver).await;
        space.upload("/a.txt", WriteMode::Add, body("AAA")).await.unwrap();
        space.upload("/b.txt", WriteMode::Add, body("BBB")).await.unwrap();

        for mode in [WriteMode::Add, WriteMode::Overwrite] {
            let result = space
                .launch_batch(vec![
                    Operation::Move {
                        from: "/a.txt".into(),
                        to: "/out.txt".into(),
                        mode,
                    },
                    Operation::Move {
                        from: "/B.txt".into(),
                        to: "/OUT.txt".into(),
                        mode,
                    },
                ])
                .await;
            assert!(matches!(result, Err(CoreError::Conflict(_))), "{mode:?}");
        }
        assert_eq!(driver.read("/acc/app/a.txt").unwrap().as_ref(), b"AAA");
        assert_eq!(driver.read("/acc/app/b.txt").unwrap().as_ref(), b"BBB");
        assert!(!driver.contains("/acc/app/out.txt"));
        assert!(space.manager.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_batch_renames_past_earlier_destinations() {
        let driver = MemoryDriver::new();
        let space = space(&driver).await;
        space.upload("/a.txt", WriteMode::Add, body("AAA")).await.unwrap();
        space.upload("/b.txt", WriteMode::Add, body("BBB")).await.unwrap();

        let job = space
            .launch_batch(vec![
                Operation::Copy {
                    from: "/a.txt".into(),
                    to: "/out.txt".into(),
                    mode: WriteMode::Rename,
                },
                Operation::Copy {
                    from: "/b.txt".into(),
                    to: "/out.txt".into(),
                    mode: WriteMode::Rename,
                },
            ])
            .await
            .unwrap();
        let JobStatus::Complete { entries } = wait_for_job(&space, &job).await else {
            panic!("batch failed");
        };
        let paths: Vec<_> = entries.iter().map(|e| e.path_display.as_str()).collect();
        assert_eq!(paths, vec!["/out.txt", "/out (1).txt"]);
        assert_eq!(driver.read("/acc/app/out.txt").unwrap().as_ref(), b"AAA");
        assert_eq!(driver.read("/acc/app/out (1).txt").unwrap().as_ref(), b"BBB");
    }

    #[tokio::test]
    async fn test_batch_delete_of_nested_entries() {
        let driver = MemoryDriver::new();
        let space = space(&driver).await;
        space.upload("/a/b/c.txt", WriteMode::Add, body("c")).await.unwrap();

        let job = space
            .launch_batch(vec![
                Operation::Delete { path: "/a".into() },
                Operation::Delete { path: "/a/b".into() },
            ])
            .await
            .unwrap();
        let JobStatus::Complete { entries } = wait_for_job(&space, &job).await else {
            panic!("batch failed");
        };
        let paths: Vec<_> = entries.iter().map(|e| e.path_display.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/a/b"]);
        assert!(!driver.contains("/acc/app/a"));
    }

    #[tokio::test]
    async fn test_session_size_when_upload_stays_invisible() {
        let driver = MemoryDriver::minimal().with_visibility_lag(100);
        let config = StorageConfig {
            bridge: BridgeConfig {
                retry: crate::RetryConfig {
                    max_retries: 1,
                    base_delay: Duration::from_millis(1),
                    ..crate::RetryConfig::default()
                },
                ..BridgeConfig::default()
            },
            ..StorageConfig::default()
        };
        let manager = StorageManager::new(Arc::new(driver.clone()), config);
        let space = manager
            .open(UserScope::new("acc", Some("app".into())).unwrap())
            .await
            .unwrap();

        let session = space.upload_session_start(Some(body("hello "))).await.unwrap();
        space
            .upload_session_append(&session, 6, body("big "))
            .await
            .unwrap();
        let entry = space
            .upload_session_finish(&session, 10, Some(body("world")), "/big.txt", WriteMode::Add)
            .await
            .unwrap();
        assert_eq!(entry.path_display, "/big.txt");
        assert_eq!(entry.size, 15);
        assert_eq!(driver.read("/acc/app/big.txt").unwrap().len(), 15);
    }
}
