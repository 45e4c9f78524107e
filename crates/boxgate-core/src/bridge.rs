//! Capability bridge
//!
//! Wraps a [`Driver`] and presents the complete storage interface. Every
//! optional operation is served natively when the driver advertises it in
//! its [`Capabilities`] and by a generic fallback otherwise. Capabilities are
//! read once, in [`Bridge::new`].

use crate::retry::{retry_not_found, RetryConfig};
use crate::Result;
use boxgate_driver::{
    path, ByteStream, Capabilities, CursorItem, Driver, DriverError, Entry, ListPage, Visitor,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Bridge configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Backoff for metadata lookups that may lag behind writes
    pub retry: RetryConfig,
    /// Folder holding multipart segments when the driver has no native
    /// multipart support
    pub upload_root: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            upload_root: "/uploads".to_string(),
        }
    }
}

/// A driver plus generic fallbacks for everything it does not do natively
#[derive(Clone, Debug)]
pub struct Bridge {
    pub(crate) driver: Arc<dyn Driver>,
    pub(crate) capabilities: Capabilities,
    pub(crate) config: BridgeConfig,
}

impl Bridge {
    pub fn new(driver: Arc<dyn Driver>, config: BridgeConfig) -> Self {
        let capabilities = driver.capabilities();
        info!(driver = driver.name(), ?capabilities, "Storage bridge ready");
        Self {
            driver,
            capabilities,
            config,
        }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    // Required operations, passed straight through

    pub async fn get_object_metadata(&self, path: &str) -> Result<Entry> {
        Ok(self.driver.get_object_metadata(path).await?)
    }

    pub async fn get_object(&self, path: &str) -> Result<ByteStream> {
        Ok(self.driver.get_object(path).await?)
    }

    #[instrument(skip(self, body))]
    pub async fn put_object(&self, path: &str, body: ByteStream) -> Result<()> {
        Ok(self.driver.put_object(path, body).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_object(&self, path: &str) -> Result<()> {
        Ok(self.driver.delete_object(path).await?)
    }

    #[instrument(skip(self))]
    pub async fn create_directory(&self, path: &str) -> Result<()> {
        Ok(self.driver.create_directory(path).await?)
    }

    pub async fn traverse_directory(
        &self,
        path: &str,
        recursive: bool,
        visitor: &mut Visitor<'_>,
    ) -> Result<()> {
        Ok(self.driver.traverse_directory(path, recursive, visitor).await?)
    }

    // Optional operations

    #[instrument(skip(self))]
    pub async fn delete_directory(&self, path: &str) -> Result<()> {
        if self.capabilities.delete_directory {
            return Ok(self.driver.delete_directory(path).await?);
        }
        debug!("delete_directory fallback: delete_object");
        Ok(self.driver.delete_object(path).await?)
    }

    pub async fn get_directory_metadata(&self, path: &str) -> Result<Entry> {
        if self.capabilities.directory_metadata {
            return Ok(self.driver.get_directory_metadata(path).await?);
        }

        let normalized = path::normalize(path);
        if path::is_root(&normalized) {
            return Ok(Entry::folder(path::ROOT, DateTime::<Utc>::default()));
        }

        // Fallback: look the folder up in its parent's listing
        let wanted = normalized.to_lowercase();
        let mut found = None;
        self.driver
            .traverse_directory(path::parent(&normalized), false, &mut |entry: Entry| {
                if entry.path_lower == wanted {
                    found = Some(entry);
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await?;
        match found {
            Some(entry) if entry.is_folder() => Ok(entry),
            Some(entry) => Err(DriverError::NotADirectory(entry.path_display).into()),
            None => Err(DriverError::NotFound(normalized).into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn copy_object(&self, from: &str, to: &str) -> Result<()> {
        if self.capabilities.copy {
            return Ok(self.driver.copy_object(from, to).await?);
        }
        debug!("copy_object fallback: stream copy");
        let body = self.driver.get_object(from).await?;
        Ok(self.driver.put_object(to, body).await?)
    }

    #[instrument(skip(self))]
    pub async fn move_object(&self, from: &str, to: &str) -> Result<()> {
        if self.capabilities.rename {
            return Ok(self.driver.move_object(from, to).await?);
        }
        debug!("move_object fallback: copy then delete");
        self.copy_object(from, to).await?;
        Ok(self.driver.delete_object(from).await?)
    }

    /// Metadata of a file or folder: object lookup first, then folder lookup
    pub async fn get_metadata(&self, path: &str) -> Result<Entry> {
        if path::is_root(&path::normalize(path)) {
            return self.get_directory_metadata(path).await;
        }
        match self.get_object_metadata(path).await {
            Err(e) if e.is_not_found() => self.get_directory_metadata(path).await,
            other => other,
        }
    }

    /// Like [`get_object_metadata`](Self::get_object_metadata) for files or
    /// [`get_directory_metadata`](Self::get_directory_metadata) for folders,
    /// but keeps retrying while the entry is not visible yet. `None` means
    /// it never became visible.
    #[instrument(skip(self))]
    pub async fn get_object_metadata_with_retry(
        &self,
        path: &str,
        is_folder: bool,
    ) -> Result<Option<Entry>> {
        retry_not_found(&self.config.retry, || async move {
            if is_folder {
                self.get_directory_metadata(path).await
            } else {
                self.get_object_metadata(path).await
            }
        })
        .await
    }

    /// Immediate children of a folder
    pub async fn list_children(&self, path: &str) -> Result<Vec<Entry>> {
        let mut children = Vec::new();
        self.driver
            .traverse_directory(path, false, &mut |entry: Entry| {
                children.push(entry);
                ControlFlow::Continue(())
            })
            .await?;
        Ok(children)
    }

    // Cursor primitives

    /// Total-order key of an entry: the driver's native token when it
    /// advertises one, `server_modified` followed by `path_display` otherwise
    pub fn entry_sort_key(&self, entry: &Entry) -> String {
        self.native_sort_key(entry).unwrap_or_else(|| entry.sort_key())
    }

    fn native_sort_key(&self, entry: &Entry) -> Option<String> {
        if self.capabilities.sort_key {
            self.driver.entry_sort_key(entry)
        } else {
            None
        }
    }

    /// Watermark projection of an entry. A native ordering token travels
    /// with the item so that watermarks and entries share one key space.
    pub fn cursor_item(&self, entry: Option<&Entry>) -> Option<CursorItem> {
        let entry = entry?;
        let native = if self.capabilities.cursor_item {
            self.driver.cursor_item(entry)
        } else {
            None
        };
        let item = native.unwrap_or_else(|| entry.cursor_item());
        match (&item.key, self.native_sort_key(entry)) {
            (None, Some(key)) => Some(item.with_key(key)),
            _ => Some(item),
        }
    }

    /// Key a watermark compares by, in the same space as
    /// [`entry_sort_key`](Self::entry_sort_key)
    pub fn cursor_item_sort_key(&self, item: &CursorItem) -> String {
        item.sort_key()
    }

    /// True iff `a` is absent or sorts strictly before `b`
    pub fn is_cursor_item_newer(&self, a: Option<&CursorItem>, b: &CursorItem) -> bool {
        match a {
            None => true,
            Some(a) => self.cursor_item_sort_key(a) < self.cursor_item_sort_key(b),
        }
    }

    /// One page of entries sorting strictly after `cursor`, in ascending
    /// sort-key order
    #[instrument(skip(self))]
    pub async fn list_folder_using_cursor(
        &self,
        path: &str,
        recursive: bool,
        limit: usize,
        cursor: Option<&CursorItem>,
    ) -> Result<ListPage> {
        if self.capabilities.list_with_cursor {
            return Ok(self
                .driver
                .list_folder_using_cursor(path, recursive, limit, cursor)
                .await?);
        }

        let limit = limit.max(1);
        let watermark = cursor.map(|item| self.cursor_item_sort_key(item));
        // Kept sorted and capped at limit + 1 so overflow is visible in one pass
        let mut accumulator: Vec<(String, Entry)> = Vec::with_capacity(limit + 1);
        self.driver
            .traverse_directory(path, recursive, &mut |entry: Entry| {
                let key = self.entry_sort_key(&entry);
                if watermark.as_ref().is_some_and(|w| key <= *w) {
                    return ControlFlow::Continue(());
                }
                if accumulator.len() > limit
                    && accumulator.last().is_some_and(|(last, _)| key >= *last)
                {
                    return ControlFlow::Continue(());
                }
                let at = accumulator.partition_point(|(k, _)| *k < key);
                accumulator.insert(at, (key, entry));
                accumulator.truncate(limit + 1);
                ControlFlow::Continue(())
            })
            .await?;

        let has_more = accumulator.len() > limit;
        accumulator.truncate(limit);
        let entries: Vec<Entry> = accumulator.into_iter().map(|(_, entry)| entry).collect();
        let cursor_item = match entries.last() {
            Some(last) => self.cursor_item(Some(last)),
            None => cursor.cloned(),
        };
        Ok(ListPage {
            entries,
            has_more,
            cursor_item,
        })
    }

    /// Watermark of the newest entry below `path`
    #[instrument(skip(self))]
    pub async fn get_latest_cursor_item(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<Option<CursorItem>> {
        if self.capabilities.latest_cursor_item {
            return Ok(self.driver.get_latest_cursor_item(path, recursive).await?);
        }

        let mut latest: Option<(String, Entry)> = None;
        self.driver
            .traverse_directory(path, recursive, &mut |entry: Entry| {
                let key = self.entry_sort_key(&entry);
                if latest.as_ref().is_none_or(|(k, _)| key > *k) {
                    latest = Some((key, entry));
                }
                ControlFlow::Continue(())
            })
            .await?;
        Ok(latest.and_then(|(_, entry)| self.cursor_item(Some(&entry))))
    }

    /// Whether anything below `path` sorts after `watermark`
    pub async fn is_any_cursor_item_newer(
        &self,
        path: &str,
        recursive: bool,
        watermark: Option<&CursorItem>,
    ) -> Result<bool> {
        if self.capabilities.newer_check {
            return Ok(self
                .driver
                .is_any_cursor_item_newer(path, recursive, watermark)
                .await?);
        }
        if self.capabilities.latest_cursor_item {
            let latest = self.driver.get_latest_cursor_item(path, recursive).await?;
            return Ok(latest.is_some_and(|l| self.is_cursor_item_newer(watermark, &l)));
        }

        let watermark = watermark.map(|item| self.cursor_item_sort_key(item));
        let mut newer = false;
        self.driver
            .traverse_directory(path, recursive, &mut |entry: Entry| {
                let key = self.entry_sort_key(&entry);
                if watermark.as_ref().is_none_or(|w| key > *w) {
                    newer = true;
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await?;
        Ok(newer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use boxgate_driver::{bytes_stream, collect_bytes, JournalOp, MemoryDriver};
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Minimal memory driver with selectable native operations. Native
    /// calls are recorded; keys are `path_lower`, so native order is by
    /// path rather than by time.
    #[derive(Debug)]
    struct NativeDriver {
        inner: MemoryDriver,
        capabilities: Capabilities,
        calls: Mutex<Vec<&'static str>>,
    }

    impl NativeDriver {
        fn new(capabilities: Capabilities) -> Self {
            Self {
                inner: MemoryDriver::minimal(),
                capabilities,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn canned_item() -> CursorItem {
            CursorItem::new(DateTime::<Utc>::default(), "/native").with_key("native")
        }
    }

    #[async_trait]
    impl Driver for NativeDriver {
        fn name(&self) -> &'static str {
            "native-test"
        }

        fn capabilities(&self) -> Capabilities {
            self.capabilities
        }

        async fn get_object_metadata(&self, path: &str) -> boxgate_driver::Result<Entry> {
            self.inner.get_object_metadata(path).await
        }

        async fn get_object(&self, path: &str) -> boxgate_driver::Result<ByteStream> {
            self.inner.get_object(path).await
        }

        async fn put_object(&self, path: &str, body: ByteStream) -> boxgate_driver::Result<()> {
            self.inner.put_object(path, body).await
        }

        async fn delete_object(&self, path: &str) -> boxgate_driver::Result<()> {
            self.inner.delete_object(path).await
        }

        async fn create_directory(&self, path: &str) -> boxgate_driver::Result<()> {
            self.inner.create_directory(path).await
        }

        async fn traverse_directory(
            &self,
            path: &str,
            recursive: bool,
            visitor: &mut Visitor<'_>,
        ) -> boxgate_driver::Result<()> {
            self.record("traverse_directory");
            self.inner.traverse_directory(path, recursive, visitor).await
        }

        fn entry_sort_key(&self, entry: &Entry) -> Option<String> {
            Some(entry.path_lower.clone())
        }

        fn cursor_item(&self, entry: &Entry) -> Option<CursorItem> {
            self.record("cursor_item");
            Some(entry.cursor_item())
        }

        async fn list_folder_using_cursor(
            &self,
            _path: &str,
            _recursive: bool,
            _limit: usize,
            _cursor: Option<&CursorItem>,
        ) -> boxgate_driver::Result<ListPage> {
            self.record("list_folder_using_cursor");
            Ok(ListPage {
                entries: Vec::new(),
                has_more: true,
                cursor_item: Some(Self::canned_item()),
            })
        }

        async fn get_latest_cursor_item(
            &self,
            _path: &str,
            _recursive: bool,
        ) -> boxgate_driver::Result<Option<CursorItem>> {
            self.record("get_latest_cursor_item");
            Ok(Some(Self::canned_item()))
        }

        async fn is_any_cursor_item_newer(
            &self,
            _path: &str,
            _recursive: bool,
            _watermark: Option<&CursorItem>,
        ) -> boxgate_driver::Result<bool> {
            self.record("is_any_cursor_item_newer");
            Ok(false)
        }

        async fn start_multipart_upload(&self) -> boxgate_driver::Result<String> {
            self.record("start_multipart_upload");
            Ok("native-upload".to_string())
        }

        async fn multipart_upload(
            &self,
            _upload_id: &str,
            _offset: u64,
            _body: ByteStream,
        ) -> boxgate_driver::Result<()> {
            self.record("multipart_upload");
            Ok(())
        }

        async fn finish_multipart_upload(
            &self,
            _upload_id: &str,
            destination: &str,
        ) -> boxgate_driver::Result<()> {
            self.record("finish_multipart_upload");
            self.inner.put_object(destination, bytes_stream(Bytes::new())).await
        }
    }

    fn native_bridge(capabilities: Capabilities) -> (Arc<NativeDriver>, Bridge) {
        let driver = Arc::new(NativeDriver::new(capabilities));
        let bridge = Bridge::new(driver.clone(), BridgeConfig::default());
        (driver, bridge)
    }

    fn bridge(driver: &MemoryDriver) -> Bridge {
        Bridge::new(Arc::new(driver.clone()), BridgeConfig::default())
    }

    async fn put(driver: &MemoryDriver, path: &str) {
        driver
            .put_object(path, bytes_stream(Bytes::from(path.to_string())))
            .await
            .unwrap();
    }

    async fn fill(driver: &MemoryDriver, count: usize) {
        for n in 0..count {
            put(driver, &format!("/dir/f{n:02}")).await;
            // distinct millisecond timestamps
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    #[tokio::test]
    async fn test_capabilities_read_once() {
        let native = bridge(&MemoryDriver::new());
        assert!(native.capabilities().rename);
        let minimal = bridge(&MemoryDriver::minimal());
        assert_eq!(minimal.capabilities(), Capabilities::default());
    }

    #[tokio::test]
    async fn test_directory_metadata_fallback() {
        let driver = MemoryDriver::minimal();
        put(&driver, "/Photos/Summer/beach.jpg").await;
        let bridge = bridge(&driver);

        let entry = bridge.get_directory_metadata("/photos/summer").await.unwrap();
        assert_eq!(entry.path_display, "/Photos/Summer");
        assert!(entry.is_folder());

        let root = bridge.get_directory_metadata("/").await.unwrap();
        assert_eq!(root.path_display, "/");

        let file = bridge.get_directory_metadata("/Photos/Summer/beach.jpg").await;
        assert!(matches!(
            file,
            Err(crate::CoreError::Driver(DriverError::NotADirectory(_)))
        ));
        assert!(bridge.get_directory_metadata("/nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_copy_and_move_fallbacks() {
        let driver = MemoryDriver::minimal();
        put(&driver, "/a.txt").await;
        let bridge = bridge(&driver);
        driver.clear_journal();

        bridge.copy_object("/a.txt", "/b.txt").await.unwrap();
        bridge.move_object("/b.txt", "/c.txt").await.unwrap();

        assert_eq!(
            driver.journal(),
            vec![
                JournalOp::Put("/b.txt".into()),
                JournalOp::Put("/c.txt".into()),
                JournalOp::Delete("/b.txt".into()),
            ]
        );
        let data = collect_bytes(bridge.get_object("/c.txt").await.unwrap())
            .await
            .unwrap();
        assert_eq!(data.as_ref(), b"/a.txt");
    }

    #[tokio::test]
    async fn test_native_move_is_used() {
        let driver = MemoryDriver::new();
        put(&driver, "/a.txt").await;
        driver.clear_journal();

        bridge(&driver).move_object("/a.txt", "/b.txt").await.unwrap();
        assert_eq!(
            driver.journal(),
            vec![JournalOp::Move("/a.txt".into(), "/b.txt".into())]
        );
    }

    #[tokio::test]
    async fn test_get_metadata_resolves_folders() {
        let driver = MemoryDriver::minimal();
        put(&driver, "/x/y.txt").await;
        let bridge = bridge(&driver);
        assert!(bridge.get_metadata("/x").await.unwrap().is_folder());
        assert!(bridge.get_metadata("/x/y.txt").await.unwrap().is_file());
    }

    #[tokio::test]
    async fn test_metadata_with_retry_waits_for_visibility() {
        let driver = MemoryDriver::new().with_visibility_lag(2);
        put(&driver, "/late.txt").await;
        let bridge = bridge(&driver);

        let start = Instant::now();
        let entry = bridge
            .get_object_metadata_with_retry("/late.txt", false)
            .await
            .unwrap();
        assert_eq!(entry.unwrap().path_display, "/late.txt");
        assert_eq!(driver.metadata_calls(), 3);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_metadata_with_retry_resolves_missing_to_none() {
        let driver = MemoryDriver::new();
        let bridge = Bridge::new(
            Arc::new(driver.clone()),
            BridgeConfig {
                retry: RetryConfig {
                    max_retries: 2,
                    base_delay: Duration::from_millis(1),
                    ..RetryConfig::default()
                },
                ..BridgeConfig::default()
            },
        );
        let entry = bridge
            .get_object_metadata_with_retry("/never", false)
            .await
            .unwrap();
        assert!(entry.is_none());
        assert_eq!(driver.metadata_calls(), 3);
    }

    #[test]
    fn test_is_cursor_item_newer() {
        let at = |ms| DateTime::<Utc>::default() + chrono::Duration::milliseconds(ms);
        let old = CursorItem::new(at(1), "/b");
        let new = CursorItem::new(at(2), "/a");
        let bridge = bridge(&MemoryDriver::minimal());
        assert!(bridge.is_cursor_item_newer(None, &old));
        assert!(bridge.is_cursor_item_newer(Some(&old), &new));
        assert!(!bridge.is_cursor_item_newer(Some(&new), &old));
        assert!(!bridge.is_cursor_item_newer(Some(&old), &old));
    }

    #[tokio::test]
    async fn test_pagination_concatenates_to_full_listing() {
        let driver = MemoryDriver::minimal();
        fill(&driver, 7).await;
        let bridge = bridge(&driver);

        let full = bridge
            .list_folder_using_cursor("/dir", false, 100, None)
            .await
            .unwrap();
        assert!(!full.has_more);
        assert_eq!(full.entries.len(), 7);

        let mut pages = Vec::new();
        let mut cursor = None;
        loop {
            let page = bridge
                .list_folder_using_cursor("/dir", false, 3, cursor.as_ref())
                .await
                .unwrap();
            if let (Some(previous), Some(first)) = (cursor.as_ref(), page.entries.first()) {
                assert!(bridge.entry_sort_key(first) > bridge.cursor_item_sort_key(previous));
            }
            pages.extend(page.entries);
            cursor = page.cursor_item;
            if !page.has_more {
                break;
            }
        }
        assert_eq!(pages, full.entries);
    }

    #[tokio::test]
    async fn test_empty_page_keeps_watermark() {
        let driver = MemoryDriver::minimal();
        fill(&driver, 2).await;
        let bridge = bridge(&driver);

        let first = bridge
            .list_folder_using_cursor("/dir", false, 10, None)
            .await
            .unwrap();
        let watermark = first.cursor_item.clone().unwrap();
        let second = bridge
            .list_folder_using_cursor("/dir", false, 10, Some(&watermark))
            .await
            .unwrap();
        assert!(second.entries.is_empty());
        assert!(!second.has_more);
        assert_eq!(second.cursor_item, Some(watermark));
    }

    #[tokio::test]
    async fn test_latest_and_newer_checks() {
        let driver = MemoryDriver::minimal();
        fill(&driver, 3).await;
        let bridge = bridge(&driver);

        let latest = bridge.get_latest_cursor_item("/dir", false).await.unwrap().unwrap();
        assert_eq!(latest.path_display, "/dir/f02");
        assert!(!bridge
            .is_any_cursor_item_newer("/dir", false, Some(&latest))
            .await
            .unwrap());
        assert!(bridge.is_any_cursor_item_newer("/dir", false, None).await.unwrap());

        tokio::time::sleep(Duration::from_millis(2)).await;
        put(&driver, "/dir/f03").await;
        assert!(bridge
            .is_any_cursor_item_newer("/dir", false, Some(&latest))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_newer_check_on_empty_folder() {
        let driver = MemoryDriver::minimal();
        driver.create_directory("/empty").await.unwrap();
        let bridge = bridge(&driver);
        assert!(!bridge.is_any_cursor_item_newer("/empty", true, None).await.unwrap());
        assert!(bridge.get_latest_cursor_item("/empty", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_native_sort_key_pages_consistently() {
        let (driver, bridge) = native_bridge(Capabilities {
            sort_key: true,
            ..Capabilities::default()
        });
        // Written newest-name-first so time order and path order disagree
        for n in (0..5).rev() {
            driver
                .put_object(&format!("/dir/f{n}"), bytes_stream(Bytes::from_static(b"x")))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let full = bridge
            .list_folder_using_cursor("/dir", false, 100, None)
            .await
            .unwrap();
        let names: Vec<&str> = full.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["f0", "f1", "f2", "f3", "f4"]);

        let mut paged = Vec::new();
        let mut cursor = None;
        loop {
            let page = bridge
                .list_folder_using_cursor("/dir", false, 2, cursor.as_ref())
                .await
                .unwrap();
            paged.extend(page.entries);
            cursor = page.cursor_item;
            if !page.has_more {
                break;
            }
        }
        assert_eq!(paged, full.entries);

        let watermark = cursor.unwrap();
        assert_eq!(watermark.key.as_deref(), Some("/dir/f4"));
        assert!(!bridge
            .is_any_cursor_item_newer("/dir", false, Some(&watermark))
            .await
            .unwrap());
        let latest = bridge.get_latest_cursor_item("/dir", false).await.unwrap();
        assert_eq!(latest, Some(watermark.clone()));

        driver
            .put_object("/dir/f5", bytes_stream(Bytes::from_static(b"x")))
            .await
            .unwrap();
        assert!(bridge
            .is_any_cursor_item_newer("/dir", false, Some(&watermark))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_native_cursor_operations_are_delegated() {
        let (driver, bridge) = native_bridge(Capabilities {
            cursor_item: true,
            list_with_cursor: true,
            latest_cursor_item: true,
            newer_check: true,
            ..Capabilities::default()
        });

        let page = bridge
            .list_folder_using_cursor("/", true, 10, None)
            .await
            .unwrap();
        assert!(page.has_more);
        assert_eq!(page.cursor_item, Some(NativeDriver::canned_item()));

        let latest = bridge.get_latest_cursor_item("/", true).await.unwrap();
        assert_eq!(latest, Some(NativeDriver::canned_item()));
        assert!(!bridge.is_any_cursor_item_newer("/", true, None).await.unwrap());

        let entry = Entry::file("/a.txt", 1, Utc::now());
        assert_eq!(bridge.cursor_item(Some(&entry)), Some(entry.cursor_item()));
        assert_eq!(bridge.cursor_item(None), None);

        assert_eq!(
            driver.calls(),
            vec![
                "list_folder_using_cursor",
                "get_latest_cursor_item",
                "is_any_cursor_item_newer",
                "cursor_item",
            ]
        );
    }

    #[tokio::test]
    async fn test_newer_check_prefers_native_latest_over_traversal() {
        let (driver, bridge) = native_bridge(Capabilities {
            latest_cursor_item: true,
            ..Capabilities::default()
        });
        let older = CursorItem::new(DateTime::<Utc>::default(), "/a").with_key("a");
        let newer = CursorItem::new(DateTime::<Utc>::default(), "/z").with_key("z");

        assert!(bridge.is_any_cursor_item_newer("/", true, Some(&older)).await.unwrap());
        assert!(!bridge.is_any_cursor_item_newer("/", true, Some(&newer)).await.unwrap());
        assert_eq!(driver.calls(), vec!["get_latest_cursor_item"; 2]);
    }

    #[tokio::test]
    async fn test_native_multipart_is_delegated() {
        let (driver, bridge) = native_bridge(Capabilities {
            multipart: true,
            ..Capabilities::default()
        });

        let id = bridge.start_multipart_upload().await.unwrap();
        assert_eq!(id, "native-upload");
        bridge
            .multipart_upload(&id, 0, bytes_stream(Bytes::from_static(b"abc")))
            .await
            .unwrap();
        bridge.finish_multipart_upload(&id, "/out.bin").await.unwrap();

        assert_eq!(
            driver.calls(),
            vec![
                "start_multipart_upload",
                "multipart_upload",
                "finish_multipart_upload",
            ]
        );
        // No segment folder was created
        assert!(!driver.inner.contains("/uploads"));
        assert!(driver.inner.contains("/out.bin"));
    }
}
