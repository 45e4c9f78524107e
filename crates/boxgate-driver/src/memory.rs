//! In-memory driver for testing and development

use crate::{
    collect_bytes, entry::content_hash, path, ByteStream, Capabilities, Driver, DriverError,
    Entry, Result, Visitor,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// A mutation recorded by [`MemoryDriver`], in the order it happened
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalOp {
    Put(String),
    Delete(String),
    DeleteDirectory(String),
    CreateDirectory(String),
    Copy(String, String),
    Move(String, String),
}

#[derive(Clone, Debug)]
enum NodeKind {
    File(Bytes),
    Folder,
}

#[derive(Clone, Debug)]
struct Node {
    path_display: String,
    kind: NodeKind,
    modified: DateTime<Utc>,
    id: String,
    rev: u64,
    content_hash: Option<String>,
}

impl Node {
    fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder)
    }

    fn to_entry(&self) -> Entry {
        let entry = match &self.kind {
            NodeKind::File(data) => Entry::file(&self.path_display, data.len() as u64, self.modified),
            NodeKind::Folder => Entry::folder(&self.path_display, self.modified),
        };
        let entry = entry
            .with_id(self.id.clone())
            .with_rev(format!("{:09x}", self.rev));
        match &self.content_hash {
            Some(hash) => entry.with_content_hash(hash.clone()),
            None => entry,
        }
    }
}

#[derive(Debug)]
struct Inner {
    /// Keyed by lowercased path, so lookups are case-insensitive
    nodes: RwLock<BTreeMap<String, Node>>,
    capabilities: Capabilities,
    visibility_lag: u32,
    /// Remaining "not found" answers per freshly written path
    pending: Mutex<HashMap<String, u32>>,
    metadata_calls: AtomicUsize,
    journal: Mutex<Vec<JournalOp>>,
    revision: AtomicU64,
    created: DateTime<Utc>,
}

/// An in-memory driver.
///
/// Paths are matched case-insensitively while the display case of the
/// first writer is preserved. Deleting a directory that still has children
/// fails, like it does on most real backends.
#[derive(Clone, Debug)]
pub struct MemoryDriver {
    inner: Arc<Inner>,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    /// Operations this driver can serve natively
    pub const NATIVE: Capabilities = Capabilities {
        delete_directory: true,
        directory_metadata: true,
        copy: true,
        rename: true,
        sort_key: false,
        cursor_item: false,
        list_with_cursor: false,
        latest_cursor_item: false,
        newer_check: false,
        multipart: false,
    };

    /// Create an empty driver advertising its native operations
    pub fn new() -> Self {
        Self::build(Self::NATIVE, 0)
    }

    /// Create an empty driver that advertises nothing optional, so every
    /// optional operation goes through the bridge fallbacks
    pub fn minimal() -> Self {
        Self::build(Capabilities::default(), 0)
    }

    /// Advertise a subset of the native operations
    pub fn with_capabilities(self, capabilities: Capabilities) -> Self {
        let native = Self::NATIVE;
        let capabilities = Capabilities {
            delete_directory: capabilities.delete_directory && native.delete_directory,
            directory_metadata: capabilities.directory_metadata && native.directory_metadata,
            copy: capabilities.copy && native.copy,
            rename: capabilities.rename && native.rename,
            ..Capabilities::default()
        };
        Self::build(capabilities, self.inner.visibility_lag)
    }

    /// Model an eventually consistent store: every freshly written path
    /// answers "not found" to the next `lag` metadata lookups
    pub fn with_visibility_lag(self, lag: u32) -> Self {
        Self::build(self.inner.capabilities, lag)
    }

    fn build(capabilities: Capabilities, visibility_lag: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                nodes: RwLock::new(BTreeMap::new()),
                capabilities,
                visibility_lag,
                pending: Mutex::new(HashMap::new()),
                metadata_calls: AtomicUsize::new(0),
                journal: Mutex::new(Vec::new()),
                revision: AtomicU64::new(0),
                created: Utc::now(),
            }),
        }
    }

    /// Number of stored files and folders
    pub fn len(&self) -> usize {
        self.inner.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.read().is_empty()
    }

    /// Whether anything exists at `path`
    pub fn contains(&self, path: &str) -> bool {
        self.inner.nodes.read().contains_key(&key(path))
    }

    /// Content of the file at `path`, bypassing visibility lag
    pub fn read(&self, path: &str) -> Option<Bytes> {
        match self.inner.nodes.read().get(&key(path)) {
            Some(Node { kind: NodeKind::File(data), .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Mutations performed so far
    pub fn journal(&self) -> Vec<JournalOp> {
        self.inner.journal.lock().clone()
    }

    pub fn clear_journal(&self) {
        self.inner.journal.lock().clear();
    }

    /// How many metadata lookups have been served (including lagged ones)
    pub fn metadata_calls(&self) -> usize {
        self.inner.metadata_calls.load(Ordering::SeqCst)
    }

    fn record(&self, op: JournalOp) {
        self.inner.journal.lock().push(op);
    }

    fn next_rev(&self) -> u64 {
        self.inner.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn mark_fresh(&self, key: &str) {
        if self.inner.visibility_lag > 0 {
            self.inner
                .pending
                .lock()
                .insert(key.to_string(), self.inner.visibility_lag);
        }
    }

    /// Consume one lagged answer for `key`, if any are left
    fn still_invisible(&self, key: &str) -> bool {
        let mut pending = self.inner.pending.lock();
        match pending.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            Some(_) => {
                pending.remove(key);
                false
            }
            None => false,
        }
    }

    fn root_entry(&self) -> Entry {
        Entry::folder(path::ROOT, self.inner.created)
    }

    /// Create folder nodes for every missing ancestor of `path`
    fn ensure_parents(nodes: &mut BTreeMap<String, Node>, path: &str, rev: u64) -> Result<()> {
        let parent = path::parent(path);
        if path::is_root(parent) {
            return Ok(());
        }
        let mut current = String::new();
        for segment in parent.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            let k = current.to_lowercase();
            match nodes.get(&k) {
                Some(node) if !node.is_folder() => {
                    return Err(DriverError::NotADirectory(node.path_display.clone()));
                }
                Some(_) => {}
                None => {
                    nodes.insert(k, folder_node(&current, rev));
                }
            }
        }
        Ok(())
    }

    fn has_children(nodes: &BTreeMap<String, Node>, key: &str) -> bool {
        let prefix = format!("{key}/");
        nodes
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix))
    }

    fn write_file(&self, path: &str, data: Bytes, keep_id: Option<String>) -> Result<()> {
        let k = key(path);
        let display = path::normalize(path);
        let rev = self.next_rev();
        let mut nodes = self.inner.nodes.write();
        Self::ensure_parents(&mut nodes, &display, rev)?;
        let id = match nodes.get(&k) {
            Some(existing) if existing.is_folder() => {
                return Err(DriverError::AlreadyExists(existing.path_display.clone()));
            }
            Some(existing) => keep_id.unwrap_or_else(|| existing.id.clone()),
            None => keep_id.unwrap_or_else(new_id),
        };
        nodes.insert(
            k.clone(),
            Node {
                path_display: display,
                content_hash: Some(content_hash(&data)),
                kind: NodeKind::File(data),
                modified: Utc::now(),
                id,
                rev,
            },
        );
        drop(nodes);
        self.mark_fresh(&k);
        Ok(())
    }

    fn lookup(&self, path: &str) -> Result<Node> {
        self.inner
            .nodes
            .read()
            .get(&key(path))
            .cloned()
            .ok_or_else(|| DriverError::NotFound(path.to_string()))
    }
}

fn key(path: &str) -> String {
    path::normalize(path).to_lowercase()
}

fn new_id() -> String {
    format!("id:{}", uuid::Uuid::new_v4().simple())
}

fn folder_node(path_display: &str, rev: u64) -> Node {
    Node {
        path_display: path_display.to_string(),
        kind: NodeKind::Folder,
        modified: Utc::now(),
        id: new_id(),
        rev,
        content_hash: None,
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities
    }

    async fn get_object_metadata(&self, path: &str) -> Result<Entry> {
        self.inner.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if path::is_root(&path::normalize(path)) {
            return Ok(self.root_entry());
        }
        let k = key(path);
        if self.still_invisible(&k) {
            return Err(DriverError::NotFound(path.to_string()));
        }
        Ok(self.lookup(path)?.to_entry())
    }

    async fn get_object(&self, path: &str) -> Result<ByteStream> {
        match self.lookup(path)?.kind {
            NodeKind::File(data) => Ok(crate::bytes_stream(data)),
            NodeKind::Folder => Err(DriverError::InvalidPath(format!("{path} is a folder"))),
        }
    }

    async fn put_object(&self, path: &str, body: ByteStream) -> Result<()> {
        let data = collect_bytes(body).await?;
        self.write_file(path, data, None)?;
        self.record(JournalOp::Put(path::normalize(path)));
        Ok(())
    }

    async fn delete_object(&self, path: &str) -> Result<()> {
        let k = key(path);
        let mut nodes = self.inner.nodes.write();
        if !nodes.contains_key(&k) {
            return Err(DriverError::NotFound(path.to_string()));
        }
        if Self::has_children(&nodes, &k) {
            return Err(DriverError::DirectoryNotEmpty(path.to_string()));
        }
        nodes.remove(&k);
        drop(nodes);
        self.record(JournalOp::Delete(path::normalize(path)));
        Ok(())
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        let display = path::normalize(path);
        if path::is_root(&display) {
            return Ok(());
        }
        let k = display.to_lowercase();
        let rev = self.next_rev();
        let mut nodes = self.inner.nodes.write();
        Self::ensure_parents(&mut nodes, &display, rev)?;
        match nodes.get(&k) {
            Some(node) if node.is_folder() => return Ok(()),
            Some(node) => return Err(DriverError::AlreadyExists(node.path_display.clone())),
            None => {
                nodes.insert(k.clone(), folder_node(&display, rev));
            }
        }
        drop(nodes);
        self.mark_fresh(&k);
        self.record(JournalOp::CreateDirectory(display));
        Ok(())
    }

    async fn traverse_directory(
        &self,
        path: &str,
        recursive: bool,
        visitor: &mut Visitor<'_>,
    ) -> Result<()> {
        let k = key(path);
        // Snapshot first so the visitor never runs under the lock
        let snapshot: Vec<Entry> = {
            let nodes = self.inner.nodes.read();
            let prefix = if path::is_root(&k) {
                "/".to_string()
            } else {
                match nodes.get(&k) {
                    Some(node) if node.is_folder() => {}
                    Some(node) => return Err(DriverError::NotADirectory(node.path_display.clone())),
                    None => return Err(DriverError::NotFound(path.to_string())),
                }
                format!("{k}/")
            };
            nodes
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .filter(|(k, _)| recursive || !k[prefix.len()..].contains('/'))
                .map(|(_, node)| node.to_entry())
                .collect()
        };

        for entry in snapshot {
            if let ControlFlow::Break(()) = visitor(entry) {
                break;
            }
        }
        Ok(())
    }

    async fn delete_directory(&self, path: &str) -> Result<()> {
        let k = key(path);
        let mut nodes = self.inner.nodes.write();
        match nodes.get(&k) {
            Some(node) if node.is_folder() => {}
            Some(node) => return Err(DriverError::NotADirectory(node.path_display.clone())),
            None => return Err(DriverError::NotFound(path.to_string())),
        }
        if Self::has_children(&nodes, &k) {
            return Err(DriverError::DirectoryNotEmpty(path.to_string()));
        }
        nodes.remove(&k);
        drop(nodes);
        self.record(JournalOp::DeleteDirectory(path::normalize(path)));
        Ok(())
    }

    async fn get_directory_metadata(&self, path: &str) -> Result<Entry> {
        self.inner.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if path::is_root(&path::normalize(path)) {
            return Ok(self.root_entry());
        }
        let k = key(path);
        if self.still_invisible(&k) {
            return Err(DriverError::NotFound(path.to_string()));
        }
        let node = self.lookup(path)?;
        if !node.is_folder() {
            return Err(DriverError::NotADirectory(node.path_display));
        }
        Ok(node.to_entry())
    }

    async fn copy_object(&self, from: &str, to: &str) -> Result<()> {
        let data = match self.lookup(from)?.kind {
            NodeKind::File(data) => data,
            NodeKind::Folder => return Err(DriverError::InvalidPath(format!("{from} is a folder"))),
        };
        self.write_file(to, data, None)?;
        self.record(JournalOp::Copy(path::normalize(from), path::normalize(to)));
        Ok(())
    }

    async fn move_object(&self, from: &str, to: &str) -> Result<()> {
        let source = self.lookup(from)?;
        let data = match source.kind {
            NodeKind::File(data) => data,
            NodeKind::Folder => return Err(DriverError::InvalidPath(format!("{from} is a folder"))),
        };
        self.write_file(to, data, Some(source.id))?;
        self.inner.nodes.write().remove(&key(from));
        self.record(JournalOp::Move(path::normalize(from), path::normalize(to)));
        Ok(())
    }
}
