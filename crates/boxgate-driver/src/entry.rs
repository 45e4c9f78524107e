//! Normalized file/folder entries and their cursor projection

use crate::path;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Revision reported by backends that have no revision concept
pub const PLACEHOLDER_REV: &str = "000000001";

/// Block size used by the content hash (4 MiB)
pub const CONTENT_HASH_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Kind of an entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryTag {
    File,
    Folder,
}

impl EntryTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
        }
    }
}

/// One file or folder as reported by a driver
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = ".tag")]
    pub tag: EntryTag,
    /// Leaf name
    pub name: String,
    /// Case-insensitive canonical key
    pub path_lower: String,
    /// Case-preserving path
    pub path_display: String,
    /// Identifier; equals `path_display` on backends without real ids
    pub id: String,
    #[serde(with = "timestamp")]
    pub client_modified: DateTime<Utc>,
    /// For folders this is synthesized (usually creation time)
    #[serde(with = "timestamp")]
    pub server_modified: DateTime<Utc>,
    pub rev: String,
    /// Size in bytes, zero for folders
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl Entry {
    /// Build a file entry
    pub fn file(path_display: impl Into<String>, size: u64, modified: DateTime<Utc>) -> Self {
        Self::new(EntryTag::File, path_display.into(), size, modified)
    }

    /// Build a folder entry
    pub fn folder(path_display: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self::new(EntryTag::Folder, path_display.into(), 0, created)
    }

    fn new(tag: EntryTag, path_display: String, size: u64, modified: DateTime<Utc>) -> Self {
        let modified = modified.trunc_subsecs(3);
        Self {
            tag,
            name: path::basename(&path_display).to_string(),
            path_lower: path_display.to_lowercase(),
            id: path_display.clone(),
            path_display,
            client_modified: modified,
            server_modified: modified,
            rev: PLACEHOLDER_REV.to_string(),
            size,
            content_hash: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = rev.into();
        self
    }

    pub fn with_client_modified(mut self, client_modified: DateTime<Utc>) -> Self {
        self.client_modified = client_modified.trunc_subsecs(3);
        self
    }

    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    /// Re-home the entry at another path, keeping everything else
    pub fn relocated(mut self, path_display: impl Into<String>) -> Self {
        let path_display = path_display.into();
        if self.id == self.path_display {
            self.id = path_display.clone();
        }
        self.name = path::basename(&path_display).to_string();
        self.path_lower = path_display.to_lowercase();
        self.path_display = path_display;
        self
    }

    pub fn is_folder(&self) -> bool {
        self.tag == EntryTag::Folder
    }

    pub fn is_file(&self) -> bool {
        self.tag == EntryTag::File
    }

    /// Default sort key: `server_modified` followed by `path_display`.
    ///
    /// The timestamp is rendered at fixed width so that lexical string
    /// comparison agrees with chronological order.
    pub fn sort_key(&self) -> String {
        sort_key(&self.server_modified, &self.path_display)
    }

    /// Minimal projection used as a listing watermark
    pub fn cursor_item(&self) -> CursorItem {
        CursorItem {
            server_modified: self.server_modified,
            path_display: self.path_display.clone(),
            key: None,
        }
    }
}

/// Watermark projection of an [`Entry`]
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorItem {
    #[serde(with = "timestamp_millis")]
    pub server_modified: DateTime<Utc>,
    pub path_display: String,
    /// Backend-native ordering token of the projected entry, when the
    /// driver orders entries by something other than the default key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl CursorItem {
    pub fn new(server_modified: DateTime<Utc>, path_display: impl Into<String>) -> Self {
        Self {
            server_modified: server_modified.trunc_subsecs(3),
            path_display: path_display.into(),
            key: None,
        }
    }

    /// Attach a backend-native ordering token
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// The native token when present, the default key otherwise
    pub fn sort_key(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => sort_key(&self.server_modified, &self.path_display),
        }
    }
}

fn sort_key(server_modified: &DateTime<Utc>, path_display: &str) -> String {
    let mut key = server_modified.to_rfc3339_opts(SecondsFormat::Millis, true);
    key.push_str(path_display);
    key
}

/// Dropbox-compatible content hash: SHA-256 over the concatenated SHA-256
/// digests of every 4 MiB block.
pub fn content_hash(data: &[u8]) -> String {
    let mut overall = Sha256::new();
    for block in data.chunks(CONTENT_HASH_BLOCK_SIZE) {
        overall.update(Sha256::digest(block));
    }
    hex::encode(overall.finalize())
}

/// Second-precision timestamps, the way Dropbox renders them
mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Millisecond-precision timestamps; watermarks must survive a round trip
mod timestamp_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
