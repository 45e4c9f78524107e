//! Segmented (multipart) uploads
//!
//! Drivers without native multipart support get a segment-file fallback:
//! every append is written to `<upload_root>/<upload_id>/<offset>.bin` and
//! finishing concatenates the segments in offset order into the destination.

use crate::{Bridge, CoreError, Result};
use boxgate_driver::{path, ByteStream, Entry};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::ops::ControlFlow;
use tracing::{debug, instrument, warn};

const SEGMENT_SUFFIX: &str = ".bin";

/// A stored segment of an upload
#[derive(Clone, Debug, PartialEq, Eq)]
struct Segment {
    offset: u64,
    size: u64,
    path: String,
}

impl Bridge {
    /// Start an upload and return its id
    #[instrument(skip(self))]
    pub async fn start_multipart_upload(&self) -> Result<String> {
        if self.capabilities.multipart {
            return Ok(self.driver.start_multipart_upload().await?);
        }
        let upload_id = uuid::Uuid::new_v4().simple().to_string();
        self.driver.create_directory(&self.segment_dir(&upload_id)).await?;
        debug!(%upload_id, "Started segmented upload");
        Ok(upload_id)
    }

    /// Store the bytes of `body` at `offset` within the upload
    #[instrument(skip(self, body))]
    pub async fn multipart_upload(&self, upload_id: &str, offset: u64, body: ByteStream) -> Result<()> {
        if self.capabilities.multipart {
            return Ok(self.driver.multipart_upload(upload_id, offset, body).await?);
        }
        let dir = self.checked_segment_dir(upload_id)?;
        if self.get_object_metadata_with_retry(&dir, true).await?.is_none() {
            return Err(CoreError::UploadSessionNotFound(upload_id.to_string()));
        }
        let segment = path::join(&dir, &format!("{offset}{SEGMENT_SUFFIX}"));
        Ok(self.driver.put_object(&segment, body).await?)
    }

    /// Concatenate every segment into `destination` and drop the segments.
    ///
    /// Segments must cover one contiguous byte range starting at offset 0.
    #[instrument(skip(self))]
    pub async fn finish_multipart_upload(&self, upload_id: &str, destination: &str) -> Result<()> {
        if self.capabilities.multipart {
            return Ok(self
                .driver
                .finish_multipart_upload(upload_id, destination)
                .await?);
        }
        let dir = self.checked_segment_dir(upload_id)?;
        let segments = self.segments(upload_id, &dir).await?;
        check_contiguous(upload_id, &segments)?;

        let driver = self.driver.clone();
        let paths: Vec<String> = segments.iter().map(|s| s.path.clone()).collect();
        let body = stream::iter(paths)
            .then(move |segment| {
                let driver = driver.clone();
                async move { driver.get_object(&segment).await }
            })
            .try_flatten()
            .boxed();
        self.driver.put_object(destination, body).await?;

        // The destination is complete; cleanup failures only leave garbage
        self.remove_segments(&dir, &segments).await;
        Ok(())
    }

    /// Best-effort removal of an abandoned upload's segments
    pub async fn abort_multipart_upload(&self, upload_id: &str) {
        if self.capabilities.multipart {
            debug!(%upload_id, "Native uploads expire on the backend");
            return;
        }
        let Ok(dir) = self.checked_segment_dir(upload_id) else {
            return;
        };
        let segments = match self.segments(upload_id, &dir).await {
            Ok(segments) => segments,
            Err(e) => {
                debug!(%upload_id, error = %e, "Nothing to abort");
                return;
            }
        };
        self.remove_segments(&dir, &segments).await;
    }

    async fn remove_segments(&self, dir: &str, segments: &[Segment]) {
        for segment in segments {
            if let Err(e) = self.driver.delete_object(&segment.path).await {
                warn!(path = %segment.path, error = %e, "Failed to delete upload segment");
            }
        }
        if let Err(e) = self.delete_directory(dir).await {
            warn!(path = %dir, error = %e, "Failed to delete upload segment folder");
        }
    }

    fn segment_dir(&self, upload_id: &str) -> String {
        path::join(&path::normalize(&self.config.upload_root), upload_id)
    }

    fn checked_segment_dir(&self, upload_id: &str) -> Result<String> {
        let valid = !upload_id.is_empty()
            && upload_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(CoreError::UploadSessionNotFound(upload_id.to_string()));
        }
        Ok(self.segment_dir(upload_id))
    }

    /// Stored segments sorted by offset
    async fn segments(&self, upload_id: &str, dir: &str) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();
        let listed = self
            .driver
            .traverse_directory(dir, false, &mut |entry: Entry| {
                if let Some(segment) = parse_segment(&entry) {
                    segments.push(segment);
                }
                ControlFlow::Continue(())
            })
            .await;
        match listed {
            Err(e) if e.is_not_found() => {
                return Err(CoreError::UploadSessionNotFound(upload_id.to_string()))
            }
            other => other?,
        }
        segments.sort_by_key(|s| s.offset);
        Ok(segments)
    }
}

fn parse_segment(entry: &Entry) -> Option<Segment> {
    if !entry.is_file() {
        return None;
    }
    let offset = entry.name.strip_suffix(SEGMENT_SUFFIX)?.parse().ok()?;
    Some(Segment {
        offset,
        size: entry.size,
        path: entry.path_display.clone(),
    })
}

fn check_contiguous(upload_id: &str, segments: &[Segment]) -> Result<()> {
    let mut expected = 0;
    for segment in segments {
        if segment.offset != expected {
            return Err(CoreError::IncompleteUpload(format!(
                "{upload_id}: expected offset {expected}, found {}",
                segment.offset
            )));
        }
        expected += segment.size;
    }
    Ok(())
}
