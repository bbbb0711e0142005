//! Media items staged for submission and the working set that holds them.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use uuid::Uuid;

use crate::error::{CaptureError, Result};

/// Extensions picked up when a directory is added.
const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "webm", "mov", "mkv", "avi"];

/// One user-selected video file.
///
/// Identity is the `id`; two items with the same name and bytes are still
/// distinct. Clones share the identity of the original.
#[derive(Clone, Debug)]
pub struct MediaItem {
    pub id: Uuid,
    /// Display name, also sent as the multipart file name.
    pub name: String,
    pub mime: String,
    pub content: Arc<[u8]>,
    /// File the bytes were read from, if any.
    pub origin: Option<PathBuf>,
}

impl MediaItem {
    pub fn from_bytes(name: impl Into<String>, content: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            mime: mime_for(&name).to_string(),
            name,
            content: content.into(),
            origin: None,
        }
    }

    /// Read a file from disk into a new item.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| CaptureError::MediaRead {
                path: path.to_path_buf(),
                source,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mut item = Self::from_bytes(name, bytes);
        item.origin = Some(path.to_path_buf());
        Ok(item)
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// MIME type guessed from the file extension.
pub fn mime_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

/// Load a single file, or every video file directly inside a directory.
///
/// Directory entries are returned sorted by file name.
pub async fn collect_media(path: &Path) -> Result<Vec<MediaItem>> {
    let read_err = |source| CaptureError::MediaRead {
        path: path.to_path_buf(),
        source,
    };
    let meta = tokio::fs::metadata(path).await.map_err(read_err)?;
    if !meta.is_dir() {
        return Ok(vec![MediaItem::from_path(path).await?]);
    }

    let mut paths = Vec::new();
    let mut dir = tokio::fs::read_dir(path).await.map_err(read_err)?;
    while let Some(entry) = dir.next_entry().await.map_err(read_err)? {
        let p = entry.path();
        let is_video = p
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.as_str()));
        if is_video {
            paths.push(p);
        }
    }
    paths.sort();

    let mut items = Vec::with_capacity(paths.len());
    for p in paths {
        items.push(MediaItem::from_path(&p).await?);
    }
    Ok(items)
}

/// Counts preview references that have been handed out and not yet released.
#[derive(Clone, Debug, Default)]
pub struct PreviewRegistry {
    live: Arc<AtomicUsize>,
}

impl PreviewRegistry {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn acquire(&self, item: &MediaItem) -> Preview {
        self.live.fetch_add(1, Ordering::SeqCst);
        let uri = match &item.origin {
            Some(path) => file_uri(path),
            None => format!("memory://{}/{}", item.id, urlencoding::encode(&item.name)),
        };
        Preview {
            uri,
            origin: item.origin.clone(),
            live: Arc::clone(&self.live),
        }
    }
}

/// Transient local reference used to play back a staged item.
///
/// Released when dropped.
#[derive(Debug)]
pub struct Preview {
    uri: String,
    origin: Option<PathBuf>,
    live: Arc<AtomicUsize>,
}

impl Preview {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Open the preview in the system's default player.
    pub fn open(&self) -> anyhow::Result<()> {
        if self.origin.is_none() {
            anyhow::bail!("no local file to preview");
        }
        webbrowser::open(&self.uri)?;
        Ok(())
    }
}

impl Drop for Preview {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!("preview released: {}", self.uri);
    }
}

fn file_uri(path: &Path) -> String {
    let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let encoded = abs
        .to_string_lossy()
        .replace('\\', "/")
        .split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    if encoded.starts_with('/') {
        format!("file://{encoded}")
    } else {
        format!("file:///{encoded}")
    }
}

struct Entry {
    item: MediaItem,
    preview: Preview,
}

/// Ordered collection of items for the next job.
///
/// Not cleared after a job; the same set can be submitted to several
/// operations.
#[derive(Default)]
pub struct WorkingSet {
    entries: Vec<Entry>,
    previews: PreviewRegistry,
}

impl WorkingSet {
    pub fn new(previews: PreviewRegistry) -> Self {
        Self {
            entries: Vec::new(),
            previews,
        }
    }

    /// Append in the given order. Duplicates are kept as separate entries.
    pub fn add_files(&mut self, files: impl IntoIterator<Item = MediaItem>) {
        for item in files {
            let preview = self.previews.acquire(&item);
            tracing::debug!("staged {} ({} bytes)", item.name, item.size());
            self.entries.push(Entry { item, preview });
        }
    }

    /// Remove the first entry with this identity; no-op when absent.
    pub fn remove_file(&mut self, id: Uuid) -> Option<MediaItem> {
        let pos = self.entries.iter().position(|e| e.item.id == id)?;
        let entry = self.entries.remove(pos);
        tracing::debug!("unstaged {}", entry.item.name);
        Some(entry.item)
    }

    /// Drop every entry, releasing all previews.
    pub fn clear(&mut self) {
        tracing::debug!("unstaged all {} files", self.entries.len());
        self.entries.clear();
    }

    /// Previews still held by this set's registry.
    pub fn live_previews(&self) -> usize {
        self.previews.live()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&MediaItem> {
        self.entries.get(idx).map(|e| &e.item)
    }

    pub fn items(&self) -> impl Iterator<Item = &MediaItem> {
        self.entries.iter().map(|e| &e.item)
    }

    pub fn preview(&self, idx: usize) -> Option<&Preview> {
        self.entries.get(idx).map(|e| &e.preview)
    }

    /// Read-only copy handed to the dispatcher. Content is shared, not copied.
    pub fn snapshot(&self) -> Vec<MediaItem> {
        self.items().cloned().collect()
    }

    pub fn total_bytes(&self) -> usize {
        self.items().map(MediaItem::size).sum()
    }
}
