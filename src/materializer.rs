//! Interpretation of successful response bodies and saving them to disk.

use serde::{Deserialize, Serialize};
use std::{
    io::{Cursor, Read},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    error::{CaptureError, Result},
    operation::{Operation, ResponseKind},
};

/// Separator between records in the combined text unit.
const RECORD_SEPARATOR: &str = "\n\n";

/// One named text result returned by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRecord {
    pub filename: String,
    pub content: String,
}

/// Accepted shapes of a structured body.
#[derive(Deserialize)]
#[serde(untagged)]
enum StructuredBody {
    List(Vec<TextRecord>),
    Wrapped {
        #[serde(alias = "transcriptions", alias = "summaries")]
        results: Vec<TextRecord>,
    },
}

/// Archive received from the server, kept byte-for-byte.
#[derive(Debug)]
pub struct ArchivePayload {
    bytes: Arc<[u8]>,
    entries: Vec<String>,
}

impl ArchivePayload {
    /// Validate the body as a zip archive and record its entry names.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        // Names come from the central directory only; entries are never decompressed.
        let entries = {
            let archive = open_zip(&bytes)?;
            let mut names = Vec::with_capacity(archive.len());
            for i in 0..archive.len() {
                let name = archive.name_for_index(i).ok_or_else(|| {
                    CaptureError::materialize(format!("bad archive entry {i}"))
                })?;
                names.push(name.to_string());
            }
            names
        };
        Ok(Self {
            bytes: bytes.into(),
            entries,
        })
    }

    pub fn entry_names(&self) -> &[String] {
        &self.entries
    }

    /// Decompressed content of one entry.
    #[allow(dead_code)]
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let mut archive = open_zip(&self.bytes)?;
        let mut file = archive
            .by_name(name)
            .map_err(|e| CaptureError::materialize(format!("{name}: {e}")))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| CaptureError::materialize(format!("{name}: {e}")))?;
        Ok(buf)
    }
}

fn open_zip(bytes: &[u8]) -> Result<zip::ZipArchive<Cursor<&[u8]>>> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| CaptureError::materialize(format!("not a zip archive: {e}")))
}

/// List of text records in server order.
#[derive(Debug)]
pub struct StructuredPayload {
    records: Vec<TextRecord>,
}

impl StructuredPayload {
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let parsed: StructuredBody = serde_json::from_slice(body)
            .map_err(|e| CaptureError::materialize(format!("invalid record list: {e}")))?;
        let records = match parsed {
            StructuredBody::List(records) => records,
            StructuredBody::Wrapped { results } => results,
        };
        Ok(Self { records })
    }

    pub fn records(&self) -> &[TextRecord] {
        &self.records
    }

    /// All record contents joined by one blank line.
    pub fn combined(&self) -> String {
        self.records
            .iter()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join(RECORD_SEPARATOR)
    }
}

/// Materialized output of a successful job. Never mutated after creation.
#[derive(Debug)]
pub enum ResultPayload {
    Archive(ArchivePayload),
    Structured(StructuredPayload),
}

/// Which downloadable unit of a payload to save.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveTarget {
    /// The archive itself, or the combined text for structured results.
    Primary,
    /// One structured record by index.
    Record(usize),
}

/// Bytes and suggested file name of one downloadable unit.
#[derive(Clone, Debug)]
pub struct DownloadUnit {
    pub file_name: String,
    pub data: Arc<[u8]>,
}

impl DownloadUnit {
    pub async fn save(&self, dir: &Path) -> Result<PathBuf> {
        save(&self.data, dir, &self.file_name).await
    }
}

impl ResultPayload {
    /// One-line description for listings.
    pub fn summary(&self) -> String {
        match self {
            Self::Archive(a) => format!("archive, {} entries", a.entry_names().len()),
            Self::Structured(s) => format!("{} text records", s.records().len()),
        }
    }

    /// Downloadable unit for `target`, named after the operation.
    pub fn unit(&self, op: Operation, target: SaveTarget) -> Option<DownloadUnit> {
        match (self, target) {
            (Self::Archive(a), SaveTarget::Primary) => Some(DownloadUnit {
                file_name: op.archive_file_name(),
                data: Arc::clone(&a.bytes),
            }),
            (Self::Archive(_), SaveTarget::Record(_)) => None,
            (Self::Structured(s), SaveTarget::Primary) => Some(DownloadUnit {
                file_name: op.combined_file_name(),
                data: s.combined().into_bytes().into(),
            }),
            (Self::Structured(s), SaveTarget::Record(i)) => {
                s.records().get(i).map(|r| DownloadUnit {
                    file_name: r.filename.clone(),
                    data: r.content.as_bytes().into(),
                })
            }
        }
    }

    /// Every downloadable unit: primary first, then each record.
    pub fn units(&self, op: Operation) -> Vec<DownloadUnit> {
        let records = match self {
            Self::Archive(_) => 0,
            Self::Structured(s) => s.records().len(),
        };
        std::iter::once(SaveTarget::Primary)
            .chain((0..records).map(SaveTarget::Record))
            .filter_map(|t| self.unit(op, t))
            .collect()
    }
}

/// Interpret a complete response body for `op`.
pub fn materialize(op: Operation, content_type: Option<&str>, body: Vec<u8>) -> Result<ResultPayload> {
    let structured = match op.response_kind() {
        ResponseKind::Archive => false,
        ResponseKind::ArchiveOrStructured => looks_like_json(content_type, &body),
    };
    if structured {
        Ok(ResultPayload::Structured(StructuredPayload::from_json(&body)?))
    } else {
        Ok(ResultPayload::Archive(ArchivePayload::from_bytes(body)?))
    }
}

fn looks_like_json(content_type: Option<&str>, body: &[u8]) -> bool {
    match content_type {
        Some(ct) if ct.to_ascii_lowercase().contains("json") => true,
        Some(ct) if ct.to_ascii_lowercase().contains("zip") => false,
        _ => matches!(
            body.iter().find(|b| !b.is_ascii_whitespace()),
            Some(b'[') | Some(b'{')
        ),
    }
}

/// Write `data` to `dir` under the final component of `suggested_name`.
pub async fn save(data: &[u8], dir: &Path, suggested_name: &str) -> Result<PathBuf> {
    let name = Path::new(suggested_name)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "result".into());
    let path = dir.join(name);
    let save_err = |source| CaptureError::Save {
        path: path.clone(),
        source,
    };
    tokio::fs::create_dir_all(dir).await.map_err(save_err)?;
    tokio::fs::write(&path, data).await.map_err(save_err)?;
    tracing::info!("saved {} ({} bytes)", path.display(), data.len());
    Ok(path)
}
