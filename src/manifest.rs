//! `manifest.json` run report.

use crate::error::ExportError;
use crate::export::ExportedRecord;
use crate::traversal::RunSummary;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Serialize)]
pub struct ManifestRecord {
    pub seq: u64,
    pub file: String,
    pub attachments_dir: Option<String>,
    pub attachments_saved: usize,
    pub sha256: String,
}

#[derive(Debug, Serialize)]
pub struct Manifest {
    pub container: String,
    pub output_dir: String,
    pub messages_processed: u64,
    pub messages_matched: u64,
    pub messages_exported: usize,
    pub messages_failed: u64,
    pub folders_failed: u64,
    pub attachments_saved: usize,
    pub duration_s: f64,
    pub records: Vec<ManifestRecord>,
    pub version: String,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Hex SHA-256 of a file's contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn sha256_file(path: &Path) -> Result<String, ExportError> {
    let mut file = File::open(path).map_err(|e| ExportError::io("open", path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| ExportError::io("read", path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

impl ManifestRecord {
    fn from_exported(exported: &ExportedRecord) -> Result<Self, ExportError> {
        Ok(Self {
            seq: exported.seq,
            file: file_name(&exported.text_path),
            attachments_dir: exported.attachments_dir.as_deref().map(file_name),
            attachments_saved: exported.attachments_saved,
            sha256: sha256_file(&exported.text_path)?,
        })
    }
}

impl Manifest {
    /// # Errors
    ///
    /// Returns an error if an exported record can no longer be hashed.
    pub fn new(
        container: &Path,
        output_dir: &Path,
        summary: &RunSummary,
        duration: Duration,
    ) -> Result<Self, ExportError> {
        let records = summary
            .exported
            .iter()
            .map(ManifestRecord::from_exported)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            container: container.display().to_string(),
            output_dir: output_dir.display().to_string(),
            messages_processed: summary.processed,
            messages_matched: summary.matched,
            messages_exported: summary.exported.len(),
            messages_failed: summary.failed,
            folders_failed: summary.folders_failed,
            attachments_saved: summary.attachments_saved(),
            duration_s: duration.as_secs_f64(),
            records,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Writes pretty JSON to `dir/manifest.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| ExportError::io("write", &path, e))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(sha256_file(&tmp.path().join("missing")).is_err());
    }

    #[test]
    fn test_manifest_lists_exported_records() {
        let tmp = TempDir::new().unwrap();
        let text = tmp.path().join("r (1 вложений)_3.txt");
        std::fs::write(&text, b"abc").unwrap();
        let summary = RunSummary {
            processed: 5,
            matched: 2,
            failed: 1,
            folders_failed: 0,
            exported: vec![ExportedRecord {
                seq: 3,
                text_path: text,
                attachments_dir: Some(tmp.path().join("r (1 вложений)_3")),
                attachments_saved: 1,
            }],
        };

        let manifest =
            Manifest::new(Path::new("a.pst"), tmp.path(), &summary, Duration::from_millis(1500))
                .unwrap();
        let path = manifest.write(tmp.path()).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();

        assert_eq!(json["messages_processed"], 5);
        assert_eq!(json["messages_exported"], 1);
        assert_eq!(json["attachments_saved"], 1);
        assert_eq!(json["duration_s"], 1.5);
        assert_eq!(json["records"][0]["file"], "r (1 вложений)_3.txt");
        assert_eq!(json["records"][0]["attachments_dir"], "r (1 вложений)_3");
        assert_eq!(
            json["records"][0]["sha256"],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
