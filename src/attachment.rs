//! Attachment type sniffing.
//!
//! PST attachments often carry no usable MIME type, so the file extension is
//! decided from the payload itself.

use std::fmt;
use std::io::Cursor;
use tracing::debug;

/// Recognized attachment formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    Pdf,
    Rar,
    SevenZip,
    Zip,
    Docx,
    Xlsx,
    Pptx,
}

impl AttachmentKind {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Rar => "rar",
            Self::SevenZip => "7z",
            Self::Zip => "zip",
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::Pptx => "pptx",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

const SIGNATURES: &[(&[u8], AttachmentKind)] = &[
    (b"%PDF", AttachmentKind::Pdf),
    (b"Rar!\x1A\x07\x00", AttachmentKind::Rar),
    (b"Rar!\x1A\x07\x01\x00", AttachmentKind::Rar),
    (b"7z\xBC\xAF\x27\x1C", AttachmentKind::SevenZip),
];

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// Office Open XML part prefixes, checked in order.
const OFFICE_PARTS: &[(&str, AttachmentKind)] = &[
    ("word/", AttachmentKind::Docx),
    ("xl/", AttachmentKind::Xlsx),
    ("ppt/", AttachmentKind::Pptx),
];

const NAME_SUFFIXES: &[(&str, AttachmentKind)] = &[
    (".7z", AttachmentKind::SevenZip),
    (".rar", AttachmentKind::Rar),
    (".zip", AttachmentKind::Zip),
    (".pdf", AttachmentKind::Pdf),
];

/// How many leading bytes are searched for a file name.
const NAME_SCAN_LEN: usize = 100;

/// Classifies a payload, or `None` when it is not a recognized format.
#[must_use]
pub fn classify(data: &[u8]) -> Option<AttachmentKind> {
    if data.is_empty() {
        return None;
    }

    if let Some((_, kind)) = SIGNATURES.iter().find(|(magic, _)| data.starts_with(magic)) {
        return Some(*kind);
    }

    if data.starts_with(ZIP_SIGNATURE) {
        return Some(classify_zip(data));
    }

    classify_by_name(data)
}

fn classify_zip(data: &[u8]) -> AttachmentKind {
    let archive = match zip::ZipArchive::new(Cursor::new(data)) {
        Ok(archive) => archive,
        Err(err) => {
            debug!(error = %err, "unreadable zip payload, keeping it as zip");
            return AttachmentKind::Zip;
        }
    };
    let names: Vec<&str> = archive.file_names().collect();
    OFFICE_PARTS
        .iter()
        .find(|(prefix, _)| names.iter().any(|name| name.starts_with(prefix)))
        .map_or(AttachmentKind::Zip, |(_, kind)| *kind)
}

/// Last resort: some payloads begin with the attachment's file name.
fn classify_by_name(data: &[u8]) -> Option<AttachmentKind> {
    if data.len() <= 4 {
        return None;
    }
    let head: String = data[..data.len().min(NAME_SCAN_LEN)]
        .iter()
        .filter(|b| b.is_ascii())
        .map(|b| char::from(b.to_ascii_lowercase()))
        .collect();
    NAME_SUFFIXES
        .iter()
        .find(|(suffix, _)| head.ends_with(suffix))
        .map(|(_, kind)| *kind)
}
