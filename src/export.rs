//! Writes matched messages to the output directory.
//!
//! Each message becomes one text record. Classified attachments go to a
//! sibling directory named after the record; when at least one was saved both
//! are renamed to carry the saved count.

use crate::attachment::classify;
use crate::error::{Error, ExportError, MessageError};
use crate::store::Message;
use crate::time::{file_stamp, format_instant, now_canonical};
use chrono::{DateTime, FixedOffset};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

const BANNER_WIDTH: usize = 80;
const MAX_NAME_CHARS: usize = 250;
/// Leaves room under the 255-byte file name limit for the rename suffix,
/// a collision counter and `.txt`.
const MAX_BASE_BYTES: usize = 200;
const FORBIDDEN_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Rendered when the `To` header yields nothing.
pub const NO_RECIPIENTS: &str = "Не указаны";

/// Rendered when the folder chain is empty.
pub const UNKNOWN_FOLDER: &str = "Неизвестная папка";

/// Makes `name` usable as a file name component.
///
/// Compatibility-decomposes, drops `\ / * ? : " < > |`, turns line breaks into
/// spaces, trims dots and spaces from both ends and keeps 250 characters.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .nfkd()
        .filter(|c| !FORBIDDEN_CHARS.contains(c))
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    cleaned
        .trim_matches(|c: char| c == '.' || c == ' ')
        .chars()
        .take(MAX_NAME_CHARS)
        .collect()
}

/// `stem`, or `stem_N` with the smallest `N` from 1 for which `taken` is false.
fn free_name(stem: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut candidate = stem.to_string();
    let mut counter = 1u32;
    while taken(&candidate) {
        candidate = format!("{stem}_{counter}");
        counter += 1;
    }
    candidate
}

/// The normalized view of a matched message.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    /// Ancestor folder names, outermost first.
    pub folder_path: Vec<String>,
    pub seq: u64,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub sent: Option<DateTime<FixedOffset>>,
    pub received: Option<DateTime<FixedOffset>>,
}

impl MessageRecord {
    /// `Inbox > Projects`, or [`UNKNOWN_FOLDER`].
    #[must_use]
    pub fn folder_display(&self) -> String {
        if self.folder_path.is_empty() {
            UNKNOWN_FOLDER.to_string()
        } else {
            self.folder_path.join(" > ")
        }
    }

    fn recipients_display(&self) -> String {
        let named: Vec<&str> = self
            .recipients
            .iter()
            .map(String::as_str)
            .filter(|to| !to.is_empty())
            .collect();
        if named.is_empty() {
            NO_RECIPIENTS.to_string()
        } else {
            named.join(", ")
        }
    }

    /// `{stamp}_{sender}_{subject}_{seq}`, stamped with the received, sent or
    /// current instant, whichever is known first. Capped at 200 bytes; the
    /// `_{seq}` tail always survives.
    #[must_use]
    pub fn base_name(&self) -> String {
        let stamp = self
            .received
            .or(self.sent)
            .unwrap_or_else(now_canonical);
        let head = format!(
            "{}_{}_{}",
            file_stamp(&stamp),
            sanitize_filename(&self.sender),
            sanitize_filename(&self.subject)
        );
        let tail = format!("_{}", self.seq);
        let budget = MAX_BASE_BYTES - tail.len();
        if head.len() <= budget {
            return head + &tail;
        }
        warn!(
            seq = self.seq,
            bytes = head.len() + tail.len(),
            "record name too long for the file system, truncating"
        );
        let mut cut = budget;
        while !head.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}{tail}", &head[..cut])
    }

    /// The text record body.
    #[must_use]
    pub fn render(&self) -> String {
        let banner = "=".repeat(BANNER_WIDTH);
        [
            format!("ПАПКА: {}", self.folder_display()),
            format!("НОМЕР: {}", self.seq),
            format!("ОТПРАВИТЕЛЬ: {}", self.sender),
            format!("ПОЛУЧАТЕЛИ: {}", self.recipients_display()),
            format!("ТЕМА: {}", self.subject),
            format!("ОТПРАВЛЕНО: {}", format_instant(self.sent.as_ref())),
            format!("ПОЛУЧЕНО: {}", format_instant(self.received.as_ref())),
            "\nТЕКСТ ПИСЬМА:".to_string(),
            banner.clone(),
            self.body.clone(),
            banner,
        ]
        .join("\n")
    }
}

/// What one export left on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedRecord {
    pub seq: u64,
    pub text_path: PathBuf,
    pub attachments_dir: Option<PathBuf>,
    pub attachments_saved: usize,
}

#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    /// Creates the output directory when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let output_dir = output_dir.into();
        if !output_dir.exists() {
            fs::create_dir_all(&output_dir)
                .map_err(|e| ExportError::io("create", &output_dir, e))?;
            info!(dir = %output_dir.display(), "created output directory");
        }
        Ok(Self { output_dir })
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Whether `{name}.txt` or a `{name}` directory already exists.
    fn is_taken(&self, name: &str) -> bool {
        self.output_dir.join(format!("{name}.txt")).exists() || self.output_dir.join(name).exists()
    }

    /// Writes `record` and the attachments of `message`.
    ///
    /// Attachment failures are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the text record cannot be written, or if the
    /// attachment directory cannot be created, renamed or removed.
    pub fn export(
        &self,
        record: &MessageRecord,
        message: &dyn Message,
    ) -> Result<ExportedRecord, ExportError> {
        let base = free_name(&record.base_name(), |name| self.is_taken(name));
        let mut text_path = self.output_dir.join(format!("{base}.txt"));
        fs::write(&text_path, record.render())
            .map_err(|e| ExportError::io("write", &text_path, e))?;

        let mut exported = ExportedRecord {
            seq: record.seq,
            text_path: text_path.clone(),
            attachments_dir: None,
            attachments_saved: 0,
        };

        if message.attachment_count() > 0 {
            let dir = self.output_dir.join(&base);
            fs::create_dir_all(&dir).map_err(|e| ExportError::io("create", &dir, e))?;
            let saved = save_attachments(message, &dir, record.seq);

            if saved > 0 {
                let renamed = free_name(
                    &format!("{base} ({saved} вложений)_{}", record.seq),
                    |name| self.is_taken(name),
                );
                let new_text = self.output_dir.join(format!("{renamed}.txt"));
                fs::rename(&text_path, &new_text)
                    .map_err(|e| ExportError::io("rename", &text_path, e))?;
                text_path = new_text;

                let new_dir = self.output_dir.join(&renamed);
                fs::rename(&dir, &new_dir).map_err(|e| ExportError::io("rename", &dir, e))?;
                exported.text_path = text_path.clone();
                exported.attachments_dir = Some(new_dir);
                exported.attachments_saved = saved;
            } else {
                fs::remove_dir(&dir).map_err(|e| ExportError::io("remove", &dir, e))?;
            }
        }

        info!(seq = record.seq, file = %text_path.display(), "saved message");
        Ok(exported)
    }
}

/// Saves every classifiable attachment into `dir`, returning how many were
/// written. Numbering advances only on success.
fn save_attachments(message: &dyn Message, dir: &Path, seq: u64) -> usize {
    let attachments = match message.attachments() {
        Ok(attachments) => attachments,
        Err(err) => {
            let err = Error::Message {
                seq,
                source: MessageError::Store(err),
            };
            warn!(error = %err, "cannot list attachments");
            return 0;
        }
    };

    let mut next_id = 1usize;
    let mut saved = 0;
    for (index, attachment) in attachments.iter().enumerate() {
        let index = index + 1;
        let data = match attachment.read() {
            Ok(data) => data,
            Err(err) => {
                let err = Error::Attachment {
                    seq,
                    index,
                    source: err.into(),
                };
                warn!(error = %err, "skipping attachment");
                continue;
            }
        };
        if data.is_empty() {
            debug!(seq, index, "skipping empty attachment");
            continue;
        }
        let Some(kind) = classify(&data) else {
            debug!(seq, index, "skipping attachment of unrecognized type");
            continue;
        };

        let ext = kind.extension();
        let stem = free_name(&format!("attachment_{next_id}"), |name| {
            dir.join(format!("{name}.{ext}")).exists()
        });
        let path = dir.join(format!("{stem}.{ext}"));
        if let Err(source) = fs::write(&path, &data) {
            let err = Error::Attachment {
                seq,
                index,
                source: ExportError::io("write", &path, source),
            };
            warn!(error = %err, "skipping attachment");
            continue;
        }
        debug!(seq, file = %path.display(), "saved attachment");
        saved += 1;
        next_id += 1;
    }
    saved
}
