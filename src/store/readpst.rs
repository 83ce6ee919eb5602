//! Store backed by `readpst`.
//!
//! The container is unpacked with `readpst -e`, which mirrors the PST folder
//! tree as directories and writes every message as `N.eml`, attachments
//! included. The extraction directory is the unnamed root folder, so folder
//! paths start at the PST's own top-level folder.

use super::{Attachment, BodyContent, Folder, Message, MessageIter, MessageStore, StoreResult};
use crate::error::StoreError;
use crate::time::Timestamp;
use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use std::cell::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Name readpst gives the RTF body it saves next to a message's parts.
const RTF_BODY_NAME: &str = "rtf-body.rtf";

#[derive(Debug, Clone)]
pub struct ReadpstConfig {
    /// `readpst` executable.
    pub readpst_path: String,
    /// Parent of the scratch extraction directory; the system temp dir when unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for ReadpstConfig {
    fn default() -> Self {
        Self {
            readpst_path: "readpst".to_string(),
            work_dir: None,
        }
    }
}

#[derive(Debug)]
pub struct ReadpstStore {
    extract_dir: PathBuf,
    // Removes the extraction when the store is dropped.
    _scratch: Option<TempDir>,
}

impl ReadpstStore {
    /// Unpacks `container` into a scratch directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not a readable file, the scratch
    /// directory cannot be created or `readpst` fails.
    pub fn open(container: &Path, config: &ReadpstConfig) -> StoreResult<Self> {
        let meta = fs::metadata(container).map_err(|e| StoreError::io(container, e))?;
        if !meta.is_file() {
            return Err(StoreError::Unavailable(format!(
                "{} is not a file",
                container.display()
            )));
        }

        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("pst-search-");
            builder
        };
        let scratch = match &config.work_dir {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| {
            StoreError::io(
                config.work_dir.clone().unwrap_or_else(std::env::temp_dir),
                e,
            )
        })?;

        run_readpst(&config.readpst_path, container, scratch.path())?;
        info!(
            container = %container.display(),
            extract_dir = %scratch.path().display(),
            "container unpacked"
        );

        Ok(Self {
            extract_dir: scratch.path().to_path_buf(),
            _scratch: Some(scratch),
        })
    }

    /// Uses a tree that `readpst -e` already produced. Nothing is removed on drop.
    #[must_use]
    pub fn from_extracted(dir: impl Into<PathBuf>) -> Self {
        Self {
            extract_dir: dir.into(),
            _scratch: None,
        }
    }
}

impl MessageStore for ReadpstStore {
    fn root_folder(&self) -> StoreResult<Box<dyn Folder + '_>> {
        let root: Box<dyn Folder + '_> = Box::new(DirFolder {
            path: self.extract_dir.clone(),
            name: None,
        });
        Ok(root)
    }
}

fn run_readpst(readpst_path: &str, pst_path: &Path, out_dir: &Path) -> StoreResult<()> {
    debug!(readpst = readpst_path, "running readpst");
    let status = Command::new(readpst_path)
        .args(["-q", "-e", "-8", "-o"])
        .arg(out_dir)
        .arg(pst_path)
        .status()
        .map_err(|e| StoreError::Extract(format!("spawn {readpst_path}: {e}")))?;
    if !status.success() {
        return Err(StoreError::Extract(format!(
            "readpst failed with status {status}"
        )));
    }
    Ok(())
}

fn list_dir(path: &Path) -> StoreResult<Vec<walkdir::DirEntry>> {
    WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::io(path, e.into()))
}

/// `12.eml` -> 12.
fn message_number(file_name: &str) -> Option<u64> {
    file_name.strip_suffix(".eml")?.parse().ok()
}

struct DirFolder {
    path: PathBuf,
    name: Option<String>,
}

impl Folder for DirFolder {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn sub_folders(&self) -> StoreResult<Vec<Box<dyn Folder + '_>>> {
        Ok(list_dir(&self.path)?
            .into_iter()
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                Box::new(DirFolder {
                    path: entry.into_path(),
                    name: Some(name),
                }) as Box<dyn Folder + '_>
            })
            .collect())
    }

    fn messages(&self) -> StoreResult<MessageIter<'_>> {
        let mut files: Vec<(u64, PathBuf)> = list_dir(&self.path)?
            .into_iter()
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let number = message_number(&entry.file_name().to_string_lossy())?;
                Some((number, entry.into_path()))
            })
            .collect();
        files.sort_by_key(|(number, _)| *number);

        let slots: MessageIter<'_> = Box::new(files.into_iter().map(|(_, path)| {
            EmlMessage::load(path).map(|message| Box::new(message) as Box<dyn Message + '_>)
        }));
        Ok(slots)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartRole {
    Plain,
    Markup,
    Rich,
    Attachment,
    Container,
}

fn part_role(part: &ParsedMail<'_>) -> PartRole {
    let mimetype = part.ctype.mimetype.to_ascii_lowercase();
    if mimetype.starts_with("multipart/") {
        return PartRole::Container;
    }

    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"));
    let attached =
        matches!(disposition.disposition, DispositionType::Attachment) || filename.is_some();

    let is_rtf = mimetype == "application/rtf" || mimetype == "text/rtf";
    if filename.is_some_and(|name| name.eq_ignore_ascii_case(RTF_BODY_NAME))
        || (is_rtf && !attached)
    {
        return PartRole::Rich;
    }
    if attached {
        return PartRole::Attachment;
    }
    match mimetype.as_str() {
        "text/plain" => PartRole::Plain,
        "text/html" => PartRole::Markup,
        _ => PartRole::Attachment,
    }
}

fn leaves<'m, 'a>(mail: &'m ParsedMail<'a>, out: &mut Vec<&'m ParsedMail<'a>>) {
    if mail.subparts.is_empty() {
        out.push(mail);
    } else {
        for part in &mail.subparts {
            leaves(part, out);
        }
    }
}

fn parse_mail_date(value: &str) -> Option<Timestamp> {
    let secs = mailparse::dateparse(value.trim()).ok()?;
    DateTime::<Utc>::from_timestamp(secs, 0).map(Timestamp::from)
}

/// A decoded attachment leaf, or why it could not be decoded.
type AttachmentPart = Result<Vec<u8>, String>;

/// One `N.eml` file. Bodies are parsed on access; attachment payloads are
/// decoded once and kept for the message's lifetime.
struct EmlMessage {
    path: PathBuf,
    raw: Vec<u8>,
    header_len: usize,
    attachment_parts: OnceCell<Vec<AttachmentPart>>,
}

impl EmlMessage {
    fn load(path: PathBuf) -> StoreResult<Self> {
        let raw = fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
        let (_, header_len) = mailparse::parse_headers(&raw).map_err(|e| StoreError::Parse {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            path,
            raw,
            header_len,
            attachment_parts: OnceCell::new(),
        })
    }

    fn attachment_parts(&self) -> StoreResult<&[AttachmentPart]> {
        if self.attachment_parts.get().is_none() {
            let mail = self.parsed()?;
            let mut parts = Vec::new();
            leaves(&mail, &mut parts);
            let decoded = parts
                .into_iter()
                .filter(|part| part_role(part) == PartRole::Attachment)
                .map(|part| part.get_body_raw().map_err(|e| e.to_string()))
                .collect();
            let _ = self.attachment_parts.set(decoded);
        }
        Ok(self.attachment_parts.get().map_or(&[][..], Vec::as_slice))
    }

    fn parsed(&self) -> StoreResult<ParsedMail<'_>> {
        mailparse::parse_mail(&self.raw).map_err(|e| self.parse_error(e))
    }

    fn parse_error(&self, err: impl ToString) -> StoreError {
        StoreError::Parse {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }

    fn header(&self, name: &str) -> Option<String> {
        let (headers, _) = mailparse::parse_headers(&self.raw).ok()?;
        headers.get_first_value(name)
    }

    /// Decoded text of the first leaf playing `role`.
    fn text_part(&self, role: PartRole) -> StoreResult<Option<BodyContent>> {
        let mail = self.parsed()?;
        let mut parts = Vec::new();
        leaves(&mail, &mut parts);
        parts
            .into_iter()
            .find(|part| part_role(part) == role)
            .map(|part| part.get_body().map(BodyContent::Text).map_err(|e| self.parse_error(e)))
            .transpose()
    }
}

impl Message for EmlMessage {
    fn transport_headers(&self) -> Option<String> {
        (self.header_len > 0)
            .then(|| String::from_utf8_lossy(&self.raw[..self.header_len]).into_owned())
    }

    fn plain_body(&self) -> StoreResult<Option<BodyContent>> {
        self.text_part(PartRole::Plain)
    }

    fn rich_body(&self) -> StoreResult<Option<BodyContent>> {
        let mail = self.parsed()?;
        let mut parts = Vec::new();
        leaves(&mail, &mut parts);
        parts
            .into_iter()
            .find(|part| part_role(part) == PartRole::Rich)
            .map(|part| {
                part.get_body_raw()
                    .map(BodyContent::Bytes)
                    .map_err(|e| self.parse_error(e))
            })
            .transpose()
    }

    fn markup_body(&self) -> StoreResult<Option<BodyContent>> {
        self.text_part(PartRole::Markup)
    }

    fn sent_instant(&self) -> Option<Timestamp> {
        parse_mail_date(&self.header("Date")?)
    }

    fn received_instant(&self) -> Option<Timestamp> {
        // The topmost Received header is the final hop, i.e. delivery.
        let received = self.header("Received")?;
        let (_, date) = received.rsplit_once(';')?;
        parse_mail_date(date)
    }

    fn attachment_count(&self) -> usize {
        match self.attachment_parts() {
            Ok(parts) => parts.len(),
            Err(err) => {
                warn!(error = %err, "cannot parse message parts, assuming no attachments");
                0
            }
        }
    }

    fn attachments(&self) -> StoreResult<Vec<Box<dyn Attachment + '_>>> {
        Ok(self
            .attachment_parts()?
            .iter()
            .map(|part| {
                Box::new(EmlAttachment {
                    message: self,
                    part,
                }) as Box<dyn Attachment + '_>
            })
            .collect())
    }
}

struct EmlAttachment<'m> {
    message: &'m EmlMessage,
    part: &'m AttachmentPart,
}

impl Attachment for EmlAttachment<'_> {
    fn read(&self) -> StoreResult<Vec<u8>> {
        self.part
            .clone()
            .map_err(|reason| self.message.parse_error(reason))
    }
}
