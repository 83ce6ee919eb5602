//! Depth-first walk over a store: number, decode, match, export.

use crate::body;
use crate::criteria::{Candidate, FilterCriteria};
use crate::error::{Error, MessageError};
use crate::export::{ExportedRecord, Exporter, MessageRecord};
use crate::headers::{header_values, HeaderField};
use crate::store::{Folder, Message, MessageStore, StoreResult};
use tracing::{info, warn};

/// Counts of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages visited, broken ones included.
    pub processed: u64,
    pub matched: u64,
    /// Messages that could not be loaded or exported.
    pub failed: u64,
    pub folders_failed: u64,
    pub exported: Vec<ExportedRecord>,
}

impl RunSummary {
    #[must_use]
    pub fn attachments_saved(&self) -> usize {
        self.exported.iter().map(|r| r.attachments_saved).sum()
    }
}

/// Builds the normalized record of a message.
///
/// Header values win; the store's own sender name and subject fill in when
/// the headers have none.
#[must_use]
pub fn message_record(message: &dyn Message, folder_path: &[String], seq: u64) -> MessageRecord {
    let headers = message.transport_headers().unwrap_or_default();
    let from = HeaderField::decode(&headers, "From");
    let subject = HeaderField::decode(&headers, "Subject");

    MessageRecord {
        folder_path: folder_path.to_vec(),
        seq,
        sender: pick(&from, || message.sender_name()),
        recipients: header_values(&headers, "To"),
        subject: pick(&subject, || message.subject()),
        body: body::resolve(message),
        sent: message.sent_instant().map(|at| at.to_canonical()),
        received: message.received_instant().map(|at| at.to_canonical()),
    }
}

fn pick(field: &HeaderField, fallback: impl FnOnce() -> Option<String>) -> String {
    if field.is_blank() {
        fallback().unwrap_or_default()
    } else {
        field.first().to_string()
    }
}

/// Walks a store and exports what matches.
pub struct Traversal<'a> {
    criteria: &'a FilterCriteria,
    exporter: Option<&'a Exporter>,
    next_seq: u64,
    path: Vec<String>,
    summary: RunSummary,
}

impl<'a> Traversal<'a> {
    /// Without an exporter matches are only printed.
    #[must_use]
    pub fn new(criteria: &'a FilterCriteria, exporter: Option<&'a Exporter>) -> Self {
        Self {
            criteria,
            exporter,
            next_seq: 1,
            path: Vec::new(),
            summary: RunSummary::default(),
        }
    }

    /// Visits every folder of `store`. Only per-item failures can occur and
    /// they are logged, so the run always yields a summary.
    pub fn run(mut self, store: &dyn MessageStore) -> RunSummary {
        match store.root_folder() {
            Ok(root) => self.visit_folder(root.as_ref()),
            Err(source) => self.folder_failed(Error::Folder {
                folder: "<root>".to_string(),
                source,
            }),
        }
        info!(
            processed = self.summary.processed,
            matched = self.summary.matched,
            exported = self.summary.exported.len(),
            failed = self.summary.failed,
            "traversal finished"
        );
        self.summary
    }

    fn folder_failed(&mut self, err: Error) {
        warn!(error = %err, "skipping folder");
        self.summary.folders_failed += 1;
    }

    fn message_failed(&mut self, err: Error) {
        warn!(error = %err, "skipping message");
        self.summary.failed += 1;
    }

    fn visit_folder(&mut self, folder: &dyn Folder) {
        let named = folder.name().is_some();
        if let Some(name) = folder.name() {
            self.path.push(name.to_string());
        }
        let display = self.path.join(" > ");

        match folder.messages() {
            Ok(messages) => {
                for slot in messages {
                    self.visit_message(slot);
                }
            }
            Err(source) => self.folder_failed(Error::Folder {
                folder: display.clone(),
                source,
            }),
        }

        match folder.sub_folders() {
            Ok(subs) => {
                for sub in &subs {
                    self.visit_folder(sub.as_ref());
                }
            }
            Err(source) => self.folder_failed(Error::Folder {
                folder: display,
                source,
            }),
        }

        if named {
            self.path.pop();
        }
    }

    fn visit_message(&mut self, slot: StoreResult<Box<dyn Message + '_>>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.summary.processed += 1;

        let message = match slot {
            Ok(message) => message,
            Err(err) => {
                self.message_failed(Error::Message {
                    seq,
                    source: err.into(),
                });
                return;
            }
        };

        let record = message_record(message.as_ref(), &self.path, seq);
        let candidate = Candidate {
            sender: &record.sender,
            recipients: &record.recipients,
            subject: &record.subject,
            body: &record.body,
            sent: record.sent.as_ref(),
            received: record.received.as_ref(),
        };
        if !self.criteria.matches(&candidate) {
            return;
        }

        self.summary.matched += 1;
        print_match(&record);

        if let Some(exporter) = self.exporter {
            match exporter.export(&record, message.as_ref()) {
                Ok(exported) => self.summary.exported.push(exported),
                Err(err) => self.message_failed(Error::Message {
                    seq,
                    source: MessageError::Export(err),
                }),
            }
        }
    }
}

fn print_match(record: &MessageRecord) {
    println!("\nMatch #{}:", record.seq);
    println!("    From:    {}", record.sender);
    let mut recipients = record.recipients.iter();
    println!("    To:      {}", recipients.next().map_or("", String::as_str));
    for to in recipients {
        println!("             {to}");
    }
    println!("    Subject: {}", record.subject);
    if let Some(sent) = &record.sent {
        println!("    Sent:    {}", crate::time::format_instant(Some(sent)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryFolder, MemoryMessage, MemoryStore};

    fn message(subject: &str) -> MemoryMessage {
        MemoryMessage::new()
            .with_headers(format!("From: a@x.com\r\nSubject: {subject}\r\n"))
            .with_plain_body("body")
    }

    #[test]
    fn test_numbering_is_depth_first_messages_before_subfolders() {
        let store = MemoryStore::new(
            MemoryFolder::root()
                .with_folder(
                    MemoryFolder::named("A")
                        .with_message(message("one"))
                        .with_folder(MemoryFolder::named("A1").with_message(message("two")))
                        .with_message(message("three")),
                )
                .with_folder(MemoryFolder::named("B").with_message(message("four"))),
        );
        let criteria = FilterCriteria {
            subject: Some("two".into()),
            ..FilterCriteria::default()
        };
        let summary = Traversal::new(&criteria, None).run(&store);
        assert_eq!(summary.processed, 4);
        assert_eq!(summary.matched, 1);
        assert!(summary.exported.is_empty());

        // A's own messages come first, so A1's message is #3.
        let tmp = tempfile::TempDir::new().unwrap();
        let exporter = Exporter::new(tmp.path()).unwrap();
        let summary = Traversal::new(&criteria, Some(&exporter)).run(&store);
        assert_eq!(summary.exported.len(), 1);
        assert_eq!(summary.exported[0].seq, 3);
        let text = std::fs::read_to_string(&summary.exported[0].text_path).unwrap();
        assert!(text.starts_with("ПАПКА: A > A1\nНОМЕР: 3\n"), "{text}");
    }

    #[test]
    fn test_failures_are_counted_and_skipped() {
        let store = MemoryStore::new(
            MemoryFolder::root()
                .with_broken_message("truncated")
                .with_message(message("ok"))
                .with_folder(MemoryFolder::named("Locked").unreadable("denied"))
                .with_folder(MemoryFolder::named("Next").with_message(message("later"))),
        );
        let summary = Traversal::new(&FilterCriteria::default(), None).run(&store);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.folders_failed, 1);
    }

    #[test]
    fn test_record_falls_back_to_store_properties() {
        let message = MemoryMessage::new()
            .with_sender_name("Jane Doe")
            .with_subject("Internal memo")
            .with_plain_body("hi");
        let record = message_record(&message, &["Inbox".to_string()], 9);
        assert_eq!(record.sender, "Jane Doe");
        assert_eq!(record.subject, "Internal memo");
        assert_eq!(record.recipients, [""]);
        assert_eq!(record.folder_display(), "Inbox");
    }

    #[test]
    fn test_record_prefers_decoded_headers() {
        let message = MemoryMessage::new()
            .with_headers("From: \"Jane Doe\" <jane@x.com>\r\nSubject: =?UTF-8?B?SGVsbG8=?=\r\n")
            .with_sender_name("Store Name")
            .with_subject("Store subject");
        let record = message_record(&message, &[], 1);
        assert_eq!(record.sender, "\"Jane Doe\" <jane@x.com>");
        assert_eq!(record.subject, "Hello");
    }
}
