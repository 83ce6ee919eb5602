//! In-memory store.
//!
//! Builds a folder tree by hand. Folders, messages and attachments can be made
//! to fail so every error tier can be exercised without a real container.

use super::{Attachment, BodyContent, Folder, Message, MessageIter, MessageStore, StoreResult};
use crate::error::StoreError;
use crate::time::Timestamp;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    root: MemoryFolder,
}

impl MemoryStore {
    #[must_use]
    pub fn new(root: MemoryFolder) -> Self {
        Self { root }
    }
}

impl MessageStore for MemoryStore {
    fn root_folder(&self) -> StoreResult<Box<dyn Folder + '_>> {
        let root: Box<dyn Folder + '_> = Box::new(&self.root);
        Ok(root)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFolder {
    name: Option<String>,
    messages: Vec<Result<MemoryMessage, String>>,
    folders: Vec<MemoryFolder>,
    listing_error: Option<String>,
}

impl MemoryFolder {
    /// An unnamed folder, usually the root.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: MemoryMessage) -> Self {
        self.messages.push(Ok(message));
        self
    }

    /// A message slot that fails to load with `reason`.
    #[must_use]
    pub fn with_broken_message(mut self, reason: impl Into<String>) -> Self {
        self.messages.push(Err(reason.into()));
        self
    }

    #[must_use]
    pub fn with_folder(mut self, folder: MemoryFolder) -> Self {
        self.folders.push(folder);
        self
    }

    /// Makes listing this folder's messages fail.
    #[must_use]
    pub fn unreadable(mut self, reason: impl Into<String>) -> Self {
        self.listing_error = Some(reason.into());
        self
    }
}

impl Folder for MemoryFolder {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn sub_folders(&self) -> StoreResult<Vec<Box<dyn Folder + '_>>> {
        Ok(self
            .folders
            .iter()
            .map(|folder| Box::new(folder) as Box<dyn Folder + '_>)
            .collect())
    }

    fn messages(&self) -> StoreResult<MessageIter<'_>> {
        if let Some(reason) = &self.listing_error {
            return Err(StoreError::Unavailable(reason.clone()));
        }
        let slots: MessageIter<'_> = Box::new(self.messages.iter().map(|slot| match slot {
            Ok(message) => Ok(Box::new(message) as Box<dyn Message + '_>),
            Err(reason) => Err(StoreError::Unavailable(reason.clone())),
        }));
        Ok(slots)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryMessage {
    headers: Option<String>,
    plain: Option<BodyContent>,
    rich: Option<BodyContent>,
    markup: Option<BodyContent>,
    body_error: Option<String>,
    sent: Option<Timestamp>,
    received: Option<Timestamp>,
    sender_name: Option<String>,
    subject: Option<String>,
    attachments: Vec<MemoryAttachment>,
}

impl MemoryMessage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_headers(mut self, raw: impl Into<String>) -> Self {
        self.headers = Some(raw.into());
        self
    }

    #[must_use]
    pub fn with_plain_body(mut self, body: impl Into<BodyContent>) -> Self {
        self.plain = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_rich_body(mut self, body: impl Into<BodyContent>) -> Self {
        self.rich = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_markup_body(mut self, body: impl Into<BodyContent>) -> Self {
        self.markup = Some(body.into());
        self
    }

    /// Makes every body accessor fail with `reason`.
    #[must_use]
    pub fn with_unreadable_body(mut self, reason: impl Into<String>) -> Self {
        self.body_error = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_sent(mut self, at: impl Into<Timestamp>) -> Self {
        self.sent = Some(at.into());
        self
    }

    #[must_use]
    pub fn with_received(mut self, at: impl Into<Timestamp>) -> Self {
        self.received = Some(at.into());
        self
    }

    #[must_use]
    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn with_attachment(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.attachments.push(MemoryAttachment(Ok(data.into())));
        self
    }

    /// An attachment whose payload cannot be read.
    #[must_use]
    pub fn with_unreadable_attachment(mut self, reason: impl Into<String>) -> Self {
        self.attachments.push(MemoryAttachment(Err(reason.into())));
        self
    }

    fn body(&self, variant: &Option<BodyContent>) -> StoreResult<Option<BodyContent>> {
        match &self.body_error {
            Some(reason) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(variant.clone()),
        }
    }
}

impl Message for MemoryMessage {
    fn transport_headers(&self) -> Option<String> {
        self.headers.clone()
    }

    fn plain_body(&self) -> StoreResult<Option<BodyContent>> {
        self.body(&self.plain)
    }

    fn rich_body(&self) -> StoreResult<Option<BodyContent>> {
        self.body(&self.rich)
    }

    fn markup_body(&self) -> StoreResult<Option<BodyContent>> {
        self.body(&self.markup)
    }

    fn sent_instant(&self) -> Option<Timestamp> {
        self.sent
    }

    fn received_instant(&self) -> Option<Timestamp> {
        self.received
    }

    fn sender_name(&self) -> Option<String> {
        self.sender_name.clone()
    }

    fn subject(&self) -> Option<String> {
        self.subject.clone()
    }

    fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    fn attachments(&self) -> StoreResult<Vec<Box<dyn Attachment + '_>>> {
        Ok(self
            .attachments
            .iter()
            .map(|attachment| Box::new(attachment) as Box<dyn Attachment + '_>)
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryAttachment(Result<Vec<u8>, String>);

impl Attachment for MemoryAttachment {
    fn read(&self) -> StoreResult<Vec<u8>> {
        self.0.clone().map_err(StoreError::Unavailable)
    }
}
