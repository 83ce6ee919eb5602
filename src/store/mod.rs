//! Message store collaborator.
//!
//! A store exposes a PST's folder tree, the messages in each folder and the
//! raw pieces of each message. It knows nothing about filtering or export.

mod memory;
mod readpst;

pub use memory::{MemoryAttachment, MemoryFolder, MemoryMessage, MemoryStore};
pub use readpst::{ReadpstConfig, ReadpstStore};

use crate::error::StoreError;
use crate::time::Timestamp;

pub type StoreResult<T> = Result<T, StoreError>;

/// Messages of a folder in store order. A message that cannot be loaded is
/// reported in place so numbering stays stable.
pub type MessageIter<'a> = Box<dyn Iterator<Item = StoreResult<Box<dyn Message + 'a>>> + 'a>;

/// A declared body variant as the store holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyContent {
    Text(String),
    Bytes(Vec<u8>),
}

impl BodyContent {
    /// Text as is, bytes decoded as lossy UTF-8.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Bytes(bytes) => bytes.is_empty(),
        }
    }
}

impl From<&str> for BodyContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for BodyContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for BodyContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for BodyContent {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

/// An opened container.
pub trait MessageStore {
    fn root_folder(&self) -> StoreResult<Box<dyn Folder + '_>>;
}

pub trait Folder {
    /// Display name; the root of some stores has none.
    fn name(&self) -> Option<&str>;

    fn sub_folders(&self) -> StoreResult<Vec<Box<dyn Folder + '_>>>;

    fn messages(&self) -> StoreResult<MessageIter<'_>>;
}

pub trait Message {
    /// Raw transport header block, absent for mail that never left the server.
    fn transport_headers(&self) -> Option<String>;

    fn plain_body(&self) -> StoreResult<Option<BodyContent>>;

    fn rich_body(&self) -> StoreResult<Option<BodyContent>>;

    fn markup_body(&self) -> StoreResult<Option<BodyContent>>;

    /// Client submission time.
    fn sent_instant(&self) -> Option<Timestamp>;

    /// Delivery time.
    fn received_instant(&self) -> Option<Timestamp>;

    /// Sender display name kept by the store itself.
    fn sender_name(&self) -> Option<String> {
        None
    }

    /// Subject kept by the store itself.
    fn subject(&self) -> Option<String> {
        None
    }

    fn attachment_count(&self) -> usize;

    fn attachments(&self) -> StoreResult<Vec<Box<dyn Attachment + '_>>>;
}

pub trait Attachment {
    fn read(&self) -> StoreResult<Vec<u8>>;
}

impl<T: Folder + ?Sized> Folder for &T {
    fn name(&self) -> Option<&str> {
        (**self).name()
    }

    fn sub_folders(&self) -> StoreResult<Vec<Box<dyn Folder + '_>>> {
        (**self).sub_folders()
    }

    fn messages(&self) -> StoreResult<MessageIter<'_>> {
        (**self).messages()
    }
}

impl<T: Message + ?Sized> Message for &T {
    fn transport_headers(&self) -> Option<String> {
        (**self).transport_headers()
    }

    fn plain_body(&self) -> StoreResult<Option<BodyContent>> {
        (**self).plain_body()
    }

    fn rich_body(&self) -> StoreResult<Option<BodyContent>> {
        (**self).rich_body()
    }

    fn markup_body(&self) -> StoreResult<Option<BodyContent>> {
        (**self).markup_body()
    }

    fn sent_instant(&self) -> Option<Timestamp> {
        (**self).sent_instant()
    }

    fn received_instant(&self) -> Option<Timestamp> {
        (**self).received_instant()
    }

    fn sender_name(&self) -> Option<String> {
        (**self).sender_name()
    }

    fn subject(&self) -> Option<String> {
        (**self).subject()
    }

    fn attachment_count(&self) -> usize {
        (**self).attachment_count()
    }

    fn attachments(&self) -> StoreResult<Vec<Box<dyn Attachment + '_>>> {
        (**self).attachments()
    }
}

impl<T: Attachment + ?Sized> Attachment for &T {
    fn read(&self) -> StoreResult<Vec<u8>> {
        (**self).read()
    }
}
