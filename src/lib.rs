//! Search an Outlook PST archive and export the matching messages.
//!
//! A [`store::MessageStore`] exposes the archive's folders and messages. The
//! [`traversal::Traversal`] walks it depth-first, decodes each message's
//! headers and body, checks it against [`criteria::FilterCriteria`] and hands
//! matches to an [`export::Exporter`].

pub mod attachment;
pub mod body;
pub mod criteria;
pub mod error;
pub mod export;
pub mod headers;
pub mod manifest;
pub mod rtf;
pub mod store;
pub mod time;
pub mod traversal;

pub use criteria::{FilterCriteria, HourRange, RawCriteria};
pub use error::Error;
pub use export::Exporter;
pub use traversal::{RunSummary, Traversal};
