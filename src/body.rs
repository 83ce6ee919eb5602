//! Picks one readable body out of a message's declared variants.

use crate::error::StoreError;
use crate::rtf::{rtf_to_text, RtfError};
use crate::store::{BodyContent, Message};
use regex::Regex;
use scraper::{Html, Node};
use std::sync::OnceLock;
use tracing::warn;

/// Returned when the message declares no usable body.
pub const BODY_ABSENT: &str = "Тело письма отсутствует";

/// Returned when a declared body could not be read or converted.
pub const EXTRACTION_FAILED: &str = "Не удалось извлечь текст";

#[derive(Debug, thiserror::Error)]
enum BodyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("rich text body: {0}")]
    Rtf(#[from] RtfError),
}

/// Resolves the body text: plain, else rich, else markup.
///
/// Never fails; problems degrade to [`BODY_ABSENT`] or [`EXTRACTION_FAILED`].
#[must_use]
pub fn resolve(message: &dyn Message) -> String {
    match try_resolve(message) {
        Ok(Some(text)) => normalize(&text),
        Ok(None) => BODY_ABSENT.to_string(),
        Err(err) => {
            warn!(error = %err, "cannot extract message body");
            EXTRACTION_FAILED.to_string()
        }
    }
}

fn present(variant: Option<BodyContent>) -> Option<BodyContent> {
    variant.filter(|content| !content.is_empty())
}

fn try_resolve(message: &dyn Message) -> Result<Option<String>, BodyError> {
    if let Some(plain) = present(message.plain_body()?) {
        return Ok(Some(plain.into_text()));
    }

    if let Some(rich) = present(message.rich_body()?) {
        let bytes = rich.into_bytes();
        let trimmed = bytes.trim_ascii();
        if !trimmed.is_empty() {
            return Ok(Some(rtf_to_text(trimmed)?));
        }
    }

    if let Some(markup) = present(message.markup_body()?) {
        return Ok(Some(markup_text(&markup.into_text())));
    }

    Ok(None)
}

/// Visible text of an HTML document. Comments never contribute.
#[must_use]
pub fn markup_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .tree
        .root()
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => Some(&**text),
            _ => None,
        })
        .collect()
}

fn line_breaks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([\r\n]+ ?)+").expect("line break pattern compiles"))
}

/// Collapses runs of line breaks, trims every line, trims the whole text.
#[must_use]
pub fn normalize(text: &str) -> String {
    let collapsed = line_breaks().replace_all(text, "\n");
    collapsed
        .split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
