//! Transport header decoding.
//!
//! The store hands over the raw header block exactly as the message was
//! received. Fields are picked out one name at a time, unfolded, decoded from
//! RFC 2047 encoded words and split into the individual values of an address
//! list.

use regex::{Captures, Regex};
use std::sync::OnceLock;
use tracing::debug;

/// Sole value reported for a field that is not present.
pub const EMPTY_VALUE: &str = "";

/// All decoded values of one header field, in order of appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub values: Vec<String>,
}

impl HeaderField {
    /// Decodes `name` out of a raw header block.
    #[must_use]
    pub fn decode(raw: &str, name: &str) -> Self {
        Self {
            name: name.trim_end_matches(':').to_string(),
            values: header_values(raw, name),
        }
    }

    /// First value, or [`EMPTY_VALUE`].
    #[must_use]
    pub fn first(&self) -> &str {
        self.values.first().map_or(EMPTY_VALUE, String::as_str)
    }

    /// Whether every value is empty.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.values.iter().all(String::is_empty)
    }
}

/// Returns every value of `name` in `raw`, never an empty vector.
///
/// A line opens a value when, after trimming, it starts with `name:` (case
/// insensitive). While a value is open, lines starting with a space or a tab
/// continue it; any other line closes it. Each value is then collapsed,
/// decoded and split on commas that sit outside double quotes.
#[must_use]
pub fn header_values(raw: &str, name: &str) -> Vec<String> {
    let name = name.trim_end_matches(':');
    if raw.is_empty() || name.is_empty() {
        return vec![EMPTY_VALUE.to_string()];
    }

    let prefix = format!("{}:", name.to_lowercase());
    let mut logical = Vec::new();
    let mut current: Option<String> = None;

    for line in raw.lines() {
        if line.trim().to_lowercase().starts_with(&prefix) {
            if let Some(done) = current.take() {
                logical.push(done);
            }
            let rest = line.split_once(':').map_or("", |(_, rest)| rest);
            current = Some(rest.trim().to_string());
        } else if current.is_some() && line.starts_with(|c: char| c == ' ' || c == '\t') {
            if let Some(open) = current.as_mut() {
                open.push(' ');
                open.push_str(line.trim());
            }
        } else if let Some(done) = current.take() {
            logical.push(done);
        }
    }
    logical.extend(current);

    let values: Vec<String> = logical
        .iter()
        .flat_map(|value| split_unquoted_commas(&decode_mime_words(&collapse_whitespace(value))))
        .collect();

    if values.is_empty() {
        vec![EMPTY_VALUE.to_string()]
    } else {
        values
    }
}

/// Collapses every whitespace run, line breaks included, to one space.
#[must_use]
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn encoded_word_run() -> &'static Regex {
    static RUN: OnceLock<Regex> = OnceLock::new();
    RUN.get_or_init(|| {
        Regex::new(r"=\?[!->@-~]+\?[bBqQ]\?[!->@-~]*\?=(?:\s+=\?[!->@-~]+\?[bBqQ]\?[!->@-~]*\?=)*")
            .expect("encoded-word pattern compiles")
    })
}

/// Resolves RFC 2047 encoded words to text.
///
/// Adjacent encoded words are decoded as one run so the whitespace between
/// them disappears. A run that cannot be decoded is left as it was.
#[must_use]
pub fn decode_mime_words(value: &str) -> String {
    if !value.contains("=?") {
        return value.to_string();
    }
    encoded_word_run()
        .replace_all(value, |caps: &Captures<'_>| decode_run(&caps[0]))
        .into_owned()
}

fn decode_run(run: &str) -> String {
    // mailparse only decodes encoded words inside a header, so wrap the run in one.
    let synthetic = format!("X: {run}");
    match mailparse::parse_header(synthetic.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(err) => {
            debug!(%run, error = %err, "leaving undecodable encoded word as is");
            run.to_string()
        }
    }
}

/// Splits on commas outside double quotes and drops empty parts.
///
/// A comma separates values when an even number of quote characters follows
/// it, so `"Doe, Jane" <j@x>, Bob <b@x>` yields two values.
#[must_use]
pub fn split_unquoted_commas(value: &str) -> Vec<String> {
    let mut quotes_after = value.matches('"').count();
    let mut parts = Vec::new();
    let mut start = 0;

    for (idx, ch) in value.char_indices() {
        match ch {
            '"' => quotes_after -= 1,
            ',' if quotes_after % 2 == 0 => {
                parts.push(&value[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BLOCK: &str = "\
Received: from mx1.example.com by mx2.example.com; 1 Jan 2024 10:00:00 +0000\r\n\
From: \"Jane Doe\" <jane@x.com>\r\n\
To: \"Doe, Jane\" <j@x>,\r\n\
\tBob <b@x>\r\n\
Subject: =?UTF-8?B?SGVsbG8=?=\r\n\
X-Mailer: test\r\n\
Received: from client.example.com by mx1.example.com; 1 Jan 2024 09:59:58 +0000\r\n";

    #[test]
    fn test_single_value() {
        assert_eq!(header_values(BLOCK, "From"), vec!["\"Jane Doe\" <jane@x.com>"]);
    }

    #[test]
    fn test_name_is_case_insensitive_and_colon_tolerant() {
        assert_eq!(header_values(BLOCK, "from:"), header_values(BLOCK, "FROM"));
    }

    #[test]
    fn test_folded_list_keeps_quoted_commas() {
        assert_eq!(header_values(BLOCK, "To"), vec!["\"Doe, Jane\" <j@x>", "Bob <b@x>"]);
    }

    #[test]
    fn test_repeated_field_keeps_order() {
        let received = header_values(BLOCK, "Received");
        assert_eq!(received.len(), 2);
        assert!(received[0].starts_with("from mx1.example.com"));
        assert!(received[1].starts_with("from client.example.com"));
    }

    #[test]
    fn test_encoded_subject() {
        assert_eq!(header_values(BLOCK, "Subject"), vec!["Hello"]);
    }

    #[test]
    fn test_missing_field_yields_empty_marker() {
        assert_eq!(header_values(BLOCK, "Cc"), vec![EMPTY_VALUE]);
        assert_eq!(header_values("", "From"), vec![EMPTY_VALUE]);
        assert_eq!(header_values(BLOCK, ""), vec![EMPTY_VALUE]);
        assert!(HeaderField::decode(BLOCK, "Bcc").is_blank());
    }

    #[test]
    fn test_empty_value_yields_empty_marker() {
        assert_eq!(header_values("Subject:   \r\nFrom: a@b\r\n", "Subject"), vec![EMPTY_VALUE]);
    }

    #[test]
    fn test_continuation_of_other_field_is_ignored() {
        let raw = "X-Long: one\r\n two\r\nSubject: kept\r\n";
        assert_eq!(header_values(raw, "Subject"), vec!["kept"]);
        assert_eq!(header_values(raw, "X-Long"), vec!["one two"]);
    }

    #[test]
    fn test_indented_field_line_still_opens_value() {
        let raw = "  Subject: indented\r\n";
        assert_eq!(header_values(raw, "Subject"), vec!["indented"]);
    }

    #[test]
    fn test_prefix_of_longer_name_does_not_match() {
        let raw = "Subject-Id: 12\r\n";
        assert_eq!(header_values(raw, "Subject"), vec![EMPTY_VALUE]);
    }

    #[test]
    fn test_field_first() {
        let field = HeaderField::decode(BLOCK, "To:");
        assert_eq!(field.name, "To");
        assert_eq!(field.first(), "\"Doe, Jane\" <j@x>");
    }

    #[test]
    fn test_decode_mime_words() {
        assert_eq!(decode_mime_words("=?UTF-8?B?SGVsbG8=?="), "Hello");
        assert_eq!(decode_mime_words("=?utf-8?Q?Caf=C3=A9_au_lait?="), "Café au lait");
        assert_eq!(decode_mime_words("Re: =?UTF-8?B?0J/RgNC40LLQtdGC?="), "Re: Привет");
        assert_eq!(decode_mime_words("=?windows-1251?B?0uXx8g==?="), "Тест");
        assert_eq!(decode_mime_words("plain text"), "plain text");
    }

    #[test]
    fn test_adjacent_encoded_words_join() {
        assert_eq!(
            decode_mime_words("=?UTF-8?B?SGVsbG8=?= =?UTF-8?B?IFdvcmxk?="),
            "Hello World"
        );
    }

    #[test]
    fn test_undecodable_word_does_not_abort() {
        let decoded = decode_mime_words("prefix =?x-unknown?B?SGVsbG8=?= suffix");
        assert!(decoded.starts_with("prefix "), "{decoded}");
        assert!(decoded.ends_with(" suffix"), "{decoded}");
    }

    #[test]
    fn test_split_unquoted_commas() {
        assert_eq!(
            split_unquoted_commas("\"Doe, Jane\" <j@x>, Bob <b@x>"),
            vec!["\"Doe, Jane\" <j@x>", "Bob <b@x>"]
        );
        assert_eq!(split_unquoted_commas("a,, ,b"), vec!["a", "b"]);
        assert!(split_unquoted_commas(" , ").is_empty());
    }

    #[test]
    fn test_split_with_unbalanced_quote() {
        // Only commas followed by an even number of quotes separate values.
        assert_eq!(split_unquoted_commas("a, \"b, c"), vec!["a, \"b", "c"]);
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \r\n\t b  c "), "a b c");
    }

    proptest! {
        #[test]
        fn test_folded_and_single_line_values_agree(
            words in prop::collection::vec("[a-zA-Z0-9@.<>]{1,8}", 1..8),
            tab in any::<bool>(),
        ) {
            let indent = if tab { "\t" } else { "    " };
            let single = format!("From: a@b\r\nSubject: {}\r\nX-After: y\r\n", words.join(" "));
            let folded = format!(
                "From: a@b\r\nSubject: {}\r\nX-After: y\r\n",
                words.join(&format!("\r\n{indent}"))
            );
            prop_assert_eq!(header_values(&single, "Subject"), header_values(&folded, "Subject"));
        }
    }
}
