//! Rich text (RTF) to plain text.
//!
//! Only what is needed to read a message body: paragraph and tab controls,
//! hex and unicode escapes, code page selection, and skipping of the
//! destinations that never carry visible text. Outlook's HTML-encapsulated
//! RTF is handled through `\htmlrtf` suppression.

use encoding_rs::{Encoding, WINDOWS_1252};

/// Reasons a payload cannot be converted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RtfError {
    #[error("payload does not start with an RTF header")]
    NotRtf,

    #[error("group closed at byte {0} was never opened")]
    Unbalanced(usize),
}

const SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "object",
    "header",
    "headerl",
    "headerr",
    "headerf",
    "footer",
    "footerl",
    "footerr",
    "footerf",
    "themedata",
    "colorschememapping",
    "datastore",
    "latentstyles",
    "listtable",
    "listoverridetable",
    "rsidtbl",
    "generator",
    "xmlnstbl",
    "mmathPr",
    "fldinst",
    "filetbl",
    "revtbl",
    "listtext",
    "pntext",
    "pntxta",
    "pntxtb",
];

#[derive(Debug, Clone, Copy)]
struct GroupState {
    skip: bool,
    suppressed: bool,
    fallback_len: usize,
}

impl Default for GroupState {
    fn default() -> Self {
        Self {
            skip: false,
            suppressed: false,
            fallback_len: 1,
        }
    }
}

struct Converter {
    out: String,
    pending: Vec<u8>,
    encoding: &'static Encoding,
    stack: Vec<GroupState>,
    state: GroupState,
    fallback_left: usize,
    high_surrogate: Option<u32>,
}

/// Converts an RTF document to plain text.
///
/// # Errors
///
/// Returns an error if the payload is not RTF or closes a group it never
/// opened. A document truncated before its final brace still converts.
pub fn rtf_to_text(rtf: &[u8]) -> Result<String, RtfError> {
    let start = rtf
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(rtf.len());
    let rtf = &rtf[start..];
    if !rtf.starts_with(b"{\\rtf") {
        return Err(RtfError::NotRtf);
    }

    let mut converter = Converter {
        out: String::with_capacity(rtf.len() / 2),
        pending: Vec::new(),
        encoding: WINDOWS_1252,
        stack: Vec::new(),
        state: GroupState::default(),
        fallback_left: 0,
        high_surrogate: None,
    };
    converter.run(rtf)?;
    converter.flush();
    Ok(converter.out)
}

impl Converter {
    fn run(&mut self, data: &[u8]) -> Result<(), RtfError> {
        let mut i = 0;
        while i < data.len() {
            match data[i] {
                b'{' => {
                    self.stack.push(self.state);
                    i += 1;
                }
                b'}' => {
                    self.state = self.stack.pop().ok_or(RtfError::Unbalanced(i))?;
                    self.fallback_left = 0;
                    i += 1;
                }
                b'\\' => i = self.control(data, i + 1),
                b'\r' | b'\n' => i += 1,
                byte => {
                    self.byte(byte);
                    i += 1;
                }
            }
        }
        Ok(())
    }

    /// Handles the control sequence starting at `i` (just past the backslash)
    /// and returns the index of the first byte after it.
    fn control(&mut self, data: &[u8], i: usize) -> usize {
        let Some(&first) = data.get(i) else {
            return i;
        };

        if first.is_ascii_alphabetic() {
            let word_end = data[i..]
                .iter()
                .position(|b| !b.is_ascii_alphabetic())
                .map_or(data.len(), |n| i + n);
            let word = String::from_utf8_lossy(&data[i..word_end]).into_owned();

            let mut end = word_end;
            if data.get(end) == Some(&b'-') {
                end += 1;
            }
            while data.get(end).is_some_and(u8::is_ascii_digit) {
                end += 1;
            }
            let param = std::str::from_utf8(&data[word_end..end])
                .ok()
                .and_then(|digits| digits.parse::<i64>().ok());
            if data.get(end) == Some(&b' ') {
                end += 1;
            }

            if word == "bin" {
                let len = usize::try_from(param.unwrap_or(0)).unwrap_or(0);
                return end.saturating_add(len).min(data.len());
            }
            self.word(&word, param);
            return end;
        }

        match first {
            b'\'' => {
                let hex = data.get(i + 1..i + 3).and_then(|pair| std::str::from_utf8(pair).ok());
                match hex.and_then(|pair| u8::from_str_radix(pair, 16).ok()) {
                    Some(byte) => {
                        self.byte(byte);
                        i + 3
                    }
                    None => i + 1,
                }
            }
            b'\\' | b'{' | b'}' => {
                self.byte(first);
                i + 1
            }
            b'~' => {
                self.text('\u{a0}');
                i + 1
            }
            b'_' => {
                self.text('-');
                i + 1
            }
            b'*' => {
                self.state.skip = true;
                i + 1
            }
            b'\r' | b'\n' => {
                self.text('\n');
                i + 1
            }
            _ => i + 1,
        }
    }

    fn word(&mut self, word: &str, param: Option<i64>) {
        if SKIPPED_DESTINATIONS.contains(&word) {
            self.state.skip = true;
            return;
        }
        match word {
            "ansicpg" => {
                if let Some(page) = param {
                    let label = format!("windows-{page}");
                    if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
                        self.flush();
                        self.encoding = encoding;
                    }
                }
            }
            "uc" => self.state.fallback_len = usize::try_from(param.unwrap_or(1)).unwrap_or(1),
            "u" => {
                if let Some(code) = param {
                    self.unicode(code);
                    self.fallback_left = self.state.fallback_len;
                }
            }
            "htmlrtf" => self.state.suppressed = param != Some(0),
            "par" | "line" | "sect" | "page" | "row" => self.text('\n'),
            "tab" | "cell" => self.text('\t'),
            "emdash" => self.text('\u{2014}'),
            "endash" => self.text('\u{2013}'),
            "bullet" => self.text('\u{2022}'),
            "lquote" => self.text('\u{2018}'),
            "rquote" => self.text('\u{2019}'),
            "ldblquote" => self.text('\u{201c}'),
            "rdblquote" => self.text('\u{201d}'),
            "emspace" | "enspace" | "qmspace" => self.text(' '),
            _ => {}
        }
    }

    fn unicode(&mut self, code: i64) {
        let code = if code < 0 { code + 0x10000 } else { code };
        let Ok(code) = u32::try_from(code) else {
            return;
        };
        let decoded = match (self.high_surrogate.take(), code) {
            (None, 0xD800..=0xDBFF) => {
                self.high_surrogate = Some(code);
                None
            }
            (Some(high), 0xDC00..=0xDFFF) => {
                char::from_u32(0x10000 + ((high - 0xD800) << 10) + (code - 0xDC00))
            }
            (_, code) => char::from_u32(code),
        };
        if let Some(ch) = decoded {
            self.text(ch);
        }
    }

    fn visible(&self) -> bool {
        !self.state.skip && !self.state.suppressed
    }

    fn byte(&mut self, byte: u8) {
        if self.fallback_left > 0 {
            self.fallback_left -= 1;
            return;
        }
        if !self.visible() {
            return;
        }
        if byte.is_ascii() {
            self.flush();
            self.out.push(char::from(byte));
        } else {
            self.pending.push(byte);
        }
    }

    fn text(&mut self, ch: char) {
        if self.visible() {
            self.flush();
            self.out.push(ch);
        }
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let (decoded, _) = self.encoding.decode_without_bom_handling(&self.pending);
        self.out.push_str(&decoded);
        self.pending.clear();
    }
}
