use std::fmt;

use crate::errors::ChatStreamError;

/// Delimiter that bounds frames in the text stream (a single newline unless
/// configured otherwise).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FrameDelimiter(String);

impl FrameDelimiter {
    /// Creates a delimiter; the empty string is rejected.
    pub fn new(value: impl Into<String>) -> Result<Self, ChatStreamError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ChatStreamError::Config(
                "frame delimiter must not be empty".into(),
            ));
        }
        Ok(Self(value))
    }

    /// Returns the delimiter text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FrameDelimiter {
    fn default() -> Self {
        Self("\n".to_string())
    }
}

impl TryFrom<String> for FrameDelimiter {
    type Error = ChatStreamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FrameDelimiter> for String {
    fn from(value: FrameDelimiter) -> Self {
        value.0
    }
}

/// One delimiter-bounded slice of the stream. Untrimmed; classification
/// decides what whitespace means.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame(String);

impl RawFrame {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Buffers incoming chunks and yields complete frames, holding back the
/// unterminated tail.
///
/// Splitting never drops or duplicates input: the emitted frames joined with
/// the delimiter, followed by [`FrameSplitter::buffered`], always equal
/// everything fed so far.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    delimiter: FrameDelimiter,
    buffer: String,
    /// Incomplete UTF-8 sequence carried over from the last byte chunk.
    pending: Vec<u8>,
}

impl FrameSplitter {
    pub fn new(delimiter: FrameDelimiter) -> Self {
        Self {
            delimiter,
            buffer: String::new(),
            pending: Vec::new(),
        }
    }

    pub fn delimiter(&self) -> &FrameDelimiter {
        &self.delimiter
    }

    /// Unterminated tail seen so far.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Appends a text chunk and returns every frame it completed.
    pub fn feed(&mut self, chunk: &str) -> Vec<RawFrame> {
        if chunk.is_empty() {
            return Vec::new();
        }
        let delim = self.delimiter.as_str();
        // The buffer holds no delimiter yet, so only its last `len - 1`
        // bytes can start one that the new chunk completes.
        let mut search_from = self.buffer.len().saturating_sub(delim.len() - 1);
        while !self.buffer.is_char_boundary(search_from) {
            search_from -= 1;
        }
        self.buffer.push_str(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(idx) = self.buffer[search_from..].find(delim) {
            let end = search_from + idx;
            frames.push(RawFrame(self.buffer[start..end].to_string()));
            start = end + delim.len();
            search_from = start;
        }
        if start > 0 {
            self.buffer.drain(..start);
        }
        frames
    }

    /// Decodes a byte chunk as streaming UTF-8 and feeds it.
    ///
    /// A multi-byte sequence cut by the chunk boundary is held until the next
    /// call; invalid bytes become U+FFFD.
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        let text = self.decode(chunk);
        self.feed(&text)
    }

    /// Emits the remaining buffer as a final frame when it holds anything
    /// besides whitespace. The buffer is empty afterwards.
    pub fn flush(&mut self) -> Option<RawFrame> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.buffer.push_str(&tail);
        }
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            return None;
        }
        Some(RawFrame(rest))
    }

    /// Discards buffered data.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending.clear();
    }

    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut pending = std::mem::take(&mut self.pending);
        pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(pending.len());
        let mut rest: &[u8] = &pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            rest = tail;
                            break;
                        }
                    }
                }
            }
        }
        self.pending = rest.to_vec();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames_text(frames: &[RawFrame]) -> Vec<&str> {
        frames.iter().map(RawFrame::as_str).collect()
    }

    fn feed_all(splitter: &mut FrameSplitter, chunks: &[&str]) -> Vec<RawFrame> {
        chunks.iter().flat_map(|c| splitter.feed(c)).collect()
    }

    #[test]
    fn holds_back_incomplete_tail() {
        let mut splitter = FrameSplitter::default();
        let frames = splitter.feed("data: a\ndata: b");
        assert_eq!(frames_text(&frames), vec!["data: a"]);
        assert_eq!(splitter.buffered(), "data: b");
        let frames = splitter.feed("\n");
        assert_eq!(frames_text(&frames), vec!["data: b"]);
        assert_eq!(splitter.buffered(), "");
    }

    #[test]
    fn empty_chunk_and_undelimited_chunk_yield_nothing() {
        let mut splitter = FrameSplitter::default();
        assert!(splitter.feed("").is_empty());
        assert!(splitter.feed("no newline yet").is_empty());
        assert_eq!(splitter.buffered(), "no newline yet");
    }

    #[test]
    fn chunk_boundaries_do_not_change_frames() {
        let input = "data: {\"content\":\"héllo\"}\n\n: keep-alive\r\ndata: [DONE]\ntail";
        let mut whole = FrameSplitter::default();
        let expected = whole.feed(input);

        for split_at in (0..=input.len()).filter(|i| input.is_char_boundary(*i)) {
            let mut splitter = FrameSplitter::default();
            let (a, b) = input.split_at(split_at);
            let frames = feed_all(&mut splitter, &[a, b]);
            assert_eq!(frames, expected, "split at {split_at}");
            assert_eq!(splitter.buffered(), "tail");
        }

        let mut bytewise = FrameSplitter::default();
        let frames: Vec<RawFrame> = input
            .as_bytes()
            .iter()
            .flat_map(|b| bytewise.feed_bytes(std::slice::from_ref(b)))
            .collect();
        assert_eq!(frames, expected);
    }

    #[test]
    fn frames_plus_leftover_reconstruct_input() {
        let input = "a\n\nb\nc\n  \nlast";
        let mut splitter = FrameSplitter::default();
        let frames = feed_all(&mut splitter, &["a\n", "\nb", "\nc\n ", " \nlast"]);
        let mut rebuilt: Vec<&str> = frames_text(&frames);
        let leftover = splitter.buffered().to_string();
        rebuilt.push(&leftover);
        assert_eq!(rebuilt.join("\n"), input);
    }

    #[test]
    fn multi_char_delimiter_split_across_chunks() {
        let delim = FrameDelimiter::new("\n\n").expect("delimiter");
        let mut splitter = FrameSplitter::new(delim);
        assert!(splitter.feed("data: a\n").is_empty());
        let frames = splitter.feed("\ndata: b\n\n");
        assert_eq!(frames_text(&frames), vec!["data: a", "data: b"]);
    }

    #[test]
    fn flush_emits_non_blank_remainder_once() {
        let mut splitter = FrameSplitter::default();
        splitter.feed("data: {\"content\":\"hel");
        splitter.feed("lo\"}");
        let last = splitter.flush().expect("remainder");
        assert_eq!(last.as_str(), "data: {\"content\":\"hello\"}");
        assert!(splitter.flush().is_none());

        splitter.feed("   ");
        assert!(splitter.flush().is_none());
        assert_eq!(splitter.buffered(), "");
    }

    #[test]
    fn utf8_sequence_split_across_byte_chunks() {
        let bytes = "思考\n".as_bytes();
        let mut splitter = FrameSplitter::default();
        assert!(splitter.feed_bytes(&bytes[..2]).is_empty());
        assert!(splitter.feed_bytes(&bytes[2..4]).is_empty());
        let frames = splitter.feed_bytes(&bytes[4..]);
        assert_eq!(frames_text(&frames), vec!["思考"]);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let mut splitter = FrameSplitter::default();
        let frames = splitter.feed_bytes(b"a\xffb\n");
        assert_eq!(frames_text(&frames), vec!["a\u{FFFD}b"]);
    }

    #[test]
    fn empty_delimiter_is_rejected() {
        assert!(matches!(
            FrameDelimiter::new(""),
            Err(ChatStreamError::Config(_))
        ));
        let parsed: Result<FrameDelimiter, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn reset_discards_buffer() {
        let mut splitter = FrameSplitter::default();
        splitter.feed("partial");
        splitter.feed_bytes(&"é".as_bytes()[..1]);
        splitter.reset();
        assert_eq!(splitter.buffered(), "");
        assert!(splitter.flush().is_none());
    }
}
