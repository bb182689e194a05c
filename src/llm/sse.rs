//! Line reassembly for SSE byte streams.
//!
//! Network reads do not respect event boundaries: one `data:` line can arrive
//! split across two reads, and a multi-byte UTF-8 character can straddle the
//! split point. Bytes are buffered until a newline arrives, so decoding and
//! parsing only ever see complete lines.

pub(crate) struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Appends one network read and returns the complete lines it unlocked,
    /// trimmed and with blanks dropped. Bytes after the last newline stay
    /// buffered for the next read.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let Some(last_newline) = self.buf.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.buf.drain(..=last_newline).collect();
        String::from_utf8_lossy(&complete)
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect()
    }
}
