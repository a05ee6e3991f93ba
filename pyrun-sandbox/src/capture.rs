//! Bounded capture of a child's output stream

/// Appended to text that hit the ceiling
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Accumulates bytes up to a ceiling and silently discards the rest.
///
/// Hitting the ceiling never stops the producer: the reader keeps draining
/// the pipe so the child cannot block on a full buffer.
#[derive(Debug)]
pub struct CaptureBuffer {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
}

/// Finalized contents of a [`CaptureBuffer`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub text: String,
    pub truncated: bool,
}

impl CaptureBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(limit.min(8 * 1024)),
            limit,
            truncated: false,
        }
    }

    pub fn write(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        let keep = chunk.len().min(room);
        self.bytes.extend_from_slice(&chunk[..keep]);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Decode as UTF-8, replacing invalid sequences instead of failing.
    pub fn finalize(self) -> CapturedOutput {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        CapturedOutput {
            text,
            truncated: self.truncated,
        }
    }
}
