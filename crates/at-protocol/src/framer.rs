//! Line framing for AT command streams
//!
//! A modem emits lines terminated by `\r`, `\n` or both, with arbitrary blank
//! lines between them. The SMS data-entry prompt `"> "` is the one exception:
//! the modem sends it without any terminator and then waits for the PDU.
//!
//! [`LineFramer`] owns a fixed-size read buffer. The caller reads directly into
//! [`LineFramer::read_space`], reports the byte count with
//! [`LineFramer::commit`], then drains [`LineFramer::next_line`] until it
//! returns `None`. A line that does not fit in the fixed buffer spills into a
//! growable backup buffer and is reassembled once its terminator arrives.

use tracing::trace;

/// Default size of the static read buffer
pub const DEFAULT_LINE_CAPACITY: usize = 8 * 1024;

/// The SMS data-entry prompt, delivered as a complete line
pub const SMS_PROMPT: &str = "> ";

fn is_eol(b: u8) -> bool {
    b == b'\r' || b == b'\n'
}

/// Streaming line framer with overflow handling
pub struct LineFramer {
    buf: Vec<u8>,
    start: usize,
    end: usize,
    backup: Option<Vec<u8>>,
}

impl LineFramer {
    /// Create a framer with the default buffer capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LINE_CAPACITY)
    }

    /// Create a framer with a specific static buffer capacity
    ///
    /// Capacities below two bytes are rounded up so the prompt always fits.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(2)],
            start: 0,
            end: 0,
            backup: None,
        }
    }

    /// Size of the static buffer
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of buffered bytes not yet framed into a line
    pub fn buffered_len(&self) -> usize {
        (self.end - self.start) + self.backup.as_ref().map_or(0, Vec::len)
    }

    /// Whether a partial line has spilled into the backup buffer
    pub fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    /// Free space to read into
    ///
    /// Compacts the buffer first. If it is completely filled by a single
    /// unterminated line, that partial line moves into the backup buffer so
    /// reading can continue. Callers must drain [`next_line`](Self::next_line)
    /// before asking for more space.
    pub fn read_space(&mut self) -> &mut [u8] {
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        } else if self.end == self.buf.len() {
            if self.start > 0 {
                self.buf.copy_within(self.start..self.end, 0);
                self.end -= self.start;
                self.start = 0;
            } else {
                self.spill();
            }
        }
        &mut self.buf[self.end..]
    }

    /// Record that `n` bytes were written into the last [`read_space`](Self::read_space)
    pub fn commit(&mut self, n: usize) {
        self.end = (self.end + n).min(self.buf.len());
    }

    /// Frame the next complete line, if one is buffered
    ///
    /// Leading `\r`/`\n` bytes are skipped. The returned line excludes its
    /// terminator.
    pub fn next_line(&mut self) -> Option<String> {
        if self.backup.is_none() {
            while self.start < self.end && is_eol(self.buf[self.start]) {
                self.start += 1;
            }

            // Only a prompt with nothing after it counts; "> foo\r" is a normal line.
            if &self.buf[self.start..self.end] == SMS_PROMPT.as_bytes() {
                self.start = self.end;
                return Some(SMS_PROMPT.to_string());
            }
        }

        let pending = &self.buf[self.start..self.end];
        let pos = pending.iter().position(|&b| is_eol(b))?;

        let line = match self.backup.take() {
            Some(mut backup) => {
                backup.extend_from_slice(&pending[..pos]);
                String::from_utf8_lossy(&backup).into_owned()
            }
            None => String::from_utf8_lossy(&pending[..pos]).into_owned(),
        };
        self.start += pos + 1;
        Some(line)
    }

    /// Feed bytes and collect every line they complete
    pub fn push_bytes(&mut self, mut data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        while !data.is_empty() {
            let space = self.read_space();
            let n = space.len().min(data.len());
            space[..n].copy_from_slice(&data[..n]);
            self.commit(n);
            data = &data[n..];
            while let Some(line) = self.next_line() {
                lines.push(line);
            }
        }
        lines
    }

    /// Discard all buffered data, including any backup
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
        self.backup = None;
    }

    fn spill(&mut self) {
        let partial = &self.buf[self.start..self.end];
        trace!(
            "line exceeds {} byte buffer, spilling {} bytes to backup",
            self.buf.len(),
            partial.len()
        );
        match self.backup.as_mut() {
            Some(backup) => backup.extend_from_slice(partial),
            None => {
                let skip = partial.iter().take_while(|&&b| is_eol(b)).count();
                self.backup = Some(partial[skip..].to_vec());
            }
        }
        self.start = 0;
        self.end = 0;
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}
