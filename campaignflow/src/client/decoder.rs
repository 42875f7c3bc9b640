//! Incremental push-channel frame decoder.

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// The `event:` line.
    pub event: String,
    /// The `data:` lines, joined with `\n`.
    pub data: String,
}

/// Turns arbitrarily split network chunks into frames.
///
/// Partial lines are buffered as raw bytes, so a multi-byte character split
/// across two reads decodes correctly. A frame is only produced once both an
/// `event:` line and the blank terminator line were seen; everything else
/// stays pending.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes and returns every frame they completed.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Returns true if a partial line or frame is buffered.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || self.event.is_some() || !self.data.is_empty()
    }

    /// Drops any partial state.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.event = None;
        self.data.clear();
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            let data = std::mem::take(&mut self.data);
            let event = self.event.take()?;
            return Some(SseFrame {
                event,
                data: data.join("\n"),
            });
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }
}
