//! Append-only record of everything a script printed.

use crate::stream_reader::StreamOrigin;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub origin: StreamOrigin,
    pub text: String,
}

impl TranscriptEntry {
    /// Short tag used when rendering the entry as plain text.
    pub fn prefix(&self) -> &'static str {
        match self.origin {
            StreamOrigin::Stdout => "OUT:",
            StreamOrigin::Stderr => "ERR:",
        }
    }
}

/// Lines from both streams in the order they were received.
///
/// Order within one stream is file order. How stdout and stderr lines
/// interleave is simply the order in which the two readers delivered them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, origin: StreamOrigin, text: impl Into<String>) {
        self.entries.push(TranscriptEntry {
            origin,
            text: text.into(),
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lines from a single stream, in order.
    pub fn lines_from(&self, origin: StreamOrigin) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |entry| entry.origin == origin)
            .map(|entry| entry.text.as_str())
    }
}

/// One `OUT: ...` / `ERR: ...` line per entry.
impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{} {}", entry.prefix(), entry.text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrival_order_preserved_across_streams() {
        let mut transcript = Transcript::new();
        transcript.push(StreamOrigin::Stderr, "Test Routines Activated");
        transcript.push(StreamOrigin::Stdout, "Use: appA");
        transcript.push(StreamOrigin::Stderr, "ARGV:");

        assert_eq!(transcript.len(), 3);
        assert_eq!(
            transcript.to_string(),
            "ERR: Test Routines Activated\nOUT: Use: appA\nERR: ARGV:\n"
        );
        assert_eq!(
            transcript.lines_from(StreamOrigin::Stderr).collect::<Vec<_>>(),
            vec!["Test Routines Activated", "ARGV:"]
        );
    }

    #[test]
    fn test_empty_renders_nothing() {
        let transcript = Transcript::new();
        assert!(transcript.is_empty());
        assert_eq!(transcript.to_string(), "");
    }
}
