//! Incremental byte-stream to line splitting.

use tracing::warn;

const TERMINATOR: u8 = b'\n';

/// Text encoding used to decode completed lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Seven-bit ASCII. Any byte above `0x7f` makes the line undecodable.
    #[default]
    Ascii,
    /// UTF-8. Invalid sequences make the line undecodable.
    Utf8,
}

impl Encoding {
    fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Encoding::Ascii if bytes.is_ascii() => {
                Some(bytes.iter().map(|&b| b as char).collect())
            }
            Encoding::Ascii => None,
            Encoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
        }
    }
}

/// Accumulates raw bytes and hands back every line completed by a `\n`.
///
/// The buffer only ever holds the unterminated remainder. There is no upper
/// bound on how large that remainder may grow. A splitter is single-use: once
/// its stream has ended call [`finish`](Self::finish) and build a new one for
/// the next stream.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
    encoding: Encoding,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding(encoding: Encoding) -> Self {
        Self {
            buffer: Vec::new(),
            encoding,
        }
    }

    /// Append `bytes` and return the lines they completed, in order.
    ///
    /// Terminators are not included in the returned lines and `\r` is left
    /// untouched. Lines that fail to decode are dropped; they never affect
    /// the lines around them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        // The retained remainder never holds a terminator.
        let offset = self.buffer.len();
        self.buffer.extend_from_slice(bytes);

        let Some(last) = bytes.iter().rposition(|&b| b == TERMINATOR) else {
            return Vec::new();
        };
        let last = offset + last;

        let remainder = self.buffer.split_off(last + 1);
        let complete = std::mem::replace(&mut self.buffer, remainder);

        complete[..last]
            .split(|&b| b == TERMINATOR)
            .filter_map(|raw| {
                let line = self.encoding.decode(raw);
                if line.is_none() {
                    warn!(bytes = raw.len(), "dropping undecodable line");
                }
                line
            })
            .collect()
    }

    /// Number of buffered bytes that are not yet part of a complete line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Consume the splitter at end of stream, returning the unterminated
    /// remainder. Callers discard it: a partial line is never a command.
    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}
