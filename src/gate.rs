//! The join point between process exit and output drain.

use crate::stream_reader::StreamOrigin;

/// One of the three completion signals a session waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    ProcessExited,
    Drained(StreamOrigin),
}

/// Closes once the process has exited and both output streams have drained.
///
/// Signals may arrive in any order and repeats are harmless. [`signal`]
/// returns `true` exactly once: on the call that completes the set.
///
/// [`signal`]: CompletionGate::signal
#[derive(Debug, Clone, Default)]
pub struct CompletionGate {
    process_exited: bool,
    stdout_drained: bool,
    stderr_drained: bool,
    fired: bool,
}

impl CompletionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `signal`. Returns `true` iff this call closed the gate.
    pub fn signal(&mut self, signal: Signal) -> bool {
        match signal {
            Signal::ProcessExited => self.process_exited = true,
            Signal::Drained(StreamOrigin::Stdout) => self.stdout_drained = true,
            Signal::Drained(StreamOrigin::Stderr) => self.stderr_drained = true,
        }

        if self.fired || !self.is_satisfied() {
            return false;
        }
        self.fired = true;
        true
    }

    pub fn process_exited(&self) -> bool {
        self.process_exited
    }

    /// Both readers have reached end of stream.
    pub fn output_drained(&self) -> bool {
        self.stdout_drained && self.stderr_drained
    }

    pub fn is_satisfied(&self) -> bool {
        self.process_exited && self.output_drained()
    }
}
