//! The outcome of one script invocation.

use crate::command::RoutingState;
use crate::handler::HandlerId;
use crate::transcript::Transcript;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;
use url::Url;

/// How the script process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Normal exit with a status code.
    Code(i32),
    /// Killed by a signal. The number is unknown on platforms without signals.
    Signal(Option<i32>),
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitOutcome::Code(code),
            None => ExitOutcome::Signal(signal_number(&status)),
        }
    }
}

#[cfg(unix)]
fn signal_number(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_number(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Why a session failed. The display text completes the sentence
/// "... failed because ".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("the provided URL <{url}> is invalid.")]
    InvalidInput { url: String },

    #[error("no script is configured.")]
    ScriptNotConfigured,

    #[error("the script \"{}\" is not an executable file.", .path.display())]
    ScriptNotExecutable { path: PathBuf },

    #[error("the script \"{}\" could not be started: {message}.", .path.display())]
    SpawnFailed { path: PathBuf, message: String },

    #[error("it was terminated by an uncaught signal.")]
    SignalTermination { signal: Option<i32> },

    #[error("it terminated with a nonzero exit code {code}.")]
    NonZeroExit { code: i32 },

    #[error("{}.", .messages.join("; "))]
    ScriptProtocolError { messages: Vec<String> },

    #[error("it did not specify which app to open the URL with.")]
    NoHandlerChosen,

    #[error("it did not finish within {}.", format_after(.after))]
    Timeout { after: Duration },

    /// The session task was dropped before it concluded, e.g. at runtime
    /// shutdown.
    #[error("it was cancelled before it finished.")]
    Cancelled,
}

fn format_after(after: &Duration) -> String {
    humantime::format_duration(*after).to_string()
}

impl FailureReason {
    /// True for failures detected before the script was running.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            FailureReason::InvalidInput { .. }
                | FailureReason::ScriptNotConfigured
                | FailureReason::ScriptNotExecutable { .. }
                | FailureReason::SpawnFailed { .. }
        )
    }
}

/// Where to send the URL after a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routing {
    pub target_url: Url,
    pub handlers: HashSet<HandlerId>,
}

impl Routing {
    /// The only chosen handler, if exactly one was chosen.
    pub fn sole_handler(&self) -> Option<&HandlerId> {
        match self.handlers.len() {
            1 => self.handlers.iter().next(),
            _ => None,
        }
    }

    pub fn sorted_handlers(&self) -> Vec<&HandlerId> {
        let mut handlers: Vec<_> = self.handlers.iter().collect();
        handlers.sort();
        handlers
    }
}

/// A failed run: the reason, a sentence for the user, and the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: FailureReason,
    pub message: String,
    pub transcript: Transcript,
}

impl Failure {
    pub fn new(
        reason: FailureReason,
        script: Option<&Path>,
        requested_url: &str,
        transcript: Transcript,
    ) -> Self {
        let message = match script {
            Some(path) if !reason.is_precondition() => format!(
                "The script \"{}\" was asked what to do with URL <{}>, but failed because {}",
                path.display(),
                requested_url,
                reason
            ),
            _ => format!("urlscript failed because {reason}"),
        };
        Self {
            reason,
            message,
            transcript,
        }
    }
}

/// Terminal result of a session, delivered exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Success(Routing),
    Failure(Failure),
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success(_))
    }

    pub fn routing(&self) -> Option<&Routing> {
        match self {
            Verdict::Success(routing) => Some(routing),
            Verdict::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Verdict::Success(_) => None,
            Verdict::Failure(failure) => Some(failure),
        }
    }
}

/// Decide the outcome of a finished script. First match wins: signal, exit
/// code, protocol errors, no handler, success.
pub fn decide(
    exit: ExitOutcome,
    script_errors: &[String],
    state: RoutingState,
    requested_url: &str,
) -> Result<Routing, FailureReason> {
    match exit {
        ExitOutcome::Signal(signal) => return Err(FailureReason::SignalTermination { signal }),
        ExitOutcome::Code(code) if code != 0 => return Err(FailureReason::NonZeroExit { code }),
        ExitOutcome::Code(_) => {}
    }

    if !script_errors.is_empty() {
        return Err(FailureReason::ScriptProtocolError {
            messages: script_errors.to_vec(),
        });
    }

    if state.handlers.is_empty() {
        return Err(FailureReason::NoHandlerChosen);
    }

    let target_url = state.target_url.ok_or_else(|| FailureReason::InvalidInput {
        url: requested_url.to_string(),
    })?;

    Ok(Routing {
        target_url,
        handlers: state.handlers,
    })
}
