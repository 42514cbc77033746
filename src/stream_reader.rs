//! [`StreamReader`]: turns an async byte source into line events.

use crate::line_splitter::{Encoding, LineSplitter};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

const CHUNK_SIZE: usize = 4096;

/// Which of the script's output streams a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamOrigin {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamOrigin::Stdout => f.write_str("stdout"),
            StreamOrigin::Stderr => f.write_str("stderr"),
        }
    }
}

/// Events delivered to stream observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A complete line, without its terminator.
    Line { origin: StreamOrigin, text: String },
    /// The stream reached end of file. Always the last event for an origin.
    Closed { origin: StreamOrigin },
}

type Handler = Box<dyn FnMut(&StreamEvent) + Send>;

enum Observer {
    /// Delivered onto whichever task owns the receiving end.
    Channel(UnboundedSender<StreamEvent>),
    /// Run directly on the reader task.
    Inline(Handler),
}

impl Observer {
    fn dispatch(&mut self, event: &StreamEvent) {
        match self {
            // A dropped receiver only means that observer stopped listening.
            Observer::Channel(tx) => {
                let _ = tx.send(event.clone());
            }
            Observer::Inline(handler) => handler(event),
        }
    }
}

/// Reads one stream on a background task and fans its lines out to observers.
///
/// Every observer sees each line in stream order followed by a single
/// [`StreamEvent::Closed`]. A trailing partial line without a terminator is
/// discarded before `Closed` is sent.
pub struct StreamReader {
    origin: StreamOrigin,
    encoding: Encoding,
    source: Option<Box<dyn AsyncRead + Unpin + Send>>,
    observers: Vec<Observer>,
    task: Option<JoinHandle<()>>,
}

impl StreamReader {
    pub fn new(source: impl AsyncRead + Unpin + Send + 'static, origin: StreamOrigin) -> Self {
        Self {
            origin,
            encoding: Encoding::default(),
            source: Some(Box::new(source)),
            observers: Vec::new(),
            task: None,
        }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn origin(&self) -> StreamOrigin {
        self.origin
    }

    /// Deliver events onto the task that owns `tx`'s receiver.
    ///
    /// Observers must be registered before [`start`](Self::start).
    pub fn add_observer(&mut self, tx: UnboundedSender<StreamEvent>) {
        self.register(Observer::Channel(tx));
    }

    /// Run `handler` on the reader task itself for every event.
    pub fn add_handler(&mut self, handler: impl FnMut(&StreamEvent) + Send + 'static) {
        self.register(Observer::Inline(Box::new(handler)));
    }

    fn register(&mut self, observer: Observer) {
        if self.source.is_none() {
            warn!(origin = %self.origin, "observer added after start; ignoring");
            return;
        }
        self.observers.push(observer);
    }

    /// Spawn the background read loop. Calling it again is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        let Some(source) = self.source.take() else {
            return;
        };
        let observers = std::mem::take(&mut self.observers);
        let splitter = LineSplitter::with_encoding(self.encoding);
        self.task = Some(tokio::spawn(read_loop(
            source,
            self.origin,
            splitter,
            observers,
        )));
    }

    /// Detach from the stream. No further events are produced, even if more
    /// bytes arrive later. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(origin = %self.origin, "stream reader stopped");
        }
        self.source = None;
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn read_loop(
    mut source: Box<dyn AsyncRead + Unpin + Send>,
    origin: StreamOrigin,
    mut splitter: LineSplitter,
    mut observers: Vec<Observer>,
) {
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let n = match source.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(%origin, error = %e, "stream read failed; treating as end of stream");
                break;
            }
        };
        trace!(%origin, bytes = n, "read chunk");

        for text in splitter.feed(&buffer[..n]) {
            let event = StreamEvent::Line { origin, text };
            for observer in observers.iter_mut() {
                observer.dispatch(&event);
            }
        }
    }

    let partial = splitter.finish();
    if !partial.is_empty() {
        debug!(%origin, bytes = partial.len(), "discarding unterminated trailing line");
    }

    let closed = StreamEvent::Closed { origin };
    for observer in observers.iter_mut() {
        observer.dispatch(&closed);
    }
}
