//! # urlscript
//!
//! Route URL open requests through a script you write.
//!
//! When a URL needs opening, urlscript runs your script with the URL, reads
//! what the script prints, and turns that into a decision: which
//! application(s) should open the URL, and possibly a rewritten URL.
//!
//! ## Quick start
//!
//! ```no_run
//! use urlscript::{ScriptSession, SessionSettings, Verdict};
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = SessionSettings::with_script("/usr/local/bin/route-url");
//!     let session = ScriptSession::new("https://example.com/", settings);
//!
//!     match session.verdict().await {
//!         Verdict::Success(routing) => {
//!             for app in routing.sorted_handlers() {
//!                 println!("open {} with {}", routing.target_url, app);
//!             }
//!         }
//!         Verdict::Failure(failure) => {
//!             eprintln!("{}", failure.message);
//!             eprint!("{}", failure.transcript);
//!         }
//!     }
//! }
//! ```
//!
//! ## Script protocol
//!
//! The script is started with the URL as its only argument and these
//! environment variables:
//!
//! | Variable | Value |
//! |----------|-------|
//! | `URL` | the requested URL, verbatim |
//! | `FROM_APP` | the frontmost application, when known |
//! | `AVAILABLE_APPS` | `:`-separated handlers for the URL's scheme |
//! | `RUNNING_APPS` | the running subset of `AVAILABLE_APPS` |
//!
//! It answers on stdout, one command per line:
//!
//! | Line | Effect |
//! |------|--------|
//! | `Use: <app-id>` | nominate an application |
//! | `URL: <absolute-url>` | open this URL instead |
//!
//! Lines that are not shaped like `Token: argument` are ignored, so the
//! script is free to print other output. Unknown tokens and invalid
//! arguments are collected and reported together. The run succeeds only if
//! the script exits with status 0, printed no invalid commands, and
//! nominated at least one application.
//!
//! ## Running many sessions
//!
//! [`SessionRegistry::launch`] starts a session and keeps track of it until
//! its verdict has been delivered:
//!
//! ```no_run
//! use urlscript::{ScriptSession, SessionRegistry, SessionSettings};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = SessionRegistry::new();
//!     for url in ["https://a.example/", "https://b.example/"] {
//!         let session = ScriptSession::new(url, SessionSettings::with_script("./route"));
//!         registry.launch(session, |verdict| println!("{verdict:?}"));
//!     }
//!     registry.wait_idle().await;
//! }
//! ```
//!
//! ## Adding a command
//!
//! Implement [`RoutingCommand`] and register it in [`parser`]:
//!
//! ```
//! use urlscript::command::{CommandError, RoutingCommand, RoutingState};
//!
//! #[derive(Debug)]
//! pub struct Forget;
//!
//! impl Forget {
//!     pub const NAME: &'static str = "Forget";
//! }
//!
//! impl RoutingCommand for Forget {
//!     fn name(&self) -> &'static str { Self::NAME }
//!
//!     fn parse(_argument: &str) -> Result<Self, CommandError> {
//!         Ok(Self)
//!     }
//!
//!     fn apply(&self, state: &mut RoutingState) {
//!         state.handlers.clear();
//!     }
//! }
//! ```

pub mod command;
pub mod commands;
pub mod config;
pub mod gate;
pub mod handler;
pub mod launcher;
pub mod line_splitter;
pub mod parser;
pub mod process;
pub mod registry;
pub mod session;
pub mod stream_reader;
pub mod transcript;
pub mod verdict;

pub use command::{CommandError, RoutingCommand, RoutingState};
pub use commands::{UrlOverride, UseApp};
pub use config::Config;
pub use handler::{AppCatalog, HandlerId, StaticCatalog};
pub use launcher::{CommandLauncher, Launcher};
pub use line_splitter::{Encoding, LineSplitter};
pub use parser::parse_line;
pub use registry::SessionRegistry;
pub use session::{ScriptSession, SessionId, SessionSettings, SessionState};
pub use stream_reader::{StreamEvent, StreamOrigin, StreamReader};
pub use transcript::{Transcript, TranscriptEntry};
pub use verdict::{Failure, FailureReason, Routing, Verdict};
