//! [`ScriptSession`]: one script invocation from spawn to verdict.
//!
//! # Lifecycle
//!
//! `Created → Running → Draining → Concluded`
//!
//! All session state is owned by a single coordination task. The two stream
//! readers and the process-exit wait feed that task; nothing else touches the
//! session's fields.
//!
//! The verdict is computed once the process has exited *and* both output
//! streams have reached end of file, in whichever order those happen.

use crate::command::RoutingState;
use crate::gate::{CompletionGate, Signal};
use crate::handler::{AppCatalog, HandlerId, StaticCatalog, encode_list};
use crate::line_splitter::Encoding;
use crate::parser::parse_line;
use crate::process::{ScriptInvocation, ScriptProcess};
use crate::stream_reader::{StreamEvent, StreamOrigin, StreamReader};
use crate::transcript::Transcript;
use crate::verdict::{ExitOutcome, Failure, FailureReason, Routing, Verdict, decide};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

pub const ENV_URL: &str = "URL";
pub const ENV_FROM_APP: &str = "FROM_APP";
pub const ENV_AVAILABLE_APPS: &str = "AVAILABLE_APPS";
pub const ENV_RUNNING_APPS: &str = "RUNNING_APPS";
pub const DEFAULT_HELPER_LIB_VAR: &str = "RUBYLIB";

/// Random identity of a session, used as the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Draining,
    Concluded,
}

/// Per-session inputs that do not come from the URL itself.
#[derive(Clone)]
pub struct SessionSettings {
    pub script: Option<PathBuf>,
    /// Scratch directory the script runs in.
    pub working_dir: PathBuf,
    /// Kill the script and fail if it runs longer than this.
    pub timeout: Option<Duration>,
    pub helper_lib: Option<PathBuf>,
    pub helper_lib_var: String,
    pub encoding: Encoding,
    pub catalog: Arc<dyn AppCatalog>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            script: None,
            working_dir: std::env::temp_dir(),
            timeout: None,
            helper_lib: None,
            helper_lib_var: DEFAULT_HELPER_LIB_VAR.to_string(),
            encoding: Encoding::default(),
            catalog: Arc::new(StaticCatalog::default()),
        }
    }
}

impl SessionSettings {
    pub fn with_script(script: impl Into<PathBuf>) -> Self {
        Self {
            script: Some(script.into()),
            ..Self::default()
        }
    }

    /// The configured script, if it is an executable regular file.
    pub fn resolve_script(&self) -> Result<&Path, FailureReason> {
        let path = self
            .script
            .as_deref()
            .ok_or(FailureReason::ScriptNotConfigured)?;
        if is_executable(path) {
            Ok(path)
        } else {
            Err(FailureReason::ScriptNotExecutable {
                path: path.to_path_buf(),
            })
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// One request to route a URL through the script.
pub struct ScriptSession {
    id: SessionId,
    requested_url: String,
    settings: SessionSettings,
    state: SessionState,
    routing: RoutingState,
    script_errors: Vec<String>,
    transcript: Transcript,
}

impl ScriptSession {
    pub fn new(requested_url: impl Into<String>, settings: SessionSettings) -> Self {
        let requested_url = requested_url.into();
        let routing = RoutingState::new(Url::parse(&requested_url).ok());
        Self {
            id: SessionId::random(),
            requested_url,
            settings,
            state: SessionState::Created,
            routing,
            script_errors: Vec::new(),
            transcript: Transcript::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn requested_url(&self) -> &str {
        &self.requested_url
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Start the session on the current tokio runtime and return immediately.
    ///
    /// `on_complete` is called exactly once with the verdict, from the
    /// session's coordination task.
    pub fn run<F>(mut self, on_complete: F) -> JoinHandle<()>
    where
        F: FnOnce(Verdict) + Send + 'static,
    {
        tokio::spawn(async move {
            let verdict = self.execute().await;
            on_complete(verdict);
        })
    }

    /// Run the session to completion and return its verdict.
    ///
    /// If the session task is cancelled first, the verdict is a
    /// [`FailureReason::Cancelled`] failure. A panic in the task is resumed
    /// on the caller.
    pub async fn verdict(self) -> Verdict {
        let script = self.settings.script.clone();
        let requested_url = self.requested_url.clone();
        let (tx, rx) = oneshot::channel();
        let task = self.run(move |verdict| {
            let _ = tx.send(verdict);
        });
        match rx.await {
            Ok(verdict) => verdict,
            Err(_) => match task.await {
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                _ => {
                    warn!(url = %requested_url, "session cancelled before reporting a verdict");
                    Verdict::Failure(Failure::new(
                        FailureReason::Cancelled,
                        script.as_deref(),
                        &requested_url,
                        Transcript::new(),
                    ))
                }
            },
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session = %self.id, from = ?self.state, to = ?next, "session state change");
        self.state = next;
    }

    async fn execute(&mut self) -> Verdict {
        self.transition(SessionState::Running);
        info!(session = %self.id, url = %self.requested_url, "routing URL through script");

        let Some(url) = self.routing.target_url.clone() else {
            return self.conclude(Err(FailureReason::InvalidInput {
                url: self.requested_url.clone(),
            }));
        };

        let script = match self.settings.resolve_script() {
            Ok(path) => path.to_path_buf(),
            Err(reason) => return self.conclude(Err(reason)),
        };

        let env = self.environment(&url).await;
        let invocation = ScriptInvocation {
            program: script.clone(),
            args: vec![self.requested_url.clone()],
            env_remove: self.unset_variables(&env),
            env,
            working_dir: self.settings.working_dir.clone(),
        };

        let (mut process, stdout, stderr) = match ScriptProcess::spawn(&invocation) {
            Ok(spawned) => spawned,
            Err(e) => {
                return self.conclude(Err(FailureReason::SpawnFailed {
                    path: script,
                    message: e.to_string(),
                }));
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers = [
            StreamReader::new(stdout, StreamOrigin::Stdout),
            StreamReader::new(stderr, StreamOrigin::Stderr),
        ]
        .map(|reader| reader.with_encoding(self.settings.encoding));
        for reader in readers.iter_mut() {
            debug!(session = %self.id, origin = %reader.origin(), "starting stream reader");
            reader.add_handler(log_script_output);
            reader.add_observer(tx.clone());
            reader.start();
        }
        drop(tx);

        let limit = self.settings.timeout;
        let timeout = async move {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timeout);

        let mut gate = CompletionGate::new();
        let mut exit = None;
        let mut events_open = true;

        loop {
            tokio::select! {
                event = rx.recv(), if events_open => {
                    let closed = match event {
                        Some(StreamEvent::Line { origin, text }) => {
                            self.handle_line(origin, text);
                            false
                        }
                        Some(StreamEvent::Closed { origin }) => {
                            debug!(session = %self.id, %origin, "stream drained");
                            gate.signal(Signal::Drained(origin))
                        }
                        None => {
                            // Every reader is gone; nothing more can arrive.
                            events_open = false;
                            let stdout = gate.signal(Signal::Drained(StreamOrigin::Stdout));
                            let stderr = gate.signal(Signal::Drained(StreamOrigin::Stderr));
                            stdout || stderr
                        }
                    };
                    if closed {
                        break;
                    }
                }
                status = process.wait(), if !gate.process_exited() => {
                    let outcome = match status {
                        Ok(status) => ExitOutcome::from(status),
                        Err(e) => {
                            warn!(session = %self.id, error = %e, "failed to wait for script");
                            ExitOutcome::Signal(None)
                        }
                    };
                    debug!(session = %self.id, ?outcome, "script exited");
                    exit = Some(outcome);
                    self.transition(SessionState::Draining);
                    if gate.signal(Signal::ProcessExited) {
                        break;
                    }
                }
                _ = &mut timeout => {
                    let limit = limit.unwrap_or_default();
                    warn!(session = %self.id, pid = ?process.id(), ?limit, "script timed out; killing it");
                    if let Err(e) = process.kill().await {
                        warn!(session = %self.id, error = %e, "failed to kill script");
                    }
                    for reader in readers.iter_mut() {
                        reader.stop();
                    }
                    return self.conclude_with(
                        Err(FailureReason::Timeout { after: limit }),
                        Some(&script),
                    );
                }
            }
        }

        for reader in readers.iter_mut() {
            reader.stop();
        }

        let exit = exit.unwrap_or(ExitOutcome::Signal(None));
        let routing = std::mem::take(&mut self.routing);
        let result = decide(exit, &self.script_errors, routing, &self.requested_url);
        self.conclude_with(result, Some(&script))
    }

    /// Environment variables added for the script on top of the inherited ones.
    pub async fn environment(&self, url: &Url) -> BTreeMap<String, String> {
        let catalog = &self.settings.catalog;
        let mut env = BTreeMap::new();
        env.insert(ENV_URL.to_string(), self.requested_url.clone());

        if let Some(front) = catalog.frontmost().await {
            env.insert(ENV_FROM_APP.to_string(), front.to_string());
        }

        let mut available = catalog.handlers_for_scheme(url.scheme()).await;
        if let Some(current) = catalog.current() {
            available.remove(&current);
        }
        let running: HashSet<HandlerId> = catalog
            .running()
            .await
            .intersection(&available)
            .cloned()
            .collect();
        env.insert(ENV_AVAILABLE_APPS.to_string(), encode_list(&available));
        env.insert(ENV_RUNNING_APPS.to_string(), encode_list(&running));

        if let Some(lib) = self.settings.helper_lib.as_ref().filter(|lib| lib.is_dir()) {
            env.insert(
                self.settings.helper_lib_var.clone(),
                lib.display().to_string(),
            );
        }

        env
    }

    /// Routing variables missing from `env`. Values the caller happens to
    /// carry for these must not reach the script.
    fn unset_variables(&self, env: &BTreeMap<String, String>) -> Vec<String> {
        [
            ENV_URL,
            ENV_FROM_APP,
            ENV_AVAILABLE_APPS,
            ENV_RUNNING_APPS,
            self.settings.helper_lib_var.as_str(),
        ]
        .into_iter()
        .filter(|name| !env.contains_key(*name))
        .map(str::to_string)
        .collect()
    }

    fn handle_line(&mut self, origin: StreamOrigin, text: String) {
        if origin == StreamOrigin::Stdout {
            match parse_line(&text) {
                Some(Ok(command)) => {
                    debug!(session = %self.id, ?command, "script command");
                    command.apply(&mut self.routing);
                }
                Some(Err(e)) => {
                    warn!(session = %self.id, error = %e, "script protocol error");
                    self.script_errors.push(e.to_string());
                }
                None => {}
            }
        }
        self.transcript.push(origin, text);
    }

    fn conclude(&mut self, result: Result<Routing, FailureReason>) -> Verdict {
        self.conclude_with(result, None)
    }

    fn conclude_with(
        &mut self,
        result: Result<Routing, FailureReason>,
        script: Option<&Path>,
    ) -> Verdict {
        self.transition(SessionState::Concluded);
        match result {
            Ok(routing) => {
                info!(
                    session = %self.id,
                    target = %routing.target_url,
                    handlers = routing.handlers.len(),
                    "script chose a route"
                );
                Verdict::Success(routing)
            }
            Err(reason) => {
                let failure = Failure::new(
                    reason,
                    script,
                    &self.requested_url,
                    std::mem::take(&mut self.transcript),
                );
                info!(session = %self.id, reason = ?failure.reason, "script run failed");
                Verdict::Failure(failure)
            }
        }
    }
}

fn log_script_output(event: &StreamEvent) {
    if let StreamEvent::Line { origin, text } = event {
        let prefix = match origin {
            StreamOrigin::Stdout => "OUT:",
            StreamOrigin::Stderr => "ERR:",
        };
        debug!(target: "urlscript::script", "{prefix} {text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> HandlerId {
        HandlerId::new(s).unwrap()
    }

    fn catalog() -> StaticCatalog {
        let mut catalog = StaticCatalog {
            current: Some(id("urlscript")),
            frontmost: Some(id("com.example.Mail")),
            running: vec![id("appB"), id("com.example.Mail")],
            ..StaticCatalog::default()
        };
        catalog.schemes.insert(
            "http".to_string(),
            vec![id("appA"), id("appB"), id("urlscript")],
        );
        catalog
    }

    #[tokio::test]
    async fn test_environment_excludes_self_and_intersects_running() {
        let settings = SessionSettings {
            catalog: Arc::new(catalog()),
            ..SessionSettings::default()
        };
        let session = ScriptSession::new("http://example.com/availableApps", settings);
        let url = Url::parse(session.requested_url()).unwrap();
        let env = session.environment(&url).await;

        assert_eq!(env[ENV_URL], "http://example.com/availableApps");
        assert_eq!(env[ENV_FROM_APP], "com.example.Mail");
        assert_eq!(env[ENV_AVAILABLE_APPS], "appA:appB");
        assert_eq!(env[ENV_RUNNING_APPS], "appB");
        assert!(!env.contains_key(DEFAULT_HELPER_LIB_VAR));
    }

    #[tokio::test]
    async fn test_environment_helper_lib_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SessionSettings {
            helper_lib: Some(dir.path().to_path_buf()),
            ..SessionSettings::default()
        };
        let session = ScriptSession::new("mailto:someone@example.com", settings);
        let url = Url::parse(session.requested_url()).unwrap();
        let env = session.environment(&url).await;

        assert_eq!(env[DEFAULT_HELPER_LIB_VAR], dir.path().display().to_string());
        assert_eq!(env[ENV_AVAILABLE_APPS], "");
        assert!(!env.contains_key(ENV_FROM_APP));
        assert_eq!(session.unset_variables(&env), vec![ENV_FROM_APP.to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_frontmost_and_missing_helper_lib_are_cleared() {
        let settings = SessionSettings {
            helper_lib: Some(PathBuf::from("/nonexistent/helper/lib")),
            helper_lib_var: "PERL5LIB".to_string(),
            ..SessionSettings::default()
        };
        let session = ScriptSession::new("http://example.com/", settings);
        let url = Url::parse(session.requested_url()).unwrap();
        let env = session.environment(&url).await;

        assert_eq!(
            session.unset_variables(&env),
            vec![ENV_FROM_APP.to_string(), "PERL5LIB".to_string()]
        );
    }

    #[test]
    fn test_resolve_script_not_configured() {
        let settings = SessionSettings::default();
        assert_eq!(
            settings.resolve_script(),
            Err(FailureReason::ScriptNotConfigured)
        );
    }

    #[test]
    fn test_resolve_script_missing_file() {
        let settings = SessionSettings::with_script("/nonexistent/urlscript-route");
        assert!(matches!(
            settings.resolve_script(),
            Err(FailureReason::ScriptNotExecutable { .. })
        ));
    }

    #[test]
    fn test_new_session_starts_created() {
        let session = ScriptSession::new("http://example.com/", SessionSettings::default());
        assert_eq!(session.state(), SessionState::Created);
        assert_ne!(session.id(), ScriptSession::new("x", SessionSettings::default()).id());
    }

    #[test]
    fn test_handle_line_routes_by_origin() {
        let mut session = ScriptSession::new("http://example.com/", SessionSettings::default());
        session.handle_line(StreamOrigin::Stdout, "Use: appA".to_string());
        session.handle_line(StreamOrigin::Stderr, "Use: appB".to_string());
        session.handle_line(StreamOrigin::Stdout, "Bogus: x".to_string());
        session.handle_line(StreamOrigin::Stdout, "just chatter".to_string());

        assert_eq!(session.routing.handlers.len(), 1);
        assert!(session.routing.handlers.contains(&id("appA")));
        assert_eq!(
            session.script_errors,
            vec!["\"Bogus\" is not a recognized command".to_string()]
        );
        assert_eq!(session.transcript.len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_url_never_spawns() {
        let settings = SessionSettings::with_script("/nonexistent/urlscript-route");
        let verdict = ScriptSession::new("not a url", settings).verdict().await;
        let failure = verdict.failure().unwrap();
        assert_eq!(
            failure.reason,
            FailureReason::InvalidInput {
                url: "not a url".to_string()
            }
        );
        assert!(failure.transcript.is_empty());
    }

    #[test]
    fn test_verdict_of_cancelled_session_is_a_failure() {
        let session = ScriptSession::new(
            "http://example.com/",
            SessionSettings::with_script("/opt/route"),
        );
        let mut pending = Box::pin(session.verdict());

        // Start the session task on a runtime, then shut that runtime down
        // before the task ever runs.
        let first = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        first.block_on(async {
            let _ = tokio::time::timeout(Duration::ZERO, &mut pending).await;
        });
        drop(first);

        let second = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let verdict = second.block_on(pending);
        let failure = verdict.failure().expect("failure");
        assert_eq!(failure.reason, FailureReason::Cancelled);
        assert_eq!(
            failure.message,
            "The script \"/opt/route\" was asked what to do with URL <http://example.com/>, \
             but failed because it was cancelled before it finished."
        );
    }
}
