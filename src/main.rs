use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;
use urlscript::handler::decode_list;
use urlscript::{
    CommandLauncher, Config, Failure, HandlerId, Launcher, Routing, ScriptSession,
    SessionRegistry, SessionSettings, StreamOrigin, Verdict,
};

#[derive(Parser, Debug)]
#[command(
    name = "urlscript",
    about = "Ask a script which application should open a URL",
    version
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Route a URL through the script and open it
    Open(OpenArgs),

    /// Remember the script to use for future requests
    SetScript {
        /// Path to an executable script
        path: PathBuf,
    },

    /// Print the effective configuration
    ShowConfig,
}

#[derive(Args, Debug)]
struct OpenArgs {
    /// The URL to open
    url: String,

    /// Script to run instead of the configured one
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Give up on the script after this long (e.g. "10s")
    #[arg(short, long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Application reported as FROM_APP
    #[arg(long)]
    from_app: Option<String>,

    /// `:`-separated handlers registered for the URL's scheme
    #[arg(long)]
    available_apps: Option<String>,

    /// `:`-separated running applications
    #[arg(long)]
    running_apps: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path().ok_or_else(|| anyhow!("No config directory available"))?,
    };
    debug!(path = %config_path.display(), "using config file");

    match cli.command {
        Commands::Open(args) => {
            let config = Config::load(&config_path)?;
            open(config, args).await
        }
        Commands::SetScript { path } => {
            set_script(&config_path, &path)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::ShowConfig => {
            let config = Config::load(&config_path)?;
            println!("# {}", config_path.display());
            print!("{}", config.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn open(mut config: Config, args: OpenArgs) -> Result<ExitCode> {
    apply_overrides(&mut config, &args);

    let registry = SessionRegistry::new();
    let (tx, rx) = oneshot::channel();
    let session = ScriptSession::new(args.url, config.session_settings());
    registry.launch(session, move |verdict| {
        let _ = tx.send(verdict);
    });
    let verdict = rx.await.context("Session ended without a verdict")?;

    match verdict {
        Verdict::Success(routing) => {
            dispatch(&config, routing).await?;
            Ok(ExitCode::SUCCESS)
        }
        Verdict::Failure(failure) => {
            report_failure(&failure)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

fn apply_overrides(config: &mut Config, args: &OpenArgs) {
    if let Some(script) = &args.script {
        config.script = Some(script.clone());
    }
    if let Some(timeout) = args.timeout {
        config.timeout = Some(timeout);
    }
    if let Some(front) = &args.from_app {
        config.apps.frontmost = Some(front.clone());
    }
    if let Some(running) = &args.running_apps {
        config.apps.running = split_ids(running);
    }
    if let Some(available) = &args.available_apps {
        match Url::parse(&args.url) {
            Ok(url) => {
                config
                    .apps
                    .schemes
                    .insert(url.scheme().to_string(), split_ids(available));
            }
            Err(_) => debug!("ignoring --available-apps for an unparsable URL"),
        }
    }
}

fn split_ids(list: &str) -> Vec<String> {
    decode_list(list).into_iter().map(|id| id.to_string()).collect()
}

/// Hand the routing result to the launcher, or print it if none is configured.
async fn dispatch(config: &Config, routing: Routing) -> Result<()> {
    let Some(launcher) = CommandLauncher::new(config.launch_command.clone()) else {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "URL: {}", routing.target_url)?;
        for handler in routing.sorted_handlers() {
            writeln!(stdout, "Use: {handler}")?;
        }
        return Ok(());
    };

    let handler = match routing.sole_handler() {
        Some(handler) => Some(handler.clone()),
        None => choose(&routing).await?,
    };
    match handler {
        Some(handler) => launcher.open(&handler, &routing.target_url).await,
        None => {
            info!("no application chosen");
            Ok(())
        }
    }
}

/// Terminal chooser: list the handlers on stderr and read a number from stdin.
async fn choose(routing: &Routing) -> Result<Option<HandlerId>> {
    let handlers = routing.sorted_handlers();
    {
        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "Open <{}> with:", routing.target_url)?;
        for (n, handler) in handlers.iter().enumerate() {
            writeln!(stderr, "  {}) {}", n + 1, handler)?;
        }
        write!(stderr, "Choice [1-{}]: ", handlers.len())?;
        stderr.flush()?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let Some(answer) = lines.next_line().await? else {
        return Ok(None);
    };
    let choice = answer
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| handlers.get(i));
    if choice.is_none() && !answer.trim().is_empty() {
        warn!(answer = answer.trim(), "not a valid choice");
    }
    Ok(choice.map(|handler| (*handler).clone()))
}

fn report_failure(failure: &Failure) -> Result<()> {
    let color = std::io::stderr().is_terminal();
    let mut stderr = std::io::stderr().lock();
    writeln!(stderr, "{}", failure.message)?;
    if failure.transcript.is_empty() {
        return Ok(());
    }

    writeln!(stderr)?;
    writeln!(stderr, "Script output:")?;
    for entry in failure.transcript.entries() {
        if color {
            let style = match entry.origin {
                StreamOrigin::Stdout => "\x1b[37m",
                StreamOrigin::Stderr => "\x1b[33m",
            };
            writeln!(stderr, "{style}{} {}\x1b[0m", entry.prefix(), entry.text)?;
        } else {
            writeln!(stderr, "{} {}", entry.prefix(), entry.text)?;
        }
    }
    Ok(())
}

fn set_script(config_path: &Path, script: &Path) -> Result<()> {
    let script = std::path::absolute(script)
        .with_context(|| format!("Failed to resolve script path: {}", script.display()))?;

    if let Err(reason) = SessionSettings::with_script(&script).resolve_script() {
        warn!("saving anyway, but {reason}");
    }

    let mut config = Config::load(config_path)?;
    config.script = Some(script.clone());
    config
        .save(config_path)
        .context("Failed to save script path")?;

    println!("Script set to {}", script.display());
    Ok(())
}
