//! Opening the final URL with the chosen application.

use crate::handler::HandlerId;
use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;
use url::Url;

/// Opens a URL with a specific application.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn open(&self, handler: &HandlerId, url: &Url) -> Result<()>;
}

/// Runs a configured argv template, e.g. `["open", "-b", "{app}", "{url}"]`.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    template: Vec<String>,
}

impl CommandLauncher {
    /// `None` when the template is empty.
    pub fn new(template: Vec<String>) -> Option<Self> {
        (!template.is_empty()).then_some(Self { template })
    }

    /// The template with `{app}` and `{url}` substituted.
    pub fn argv(&self, handler: &HandlerId, url: &Url) -> Vec<String> {
        self.template
            .iter()
            .map(|part| {
                part.replace("{app}", handler.as_str())
                    .replace("{url}", url.as_str())
            })
            .collect()
    }
}

#[async_trait]
impl Launcher for CommandLauncher {
    async fn open(&self, handler: &HandlerId, url: &Url) -> Result<()> {
        let argv = self.argv(handler, url);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("Launch command is empty"))?;

        info!(%handler, %url, %program, "launching handler");
        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .with_context(|| format!("Failed to run launch command: {program}"))?;

        if status.success() {
            Ok(())
        } else {
            Err(anyhow!("Launch command {program} failed with {status}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_template_is_none() {
        assert!(CommandLauncher::new(Vec::new()).is_none());
    }

    #[test]
    fn test_argv_substitution() {
        let launcher = CommandLauncher::new(
            ["open", "-b", "{app}", "{url}"]
                .map(String::from)
                .to_vec(),
        )
        .unwrap();
        let argv = launcher.argv(
            &HandlerId::new("com.example.Browser").unwrap(),
            &Url::parse("https://example.com/a?b=c").unwrap(),
        );
        assert_eq!(
            argv,
            vec!["open", "-b", "com.example.Browser", "https://example.com/a?b=c"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_is_an_error() {
        let launcher = CommandLauncher::new(vec!["false".to_string()]).unwrap();
        let result = launcher
            .open(
                &HandlerId::new("appA").unwrap(),
                &Url::parse("http://example.com/").unwrap(),
            )
            .await;
        assert!(result.is_err());
    }
}
