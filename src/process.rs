use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::debug;

/// Everything needed to start the routing script once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Added on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Inherited variables the script must not see.
    pub env_remove: Vec<String>,
    pub working_dir: PathBuf,
}

/// A running script with piped stdout and stderr.
pub struct ScriptProcess {
    child: Child,
}

impl ScriptProcess {
    /// Spawn the script, returning the process and its two output streams
    /// separately so they can be handed to independent readers.
    pub fn spawn(invocation: &ScriptInvocation) -> io::Result<(Self, ChildStdout, ChildStderr)> {
        let mut cmd = Command::new(&invocation.program);
        for name in &invocation.env_remove {
            cmd.env_remove(name);
        }
        cmd.args(&invocation.args)
            .envs(&invocation.env)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        debug!(
            program = %invocation.program.display(),
            pid = child.id(),
            "spawned script"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("script stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("script stderr was not captured"))?;

        Ok((Self { child }, stdout, stderr))
    }

    /// Wait for the process to exit. Cancel-safe.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Forcibly terminate the process and reap it.
    pub async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn shell(command: &str) -> ScriptInvocation {
        ScriptInvocation {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), command.to_string()],
            env: BTreeMap::new(),
            env_remove: Vec::new(),
            working_dir: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn test_env_added_and_removed() {
        let mut invocation = shell(r#"echo "${URL-unset} ${PATH-unset}""#);
        invocation.env.insert("URL".to_string(), "http://example.com/".to_string());
        invocation.env_remove.push("PATH".to_string());

        let (mut process, mut stdout, _stderr) = ScriptProcess::spawn(&invocation).unwrap();
        assert!(process.id().is_some());

        let mut output = String::new();
        stdout.read_to_string(&mut output).await.unwrap();
        assert!(process.wait().await.unwrap().success());
        assert_eq!(output, "http://example.com/ unset\n");
        assert!(process.id().is_none());
    }

    #[tokio::test]
    async fn test_kill_running_script() {
        let (mut process, _stdout, _stderr) =
            ScriptProcess::spawn(&shell("exec sleep 30")).unwrap();
        process.kill().await.unwrap();
        assert!(!process.wait().await.unwrap().success());
    }
}
