//! Hook tool implementation of the host runtime
//!
//! Juju exposes its hook API as executables (`is-leader`, `config-get`,
//! `status-set`, ...) that are only valid while a hook is running. Each call
//! runs one tool and parses its JSON output where the tool offers one.
//!
//! Argument values are never logged, and secret content is never passed on
//! the command line: `secret-add` reads it from a private file that is
//! removed once the tool returns.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::process::Output;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use super::{HostRuntime, Port};
use crate::status::StatusName;
use crate::Error;

/// Captured result of one tool invocation
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Whether the tool exited successfully
    pub success: bool,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Runs hook tool executables (allows mocking in tests)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `tool` with `args` and capture its output
    async fn run(&self, tool: &str, args: &[String]) -> Result<CommandOutput, Error>;
}

/// Runs hook tools as child processes
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, tool: &str, args: &[String]) -> Result<CommandOutput, Error> {
        let output = Command::new(tool)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::host_runtime(tool, format!("failed to execute: {}", e)))?;
        Ok(CommandOutput::from(output))
    }
}

/// [`HostRuntime`] backed by Juju hook tools
pub struct HookTools<R: ToolRunner = ProcessRunner> {
    runner: R,
}

impl HookTools<ProcessRunner> {
    /// Create hook tools that run real processes
    pub fn new() -> Self {
        Self {
            runner: ProcessRunner,
        }
    }
}

impl Default for HookTools<ProcessRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ToolRunner> HookTools<R> {
    /// Create hook tools with a custom runner
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }

    /// Run a tool and return its stdout, failing on a non-zero exit
    async fn invoke(&self, tool: &str, args: Vec<String>) -> Result<String, Error> {
        debug!(tool, arg_count = args.len(), "running hook tool");
        let output = self.runner.run(tool, &args).await?;
        if !output.success {
            return Err(Error::host_runtime(tool, output.stderr.trim()));
        }
        Ok(output.stdout)
    }

    async fn invoke_json<T: serde::de::DeserializeOwned>(
        &self,
        tool: &str,
        args: Vec<String>,
    ) -> Result<T, Error> {
        let stdout = self.invoke(tool, args).await?;
        serde_json::from_str(&stdout)
            .map_err(|e| Error::host_runtime(tool, format!("unparseable output: {}", e)))
    }
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Write secret content to a 0600 temp file in the YAML form `secret-add --file` reads
fn stage_secret_content(content: &BTreeMap<String, String>) -> Result<NamedTempFile, Error> {
    let yaml = serde_yaml::to_string(content)
        .map_err(|e| Error::serialization_for_kind("secret content", e.to_string()))?;

    let stage_err = |e: std::io::Error| {
        Error::host_runtime("secret-add", format!("failed to stage content: {}", e))
    };
    let mut file = tempfile::Builder::new()
        .prefix("secret-")
        .suffix(".yaml")
        .tempfile()
        .map_err(stage_err)?;
    file.write_all(yaml.as_bytes()).map_err(stage_err)?;
    file.flush().map_err(stage_err)?;
    Ok(file)
}

#[async_trait]
impl<R: ToolRunner> HostRuntime for HookTools<R> {
    async fn is_leader(&self) -> Result<bool, Error> {
        self.invoke_json("is-leader", args(["--format=json"])).await
    }

    async fn config(&self) -> Result<BTreeMap<String, String>, Error> {
        let raw: BTreeMap<String, serde_json::Value> = self
            .invoke_json("config-get", args(["--format=json", "--all"]))
            .await?;

        Ok(raw
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some((key, s)),
                other => Some((key, other.to_string())),
            })
            .collect())
    }

    async fn set_status(&self, status: StatusName, message: &str) -> Result<(), Error> {
        self.invoke("status-set", args([status.as_str(), message]))
            .await?;
        Ok(())
    }

    async fn set_ports(&self, ports: &[Port]) -> Result<(), Error> {
        let opened: Vec<String> = self
            .invoke_json("opened-ports", args(["--format=json"]))
            .await?;
        let opened: BTreeSet<String> = opened.into_iter().collect();
        let desired: BTreeSet<String> = ports.iter().map(|p| p.to_string()).collect();

        for stale in opened.difference(&desired) {
            info!(port = %stale, "closing port");
            self.invoke("close-port", vec![stale.clone()]).await?;
        }
        for missing in desired.difference(&opened) {
            info!(port = %missing, "opening port");
            self.invoke("open-port", vec![missing.clone()]).await?;
        }
        Ok(())
    }

    async fn add_secret(
        &self,
        label: &str,
        content: &BTreeMap<String, String>,
    ) -> Result<String, Error> {
        let staged = stage_secret_content(content)?;
        let path = staged.path().to_string_lossy().into_owned();

        let stdout = self
            .invoke("secret-add", args(["--label", label, "--file", path.as_str()]))
            .await?;
        drop(staged);

        let id = stdout.trim().to_string();
        if id.is_empty() {
            return Err(Error::host_runtime("secret-add", "no secret ID returned"));
        }
        info!(label, secret_id = %id, "secret created");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;
    use std::sync::{Arc, Mutex};

    fn ok(stdout: &str) -> Result<CommandOutput, Error> {
        Ok(CommandOutput {
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    fn failed(stderr: &str) -> Result<CommandOutput, Error> {
        Ok(CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }

    #[tokio::test]
    async fn test_is_leader_parses_json_bool() {
        let mut runner = MockToolRunner::new();
        runner
            .expect_run()
            .with(eq("is-leader"), always())
            .returning(|_, _| ok("true\n"));

        let tools = HookTools::with_runner(runner);
        assert!(tools.is_leader().await.unwrap());
    }

    /// Unset keys come back as null and are dropped; non-string values are
    /// kept in their JSON form.
    #[tokio::test]
    async fn test_config_flattens_values() {
        let mut runner = MockToolRunner::new();
        runner.expect_run().with(eq("config-get"), always()).returning(|_, _| {
            ok(r#"{"logging-level":"info","n2-ip":null,"replicas":3,"debug":false}"#)
        });

        let tools = HookTools::with_runner(runner);
        let config = tools.config().await.unwrap();

        assert_eq!(config.get("logging-level").map(String::as_str), Some("info"));
        assert!(!config.contains_key("n2-ip"));
        assert_eq!(config.get("replicas").map(String::as_str), Some("3"));
        assert_eq!(config.get("debug").map(String::as_str), Some("false"));
    }

    #[tokio::test]
    async fn test_set_status_passes_name_and_message() {
        let mut runner = MockToolRunner::new();
        runner
            .expect_run()
            .withf(|tool, args| {
                tool == "status-set" && args == ["blocked", "unit is not leader"]
            })
            .times(1)
            .returning(|_, _| ok(""));

        let tools = HookTools::with_runner(runner);
        tools
            .set_status(StatusName::Blocked, "unit is not leader")
            .await
            .unwrap();
    }

    /// Story: a previous charm revision opened 8080/tcp. Reconciling to
    /// [2111/tcp] closes the stale port and opens the new one.
    #[tokio::test]
    async fn test_set_ports_closes_stale_and_opens_missing() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();

        let mut runner = MockToolRunner::new();
        runner.expect_run().returning(move |tool, args| {
            calls_clone
                .lock()
                .unwrap()
                .push(format!("{} {}", tool, args.join(" ")));
            match tool {
                "opened-ports" => ok(r#"["8080/tcp"]"#),
                _ => ok(""),
            }
        });

        let tools = HookTools::with_runner(runner);
        tools.set_ports(&[Port::tcp(2111)]).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                "opened-ports --format=json".to_string(),
                "close-port 8080/tcp".to_string(),
                "open-port 2111/tcp".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_set_ports_is_noop_when_already_open() {
        let mut runner = MockToolRunner::new();
        runner
            .expect_run()
            .with(eq("opened-ports"), always())
            .times(1)
            .returning(|_, _| ok(r#"["2111/tcp"]"#));

        let tools = HookTools::with_runner(runner);
        tools.set_ports(&[Port::tcp(2111)]).await.unwrap();
    }

    const PASSWORD: &str = "S3cretPassw0rdXY";

    fn credential() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("password".to_string(), PASSWORD.to_string()),
            ("email".to_string(), "charm@ellanetworks.com".to_string()),
        ])
    }

    /// Log sink shared between the subscriber and the test
    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_add_secret_returns_id() {
        let mut runner = MockToolRunner::new();
        runner
            .expect_run()
            .withf(|tool, args| {
                tool == "secret-add"
                    && args.len() == 4
                    && args[..3] == ["--label", "ELLA_CORE_LOGIN", "--file"]
            })
            .returning(|_, _| ok("secret:cr1b2c3d4e5f\n"));

        let tools = HookTools::with_runner(runner);
        let id = tools
            .add_secret("ELLA_CORE_LOGIN", &credential())
            .await
            .unwrap();
        assert_eq!(id, "secret:cr1b2c3d4e5f");
    }

    /// Story: storing the admin credential with debug logging on
    ///
    /// The default filter enables debug output for the charm. The password
    /// must reach `secret-add` only through the staged file: never in argv
    /// and never in the log. The file is gone once the call returns.
    #[tokio::test]
    async fn story_secret_content_stays_out_of_argv_and_logs() {
        use tracing_subscriber::layer::SubscriberExt;

        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                ella_common::telemetry::DEFAULT_LOG_FILTER,
            ))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(move || writer.clone()),
            );
        let _guard = tracing::subscriber::set_default(subscriber);

        let staged = Arc::new(Mutex::new(None::<(String, String)>));
        let staged_clone = staged.clone();

        let mut runner = MockToolRunner::new();
        runner
            .expect_run()
            .withf(|tool, args| {
                tool == "secret-add" && !args.iter().any(|a| a.contains(PASSWORD))
            })
            .times(1)
            .returning(move |_, args| {
                let path = args[args.len() - 1].clone();
                let content = std::fs::read_to_string(&path).unwrap();
                *staged_clone.lock().unwrap() = Some((path, content));
                ok("secret:cr1b2c3d4e5f\n")
            });

        let tools = HookTools::with_runner(runner);
        tools
            .add_secret("ELLA_CORE_LOGIN", &credential())
            .await
            .unwrap();

        let (path, content) = staged.lock().unwrap().clone().unwrap();
        let stored: BTreeMap<String, String> = serde_yaml::from_str(&content).unwrap();
        assert_eq!(stored, credential());
        assert!(!std::path::Path::new(&path).exists());

        let log = log.contents();
        assert!(log.contains("running hook tool"));
        assert!(!log.contains(PASSWORD));
    }

    #[tokio::test]
    async fn test_tool_failure_carries_stderr() {
        let mut runner = MockToolRunner::new();
        runner
            .expect_run()
            .returning(|_, _| failed("ERROR permission denied\n"));

        let tools = HookTools::with_runner(runner);
        let err = tools.is_leader().await.unwrap_err();
        match err {
            Error::HostRuntime { command, message } => {
                assert_eq!(command, "is-leader");
                assert_eq!(message, "ERROR permission denied");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_unparseable_output_is_an_error() {
        let mut runner = MockToolRunner::new();
        runner.expect_run().returning(|_, _| ok("not json"));

        let tools = HookTools::with_runner(runner);
        assert!(tools.is_leader().await.is_err());
    }
}
