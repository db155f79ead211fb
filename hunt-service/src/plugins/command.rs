// Command Plugin
// Runs an external OSINT tool (dig, whois, curl, ...) and streams its output lines

use super::{event_stream, InvocationContext, Plugin, PluginEvent, PluginEventStream};

use std::path::PathBuf;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Definition of a command-backed plugin
///
/// `args` are templates: `{name}` is replaced by the parameter `name`,
/// `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl CommandSpec {
    pub fn new<I, S>(name: impl Into<String>, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            description: String::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Plugin that runs an external program per invocation
#[derive(Debug, Clone)]
pub struct CommandPlugin {
    spec: CommandSpec,
}

impl CommandPlugin {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Fill every argument template from the parameters
    pub fn render_args(&self, parameters: &Map<String, Value>) -> Result<Vec<String>, String> {
        self.spec
            .args
            .iter()
            .map(|arg| render_template(arg, parameters))
            .collect()
    }
}

#[async_trait::async_trait]
impl Plugin for CommandPlugin {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> &str {
        &self.spec.description
    }

    async fn invoke(
        &self,
        parameters: Map<String, Value>,
        context: InvocationContext,
    ) -> PluginEventStream {
        let args = match self.render_args(&parameters) {
            Ok(args) => args,
            Err(e) => return event_stream(vec![PluginEvent::error(e)]),
        };

        let program = match which::which(&self.spec.program) {
            Ok(path) => path,
            Err(e) => {
                return event_stream(vec![PluginEvent::error(format!(
                    "program '{}' is not available: {}",
                    self.spec.program, e
                ))])
            }
        };

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(run_command(
            self.spec.name.clone(),
            program,
            args,
            context.cancel,
            tx,
        ));

        Box::pin(ReceiverStream::new(rx))
    }
}

/// Run the child process, forwarding stdout lines as data events
///
/// Stops (and kills the child) when the token is cancelled or the stream is dropped.
async fn run_command(
    plugin: String,
    program: PathBuf,
    args: Vec<String>,
    cancel: CancellationToken,
    tx: mpsc::Sender<PluginEvent>,
) {
    let mut cmd = Command::new(&program);
    cmd.args(&args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let _ = tx
                .send(PluginEvent::error(format!(
                    "failed to spawn '{}': {}",
                    program.display(),
                    e
                )))
                .await;
            return;
        }
    };

    let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
        (Some(stdout), Some(stderr)) => (stdout, stderr),
        _ => {
            let _ = child.kill().await;
            let _ = tx
                .send(PluginEvent::error("child process output was not captured"))
                .await;
            return;
        }
    };

    let stderr_handle = tokio::spawn(async move {
        let mut output = Vec::new();
        let _ = BufReader::new(stderr).read_to_end(&mut output).await;
        String::from_utf8_lossy(&output).into_owned()
    });

    let _ = tx
        .send(PluginEvent::status(format!(
            "running {} {}",
            program.display(),
            args.join(" ")
        )))
        .await;

    // Tools such as whois may print latin-1; invalid bytes are replaced, not fatal
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(plugin = %plugin, "invocation cancelled, killing child");
                let _ = child.kill().await;
                return;
            }
            _ = tx.closed() => {
                let _ = child.kill().await;
                return;
            }
            read = reader.read_until(b'\n', &mut buf) => match read {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end();
                    if !line.is_empty() && tx.send(PluginEvent::data(json!({ "line": line }))).await.is_err() {
                        let _ = child.kill().await;
                        return;
                    }
                }
                Err(e) => {
                    let _ = child.kill().await;
                    let _ = tx.send(PluginEvent::error(format!("failed to read output: {}", e))).await;
                    return;
                }
            }
        }
    }

    let status = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            return;
        }
        status = child.wait() => status,
    };

    let stderr = stderr_handle.await.unwrap_or_default();

    match status {
        Ok(status) if status.success() => {}
        Ok(status) => {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let detail = stderr.trim();
            let message = if detail.is_empty() {
                format!("{} exited with status {}", program.display(), code)
            } else {
                format!("{} exited with status {}: {}", program.display(), code, detail)
            };
            tracing::warn!(plugin = %plugin, code = %code, "command failed");
            let _ = tx.send(PluginEvent::error(message)).await;
        }
        Err(e) => {
            let _ = tx
                .send(PluginEvent::error(format!("failed to wait for child: {}", e)))
                .await;
        }
    }
}

/// Substitute `{name}` placeholders from the parameters
fn render_template(template: &str, parameters: &Map<String, Value>) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(format!("unterminated placeholder in '{}'", template));
                }
                let value = parameters
                    .get(name.trim())
                    .ok_or_else(|| format!("missing parameter '{}'", name.trim()))?;
                match value {
                    Value::String(s) => out.push_str(s),
                    Value::Null => {}
                    other => out.push_str(&other.to_string()),
                }
            }
            c => out.push(c),
        }
    }

    Ok(out)
}
