use crate::commands::load_config;
use crate::output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;
use serde_json::{Map, Value};

use hunt_service::{
    EchoPlugin, EventKind, HuntEvent, HuntService, HuntStatus, InvocationContext, Plugin,
    PluginEventStream, PluginInvoker, StepStatus, StoreConfig, UserContext,
};
use hunt_service::plugins::InvokeError;

/// Run a hunt and follow its progress
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Hunt name (see `hunt list`)
    pub hunt: String,

    /// Case the execution belongs to
    #[arg(long, default_value = "adhoc")]
    pub case: String,

    /// Initial parameter as KEY=VALUE (VALUE is parsed as JSON when possible)
    #[arg(long = "param", short = 'p', value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// User recorded as the submitter (default: $USER)
    #[arg(long)]
    pub user: Option<String>,

    /// Default step timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Record the execution as JSON files in this directory
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Replace every plugin with an echo of its resolved parameters
    #[arg(long)]
    pub dry_run: bool,

    /// Print events as JSON lines instead of progress output
    #[arg(long)]
    pub json: bool,
}

/// Invoker that answers every plugin name with an echo
struct DryRunInvoker;

#[async_trait::async_trait]
impl PluginInvoker for DryRunInvoker {
    async fn invoke(
        &self,
        plugin_name: &str,
        parameters: Map<String, Value>,
        context: InvocationContext,
    ) -> Result<PluginEventStream, InvokeError> {
        Ok(EchoPlugin::named(plugin_name).invoke(parameters, context).await)
    }
}

pub async fn execute(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(secs) = args.timeout {
        config.default_step_timeout_secs = secs;
    }
    if let Some(dir) = &args.store_dir {
        config.store = StoreConfig::Json { dir: dir.clone() };
    }

    let service = if args.dry_run {
        HuntService::from_config_with_invoker(&config, Arc::new(DryRunInvoker)).await?
    } else {
        HuntService::from_config(&config).await?
    };

    let parameters = parse_params(&args.params)?;
    let username = args
        .user
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "cli".to_string());
    let user = UserContext::new(username.clone(), username);

    let (execution_id, mut subscription) = service
        .submit_subscribed(&args.hunt, &args.case, parameters, &user)
        .await?;

    if !args.json {
        output::status("Running", &format!("{} ({})", args.hunt, execution_id));
        if args.dry_run {
            output::info("dry run: plugins echo their parameters");
        }
    }

    {
        let service = service.clone();
        let user = user.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                output::warning("cancel requested");
                if let Err(e) = service.cancel(execution_id, &user).await {
                    tracing::warn!(%execution_id, error = %e, "cancel failed");
                }
            }
        });
    }

    while let Some(event) = subscription.recv().await {
        if args.json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            render_event(&event);
        }
    }

    let status = service.wait(execution_id).await?;

    if !args.json {
        let steps = service.list_steps(execution_id).await?;
        println!();
        output::header("Results");
        for step in &steps {
            match step.status {
                StepStatus::Completed => output::success(&format!("{} ({})", step.step_id, step.plugin_name)),
                StepStatus::Failed => output::failure(&format!(
                    "{} ({}): {}",
                    step.step_id,
                    step.plugin_name,
                    step.error.as_deref().unwrap_or("failed")
                )),
                other => output::dim(&format!("  - {} {}", step.step_id, other)),
            }
            for line in result_lines(&step.output) {
                output::step_output(&line);
            }
        }
        println!();
        match status {
            HuntStatus::Completed => output::success(&format!("Hunt {} completed", args.hunt)),
            other => output::failure(&format!("Hunt {} {}", args.hunt, other)),
        }
    }

    if status != HuntStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

fn render_event(event: &HuntEvent) {
    match &event.kind {
        EventKind::Status { status } => output::status("Status", &status.to_string()),
        EventKind::Progress { progress, message, .. } => output::progress(progress.percent(), message),
        EventKind::StepComplete { step_id, progress } => {
            output::progress(progress.percent(), &format!("{} done", step_id))
        }
        EventKind::StepFailed {
            step_id,
            error,
            optional,
            progress,
        } => {
            let label = if *optional { "optional step" } else { "step" };
            output::progress(progress.percent(), &format!("{} {} failed: {}", label, step_id, error));
        }
        EventKind::Complete { status, .. } => output::status("Finished", &status.to_string()),
        EventKind::Error { error } => output::error(error),
        EventKind::Canceled { progress } => {
            output::warning(&format!("canceled at {}%", progress.percent()))
        }
    }
}

/// Flatten a step output's data records into printable lines
fn result_lines(output: &Value) -> Vec<String> {
    let Some(results) = output.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };
    results
        .iter()
        .filter_map(|r| r.get("data"))
        .map(|data| match data.get("line").and_then(Value::as_str) {
            Some(line) => line.to_string(),
            None => data.to_string(),
        })
        .collect()
}

fn parse_params(raw: &[String]) -> Result<Map<String, Value>> {
    let mut params = Map::new();
    for item in raw {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| eyre!("Invalid parameter '{}': expected KEY=VALUE", item))?;
        if key.is_empty() {
            bail!("Invalid parameter '{}': empty key", item);
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        params.insert(key.to_string(), value);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_params_prefers_json() {
        let params = parse_params(&[
            "domain=example.com".to_string(),
            "depth=2".to_string(),
            "tags=[\"a\"]".to_string(),
        ])
        .unwrap();
        assert_eq!(params["domain"], json!("example.com"));
        assert_eq!(params["depth"], json!(2));
        assert_eq!(params["tags"], json!(["a"]));
    }

    #[test]
    fn test_parse_params_rejects_missing_separator() {
        assert!(parse_params(&["domain".to_string()]).is_err());
        assert!(parse_params(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_result_lines() {
        let output = json!({
            "results": [
                {"type": "data", "data": {"line": "93.184.216.34"}},
                {"type": "data", "data": {"domain": "example.com"}}
            ],
            "messages": []
        });
        assert_eq!(
            result_lines(&output),
            vec!["93.184.216.34".to_string(), "{\"domain\":\"example.com\"}".to_string()]
        );
        assert!(result_lines(&Value::Null).is_empty());
    }
}
