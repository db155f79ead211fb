use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use uuid::Uuid;

use hunt_service::{ExecutionStore, HuntStatus, JsonFileStore, StepStatus};

/// Inspect recorded executions
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Execution to show; lists executions when omitted
    pub execution_id: Option<String>,

    /// Directory the executions were recorded in (see `hunt run --store-dir`)
    #[arg(long, value_name = "DIR")]
    pub store_dir: PathBuf,

    /// Only list executions of this case
    #[arg(long)]
    pub case: Option<String>,
}

pub async fn execute(args: StatusArgs) -> Result<()> {
    let store = JsonFileStore::open(args.store_dir.clone()).await?;

    let Some(raw_id) = &args.execution_id else {
        return list(&store, args.case.as_deref()).await;
    };
    let execution_id =
        Uuid::parse_str(raw_id).map_err(|e| eyre!("Invalid execution id '{}': {}", raw_id, e))?;

    let execution = store.get_execution(execution_id).await?;
    output::header(&format!("{} ({})", execution.hunt_id, execution.id));
    println!("  case:      {}", execution.case_id);
    println!("  status:    {}", execution.status);
    println!("  submitted: {} by {}", execution.created_at.to_rfc3339(), execution.created_by);
    if let Some(done) = execution.completed_at {
        println!("  finished:  {}", done.to_rfc3339());
    }
    if !execution.initial_parameters.is_empty() {
        println!("  parameters:");
        for (name, value) in &execution.initial_parameters {
            println!("    {} = {}", name, value);
        }
    }
    println!();

    let steps = store.list_steps(execution_id).await?;
    if steps.is_empty() {
        output::dim("  no steps recorded");
    }
    for step in &steps {
        let line = format!("{:<10} {:<16} {}", step.step_id, step.plugin_name, step.status);
        match step.status {
            StepStatus::Completed => output::check(&line),
            StepStatus::Failed => output::failure(&line),
            _ => output::dim(&format!("  - {}", line)),
        }
        if let Some(error) = &step.error {
            output::step_output(error);
        }
    }

    Ok(())
}

async fn list(store: &JsonFileStore, case_id: Option<&str>) -> Result<()> {
    let executions = store.list_executions(case_id).await?;
    output::status("Executions", &format!("{} recorded", executions.len()));
    for execution in &executions {
        let line = format!(
            "{}  {:<22} {:<12} {:<10} {}",
            execution.id,
            execution.hunt_id,
            execution.case_id,
            execution.status,
            execution.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        match execution.status {
            HuntStatus::Failed => output::failure(&line),
            HuntStatus::Completed => output::check(&line),
            _ => println!("    {}", line),
        }
    }
    Ok(())
}
