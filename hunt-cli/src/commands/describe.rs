use crate::output;

use clap::Args;
use color_eyre::Result;

use hunt_service::HuntCatalog;

/// Show a hunt's parameters and step graph
#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// Hunt name (see `hunt list`)
    pub hunt: String,
}

pub fn execute(args: DescribeArgs) -> Result<()> {
    let catalog = HuntCatalog::builtin()?;
    let Some(entry) = catalog.get(&args.hunt) else {
        color_eyre::eyre::bail!("Unknown hunt '{}'. Run `hunt list` to see available hunts", args.hunt);
    };
    let hunt = &entry.definition;

    output::header(&format!("{} ({} v{})", hunt.display_name, hunt.name, hunt.version));
    if !hunt.description.is_empty() {
        println!("  {}", hunt.description);
    }
    println!("  category: {}", hunt.category);
    println!();

    println!("Parameters:");
    for param in &hunt.initial_parameters {
        let requirement = if param.required { "required" } else { "optional" };
        let default = param
            .default
            .as_ref()
            .map(|d| format!(" (default {})", d))
            .unwrap_or_default();
        println!(
            "  {:<14} {:<8} {}{}  {}",
            param.name, param.param_type, requirement, default, param.description
        );
    }
    println!();

    println!("Steps:");
    for (level, nodes) in entry.graph.parallel_levels().iter().enumerate() {
        println!("  stage {}", level + 1);
        for node in nodes {
            let Some(step) = hunt.get_step(&node.step_id) else {
                continue;
            };
            let mut flags = Vec::new();
            if step.optional {
                flags.push("optional".to_string());
            }
            if let Some(timeout) = step.timeout_seconds {
                flags.push(format!("timeout {}s", timeout));
            }
            if !node.dependencies.is_empty() {
                flags.push(format!("after {}", node.dependencies.join(", ")));
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join("; "))
            };

            println!("    {:<10} {:<16} {}{}", step.step_id, step.plugin_name, step.display_name, flags);
            for (param, path) in &step.parameter_mapping {
                output::dim(&format!("               {} <- {}", param, path));
            }
        }
    }

    Ok(())
}
