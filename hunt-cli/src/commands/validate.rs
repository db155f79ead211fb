use crate::commands::load_config;
use crate::output;

use std::path::Path;

use clap::Args;
use color_eyre::Result;

use hunt_service::{build_registry, HuntCatalog};

/// Validate the hunt catalog against the configured plugins
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Only validate this hunt
    pub hunt: Option<String>,
}

pub fn execute(args: ValidateArgs, config_path: Option<&Path>) -> Result<()> {
    // Step 1: Engine configuration
    let config = load_config(config_path)?;
    output::check(&format!(
        "Config valid (default step timeout {}s)",
        config.default_step_timeout_secs
    ));

    // Step 2: Plugin registry
    let registry = match build_registry(&config) {
        Ok(registry) => registry,
        Err(e) => {
            output::error(&format!("Plugin registry: {}", e));
            std::process::exit(1);
        }
    };
    output::check(&format!("{} plugins registered", registry.len()));

    // Step 3: Hunt definitions (structure is checked while building the catalog)
    let catalog = match HuntCatalog::builtin() {
        Ok(catalog) => catalog,
        Err(e) => {
            output::error(&e.to_string());
            std::process::exit(1);
        }
    };

    if let Some(name) = &args.hunt {
        if catalog.get(name).is_none() {
            color_eyre::eyre::bail!("Unknown hunt '{}'", name);
        }
    }

    // Step 4: Every step's plugin must be registered
    let mut problems = 0;
    for hunt in catalog.iter() {
        if args.hunt.as_deref().is_some_and(|n| n != hunt.name) {
            continue;
        }

        let missing: Vec<String> = hunt
            .steps
            .iter()
            .filter(|s| !registry.contains(&s.plugin_name))
            .map(|s| format!("{} -> {}", s.step_id, s.plugin_name))
            .collect();

        if missing.is_empty() {
            output::check(&format!("{}: {} steps", hunt.name, hunt.steps.len()));
        } else {
            problems += missing.len();
            output::failure(&format!("{}: unknown plugins: {}", hunt.name, missing.join(", ")));
        }
    }

    if problems > 0 {
        output::error(&format!("{} problem(s) found", problems));
        std::process::exit(1);
    }

    output::success("Catalog is valid");
    Ok(())
}
