use crate::output;

use color_eyre::Result;

use hunt_service::HuntCatalog;

pub fn execute() -> Result<()> {
    let catalog = HuntCatalog::builtin()?;

    output::status("Hunts", &format!("{} available", catalog.len()));
    for hunt in catalog.iter() {
        println!(
            "  {:<22} {:<16} {:>2} steps  {}",
            hunt.name,
            hunt.category,
            hunt.steps.len(),
            hunt.display_name
        );
    }

    Ok(())
}
