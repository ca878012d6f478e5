use crate::project::Project;
use colored::Colorize;
use std::path::Path;

pub fn handle(output: Option<&Path>) -> anyhow::Result<()> {
    let project = Project::load()?;
    let template = project.assemble()?;
    let json = template.to_json()?;

    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")?;
            eprintln!(
                "{} {}",
                "✓ Template written to".green(),
                path.display().to_string().cyan()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}
