use crate::project::Project;
use colored::Colorize;
use std::collections::BTreeMap;

pub fn handle() -> anyhow::Result<()> {
    println!("{}", "Validating stack manifest...".blue());
    let project = Project::load()?;
    project.print_header();

    let template = project.assemble()?;

    println!("{}", "✓ Template assembled".green().bold());
    println!();

    let mut kinds: BTreeMap<&str, usize> = BTreeMap::new();
    for resource in template.resources.values() {
        *kinds.entry(resource.kind.as_str()).or_default() += 1;
    }
    println!("Resources: {}", template.resources.len());
    for (kind, count) in kinds {
        println!("  {:>3}  {}", count, kind);
    }

    if !template.routes().is_empty() {
        println!();
        println!("Routing (first match wins):");
        for entry in template.routes() {
            let condition = entry
                .condition
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "(default)".to_string());
            println!(
                "  {:>5}  {:<30} → {}",
                entry.priority,
                condition,
                entry.target.cyan()
            );
        }
    }

    if !template.outputs.is_empty() {
        println!();
        println!("Outputs:");
        for name in template.outputs.keys() {
            println!("  - {}", name);
        }
    }

    println!();
    println!("Digest: {}", template.digest()?);
    Ok(())
}
