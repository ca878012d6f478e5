use crate::project::{self, Project};
use albflow_template::{DeploymentPhase, Provisioner};
use colored::Colorize;

pub async fn handle() -> anyhow::Result<()> {
    let project = Project::load()?;
    project.print_header();

    let provisioner = project::connect(project::DEFAULT_POLL_INTERVAL_SECS).await?;
    let (_, stack_name) = project::scoped_name(&provisioner, project.name()).await?;
    println!("Target:   {}", stack_name.cyan());
    println!();

    match provisioner.describe(&stack_name).await? {
        Some(stack) => {
            let complete =
                stack.status.ends_with("_COMPLETE") && !stack.status.contains("ROLLBACK");
            let status = if complete {
                stack.status.green()
            } else if stack.status.ends_with("_IN_PROGRESS") {
                stack.status.yellow()
            } else {
                stack.status.red()
            };
            println!("Status:   {}", status);
            if let Some(reason) = &stack.status_reason {
                println!("Reason:   {}", reason);
            }
            if let Some(updated) = stack.last_updated {
                println!("Updated:  {}", updated.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            if !stack.outputs.is_empty() {
                println!("Outputs:");
                for (key, value) in &stack.outputs {
                    println!("  {}: {}", key, value.cyan());
                }
            }
        }
        None => println!("{}", "Stack is not deployed".yellow()),
    }

    match project.state().load_record(&stack_name).await? {
        Some(record) => {
            println!();
            let phase = match record.phase {
                DeploymentPhase::Succeeded => record.phase.to_string().green(),
                DeploymentPhase::Failed => record.phase.to_string().red(),
                _ => record.phase.to_string().yellow(),
            };
            println!("Last local deployment: {}", phase);
            if let Some(at) = record.updated_at() {
                println!("  at:     {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            if let Some(status) = &record.final_status {
                println!("  status: {}", status);
            }
            if let Some(digest) = &record.template_digest {
                println!("  digest: {}", digest);
            }
            if let Some(error) = &record.error {
                println!("  error:  {}", error.red());
            }
        }
        None => {
            println!();
            println!("No local deployment record");
        }
    }
    Ok(())
}
