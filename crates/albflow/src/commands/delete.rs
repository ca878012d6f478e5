use crate::project::{self, Project};
use albflow_template::{LockPurpose, Provisioner};
use colored::Colorize;

pub async fn handle(yes: bool, poll_interval: u64) -> anyhow::Result<()> {
    let project = Project::load()?;
    project.print_header();

    let provisioner = project::connect(poll_interval).await?;
    let (_, stack_name) = project::scoped_name(&provisioner, project.name()).await?;

    let Some(stack) = provisioner.describe(&stack_name).await? else {
        println!("{}", format!("Stack {} does not exist", stack_name).yellow());
        return Ok(());
    };
    println!("Target:   {} ({})", stack_name.cyan(), stack.status);

    if !yes {
        println!();
        println!(
            "{}",
            "Warning: this deletes every resource in the stack.".yellow()
        );
        println!("Run with --yes to delete it");
        return Ok(());
    }

    let state = project.state();
    let lock = state.acquire_lock(&stack_name, LockPurpose::Delete).await?;

    println!();
    println!("{}", "Deleting stack...".blue());
    let result = provisioner.delete(&stack_name).await;

    if let Ok(outcome) = &result
        && outcome.succeeded
    {
        state.remove_stack(&stack_name).await?;
    }
    lock.release().await?;

    let outcome = result?;
    project::print_outcome(&outcome);
    if !outcome.succeeded {
        anyhow::bail!("Stack {} was not deleted", stack_name);
    }
    Ok(())
}
