use crate::project::{self, Project};
use albflow_template::{DeploymentRecord, LockPurpose, Provisioner, deploy};
use colored::Colorize;

pub async fn handle(yes: bool, poll_interval: u64) -> anyhow::Result<()> {
    println!("{}", "Preparing deployment...".blue().bold());
    let project = Project::load()?;
    project.print_header();

    // The template is complete before any AWS call
    let template = project.assemble()?;
    println!(
        "Template: {} resources, {} routes",
        template.resources.len(),
        template.routes().len()
    );

    let provisioner = project::connect(poll_interval).await?;
    let (scope, stack_name) = project::scoped_name(&provisioner, project.name()).await?;
    println!("Target:   {}", stack_name.cyan());
    if let Some(region) = &scope.region {
        println!("Region:   {}", region);
    }

    let existing = provisioner.describe(&stack_name).await?;
    match &existing {
        Some(stack) => println!("Action:   update ({})", stack.status),
        None => println!("Action:   create"),
    }

    if !yes {
        println!();
        println!("{}", "Dry run: nothing was submitted.".yellow());
        println!("Run with --yes to submit the stack");
        return Ok(());
    }

    let state = project.state();
    let lock = state.acquire_lock(&stack_name, LockPurpose::Provision).await?;

    let mut record = DeploymentRecord::new(project.name(), &stack_name);
    record.assembled(&template)?;
    state.save_template(&stack_name, &template).await?;

    println!();
    println!("{}", "Submitting stack...".blue());
    let result = deploy(&provisioner, &template, &stack_name, &mut record).await;

    state.save_record(&record).await?;
    lock.release().await?;

    let outcome = result?;
    project::print_outcome(&outcome);

    if let Some(stack) = provisioner.describe(&stack_name).await?
        && !stack.outputs.is_empty()
    {
        println!();
        println!("Outputs:");
        for (key, value) in &stack.outputs {
            println!("  {}: {}", key, value.cyan());
        }
    }
    Ok(())
}
