use albflow_aws::CloudFormationProvisioner;
use albflow_config::StackManifest;
use albflow_template::{
    AccountScope, PollConfig, Provisioner, StateManager, SubmissionOutcome, Template,
    scoped_stack_name,
};
use anyhow::Context;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

/// Manifest plus the directory holding `.albflow/`
pub struct Project {
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: StackManifest,
}

impl Project {
    pub fn load() -> anyhow::Result<Self> {
        let (manifest_path, manifest) = albflow_config::load_manifest()?;
        let root = std::env::current_dir()?;
        tracing::debug!("Loaded {}", manifest_path.display());
        Ok(Self {
            root,
            manifest_path,
            manifest,
        })
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn state(&self) -> StateManager {
        StateManager::new(&self.root)
    }

    /// Assemble the template; no network access
    pub fn assemble(&self) -> anyhow::Result<Template> {
        let deployment = self.manifest.clone().into_deployment()?;
        let template = deployment
            .assemble()
            .with_context(|| format!("Failed to assemble {}", self.manifest_path.display()))?;
        Ok(template)
    }

    pub fn print_header(&self) {
        println!(
            "Manifest: {}",
            self.manifest_path.display().to_string().cyan()
        );
        println!("Stack:    {}", self.name().cyan());
    }
}

/// Seconds between stack status polls unless `--poll-interval` says otherwise
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// CloudFormation provisioner with verified credentials
pub async fn connect(poll_interval: u64) -> anyhow::Result<CloudFormationProvisioner> {
    let provisioner = CloudFormationProvisioner::from_env().await.with_poll_config(PollConfig {
        interval: Duration::from_secs(poll_interval.max(1)),
    });

    let auth = provisioner.check_auth().await?;
    if !auth.authenticated {
        anyhow::bail!(
            "AWS authentication failed: {}",
            auth.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    println!(
        "Account:  {}",
        auth.account_info.unwrap_or_default().cyan()
    );
    Ok(provisioner)
}

/// Stack name scoped to the caller's account
pub async fn scoped_name(
    provisioner: &CloudFormationProvisioner,
    base: &str,
) -> anyhow::Result<(AccountScope, String)> {
    let scope = provisioner.account_scope().await?;
    let name = scoped_stack_name(base, &scope)?;
    Ok((scope, name))
}

pub fn print_outcome(outcome: &SubmissionOutcome) {
    let failures = outcome.failures();
    if !failures.is_empty() {
        println!();
        println!("{}", "Failed resources:".red().bold());
        for event in failures {
            println!("  ✗ {}", event);
        }
    }
    println!();
    let line = format!(
        "{} {} → {} ({:.1}s)",
        outcome.operation,
        outcome.stack_name,
        outcome.final_status,
        outcome.duration_ms as f64 / 1000.0
    );
    if outcome.succeeded {
        println!("{}", format!("✓ {}", line).green().bold());
    } else {
        println!("{}", format!("✗ {}", line).red().bold());
        if let Some(reason) = &outcome.status_reason {
            println!("  {}", reason);
        }
    }
}
