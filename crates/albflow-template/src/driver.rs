//! Deployment driver
//!
//! Tracks a deployment through
//! `Building -> Assembled -> Submitted -> {Succeeded | Failed}` and hands the
//! assembled template to a [`Provisioner`]. Nothing is retried and nothing
//! is cleaned up on failure; rollback belongs to the platform.

use crate::error::{Result, StackError};
use crate::provisioner::{Provisioner, SubmissionOutcome};
use crate::template::Template;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentPhase {
    Building,
    Assembled,
    Submitted,
    Succeeded,
    Failed,
}

impl DeploymentPhase {
    pub fn can_transition_to(self, next: DeploymentPhase) -> bool {
        use DeploymentPhase::*;
        matches!(
            (self, next),
            (Building, Assembled)
                | (Building, Failed)
                | (Assembled, Submitted)
                | (Assembled, Failed)
                | (Submitted, Succeeded)
                | (Submitted, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeploymentPhase::Succeeded | DeploymentPhase::Failed)
    }
}

impl std::fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentPhase::Building => write!(f, "building"),
            DeploymentPhase::Assembled => write!(f, "assembled"),
            DeploymentPhase::Submitted => write!(f, "submitted"),
            DeploymentPhase::Succeeded => write!(f, "succeeded"),
            DeploymentPhase::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub phase: DeploymentPhase,
    pub at: DateTime<Utc>,
}

/// Record of one deployment attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Deployment (template) name
    pub deployment: String,

    /// Scoped stack name
    pub stack_name: String,

    pub phase: DeploymentPhase,

    /// Digest of the assembled template
    pub template_digest: Option<String>,

    pub stack_id: Option<String>,

    pub final_status: Option<String>,

    pub error: Option<String>,

    pub transitions: Vec<PhaseTransition>,
}

impl DeploymentRecord {
    pub fn new(deployment: impl Into<String>, stack_name: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
            stack_name: stack_name.into(),
            phase: DeploymentPhase::Building,
            template_digest: None,
            stack_id: None,
            final_status: None,
            error: None,
            transitions: vec![PhaseTransition {
                phase: DeploymentPhase::Building,
                at: Utc::now(),
            }],
        }
    }

    /// Move to the next phase, rejecting transitions the lifecycle forbids
    pub fn advance(&mut self, next: DeploymentPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(StackError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!("{}: {} -> {}", self.stack_name, self.phase, next);
        self.phase = next;
        self.transitions.push(PhaseTransition {
            phase: next,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Mark the template as assembled
    pub fn assembled(&mut self, template: &Template) -> Result<()> {
        self.template_digest = Some(template.digest()?);
        self.advance(DeploymentPhase::Assembled)
    }

    /// Move to `Failed` from any non-terminal phase
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.error = Some(error.into());
        self.advance(DeploymentPhase::Failed)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.transitions.first().map(|t| t.at)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.transitions.last().map(|t| t.at)
    }
}

/// Submit an assembled template under its scoped name
///
/// `record` must be in the `Assembled` phase. It ends in `Succeeded` or
/// `Failed`; on failure the error is returned as
/// [`StackError::DeploymentSubmission`].
pub async fn deploy(
    provisioner: &dyn Provisioner,
    template: &Template,
    scoped_name: &str,
    record: &mut DeploymentRecord,
) -> Result<SubmissionOutcome> {
    record.advance(DeploymentPhase::Submitted)?;
    tracing::info!(
        "Submitting {} to {} as {}",
        template.deployment(),
        provisioner.display_name(),
        scoped_name
    );

    let outcome = match provisioner.submit(template, scoped_name).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let message = match e {
                StackError::DeploymentSubmission(message) => message,
                other => other.to_string(),
            };
            record.fail(&message)?;
            return Err(StackError::DeploymentSubmission(message));
        }
    };

    record.stack_id = outcome.stack_id.clone();
    record.final_status = Some(outcome.final_status.clone());

    if outcome.succeeded {
        record.advance(DeploymentPhase::Succeeded)?;
        tracing::info!(
            "{} {} finished: {} ({} ms)",
            scoped_name,
            outcome.operation,
            outcome.final_status,
            outcome.duration_ms
        );
        Ok(outcome)
    } else {
        let mut message = format!("stack {} ended in {}", scoped_name, outcome.final_status);
        if let Some(reason) = outcome
            .failures()
            .first()
            .and_then(|e| e.reason.clone())
            .or_else(|| outcome.status_reason.clone())
        {
            message.push_str(&format!(": {}", reason));
        }
        record.fail(&message)?;
        Err(StackError::DeploymentSubmission(message))
    }
}
