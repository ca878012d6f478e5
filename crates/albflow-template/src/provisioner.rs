//! Provisioning platform abstraction
//!
//! The deployment driver talks to the platform only through
//! [`Provisioner`]. The AWS implementation lives in `albflow-aws`; tests
//! use in-memory implementations.

use crate::error::Result;
use crate::naming::AccountScope;
use crate::template::Template;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Provisioning platform (CloudFormation, ...)
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Returns the provisioner name (e.g., "cloudformation")
    fn name(&self) -> &str;

    /// Returns the display name for UI
    fn display_name(&self) -> &str;

    /// Check that credentials are configured and valid
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Account and region the stack will be deployed into
    async fn account_scope(&self) -> Result<AccountScope>;

    /// Create or update the stack and wait until it settles
    async fn submit(&self, template: &Template, stack_name: &str) -> Result<SubmissionOutcome>;

    /// Current state of the stack, `None` if it does not exist
    async fn describe(&self, stack_name: &str) -> Result<Option<StackDescription>>;

    /// Delete the stack and wait until it is gone
    async fn delete(&self, stack_name: &str) -> Result<SubmissionOutcome>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// What a submission did to the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackOperation {
    /// Stack did not exist and was created
    Create,
    /// Existing stack was updated
    Update,
    /// Stack was deleted
    Delete,
    /// Template matched the deployed stack
    NoOp,
}

impl std::fmt::Display for StackOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackOperation::Create => write!(f, "create"),
            StackOperation::Update => write!(f, "update"),
            StackOperation::Delete => write!(f, "delete"),
            StackOperation::NoOp => write!(f, "no-op"),
        }
    }
}

/// One entry of the stack's status stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackEvent {
    pub timestamp: DateTime<Utc>,
    pub logical_id: String,
    pub resource_type: String,
    pub status: String,
    pub reason: Option<String>,
}

impl std::fmt::Display for StackEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({}) {}",
            self.timestamp.format("%H:%M:%S"),
            self.logical_id,
            self.resource_type,
            self.status
        )?;
        if let Some(reason) = &self.reason {
            write!(f, ": {}", reason)?;
        }
        Ok(())
    }
}

/// Result of a submission or deletion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub stack_name: String,

    /// Platform id of the stack, when known
    pub stack_id: Option<String>,

    pub operation: StackOperation,

    /// Final stack status (e.g. `CREATE_COMPLETE`)
    pub final_status: String,

    /// Reason given by the platform for the final status
    pub status_reason: Option<String>,

    pub succeeded: bool,

    /// Events observed while waiting
    pub events: Vec<StackEvent>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl SubmissionOutcome {
    pub fn new(stack_name: impl Into<String>, operation: StackOperation) -> Self {
        Self {
            stack_name: stack_name.into(),
            stack_id: None,
            operation,
            final_status: String::new(),
            status_reason: None,
            succeeded: false,
            events: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn complete(mut self, status: impl Into<String>, succeeded: bool) -> Self {
        self.final_status = status.into();
        self.succeeded = succeeded;
        self
    }

    /// Events that report a failure, in the order they happened
    pub fn failures(&self) -> Vec<&StackEvent> {
        self.events
            .iter()
            .filter(|e| e.status.ends_with("_FAILED"))
            .collect()
    }
}

/// Snapshot of a deployed stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackDescription {
    pub stack_name: String,
    pub stack_id: Option<String>,
    pub status: String,
    pub status_reason: Option<String>,
    pub outputs: BTreeMap<String, String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Polling behavior while waiting for a stack to settle
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between status checks
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Whether a CloudFormation stack status is final
pub fn is_terminal_status(status: &str) -> bool {
    status.ends_with("_COMPLETE") || status.ends_with("_FAILED")
}

/// Whether a final status means the requested operation succeeded
pub fn is_success_status(status: &str) -> bool {
    matches!(
        status,
        "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "DELETE_COMPLETE" | "IMPORT_COMPLETE"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(is_terminal_status("CREATE_COMPLETE"));
        assert!(is_terminal_status("ROLLBACK_COMPLETE"));
        assert!(is_terminal_status("UPDATE_ROLLBACK_FAILED"));
        assert!(!is_terminal_status("CREATE_IN_PROGRESS"));
        assert!(!is_terminal_status("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"));

        assert!(is_success_status("CREATE_COMPLETE"));
        assert!(is_success_status("UPDATE_COMPLETE"));
        assert!(!is_success_status("ROLLBACK_COMPLETE"));
        assert!(!is_success_status("UPDATE_ROLLBACK_COMPLETE"));
    }

    #[test]
    fn test_outcome_failures() {
        let mut outcome = SubmissionOutcome::new("Stack", StackOperation::Create);
        for status in ["CREATE_IN_PROGRESS", "CREATE_FAILED", "ROLLBACK_COMPLETE"] {
            outcome.events.push(StackEvent {
                timestamp: Utc::now(),
                logical_id: "Fn".into(),
                resource_type: "AWS::Lambda::Function".into(),
                status: status.into(),
                reason: None,
            });
        }
        let outcome = outcome.complete("ROLLBACK_COMPLETE", false);
        assert_eq!(outcome.failures().len(), 1);
        assert!(!outcome.succeeded);
        assert_eq!(StackOperation::NoOp.to_string(), "no-op");
    }
}
