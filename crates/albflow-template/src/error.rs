//! Stack assembly and deployment error types

use thiserror::Error;

/// Errors raised while building, assembling or deploying a stack
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Stack name generation failed: {0}")]
    NameGeneration(String),

    #[error("Duplicate resource identifier: {0}")]
    DuplicateIdentifier(String),

    #[error("Decorator '{decorator}' contributed resource '{id}' which already exists")]
    ConflictingResourceId { decorator: String, id: String },

    #[error("Resource '{from}' references '{to}' which does not exist")]
    UnresolvedReference { from: String, to: String },

    #[error("Cyclic dependency between resources: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("Unknown compute target: {0}")]
    UnknownComputeTarget(String),

    #[error("Resource not found: {0}")]
    UnknownResource(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid deployment transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Deployment submission failed: {0}")]
    DeploymentSubmission(String),

    #[error("Failed to assemble deployment '{deployment}': {source}")]
    Assembly {
        deployment: String,
        #[source]
        source: Box<StackError>,
    },

    #[error("State file error: {0}")]
    State(String),

    #[error("Lock acquisition failed: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StackError {
    /// Wrap an error with the name of the deployment being assembled
    pub fn in_deployment(self, deployment: impl Into<String>) -> Self {
        match self {
            // Already wrapped; keep the innermost deployment name
            e @ StackError::Assembly { .. } => e,
            other => StackError::Assembly {
                deployment: deployment.into(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any assembly wrapper removed
    pub fn root(&self) -> &StackError {
        match self {
            StackError::Assembly { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, StackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembly_wrapping_keeps_root() {
        let err = StackError::DuplicateIdentifier("Fn".to_string()).in_deployment("MyStack");
        assert!(err.to_string().contains("MyStack"));
        assert!(matches!(err.root(), StackError::DuplicateIdentifier(id) if id == "Fn"));

        // Wrapping twice does not nest
        let twice = err.in_deployment("Other");
        assert!(twice.to_string().contains("MyStack"));
    }

    #[test]
    fn test_cycle_message() {
        let err = StackError::CyclicDependency(vec!["A".into(), "B".into(), "A".into()]);
        assert_eq!(err.to_string(), "Cyclic dependency between resources: A -> B -> A");
    }
}
