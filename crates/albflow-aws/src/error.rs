//! AWS provisioner error types

use albflow_template::StackError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("AWS credentials are not configured: {0}")]
    AuthenticationFailed(String),

    #[error("Caller identity has no account id")]
    MissingAccount,

    #[error("CloudFormation {operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    #[error("Stack not found: {0}")]
    StackNotFound(String),

    #[error("CloudFormation returned no {0}")]
    MissingField(&'static str),

    #[error("Template error: {0}")]
    Template(#[from] StackError),
}

impl AwsError {
    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        AwsError::Api {
            operation,
            message: message.into(),
        }
    }
}

impl From<AwsError> for StackError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::Template(inner) => inner,
            AwsError::MissingAccount => StackError::NameGeneration(err.to_string()),
            other => StackError::DeploymentSubmission(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_to_submission_error() {
        let err: StackError = AwsError::api("CreateStack", "AccessDenied").into();
        assert!(matches!(
            err,
            StackError::DeploymentSubmission(ref m)
                if m.contains("CreateStack") && m.contains("AccessDenied")
        ));
    }

    #[test]
    fn test_missing_account_is_name_generation() {
        let err: StackError = AwsError::MissingAccount.into();
        assert!(matches!(err, StackError::NameGeneration(_)));
    }

    #[test]
    fn test_template_error_is_unwrapped() {
        let err: StackError = AwsError::Template(StackError::UnknownResource("X".into())).into();
        assert!(matches!(err, StackError::UnknownResource(_)));
    }
}
