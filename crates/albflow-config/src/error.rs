use albflow_template::StackError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Stack manifest not found. Looked for:\n\
        - $ALBFLOW_STACK_PATH\n\
        - current directory: stack.local.kdl, stack.kdl\n\
        - ./.albflow/stack.kdl"
    )]
    StackFileNotFound,

    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("Failed to read {path}: {message}")]
    ReadError { path: PathBuf, message: String },

    #[error("Invalid manifest: {0}")]
    InvalidConfig(String),

    #[error("Environment variable {0} is not set")]
    MissingEnv(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Stack(#[from] StackError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
