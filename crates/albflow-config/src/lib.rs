//! albflow stack manifest
//!
//! Locates and parses `stack.kdl`, and turns it into an
//! [`albflow_template::Deployment`].

pub mod error;
pub mod model;
pub mod parser;

pub use error::{ConfigError, Result};
pub use model::{
    IngressRule, ListenerSpec, LoadBalancerManifest, RouteSpec, SecurityGroupSpec,
    StackManifest, SubnetSource,
};
pub use parser::{parse_stack_file, parse_stack_string};

use std::path::PathBuf;

/// Environment variable pointing directly at a manifest
pub const STACK_PATH_ENV: &str = "ALBFLOW_STACK_PATH";

/// Find the project's stack manifest
///
/// Search order:
/// 1. `$ALBFLOW_STACK_PATH`
/// 2. current directory: `stack.local.kdl`, `stack.kdl`
/// 3. `./.albflow/stack.kdl`
pub fn find_stack_file() -> Result<PathBuf> {
    if let Ok(stack_path) = std::env::var(STACK_PATH_ENV) {
        let path = PathBuf::from(stack_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points at a missing file: {}", STACK_PATH_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;
    for filename in ["stack.local.kdl", "stack.kdl"] {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let path = current_dir.join(".albflow").join("stack.kdl");
    if path.exists() {
        return Ok(path);
    }

    Err(ConfigError::StackFileNotFound)
}

/// Find and parse the project's stack manifest
pub fn load_manifest() -> Result<(PathBuf, StackManifest)> {
    let path = find_stack_file()?;
    let manifest = parse_stack_file(&path)?;
    Ok((path, manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn test_find_stack_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stack.kdl"), "// test").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(STACK_PATH_ENV, find_stack_file);

        std::env::set_current_dir(original_dir).unwrap();
        assert!(result.unwrap().ends_with("stack.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_stack_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stack.kdl"), "// shared").unwrap();
        fs::write(temp_dir.path().join("stack.local.kdl"), "// local").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(STACK_PATH_ENV, find_stack_file);

        std::env::set_current_dir(original_dir).unwrap();
        assert!(result.unwrap().ends_with("stack.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_stack_file_in_albflow_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let dir = temp_dir.path().join(".albflow");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("stack.kdl"), "// in .albflow").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(STACK_PATH_ENV, find_stack_file);

        std::env::set_current_dir(original_dir).unwrap();
        assert!(result.unwrap().ends_with(".albflow/stack.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_stack_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("custom.kdl");
        fs::write(&custom, "// custom").unwrap();

        let result = temp_env::with_var(STACK_PATH_ENV, Some(&custom), find_stack_file);
        assert_eq!(result.unwrap(), custom);
    }

    #[test]
    #[serial]
    fn test_find_stack_file_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(STACK_PATH_ENV, find_stack_file);

        std::env::set_current_dir(original_dir).unwrap();
        assert!(matches!(result, Err(ConfigError::StackFileNotFound)));
    }
}
