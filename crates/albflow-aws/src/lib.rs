//! AWS provisioner for albflow
//!
//! Implements [`albflow_template::Provisioner`] on top of CloudFormation,
//! with STS for the caller's account id.
//!
//! # Authentication
//!
//! Credentials and region come from the standard AWS chain:
//! environment variables, `~/.aws/config` profiles, SSO, or instance roles.

pub mod error;
pub mod events;
pub mod provider;

pub use error::{AwsError, Result};
pub use provider::CloudFormationProvisioner;
