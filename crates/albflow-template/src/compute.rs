//! Compute targets: the Lambda functions a deployment routes to

use crate::error::{Result, StackError};
use crate::naming::{logical_name, sanitize_logical_id};
use crate::resource::{PropertyValue, Reference, ResourceDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_HANDLER: &str = "bootstrap";
pub const DEFAULT_RUNTIME: &str = "provided.al2023";
pub const DEFAULT_MEMORY_MB: u32 = 128;
pub const DEFAULT_TIMEOUT_SECS: u32 = 3;

const BASIC_EXECUTION_POLICY: &str =
    "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// Where the deployment package lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLocation {
    pub bucket: String,
    pub key: String,
    pub object_version: Option<String>,
}

impl CodeLocation {
    pub fn s3(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            object_version: None,
        }
    }

    fn to_property(&self) -> PropertyValue {
        let mut code = BTreeMap::new();
        code.insert("S3Bucket".to_string(), PropertyValue::from(&self.bucket));
        code.insert("S3Key".to_string(), PropertyValue::from(&self.key));
        if let Some(version) = &self.object_version {
            code.insert("S3ObjectVersion".to_string(), PropertyValue::from(version));
        }
        PropertyValue::Map(code)
    }
}

/// A deployable Lambda function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeTarget {
    /// Display name, unique within a deployment (e.g. "Hello World")
    pub name: String,

    pub handler: String,

    pub runtime: String,

    pub code: CodeLocation,

    /// Memory in MB (128 - 10240)
    pub memory_size: u32,

    /// Timeout in seconds (1 - 900)
    pub timeout: u32,

    pub description: Option<String>,

    /// Instruction set (`x86_64` or `arm64`)
    pub architecture: Option<String>,

    /// Environment variables
    pub environment: BTreeMap<String, String>,
}

impl ComputeTarget {
    pub fn new(name: impl Into<String>, code: CodeLocation) -> Self {
        Self {
            name: name.into(),
            handler: DEFAULT_HANDLER.to_string(),
            runtime: DEFAULT_RUNTIME.to_string(),
            code,
            memory_size: DEFAULT_MEMORY_MB,
            timeout: DEFAULT_TIMEOUT_SECS,
            description: None,
            architecture: None,
            environment: BTreeMap::new(),
        }
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = handler.into();
        self
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    pub fn with_memory(mut self, memory_size: u32) -> Self {
        self.memory_size = memory_size;
        self
    }

    pub fn with_timeout(mut self, timeout: u32) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Logical id of the `AWS::Lambda::Function`
    pub fn function_id(&self) -> String {
        logical_name(&format!("{}Lambda", sanitize_logical_id(&self.name)), &[self.name.as_str()])
    }

    /// Logical id of the execution role
    pub fn role_id(&self) -> String {
        logical_name(&format!("{}Role", sanitize_logical_id(&self.name)), &[self.name.as_str()])
    }

    pub fn function_arn(&self) -> Reference {
        Reference::attribute(self.function_id(), "Arn")
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StackError::InvalidConfig(
                "compute target requires a name".to_string(),
            ));
        }
        if sanitize_logical_id(&self.name).is_empty() {
            return Err(StackError::InvalidConfig(format!(
                "compute target name '{}' has no alphanumeric characters",
                self.name
            )));
        }
        if !(128..=10240).contains(&self.memory_size) {
            return Err(StackError::InvalidConfig(format!(
                "{}: memory size {} MB is outside 128-10240",
                self.name, self.memory_size
            )));
        }
        if !(1..=900).contains(&self.timeout) {
            return Err(StackError::InvalidConfig(format!(
                "{}: timeout {}s is outside 1-900",
                self.name, self.timeout
            )));
        }
        if self.code.bucket.is_empty() || self.code.key.is_empty() {
            return Err(StackError::InvalidConfig(format!(
                "{}: code location requires a bucket and key",
                self.name
            )));
        }
        Ok(())
    }

    /// The execution role and the function itself
    pub fn descriptors(&self) -> Vec<ResourceDescriptor> {
        let role = ResourceDescriptor::new(self.role_id(), "AWS::IAM::Role")
            .with_property(
                "AssumeRolePolicyDocument",
                serde_json::json!({
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "Service": ["lambda.amazonaws.com"] },
                        "Action": ["sts:AssumeRole"]
                    }]
                }),
            )
            .with_property(
                "ManagedPolicyArns",
                serde_json::json!([{ "Fn::Sub": BASIC_EXECUTION_POLICY }]),
            );

        let mut function = ResourceDescriptor::new(self.function_id(), "AWS::Lambda::Function")
            .with_property("Code", self.code.to_property())
            .with_property("Handler", &self.handler)
            .with_property("Runtime", &self.runtime)
            .with_property("MemorySize", self.memory_size)
            .with_property("Timeout", self.timeout)
            .with_property("Role", role.attribute("Arn"));

        if let Some(description) = &self.description {
            function.set_property("Description", description);
        }
        if let Some(arch) = &self.architecture {
            function.set_property("Architectures", PropertyValue::list([arch]));
        }
        if !self.environment.is_empty() {
            function.set_property(
                "Environment",
                PropertyValue::map([(
                    "Variables",
                    PropertyValue::map(self.environment.iter().map(|(k, v)| (k.clone(), v))),
                )]),
            );
        }

        vec![role, function]
    }
}
