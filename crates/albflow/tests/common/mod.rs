use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const STACK_KDL: &str = r#"
stack "MyALBStack" {
    description "Lambda functions as ALB targets"
}

function "Hello World" {
    code bucket="my-artifacts" key="hello.zip"
}

function "Hello New World" {
    code bucket="my-artifacts" key="new-hello.zip"
}

security-group "ALBSecurityGroup" {
    description "ALB Security Group"
    ingress protocol="tcp" from=80 to=80 cidr="0.0.0.0/0"
}

load-balancer "ALB" {
    subnets-env "TEST_SUBNETS"
    security-group "ALBSecurityGroup"
    listener port=80 protocol="HTTP" default="Hello World"
    route "Hello New World" path="/newhello*"
}
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_stack_kdl(&self, content: &str) {
        let path = self.root.path().join("stack.kdl");
        fs::write(path, content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }
}
