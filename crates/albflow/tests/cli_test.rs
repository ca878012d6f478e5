#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! once assert_cmd 2.1 is the minimum

mod common;

use assert_cmd::Command;
use common::{STACK_KDL, TestProject};
use predicates::prelude::*;

fn albflow(project: &TestProject) -> Command {
    let mut cmd = Command::cargo_bin("albflow").unwrap();
    cmd.current_dir(project.path())
        .env_remove("ALBFLOW_STACK_PATH")
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("albflow").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Application Load Balancer"))
        .stdout(predicate::str::contains("template"))
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("delete"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("albflow").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("albflow"));
}

#[test]
fn test_provision_help() {
    let mut cmd = Command::cargo_bin("albflow").unwrap();
    cmd.arg("provision")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"))
        .stdout(predicate::str::contains("--poll-interval"))
        .stdout(predicate::str::contains("[default: 5]"));
}

#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("albflow").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

#[test]
fn test_template_without_manifest() {
    let project = TestProject::new();
    albflow(&project)
        .arg("template")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Stack manifest not found"));
}

#[test]
fn test_template_prints_routing() {
    let project = TestProject::new();
    project.write_stack_kdl(STACK_KDL);

    let output = albflow(&project)
        .arg("template")
        .env("TEST_SUBNETS", "subnet-a,subnet-b")
        .output()
        .unwrap();
    assert!(output.status.success());

    let template: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(template["AWSTemplateFormatVersion"], "2010-09-09");
    assert_eq!(template["Metadata"]["Deployment"], "MyALBStack");

    let routing = template["Metadata"]["Routing"].as_array().unwrap();
    assert_eq!(routing.len(), 2);
    assert_eq!(routing[0]["priority"], 1);
    assert_eq!(routing[0]["target"], "Hello New World");
    assert_eq!(routing[1]["priority"], 2);
    assert_eq!(routing[1]["target"], "Hello World");
    assert!(routing[1]["condition"].is_null());

    assert!(template["Resources"]["ALBSecurityGroup"].is_object());
}

#[test]
fn test_template_is_deterministic() {
    let project = TestProject::new();
    project.write_stack_kdl(STACK_KDL);

    let run = || {
        albflow(&project)
            .arg("template")
            .env("TEST_SUBNETS", "subnet-a,subnet-b")
            .output()
            .unwrap()
            .stdout
    };
    assert_eq!(run(), run());
}

#[test]
fn test_template_to_file() {
    let project = TestProject::new();
    project.write_stack_kdl(STACK_KDL);
    let out = project.path().join("template.json");

    albflow(&project)
        .args(["template", "-o"])
        .arg(&out)
        .env("TEST_SUBNETS", "subnet-a,subnet-b")
        .assert()
        .success();

    let content = std::fs::read_to_string(out).unwrap();
    assert!(content.contains("AWS::ElasticLoadBalancingV2::ListenerRule"));
}

#[test]
fn test_template_missing_subnets() {
    let project = TestProject::new();
    project.write_stack_kdl(STACK_KDL);

    albflow(&project)
        .arg("template")
        .env_remove("TEST_SUBNETS")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TEST_SUBNETS"));
}

#[test]
fn test_template_single_subnet() {
    let project = TestProject::new();
    project.write_stack_kdl(STACK_KDL);

    albflow(&project)
        .arg("template")
        .env("TEST_SUBNETS", "subnet-a")
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least two subnets"));
}

#[test]
fn test_template_unknown_route_target() {
    let project = TestProject::new();
    project.write_stack_kdl(&STACK_KDL.replace(
        r#"route "Hello New World""#,
        r#"route "Missing""#,
    ));

    albflow(&project)
        .arg("template")
        .env("TEST_SUBNETS", "subnet-a,subnet-b")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing"));
}

#[test]
fn test_validate_summary() {
    let project = TestProject::new();
    project.write_stack_kdl(STACK_KDL);

    albflow(&project)
        .arg("validate")
        .env("TEST_SUBNETS", "subnet-a,subnet-b")
        .assert()
        .success()
        .stdout(predicate::str::contains("Template assembled"))
        .stdout(predicate::str::contains("/newhello*"))
        .stdout(predicate::str::contains("(default)"))
        .stdout(predicate::str::contains("AWS::Lambda::Function"));
}

#[test]
fn test_malformed_manifest() {
    let project = TestProject::new();
    project.write_stack_kdl("stack \"Broken\" {");

    albflow(&project).arg("validate").assert().failure();
}
