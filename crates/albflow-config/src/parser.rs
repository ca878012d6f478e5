//! KDL parser for `stack.kdl`

use crate::error::{ConfigError, Result};
use crate::model::{
    IngressRule, ListenerSpec, LoadBalancerManifest, RouteSpec, SecurityGroupSpec,
    StackManifest, SubnetSource,
};
use albflow_template::{CodeLocation, ComputeTarget, RouteCondition};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::fs;
use std::path::Path;

/// Parse a manifest file
pub fn parse_stack_file<P: AsRef<Path>>(path: P) -> Result<StackManifest> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::debug!("Parsing stack manifest {}", path.display());
    parse_stack_string(&content)
}

/// Parse manifest text
pub fn parse_stack_string(content: &str) -> Result<StackManifest> {
    let doc: KdlDocument = content.parse()?;

    let mut manifest = StackManifest::default();
    let mut stack_seen = false;

    for node in doc.nodes() {
        match node.name().value() {
            "stack" => {
                manifest.name = first_string(node, "stack")?;
                stack_seen = true;
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        if child.name().value() == "description" {
                            manifest.description = first_arg(child).map(str::to_string);
                        }
                    }
                }
            }
            "function" => manifest.functions.push(parse_function(node)?),
            "security-group" => manifest.security_groups.push(parse_security_group(node)?),
            "load-balancer" => {
                if manifest.load_balancer.is_some() {
                    return Err(ConfigError::InvalidConfig(
                        "only one load-balancer block is supported".to_string(),
                    ));
                }
                manifest.load_balancer = Some(parse_load_balancer(node)?);
            }
            other => {
                tracing::warn!("Ignoring unknown node '{}'", other);
            }
        }
    }

    if !stack_seen {
        return Err(ConfigError::InvalidConfig(
            "manifest requires a stack node".to_string(),
        ));
    }

    Ok(manifest)
}

/// Parse a `function` node
pub fn parse_function(node: &KdlNode) -> Result<ComputeTarget> {
    let name = first_string(node, "function")?;
    let mut code: Option<CodeLocation> = None;
    let mut handler = None;
    let mut runtime = None;
    let mut memory = None;
    let mut timeout = None;
    let mut description = None;
    let mut architecture = None;
    let mut environment = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "handler" => handler = first_arg(child).map(str::to_string),
                "runtime" => runtime = first_arg(child).map(str::to_string),
                "description" => description = first_arg(child).map(str::to_string),
                "architecture" => architecture = first_arg(child).map(str::to_string),
                "memory" => memory = Some(integer_arg::<u32>(child, &name)?),
                "timeout" => timeout = Some(integer_arg::<u32>(child, &name)?),
                "code" => {
                    let bucket = string_prop(child, "bucket");
                    let key = string_prop(child, "key");
                    let (Some(bucket), Some(key)) = (bucket, key) else {
                        return Err(ConfigError::InvalidConfig(format!(
                            "function '{}': code requires bucket= and key=",
                            name
                        )));
                    };
                    let mut location = CodeLocation::s3(bucket, key);
                    location.object_version = string_prop(child, "version").map(str::to_string);
                    code = Some(location);
                }
                "env" | "environment" => {
                    // env KEY="value" ...
                    for entry in child.entries() {
                        if let Some(key) = entry.name() {
                            let value = env_value(entry.value(), key.value(), &name)?;
                            environment.push((key.value().to_string(), value));
                        }
                    }
                    // env { KEY "value" }
                    if let Some(vars) = child.children() {
                        for var in vars.nodes() {
                            let key = var.name().value();
                            let value = match var.entries().iter().find(|e| e.name().is_none()) {
                                Some(entry) => env_value(entry.value(), key, &name)?,
                                None => String::new(),
                            };
                            environment.push((key.to_string(), value));
                        }
                    }
                }
                other => {
                    tracing::warn!("function '{}': ignoring unknown setting '{}'", name, other);
                }
            }
        }
    }

    let code = code.ok_or_else(|| {
        ConfigError::InvalidConfig(format!("function '{}' requires a code location", name))
    })?;

    let mut target = ComputeTarget::new(name, code);
    if let Some(handler) = handler {
        target = target.with_handler(handler);
    }
    if let Some(runtime) = runtime {
        target = target.with_runtime(runtime);
    }
    if let Some(memory) = memory {
        target = target.with_memory(memory);
    }
    if let Some(timeout) = timeout {
        target = target.with_timeout(timeout);
    }
    target.description = description;
    target.architecture = architecture;
    for (key, value) in environment {
        target = target.with_env(key, value);
    }
    Ok(target)
}

/// Parse a `security-group` node
pub fn parse_security_group(node: &KdlNode) -> Result<SecurityGroupSpec> {
    let name = first_string(node, "security-group")?;
    let mut group = SecurityGroupSpec {
        description: name.clone(),
        name,
        vpc_id: None,
        ingress: Vec::new(),
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "description" => {
                    if let Some(description) = first_arg(child) {
                        group.description = description.to_string();
                    }
                }
                "vpc" => group.vpc_id = first_arg(child).map(str::to_string),
                "ingress" => {
                    let from = integer_prop::<u16>(child, "from", &group.name)?;
                    let to = integer_prop::<u16>(child, "to", &group.name)?.or(from);
                    let (Some(from_port), Some(to_port)) = (from, to) else {
                        return Err(ConfigError::InvalidConfig(format!(
                            "security-group '{}': ingress requires from=",
                            group.name
                        )));
                    };
                    group.ingress.push(IngressRule {
                        protocol: string_prop(child, "protocol").unwrap_or("tcp").to_string(),
                        from_port,
                        to_port,
                        cidr: string_prop(child, "cidr").unwrap_or("0.0.0.0/0").to_string(),
                    });
                }
                other => {
                    tracing::warn!(
                        "security-group '{}': ignoring unknown setting '{}'",
                        group.name,
                        other
                    );
                }
            }
        }
    }

    Ok(group)
}

/// Parse a `load-balancer` node
pub fn parse_load_balancer(node: &KdlNode) -> Result<LoadBalancerManifest> {
    let name = first_string(node, "load-balancer")?;
    let mut subnets = None;
    let mut security_groups = Vec::new();
    let mut scheme = None;
    let mut listener = None;
    let mut routes = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "subnets" => subnets = Some(SubnetSource::Inline(positional_strings(child))),
                "subnets-env" => {
                    let var = first_string(child, "subnets-env")?;
                    subnets = Some(SubnetSource::Env(var));
                }
                "security-group" => security_groups.extend(positional_strings(child)),
                "scheme" => scheme = first_arg(child).map(str::to_string),
                "listener" => {
                    if listener.is_some() {
                        return Err(ConfigError::InvalidConfig(format!(
                            "load-balancer '{}': only one listener is supported",
                            name
                        )));
                    }
                    listener = Some(parse_listener(child, &name)?);
                }
                "route" => routes.push(parse_route(child, &name)?),
                other => {
                    tracing::warn!(
                        "load-balancer '{}': ignoring unknown setting '{}'",
                        name,
                        other
                    );
                }
            }
        }
    }

    let listener = listener.ok_or_else(|| {
        ConfigError::InvalidConfig(format!("load-balancer '{}' requires a listener", name))
    })?;

    Ok(LoadBalancerManifest {
        name,
        subnets: subnets.unwrap_or_default(),
        security_groups,
        scheme,
        listener,
        routes,
    })
}

fn parse_listener(node: &KdlNode, lb: &str) -> Result<ListenerSpec> {
    let port = integer_prop::<u16>(node, "port", lb)?.unwrap_or(80);
    let default_target = string_prop(node, "default").ok_or_else(|| {
        ConfigError::InvalidConfig(format!("load-balancer '{}': listener requires default=", lb))
    })?;
    Ok(ListenerSpec {
        port,
        protocol: string_prop(node, "protocol").unwrap_or("HTTP").to_string(),
        default_target: default_target.to_string(),
        certificate_arn: string_prop(node, "certificate").map(str::to_string),
    })
}

/// `route "Target" path="/x*"` with exactly one of
/// path=, host=, method= or source-ip=
fn parse_route(node: &KdlNode, lb: &str) -> Result<RouteSpec> {
    let target = first_string(node, "route")?;

    let mut conditions = Vec::new();
    if let Some(path) = string_prop(node, "path") {
        conditions.push(RouteCondition::path(path));
    }
    if let Some(host) = string_prop(node, "host") {
        conditions.push(RouteCondition::host(host));
    }
    if let Some(method) = string_prop(node, "method") {
        conditions.push(RouteCondition::method(method));
    }
    if let Some(cidr) = string_prop(node, "source-ip") {
        conditions.push(RouteCondition::source_ip(cidr));
    }

    match conditions.len() {
        1 => Ok(RouteSpec {
            target,
            condition: conditions.remove(0),
        }),
        0 => Err(ConfigError::InvalidConfig(format!(
            "load-balancer '{}': route to '{}' needs a condition",
            lb, target
        ))),
        _ => Err(ConfigError::InvalidConfig(format!(
            "load-balancer '{}': route to '{}' has more than one condition",
            lb, target
        ))),
    }
}

/// First positional argument as a string
fn first_arg(node: &KdlNode) -> Option<&str> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
}

/// Environment variable value rendered as text
fn env_value(value: &KdlValue, key: &str, function: &str) -> Result<String> {
    match value {
        KdlValue::String(s) => Ok(s.clone()),
        KdlValue::Integer(i) => Ok(i.to_string()),
        KdlValue::Float(f) => Ok(f.to_string()),
        KdlValue::Bool(b) => Ok(b.to_string()),
        KdlValue::Null => Err(ConfigError::InvalidConfig(format!(
            "function '{}': env {} has no value",
            function, key
        ))),
    }
}

fn first_string(node: &KdlNode, kind: &str) -> Result<String> {
    first_arg(node)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::InvalidConfig(format!("{} requires a name", kind)))
}

fn positional_strings(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string().map(|s| s.to_string()))
        .collect()
}

fn string_prop<'a>(node: &'a KdlNode, key: &str) -> Option<&'a str> {
    node.get(key).and_then(|v| v.as_string())
}

fn integer_prop<T: TryFrom<i128>>(node: &KdlNode, key: &str, owner: &str) -> Result<Option<T>> {
    match node.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_integer()
            .and_then(|v| T::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| {
                ConfigError::InvalidConfig(format!("'{}': {}= is out of range", owner, key))
            }),
    }
}

fn integer_arg<T: TryFrom<i128>>(node: &KdlNode, owner: &str) -> Result<T> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_integer())
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| {
            ConfigError::InvalidConfig(format!(
                "'{}': {} requires an integer",
                owner,
                node.name().value()
            ))
        })
}
