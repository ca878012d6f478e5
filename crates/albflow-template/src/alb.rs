//! Application Load Balancer decorator
//!
//! Puts a set of Lambda compute targets behind an ALB listener. Every
//! deployment has one default target; additional targets are reached
//! through conditional routes that become listener rules.

use crate::compute::ComputeTarget;
use crate::decorator::{find_target, Decoration, Decorator, TemplateOutput};
use crate::error::{Result, StackError};
use crate::graph::ResourceGraph;
use crate::naming::{logical_name, sanitize_logical_id};
use crate::resource::{Properties, PropertyValue, Reference, ResourceDescriptor};
use crate::routing::{RouteCondition, RoutingEntry};

const ELB_SERVICE_PRINCIPAL: &str = "elasticloadbalancing.amazonaws.com";

/// Listener rule priorities must be within 1..=50000
pub const MAX_RULE_PRIORITY: u32 = 50_000;

/// Listener protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerProtocol {
    Http,
    Https,
}

impl ListenerProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerProtocol::Http => "HTTP",
            ListenerProtocol::Https => "HTTPS",
        }
    }
}

impl std::str::FromStr for ListenerProtocol {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "HTTP" => Ok(ListenerProtocol::Http),
            "HTTPS" => Ok(ListenerProtocol::Https),
            other => Err(StackError::InvalidConfig(format!(
                "unsupported listener protocol: {} (expected HTTP or HTTPS)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ListenerProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The load balancer itself
#[derive(Debug, Clone, PartialEq)]
pub struct LoadBalancerSpec {
    /// Name used to derive logical ids
    pub name: String,

    /// Subnet ids, at least two availability zones
    pub subnets: Vec<String>,

    /// Security group ids or references
    pub security_groups: Vec<PropertyValue>,

    /// `internet-facing` (default) or `internal`
    pub scheme: Option<String>,

    /// Any other `AWS::ElasticLoadBalancingV2::LoadBalancer` properties
    pub properties: Properties,
}

impl LoadBalancerSpec {
    pub fn new<I, S>(name: impl Into<String>, subnets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            subnets: subnets
                .into_iter()
                .map(Into::into)
                .map(|s: String| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            security_groups: Vec::new(),
            scheme: None,
            properties: Properties::new(),
        }
    }

    pub fn with_security_group(mut self, group: impl Into<PropertyValue>) -> Self {
        self.security_groups.push(group.into());
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Logical id of the load balancer resource
    pub fn resource_id(&self) -> String {
        logical_name(
            &format!("{}LoadBalancer", sanitize_logical_id(&self.name)),
            &[self.name.as_str()],
        )
    }

    fn descriptor(&self) -> ResourceDescriptor {
        let mut lb = ResourceDescriptor::new(
            self.resource_id(),
            "AWS::ElasticLoadBalancingV2::LoadBalancer",
        )
        .with_properties(self.properties.clone())
        .with_property("Type", "application")
        .with_property("Subnets", PropertyValue::list(&self.subnets));

        if !self.security_groups.is_empty() {
            lb.set_property(
                "SecurityGroups",
                PropertyValue::List(self.security_groups.clone()),
            );
        }
        if let Some(scheme) = &self.scheme {
            lb.set_property("Scheme", scheme);
        }
        lb
    }
}

/// Routes ALB traffic to Lambda compute targets
#[derive(Debug, Clone)]
pub struct ApplicationLoadBalancerDecorator {
    name: String,
    load_balancer: LoadBalancerSpec,
    port: u16,
    protocol: ListenerProtocol,
    certificate_arn: Option<String>,
    default_target: String,
    conditional_routes: Vec<(RouteCondition, String)>,
    resources: Vec<ResourceDescriptor>,
}

impl ApplicationLoadBalancerDecorator {
    /// Create a decorator whose listener sends all unmatched requests to
    /// `default_target`
    pub fn new(
        load_balancer: LoadBalancerSpec,
        port: u16,
        protocol: &str,
        default_target: impl Into<String>,
    ) -> Result<Self> {
        let protocol: ListenerProtocol = protocol.parse()?;
        let default_target = default_target.into();

        if port == 0 {
            return Err(StackError::InvalidConfig(
                "listener port must be between 1 and 65535".to_string(),
            ));
        }
        if load_balancer.subnets.len() < 2 {
            return Err(StackError::InvalidConfig(format!(
                "load balancer '{}' needs at least two subnets, got {}",
                load_balancer.name,
                load_balancer.subnets.len()
            )));
        }
        if default_target.trim().is_empty() {
            return Err(StackError::InvalidConfig(
                "load balancer requires a default target".to_string(),
            ));
        }

        Ok(Self {
            name: format!("alb:{}", load_balancer.name),
            load_balancer,
            port,
            protocol,
            certificate_arn: None,
            default_target,
            conditional_routes: Vec::new(),
            resources: Vec::new(),
        })
    }

    /// TLS certificate for an HTTPS listener
    pub fn with_certificate(mut self, arn: impl Into<String>) -> Self {
        self.certificate_arn = Some(arn.into());
        self
    }

    /// Register a conditionally evaluated route
    ///
    /// Routes are evaluated in the order they are registered, before the
    /// default target, and the first match wins: the first route gets
    /// listener rule priority 1, the next one 2, and so on. Register more
    /// specific routes before broader ones, otherwise the broader route
    /// shadows them.
    pub fn add_conditional_route(
        &mut self,
        condition: RouteCondition,
        target: impl Into<String>,
    ) -> &mut Self {
        self.conditional_routes.push((condition, target.into()));
        self
    }

    /// Include an additional resource (a security group, for example) in
    /// this decorator's contribution
    pub fn add_resource(&mut self, descriptor: ResourceDescriptor) -> &mut Self {
        self.resources.push(descriptor);
        self
    }

    pub fn default_target(&self) -> &str {
        &self.default_target
    }

    pub fn conditional_routes(&self) -> &[(RouteCondition, String)] {
        &self.conditional_routes
    }

    pub fn listener_id(&self) -> String {
        logical_name(
            &format!("{}Listener", sanitize_logical_id(&self.load_balancer.name)),
            &[self.load_balancer.name.as_str()],
        )
    }

    pub fn target_group_id(&self, target: &str) -> String {
        logical_name(
            "ALBTargetGroup",
            &[self.load_balancer.name.as_str(), target],
        )
    }

    pub fn permission_id(&self, target: &str) -> String {
        logical_name(
            "ALBInvokePermission",
            &[self.load_balancer.name.as_str(), target],
        )
    }

    pub fn rule_id(&self, priority: u32) -> String {
        logical_name(
            "ALBListenerRule",
            &[self.load_balancer.name.as_str(), &priority.to_string()],
        )
    }

    /// The routing table this decorator produces, default route last
    pub fn routing_entries(&self) -> Vec<RoutingEntry> {
        let mut entries: Vec<RoutingEntry> = self
            .conditional_routes
            .iter()
            .enumerate()
            .map(|(i, (condition, target))| RoutingEntry {
                priority: i as u32 + 1,
                condition: Some(condition.clone()),
                target: target.clone(),
            })
            .collect();
        entries.push(RoutingEntry {
            priority: entries.len() as u32 + 1,
            condition: None,
            target: self.default_target.clone(),
        });
        entries
    }

    fn forward_action(&self, target: &str) -> PropertyValue {
        PropertyValue::map([
            ("Type", PropertyValue::from("forward")),
            (
                "TargetGroupArn",
                PropertyValue::from(Reference::to(self.target_group_id(target))),
            ),
        ])
    }

    /// Permission plus lambda target group for one compute target
    fn target_resources(&self, target: &ComputeTarget) -> [ResourceDescriptor; 2] {
        let permission_id = self.permission_id(&target.name);
        let permission = ResourceDescriptor::new(&permission_id, "AWS::Lambda::Permission")
            .with_property("Action", "lambda:InvokeFunction")
            .with_property("FunctionName", target.function_arn())
            .with_property("Principal", ELB_SERVICE_PRINCIPAL);

        // ELB validates invoke access when registering the target, so the
        // permission has to exist first
        let target_group = ResourceDescriptor::new(
            self.target_group_id(&target.name),
            "AWS::ElasticLoadBalancingV2::TargetGroup",
        )
        .with_property("TargetType", "lambda")
        .with_property(
            "Targets",
            PropertyValue::list([PropertyValue::map([("Id", target.function_arn())])]),
        )
        .with_dependency(permission_id);

        [permission, target_group]
    }
}

impl Decorator for ApplicationLoadBalancerDecorator {
    fn name(&self) -> &str {
        &self.name
    }

    fn decorate(&self, graph: &ResourceGraph, targets: &[ComputeTarget]) -> Result<Decoration> {
        if self.conditional_routes.len() as u32 >= MAX_RULE_PRIORITY {
            return Err(StackError::InvalidConfig(format!(
                "{} conditional routes exceed the listener rule limit",
                self.conditional_routes.len()
            )));
        }
        if self.protocol == ListenerProtocol::Https && self.certificate_arn.is_none() {
            return Err(StackError::InvalidConfig(
                "HTTPS listener requires a certificate".to_string(),
            ));
        }
        for (condition, _) in &self.conditional_routes {
            condition.validate()?;
        }

        // Every routed target, default first, each once
        let mut routed: Vec<&ComputeTarget> = Vec::new();
        for name in std::iter::once(&self.default_target)
            .chain(self.conditional_routes.iter().map(|(_, t)| t))
        {
            let target = find_target(graph, targets, name)?;
            if !routed.iter().any(|t| t.name == target.name) {
                routed.push(target);
            }
        }

        let mut decoration = Decoration::new();
        decoration.resources.extend(self.resources.iter().cloned());

        let lb = self.load_balancer.descriptor();
        let lb_id = lb.id.clone();
        decoration.resources.push(lb);

        for target in &routed {
            decoration.resources.extend(self.target_resources(target));
        }

        let mut listener = ResourceDescriptor::new(
            self.listener_id(),
            "AWS::ElasticLoadBalancingV2::Listener",
        )
        .with_property("LoadBalancerArn", Reference::to(&lb_id))
        .with_property("Port", self.port)
        .with_property("Protocol", self.protocol.as_str())
        .with_property(
            "DefaultActions",
            PropertyValue::list([self.forward_action(&self.default_target)]),
        );
        if let Some(arn) = &self.certificate_arn {
            listener.set_property(
                "Certificates",
                PropertyValue::list([PropertyValue::map([("CertificateArn", arn)])]),
            );
        }
        let listener_id = listener.id.clone();
        decoration.resources.push(listener);

        let routes = self.routing_entries();
        for entry in &routes {
            let Some(condition) = &entry.condition else {
                continue;
            };
            let rule = ResourceDescriptor::new(
                self.rule_id(entry.priority),
                "AWS::ElasticLoadBalancingV2::ListenerRule",
            )
            .with_property("ListenerArn", Reference::to(&listener_id))
            .with_property("Priority", entry.priority)
            .with_property(
                "Conditions",
                PropertyValue::list([PropertyValue::Literal(condition.to_rule_condition())]),
            )
            .with_property(
                "Actions",
                PropertyValue::list([self.forward_action(&entry.target)]),
            );
            decoration.resources.push(rule);
        }

        let prefix = sanitize_logical_id(&self.load_balancer.name);
        decoration.outputs.insert(
            format!("{}DNSName", prefix),
            TemplateOutput::new(Reference::attribute(&lb_id, "DNSName"))
                .with_description("Load balancer DNS name"),
        );
        decoration.outputs.insert(
            format!("{}URL", prefix),
            TemplateOutput::new(PropertyValue::map([(
                "Fn::Join",
                PropertyValue::list([
                    PropertyValue::from(""),
                    PropertyValue::list([
                        PropertyValue::from(format!(
                            "{}://",
                            self.protocol.as_str().to_ascii_lowercase()
                        )),
                        PropertyValue::from(Reference::attribute(
                            &lb_id, "DNSName",
                        )),
                        PropertyValue::from(format!(":{}", self.port)),
                    ]),
                ]),
            )]))
            .with_description("Listener URL"),
        );

        tracing::debug!(
            "{}: {} resources, {} routes",
            self.name,
            decoration.resources.len(),
            routes.len()
        );
        decoration.routes = routes;
        Ok(decoration)
    }
}
