//! Stack manifest model

use crate::error::{ConfigError, Result};
use albflow_template::naming::sanitize_logical_id;
use albflow_template::{
    ApplicationLoadBalancerDecorator, ComputeTarget, Deployment, LoadBalancerSpec, PropertyValue,
    Reference, ResourceDecorator, ResourceDescriptor, RouteCondition,
};
use serde::{Deserialize, Serialize};

/// Environment variable holding the subnet list when none is named
pub const DEFAULT_SUBNETS_ENV: &str = "TEST_SUBNETS";

/// A parsed `stack.kdl`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackManifest {
    pub name: String,
    pub description: Option<String>,
    pub functions: Vec<ComputeTarget>,
    pub security_groups: Vec<SecurityGroupSpec>,
    pub load_balancer: Option<LoadBalancerManifest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupSpec {
    pub name: String,
    pub description: String,
    pub vpc_id: Option<String>,
    pub ingress: Vec<IngressRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub cidr: String,
}

impl SecurityGroupSpec {
    pub fn resource_id(&self) -> String {
        sanitize_logical_id(&self.name)
    }

    pub fn descriptor(&self) -> ResourceDescriptor {
        let ingress = self
            .ingress
            .iter()
            .map(|rule| {
                PropertyValue::map([
                    ("IpProtocol", PropertyValue::from(rule.protocol.as_str())),
                    ("FromPort", PropertyValue::from(rule.from_port)),
                    ("ToPort", PropertyValue::from(rule.to_port)),
                    ("CidrIp", PropertyValue::from(rule.cidr.as_str())),
                ])
            })
            .collect::<Vec<_>>();

        let mut descriptor = ResourceDescriptor::new(self.resource_id(), "AWS::EC2::SecurityGroup")
            .with_property("GroupDescription", self.description.as_str());
        if !ingress.is_empty() {
            descriptor.set_property("SecurityGroupIngress", PropertyValue::List(ingress));
        }
        if let Some(vpc) = &self.vpc_id {
            descriptor.set_property("VpcId", vpc.as_str());
        }
        descriptor
    }
}

/// Where the load balancer's subnets come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetSource {
    /// Listed in the manifest
    Inline(Vec<String>),
    /// Comma-separated list in an environment variable
    Env(String),
}

impl Default for SubnetSource {
    fn default() -> Self {
        SubnetSource::Env(DEFAULT_SUBNETS_ENV.to_string())
    }
}

impl SubnetSource {
    /// Resolve the subnet list; the environment is read once per call
    pub fn resolve(&self) -> Result<Vec<String>> {
        match self {
            SubnetSource::Inline(subnets) => Ok(subnets.clone()),
            SubnetSource::Env(var) => {
                let value =
                    std::env::var(var).map_err(|_| ConfigError::MissingEnv(var.clone()))?;
                tracing::debug!("Read subnets from {}", var);
                Ok(split_subnets(&value))
            }
        }
    }
}

/// Split a comma-separated subnet list, dropping empty items
pub fn split_subnets(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub port: u16,
    pub protocol: String,
    pub default_target: String,
    pub certificate_arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub target: String,
    pub condition: RouteCondition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerManifest {
    pub name: String,
    pub subnets: SubnetSource,
    /// Security group names declared in the manifest, or literal `sg-` ids
    pub security_groups: Vec<String>,
    pub scheme: Option<String>,
    pub listener: ListenerSpec,
    /// In registration order
    pub routes: Vec<RouteSpec>,
}

impl StackManifest {
    fn security_group(&self, name: &str) -> Option<&SecurityGroupSpec> {
        self.security_groups.iter().find(|sg| sg.name == name)
    }

    fn load_balancer_decorator(
        &self,
        lb: &LoadBalancerManifest,
    ) -> Result<ApplicationLoadBalancerDecorator> {
        let mut spec = LoadBalancerSpec::new(&lb.name, lb.subnets.resolve()?);
        for group in &lb.security_groups {
            spec = match self.security_group(group) {
                Some(sg) => {
                    spec.with_security_group(Reference::attribute(sg.resource_id(), "GroupId"))
                }
                None if group.starts_with("sg-") => spec.with_security_group(group.as_str()),
                None => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "load-balancer '{}' references unknown security-group '{}'",
                        lb.name, group
                    )));
                }
            };
        }
        if let Some(scheme) = &lb.scheme {
            spec = spec.with_scheme(scheme);
        }

        let mut decorator = ApplicationLoadBalancerDecorator::new(
            spec,
            lb.listener.port,
            &lb.listener.protocol,
            &lb.listener.default_target,
        )?;
        if let Some(arn) = &lb.listener.certificate_arn {
            decorator = decorator.with_certificate(arn);
        }
        for route in &lb.routes {
            decorator.add_conditional_route(route.condition.clone(), &route.target);
        }
        Ok(decorator)
    }

    /// Build the deployment described by this manifest
    ///
    /// Security groups are contributed before the load balancer so the
    /// load balancer can reference them.
    pub fn into_deployment(self) -> Result<Deployment> {
        let load_balancer = self
            .load_balancer
            .as_ref()
            .map(|lb| self.load_balancer_decorator(lb))
            .transpose()?;

        let mut deployment = Deployment::new(&self.name);
        if let Some(description) = &self.description {
            deployment = deployment.with_description(description);
        }

        if !self.security_groups.is_empty() {
            let mut groups = ResourceDecorator::new("security-groups");
            for sg in &self.security_groups {
                groups.add_resource(sg.descriptor());
            }
            deployment.add_decorator(groups);
        }

        if let Some(decorator) = load_balancer {
            deployment.add_decorator(decorator);
        } else {
            tracing::info!("No load-balancer in {}, deploying functions only", self.name);
        }

        for function in self.functions {
            deployment.add_target(function);
        }

        Ok(deployment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use albflow_template::CodeLocation;
    use serial_test::serial;

    fn manifest(subnets: SubnetSource) -> StackManifest {
        let code = CodeLocation::s3("artifacts", "hello.zip");
        StackManifest {
            name: "MyALBStack".into(),
            description: Some("ALB in front of Lambda".into()),
            functions: vec![
                ComputeTarget::new("Hello World", code.clone()),
                ComputeTarget::new("Hello New World", code),
            ],
            security_groups: vec![SecurityGroupSpec {
                name: "ALBSecurityGroup".into(),
                description: "ALB Security Group".into(),
                vpc_id: None,
                ingress: vec![IngressRule {
                    protocol: "tcp".into(),
                    from_port: 80,
                    to_port: 80,
                    cidr: "0.0.0.0/0".into(),
                }],
            }],
            load_balancer: Some(LoadBalancerManifest {
                name: "ALB".into(),
                subnets,
                security_groups: vec!["ALBSecurityGroup".into()],
                scheme: None,
                listener: ListenerSpec {
                    port: 80,
                    protocol: "HTTP".into(),
                    default_target: "Hello World".into(),
                    certificate_arn: None,
                },
                routes: vec![RouteSpec {
                    target: "Hello New World".into(),
                    condition: RouteCondition::path("/newhello*"),
                }],
            }),
        }
    }

    #[test]
    fn test_split_subnets() {
        assert_eq!(
            split_subnets(" subnet-a, subnet-b ,,"),
            vec!["subnet-a".to_string(), "subnet-b".to_string()]
        );
        assert!(split_subnets("").is_empty());
    }

    #[test]
    fn test_security_group_descriptor() {
        let sg = &manifest(SubnetSource::default()).security_groups[0];
        let descriptor = sg.descriptor();
        assert_eq!(descriptor.id, "ALBSecurityGroup");
        assert_eq!(descriptor.kind, "AWS::EC2::SecurityGroup");
        let ingress = descriptor.property("SecurityGroupIngress").unwrap().render();
        assert_eq!(ingress[0]["FromPort"], 80);
        assert_eq!(ingress[0]["CidrIp"], "0.0.0.0/0");
    }

    #[test]
    #[serial]
    fn test_into_deployment_reads_subnets_from_env() {
        temp_env::with_var("TEST_SUBNETS", Some("subnet-a,subnet-b"), || {
            let template = manifest(SubnetSource::default())
                .into_deployment()
                .unwrap()
                .assemble()
                .unwrap();

            assert_eq!(template.deployment(), "MyALBStack");
            assert_eq!(template.routes().len(), 2);
            assert!(template.resource("ALBSecurityGroup").is_some());
            let (_, lb) = template
                .resources_of_kind("AWS::ElasticLoadBalancingV2::LoadBalancer")
                .into_iter()
                .next()
                .unwrap();
            assert_eq!(
                lb.properties["Subnets"],
                serde_json::json!(["subnet-a", "subnet-b"])
            );
            assert_eq!(
                lb.properties["SecurityGroups"],
                serde_json::json!([{"Fn::GetAtt": ["ALBSecurityGroup", "GroupId"]}])
            );
        });
    }

    #[test]
    #[serial]
    fn test_missing_subnet_env() {
        temp_env::with_var_unset("TEST_SUBNETS", || {
            let err = manifest(SubnetSource::default()).into_deployment().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnv(ref v) if v == "TEST_SUBNETS"));
        });
    }

    #[test]
    fn test_single_subnet_is_rejected() {
        let err = manifest(SubnetSource::Inline(vec!["subnet-a".into()]))
            .into_deployment()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Stack(_)));
    }

    #[test]
    fn test_unknown_security_group() {
        let mut m = manifest(SubnetSource::Inline(vec!["a".into(), "b".into()]));
        if let Some(lb) = m.load_balancer.as_mut() {
            lb.security_groups = vec!["Missing".into()];
        }
        let err = m.into_deployment().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)));
    }

    #[test]
    fn test_literal_security_group_id() {
        let mut m = manifest(SubnetSource::Inline(vec!["a".into(), "b".into()]));
        m.security_groups.clear();
        if let Some(lb) = m.load_balancer.as_mut() {
            lb.security_groups = vec!["sg-0123".into()];
        }
        let template = m.into_deployment().unwrap().assemble().unwrap();
        let (_, lb) = template
            .resources_of_kind("AWS::ElasticLoadBalancingV2::LoadBalancer")
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(lb.properties["SecurityGroups"], serde_json::json!(["sg-0123"]));
    }

    #[test]
    fn test_functions_only() {
        let mut m = manifest(SubnetSource::default());
        m.load_balancer = None;
        m.security_groups.clear();
        let template = m.into_deployment().unwrap().assemble().unwrap();
        assert!(template.routes().is_empty());
        assert_eq!(template.resources_of_kind("AWS::Lambda::Function").len(), 2);
    }
}
