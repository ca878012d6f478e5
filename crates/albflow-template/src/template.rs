//! CloudFormation template document

use crate::decorator::TemplateOutput;
use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::resolver::Resolution;
use crate::routing::{RouteTable, RoutingEntry};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// A rendered CloudFormation template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    #[serde(rename = "Description", skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,

    #[serde(rename = "Metadata")]
    pub metadata: TemplateMetadata,

    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, TemplateResource>,

    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub outputs: BTreeMap<String, RenderedOutput>,
}

/// Top-level `Metadata` written by albflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    /// Deployment this template was assembled for
    #[serde(rename = "Deployment")]
    pub deployment: String,

    /// Routing entries in priority order
    #[serde(rename = "Routing", default)]
    pub routing: Vec<RoutingEntry>,

    /// Resource ids in dependency order
    #[serde(rename = "CreationOrder", default)]
    pub creation_order: Vec<String>,
}

/// One entry of the `Resources` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub kind: String,

    #[serde(
        rename = "Properties",
        skip_serializing_if = "serde_json::Map::is_empty",
        default
    )]
    pub properties: serde_json::Map<String, serde_json::Value>,

    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty", default)]
    pub depends_on: Vec<String>,
}

/// One entry of the `Outputs` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedOutput {
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,

    #[serde(rename = "Value")]
    pub value: serde_json::Value,

    #[serde(rename = "Export", skip_serializing_if = "Option::is_none", default)]
    pub export: Option<ExportName>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportName {
    #[serde(rename = "Name")]
    pub name: String,
}

impl Template {
    /// Render a resolved graph
    pub fn render(
        deployment: &str,
        description: Option<&str>,
        graph: &ResourceGraph,
        resolution: &Resolution,
        routes: &RouteTable,
        outputs: &BTreeMap<String, TemplateOutput>,
    ) -> Self {
        let resources = graph
            .iter()
            .map(|descriptor| {
                let properties = descriptor
                    .properties
                    .iter()
                    .map(|(name, value)| (name.clone(), value.render()))
                    .collect();
                (
                    descriptor.id.clone(),
                    TemplateResource {
                        kind: descriptor.kind.clone(),
                        properties,
                        depends_on: descriptor.depends_on.iter().cloned().collect(),
                    },
                )
            })
            .collect();

        let outputs = outputs
            .iter()
            .map(|(name, output)| {
                (
                    name.clone(),
                    RenderedOutput {
                        description: output.description.clone(),
                        value: output.value.render(),
                        export: output
                            .export_name
                            .as_ref()
                            .map(|n| ExportName { name: n.clone() }),
                    },
                )
            })
            .collect();

        Self {
            format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: description.map(str::to_string),
            metadata: TemplateMetadata {
                deployment: deployment.to_string(),
                routing: routes.entries().to_vec(),
                creation_order: resolution.order().to_vec(),
            },
            resources,
            outputs,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pretty-printed template body
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Hex SHA-256 of the template body, used to detect changes
    pub fn digest(&self) -> Result<String> {
        let body = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&body)))
    }

    pub fn deployment(&self) -> &str {
        &self.metadata.deployment
    }

    pub fn routes(&self) -> &[RoutingEntry] {
        &self.metadata.routing
    }

    pub fn resource(&self, id: &str) -> Option<&TemplateResource> {
        self.resources.get(id)
    }

    pub fn resources_of_kind(&self, kind: &str) -> Vec<(&String, &TemplateResource)> {
        self.resources.iter().filter(|(_, r)| r.kind == kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve;
    use crate::resource::{Reference, ResourceDescriptor};
    use serde_json::json;

    #[test]
    fn test_render_document_shape() {
        let mut graph = ResourceGraph::new();
        graph
            .insert(
                ResourceDescriptor::new("SG", "AWS::EC2::SecurityGroup")
                    .with_property("GroupDescription", "ALB Security Group"),
            )
            .unwrap();
        graph
            .insert(
                ResourceDescriptor::new("LB", "AWS::ElasticLoadBalancingV2::LoadBalancer")
                    .with_property("SecurityGroups", crate::resource::PropertyValue::list([
                        Reference::attribute("SG", "GroupId"),
                    ]))
                    .with_dependency("SG"),
            )
            .unwrap();
        let resolution = resolve(&graph).unwrap();

        let mut outputs = BTreeMap::new();
        outputs.insert(
            "DNS".to_string(),
            TemplateOutput::new(Reference::attribute("LB", "DNSName")),
        );

        let template = Template::render(
            "MyStack",
            Some("demo"),
            &graph,
            &resolution,
            &RouteTable::default(),
            &outputs,
        );
        let value = serde_json::to_value(&template).unwrap();

        assert_eq!(value["AWSTemplateFormatVersion"], json!("2010-09-09"));
        assert_eq!(value["Description"], json!("demo"));
        assert_eq!(value["Metadata"]["Deployment"], json!("MyStack"));
        assert_eq!(value["Metadata"]["CreationOrder"], json!(["SG", "LB"]));
        assert_eq!(
            value["Resources"]["LB"],
            json!({
                "Type": "AWS::ElasticLoadBalancingV2::LoadBalancer",
                "Properties": { "SecurityGroups": [{ "Fn::GetAtt": ["SG", "GroupId"] }] },
                "DependsOn": ["SG"]
            })
        );
        assert_eq!(
            value["Outputs"]["DNS"],
            json!({ "Value": { "Fn::GetAtt": ["LB", "DNSName"] } })
        );
    }

    #[test]
    fn test_json_roundtrip_and_digest() {
        let mut graph = ResourceGraph::new();
        graph
            .insert(ResourceDescriptor::new("Topic", "AWS::SNS::Topic"))
            .unwrap();
        let resolution = resolve(&graph).unwrap();
        let template = Template::render(
            "S",
            None,
            &graph,
            &resolution,
            &RouteTable::default(),
            &BTreeMap::new(),
        );

        let json = template.to_json().unwrap();
        assert!(!json.contains("\"Description\""));
        assert!(!json.contains("\"Outputs\""));
        let parsed = Template::from_json(&json).unwrap();
        assert_eq!(parsed, template);
        assert_eq!(parsed.digest().unwrap(), template.digest().unwrap());
        assert_eq!(template.digest().unwrap().len(), 64);
    }
}
