//! Resource descriptors and symbolic references
//!
//! A [`ResourceDescriptor`] is one entry of the CloudFormation `Resources`
//! section before references are resolved. Property values may embed
//! [`Reference`]s to other descriptors; they stay symbolic until the
//! resolver has checked that every target exists.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Property bag of a resource, ordered by property name
pub type Properties = BTreeMap<String, PropertyValue>;

/// Symbolic pointer to another resource or one of its attributes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    /// Logical id of the referenced resource
    pub resource_id: String,

    /// Attribute name (`Arn`, `GroupId`, ...). `None` refers to the
    /// resource's primary identifier.
    pub attribute: Option<String>,
}

impl Reference {
    /// Reference to the primary identifier (`Ref`)
    pub fn to(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            attribute: None,
        }
    }

    /// Reference to a named attribute (`Fn::GetAtt`)
    pub fn attribute(resource_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            attribute: Some(attribute.into()),
        }
    }

    /// Render as a CloudFormation intrinsic function
    pub fn to_intrinsic(&self) -> serde_json::Value {
        match &self.attribute {
            None => serde_json::json!({ "Ref": self.resource_id }),
            Some(attr) => serde_json::json!({ "Fn::GetAtt": [self.resource_id, attr] }),
        }
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.attribute {
            None => write!(f, "{}", self.resource_id),
            Some(attr) => write!(f, "{}.{}", self.resource_id, attr),
        }
    }
}

/// A property value: literal JSON, a reference, or a nested list/map
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Literal(serde_json::Value),
    Ref(Reference),
    List(Vec<PropertyValue>),
    Map(Properties),
}

impl PropertyValue {
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<PropertyValue>,
    {
        PropertyValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<PropertyValue>,
    {
        PropertyValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Collect every reference nested in this value
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            PropertyValue::Literal(_) => {}
            PropertyValue::Ref(r) => out.push(r),
            PropertyValue::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            PropertyValue::Map(entries) => {
                for value in entries.values() {
                    value.collect_references(out);
                }
            }
        }
    }

    /// Render into template JSON, turning references into intrinsics
    pub fn render(&self) -> serde_json::Value {
        match self {
            PropertyValue::Literal(v) => v.clone(),
            PropertyValue::Ref(r) => r.to_intrinsic(),
            PropertyValue::List(items) => {
                serde_json::Value::Array(items.iter().map(PropertyValue::render).collect())
            }
            PropertyValue::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.render()))
                    .collect(),
            ),
        }
    }
}

impl From<Reference> for PropertyValue {
    fn from(r: Reference) -> Self {
        PropertyValue::Ref(r)
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(v: serde_json::Value) -> Self {
        PropertyValue::Literal(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Literal(serde_json::Value::String(s.to_string()))
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Literal(serde_json::Value::String(s))
    }
}

impl From<&String> for PropertyValue {
    fn from(s: &String) -> Self {
        PropertyValue::from(s.as_str())
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Literal(serde_json::Value::Bool(b))
    }
}

macro_rules! integer_property {
    ($($t:ty),*) => {
        $(
            impl From<$t> for PropertyValue {
                fn from(n: $t) -> Self {
                    PropertyValue::Literal(serde_json::json!(n))
                }
            }
        )*
    };
}

integer_property!(u16, u32, u64, i32, i64);

/// In-memory representation of a single cloud resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    /// Logical id, unique within a deployment
    pub id: String,

    /// Resource type tag (e.g. `AWS::Lambda::Function`)
    pub kind: String,

    /// Resource properties
    pub properties: Properties,

    /// Explicit dependencies (`DependsOn`)
    pub depends_on: BTreeSet<String>,
}

impl ResourceDescriptor {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            properties: Properties::new(),
            depends_on: BTreeSet::new(),
        }
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.depends_on.insert(id.into());
        self
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Reference to this resource's primary identifier
    pub fn reference(&self) -> Reference {
        Reference::to(&self.id)
    }

    /// Reference to one of this resource's attributes
    pub fn attribute(&self, attribute: impl Into<String>) -> Reference {
        Reference::attribute(&self.id, attribute)
    }

    /// All references embedded in the property bag
    pub fn references(&self) -> Vec<&Reference> {
        self.properties
            .values()
            .flat_map(PropertyValue::references)
            .collect()
    }

    /// Ids this resource must be created after: explicit dependencies plus
    /// every referenced resource, deduplicated and sorted
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.depends_on
            .iter()
            .map(String::as_str)
            .chain(self.references().into_iter().map(|r| r.resource_id.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_intrinsics() {
        assert_eq!(Reference::to("SG").to_intrinsic(), json!({ "Ref": "SG" }));
        assert_eq!(
            Reference::attribute("SG", "GroupId").to_intrinsic(),
            json!({ "Fn::GetAtt": ["SG", "GroupId"] })
        );
        assert_eq!(Reference::attribute("SG", "GroupId").to_string(), "SG.GroupId");
    }

    #[test]
    fn test_render_nested_properties() {
        let value = PropertyValue::map([
            ("Subnets", PropertyValue::list(["subnet-a", "subnet-b"])),
            (
                "SecurityGroups",
                PropertyValue::list([Reference::attribute("SG", "GroupId")]),
            ),
        ]);

        assert_eq!(
            value.render(),
            json!({
                "Subnets": ["subnet-a", "subnet-b"],
                "SecurityGroups": [{ "Fn::GetAtt": ["SG", "GroupId"] }]
            })
        );
        assert_eq!(value.references().len(), 1);
    }

    #[test]
    fn test_dependencies_merge_references_and_depends_on() {
        let lb = ResourceDescriptor::new("LB", "AWS::ElasticLoadBalancingV2::LoadBalancer")
            .with_property(
                "SecurityGroups",
                PropertyValue::list([Reference::attribute("SG", "GroupId")]),
            )
            .with_dependency("SG")
            .with_dependency("Role");

        let deps: Vec<&str> = lb.dependencies().into_iter().collect();
        assert_eq!(deps, vec!["Role", "SG"]);
    }
}
