//! Resource graph
//!
//! Holds every descriptor of one deployment in creation order. The graph
//! itself only guarantees id uniqueness; reference targets and cycles are
//! checked by the resolver at assembly time.

use crate::error::{Result, StackError};
use crate::resource::{Properties, Reference, ResourceDescriptor};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    /// Descriptors in creation order
    descriptors: Vec<ResourceDescriptor>,

    /// Logical id -> position in `descriptors`
    index: HashMap<String, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resource and return its id
    pub fn create(
        &mut self,
        id: impl Into<String>,
        kind: impl Into<String>,
        properties: Properties,
    ) -> Result<String> {
        let descriptor = ResourceDescriptor::new(id, kind).with_properties(properties);
        self.insert(descriptor)
    }

    /// Insert a fully built descriptor and return its id
    pub fn insert(&mut self, descriptor: ResourceDescriptor) -> Result<String> {
        if self.index.contains_key(&descriptor.id) {
            return Err(StackError::DuplicateIdentifier(descriptor.id));
        }

        let id = descriptor.id.clone();
        tracing::trace!("Adding resource {} ({})", id, descriptor.kind);
        self.index.insert(id.clone(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(id)
    }

    /// Record that `id` must be created after `depends_on`
    ///
    /// Only `id` has to exist already; the target is validated when the
    /// graph is resolved.
    pub fn add_dependency(&mut self, id: &str, depends_on: impl Into<String>) -> Result<()> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| StackError::UnknownResource(id.to_string()))?;
        self.descriptors[position].depends_on.insert(depends_on.into());
        Ok(())
    }

    /// Build a reference to `id`, optionally to one of its attributes
    ///
    /// No validation happens here, so references to resources that a later
    /// decorator contributes are allowed.
    pub fn reference(&self, id: &str, attribute: Option<&str>) -> Reference {
        match attribute {
            Some(attr) => Reference::attribute(id, attr),
            None => Reference::to(id),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ResourceDescriptor> {
        self.index.get(id).map(|&i| &self.descriptors[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ResourceDescriptor> {
        match self.index.get(id) {
            Some(&i) => Some(&mut self.descriptors[i]),
            None => None,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Creation index of a resource
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Descriptors in creation order
    pub fn iter(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn by_kind(&self, kind: &str) -> Vec<&ResourceDescriptor> {
        self.descriptors.iter().filter(|d| d.kind == kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::PropertyValue;

    #[test]
    fn test_create_and_lookup() {
        let mut graph = ResourceGraph::new();
        let mut props = Properties::new();
        props.insert("GroupDescription".into(), PropertyValue::from("ALB Security Group"));

        let id = graph.create("SG", "AWS::EC2::SecurityGroup", props).unwrap();
        assert_eq!(id, "SG");
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get("SG").unwrap().kind, "AWS::EC2::SecurityGroup");
        assert_eq!(graph.position("SG"), Some(0));
    }

    #[test]
    fn test_duplicate_identifier() {
        let mut graph = ResourceGraph::new();
        graph
            .create("SG", "AWS::EC2::SecurityGroup", Properties::new())
            .unwrap();

        let err = graph
            .create("SG", "AWS::IAM::Role", Properties::new())
            .unwrap_err();
        assert!(matches!(err, StackError::DuplicateIdentifier(id) if id == "SG"));
        // The original descriptor is untouched
        assert_eq!(graph.get("SG").unwrap().kind, "AWS::EC2::SecurityGroup");
    }

    #[test]
    fn test_add_dependency_defers_target_check() {
        let mut graph = ResourceGraph::new();
        graph.create("A", "Custom::A", Properties::new()).unwrap();

        // Target does not exist yet; accepted until resolution
        graph.add_dependency("A", "Later").unwrap();
        assert!(graph.get("A").unwrap().depends_on.contains("Later"));

        let err = graph.add_dependency("Missing", "A").unwrap_err();
        assert!(matches!(err, StackError::UnknownResource(_)));
    }

    #[test]
    fn test_reference_is_not_validated() {
        let graph = ResourceGraph::new();
        let r = graph.reference("Nowhere", Some("Arn"));
        assert_eq!(r, Reference::attribute("Nowhere", "Arn"));
    }
}
