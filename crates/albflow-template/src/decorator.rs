//! Decorator interface
//!
//! A decorator contributes infrastructure beyond the base compute targets.
//! It receives a read-only view of the graph and returns everything it
//! wants to add as a [`Decoration`]; the assembler performs the merge.

use crate::compute::ComputeTarget;
use crate::error::{Result, StackError};
use crate::graph::ResourceGraph;
use crate::resource::{PropertyValue, Reference, ResourceDescriptor};
use crate::routing::RoutingEntry;
use std::collections::BTreeMap;

/// A template output (`Outputs` section)
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateOutput {
    pub description: Option<String>,
    pub value: PropertyValue,
    pub export_name: Option<String>,
}

impl TemplateOutput {
    pub fn new(value: impl Into<PropertyValue>) -> Self {
        Self {
            description: None,
            value: value.into(),
            export_name: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn references(&self) -> Vec<&Reference> {
        self.value.references()
    }
}

/// Everything a decorator contributes
#[derive(Debug, Clone, Default)]
pub struct Decoration {
    pub resources: Vec<ResourceDescriptor>,
    pub routes: Vec<RoutingEntry>,
    pub outputs: BTreeMap<String, TemplateOutput>,
}

impl Decoration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.routes.is_empty() && self.outputs.is_empty()
    }
}

/// Deployment logic that adds resources and routing to a stack
///
/// Decorators are invoked once, in registration order, by the assembler.
pub trait Decorator {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Compute this decorator's contribution
    fn decorate(&self, graph: &ResourceGraph, targets: &[ComputeTarget]) -> Result<Decoration>;
}

/// Contributes a fixed set of resources and outputs
#[derive(Debug, Clone, Default)]
pub struct ResourceDecorator {
    name: String,
    resources: Vec<ResourceDescriptor>,
    outputs: BTreeMap<String, TemplateOutput>,
}

impl ResourceDecorator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_resource(&mut self, descriptor: ResourceDescriptor) -> &mut Self {
        self.resources.push(descriptor);
        self
    }

    pub fn add_output(&mut self, name: impl Into<String>, output: TemplateOutput) -> &mut Self {
        self.outputs.insert(name.into(), output);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.outputs.is_empty()
    }
}

impl Decorator for ResourceDecorator {
    fn name(&self) -> &str {
        &self.name
    }

    fn decorate(&self, _graph: &ResourceGraph, _targets: &[ComputeTarget]) -> Result<Decoration> {
        Ok(Decoration {
            resources: self.resources.clone(),
            routes: Vec::new(),
            outputs: self.outputs.clone(),
        })
    }
}

/// Look up a compute target by name and make sure its function is in the graph
pub fn find_target<'a>(
    graph: &ResourceGraph,
    targets: &'a [ComputeTarget],
    name: &str,
) -> Result<&'a ComputeTarget> {
    targets
        .iter()
        .find(|t| t.name == name)
        .filter(|t| graph.contains(&t.function_id()))
        .ok_or_else(|| StackError::UnknownComputeTarget(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::CodeLocation;

    #[test]
    fn test_resource_decorator_contributes_resources() {
        let mut decorator = ResourceDecorator::new("extras");
        decorator
            .add_resource(ResourceDescriptor::new("SG", "AWS::EC2::SecurityGroup"))
            .add_output(
                "SGId",
                TemplateOutput::new(Reference::attribute("SG", "GroupId")),
            );

        let decoration = decorator.decorate(&ResourceGraph::new(), &[]).unwrap();
        assert_eq!(decoration.resources.len(), 1);
        assert_eq!(decoration.outputs.len(), 1);
        assert!(decoration.routes.is_empty());
    }

    #[test]
    fn test_find_target_requires_backing_function() {
        let target = ComputeTarget::new("Hello", CodeLocation::s3("b", "k"));
        let targets = vec![target.clone()];

        let empty = ResourceGraph::new();
        assert!(matches!(
            find_target(&empty, &targets, "Hello"),
            Err(StackError::UnknownComputeTarget(_))
        ));

        let mut graph = ResourceGraph::new();
        for d in target.descriptors() {
            graph.insert(d).unwrap();
        }
        assert!(find_target(&graph, &targets, "Hello").is_ok());
        assert!(find_target(&graph, &targets, "Nope").is_err());
    }
}
