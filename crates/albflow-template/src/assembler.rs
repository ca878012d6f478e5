//! Template assembly
//!
//! A [`Deployment`] owns its compute targets and decorators. Assembling it
//! consumes the deployment: targets are expanded into the graph, every
//! decorator runs exactly once in registration order and its contribution
//! is merged, references are resolved, and the result is rendered.

use crate::compute::ComputeTarget;
use crate::decorator::{Decorator, TemplateOutput};
use crate::error::{Result, StackError};
use crate::graph::ResourceGraph;
use crate::resolver::resolve;
use crate::routing::{RouteTable, RoutingEntry};
use crate::template::Template;
use std::collections::BTreeMap;

/// Top-level aggregate: one deployment produces one template
pub struct Deployment {
    name: String,
    description: Option<String>,
    targets: Vec<ComputeTarget>,
    decorators: Vec<Box<dyn Decorator>>,
}

impl std::fmt::Debug for Deployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployment")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("targets", &self.targets)
            .field("decorators", &self.decorator_names())
            .finish()
    }
}

impl Deployment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            targets: Vec::new(),
            decorators: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn add_target(&mut self, target: ComputeTarget) -> &mut Self {
        self.targets.push(target);
        self
    }

    /// Register a decorator; decorators run in registration order
    pub fn add_decorator<D: Decorator + 'static>(&mut self, decorator: D) -> &mut Self {
        self.decorators.push(Box::new(decorator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn targets(&self) -> &[ComputeTarget] {
        &self.targets
    }

    pub fn decorator_names(&self) -> Vec<&str> {
        self.decorators.iter().map(|d| d.name()).collect()
    }

    /// Assemble the template
    ///
    /// Errors are wrapped in [`StackError::Assembly`] carrying the
    /// deployment name.
    pub fn assemble(self) -> Result<Template> {
        let name = self.name.clone();
        self.build().map_err(|e| e.in_deployment(name))
    }

    fn build(self) -> Result<Template> {
        if self.name.trim().is_empty() {
            return Err(StackError::InvalidConfig(
                "deployment requires a name".to_string(),
            ));
        }

        // (a) backing resources of each compute target
        let mut graph = ResourceGraph::new();
        for (i, target) in self.targets.iter().enumerate() {
            target.validate()?;
            if self.targets[..i].iter().any(|t| t.name == target.name) {
                return Err(StackError::DuplicateIdentifier(target.name.clone()));
            }
            for descriptor in target.descriptors() {
                graph.insert(descriptor)?;
            }
        }

        // (b) decorators, strictly in order
        let mut routes: Vec<RoutingEntry> = Vec::new();
        let mut routed_by: Option<&str> = None;
        let mut outputs: BTreeMap<String, TemplateOutput> = BTreeMap::new();
        for decorator in &self.decorators {
            let decoration = decorator.decorate(&graph, &self.targets)?;
            tracing::debug!(
                "Decorator {} contributed {} resources",
                decorator.name(),
                decoration.resources.len()
            );

            for resource in decoration.resources {
                if graph.contains(&resource.id) {
                    return Err(StackError::ConflictingResourceId {
                        decorator: decorator.name().to_string(),
                        id: resource.id,
                    });
                }
                graph.insert(resource)?;
            }
            for (output_name, output) in decoration.outputs {
                if outputs.contains_key(&output_name) {
                    return Err(StackError::ConflictingResourceId {
                        decorator: decorator.name().to_string(),
                        id: output_name,
                    });
                }
                outputs.insert(output_name, output);
            }
            if !decoration.routes.is_empty() {
                // Priorities are only unique within one listener
                if let Some(first) = routed_by {
                    return Err(StackError::InvalidConfig(format!(
                        "decorator '{}' contributes routes but '{}' already did; \
                         only one load balancer per deployment is supported",
                        decorator.name(),
                        first
                    )));
                }
                routed_by = Some(decorator.name());
                routes.extend(decoration.routes);
            }
        }

        // (c) resolution, including references made by outputs
        let resolution = resolve(&graph)?;
        for (output_name, output) in &outputs {
            for reference in output.references() {
                if !graph.contains(&reference.resource_id) {
                    return Err(StackError::UnresolvedReference {
                        from: format!("Outputs.{}", output_name),
                        to: reference.resource_id.clone(),
                    });
                }
            }
        }

        // (d) render
        let template = Template::render(
            &self.name,
            self.description.as_deref(),
            &graph,
            &resolution,
            &RouteTable::new(routes),
            &outputs,
        );
        tracing::info!(
            "Assembled {}: {} resources, {} routes",
            self.name,
            template.resources.len(),
            template.routes().len()
        );
        Ok(template)
    }
}
