//! Reference resolution
//!
//! Walks the dependency edges of a [`ResourceGraph`] (explicit `DependsOn`
//! plus every embedded [`Reference`](crate::resource::Reference)) and
//! produces a creation order. Among resources that are ready at the same
//! time the one declared first is resolved first, so identical graphs always
//! produce identical output.

use crate::error::{Result, StackError};
use crate::graph::ResourceGraph;
use std::collections::{BTreeSet, HashMap};

/// Result of resolving a graph: every resource id exactly once, in
/// dependency order, mapped to the identifier the platform expects
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    order: Vec<String>,
    values: HashMap<String, serde_json::Value>,
}

impl Resolution {
    /// Resource ids in resolution order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Concrete value for a resource id
    pub fn get(&self, id: &str) -> Option<&serde_json::Value> {
        self.values.get(id)
    }

    /// `(id, value)` pairs in resolution order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.order
            .iter()
            .filter_map(|id| self.values.get(id).map(|v| (id.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Resolve every reference in the graph
///
/// Fails with [`StackError::UnresolvedReference`] when a reference or
/// dependency names a resource that was never created, and with
/// [`StackError::CyclicDependency`] when the dependencies form a cycle
/// (including a resource depending on itself).
pub fn resolve(graph: &ResourceGraph) -> Result<Resolution> {
    let descriptors: Vec<_> = graph.iter().collect();
    let count = descriptors.len();

    // Edges: dependency -> dependents, by creation index
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree = vec![0usize; count];

    for (i, descriptor) in descriptors.iter().enumerate() {
        for dep in descriptor.dependencies() {
            let j = graph
                .position(dep)
                .ok_or_else(|| StackError::UnresolvedReference {
                    from: descriptor.id.clone(),
                    to: dep.to_string(),
                })?;
            dependents[j].push(i);
            in_degree[i] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(count);

    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if order.len() < count {
        let cycle = find_cycle(graph, &in_degree);
        return Err(StackError::CyclicDependency(cycle));
    }

    let order: Vec<String> = order
        .into_iter()
        .map(|i| descriptors[i].id.clone())
        .collect();
    let values = order
        .iter()
        .map(|id| (id.clone(), serde_json::json!({ "Ref": id })))
        .collect();

    tracing::debug!("Resolved {} resources", order.len());
    Ok(Resolution { order, values })
}

/// Trace one cycle among the resources Kahn's pass could not order
fn find_cycle(graph: &ResourceGraph, in_degree: &[usize]) -> Vec<String> {
    let descriptors: Vec<_> = graph.iter().collect();
    let stuck = |id: &str| {
        graph
            .position(id)
            .map(|p| in_degree[p] > 0)
            .unwrap_or(false)
    };

    let Some(start) = in_degree.iter().position(|&d| d > 0) else {
        return Vec::new();
    };

    // Every stuck node has at least one stuck dependency, so following
    // the first one must revisit a node eventually
    let mut path: Vec<usize> = vec![start];
    let mut current = start;
    loop {
        let next = descriptors[current]
            .dependencies()
            .into_iter()
            .find(|dep| stuck(dep))
            .and_then(|dep| graph.position(dep));

        let Some(next) = next else {
            return path.iter().map(|&i| descriptors[i].id.clone()).collect();
        };

        if let Some(at) = path.iter().position(|&p| p == next) {
            let mut cycle: Vec<String> = path[at..]
                .iter()
                .map(|&i| descriptors[i].id.clone())
                .collect();
            cycle.push(descriptors[next].id.clone());
            return cycle;
        }

        path.push(next);
        current = next;
    }
}
