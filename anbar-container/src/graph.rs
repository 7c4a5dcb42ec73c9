//! Dependency graph verification.
//!
//! Runs once, when the registration table is finalized:
//! - every declared dependency must have a provider
//! - declared dependencies must not form a cycle
//!
//! Autowired properties are optional edges: a missing provider is fine,
//! but a loop through them is still a cycle.
//!
//! Failing here means failing at startup instead of on some later `build`.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, warn};

use crate::error::UnsatisfiableGraphError;
use crate::key::ServiceKey;

/// A component as the verifier sees it.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub implementation: ServiceKey,
    pub dependencies: Vec<ServiceKey>,
    /// Services filled in after construction, when registered.
    pub optional: Vec<ServiceKey>,
}

/// Depth-first walk over components, following each dependency to every
/// component that could provide it.
pub(crate) struct GraphVerifier<'a> {
    nodes: &'a [Node],
    /// Service key → indices of nodes providing it.
    providers: &'a HashMap<ServiceKey, Vec<usize>>,
    /// Services bound to pre-built instances: satisfied, no outgoing edges.
    presets: &'a HashSet<ServiceKey>,
    visiting: HashSet<usize>,
    verified: HashSet<usize>,
    path: Vec<usize>,
}

impl<'a> GraphVerifier<'a> {
    pub fn new(
        nodes: &'a [Node],
        providers: &'a HashMap<ServiceKey, Vec<usize>>,
        presets: &'a HashSet<ServiceKey>,
    ) -> Self {
        Self {
            nodes,
            providers,
            presets,
            visiting: HashSet::new(),
            verified: HashSet::new(),
            path: Vec::new(),
        }
    }

    #[instrument(skip(self), name = "graph_verification")]
    pub fn verify(&mut self) -> Result<(), UnsatisfiableGraphError> {
        debug!(components = self.nodes.len(), "Verifying dependency graph");

        for index in 0..self.nodes.len() {
            self.visit(index)?;
        }

        debug!("Dependency graph verified ✓");
        Ok(())
    }

    fn visit(&mut self, index: usize) -> Result<(), UnsatisfiableGraphError> {
        if self.verified.contains(&index) {
            return Ok(());
        }

        let nodes = self.nodes;
        let node = &nodes[index];

        if self.visiting.contains(&index) {
            let start = self.path.iter().position(|&i| i == index).unwrap_or(0);
            let mut chain: Vec<ServiceKey> = self.path[start..]
                .iter()
                .map(|&i| nodes[i].implementation)
                .collect();
            chain.push(node.implementation);

            warn!(cycle = ?chain, "Circular dependency detected");
            return Err(UnsatisfiableGraphError::Cycle { chain });
        }

        self.visiting.insert(index);
        self.path.push(index);

        for dependency in &node.dependencies {
            if self.presets.contains(dependency) {
                continue;
            }

            let providers = self.providers;
            let Some(candidates) = providers.get(dependency) else {
                warn!(component = %node.implementation, dependency = %dependency, "Missing dependency");
                return Err(UnsatisfiableGraphError::Missing {
                    component: node.implementation,
                    dependency: *dependency,
                });
            };

            for &candidate in candidates {
                self.visit(candidate)?;
            }
        }

        for service in &node.optional {
            if self.presets.contains(service) {
                continue;
            }
            let providers = self.providers;
            for &candidate in providers.get(service).into_iter().flatten() {
                self.visit(candidate)?;
            }
        }

        self.path.pop();
        self.visiting.remove(&index);
        self.verified.insert(index);
        Ok(())
    }
}
