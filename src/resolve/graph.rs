//! Dependency graph and apply order
//!
//! Edges are never declared. Node A depends on node B when one of A's input
//! bindings is a deferred value produced by B, either directly or through
//! the identifiers of a lookup chain that eventually reads one of B's
//! attributes.

use super::value::{Binding, DeferredValue, NodeId, Scalar, Source};
use crate::provider::ProviderError;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Attributes a node exposes once realized
pub type Attributes = BTreeMap<String, Binding>;

/// Creates the real resource behind a node
#[async_trait]
pub trait Realize: Send + Sync {
    /// Called once per run with fully resolved inputs
    async fn realize(
        &self,
        node: &ResourceNode,
        inputs: &BTreeMap<String, Scalar>,
    ) -> Result<Attributes, ProviderError>;
}

/// A declared resource
pub struct ResourceNode {
    id: NodeId,
    resource_type: String,
    inputs: Vec<(String, Binding)>,
    outputs: Vec<String>,
    realizer: Arc<dyn Realize>,
}

impl ResourceNode {
    pub fn new(
        id: impl Into<NodeId>,
        resource_type: impl Into<String>,
        realizer: Arc<dyn Realize>,
    ) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            realizer,
        }
    }

    /// Bind an input. A later binding with the same name replaces the earlier one.
    pub fn with_input(mut self, name: impl Into<String>, binding: impl Into<Binding>) -> Self {
        let name = name.into();
        let binding = binding.into();
        match self.inputs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = binding,
            None => self.inputs.push((name, binding)),
        }
        self
    }

    /// Declare an attribute this node exposes after realization
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.outputs.contains(&name) {
            self.outputs.push(name);
        }
        self
    }

    /// Deferred value for one of this node's attributes
    pub fn attribute(&self, name: &str) -> DeferredValue {
        DeferredValue::from_node(self.id.clone(), name)
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn inputs(&self) -> &[(String, Binding)] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn realizer(&self) -> &Arc<dyn Realize> {
        &self.realizer
    }
}

impl fmt::Debug for ResourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceNode")
            .field("id", &self.id)
            .field("resource_type", &self.resource_type)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<NodeId> },
    #[error("duplicate node id '{0}'")]
    DuplicateNode(NodeId),
    #[error("'{consumer}' references unknown node '{node}'")]
    UnknownNode { consumer: NodeId, node: NodeId },
    #[error("'{consumer}' reads '{node}.{attribute}', which '{node}' does not declare")]
    UndeclaredOutput {
        consumer: NodeId,
        node: NodeId,
        attribute: String,
    },
    #[error("'{consumer}' reads field '{path}' that {lookup} does not request")]
    UndeclaredField {
        consumer: NodeId,
        lookup: String,
        path: String,
    },
}

/// One node in apply order
#[derive(Debug, Clone)]
pub struct PlannedNode {
    pub node: Arc<ResourceNode>,
    /// Positions (in plan order) of the nodes this one depends on
    pub depends_on: Vec<usize>,
}

/// Validated apply order
#[derive(Debug, Clone, Default)]
pub struct Plan {
    nodes: Vec<PlannedNode>,
}

impl Plan {
    pub fn nodes(&self) -> &[PlannedNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in apply order
    pub fn order(&self) -> Vec<&str> {
        self.nodes.iter().map(|p| p.node.id().as_str()).collect()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|p| p.node.id() == id)
    }

    /// Ids of the nodes `id` depends on directly
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.position(id)
            .map(|i| {
                self.nodes[i]
                    .depends_on
                    .iter()
                    .map(|&d| self.nodes[d].node.id().as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Resource nodes in declaration order
#[derive(Default)]
pub struct DependencyGraph {
    nodes: Vec<Arc<ResourceNode>>,
    index: HashMap<NodeId, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: ResourceNode) -> Result<DeferredHandle, GraphError> {
        if self.index.contains_key(node.id()) {
            return Err(GraphError::DuplicateNode(node.id().clone()));
        }
        let handle = DeferredHandle {
            node: node.id().clone(),
        };
        self.index.insert(node.id().clone(), self.nodes.len());
        self.nodes.push(Arc::new(node));
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Validate references and compute the apply order.
    ///
    /// Ready nodes are taken in declaration order, so the same graph always
    /// yields the same plan.
    pub fn build(&self) -> Result<Plan, GraphError> {
        let count = self.nodes.len();
        let mut deps: Vec<BTreeSet<usize>> = Vec::with_capacity(count);
        for node in &self.nodes {
            let mut producers = BTreeSet::new();
            for (_, binding) in node.inputs() {
                self.collect_producers(node.id(), binding, &mut producers)?;
            }
            deps.push(producers);
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut waiting: Vec<usize> = vec![0; count];
        for (consumer, producers) in deps.iter().enumerate() {
            waiting[consumer] = producers.len();
            for &producer in producers {
                dependents[producer].push(consumer);
            }
        }

        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| waiting[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &consumer in &dependents[next] {
                waiting[consumer] -= 1;
                if waiting[consumer] == 0 {
                    ready.insert(consumer);
                }
            }
        }

        if order.len() < count {
            let cycle = self.find_cycle(&deps, &waiting);
            return Err(GraphError::CyclicDependency { cycle });
        }

        let mut position = vec![0; count];
        for (pos, &idx) in order.iter().enumerate() {
            position[idx] = pos;
        }

        let nodes = order
            .iter()
            .map(|&idx| {
                let mut depends_on: Vec<usize> = deps[idx].iter().map(|&d| position[d]).collect();
                depends_on.sort_unstable();
                PlannedNode {
                    node: Arc::clone(&self.nodes[idx]),
                    depends_on,
                }
            })
            .collect();

        Ok(Plan { nodes })
    }

    /// Check a binding read from outside the graph, such as a stack output,
    /// against the same reference rules as node inputs
    pub fn check_binding(&self, consumer: &str, binding: &Binding) -> Result<(), GraphError> {
        self.collect_producers(&consumer.to_string(), binding, &mut BTreeSet::new())
    }

    fn collect_producers(
        &self,
        consumer: &NodeId,
        binding: &Binding,
        out: &mut BTreeSet<usize>,
    ) -> Result<(), GraphError> {
        let Some(deferred) = binding.as_deferred() else {
            return Ok(());
        };

        match deferred.source() {
            Source::Node { node, attribute } => {
                let Some(&idx) = self.index.get(node) else {
                    return Err(GraphError::UnknownNode {
                        consumer: consumer.clone(),
                        node: node.clone(),
                    });
                };
                if !self.nodes[idx].outputs().contains(attribute) {
                    return Err(GraphError::UndeclaredOutput {
                        consumer: consumer.clone(),
                        node: node.clone(),
                        attribute: attribute.clone(),
                    });
                }
                out.insert(idx);
            }
            Source::Lookup { spec, path } => {
                if !spec.declares(path) {
                    return Err(GraphError::UndeclaredField {
                        consumer: consumer.clone(),
                        lookup: spec.identity(),
                        path: path.to_string(),
                    });
                }
                for identifier in spec.identifiers() {
                    self.collect_producers(consumer, identifier, out)?;
                }
            }
        }
        Ok(())
    }

    /// Find a cycle among the nodes Kahn's algorithm could not order.
    /// Returned as `a -> b -> ... -> a`, each node depending on the next.
    fn find_cycle(&self, deps: &[BTreeSet<usize>], waiting: &[usize]) -> Vec<NodeId> {
        #[derive(Copy, Clone, PartialEq, Eq)]
        enum Mark {
            Temp,
            Perm,
        }

        fn dfs(
            v: usize,
            deps: &[BTreeSet<usize>],
            waiting: &[usize],
            marks: &mut HashMap<usize, Mark>,
            stack: &mut Vec<usize>,
        ) -> Option<Vec<usize>> {
            match marks.get(&v) {
                Some(Mark::Perm) => return None,
                Some(Mark::Temp) => {
                    let start = stack.iter().position(|&s| s == v).unwrap_or(0);
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(v);
                    return Some(cycle);
                }
                None => {}
            }

            marks.insert(v, Mark::Temp);
            stack.push(v);
            for &d in &deps[v] {
                // Only unordered nodes can take part in a cycle
                if waiting[d] == 0 {
                    continue;
                }
                if let Some(cycle) = dfs(d, deps, waiting, marks, stack) {
                    return Some(cycle);
                }
            }
            stack.pop();
            marks.insert(v, Mark::Perm);
            None
        }

        let mut marks = HashMap::new();
        for start in (0..deps.len()).filter(|&i| waiting[i] > 0) {
            let mut stack = Vec::new();
            if let Some(cycle) = dfs(start, deps, waiting, &mut marks, &mut stack) {
                return cycle
                    .into_iter()
                    .map(|i| self.nodes[i].id().clone())
                    .collect();
            }
        }
        Vec::new()
    }
}

/// Returned by [`DependencyGraph::add_node`] to read the added node's attributes
#[derive(Debug, Clone)]
pub struct DeferredHandle {
    node: NodeId,
}

impl DeferredHandle {
    pub fn attribute(&self, name: &str) -> DeferredValue {
        DeferredValue::from_node(self.node.clone(), name)
    }

    pub fn id(&self) -> &NodeId {
        &self.node
    }
}
