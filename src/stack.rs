//! Stack files
//!
//! A stack is a YAML description of parameters, lookups, resources and
//! outputs. Compiling it yields a [`DependencyGraph`] plus the stack outputs;
//! nothing is resolved at this point.
//!
//! ```yaml
//! parameters:
//!   VpceId: vpce-0abc
//! lookups:
//!   vpce:
//!     kind: describe-vpc-endpoints
//!     identifiers: [{ param: VpceId }]
//!     fields: [VpcEndpoints.*.NetworkInterfaceIds.*]
//! resources:
//!   - id: target
//!     type: AWS::ElasticLoadBalancingV2::TargetGroup
//!     inputs:
//!       Eni: { lookup: vpce, path: VpcEndpoints.*.NetworkInterfaceIds.* }
//! outputs:
//!   Eni: { lookup: vpce, path: VpcEndpoints.*.NetworkInterfaceIds.* }
//! ```

use crate::lookup::describe::{self, DescribeAdapter, DEFAULT_ID_PARAM};
use crate::lookup::{AdapterRegistry, LookupSpec};
use crate::provider::ProviderClient;
use crate::resolve::{Binding, DeferredValue, DependencyGraph, FieldPath, Realize, ResourceNode, Scalar};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Binding as written in a stack file
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged, deny_unknown_fields)]
pub enum BindingDef {
    Param { param: String },
    Lookup { lookup: String, path: String },
    Resource { resource: String, attribute: String },
    Literal(Scalar),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupDef {
    pub kind: String,
    #[serde(default)]
    pub identifiers: Vec<BindingDef>,
    #[serde(default)]
    pub filters: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub fields: Vec<String>,
    /// Query parameter carrying identifiers, for kinds without a built-in adapter
    #[serde(default)]
    pub id_param: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDef {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, BindingDef>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// Root structure of a stack file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackDef {
    #[serde(default)]
    pub parameters: BTreeMap<String, Scalar>,
    #[serde(default)]
    pub lookups: BTreeMap<String, LookupDef>,
    #[serde(default)]
    pub resources: Vec<ResourceDef>,
    #[serde(default)]
    pub outputs: BTreeMap<String, BindingDef>,
}

/// A compiled stack, ready to be planned
pub struct CompiledStack {
    pub graph: DependencyGraph,
    pub outputs: Vec<(String, Binding)>,
}

impl StackDef {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read stack file {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Invalid stack file {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse stack YAML")
    }

    /// Build the dependency graph. `overrides` replace parameter defaults.
    pub fn compile(
        &self,
        overrides: &BTreeMap<String, String>,
        realizer: Arc<dyn Realize>,
    ) -> Result<CompiledStack> {
        let mut params = self.parameters.clone();
        for (name, value) in overrides {
            if !params.contains_key(name) {
                bail!("Unknown parameter: {}", name);
            }
            params.insert(name.clone(), Scalar::from(value.as_str()));
        }
        for (name, value) in &params {
            tracing::info!("using {} {}", name, value);
        }

        let mut compiler = Compiler {
            def: self,
            params,
            lookups: HashMap::new(),
            building: Vec::new(),
        };

        let mut graph = DependencyGraph::new();
        for resource in &self.resources {
            let mut node =
                ResourceNode::new(&resource.id, &resource.resource_type, Arc::clone(&realizer));
            for (name, binding) in &resource.inputs {
                let binding = compiler
                    .binding(binding)
                    .with_context(|| format!("resource {} input {}", resource.id, name))?;
                node = node.with_input(name, binding);
            }
            for output in &resource.outputs {
                node = node.with_output(output);
            }
            graph.add_node(node)?;
        }

        let mut outputs = Vec::new();
        for (name, binding) in &self.outputs {
            let binding = compiler
                .binding(binding)
                .with_context(|| format!("output {}", name))?;
            graph.check_binding(&format!("output {}", name), &binding)?;
            outputs.push((name.clone(), binding));
        }

        Ok(CompiledStack { graph, outputs })
    }

    /// Built-in adapters plus a generic describe adapter for every other kind
    pub fn adapters(&self, client: &ProviderClient) -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        describe::register_builtin(&mut registry, client);

        for lookup in self.lookups.values() {
            if let Some(id_param) = &lookup.id_param {
                registry.register(DescribeAdapter::new(&lookup.kind, id_param, client.clone()));
            } else if !registry.contains(&lookup.kind) {
                registry.register(DescribeAdapter::new(
                    &lookup.kind,
                    DEFAULT_ID_PARAM,
                    client.clone(),
                ));
            }
        }
        registry
    }
}

struct Compiler<'a> {
    def: &'a StackDef,
    params: BTreeMap<String, Scalar>,
    lookups: HashMap<String, Arc<LookupSpec>>,
    /// Lookups currently being compiled, to catch lookup-to-lookup cycles
    building: Vec<String>,
}

impl Compiler<'_> {
    fn binding(&mut self, def: &BindingDef) -> Result<Binding> {
        let binding = match def {
            BindingDef::Literal(value) => Binding::Value(value.clone()),
            BindingDef::Param { param } => match self.params.get(param) {
                Some(value) => Binding::Value(value.clone()),
                None => bail!("Unknown parameter: {}", param),
            },
            BindingDef::Resource {
                resource,
                attribute,
            } => Binding::Deferred(DeferredValue::from_node(resource, attribute)),
            BindingDef::Lookup { lookup, path } => {
                let spec = self.lookup(lookup)?;
                let path = FieldPath::parse(path)?;
                Binding::Deferred(DeferredValue::from_lookup(spec, path))
            }
        };
        Ok(binding)
    }

    fn lookup(&mut self, name: &str) -> Result<Arc<LookupSpec>> {
        if let Some(spec) = self.lookups.get(name) {
            return Ok(Arc::clone(spec));
        }
        if let Some(start) = self.building.iter().position(|n| n == name) {
            let mut cycle = self.building[start..].to_vec();
            cycle.push(name.to_string());
            bail!("cyclic dependency between lookups: {}", cycle.join(" -> "));
        }
        let Some(def) = self.def.lookups.get(name) else {
            bail!("Unknown lookup: {}", name);
        };

        self.building.push(name.to_string());
        let mut spec = LookupSpec::new(&def.kind);
        for identifier in &def.identifiers {
            spec = spec.with_identifier(self.binding(identifier)?);
        }
        for (filter, values) in &def.filters {
            spec = spec.with_filter(filter, values.clone());
        }
        for field in &def.fields {
            let path = FieldPath::parse(field)
                .with_context(|| format!("lookup {} field {}", name, field))?;
            spec = spec.with_field(path);
        }
        self.building.pop();

        let spec = spec.shared();
        self.lookups.insert(name.to_string(), Arc::clone(&spec));
        Ok(spec)
    }
}
