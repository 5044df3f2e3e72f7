//! Resolution Engine
//!
//! Walks a [`Plan`], resolving each node's deferred inputs on demand,
//! realizing the node, then making its attributes available to consumers.
//!
//! Each call to [`ResolutionEngine::run`] is a fresh run with its own lookup
//! cache, so re-running an engine re-reads current external state.

use super::cache::LookupCache;
use super::graph::{Attributes, Plan, ResourceNode};
use super::path::{self, ExtractError};
use super::report::{
    Failure, FailureKind, NodeReport, NodeState, Origin, RunReport, RunState, SkipReason,
};
use super::retry::RetryPolicy;
use super::value::{Binding, DeferredValue, NodeId, Scalar, Source};
use crate::lookup::{AdapterRegistry, LookupKey, LookupRequest, LookupSpec};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

/// Tuning for a run
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub retry: RetryPolicy,
    /// Upper bound on nodes being realized at once (minimum 1)
    pub max_concurrency: usize,
    /// Stop scheduling any new node after the first failure. When false,
    /// only dependents of a failed node are skipped.
    pub fail_fast: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_concurrency: 1,
            fail_fast: true,
        }
    }
}

/// State shared by the tasks of a single run
struct RunContext {
    adapters: AdapterRegistry,
    retry: RetryPolicy,
    cache: LookupCache,
    realized: RwLock<HashMap<NodeId, Arc<Attributes>>>,
}

impl RunContext {
    /// `trail` holds the `node.attribute` steps already being followed
    fn resolve_binding<'a>(
        &'a self,
        binding: &'a Binding,
        trail: &'a [String],
    ) -> BoxFuture<'a, Result<Scalar, Failure>> {
        async move {
            match binding {
                Binding::Value(value) => Ok(value.clone()),
                Binding::Deferred(deferred) => self.resolve_deferred(deferred, trail).await,
            }
        }
        .boxed()
    }

    async fn resolve_deferred(
        &self,
        value: &DeferredValue,
        trail: &[String],
    ) -> Result<Scalar, Failure> {
        match value.source() {
            Source::Lookup { spec, .. } => {
                let (key, document) = self.lookup(spec, trail).await?;
                path::resolve(value, &document).map_err(|e| Failure::lookup(&key, e.into()))
            }
            Source::Node { node, attribute } => {
                let step = format!("{}.{}", node, attribute);
                if let Some(start) = trail.iter().position(|t| *t == step) {
                    let mut chain = trail[start..].to_vec();
                    chain.push(step);
                    return Err(Failure::node(node, FailureKind::CyclicAttribute { chain }));
                }

                let attributes = self.realized.read().await.get(node).cloned();
                let Some(attributes) = attributes else {
                    return Err(Failure::node(
                        node,
                        FailureKind::EarlyRead {
                            value: value.describe(),
                        },
                    ));
                };
                let Some(binding) = attributes.get(attribute) else {
                    return Err(Failure::node(
                        node,
                        ExtractError::FieldNotFound {
                            path: attribute.clone(),
                            at: attribute.clone(),
                        }
                        .into(),
                    ));
                };

                let mut trail = trail.to_vec();
                trail.push(step);
                self.resolve_binding(binding, &trail).await
            }
        }
    }

    /// Resolve the lookup's identifiers, then fetch its document through the cache
    async fn lookup(
        &self,
        spec: &LookupSpec,
        trail: &[String],
    ) -> Result<(LookupKey, Arc<Value>), Failure> {
        let mut identifiers = Vec::with_capacity(spec.identifiers().len());
        for identifier in spec.identifiers() {
            identifiers.push(self.resolve_binding(identifier, trail).await?.to_string());
        }

        let key = LookupKey {
            kind: spec.kind().to_string(),
            identifiers,
            filters: spec.filters().clone(),
        };

        let Some(adapter) = self.adapters.get(spec.kind()) else {
            return Err(Failure::lookup(
                &key,
                FailureKind::UnknownKind {
                    kind: spec.kind().to_string(),
                },
            ));
        };

        let request = LookupRequest {
            key: key.clone(),
            fields: spec.fields().to_vec(),
        };
        let label = key.to_string();

        let outcome = self
            .cache
            .get_or_execute(&key, || async {
                tracing::debug!("executing lookup {}", label);
                self.retry
                    .run(&label, || adapter.execute(&request))
                    .await
                    .map(Arc::new)
            })
            .await;

        match outcome {
            Ok(document) => Ok((key, document)),
            Err(kind) => Err(Failure::lookup(&key, kind)),
        }
    }

    async fn realize(&self, node: &ResourceNode) -> Result<(), Failure> {
        let mut inputs = BTreeMap::new();
        for (name, binding) in node.inputs() {
            let value = self.resolve_binding(binding, &[]).await?;
            inputs.insert(name.clone(), value);
        }

        tracing::info!("realizing {} ({})", node.id(), node.resource_type());
        let realizer = node.realizer();
        let inputs = &inputs;
        let attributes = self
            .retry
            .run(node.id(), move || realizer.realize(node, inputs))
            .await
            .map_err(|kind| Failure::node(node.id(), kind))?;

        if let Some(missing) = node.outputs().iter().find(|o| !attributes.contains_key(*o)) {
            return Err(Failure::node(
                node.id(),
                ExtractError::FieldNotFound {
                    path: missing.clone(),
                    at: missing.clone(),
                }
                .into(),
            ));
        }

        self.realized
            .write()
            .await
            .insert(node.id().clone(), Arc::new(attributes));
        Ok(())
    }
}

/// Owns a plan, its adapters and the state of the latest run
pub struct ResolutionEngine {
    plan: Plan,
    outputs: Vec<(String, Binding)>,
    adapters: AdapterRegistry,
    options: EngineOptions,
    state: RunState,
}

impl ResolutionEngine {
    pub fn new(plan: Plan, adapters: AdapterRegistry, options: EngineOptions) -> Self {
        Self {
            plan,
            outputs: Vec::new(),
            adapters,
            options,
            state: RunState::Pending,
        }
    }

    /// Stack outputs, resolved after every node has been realized
    pub fn with_outputs(mut self, outputs: Vec<(String, Binding)>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute one run against current external state
    pub async fn run(&mut self) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", id = %run_id);
        let started_at = chrono::Utc::now().to_rfc3339();

        self.state = RunState::Resolving;
        let ctx = Arc::new(RunContext {
            adapters: self.adapters.clone(),
            retry: self.options.retry.clone(),
            cache: LookupCache::new(),
            realized: RwLock::new(HashMap::new()),
        });

        let (states, realized) = self.schedule(&ctx).instrument(span.clone()).await;

        let mut outputs = BTreeMap::new();
        let mut output_failures = Vec::new();
        let all_resolved = states.iter().all(|s| *s == NodeState::Resolved);
        if all_resolved {
            for (name, binding) in &self.outputs {
                match ctx.resolve_binding(binding, &[]).instrument(span.clone()).await {
                    Ok(value) => {
                        outputs.insert(name.clone(), value);
                    }
                    Err(failure) => {
                        tracing::error!(parent: &span, "output {} failed: {}", name, failure);
                        output_failures.push(Failure {
                            origin: Origin::Output(name.clone()),
                            kind: failure.kind,
                        });
                    }
                }
            }
        }

        self.state = if all_resolved && output_failures.is_empty() {
            RunState::Resolved
        } else {
            RunState::Failed
        };
        tracing::info!(parent: &span, "run finished: {:?}", self.state);

        RunReport {
            run_id: run_id.to_string(),
            state: self.state,
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            nodes: self
                .plan
                .nodes()
                .iter()
                .zip(states)
                .map(|(planned, state)| NodeReport {
                    id: planned.node.id().clone(),
                    state,
                })
                .collect(),
            realized,
            outputs,
            output_failures,
            lookup_executions: ctx.cache.executions(),
        }
    }

    /// Realize nodes as their dependencies complete. Returns each node's
    /// terminal state (in plan order) and the completion order.
    async fn schedule(&self, ctx: &Arc<RunContext>) -> (Vec<NodeState>, Vec<NodeId>) {
        let nodes = self.plan.nodes();
        let count = nodes.len();
        let limit = self.options.max_concurrency.max(1);

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut waiting: Vec<usize> = vec![0; count];
        for (i, planned) in nodes.iter().enumerate() {
            waiting[i] = planned.depends_on.len();
            for &d in &planned.depends_on {
                dependents[d].push(i);
            }
        }

        let mut states: Vec<Option<NodeState>> = vec![None; count];
        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| waiting[i] == 0).collect();
        let mut in_flight = JoinSet::new();
        let mut task_index = HashMap::new();
        let mut realized = Vec::new();
        let mut halted = false;

        tracing::info!("resolving {} node(s), concurrency {}", count, limit);

        loop {
            while !halted && in_flight.len() < limit {
                let Some(next) = ready.pop_first() else {
                    break;
                };
                let ctx = Arc::clone(ctx);
                let node = Arc::clone(&nodes[next].node);
                let handle = in_flight.spawn(
                    async move { ctx.realize(&node).await }.in_current_span(),
                );
                task_index.insert(handle.id(), next);
            }

            let Some(joined) = in_flight.join_next_with_id().await else {
                break;
            };

            let (idx, outcome) = match joined {
                Ok((id, outcome)) => (task_index[&id], outcome),
                Err(err) => {
                    let idx = task_index[&err.id()];
                    let failure = Failure::node(
                        nodes[idx].node.id(),
                        FailureKind::Permanent {
                            message: format!("realization task aborted: {}", err),
                        },
                    );
                    (idx, Err(failure))
                }
            };

            let id = nodes[idx].node.id().clone();
            match outcome {
                Ok(()) => {
                    tracing::info!("{} resolved", id);
                    states[idx] = Some(NodeState::Resolved);
                    realized.push(id);
                    for &consumer in &dependents[idx] {
                        waiting[consumer] -= 1;
                        if waiting[consumer] == 0 && states[consumer].is_none() {
                            ready.insert(consumer);
                        }
                    }
                }
                Err(failure) => {
                    tracing::error!("{} failed: {}", id, failure);
                    states[idx] = Some(NodeState::Failed { failure });
                    skip_dependents(idx, &id, &dependents, &mut states);
                    if self.options.fail_fast && !halted {
                        tracing::warn!("halting: no new nodes will be scheduled");
                        halted = true;
                    }
                }
            }
        }

        let states = states
            .into_iter()
            .map(|s| {
                s.unwrap_or(NodeState::Skipped {
                    reason: SkipReason::Halted,
                })
            })
            .collect();
        (states, realized)
    }
}

/// Mark every transitive dependent of `failed` as skipped
fn skip_dependents(
    failed: usize,
    failed_id: &NodeId,
    dependents: &[Vec<usize>],
    states: &mut [Option<NodeState>],
) {
    let mut stack = dependents[failed].clone();
    while let Some(next) = stack.pop() {
        if states[next].is_some() {
            continue;
        }
        states[next] = Some(NodeState::Skipped {
            reason: SkipReason::UpstreamFailed(failed_id.clone()),
        });
        stack.extend(dependents[next].iter().copied());
    }
}
