//! Property-based tests using proptest
//!
//! These tests check apply ordering and cycle reporting on randomized
//! graphs, field extraction, the per-run lookup cache and retry budgets.

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::{json, Value};
use stackwire::lookup::LookupKey;
use stackwire::provider::ProviderError;
use stackwire::resolve::cache::LookupCache;
use stackwire::resolve::{
    extract, Attributes, DeferredValue, DependencyGraph, ExtractError, FailureKind, FieldPath,
    GraphError, Realize, ResourceNode, RetryPolicy, Scalar,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

struct Noop;

#[async_trait]
impl Realize for Noop {
    async fn realize(
        &self,
        _node: &ResourceNode,
        _inputs: &BTreeMap<String, Scalar>,
    ) -> Result<Attributes, ProviderError> {
        Ok(Attributes::new())
    }
}

fn name(i: usize) -> String {
    format!("n{}", i)
}

/// Build a graph from `deps[i]` (the nodes node i depends on), declaring
/// nodes in `declared` order
fn graph_of(deps: &[BTreeSet<usize>], declared: &[usize]) -> DependencyGraph {
    let realizer: Arc<dyn Realize> = Arc::new(Noop);
    let mut graph = DependencyGraph::new();
    for &i in declared {
        let mut node =
            ResourceNode::new(name(i), "Test::Node", Arc::clone(&realizer)).with_output("out");
        for &j in &deps[i] {
            node = node.with_input(format!("in{}", j), DeferredValue::from_node(name(j), "out"));
        }
        graph.add_node(node).expect("unique ids");
    }
    graph
}

/// Random DAG: node i may depend on any j < i. Declared in shuffled order.
fn arb_dag() -> impl Strategy<Value = (Vec<BTreeSet<usize>>, Vec<usize>)> {
    (1usize..12).prop_flat_map(|n| {
        (
            prop::collection::vec(any::<bool>(), n * n),
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
        )
            .prop_map(move |(edges, declared)| {
                let deps = (0..n)
                    .map(|i| (0..i).filter(|&j| edges[i * n + j]).collect())
                    .collect();
                (deps, declared)
            })
    })
}

/// Random DAG plus a ring over the first `k` nodes (k == 1 is a self-reference)
fn arb_cyclic() -> impl Strategy<Value = (Vec<BTreeSet<usize>>, Vec<usize>)> {
    arb_dag().prop_flat_map(|(deps, declared)| {
        let n = deps.len();
        (1..=n).prop_map(move |k| {
            let mut deps = deps.clone();
            for (i, d) in deps.iter_mut().enumerate().take(k) {
                d.insert((i + 1) % k);
            }
            (deps, declared.clone())
        })
    })
}

proptest! {
    /// Every node comes after everything it depends on
    #[test]
    fn plan_respects_dependencies((deps, declared) in arb_dag()) {
        let plan = graph_of(&deps, &declared).build().expect("acyclic");
        let order = plan.order();
        prop_assert_eq!(order.len(), deps.len());

        let position = |i: usize| order.iter().position(|o| *o == name(i)).expect("planned");
        for (i, producers) in deps.iter().enumerate() {
            for &j in producers {
                prop_assert!(position(j) < position(i), "{} must precede {}", name(j), name(i));
            }
            let listed: HashSet<String> = plan.dependencies_of(&name(i)).into_iter().map(str::to_string).collect();
            let expected: HashSet<String> = producers.iter().map(|&j| name(j)).collect();
            prop_assert_eq!(listed, expected);
        }
    }

    /// The same graph always yields the same order
    #[test]
    fn plan_is_deterministic((deps, declared) in arb_dag()) {
        let graph = graph_of(&deps, &declared);
        let first: Vec<String> = graph.build().expect("acyclic").order().into_iter().map(str::to_string).collect();
        let second: Vec<String> = graph.build().expect("acyclic").order().into_iter().map(str::to_string).collect();
        prop_assert_eq!(first, second);
    }

    /// Cycles are rejected and the reported path is a real cycle
    #[test]
    fn cycle_is_reported_with_real_edges((deps, declared) in arb_cyclic()) {
        let cycle = match graph_of(&deps, &declared).build() {
            Err(GraphError::CyclicDependency { cycle }) => cycle,
            other => return Err(TestCaseError::fail(format!("expected a cycle, got {:?}", other.map(|p| p.len())))),
        };

        prop_assert!(cycle.len() >= 2);
        prop_assert_eq!(cycle.first(), cycle.last());
        let index = |id: &str| id[1..].parse::<usize>().expect("node name");
        for pair in cycle.windows(2) {
            let (consumer, producer) = (index(&pair[0]), index(&pair[1]));
            prop_assert!(deps[consumer].contains(&producer), "{} does not depend on {}", pair[0], pair[1]);
        }
    }
}

mod extraction_tests {
    use super::*;

    proptest! {
        /// A single-element wildcard reads the element; repeated reads agree
        #[test]
        fn single_element_wildcard(value in "[A-Za-z0-9.-]{1,30}") {
            let document = json!({"Items": [{"Value": value}]});
            let path = FieldPath::parse("Items.*.Value").expect("valid path");

            let first = extract(&path, &document).expect("present");
            let second = extract(&path, &document).expect("present");
            prop_assert_eq!(&first, &Scalar::from(value.as_str()));
            prop_assert_eq!(first, second);
        }

        /// More than one element under a wildcard is ambiguous
        #[test]
        fn many_elements_are_ambiguous(values in prop::collection::vec("[a-z]{1,8}", 2..6)) {
            let items: Vec<Value> = values.iter().map(|v| json!({"Value": v})).collect();
            let document = json!({"Items": items});
            let path = FieldPath::parse("Items.*.Value").expect("valid path");

            let count = match extract(&path, &document) {
                Err(ExtractError::Ambiguous { count, .. }) => count,
                other => return Err(TestCaseError::fail(format!("expected Ambiguous, got {:?}", other))),
            };
            prop_assert_eq!(count, values.len());
        }

        /// Numeric segments index directly
        #[test]
        fn numeric_index_selects_element(values in prop::collection::vec(any::<i64>(), 1..6), pick in any::<prop::sample::Index>()) {
            let i = pick.index(values.len());
            let document = json!({"Items": values});
            let path = FieldPath::parse(&format!("Items.{}", i)).expect("valid path");
            prop_assert_eq!(extract(&path, &document).expect("present"), Scalar::from(values[i]));
        }
    }
}

mod cache_tests {
    use super::*;

    fn key(id: &str) -> LookupKey {
        LookupKey {
            kind: "describe-x".into(),
            identifiers: vec![id.into()],
            filters: BTreeMap::new(),
        }
    }

    proptest! {
        /// Each distinct key executes exactly once per cache
        #[test]
        fn executes_once_per_key(ids in prop::collection::vec("[a-d]", 0..30)) {
            let cache = LookupCache::new();
            let results: Vec<Value> = tokio_test::block_on(async {
                let mut results = Vec::new();
                for id in &ids {
                    let outcome = cache
                        .get_or_execute(&key(id), || async { Ok(Arc::new(json!(id))) })
                        .await;
                    results.push(outcome.map(|v| (*v).clone()).unwrap_or(Value::Null));
                }
                results
            });

            let distinct: HashSet<&String> = ids.iter().collect();
            prop_assert_eq!(cache.executions(), distinct.len());
            for (id, result) in ids.iter().zip(results) {
                prop_assert_eq!(result, json!(id));
            }
        }
    }
}

mod retry_tests {
    use super::*;

    proptest! {
        /// Succeeds iff the transient failures fit in the retry budget
        #[test]
        fn budget_decides_outcome(failures in 0u32..6, budget in 0u32..6) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .expect("runtime");
            let calls = AtomicU32::new(0);
            let policy = RetryPolicy::immediate(budget);

            let outcome = runtime.block_on(policy.run("prop", || async {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                if call < failures {
                    Err(ProviderError::Transient("throttled".into()))
                } else {
                    Ok(call)
                }
            }));

            if failures <= budget {
                prop_assert_eq!(outcome, Ok(failures));
                prop_assert_eq!(calls.load(Ordering::SeqCst), failures + 1);
            } else {
                prop_assert_eq!(
                    outcome,
                    Err(FailureKind::RetriesExhausted { attempts: budget + 1, message: "throttled".into() })
                );
                prop_assert_eq!(calls.load(Ordering::SeqCst), budget + 1);
            }
        }
    }
}
