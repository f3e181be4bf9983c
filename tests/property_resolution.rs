/// Property-based tests for planning and resolution
///
/// Random acyclic graphs are registered and resolved; the plan must list each
/// reachable capability once, dependencies first, and resolution must build
/// each node at most once.
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use proptest::sample::Index;
use tessera_di::{named_key_of_type, DiError, Implementation, Key, Lifetime, ServiceCollection};

struct Node;

const NAMES: [&str; 12] = [
    "n0", "n1", "n2", "n3", "n4", "n5", "n6", "n7", "n8", "n9", "n10", "n11",
];

fn node_key(i: usize) -> Key {
    named_key_of_type::<Node>(NAMES[i])
}

/// Edges only point at lower indices, so the graph is acyclic.
fn edges(raw: &[Vec<Index>]) -> Vec<Vec<usize>> {
    raw.iter()
        .enumerate()
        .map(|(i, picks)| {
            if i == 0 {
                return Vec::new();
            }
            let mut deps: Vec<usize> = picks.iter().map(|pick| pick.index(i)).collect();
            deps.sort_unstable();
            deps.dedup();
            deps
        })
        .collect()
}

fn reachable(graph: &[Vec<usize>], root: usize) -> HashSet<usize> {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if seen.insert(node) {
            stack.extend(graph[node].iter().copied());
        }
    }
    seen
}

fn register(graph: &[Vec<usize>], lifetime: Lifetime, built: &Arc<AtomicUsize>) -> ServiceCollection {
    let mut services = ServiceCollection::new();
    for (i, deps) in graph.iter().enumerate() {
        let counter = built.clone();
        services.register(
            node_key(i),
            lifetime,
            Implementation::factory::<Node, _>(deps.iter().map(|&d| node_key(d)).collect(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Node)
            }),
        );
    }
    services
}

fn graph_strategy() -> impl Strategy<Value = Vec<Vec<Index>>> {
    prop::collection::vec(prop::collection::vec(any::<Index>(), 0..4), 1..NAMES.len())
}

proptest! {
    #[test]
    fn plan_is_a_topological_order_of_reachable_nodes(raw in graph_strategy()) {
        let graph = edges(&raw);
        let root = graph.len() - 1;
        let built = Arc::new(AtomicUsize::new(0));
        let provider = register(&graph, Lifetime::Transient, &built).build();

        let plan = provider.plan(&node_key(root), None).unwrap();
        let expected = reachable(&graph, root);

        prop_assert_eq!(plan.len(), expected.len());
        prop_assert_eq!(plan.root().map(|node| node.key().clone()), Some(node_key(root)));

        let unique: HashSet<&Key> = plan.keys().into_iter().collect();
        prop_assert_eq!(unique.len(), plan.len());

        for (position, node) in plan.iter().enumerate() {
            for dependency in node.dependencies() {
                let at = plan.position(dependency);
                prop_assert!(matches!(at, Some(at) if at < position));
            }
        }
        // planning never constructs
        prop_assert_eq!(built.load(Ordering::SeqCst), 0);
    }
}

proptest! {
    #[test]
    fn transient_resolution_builds_each_node_once(raw in graph_strategy()) {
        let graph = edges(&raw);
        let root = graph.len() - 1;
        let built = Arc::new(AtomicUsize::new(0));
        let provider = register(&graph, Lifetime::Transient, &built).build();

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(provider.resolve(&node_key(root), None)).unwrap();

        prop_assert_eq!(built.load(Ordering::SeqCst), reachable(&graph, root).len());
    }
}

proptest! {
    #[test]
    fn singletons_are_built_once_across_roots(raw in graph_strategy()) {
        let graph = edges(&raw);
        let built = Arc::new(AtomicUsize::new(0));
        let provider = register(&graph, Lifetime::Singleton, &built).build();

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            for i in (0..graph.len()).rev() {
                provider.resolve(&node_key(i), None).await.unwrap();
            }
        });

        prop_assert_eq!(built.load(Ordering::SeqCst), graph.len());
        prop_assert_eq!(provider.singleton_count(), graph.len());
    }
}

proptest! {
    #[test]
    fn back_edge_to_the_root_is_reported_as_a_cycle(raw in graph_strategy()) {
        let mut graph = edges(&raw);
        let root = graph.len() - 1;
        // close a loop from the deepest reachable leaf back to the root
        let leaf = *reachable(&graph, root).iter().min().unwrap();
        graph[leaf].push(root);

        let built = Arc::new(AtomicUsize::new(0));
        let provider = register(&graph, Lifetime::Transient, &built).build();

        match provider.plan(&node_key(root), None) {
            Err(DiError::Circular(path)) => {
                prop_assert!(path.len() >= 2);
                prop_assert_eq!(path.first(), path.last());
                prop_assert!(path.contains(&node_key(root)));
            }
            other => prop_assert!(false, "expected Circular, got {:?}", other.map(|plan| plan.len())),
        }
        prop_assert_eq!(built.load(Ordering::SeqCst), 0);
    }
}
