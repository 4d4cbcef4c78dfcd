//! Dependency graph algorithms over plain string identifiers.
//!
//! The graph maps each module to the set of modules it depends on. Every
//! dependency must also appear as a key.
use std::collections::{BTreeMap, BTreeSet};

pub type DependencyGraph = BTreeMap<String, BTreeSet<String>>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Find the first cycle reachable by a depth-first walk in name order.
///
/// The returned path starts and ends with the same module, e.g. `[A, B, A]`.
pub fn find_cycle(graph: &DependencyGraph) -> Option<Vec<String>> {
    let mut colors: BTreeMap<&str, Color> = graph
        .keys()
        .map(|name| (name.as_str(), Color::White))
        .collect();
    let mut stack: Vec<&str> = Vec::new();
    for name in graph.keys() {
        if colors.get(name.as_str()) == Some(&Color::White) {
            if let Some(cycle) = visit(graph, name, &mut colors, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit<'g>(
    graph: &'g DependencyGraph,
    node: &'g str,
    colors: &mut BTreeMap<&'g str, Color>,
    stack: &mut Vec<&'g str>,
) -> Option<Vec<String>> {
    colors.insert(node, Color::Gray);
    stack.push(node);
    for dep in graph.get(node).into_iter().flatten() {
        match colors.get(dep.as_str()).copied().unwrap_or(Color::Black) {
            Color::Gray => {
                let start = stack.iter().position(|entry| *entry == dep.as_str())?;
                let mut cycle: Vec<String> =
                    stack[start..].iter().map(|entry| entry.to_string()).collect();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            Color::White => {
                if let Some(cycle) = visit(graph, dep, colors, stack) {
                    return Some(cycle);
                }
            }
            Color::Black => {}
        }
    }
    stack.pop();
    colors.insert(node, Color::Black);
    None
}

/// Order modules so each one follows all of its dependencies.
///
/// Kahn's algorithm; among modules that become eligible together the lower
/// `hint` wins, then the lexicographically smaller name. Returns the modules
/// left unordered when the graph has a cycle.
pub fn topological_order<F>(graph: &DependencyGraph, hint: F) -> Result<Vec<String>, Vec<String>>
where
    F: Fn(&str) -> i64,
{
    let mut remaining: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, deps) in graph {
        remaining.insert(name.as_str(), deps.len());
        for dep in deps {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(name.as_str());
        }
    }

    let mut ready: BTreeSet<(i64, &str)> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| (hint(*name), *name))
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(next) = ready.pop_first() {
        let (_, name) = next;
        order.push(name.to_string());
        for &dependent in dependents.get(name).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.insert((hint(dependent), dependent));
                }
            }
        }
    }

    if order.len() != graph.len() {
        let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        let stuck = graph
            .keys()
            .filter(|name| !placed.contains(name.as_str()))
            .cloned()
            .collect();
        return Err(stuck);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (name, deps) in edges {
            graph
                .entry(name.to_string())
                .or_default()
                .extend(deps.iter().map(|dep| dep.to_string()));
            for dep in deps.iter() {
                graph.entry(dep.to_string()).or_default();
            }
        }
        graph
    }

    #[test]
    fn two_node_cycle_reports_full_path() {
        let g = graph(&[("A", &["B"]), ("B", &["A"])]);
        assert_eq!(
            find_cycle(&g),
            Some(vec!["A".to_string(), "B".to_string(), "A".to_string()])
        );
    }

    #[test]
    fn cycle_path_excludes_acyclic_prefix() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["d"]), ("d", &["b"])]);
        assert_eq!(
            find_cycle(&g),
            Some(vec![
                "b".to_string(),
                "c".to_string(),
                "d".to_string(),
                "b".to_string()
            ])
        );
    }

    #[test]
    fn diamond_has_no_cycle() {
        let g = graph(&[("d", &["b", "c"]), ("b", &["a"]), ("c", &["a"])]);
        assert_eq!(find_cycle(&g), None);
    }

    #[test]
    fn ties_break_on_hint_then_name() {
        let g = graph(&[("zeta", &[]), ("alpha", &[]), ("mid", &[])]);
        let hints = |name: &str| if name == "zeta" { -1 } else { 0 };
        let order = topological_order(&g, hints).expect("acyclic");
        assert_eq!(order, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn dependencies_always_precede_dependents() {
        let g = graph(&[
            ("render", &["parse", "lint"]),
            ("lint", &["parse"]),
            ("parse", &[]),
            ("publish", &["render"]),
        ]);
        let order = topological_order(&g, |_| 0).expect("acyclic");
        let position = |name: &str| order.iter().position(|n| n == name).expect("placed");
        for (name, deps) in &g {
            for dep in deps {
                assert!(
                    position(dep.as_str()) < position(name.as_str()),
                    "{dep} must precede {name}"
                );
            }
        }
    }

    #[test]
    fn cyclic_graph_returns_stuck_modules() {
        let g = graph(&[("a", &[]), ("b", &["c"]), ("c", &["b"])]);
        let stuck = topological_order(&g, |_| 0).expect_err("cycle");
        assert_eq!(stuck, vec!["b".to_string(), "c".to_string()]);
    }
}
