//! Backend priority resolution.
//!
//! Backends are ranked once, at system construction, by pairwise
//! comparison (order overrides > declared higher/lower priority >
//! type specificity > undetermined) followed by a depth-first
//! topological sort.
//!
//! The sort visits nodes in a fixed input order — the fallback backend
//! first, then concrete-primary backends in registration order, then
//! abstract-primary ones — so that pairs with no derivable order keep
//! their registration order. Plain structural sorts do not guarantee
//! that, and would make priorities drift across equivalent inputs.

use crate::error::BuildError;
use backplane_core::{Backend, DEFAULT_BACKEND};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Manual order overrides: name -> set of names it must outrank.
pub(crate) type OverrideMap = HashMap<String, HashSet<String>>;

/// Pairwise priority between two backends. Positive means `a` outranks
/// `b`, zero means no derivable order.
///
/// Override-map entries win unconditionally. Otherwise both directional
/// signals are consulted; equal strengths in conflicting directions are
/// an authoring bug and fail the build.
pub(crate) fn compare_backends(
    a: &Backend,
    b: &Backend,
    overrides: &OverrideMap,
) -> Result<i8, BuildError> {
    if overrides.get(a.name()).is_some_and(|o| o.contains(b.name())) {
        return Ok(3);
    }
    if overrides.get(b.name()).is_some_and(|o| o.contains(a.name())) {
        return Ok(-3);
    }

    let fwd = a.compare_with(b);
    let rev = b.compare_with(a);
    match (fwd, rev) {
        (None, None) => Ok(0),
        (Some(f), None) => Ok(f),
        (None, Some(r)) => Ok(-r),
        (Some(f), Some(r)) if f == r => Err(BuildError::InconsistentPriorities {
            a: a.name().to_string(),
            b: b.name().to_string(),
        }),
        // The stronger signal wins outright (declared beats specificity).
        (Some(f), Some(r)) => Ok(if f > r { f } else { -r }),
    }
}

/// Produce the total priority order over all registered backends.
pub(crate) fn resolve_order(
    backends: &IndexMap<String, Backend>,
    overrides: &OverrideMap,
) -> Result<Vec<String>, BuildError> {
    // Fixed visit order, see module docs.
    let mut graph: IndexMap<String, Vec<String>> = IndexMap::with_capacity(backends.len());
    if backends.contains_key(DEFAULT_BACKEND) {
        graph.insert(DEFAULT_BACKEND.to_string(), Vec::new());
    }
    for (name, backend) in backends {
        if !backend.primary_types().is_abstract() {
            graph.entry(name.clone()).or_default();
        }
    }
    for (name, backend) in backends {
        if backend.primary_types().is_abstract() {
            graph.entry(name.clone()).or_default();
        }
    }

    // Edge "x depends on y" = y must be ordered before x. Every
    // unordered pair is compared exactly once.
    let names: Vec<String> = graph.keys().cloned().collect();
    for (i, a) in names.iter().enumerate() {
        for b in &names[i + 1..] {
            let (Some(ba), Some(bb)) = (backends.get(a), backends.get(b)) else {
                continue;
            };
            let cmp = compare_backends(ba, bb, overrides)?;
            if cmp < 0 {
                if let Some(deps) = graph.get_mut(a) {
                    deps.push(b.clone());
                }
            } else if cmp > 0 {
                if let Some(deps) = graph.get_mut(b) {
                    deps.push(a.clone());
                }
            }
        }
    }

    toposort(&graph)
}

fn toposort(graph: &IndexMap<String, Vec<String>>) -> Result<Vec<String>, BuildError> {
    fn visit(
        node: &str,
        graph: &IndexMap<String, Vec<String>>,
        order: &mut Vec<String>,
        done: &mut HashSet<String>,
        visiting: &mut Vec<String>,
    ) -> Result<(), BuildError> {
        if done.contains(node) {
            return Ok(());
        }
        if let Some(pos) = visiting.iter().position(|v| v == node) {
            let mut chain = visiting[pos..].to_vec();
            chain.push(node.to_string());
            let suggestion = format!("{}>{}", chain[0], chain[1]);
            return Err(BuildError::PriorityCycle { chain, suggestion });
        }

        visiting.push(node.to_string());
        for dep in graph.get(node).map(Vec::as_slice).unwrap_or(&[]) {
            visit(dep, graph, order, done, visiting)?;
        }
        visiting.pop();

        done.insert(node.to_string());
        order.push(node.to_string());
        Ok(())
    }

    let mut order = Vec::with_capacity(graph.len());
    let mut done = HashSet::with_capacity(graph.len());
    let mut visiting = Vec::new();
    for node in graph.keys() {
        visit(node, graph, &mut order, &mut done, &mut visiting)?;
    }
    Ok(order)
}
