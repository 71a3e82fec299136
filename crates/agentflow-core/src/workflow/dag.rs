//! Dependency resolution over the step DAG.
//!
//! Uses `petgraph` to model step dependencies as a directed graph with an
//! edge from each dependency to its dependent. Ordering is a Kahn-style
//! topological sort with a FIFO ready queue seeded in document order, so
//! the result is deterministic for a given step list.

use std::collections::{HashMap, VecDeque};

use agentflow_types::workflow::StepDefinition;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use super::definition::WorkflowError;

/// Orders steps and groups them into parallelizable levels.
pub struct DependencyResolver;

impl DependencyResolver {
    /// Topologically order `steps`.
    ///
    /// Every step appears exactly once and after all of its dependencies.
    /// Ties are broken by document order of the initially ready steps, then
    /// by discovery order.
    pub fn resolve(steps: &[StepDefinition]) -> Result<Vec<&StepDefinition>, WorkflowError> {
        let graph = build_graph(steps)?;

        let mut in_degree: Vec<usize> = graph
            .node_indices()
            .map(|n| graph.edges_directed(n, Direction::Incoming).count())
            .collect();

        let mut ready: VecDeque<NodeIndex> = graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .collect();

        let mut ordered = Vec::with_capacity(steps.len());
        while let Some(node) = ready.pop_front() {
            ordered.push(&steps[graph[node]]);

            // petgraph yields neighbors newest-edge first; use document order instead.
            let mut dependents: Vec<NodeIndex> = graph
                .neighbors_directed(node, Direction::Outgoing)
                .collect();
            dependents.sort_unstable();
            dependents.dedup();

            for dependent in dependents {
                let edges = graph.edges_connecting(node, dependent).count();
                let degree = &mut in_degree[dependent.index()];
                *degree -= edges;
                if *degree == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        if ordered.len() < steps.len() {
            let stuck: Vec<&str> = graph
                .node_indices()
                .filter(|n| in_degree[n.index()] > 0)
                .map(|n| steps[graph[n]].id.as_str())
                .collect();
            return Err(WorkflowError::CycleDetected(format!(
                "circular dependency among steps: {}",
                stuck.join(", ")
            )));
        }

        Ok(ordered)
    }

    /// Group steps into levels for a parallel scheduler.
    ///
    /// A step's level is 0 without dependencies, else one more than the
    /// highest level among its dependencies. Levels are emitted in ascending
    /// order; within a level steps follow the resolved order.
    pub fn execution_levels(
        steps: &[StepDefinition],
    ) -> Result<Vec<Vec<&StepDefinition>>, WorkflowError> {
        let ordered = Self::resolve(steps)?;

        let mut levels_by_id: HashMap<&str, usize> = HashMap::with_capacity(ordered.len());
        let mut levels: Vec<Vec<&StepDefinition>> = Vec::new();
        for step in ordered {
            let level = step
                .depends_on
                .iter()
                .filter_map(|dep| levels_by_id.get(dep.as_str()))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            levels_by_id.insert(step.id.as_str(), level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(step);
        }

        Ok(levels)
    }
}

/// Graph whose node weights are indices into `steps`.
fn build_graph(steps: &[StepDefinition]) -> Result<DiGraph<usize, ()>, WorkflowError> {
    let id_to_idx: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut graph = DiGraph::<usize, ()>::with_capacity(steps.len(), steps.len());
    let nodes: Vec<NodeIndex> = (0..steps.len()).map(|i| graph.add_node(i)).collect();

    for (to_idx, step) in steps.iter().enumerate() {
        for dep in &step.depends_on {
            let from_idx = id_to_idx.get(dep.as_str()).ok_or_else(|| {
                WorkflowError::UnknownDependency(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.id, dep
                ))
            })?;
            graph.add_edge(nodes[*from_idx], nodes[to_idx], ());
        }
    }

    Ok(graph)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
