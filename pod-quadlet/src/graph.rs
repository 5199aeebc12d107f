//! Container dependency graph.
//!
//! Containers are nodes addressed by their index in the stack, `depends`
//! entries are edges from a container to the containers it needs. Edges to
//! names that are not declared are left out; reporting them is the job of
//! the dependency existence rule.

use std::collections::{HashMap, HashSet};

use crate::models::Stack;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

pub struct DependencyGraph<'a> {
    names: Vec<&'a str>,
    edges: Vec<Vec<usize>>,
}

impl<'a> DependencyGraph<'a> {
    pub fn new(stack: &'a Stack) -> DependencyGraph<'a> {
        let mut index = HashMap::new();
        let mut names = Vec::new();
        for container in &stack.containers {
            // Repeated names resolve to their first declaration.
            index.entry(container.name.as_str()).or_insert_with(|| {
                names.push(container.name.as_str());
                names.len() - 1
            });
        }

        let mut edges = vec![Vec::new(); names.len()];
        for container in &stack.containers {
            let from = index[container.name.as_str()];
            for dependency in &container.depends {
                if let Some(&to) = index.get(dependency.as_str()) {
                    edges[from].push(to);
                }
            }
        }

        DependencyGraph { names, edges }
    }

    /// Every dependency cycle, each one listed from its first node back to
    /// that node again, e.g. `[a, b, a]`.
    pub fn cycles(&self) -> Vec<Vec<&'a str>> {
        let mut marks = vec![Mark::Unvisited; self.names.len()];
        let mut seen = HashSet::new();
        let mut cycles = Vec::new();

        for root in 0..self.names.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }

            // (node, next edge to follow) frames of the current path.
            let mut path: Vec<(usize, usize)> = vec![(root, 0)];
            marks[root] = Mark::InProgress;

            while let Some(frame) = path.last_mut() {
                let (node, next) = *frame;
                match self.edges[node].get(next) {
                    Some(&to) => {
                        frame.1 += 1;
                        match marks[to] {
                            Mark::Unvisited => {
                                marks[to] = Mark::InProgress;
                                path.push((to, 0));
                            }
                            Mark::InProgress => {
                                let start = path
                                    .iter()
                                    .position(|&(n, _)| n == to)
                                    .unwrap_or_default();
                                let mut cycle = path[start..]
                                    .iter()
                                    .map(|&(n, _)| self.names[n])
                                    .collect::<Vec<_>>();
                                cycle.push(self.names[to]);

                                if seen.insert(canonical_key(&cycle)) {
                                    cycles.push(cycle);
                                }
                            }
                            Mark::Done => {}
                        }
                    }
                    None => {
                        marks[node] = Mark::Done;
                        path.pop();
                    }
                }
            }
        }

        cycles
    }

    /// Container names ordered so every container comes after the
    /// containers it depends on. Nodes on a cycle are emitted in declaration
    /// order once the rest of their dependencies are placed.
    pub fn start_order(&self) -> Vec<&'a str> {
        let mut marks = vec![Mark::Unvisited; self.names.len()];
        let mut order = Vec::with_capacity(self.names.len());

        for root in 0..self.names.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }

            let mut path: Vec<(usize, usize)> = vec![(root, 0)];
            marks[root] = Mark::InProgress;

            while let Some(frame) = path.last_mut() {
                let (node, next) = *frame;
                match self.edges[node].get(next) {
                    Some(&to) => {
                        frame.1 += 1;
                        if marks[to] == Mark::Unvisited {
                            marks[to] = Mark::InProgress;
                            path.push((to, 0));
                        }
                    }
                    None => {
                        marks[node] = Mark::Done;
                        order.push(self.names[node]);
                        path.pop();
                    }
                }
            }
        }

        order
    }
}

/// The same cycle found from another entry point is a rotation of the first
/// one, so rotate it to start at its smallest name before comparing.
fn canonical_key(cycle: &[&str]) -> String {
    let nodes = &cycle[..cycle.len() - 1];
    let start = nodes
        .iter()
        .enumerate()
        .min_by_key(|&(_, name)| *name)
        .map(|(i, _)| i)
        .unwrap_or_default();

    let mut rotated = nodes[start..].to_vec();
    rotated.extend_from_slice(&nodes[..start]);
    rotated.push(rotated[0]);
    rotated.join("->")
}
