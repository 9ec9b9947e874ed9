/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # treadle-testing
//!
//! Test utilities for code that builds on `treadle` — no on-disk state
//! store required unless the `db` feature is enabled, which pulls in the
//! full engine crate behind a separate module.
//!
//! The base module is independent of `treadle` itself: structural
//! assertions over a `petgraph` DAG (useful for checking a generator's
//! produced task-dependency shape without admitting it into a real
//! session) and a small `thiserror` taxonomy for assertion failures. The
//! `db` feature adds [`db::TestSession`], a `Session` wired to an
//! in-memory SQLite state store plus scratch-directory helpers for
//! file-dependency tests.

use petgraph::algo::is_cyclic_directed;
use petgraph::{Directed, Graph};
use thiserror::Error;

#[cfg(feature = "db")]
pub mod db;

/// Raised by the structural assertion helpers below; meant to be
/// `.unwrap()`-ed in a test, not handled.
#[derive(Error, Debug)]
pub enum AssertionError {
    #[error("expected graph to be acyclic, but it contains a cycle")]
    UnexpectedCycle,

    #[error("expected an edge {from} -> {to}, but none was declared")]
    MissingEdge { from: String, to: String },
}

/// A minimal, `treadle`-independent stand-in for a task-dependency graph:
/// node names plus declared-dependency edges (dependent -> dependency),
/// for asserting a generator's *shape* without standing up a real
/// `TaskGraph`.
#[derive(Debug, Default, Clone)]
pub struct FakeDependencyGraph {
    edges: Vec<(String, String)>,
    nodes: Vec<String>,
}

impl FakeDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `dependent` as having a task-dependency on `dependency`.
    /// Both names are added as nodes if not already present.
    pub fn edge(mut self, dependent: impl Into<String>, dependency: impl Into<String>) -> Self {
        let dependent = dependent.into();
        let dependency = dependency.into();
        if !self.nodes.contains(&dependent) {
            self.nodes.push(dependent.clone());
        }
        if !self.nodes.contains(&dependency) {
            self.nodes.push(dependency.clone());
        }
        self.edges.push((dependent, dependency));
        self
    }

    fn to_petgraph(&self) -> Graph<String, (), Directed> {
        let mut graph = Graph::<String, (), Directed>::new();
        let mut indices = std::collections::HashMap::new();
        for node in &self.nodes {
            indices.insert(node.clone(), graph.add_node(node.clone()));
        }
        for (dependent, dependency) in &self.edges {
            if let (Some(&from), Some(&to)) = (indices.get(dependent), indices.get(dependency)) {
                graph.add_edge(from, to, ());
            }
        }
        graph
    }

    /// Fails unless the declared edges form an acyclic graph.
    pub fn assert_acyclic(&self) -> Result<(), AssertionError> {
        if is_cyclic_directed(&self.to_petgraph()) {
            Err(AssertionError::UnexpectedCycle)
        } else {
            Ok(())
        }
    }

    /// Fails unless `dependent` declares a task-dependency on `dependency`.
    pub fn assert_edge(&self, dependent: &str, dependency: &str) -> Result<(), AssertionError> {
        if self
            .edges
            .iter()
            .any(|(d, dep)| d == dependent && dep == dependency)
        {
            Ok(())
        } else {
            Err(AssertionError::MissingEdge {
                from: dependent.to_string(),
                to: dependency.to_string(),
            })
        }
    }
}

/// Deep-equality assertion over two `serde_json::Value`s with a readable
/// panic message on mismatch, for comparing saved-values payloads without
/// pulling in `treadle::ValueMap` directly.
pub fn assert_value_eq(actual: &serde_json::Value, expected: &serde_json::Value) {
    assert_eq!(
        actual, expected,
        "saved value mismatch: expected {expected:?}, got {actual:?}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acyclic_graph_passes() {
        let graph = FakeDependencyGraph::new().edge("b", "a");
        graph.assert_acyclic().unwrap();
        graph.assert_edge("b", "a").unwrap();
    }

    #[test]
    fn cyclic_graph_is_detected() {
        let graph = FakeDependencyGraph::new().edge("a", "b").edge("b", "a");
        assert!(matches!(
            graph.assert_acyclic(),
            Err(AssertionError::UnexpectedCycle)
        ));
    }

    #[test]
    fn missing_edge_is_detected() {
        let graph = FakeDependencyGraph::new().edge("b", "a");
        assert!(matches!(
            graph.assert_edge("a", "b"),
            Err(AssertionError::MissingEdge { .. })
        ));
    }
}
