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

//! # Task graph
//!
//! Tracks admitted tasks, their task-dependency edges, and admission order,
//! and answers readiness/ordering questions for the executor and controller.
//! Dependency relationships are expressed as a directed graph (edge: task ->
//! task-dependency) with cycle detection and topological sort via `petgraph`,
//! ties broken by first-admitted order as `spec.md` §4.3 requires.

use std::collections::{HashMap, HashSet};

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::{Directed, Graph};

use crate::capability::MatchStrategy;
use crate::error::ConfigError;
use crate::task::{Task, TaskStatus};

struct AdmittedTask {
    task: Task,
    status: TaskStatus,
    admitted_order: usize,
}

/// Admitted-task table plus task-dependency graph for one session.
pub struct TaskGraph {
    tasks: HashMap<String, AdmittedTask>,
    next_order: usize,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            next_order: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name).map(|t| &t.task)
    }

    pub fn status(&self, name: &str) -> Option<TaskStatus> {
        self.tasks.get(name).map(|t| t.status)
    }

    pub fn set_status(&mut self, name: &str, status: TaskStatus) {
        if let Some(t) = self.tasks.get_mut(name) {
            t.status = status;
        }
    }

    pub fn admitted_order(&self, name: &str) -> Option<usize> {
        self.tasks.get(name).map(|t| t.admitted_order)
    }

    /// Admits a new task, rejecting a duplicate name (§3 invariant).
    pub fn admit(&mut self, task: Task) -> Result<(), ConfigError> {
        if self.tasks.contains_key(task.name()) {
            return Err(ConfigError::DuplicateTask(task.name().to_string()));
        }
        let order = self.next_order;
        self.next_order += 1;
        self.tasks.insert(
            task.name().to_string(),
            AdmittedTask {
                task,
                status: TaskStatus::Pending,
                admitted_order: order,
            },
        );
        Ok(())
    }

    /// Replaces an already-admitted task's definition in place, preserving
    /// its admission order (used by the controller's UPDATE outcome).
    pub fn replace(&mut self, task: Task) -> Result<(), ConfigError> {
        let existing = self
            .tasks
            .get(task.name())
            .ok_or_else(|| ConfigError::UnknownTask(task.name().to_string()))?;
        let order = existing.admitted_order;
        self.tasks.insert(
            task.name().to_string(),
            AdmittedTask {
                task,
                status: TaskStatus::Pending,
                admitted_order: order,
            },
        );
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.tasks.keys()
    }

    fn petgraph(&self) -> (Graph<String, (), Directed>, HashMap<String, petgraph::graph::NodeIndex>) {
        let mut graph = Graph::<String, (), Directed>::new();
        let mut indices = HashMap::new();
        for name in self.tasks.keys() {
            indices.insert(name.clone(), graph.add_node(name.clone()));
        }
        for (name, entry) in &self.tasks {
            let deps: Vec<String> = entry
                .task
                .task_deps()
                .iter()
                .chain(entry.task.setup_tasks().iter())
                .cloned()
                .collect();
            for dep in deps {
                if let (Some(&from), Some(&to)) = (indices.get(dep.as_str()), indices.get(name.as_str())) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        (graph, indices)
    }

    pub fn has_cycles(&self) -> bool {
        let (graph, _) = self.petgraph();
        is_cyclic_directed(&graph)
    }

    fn find_cycle(&self) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        let mut path = Vec::new();
        for name in self.tasks.keys() {
            if !visited.contains(name) {
                if let Some(cycle) = self.dfs_cycle(name, &mut visited, &mut stack, &mut path) {
                    return cycle;
                }
            }
        }
        Vec::new()
    }

    fn dfs_cycle(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(name.to_string());
        stack.insert(name.to_string());
        path.push(name.to_string());

        if let Some(entry) = self.tasks.get(name) {
            let deps = entry
                .task
                .task_deps()
                .iter()
                .chain(entry.task.setup_tasks().iter());
            for dep in deps {
                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_cycle(dep, visited, stack, path) {
                        return Some(cycle);
                    }
                } else if stack.contains(dep) {
                    let start = path.iter().position(|x| x == dep).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
            }
        }

        stack.remove(name);
        path.pop();
        None
    }

    /// Topological order, ties broken by admission order.
    pub fn topological_sort(&self) -> Result<Vec<String>, ConfigError> {
        let (graph, _) = self.petgraph();
        match toposort(&graph, None) {
            Ok(sorted) => {
                let mut names: Vec<String> = sorted.into_iter().map(|idx| graph[idx].clone()).collect();
                names.sort_by_key(|n| self.admitted_order(n).unwrap_or(usize::MAX));
                // Stable topo-sort result reordered by admission within
                // equal-depth groups: recompute via execution levels so
                // ties are genuinely broken by admission order, not an
                // artifact of HashMap iteration order feeding petgraph.
                let levels = self.execution_levels_from_order(&names)?;
                Ok(levels.into_iter().flatten().collect())
            }
            Err(_) => Err(ConfigError::CyclicDependency {
                cycle: self.find_cycle().join(" -> "),
            }),
        }
    }

    fn execution_levels_from_order(&self, topo_order: &[String]) -> Result<Vec<Vec<String>>, ConfigError> {
        let mut levels: Vec<Vec<String>> = Vec::new();
        let mut remaining: HashSet<String> = topo_order.iter().cloned().collect();
        let mut completed: HashSet<String> = HashSet::new();

        while !remaining.is_empty() {
            let mut current: Vec<String> = remaining
                .iter()
                .filter(|name| {
                    self.tasks
                        .get(*name)
                        .map(|entry| {
                            entry
                                .task
                                .task_deps()
                                .iter()
                                .chain(entry.task.setup_tasks().iter())
                                .all(|d| completed.contains(d))
                        })
                        .unwrap_or(true)
                })
                .cloned()
                .collect();
            if current.is_empty() {
                // Cannot make progress: a cycle slipped through, or a
                // declared task-dependency doesn't exist in the graph.
                break;
            }
            current.sort_by_key(|n| self.admitted_order(n).unwrap_or(usize::MAX));
            for name in &current {
                remaining.remove(name);
                completed.insert(name.clone());
            }
            levels.push(current);
        }
        Ok(levels)
    }

    /// Tasks grouped by level: every task in a level has all its
    /// task-dependencies satisfied by an earlier level, so tasks within a
    /// level could in principle run concurrently (§2, §5).
    pub fn execution_levels(&self) -> Result<Vec<Vec<String>>, ConfigError> {
        let order = self.topological_sort()?;
        self.execution_levels_from_order(&order)
    }

    /// Whether a task's declared `task_dep`s are all DONE/SKIPPED, i.e. it
    /// can enter the executor's ready queue. Setup-tasks (and the getargs
    /// producers folded into them) are deliberately NOT a readiness gate
    /// here: §4.3 only materializes them once the task is found CHANGED, so
    /// the executor checks those separately, after the up-to-date decision,
    /// rather than blocking scheduling on them unconditionally.
    pub fn is_ready(&self, name: &str) -> bool {
        let Some(entry) = self.tasks.get(name) else {
            return false;
        };
        if entry.status != TaskStatus::Pending {
            return false;
        }
        for dep in entry.task.task_deps() {
            match self.status(dep) {
                Some(s) if s.satisfies_dependency() => continue,
                _ => return false,
            }
        }
        true
    }

    /// A task blocked on a FAILED `task_dep` (§7: "downstream tasks ... are
    /// themselves marked FAILED with cause upstream failed without being
    /// checked"). Setup-tasks are deliberately excluded here — like
    /// `is_ready`, whether a failed setup-task fails the parent is decided
    /// by the executor only once the parent is found CHANGED and actually
    /// needs it.
    pub fn has_failed_upstream(&self, name: &str) -> bool {
        let Some(entry) = self.tasks.get(name) else {
            return false;
        };
        for blocker in entry.task.task_deps() {
            if matches!(self.status(blocker), Some(TaskStatus::Failed)) {
                return true;
            }
        }
        false
    }

    /// Admission-time validation (§7): cyclic task-dependency graphs and
    /// dangling `setup_task`/`getargs`/`task_dep` references are fatal
    /// configuration errors, caught before the first action runs rather
    /// than leaving the affected tasks unready forever.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if let Err(e) = self.topological_sort() {
            errors.push(e);
        }

        for (name, entry) in &self.tasks {
            for setup in entry.task.setup_tasks() {
                if !self.tasks.contains_key(setup) {
                    errors.push(ConfigError::UnknownSetupTask {
                        task: name.clone(),
                        setup: setup.clone(),
                    });
                }
            }
            for dep_name in entry.task.task_deps() {
                if !self.tasks.contains_key(dep_name) {
                    errors.push(ConfigError::UnknownTask(dep_name.clone()));
                }
            }
            for spec in entry.task.getargs().values() {
                if !self.tasks.contains_key(&spec.producer) {
                    errors.push(ConfigError::UnknownGetargsProducer {
                        task: name.clone(),
                        producer: spec.producer.clone(),
                    });
                }
            }
            for target in entry.task.targets() {
                if target.match_strategy() == MatchStrategy::Prefix && !target.key().ends_with('/') {
                    errors.push(ConfigError::InvalidPattern {
                        pattern: target.key().to_string(),
                        reason: "prefix target key must end with '/'".to_string(),
                    });
                }
            }
            for dep in entry.task.dependencies() {
                if dep.match_strategy() == MatchStrategy::Prefix && !dep.key().ends_with('/') {
                    errors.push(ConfigError::InvalidPattern {
                        pattern: dep.key().to_string(),
                        reason: "prefix dependency key must end with '/'".to_string(),
                    });
                }
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.into_iter().next().unwrap()),
            _ => Err(ConfigError::Multiple(errors)),
        }
    }

    /// Tasks still pending, in admission order, used by the executor to
    /// find the next ready task deterministically.
    pub fn pending_in_admission_order(&self) -> Vec<String> {
        let mut names: Vec<&String> = self
            .tasks
            .iter()
            .filter(|(_, t)| t.status == TaskStatus::Pending)
            .map(|(n, _)| n)
            .collect();
        names.sort_by_key(|n| self.admitted_order(n).unwrap_or(usize::MAX));
        names.into_iter().cloned().collect()
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}
