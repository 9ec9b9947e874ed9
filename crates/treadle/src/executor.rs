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

//! # Task graph executor
//!
//! Drains the task graph's ready queue: for each ready task it consults the
//! up-to-date engine, runs actions when necessary, resolves `getargs`,
//! commits witnesses/saved values on success, and propagates failure to
//! dependents (§4.3). Runs teardown actions, in reverse execution order,
//! once the ready queue is drained.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::capability::Target;
use crate::error::{ActionError, CommitError, EngineError};
use crate::graph::TaskGraph;
use crate::kinds::TaskRefDependency;
use crate::match_index::MatchIndex;
use crate::store::StateStoreDal;
use crate::task::{Action, ActionContext, ActionOutcome, Task, TaskStatus};
use crate::uptodate::UpToDateEngine;
use crate::values::ValueMap;

/// What happened to a single task during one `drain()` pass.
#[derive(Debug)]
pub enum TaskOutcome {
    Done { published_keys: Vec<String> },
    SkippedUpToDate,
    Failed { reason: String },
}

/// Same cases as [`TaskOutcome`], but as returned by the `&self`-only
/// `run_task` used by the concurrent path: a successful run carries its
/// `saved_values` instead of already-registered `published_keys`, since
/// registering targets mutates the match index and must happen serially
/// after the whole batch has settled.
#[cfg(feature = "parallel")]
#[derive(Debug)]
enum RawOutcome {
    Done { saved_values: ValueMap },
    Group,
    SkippedUpToDate,
    Failed { reason: String },
}

/// Drives a [`TaskGraph`] to completion against a [`StateStoreDal`] and
/// [`MatchIndex`].
pub struct Executor<'a> {
    store: &'a StateStoreDal,
    match_index: &'a mut MatchIndex,
    /// Saved values committed so far this session, for `getargs` resolution
    /// without a round-trip through the store when the producer just ran.
    session_values: HashMap<String, ValueMap>,
    /// Tasks that finished DONE this session, in the order they finished —
    /// teardown runs in reverse of this order (§4.3). Owned by the caller
    /// (the controller's reactive loop spans many short-lived `Executor`s,
    /// but teardown must see every DONE task across the whole session).
    completed_order: &'a mut Vec<String>,
    /// Whether `drain` should use the concurrent path (§5, requires the
    /// `parallel` feature). Ignored — with a warning — when the feature is
    /// not compiled in.
    parallel: bool,
    /// Upper bound on tasks run concurrently when `parallel` is set.
    max_concurrent_tasks: usize,
}

impl<'a> Executor<'a> {
    pub fn new(
        store: &'a StateStoreDal,
        match_index: &'a mut MatchIndex,
        completed_order: &'a mut Vec<String>,
    ) -> Self {
        Self {
            store,
            match_index,
            session_values: HashMap::new(),
            completed_order,
            parallel: false,
            max_concurrent_tasks: 1,
        }
    }

    /// Enables the concurrent execution path (§5). `max_concurrent_tasks` is
    /// clamped to at least 1.
    pub fn with_concurrency(mut self, parallel: bool, max_concurrent_tasks: usize) -> Self {
        self.parallel = parallel;
        self.max_concurrent_tasks = max_concurrent_tasks.max(1);
        self
    }

    /// Runs every currently-ready task to a terminal status, registering
    /// produced target keys with the match index as each task commits.
    /// Returns the set of keys published this pass, for the controller to
    /// feed to `affected_generators`.
    pub async fn drain(&mut self, graph: &mut TaskGraph) -> Result<Vec<String>, EngineError> {
        if self.parallel {
            #[cfg(feature = "parallel")]
            {
                return self.drain_parallel(graph).await;
            }
            #[cfg(not(feature = "parallel"))]
            {
                warn!("RunConfig::parallel is set but the `parallel` cargo feature is not enabled; running sequentially");
            }
        }
        self.drain_sequential(graph).await
    }

    /// Runs the ready queue one task at a time, in admission order, the way
    /// `drain` always did before the concurrent path existed (§5 default).
    async fn drain_sequential(&mut self, graph: &mut TaskGraph) -> Result<Vec<String>, EngineError> {
        let mut published = Vec::new();
        loop {
            let mut made_progress = false;
            for name in graph.pending_in_admission_order() {
                if graph.status(&name) != Some(TaskStatus::Pending) {
                    continue;
                }
                let task = graph.get(&name).expect("pending task must be admitted");
                let implicit_blockers = self.implicit_blockers(graph, task, &name);

                if graph.has_failed_upstream(&name)
                    || implicit_blockers
                        .iter()
                        .any(|b| graph.status(b) == Some(TaskStatus::Failed))
                {
                    graph.set_status(&name, TaskStatus::Failed);
                    warn!(task = %name, "marked failed: upstream failed");
                    made_progress = true;
                    continue;
                }
                let implicit_ready = implicit_blockers
                    .iter()
                    .all(|b| graph.status(b).map(|s| s.satisfies_dependency()).unwrap_or(false));
                if !graph.is_ready(&name) || !implicit_ready {
                    continue;
                }
                let outcome = match self.execute_task(graph, &name).await? {
                    Some(outcome) => outcome,
                    None => continue,
                };
                made_progress = true;
                match outcome {
                    TaskOutcome::Done { published_keys } => {
                        graph.set_status(&name, TaskStatus::Done);
                        self.completed_order.push(name.clone());
                        published.extend(published_keys);
                    }
                    TaskOutcome::SkippedUpToDate => {
                        graph.set_status(&name, TaskStatus::SkippedUpToDate);
                    }
                    TaskOutcome::Failed { reason } => {
                        graph.set_status(&name, TaskStatus::Failed);
                        warn!(task = %name, reason = %reason, "task failed");
                    }
                }
            }
            if !made_progress {
                break;
            }
        }
        Ok(published)
    }

    /// Resolves each declared dependency key to its producer via the match
    /// index (§2, §8: "for every pair (P, C) where C declares a dependency
    /// on a key produced by P, P's outcome precedes C's"), giving the
    /// implicit ordering edges the user never declared as a `task_dep`.
    fn implicit_blockers(&self, graph: &TaskGraph, task: &Task, self_name: &str) -> Vec<String> {
        task.dependencies()
            .iter()
            .filter_map(|dep| self.match_index.find_producer(dep.key()))
            .filter(|owner| owner != self_name && graph.contains(owner))
            .collect()
    }

    /// Resolves the synthetic `task:<name>` dependencies for every
    /// task-dependency/setup-task/getargs-producer edge this task declares
    /// (§8 "Getargs": a producer's saved-value change must re-trigger the
    /// consumer even if its direct file inputs are unchanged).
    fn task_ref_dependencies(&self, graph: &TaskGraph, task: &Task) -> Result<Vec<TaskRefDependency>, EngineError> {
        let mut names: Vec<String> = task.task_deps().to_vec();
        for name in task.all_setup_tasks() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        let mut refs = Vec::with_capacity(names.len());
        for name in names {
            let status = graph.status(&name);
            let done = matches!(status, Some(s) if s.satisfies_dependency());
            let last_success = self.store.load(&name)?.last_success.map(|t| t.to_string());
            refs.push(TaskRefDependency::new(name, last_success.as_deref(), done));
        }
        Ok(refs)
    }

    fn resolve_getargs(&self, task: &Task) -> Result<ValueMap, EngineError> {
        let mut resolved = ValueMap::new();
        for (param, spec) in task.getargs() {
            let producer_values = match self.session_values.get(&spec.producer) {
                Some(values) => values.clone(),
                None => self.store.load(&spec.producer)?.saved_values,
            };
            let value = match &spec.value_name {
                None => producer_values.as_json_object(),
                Some(name) => match producer_values.get(name) {
                    Some(v) => v.clone(),
                    None => {
                        return Err(EngineError::Action(ActionError {
                            task: task.name().to_string(),
                            index: 0,
                            reason: format!(
                                "getargs: producer '{}' has no saved value '{}'",
                                spec.producer, name
                            ),
                        }));
                    }
                },
            };
            resolved.insert(param.clone(), value);
        }
        Ok(resolved)
    }

    /// Advances a ready task toward a terminal status, or returns `None` if
    /// it is CHANGED but its setup-tasks (including getargs producers
    /// folded into them) have not finished yet this session — §4.3
    /// materializes setup-tasks only once a parent is actually going to
    /// execute, so until then this task is left PENDING for a later pass
    /// once its setup-tasks run in their own right.
    async fn execute_task(&mut self, graph: &TaskGraph, name: &str) -> Result<Option<TaskOutcome>, EngineError> {
        let task = graph
            .get(name)
            .expect("execute_task called for an unadmitted task");

        if task.is_group() {
            info!(task = %name, "group task complete");
            return Ok(Some(TaskOutcome::Done {
                published_keys: self.register_and_collect_targets(task, name),
            }));
        }

        let task_deps = self.task_ref_dependencies(graph, task)?;
        let uptodate = UpToDateEngine::new(self.store);
        let check = uptodate.check(task, &task_deps).await?;

        if check.decision.is_up_to_date() {
            info!(task = %name, "up to date, skipping");
            return Ok(Some(TaskOutcome::SkippedUpToDate));
        }

        for setup_name in task.all_setup_tasks() {
            match graph.status(&setup_name) {
                Some(s) if s.satisfies_dependency() => continue,
                Some(TaskStatus::Failed) => {
                    return Ok(Some(TaskOutcome::Failed {
                        reason: format!("setup-task '{setup_name}' failed"),
                    }));
                }
                _ => {
                    debug!(task = %name, setup = %setup_name, "deferring: setup-task not finished");
                    return Ok(None);
                }
            }
        }
        info!(task = %name, reason = ?check.decision, "running actions");

        let resolved_args = match self.resolve_getargs(task) {
            Ok(args) => args,
            Err(EngineError::Action(e)) => return Ok(Some(TaskOutcome::Failed { reason: e.reason })),
            Err(e) => return Err(e),
        };

        let mut saved_values = ValueMap::new();
        for (index, action) in task.actions().iter().enumerate() {
            let ctx = ActionContext {
                task_name: name,
                resolved_args: &resolved_args,
            };
            match run_action(action, &ctx) {
                ActionOutcome::Success(values) => saved_values.merge(values),
                ActionOutcome::Failure(reason) => {
                    let err = ActionError {
                        task: name.to_string(),
                        index,
                        reason,
                    };
                    return Ok(Some(TaskOutcome::Failed {
                        reason: err.to_string(),
                    }));
                }
            }
        }

        for saver in check.savers {
            saved_values.merge(saver());
        }

        match uptodate.commit_success(task, &task_deps, &saved_values).await {
            Ok(()) => {}
            Err(e) => {
                let err = CommitError {
                    task: name.to_string(),
                    reason: e.to_string(),
                };
                return Ok(Some(TaskOutcome::Failed {
                    reason: err.to_string(),
                }));
            }
        }

        self.session_values.insert(name.to_string(), saved_values);
        Ok(Some(TaskOutcome::Done {
            published_keys: self.register_and_collect_targets(task, name),
        }))
    }

    /// Keys (dependencies or targets) a ready task touches, for the
    /// concurrent path's same-batch collision check (§5: "any two tasks that
    /// share a dependency or a target must not run concurrently").
    #[cfg(feature = "parallel")]
    fn touched_keys(task: &Task) -> Vec<String> {
        let mut keys: Vec<String> = task.dependencies().iter().map(|d| d.key().to_string()).collect();
        keys.extend(task.targets().iter().map(|t| t.key().to_string()));
        keys
    }

    /// Same decision/action logic as `execute_task`, but `&self`-only so a
    /// batch of these can run concurrently: it neither mutates the match
    /// index nor records a `session_values` entry. The caller applies the
    /// returned [`RawOutcome`] to the graph and `self` serially once every
    /// task in the batch has settled.
    #[cfg(feature = "parallel")]
    async fn run_task(&self, graph: &TaskGraph, name: &str) -> Result<Option<RawOutcome>, EngineError> {
        let task = graph
            .get(name)
            .expect("run_task called for an unadmitted task");

        if task.is_group() {
            return Ok(Some(RawOutcome::Group));
        }

        let task_deps = self.task_ref_dependencies(graph, task)?;
        let uptodate = UpToDateEngine::new(self.store);
        let check = uptodate.check(task, &task_deps).await?;

        if check.decision.is_up_to_date() {
            return Ok(Some(RawOutcome::SkippedUpToDate));
        }

        for setup_name in task.all_setup_tasks() {
            match graph.status(&setup_name) {
                Some(s) if s.satisfies_dependency() => continue,
                Some(TaskStatus::Failed) => {
                    return Ok(Some(RawOutcome::Failed {
                        reason: format!("setup-task '{setup_name}' failed"),
                    }));
                }
                _ => return Ok(None),
            }
        }

        let resolved_args = match self.resolve_getargs(task) {
            Ok(args) => args,
            Err(EngineError::Action(e)) => return Ok(Some(RawOutcome::Failed { reason: e.reason })),
            Err(e) => return Err(e),
        };

        let mut saved_values = ValueMap::new();
        for (index, action) in task.actions().iter().enumerate() {
            let ctx = ActionContext {
                task_name: name,
                resolved_args: &resolved_args,
            };
            match run_action(action, &ctx) {
                ActionOutcome::Success(values) => saved_values.merge(values),
                ActionOutcome::Failure(reason) => {
                    let err = ActionError {
                        task: name.to_string(),
                        index,
                        reason,
                    };
                    return Ok(Some(RawOutcome::Failed {
                        reason: err.to_string(),
                    }));
                }
            }
        }

        for saver in check.savers {
            saved_values.merge(saver());
        }

        if let Err(e) = uptodate.commit_success(task, &task_deps, &saved_values).await {
            let err = CommitError {
                task: name.to_string(),
                reason: e.to_string(),
            };
            return Ok(Some(RawOutcome::Failed {
                reason: err.to_string(),
            }));
        }

        Ok(Some(RawOutcome::Done { saved_values }))
    }

    /// Runs the ready queue with up to `max_concurrent_tasks` tasks in
    /// flight at once (§5). Within one pass, tasks are admitted into the
    /// concurrent batch greedily in admission order, skipping any ready task
    /// whose dependency/target keys collide with one already claimed by the
    /// batch — two such tasks may still race on the same file or database
    /// row, so they run in different passes instead.
    #[cfg(feature = "parallel")]
    async fn drain_parallel(&mut self, graph: &mut TaskGraph) -> Result<Vec<String>, EngineError> {
        use futures::stream::{self, StreamExt};

        let mut published = Vec::new();
        loop {
            let mut made_progress = false;

            for name in graph.pending_in_admission_order() {
                if graph.status(&name) != Some(TaskStatus::Pending) {
                    continue;
                }
                let task = graph.get(&name).expect("pending task must be admitted");
                let implicit_blockers = self.implicit_blockers(graph, task, &name);
                if graph.has_failed_upstream(&name)
                    || implicit_blockers
                        .iter()
                        .any(|b| graph.status(b) == Some(TaskStatus::Failed))
                {
                    graph.set_status(&name, TaskStatus::Failed);
                    warn!(task = %name, "marked failed: upstream failed");
                    made_progress = true;
                }
            }

            let mut batch: Vec<String> = Vec::new();
            let mut claimed: std::collections::HashSet<String> = std::collections::HashSet::new();
            for name in graph.pending_in_admission_order() {
                if batch.len() >= self.max_concurrent_tasks {
                    break;
                }
                if graph.status(&name) != Some(TaskStatus::Pending) {
                    continue;
                }
                let task = graph.get(&name).expect("pending task must be admitted");
                let implicit_blockers = self.implicit_blockers(graph, task, &name);
                let implicit_ready = implicit_blockers
                    .iter()
                    .all(|b| graph.status(b).map(|s| s.satisfies_dependency()).unwrap_or(false));
                if !graph.is_ready(&name) || !implicit_ready {
                    continue;
                }
                let keys = Self::touched_keys(task);
                if keys.iter().any(|k| claimed.contains(k)) {
                    continue;
                }
                claimed.extend(keys);
                batch.push(name);
            }

            if batch.is_empty() {
                if !made_progress {
                    break;
                }
                continue;
            }

            let this: &Self = self;
            let graph_ref: &TaskGraph = graph;
            let results: Vec<(String, Result<Option<RawOutcome>, EngineError>)> = stream::iter(batch)
                .map(|name| async move {
                    let outcome = this.run_task(graph_ref, &name).await;
                    (name, outcome)
                })
                .buffer_unordered(self.max_concurrent_tasks)
                .collect()
                .await;

            for (name, result) in results {
                match result? {
                    None => {}
                    Some(RawOutcome::Group) => {
                        made_progress = true;
                        let task = graph.get(&name).expect("task must be admitted");
                        let keys = self.register_and_collect_targets(task, &name);
                        graph.set_status(&name, TaskStatus::Done);
                        self.completed_order.push(name.clone());
                        published.extend(keys);
                    }
                    Some(RawOutcome::SkippedUpToDate) => {
                        made_progress = true;
                        graph.set_status(&name, TaskStatus::SkippedUpToDate);
                    }
                    Some(RawOutcome::Failed { reason }) => {
                        made_progress = true;
                        graph.set_status(&name, TaskStatus::Failed);
                        warn!(task = %name, reason = %reason, "task failed");
                    }
                    Some(RawOutcome::Done { saved_values }) => {
                        made_progress = true;
                        self.session_values.insert(name.clone(), saved_values);
                        let task = graph.get(&name).expect("task must be admitted");
                        let keys = self.register_and_collect_targets(task, &name);
                        graph.set_status(&name, TaskStatus::Done);
                        self.completed_order.push(name.clone());
                        published.extend(keys);
                    }
                }
            }

            if !made_progress {
                break;
            }
        }
        Ok(published)
    }

    /// Registers this task's targets with the match index (idempotent for a
    /// re-executed/updated task definition) and returns their keys for
    /// publication to the controller.
    fn register_and_collect_targets(&mut self, task: &Task, owner: &str) -> Vec<String> {
        let mut keys = Vec::with_capacity(task.targets().len());
        for target in task.targets() {
            self.match_index.register(target, owner);
            keys.push(target.key().to_string());
        }
        keys
    }

}

fn run_action(action: &Action, ctx: &ActionContext) -> ActionOutcome {
    action.run(ctx)
}

/// Runs teardown actions for every DONE task, in reverse completion order,
/// once the session's reactive loop has converged or hit its bound (§4.3,
/// §5: "Teardown actions for tasks marked DONE run after the session").
/// A free function rather than an `Executor` method: the controller's
/// reactive loop spans many short-lived `Executor`s, so by the time
/// teardown runs there is no single `Executor` left to call it on.
pub fn run_teardowns(graph: &TaskGraph, completed_order: &[String]) {
    for name in completed_order.iter().rev() {
        let Some(task) = graph.get(name) else { continue };
        for action in task.teardown_actions() {
            let ctx = ActionContext {
                task_name: name,
                resolved_args: &ValueMap::new(),
            };
            if let ActionOutcome::Failure(reason) = run_action(action, &ctx) {
                warn!(task = %name, reason = %reason, "teardown action failed");
            }
        }
    }
}
