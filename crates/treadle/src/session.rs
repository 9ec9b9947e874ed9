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

//! # Session
//!
//! The top-level entry point: wires the state store, match index, task
//! graph, reactive controller, and executor together for one `run()`
//! invocation. The state store is the one process-wide mutable resource
//! (§5); a `Session` owns it and scopes its lifetime to this invocation,
//! closed on every exit path.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::controller::{self, ControllerOutcome};
use crate::error::EngineError;
use crate::executor;
use crate::generator::Generator;
use crate::graph::TaskGraph;
use crate::match_index::MatchIndex;
use crate::store::{Database, StateStoreDal};
use crate::task::{Task, TaskStatus};

/// Outcome of a completed `Session::run`, carrying everything an outer CLI
/// needs to compute an exit code (§6 "Exit-code semantics for a run").
#[derive(Debug)]
pub struct RunOutcome {
    pub converged: bool,
    pub hit_limit: bool,
    pub regenerations: usize,
    pub failed_tasks: Vec<String>,
}

impl RunOutcome {
    /// Zero iff every admitted task ended DONE/SKIPPED-UP-TO-DATE and the
    /// controller converged; non-zero if any task FAILED, is stuck in a
    /// non-terminal status (never became ready — a deadlocked dependency
    /// graph), `hit_limit` was hit, or (by construction — `Session::run`
    /// never reaches this point on a config error) admission failed (§6).
    pub fn exit_code(&self) -> i32 {
        if self.failed_tasks.is_empty() && self.converged && !self.hit_limit {
            0
        } else {
            1
        }
    }

    /// A task counts as failed for exit-code purposes if it actually FAILED,
    /// or if it never reached a terminal status at all — Pending/Ready/
    /// Running tasks left over once the controller has converged mean real
    /// work never executed, and that must not look like success.
    fn from_controller(outcome: ControllerOutcome, graph: &TaskGraph) -> Self {
        let failed_tasks = graph
            .names()
            .filter(|name| match graph.status(name) {
                Some(TaskStatus::Failed) => true,
                Some(status) => !status.is_terminal(),
                None => false,
            })
            .cloned()
            .collect();
        Self {
            converged: outcome.converged,
            hit_limit: outcome.hit_limit,
            regenerations: outcome.regenerations,
            failed_tasks,
        }
    }
}

/// One run's worth of process-wide state: the state store, match index, and
/// admitted-task table (§3 glossary "Global mutable state").
pub struct Session {
    config: RunConfig,
    store: StateStoreDal,
    match_index: MatchIndex,
    graph: TaskGraph,
}

impl Session {
    /// Opens the state store at `config.state_store_path` and starts an
    /// empty task graph.
    pub fn new(config: RunConfig) -> Self {
        let database = Database::open(&config.state_store_path);
        Self::with_database(config, database)
    }

    /// Same as [`Session::new`] but with an already-open [`Database`] —
    /// used by tests that want an in-memory store without touching disk.
    pub fn with_database(config: RunConfig, database: Database) -> Self {
        Self {
            config,
            store: StateStoreDal::new(database),
            match_index: MatchIndex::new(),
            graph: TaskGraph::new(),
        }
    }

    /// Admits a task before the reactive loop starts, for static (non
    /// generator-produced) tasks. Registers its targets with the match
    /// index immediately, same as the controller's `TaskMerger` does for a
    /// generator's initial task set.
    pub fn admit(&mut self, task: Task) -> Result<(), EngineError> {
        for target in task.targets() {
            self.match_index.register(target, task.name());
        }
        self.graph.admit(task)?;
        Ok(())
    }

    /// Drives the reactive fixed-point loop (§4.4) to convergence or
    /// `max_tasks`, then runs teardown actions for every task that finished
    /// DONE this session, in reverse completion order (§4.3, §5), and closes
    /// the state store on every exit path — including an early error return
    /// from the controller itself.
    pub async fn run(mut self, generators: Vec<Arc<dyn Generator>>) -> Result<RunOutcome, EngineError> {
        info!(max_tasks = ?self.config.max_tasks, parallel = self.config.parallel, "starting session");

        let result = controller::run(
            &mut self.graph,
            &mut self.match_index,
            &self.store,
            &generators,
            &self.config,
        )
        .await;

        let controller_outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "session aborted before teardown");
                drop(self.store);
                return Err(e);
            }
        };

        executor::run_teardowns(&self.graph, &controller_outcome.completed_order);

        let outcome = RunOutcome::from_controller(controller_outcome, &self.graph);
        if outcome.hit_limit {
            warn!("session stopped at max_tasks before converging");
        }
        if !outcome.failed_tasks.is_empty() {
            warn!(failed = ?outcome.failed_tasks, "session completed with failed tasks");
        }
        info!(exit_code = outcome.exit_code(), "session complete");

        drop(self.store);
        Ok(outcome)
    }
}
