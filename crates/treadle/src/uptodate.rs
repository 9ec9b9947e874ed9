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

//! # Up-to-date decision engine
//!
//! Combines heterogeneous dependency signals, the task's up-to-date
//! predicates, and the state store's recorded witnesses into a single
//! per-task decision, following the six-step short-circuiting procedure in
//! §4.1. Also owns the post-success write-back: re-querying witnesses and
//! invoking registered value-savers atomically into the store.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::capability::{Dependency, Witness};
use crate::error::{DependencyError, EngineError};
use crate::kinds::TaskRefDependency;
use crate::store::StateStoreDal;
use crate::task::{PredicateContext, PredicateResult, Task, UpToDateCheck, ValueSaverFn};
use crate::values::ValueMap;

/// Outcome of [`UpToDateEngine::check`], carrying a human-readable reason
/// for observability (§4.1 contract: "with a human-readable reason").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDecision {
    UpToDate,
    Changed(String),
}

impl CheckDecision {
    pub fn is_up_to_date(&self) -> bool {
        matches!(self, CheckDecision::UpToDate)
    }
}

/// A completed check, including any value-savers registered by up-to-date
/// predicates during evaluation. The executor invokes these after a
/// successful action sequence and merges their return maps into the task's
/// saved values, per §4.1's "value-saver registration" clause.
pub struct CheckResult {
    pub decision: CheckDecision,
    pub savers: Vec<ValueSaverFn>,
}

fn run_shell_check(command: &str) -> bool {
    std::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Stateless evaluator over a [`StateStoreDal`]; safe to construct per check.
pub struct UpToDateEngine<'a> {
    store: &'a StateStoreDal,
}

impl<'a> UpToDateEngine<'a> {
    pub fn new(store: &'a StateStoreDal) -> Self {
        Self { store }
    }

    /// Runs the six-step procedure in §4.1, in order, short-circuiting on
    /// the first CHANGED verdict.
    ///
    /// `task_deps` carries one synthetic [`TaskRefDependency`] per
    /// task-dependency/setup-task/getargs-producer edge the executor has
    /// resolved against the graph and store: a task_dep is itself a
    /// dependency keyed `task:<name>` (§3 glossary), so a producer's saved
    /// values changing — even if its own file inputs did not — propagates
    /// a CHANGED verdict to every declared consumer (§8 "Getargs" scenario).
    pub async fn check(
        &self,
        task: &Task,
        task_deps: &[TaskRefDependency],
    ) -> Result<CheckResult, EngineError> {
        let stored = self.store.load(task.name())?;

        // Step 1: no inputs declared.
        if task.dependencies().is_empty() && task_deps.is_empty() && task.uptodate().is_empty() {
            debug!(task = task.name(), "no inputs declared");
            return Ok(CheckResult {
                decision: CheckDecision::Changed("no inputs declared".to_string()),
                savers: Vec::new(),
            });
        }

        // Step 2: every declared target must exist.
        for target in task.targets() {
            if !target.exists() {
                return Ok(CheckResult {
                    decision: CheckDecision::Changed(format!(
                        "missing target '{}'",
                        target.key()
                    )),
                    savers: Vec::new(),
                });
            }
        }

        // Step 3: up-to-date predicates, declared order, ignoring undetermined.
        let mut savers = Vec::new();
        for check in task.uptodate() {
            match check {
                UpToDateCheck::Const(value) => {
                    if !*value {
                        return Ok(CheckResult {
                            decision: CheckDecision::Changed(
                                "uptodate predicate constant false".to_string(),
                            ),
                            savers,
                        });
                    }
                }
                UpToDateCheck::Shell(command) => {
                    if !run_shell_check(command) {
                        return Ok(CheckResult {
                            decision: CheckDecision::Changed(format!(
                                "uptodate shell check '{command}' exited nonzero"
                            )),
                            savers,
                        });
                    }
                }
                UpToDateCheck::Callable(predicate) => {
                    let mut ctx = PredicateContext::new(task.name(), &stored.saved_values);
                    let result = predicate.check(&mut ctx);
                    savers.extend(ctx.into_savers());
                    match result {
                        PredicateResult::False => {
                            return Ok(CheckResult {
                                decision: CheckDecision::Changed(
                                    "uptodate predicate returned false".to_string(),
                                ),
                                savers,
                            });
                        }
                        PredicateResult::True | PredicateResult::Undetermined => {}
                    }
                }
            }
        }

        // Step 4: dependency-set drift (declared file/remote/custom deps
        // plus the synthetic task-dependency edges).
        let mut declared: HashSet<String> = task.dependency_keys().into_iter().collect();
        declared.extend(task_deps.iter().map(|d| d.key().to_string()));
        let recorded: HashSet<String> = stored.witnesses.keys().cloned().collect();
        if declared != recorded {
            return Ok(CheckResult {
                decision: CheckDecision::Changed(
                    "declared dependency set differs from recorded set".to_string(),
                ),
                savers,
            });
        }

        // Step 5: per-dependency modification check, declared order, then
        // task-dependency edges.
        let all_deps: Vec<&dyn Dependency> = task
            .dependencies()
            .iter()
            .map(|d| d.as_ref())
            .chain(task_deps.iter().map(|d| d as &dyn Dependency))
            .collect();
        for dep in all_deps {
            let key = dep.key().to_string();
            let stored_witness = stored.witnesses.get(&key).cloned().unwrap_or_else(|| Witness::new(""));
            let changed = dep.modified_since(&stored_witness).await.map_err(|e: DependencyError| e)?;
            if changed {
                return Ok(CheckResult {
                    decision: CheckDecision::Changed(format!("dependency '{key}' modified")),
                    savers,
                });
            }
        }

        Ok(CheckResult {
            decision: CheckDecision::UpToDate,
            savers,
        })
    }

    /// Re-queries every dependency's current witness and commits it
    /// alongside the task's saved values. Called by the executor once a
    /// task's actions (and value-savers) have all succeeded.
    pub async fn commit_success(
        &self,
        task: &Task,
        task_deps: &[TaskRefDependency],
        saved_values: &ValueMap,
    ) -> Result<(), EngineError> {
        let mut witnesses = HashMap::new();
        for dep in task.dependencies() {
            let witness = dep.witness().await?;
            witnesses.insert(dep.key().to_string(), witness);
        }
        for dep in task_deps {
            let witness = dep.witness().await?;
            witnesses.insert(dep.key().to_string(), witness);
        }
        self.store.commit(task.name(), &witnesses, saved_values)?;
        Ok(())
    }
}
