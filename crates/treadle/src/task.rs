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

//! # Task data model
//!
//! A [`Task`] is data, not behavior: a named bundle of actions, typed
//! dependencies and targets, and optional setup/teardown/uptodate/getargs
//! metadata. The executor is what gives it behavior; the task itself never
//! runs anything on its own.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::collections::hash_map::DefaultHasher;

use crate::capability::{Dependency, MatchStrategy, Target};
use crate::error::ConfigError;
use crate::values::ValueMap;

/// Where a single task stands in the session lifecycle. DONE, FAILED, and
/// SKIPPED-UP-TO-DATE are terminal for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Done,
    Failed,
    SkippedUpToDate,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::SkippedUpToDate
        )
    }

    /// DONE or SKIPPED-UP-TO-DATE: satisfies a task-dependency edge.
    pub fn satisfies_dependency(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::SkippedUpToDate)
    }
}

/// Outcome of a single action.
pub enum ActionOutcome {
    Success(ValueMap),
    Failure(String),
}

impl ActionOutcome {
    pub fn ok() -> Self {
        ActionOutcome::Success(ValueMap::new())
    }

    pub fn ok_with(values: ValueMap) -> Self {
        ActionOutcome::Success(values)
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        ActionOutcome::Failure(reason.into())
    }
}

/// Values resolved for an action via `getargs`, keyed by action-parameter name.
pub struct ActionContext<'a> {
    pub task_name: &'a str,
    pub resolved_args: &'a ValueMap,
}

pub type ActionFn = Arc<dyn Fn(&ActionContext) -> ActionOutcome + Send + Sync>;

/// A single unit of work within a task. The core does not interpret action
/// semantics beyond success/failure and an optional return map — a shell
/// action's exit code decides success, a callable's return value does.
#[derive(Clone)]
pub enum Action {
    Shell(String),
    Callable {
        /// A caller-supplied stable identity for this closure, used only to
        /// compute the task's canonical signature (§4.4 TaskMerger). Two
        /// regenerations of the same logical action should pass the same
        /// fingerprint so the controller can tell SKIP from UPDATE.
        fingerprint: String,
        run: ActionFn,
    },
}

impl Action {
    pub fn shell(command: impl Into<String>) -> Self {
        Action::Shell(command.into())
    }

    pub fn callable(
        fingerprint: impl Into<String>,
        run: impl Fn(&ActionContext) -> ActionOutcome + Send + Sync + 'static,
    ) -> Self {
        Action::Callable {
            fingerprint: fingerprint.into(),
            run: Arc::new(run),
        }
    }

    fn signature_fragment(&self) -> String {
        match self {
            Action::Shell(cmd) => format!("sh:{}", cmd),
            Action::Callable { fingerprint, .. } => format!("fn:{}", fingerprint),
        }
    }

    pub(crate) fn run(&self, ctx: &ActionContext) -> ActionOutcome {
        match self {
            Action::Shell(command) => run_shell(command),
            Action::Callable { run, .. } => run(ctx),
        }
    }
}

fn run_shell(command: &str) -> ActionOutcome {
    let result = std::process::Command::new("sh").arg("-c").arg(command).status();
    match result {
        Ok(status) if status.success() => ActionOutcome::ok(),
        Ok(status) => ActionOutcome::fail(format!("exited with {status}")),
        Err(e) => ActionOutcome::fail(e.to_string()),
    }
}

/// Result of evaluating a single up-to-date predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateResult {
    True,
    False,
    Undetermined,
}

pub type ValueSaverFn = Arc<dyn Fn() -> ValueMap + Send + Sync>;

/// Mutable scratch a predicate's `check` is given, so it may register
/// value-savers inline with its evaluation rather than through a separate
/// registration pass.
pub struct PredicateContext<'a> {
    pub task_name: &'a str,
    pub stored_values: &'a ValueMap,
    savers: Vec<ValueSaverFn>,
}

impl<'a> PredicateContext<'a> {
    pub fn new(task_name: &'a str, stored_values: &'a ValueMap) -> Self {
        Self {
            task_name,
            stored_values,
            savers: Vec::new(),
        }
    }

    pub fn register_value_saver(&mut self, saver: ValueSaverFn) {
        self.savers.push(saver);
    }

    pub fn into_savers(self) -> Vec<ValueSaverFn> {
        self.savers
    }
}

/// A callable up-to-date predicate. `configure_task` is the sole supported
/// post-admission mutation (it may only touch the task's dependency list);
/// `check` only ever sees the immutable view passed in [`PredicateContext`].
pub trait UpToDatePredicate: Send + Sync {
    fn check(&self, ctx: &mut PredicateContext) -> PredicateResult;

    fn configure_task(&self, _dependencies: &mut Vec<Box<dyn Dependency>>) {}
}

/// An up-to-date predicate as accepted at the boundary (§6).
#[derive(Clone)]
pub enum UpToDateCheck {
    Const(bool),
    /// Zero exit status means up-to-date.
    Shell(String),
    Callable(Arc<dyn UpToDatePredicate>),
}

impl UpToDateCheck {
    fn signature_fragment(&self) -> String {
        match self {
            UpToDateCheck::Const(b) => format!("const:{b}"),
            UpToDateCheck::Shell(s) => format!("sh:{s}"),
            UpToDateCheck::Callable(_) => "callable".to_string(),
        }
    }
}

/// `getargs` entry: an action-parameter name mapped to (producer task, value
/// name). `value_name = None` delivers the producer's full saved-values map.
#[derive(Debug, Clone)]
pub struct GetargsSpec {
    pub producer: String,
    pub value_name: Option<String>,
}

/// A named unit of work. An empty `actions` list makes this a **group**: it
/// completes once its task-dependencies are satisfied and is never "run"
/// twice in a session.
pub struct Task {
    pub(crate) name: String,
    pub(crate) actions: Vec<Action>,
    pub(crate) dependencies: Vec<Box<dyn Dependency>>,
    pub(crate) targets: Vec<std::sync::Arc<dyn Target>>,
    pub(crate) task_deps: Vec<String>,
    pub(crate) setup_tasks: Vec<String>,
    pub(crate) teardown_actions: Vec<Action>,
    pub(crate) uptodate: Vec<UpToDateCheck>,
    pub(crate) getargs: BTreeMap<String, GetargsSpec>,
    pub(crate) no_default_run: bool,
}

impl Task {
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_group(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn dependencies(&self) -> &[Box<dyn Dependency>] {
        &self.dependencies
    }

    pub fn targets(&self) -> &[std::sync::Arc<dyn Target>] {
        &self.targets
    }

    pub fn task_deps(&self) -> &[String] {
        &self.task_deps
    }

    pub fn setup_tasks(&self) -> &[String] {
        &self.setup_tasks
    }

    pub fn teardown_actions(&self) -> &[Action] {
        &self.teardown_actions
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn uptodate(&self) -> &[UpToDateCheck] {
        &self.uptodate
    }

    pub fn getargs(&self) -> &BTreeMap<String, GetargsSpec> {
        &self.getargs
    }

    pub fn no_default_run(&self) -> bool {
        self.no_default_run
    }

    /// Every task-dependency this task implicitly or explicitly requires,
    /// including producers added by `getargs` (§4.3: "getargs implicitly
    /// adds the producer to the consumer's setup-tasks").
    pub fn all_setup_tasks(&self) -> Vec<String> {
        let mut out = self.setup_tasks.clone();
        for spec in self.getargs.values() {
            if !out.contains(&spec.producer) {
                out.push(spec.producer.clone());
            }
        }
        out
    }

    /// Declared dependency keys, used for dependency-set drift detection
    /// (§4.1 step 4).
    pub fn dependency_keys(&self) -> Vec<String> {
        self.dependencies.iter().map(|d| d.key().to_string()).collect()
    }

    /// Canonical signature for TaskMerger comparison (§4.4): a hash over the
    /// action list, dependency key/strategy set, target key/strategy set,
    /// and setup-tasks list. Two regenerations of a logically-identical task
    /// hash the same value only if their actions carry matching fingerprints.
    pub fn canonical_signature(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for action in &self.actions {
            action.signature_fragment().hash(&mut hasher);
        }
        let mut dep_keys: Vec<(String, u8)> = self
            .dependencies
            .iter()
            .map(|d| (d.key().to_string(), match_strategy_tag(d.match_strategy())))
            .collect();
        dep_keys.sort();
        dep_keys.hash(&mut hasher);

        let mut target_keys: Vec<(String, u8)> = self
            .targets
            .iter()
            .map(|t| (t.key().to_string(), match_strategy_tag(t.match_strategy())))
            .collect();
        target_keys.sort();
        target_keys.hash(&mut hasher);

        self.task_deps.hash(&mut hasher);
        self.setup_tasks.hash(&mut hasher);
        for u in &self.uptodate {
            u.signature_fragment().hash(&mut hasher);
        }
        for (k, v) in &self.getargs {
            k.hash(&mut hasher);
            v.producer.hash(&mut hasher);
            v.value_name.hash(&mut hasher);
        }
        self.no_default_run.hash(&mut hasher);
        hasher.finish()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("actions", &self.actions.len())
            .field("dependencies", &self.dependencies.len())
            .field("targets", &self.targets.len())
            .field("task_deps", &self.task_deps)
            .field("setup_tasks", &self.setup_tasks)
            .field("no_default_run", &self.no_default_run)
            .finish()
    }
}

fn match_strategy_tag(m: MatchStrategy) -> u8 {
    match m {
        MatchStrategy::Exact => 0,
        MatchStrategy::Prefix => 1,
        MatchStrategy::Custom => 2,
    }
}

/// Fluent construction API for assembling a [`Task`].
pub struct TaskBuilder {
    name: String,
    actions: Vec<Action>,
    dependencies: Vec<Box<dyn Dependency>>,
    targets: Vec<std::sync::Arc<dyn Target>>,
    task_deps: Vec<String>,
    setup_tasks: Vec<String>,
    teardown_actions: Vec<Action>,
    uptodate: Vec<UpToDateCheck>,
    getargs: BTreeMap<String, GetargsSpec>,
    no_default_run: bool,
}

impl TaskBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            dependencies: Vec::new(),
            targets: Vec::new(),
            task_deps: Vec::new(),
            setup_tasks: Vec::new(),
            teardown_actions: Vec::new(),
            uptodate: Vec::new(),
            getargs: BTreeMap::new(),
            no_default_run: false,
        }
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn dependency(mut self, dep: Box<dyn Dependency>) -> Self {
        self.dependencies.push(dep);
        self
    }

    pub fn target(mut self, target: std::sync::Arc<dyn Target>) -> Self {
        self.targets.push(target);
        self
    }

    pub fn task_dep(mut self, task_name: impl Into<String>) -> Self {
        self.task_deps.push(task_name.into());
        self
    }

    pub fn setup_task(mut self, task_name: impl Into<String>) -> Self {
        self.setup_tasks.push(task_name.into());
        self
    }

    pub fn teardown(mut self, action: Action) -> Self {
        self.teardown_actions.push(action);
        self
    }

    pub fn uptodate(mut self, check: UpToDateCheck) -> Self {
        self.uptodate.push(check);
        self
    }

    pub fn getarg(
        mut self,
        param_name: impl Into<String>,
        producer: impl Into<String>,
        value_name: Option<String>,
    ) -> Self {
        self.getargs.insert(
            param_name.into(),
            GetargsSpec {
                producer: producer.into(),
                value_name,
            },
        );
        self
    }

    pub fn no_default_run(mut self, value: bool) -> Self {
        self.no_default_run = value;
        self
    }

    /// Applies each uptodate predicate's `configure_task`, then returns the
    /// finished task. This is the one point at which dependencies may be
    /// mutated after the user stopped calling builder methods.
    pub fn build(mut self) -> Result<Task, ConfigError> {
        for check in &self.uptodate {
            if let UpToDateCheck::Callable(predicate) = check {
                predicate.configure_task(&mut self.dependencies);
            }
        }
        Ok(Task {
            name: self.name,
            actions: self.actions,
            dependencies: self.dependencies,
            targets: self.targets,
            task_deps: self.task_deps,
            setup_tasks: self.setup_tasks,
            teardown_actions: self.teardown_actions,
            uptodate: self.uptodate,
            getargs: self.getargs,
            no_default_run: self.no_default_run,
        })
    }
}
