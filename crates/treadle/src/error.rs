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

//! # Error Types
//!
//! Errors are grouped by the taxonomy in the error handling design: configuration
//! errors are fatal before any action runs, everything else is reported per task.

use thiserror::Error;

/// Errors raised during task admission, before any action has run.
///
/// All of these are fatal: the session never starts executing if admission
/// produces one of these.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("duplicate task name: {0}")]
    DuplicateTask(String),

    #[error("no admitted task named '{0}'")]
    UnknownTask(String),

    #[error("task '{task}' declares unknown setup-task '{setup}'")]
    UnknownSetupTask { task: String, setup: String },

    #[error("task '{task}' getargs references unknown producer task '{producer}'")]
    UnknownGetargsProducer { task: String, producer: String },

    #[error("cyclic task dependency graph: {cycle}")]
    CyclicDependency { cycle: String },

    #[error("invalid match pattern: {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("{0} configuration errors found")]
    Multiple(Vec<ConfigError>),
}

/// A dependency's `exists()` or `witness()` call raised.
///
/// Caught by the up-to-date engine and turned into a CHANGED-with-error
/// decision, which fails the task without running its actions.
#[derive(Error, Debug)]
#[error("dependency '{key}' check failed: {reason}")]
pub struct DependencyError {
    pub key: String,
    pub reason: String,
}

/// A non-success outcome from a task action.
#[derive(Error, Debug)]
#[error("action {index} of task '{task}' failed: {reason}")]
pub struct ActionError {
    pub task: String,
    pub index: usize,
    pub reason: String,
}

/// Failure to persist witnesses or saved values after a successful action
/// sequence. The task is demoted to FAILED even though its actions succeeded.
#[derive(Error, Debug)]
#[error("commit failed for task '{task}': {reason}")]
pub struct CommitError {
    pub task: String,
    pub reason: String,
}

/// The controller hit its safety bound before converging.
#[derive(Error, Debug)]
#[error("max_tasks exceeded: {admitted} admitted tasks at the bound of {limit}")]
pub struct ControllerError {
    pub admitted: usize,
    pub limit: usize,
}

/// Top-level error type threaded through the public API.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error("state store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
